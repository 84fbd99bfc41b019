//! Sigrid: a single-machine MapReduce engine.
//!
//! A run maps every input file on its own thread into a partitioned in-memory store,
//! sorts each partition on its own thread, then reduces each partition on its own thread.
//! Each phase finishes completely before the next one starts.

pub mod api;
pub mod config;
pub mod constants;
pub mod error;
pub mod partition;
pub mod reduce;
pub mod runtime;
pub mod sort;
pub mod stats;
pub mod store;
pub mod utils;

pub use api::{Emitter, Mapper, Partitioner, Reducer};
pub use config::Config;
pub use error::{Error, Result};
pub use partition::{default_hash_partition, HashPartitioner};
pub use reduce::ValueGroup;
pub use runtime::{run, MapReduce, Phase};
pub use sort::SortAlgorithm;
pub use stats::RunStats;
