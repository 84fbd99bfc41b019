//! Centralized environment variable names and default values for Sigrid runtime tuning.

// Environment variable names
pub const ENV_SORT_ALGORITHM: &str = "SIGRID_SORT";
pub const ENV_MAX_THREADS: &str = "SIGRID_MAX_THREADS";
pub const ENV_THREAD_STACK_BYTES: &str = "SIGRID_THREAD_STACK_BYTES";
pub const ENV_PARTITION_STATS: &str = "SIGRID_PARTITION_STATS";

/// Value of `SIGRID_MAX_THREADS` that sizes the worker pool to the machine.
pub const MAX_THREADS_AUTO: &str = "auto";

// Thread name prefixes, one per phase
pub const MAP_THREAD_PREFIX: &str = "sigrid-map";
pub const SORT_THREAD_PREFIX: &str = "sigrid-sort";
pub const REDUCE_THREAD_PREFIX: &str = "sigrid-reduce";
