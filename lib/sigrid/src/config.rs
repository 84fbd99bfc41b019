use crate::constants::{ENV_MAX_THREADS, ENV_PARTITION_STATS, ENV_SORT_ALGORITHM, ENV_THREAD_STACK_BYTES, MAX_THREADS_AUTO};
use crate::sort::SortAlgorithm;
use crate::utils::{is_truthy, parse_positive};
use anyhow::{Context, Result};

/// Engine tuning. The default runs one thread per unit of work, as the phases describe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub sort: SortAlgorithm,
    /// Caps each phase at this many worker threads (a shared pool) instead of one per unit.
    pub max_threads: Option<usize>,
    /// Stack size for spawned workers; platform default when unset.
    pub stack_size: Option<usize>,
    /// Keep per-partition sort/reduce outcomes in the run statistics.
    pub partition_stats: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();
        if let Some(v) = lookup(ENV_SORT_ALGORITHM) {
            config.sort = v.parse::<SortAlgorithm>().map_err(anyhow::Error::msg).with_context(|| format!("parse {ENV_SORT_ALGORITHM}"))?;
        }
        if let Some(v) = lookup(ENV_MAX_THREADS) {
            config.max_threads = if v.trim().eq_ignore_ascii_case(MAX_THREADS_AUTO) {
                Some(num_cpus::get().max(1))
            } else {
                Some(parse_positive(ENV_MAX_THREADS, &v)?)
            };
        }
        if let Some(v) = lookup(ENV_THREAD_STACK_BYTES) {
            config.stack_size = Some(parse_positive(ENV_THREAD_STACK_BYTES, &v)?);
        }
        config.partition_stats = lookup(ENV_PARTITION_STATS).map(|v| is_truthy(&v)).unwrap_or(false);
        Ok(config)
    }

    pub fn with_sort(mut self, sort: SortAlgorithm) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = Some(max_threads);
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    pub fn with_partition_stats(mut self, enabled: bool) -> Self {
        self.partition_stats = enabled;
        self
    }
}
