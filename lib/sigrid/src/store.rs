use crate::api::Partitioner;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing::warn;

/// One emitted pair. Owned by the store from emission until teardown and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    key: Box<str>,
    value: Box<str>,
}

impl Entry {
    pub fn new(key: &str, value: &str) -> Self {
        Self { key: key.into(), value: value.into() }
    }

    pub fn key(&self) -> &str { &self.key }

    pub fn value(&self) -> &str { &self.value }
}

/// First routing violation seen during the map phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Misroute {
    pub key: String,
    pub partition: usize,
}

struct Partition {
    // Arena in emission order; an entry's position is its id for the rest of the run.
    entries: Mutex<Vec<Entry>>,
}

/// The intermediate store for one run: one independently locked arena per reducer.
/// Emissions into different partitions never contend; there is no store-wide lock.
pub struct PartitionStore<'p> {
    partitions: Vec<Partition>,
    partitioner: &'p dyn Partitioner,
    dropped_empty_keys: AtomicU64,
    misroute: OnceLock<Misroute>,
}

impl<'p> PartitionStore<'p> {
    pub fn new(num_partitions: usize, partitioner: &'p dyn Partitioner) -> Self {
        let partitions = (0..num_partitions).map(|_| Partition { entries: Mutex::new(Vec::new()) }).collect();
        Self { partitions, partitioner, dropped_empty_keys: AtomicU64::new(0), misroute: OnceLock::new() }
    }

    pub fn num_partitions(&self) -> usize { self.partitions.len() }

    /// The emission path. Safe to call from any number of map threads at once.
    pub fn emit(&self, key: &str, value: &str) {
        if key.is_empty() {
            self.dropped_empty_keys.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let pn = self.partitioner.partition(key, self.partitions.len());
        let Some(partition) = self.partitions.get(pn) else {
            if self.misroute.set(Misroute { key: key.to_string(), partition: pn }).is_ok() {
                warn!(key, partition = pn, num_partitions = self.partitions.len(), "partitioner returned an out-of-range bucket");
            }
            return;
        };
        // Copy before taking the lock so the critical section is a single push.
        let entry = Entry::new(key, value);
        // A poisoned lock only means another mapper panicked; the arena itself is intact
        // and the panic is reported when that thread is joined.
        partition.entries.lock().unwrap_or_else(PoisonError::into_inner).push(entry);
    }

    pub fn partition_len(&self, pn: usize) -> usize {
        self.partitions
            .get(pn)
            .map(|p| p.entries.lock().unwrap_or_else(PoisonError::into_inner).len())
            .unwrap_or(0)
    }

    pub fn total_entries(&self) -> usize {
        (0..self.partitions.len()).map(|pn| self.partition_len(pn)).sum()
    }

    pub fn dropped_empty_keys(&self) -> u64 { self.dropped_empty_keys.load(Ordering::Relaxed) }

    pub fn misroute(&self) -> Option<&Misroute> { self.misroute.get() }

    /// Closes the map phase: hands each partition's arena to its sole owner for sort and reduce.
    pub fn into_partitions(self) -> Vec<Vec<Entry>> {
        self.partitions
            .into_iter()
            .map(|p| p.entries.into_inner().unwrap_or_else(PoisonError::into_inner))
            .collect()
    }
}
