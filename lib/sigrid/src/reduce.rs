use crate::api::Reducer;
use crate::sort::SortedPartition;
use serde::Serialize;
use std::time::Instant;
use tracing::debug;

/// Forward-only read position over one sorted partition.
/// Owned by the single reducer thread of that partition, so it needs no lock.
pub struct Cursor<'p> {
    partition: &'p SortedPartition,
    pos: usize,
}

impl<'p> Cursor<'p> {
    pub fn new(partition: &'p SortedPartition) -> Self {
        Self { partition, pos: 0 }
    }

    pub fn partition_index(&self) -> usize { self.partition.index() }

    /// Key of the entry under the cursor.
    pub fn peek_key(&self) -> Option<&'p str> {
        self.partition.get(self.pos).map(|e| e.key())
    }

    /// Returns the next value for `key` and advances, or `None` once the cursor is
    /// exhausted or sits on a different key. Never moves backwards.
    pub fn get_next(&mut self, key: &str) -> Option<&'p str> {
        let entry = self.partition.get(self.pos)?;
        if entry.key() != key {
            return None;
        }
        self.pos += 1;
        Some(entry.value())
    }

    /// Advances past every remaining entry for `key`, returning how many were skipped.
    pub fn skip_group(&mut self, key: &str) -> u64 {
        let mut skipped = 0;
        while self.get_next(key).is_some() {
            skipped += 1;
        }
        skipped
    }
}

/// The values of one key, handed to a single Reduce invocation.
/// It can only pull forward, and only within its own key's run.
pub struct ValueGroup<'c, 'p> {
    cursor: &'c mut Cursor<'p>,
    key: &'p str,
    pulled: u64,
}

impl<'c, 'p> ValueGroup<'c, 'p> {
    fn new(cursor: &'c mut Cursor<'p>, key: &'p str) -> Self {
        Self { cursor, key, pulled: 0 }
    }

    pub fn key(&self) -> &'p str { self.key }

    /// Index of the partition this group belongs to. Named apart from `Iterator::partition`.
    pub fn partition_index(&self) -> usize { self.cursor.partition_index() }

    /// Next value for this group's key, `None` once the run ends.
    pub fn get_next(&mut self) -> Option<&'p str> {
        let value = self.cursor.get_next(self.key)?;
        self.pulled += 1;
        Some(value)
    }
}

impl<'c, 'p> Iterator for ValueGroup<'c, 'p> {
    type Item = &'p str;

    fn next(&mut self) -> Option<Self::Item> {
        self.get_next()
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ReduceOutcome {
    pub partition: usize,
    pub entries: u64,
    pub groups: u64,
    pub values_consumed: u64,
    pub values_skipped: u64,
    pub reduce_ms: u64,
}

/// Walks the cursor's partition left to right and calls `reducer` once per distinct key.
/// The cursor itself drives the walk, so the last key of the partition is never missed.
pub fn reduce_partition<R: Reducer + ?Sized>(mut cursor: Cursor<'_>, reducer: &R) -> ReduceOutcome {
    let start = Instant::now();
    let partition = cursor.partition;
    let mut outcome = ReduceOutcome { partition: partition.index(), entries: partition.len() as u64, ..Default::default() };
    while let Some(key) = cursor.peek_key() {
        let mut group = ValueGroup::new(&mut cursor, key);
        reducer.reduce(key, &mut group, partition.index());
        outcome.values_consumed += group.pulled;
        outcome.groups += 1;
        let skipped = cursor.skip_group(key);
        if skipped > 0 {
            debug!(partition = partition.index(), key, skipped, "reducer left values unconsumed");
            outcome.values_skipped += skipped;
        }
    }
    outcome.reduce_ms = start.elapsed().as_millis() as u64;
    outcome
}
