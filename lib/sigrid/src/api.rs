use crate::reduce::ValueGroup;
use crate::store::PartitionStore;

// ========== Core MapReduce traits ==========

/// Mapper is called once per input file, with the file name as its unit of input.
/// It contributes intermediate pairs only through the emitter.
pub trait Mapper: Sync {
    fn map(&self, filename: &str, emitter: &Emitter<'_>);
}

impl<F> Mapper for F
where
    F: Fn(&str, &Emitter<'_>) + Sync,
{
    fn map(&self, filename: &str, emitter: &Emitter<'_>) {
        self(filename, emitter)
    }
}

/// Reducer is called once per distinct key of a partition, in ascending key order.
/// It should drain `values` before returning; whatever it leaves behind is skipped.
pub trait Reducer: Sync {
    fn reduce(&self, key: &str, values: &mut ValueGroup<'_, '_>, partition: usize);
}

impl<F> Reducer for F
where
    F: Fn(&str, &mut ValueGroup<'_, '_>, usize) + Sync,
{
    fn reduce(&self, key: &str, values: &mut ValueGroup<'_, '_>, partition: usize) {
        self(key, values, partition)
    }
}

/// Routes a key to a bucket in `0..num_partitions`. Must be pure for the duration of a run.
pub trait Partitioner: Sync {
    fn partition(&self, key: &str, num_partitions: usize) -> usize;
}

impl<F> Partitioner for F
where
    F: Fn(&str, usize) -> usize + Sync,
{
    fn partition(&self, key: &str, num_partitions: usize) -> usize {
        self(key, num_partitions)
    }
}

// ========== Emission handle ==========

/// Handle passed to a mapper for the duration of the map phase.
/// Cloning is not offered: the borrow ties every emission to the live store.
pub struct Emitter<'s> {
    store: &'s PartitionStore<'s>,
}

impl<'s> Emitter<'s> {
    pub(crate) fn new(store: &'s PartitionStore<'s>) -> Self {
        Self { store }
    }

    /// Copies `key` and `value` into the partition chosen by the active partitioner.
    /// Empty keys are dropped.
    pub fn emit(&self, key: &str, value: &str) {
        self.store.emit(key, value);
    }
}
