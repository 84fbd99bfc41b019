use crate::api::Partitioner;

const DJB2_SEED: u64 = 5381;

/// djb2 over the key bytes (seed 5381, multiplier 33), reduced modulo `num_partitions`.
/// Deterministic across runs and processes, unlike `DefaultHasher`.
pub fn default_hash_partition(key: &str, num_partitions: usize) -> usize {
    debug_assert!(num_partitions > 0, "num_partitions must be positive");
    let hash = key
        .bytes()
        .fold(DJB2_SEED, |h, b| h.wrapping_mul(33).wrapping_add(u64::from(b)));
    (hash % num_partitions.max(1) as u64) as usize
}

/// The default partitioner used when a job does not supply one.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashPartitioner;

impl Partitioner for HashPartitioner {
    fn partition(&self, key: &str, num_partitions: usize) -> usize {
        default_hash_partition(key, num_partitions)
    }
}
