use crate::reduce::ReduceOutcome;
use crate::sort::{SortAlgorithm, SortOutcome};
use serde::Serialize;

#[derive(Default, Clone, Debug, Serialize)]
pub struct MapStats {
    pub tasks: usize,
    pub requested_mappers: usize,
    pub total_emits: u64,
    pub dropped_empty_keys: u64,
    pub min_task_ms: u64,
    pub max_task_ms: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct SortStats {
    pub algorithm: SortAlgorithm,
    pub partitions: usize,
    pub total_entries: u64,
    pub total_comparisons: u64,
    pub max_partition_entries: u64,
    pub min_partition_ms: u64,
    pub max_partition_ms: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct ReduceStats {
    pub partitions: usize,
    pub total_entries: u64,
    pub total_groups: u64,
    pub values_consumed: u64,
    pub values_skipped: u64,
    pub min_partition_ms: u64,
    pub max_partition_ms: u64,
    pub wall_ms: u64,
}

/// Summary of one completed run.
#[derive(Default, Clone, Debug, Serialize)]
pub struct RunStats {
    pub partitions: usize,
    pub map: MapStats,
    pub sort: SortStats,
    pub reduce: ReduceStats,
    pub wall_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort_by_partition: Vec<SortOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reduce_by_partition: Vec<ReduceOutcome>,
}

impl MapStats {
    pub fn record(requested_mappers: usize, task_ms: &[u64], total_emits: u64, dropped_empty_keys: u64, wall_ms: u64) -> Self {
        Self {
            tasks: task_ms.len(),
            requested_mappers,
            total_emits,
            dropped_empty_keys,
            min_task_ms: task_ms.iter().copied().min().unwrap_or(0),
            max_task_ms: task_ms.iter().copied().max().unwrap_or(0),
            wall_ms,
        }
    }
}

impl SortStats {
    pub fn record(algorithm: SortAlgorithm, per_partition: &[SortOutcome], wall_ms: u64) -> Self {
        Self {
            algorithm,
            partitions: per_partition.len(),
            total_entries: per_partition.iter().map(|s| s.entries).sum(),
            total_comparisons: per_partition.iter().map(|s| s.comparisons).sum(),
            max_partition_entries: per_partition.iter().map(|s| s.entries).max().unwrap_or(0),
            min_partition_ms: per_partition.iter().map(|s| s.sort_ms).min().unwrap_or(0),
            max_partition_ms: per_partition.iter().map(|s| s.sort_ms).max().unwrap_or(0),
            wall_ms,
        }
    }
}

impl ReduceStats {
    pub fn record(per_partition: &[ReduceOutcome], wall_ms: u64) -> Self {
        Self {
            partitions: per_partition.len(),
            total_entries: per_partition.iter().map(|r| r.entries).sum(),
            total_groups: per_partition.iter().map(|r| r.groups).sum(),
            values_consumed: per_partition.iter().map(|r| r.values_consumed).sum(),
            values_skipped: per_partition.iter().map(|r| r.values_skipped).sum(),
            min_partition_ms: per_partition.iter().map(|r| r.reduce_ms).min().unwrap_or(0),
            max_partition_ms: per_partition.iter().map(|r| r.reduce_ms).max().unwrap_or(0),
            wall_ms,
        }
    }
}
