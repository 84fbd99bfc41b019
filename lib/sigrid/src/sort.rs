use crate::store::Entry;
use serde::Serialize;
use std::cmp::Ordering;
use std::str::FromStr;
use std::time::Instant;

/// How a partition is ordered by key. Both variants are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortAlgorithm {
    /// Insertion into a growing sorted run. Quadratic on large partitions.
    #[default]
    Insertion,
    /// The standard library's stable merge sort over the order array.
    Merge,
}

impl FromStr for SortAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insertion" => Ok(Self::Insertion),
            "merge" => Ok(Self::Merge),
            other => Err(format!("unknown sort algorithm {other:?} (expected insertion or merge)")),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct SortOutcome {
    pub partition: usize,
    pub entries: u64,
    pub comparisons: u64,
    pub sort_ms: u64,
}

/// A partition after the sort barrier: the arena untouched, plus the order it is read in.
#[derive(Debug)]
pub struct SortedPartition {
    index: usize,
    entries: Vec<Entry>,
    order: Vec<usize>,
}

impl SortedPartition {
    pub fn index(&self) -> usize { self.index }

    pub fn len(&self) -> usize { self.order.len() }

    pub fn is_empty(&self) -> bool { self.order.is_empty() }

    /// Entry at sorted position `pos`.
    pub fn get(&self, pos: usize) -> Option<&Entry> {
        self.order.get(pos).map(|&id| &self.entries[id])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> + '_ {
        self.order.iter().map(move |&id| &self.entries[id])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.iter().map(Entry::key)
    }

    pub fn is_sorted(&self) -> bool {
        self.order
            .windows(2)
            .all(|w| self.entries[w[0]].key() <= self.entries[w[1]].key())
    }
}

/// Orders one partition by key (byte-wise) without moving any entry.
/// Equal keys keep their emission order.
pub fn sort_partition(index: usize, entries: Vec<Entry>, algorithm: SortAlgorithm) -> (SortedPartition, SortOutcome) {
    let start = Instant::now();
    let mut comparisons: u64 = 0;
    let mut cmp = |a: usize, b: usize| {
        comparisons += 1;
        entries[a].key().as_bytes().cmp(entries[b].key().as_bytes())
    };
    let n = entries.len();
    let order = match algorithm {
        SortAlgorithm::Insertion => insertion_order(n, &mut cmp),
        SortAlgorithm::Merge => {
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by(|&a, &b| cmp(a, b));
            order
        }
    };
    let outcome = SortOutcome {
        partition: index,
        entries: order.len() as u64,
        comparisons,
        sort_ms: start.elapsed().as_millis() as u64,
    };
    (SortedPartition { index, entries, order }, outcome)
}

// Each id is placed after every id already in the run whose key is <= its own,
// which keeps equal keys in arrival order.
fn insertion_order(n: usize, cmp: &mut impl FnMut(usize, usize) -> Ordering) -> Vec<usize> {
    let mut sorted: Vec<usize> = Vec::with_capacity(n);
    for id in 0..n {
        let mut pos = sorted.len();
        while pos > 0 && cmp(sorted[pos - 1], id) == Ordering::Greater {
            pos -= 1;
        }
        sorted.insert(pos, id);
    }
    sorted
}
