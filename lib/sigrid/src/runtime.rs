use crate::api::{Emitter, Mapper, Partitioner, Reducer};
use crate::config::Config;
use crate::constants::{MAP_THREAD_PREFIX, REDUCE_THREAD_PREFIX, SORT_THREAD_PREFIX};
use crate::error::{panic_message, Error, Result};
use crate::partition::HashPartitioner;
use crate::reduce::{reduce_partition, Cursor, ReduceOutcome};
use crate::sort::{sort_partition, SortOutcome, SortedPartition};
use crate::stats::{MapStats, ReduceStats, RunStats, SortStats};
use crate::store::PartitionStore;
use crate::utils::millis;
use rayon::prelude::*;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info};

/// The stages of a run, in the only order they ever execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Map,
    Sort,
    Reduce,
    Teardown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::Map => "map",
            Phase::Sort => "sort",
            Phase::Reduce => "reduce",
            Phase::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

/// Everything a phase needs, passed explicitly to every worker. Nothing is global,
/// so independent runs may execute side by side in one process.
pub(crate) struct RunContext<'a> {
    mapper: &'a dyn Mapper,
    reducer: &'a dyn Reducer,
    partitioner: &'a dyn Partitioner,
    num_partitions: usize,
    config: &'a Config,
}

/// A configured job. Partitions default to one, partitioning to [`HashPartitioner`].
pub struct MapReduce<M, R, P = HashPartitioner> {
    inputs: Vec<String>,
    mapper: M,
    reducer: R,
    partitioner: P,
    num_mappers: usize,
    num_reducers: usize,
    config: Config,
}

impl<M: Mapper, R: Reducer> MapReduce<M, R> {
    pub fn new(mapper: M, reducer: R) -> Self {
        Self {
            inputs: Vec::new(),
            mapper,
            reducer,
            partitioner: HashPartitioner,
            num_mappers: 0,
            num_reducers: 1,
            config: Config::default(),
        }
    }
}

impl<M: Mapper, R: Reducer, P: Partitioner> MapReduce<M, R, P> {
    pub fn add_input(mut self, input: impl Into<String>) -> Self {
        self.inputs.push(input.into());
        self
    }

    pub fn inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.extend(inputs.into_iter().map(Into::into));
        self
    }

    /// Requested mapper count. Advisory only: the map phase always runs one mapper per input.
    pub fn num_mappers(mut self, n: usize) -> Self {
        self.num_mappers = n;
        self
    }

    pub fn num_reducers(mut self, n: usize) -> Self {
        self.num_reducers = n;
        self
    }

    pub fn partitioner<Q: Partitioner>(self, partitioner: Q) -> MapReduce<M, R, Q> {
        MapReduce {
            inputs: self.inputs,
            mapper: self.mapper,
            reducer: self.reducer,
            partitioner,
            num_mappers: self.num_mappers,
            num_reducers: self.num_reducers,
            config: self.config,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn run(&self) -> Result<RunStats> {
        let ctx = RunContext {
            mapper: &self.mapper,
            reducer: &self.reducer,
            partitioner: &self.partitioner,
            num_partitions: self.num_reducers,
            config: &self.config,
        };
        execute(&ctx, self.inputs.as_slice(), self.num_mappers)
    }

    /// Hands back the reducer, e.g. to flush outputs it accumulated during the run.
    pub fn into_reducer(self) -> R {
        self.reducer
    }
}

/// Runs `mapper` over every input, then `reducer` over every partition, and returns
/// once all phases and teardown are complete.
pub fn run<M, R, P, S>(inputs: &[S], mapper: &M, num_mappers: usize, reducer: &R, num_reducers: usize, partitioner: &P) -> Result<RunStats>
where
    M: Mapper,
    R: Reducer,
    P: Partitioner,
    S: AsRef<str>,
{
    let config = Config::default();
    let ctx = RunContext { mapper, reducer, partitioner, num_partitions: num_reducers, config: &config };
    execute(&ctx, inputs, num_mappers)
}

fn execute<S: AsRef<str>>(ctx: &RunContext<'_>, inputs: &[S], requested_mappers: usize) -> Result<RunStats> {
    let run_start = Instant::now();

    // Init
    if ctx.num_partitions == 0 {
        return Err(Error::InvalidConfig("at least one reducer is required".into()));
    }
    if requested_mappers != inputs.len() {
        debug!(requested_mappers, inputs = inputs.len(), "mapper count follows input count");
    }
    info!(
        phase = %Phase::Init,
        inputs = inputs.len(),
        partitions = ctx.num_partitions,
        sort = ?ctx.config.sort,
        max_threads = ctx.config.max_threads.unwrap_or(0),
        "Sigrid starting map phase"
    );
    let store = PartitionStore::new(ctx.num_partitions, ctx.partitioner);

    // Map
    let map_start = Instant::now();
    let files: Vec<&str> = inputs.iter().map(AsRef::as_ref).collect();
    let task_ms = run_phase(ctx, Phase::Map, MAP_THREAD_PREFIX, files, |task_id, file| {
        let task_start = Instant::now();
        debug!(task_id, file, "map task starting");
        ctx.mapper.map(file, &Emitter::new(&store));
        millis(task_start.elapsed())
    })?;
    if let Some(m) = store.misroute() {
        return Err(Error::PartitionOutOfRange { key: m.key.clone(), partition: m.partition, num_partitions: ctx.num_partitions });
    }
    let map = MapStats::record(
        requested_mappers,
        &task_ms,
        store.total_entries() as u64,
        store.dropped_empty_keys(),
        millis(map_start.elapsed()),
    );
    info!(phase = %Phase::Map,
          tasks = map.tasks, total_emits = map.total_emits, dropped_empty_keys = map.dropped_empty_keys,
          min_task_ms = map.min_task_ms, max_task_ms = map.max_task_ms,
          wall_ms = map.wall_ms,
          "Map phase complete");

    // Sort
    let sort_start = Instant::now();
    let arenas: Vec<_> = store.into_partitions().into_iter().enumerate().collect();
    let sorted_with_outcomes = run_phase(ctx, Phase::Sort, SORT_THREAD_PREFIX, arenas, |_, (pn, entries)| {
        let (sorted, outcome) = sort_partition(pn, entries, ctx.config.sort);
        debug!(partition = pn, entries = outcome.entries, comparisons = outcome.comparisons, sort_ms = outcome.sort_ms, "partition sorted");
        (sorted, outcome)
    })?;
    let (sorted, sort_outcomes): (Vec<SortedPartition>, Vec<SortOutcome>) = sorted_with_outcomes.into_iter().unzip();
    let sort = SortStats::record(ctx.config.sort, &sort_outcomes, millis(sort_start.elapsed()));
    info!(phase = %Phase::Sort,
          partitions = sort.partitions, total_entries = sort.total_entries, total_comparisons = sort.total_comparisons,
          max_partition_entries = sort.max_partition_entries,
          min_partition_ms = sort.min_partition_ms, max_partition_ms = sort.max_partition_ms,
          wall_ms = sort.wall_ms,
          "Sort phase complete");

    // Reduce: each cursor starts at its partition's sorted head and moves into its reducer thread
    let reduce_start = Instant::now();
    let cursors: Vec<Cursor<'_>> = sorted.iter().map(Cursor::new).collect();
    let reduce_outcomes: Vec<ReduceOutcome> = run_phase(ctx, Phase::Reduce, REDUCE_THREAD_PREFIX, cursors, |_, cursor| {
        let outcome = reduce_partition(cursor, ctx.reducer);
        debug!(partition = outcome.partition, groups = outcome.groups, values_skipped = outcome.values_skipped, reduce_ms = outcome.reduce_ms, "partition reduced");
        outcome
    })?;
    let reduce = ReduceStats::record(&reduce_outcomes, millis(reduce_start.elapsed()));
    info!(phase = %Phase::Reduce,
          partitions = reduce.partitions, total_entries = reduce.total_entries, total_groups = reduce.total_groups,
          values_skipped = reduce.values_skipped,
          min_partition_ms = reduce.min_partition_ms, max_partition_ms = reduce.max_partition_ms,
          wall_ms = reduce.wall_ms,
          "Reduce phase complete");

    // Teardown
    let released = sort.total_entries;
    drop(sorted);
    let stats = RunStats {
        partitions: ctx.num_partitions,
        map,
        sort,
        reduce,
        wall_ms: millis(run_start.elapsed()),
        sort_by_partition: if ctx.config.partition_stats { sort_outcomes } else { Vec::new() },
        reduce_by_partition: if ctx.config.partition_stats { reduce_outcomes } else { Vec::new() },
    };
    info!(phase = %Phase::Teardown, released_entries = released, wall_ms = stats.wall_ms, "Run complete");
    Ok(stats)
}

/// Runs `work` once per unit and returns the outputs in unit order. Returns only after
/// every started worker has finished, even when one of them fails.
fn run_phase<T, O, F>(ctx: &RunContext<'_>, phase: Phase, prefix: &'static str, units: Vec<T>, work: F) -> Result<Vec<O>>
where
    T: Send,
    O: Send,
    F: Fn(usize, T) -> O + Sync,
{
    match ctx.config.max_threads {
        Some(max_threads) => run_on_pool(ctx, phase, prefix, max_threads, units, work),
        None => run_thread_per_unit(ctx, phase, prefix, units, work),
    }
}

fn run_thread_per_unit<T, O, F>(ctx: &RunContext<'_>, phase: Phase, prefix: &'static str, units: Vec<T>, work: F) -> Result<Vec<O>>
where
    T: Send,
    O: Send,
    F: Fn(usize, T) -> O + Sync,
{
    let work = &work;
    thread::scope(|s| {
        let mut handles = Vec::with_capacity(units.len());
        let mut failure: Option<Error> = None;
        for (unit, item) in units.into_iter().enumerate() {
            let mut builder = thread::Builder::new().name(format!("{prefix}-{unit}"));
            if let Some(stack_size) = ctx.config.stack_size {
                builder = builder.stack_size(stack_size);
            }
            match builder.spawn_scoped(s, move || work(unit, item)) {
                Ok(handle) => handles.push((unit, handle)),
                Err(source) => {
                    error!(%phase, unit, "spawn failed: {}", source);
                    failure = Some(Error::Spawn { phase, unit, source });
                    break;
                }
            }
        }

        // Barrier: join everything that was started before reporting anything.
        let mut outputs = Vec::with_capacity(handles.len());
        for (unit, handle) in handles {
            match handle.join() {
                Ok(output) => outputs.push(output),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(%phase, unit, "worker panicked: {}", message);
                    if failure.is_none() {
                        failure = Some(Error::WorkerPanicked { phase, unit, message });
                    }
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(outputs),
        }
    })
}

fn run_on_pool<T, O, F>(ctx: &RunContext<'_>, phase: Phase, prefix: &'static str, max_threads: usize, units: Vec<T>, work: F) -> Result<Vec<O>>
where
    T: Send,
    O: Send,
    F: Fn(usize, T) -> O + Sync,
{
    let mut builder = rayon::ThreadPoolBuilder::new()
        .num_threads(max_threads.max(1))
        .thread_name(move |i| format!("{prefix}-pool-{i}"));
    if let Some(stack_size) = ctx.config.stack_size {
        builder = builder.stack_size(stack_size);
    }
    let pool = builder.build().map_err(|e| Error::Pool { phase, message: e.to_string() })?;

    let results: Vec<thread::Result<O>> = pool.install(|| {
        units
            .into_par_iter()
            .enumerate()
            .map(|(unit, item)| catch_unwind(AssertUnwindSafe(|| work(unit, item))))
            .collect()
    });

    let mut outputs = Vec::with_capacity(results.len());
    let mut failure: Option<Error> = None;
    for (unit, result) in results.into_iter().enumerate() {
        match result {
            Ok(output) => outputs.push(output),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(%phase, unit, "worker panicked: {}", message);
                if failure.is_none() {
                    failure = Some(Error::WorkerPanicked { phase, unit, message });
                }
            }
        }
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(outputs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::ValueGroup;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn word_mapper(name: &str, emitter: &Emitter<'_>) {
        for word in name.split('-') {
            emitter.emit(word, "1");
        }
    }

    #[test]
    fn phase_names() {
        let names: Vec<String> = [Phase::Init, Phase::Map, Phase::Sort, Phase::Reduce, Phase::Teardown]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(names, ["init", "map", "sort", "reduce", "teardown"]);
    }

    #[test]
    fn zero_reducers_is_rejected() {
        let reducer = |_: &str, _: &mut ValueGroup<'_, '_>, _: usize| {};
        let err = run(&["a"], &word_mapper, 1, &reducer, 0, &HashPartitioner).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn mapper_count_follows_inputs() {
        let calls = AtomicUsize::new(0);
        let mapper = |_: &str, _: &Emitter<'_>| {
            calls.fetch_add(1, Ordering::SeqCst);
        };
        let reducer = |_: &str, _: &mut ValueGroup<'_, '_>, _: usize| {};
        let stats = run(&["a", "b", "c"], &mapper, 10, &reducer, 2, &HashPartitioner).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(stats.map.tasks, 3);
        assert_eq!(stats.map.requested_mappers, 10);
    }

    #[test]
    fn no_inputs_completes_with_no_reduce_calls() {
        let reducer = |_: &str, _: &mut ValueGroup<'_, '_>, _: usize| panic!("nothing to reduce");
        let stats = run::<_, _, _, &str>(&[], &word_mapper, 4, &reducer, 3, &HashPartitioner).unwrap();
        assert_eq!(stats.reduce.total_groups, 0);
        assert_eq!(stats.sort.partitions, 3);
    }

    #[test]
    fn counts_words_across_partitions() {
        let counts = Mutex::new(BTreeMap::new());
        let reducer = |key: &str, values: &mut ValueGroup<'_, '_>, _: usize| {
            counts.lock().unwrap().insert(key.to_string(), values.count());
        };
        let stats = MapReduce::new(word_mapper, reducer)
            .inputs(["cat-dog", "cat-emu-cat"])
            .num_reducers(3)
            .run()
            .unwrap();
        drop(stats);
        let counts = counts.into_inner().unwrap();
        assert_eq!(counts.get("cat"), Some(&3));
        assert_eq!(counts.get("dog"), Some(&1));
        assert_eq!(counts.get("emu"), Some(&1));
    }

    #[test]
    fn mapper_panic_is_reported_after_the_barrier() {
        let finished = AtomicUsize::new(0);
        let mapper = |name: &str, emitter: &Emitter<'_>| {
            if name == "bad" {
                panic!("cannot read {name}");
            }
            emitter.emit(name, "1");
            finished.fetch_add(1, Ordering::SeqCst);
        };
        let reducer = |_: &str, _: &mut ValueGroup<'_, '_>, _: usize| panic!("reduce must not run");
        let err = run(&["ok1", "bad", "ok2"], &mapper, 3, &reducer, 2, &HashPartitioner).unwrap_err();
        match err {
            Error::WorkerPanicked { phase, unit, message } => {
                assert_eq!(phase, Phase::Map);
                assert_eq!(unit, 1);
                assert_eq!(message, "cannot read bad");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reducer_panic_on_pool_is_reported() {
        let reducer = |key: &str, _: &mut ValueGroup<'_, '_>, _: usize| {
            if key == "boom" {
                panic!("bad key");
            }
        };
        let err = MapReduce::new(word_mapper, reducer)
            .add_input("boom-fine")
            .num_reducers(1)
            .config(Config::default().with_max_threads(2))
            .run()
            .unwrap_err();
        assert!(matches!(err, Error::WorkerPanicked { phase: Phase::Reduce, unit: 0, .. }), "{err}");
    }

    #[test]
    fn out_of_range_partitioner_fails_the_run() {
        let reducer = |_: &str, _: &mut ValueGroup<'_, '_>, _: usize| {};
        let err = run(&["a-b"], &word_mapper, 1, &reducer, 2, &|_: &str, _: usize| 7usize).unwrap_err();
        assert!(matches!(err, Error::PartitionOutOfRange { partition: 7, num_partitions: 2, .. }), "{err}");
    }

    #[test]
    fn unspawnable_stack_size_fails_the_map_phase() {
        let reducer = |_: &str, _: &mut ValueGroup<'_, '_>, _: usize| panic!("reduce must not run");
        let err = MapReduce::new(word_mapper, reducer)
            .inputs(["a-b", "c"])
            .num_reducers(2)
            .config(Config::default().with_stack_size(usize::MAX / 2))
            .run()
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { phase: Phase::Map, unit: 0, .. }), "{err}");
    }

    #[test]
    fn explicit_stack_size_runs_to_completion() {
        let reducer = |_: &str, values: &mut ValueGroup<'_, '_>, _: usize| values.for_each(drop);
        for config in [
            Config::default().with_stack_size(4 << 20),
            Config::default().with_stack_size(4 << 20).with_max_threads(2),
        ] {
            let stats = MapReduce::new(word_mapper, reducer)
                .inputs(["a-b", "b-c"])
                .num_reducers(2)
                .config(config)
                .run()
                .unwrap();
            assert_eq!(stats.reduce.total_groups, 3);
        }
    }

    #[test]
    fn partition_stats_are_opt_in() {
        let reducer = |_: &str, values: &mut ValueGroup<'_, '_>, _: usize| values.for_each(drop);
        let plain = MapReduce::new(word_mapper, reducer).add_input("a-b-c").num_reducers(2).run().unwrap();
        assert!(plain.sort_by_partition.is_empty());
        let detailed = MapReduce::new(word_mapper, reducer)
            .add_input("a-b-c")
            .num_reducers(2)
            .config(Config::default().with_partition_stats(true))
            .run()
            .unwrap();
        assert_eq!(detailed.sort_by_partition.len(), 2);
        assert_eq!(detailed.reduce_by_partition.len(), 2);
        assert_eq!(detailed.reduce.values_consumed, 3);
    }
}
