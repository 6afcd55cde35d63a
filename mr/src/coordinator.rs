use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Phase, Result};
use crate::kv::KvList;
use crate::partition::PartitionSet;
use crate::task::{Slice, Task, TaskStats, TaskStatus, TaskType};
use crate::worker::{do_map, do_reduce, panic_message, Mapper, Reducer};

/// Summary of one finished job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStats {
    pub num_mapper: usize,
    pub num_reducer: usize,
    pub records_in: usize,
    pub intermediate_pairs: usize,
    pub groups: usize,
    pub records_out: usize,
    pub map_ms: u64,
    pub reduce_ms: u64,
}

/// Splits `[0, total)` into `n_map` contiguous slices.
///
/// Every slice gets `total / n_map` records and the first `total % n_map`
/// slices get one more. With fewer records than workers the trailing slices
/// are empty.
pub fn compute_slices(total: usize, n_map: usize) -> Result<Vec<Slice>> {
    if n_map == 0 {
        return Err(Error::Configuration("num_mapper must be at least 1".into()));
    }
    let base = total / n_map;
    let mut remaining = total % n_map;
    let mut slices = Vec::with_capacity(n_map);
    let mut start = 0;
    for _ in 0..n_map {
        let size = base + usize::from(remaining > 0);
        remaining = remaining.saturating_sub(1);
        slices.push(Slice::new(start, start + size));
        start += size;
    }
    Ok(slices)
}

/// First-failure slot shared by the workers of one phase.
#[derive(Debug, Default)]
struct PhaseControl {
    aborted: AtomicBool,
    first_error: Mutex<Option<Error>>,
}

impl PhaseControl {
    fn fail(&self, err: Error) {
        let mut slot = self
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
        self.aborted.store(true, Ordering::Release);
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    fn finish(self) -> Result<()> {
        match self
            .first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Launches one thread per job and joins every thread that was started.
///
/// Once a worker fails no further jobs are launched; workers already running
/// see the abort flag and stop at their next record or group.
fn run_workers<W, F>(
    phase: Phase,
    jobs: Vec<(usize, W)>,
    control: &PhaseControl,
    work: F,
) -> Vec<(usize, Option<TaskStats>)>
where
    W: Send,
    F: Fn(usize, W, &AtomicBool) -> Result<Option<TaskStats>> + Sync,
{
    let work = &work;
    thread::scope(|s| {
        let mut handles = Vec::with_capacity(jobs.len());
        for (task_id, payload) in jobs {
            if control.is_aborted() {
                debug!(%phase, task_id, "not starting task after failure");
                break;
            }
            let spawned = thread::Builder::new()
                .name(format!("mr-{phase}-{task_id}"))
                .spawn_scoped(s, move || match work(task_id, payload, &control.aborted) {
                    Ok(stats) => stats,
                    Err(e) => {
                        control.fail(e);
                        None
                    }
                });
            match spawned {
                Ok(handle) => handles.push((task_id, handle)),
                Err(e) => {
                    control.fail(Error::Allocation(format!(
                        "spawning {phase} worker {task_id}: {e}"
                    )));
                    break;
                }
            }
        }

        handles
            .into_iter()
            .map(|(task_id, handle)| {
                let stats = handle.join().unwrap_or_else(|payload| {
                    control.fail(Error::Callback {
                        phase,
                        task_id,
                        source: anyhow::anyhow!("worker panicked: {}", panic_message(payload)),
                    });
                    None
                });
                (task_id, stats)
            })
            .collect()
    })
}

/// Drives one two-phase job: slice, map, barrier, reduce.
///
/// Map tasks have ids `1..=n_map`, reduce tasks `n_map + 1..=n_map + n_reduce`.
#[derive(Debug, Clone)]
pub struct Coordinator {
    n_map: usize,
    n_reduce: usize,
    tasks: Vec<Task>,
}

impl Coordinator {
    pub fn new(n_map: usize, n_reduce: usize) -> Result<Self> {
        EngineConfig {
            num_mapper: n_map,
            num_reducer: n_reduce,
        }
        .validate()?;
        Ok(Coordinator {
            n_map,
            n_reduce,
            tasks: vec![],
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Coordinator::new(config.num_mapper, config.num_reducer)
    }

    /// Task table of the most recent run.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    fn slice(&mut self, total: usize) -> Result<()> {
        for (i, slice) in compute_slices(total, self.n_map)?.into_iter().enumerate() {
            self.tasks.push(Task::new_map_task(i + 1, slice));
        }
        Ok(())
    }

    fn add_reduce_tasks(&mut self) {
        for p in 0..self.n_reduce {
            self.tasks
                .push(Task::new_reduce_task(p + 1 + self.n_map, p));
        }
    }

    fn record(&mut self, results: Vec<(usize, Option<TaskStats>)>) {
        for (task_id, stats) in results {
            let task = &mut self.tasks[task_id - 1];
            match stats {
                Some(stats) => {
                    task.set_task_output(stats);
                    task.set_status(TaskStatus::Done);
                }
                None => task.set_status(TaskStatus::Failed),
            }
        }
    }

    /// Marks tasks of `task_type` that never reported back as failed.
    fn fail_unfinished(&mut self, task_type: TaskType) {
        for task in self
            .tasks
            .iter_mut()
            .filter(|t| t.get_task_type() == task_type)
            .filter(|t| t.get_task_status() == TaskStatus::Ongoing)
        {
            task.set_status(TaskStatus::Failed);
        }
    }

    fn totals(&self, task_type: TaskType) -> TaskStats {
        self.tasks
            .iter()
            .filter(|t| t.get_task_type() == task_type)
            .filter_map(Task::get_task_output)
            .fold(TaskStats::default(), |acc, s| TaskStats {
                records_in: acc.records_in + s.records_in,
                groups: acc.groups + s.groups,
                records_out: acc.records_out + s.records_out,
            })
    }

    /// Runs the job to completion, appending reducer output to `output`.
    ///
    /// On a callback failure the failing phase stops launching workers,
    /// joins the ones already running and returns the first error. If the
    /// reduce phase fails, `output` keeps whatever reducers appended before
    /// the failure.
    pub fn run<M, R>(
        &mut self,
        mapper: &M,
        reducer: &R,
        input: &KvList,
        output: &mut KvList,
    ) -> Result<JobStats>
    where
        M: Mapper + ?Sized,
        R: Reducer + ?Sized,
    {
        self.tasks.clear();
        self.slice(input.len())?;
        self.add_reduce_tasks();
        let partitions = PartitionSet::new(self.n_reduce)?;

        info!(
            records = input.len(),
            num_mapper = self.n_map,
            num_reducer = self.n_reduce,
            "starting map phase"
        );
        let map_start = Instant::now();
        let jobs: Vec<(usize, Slice)> = self
            .tasks
            .iter_mut()
            .filter(|t| t.get_task_type() == TaskType::Map)
            .filter_map(|t| {
                t.set_status(TaskStatus::Ongoing);
                t.get_slice().map(|slice| (t.get_task_id(), slice))
            })
            .collect();
        let control = PhaseControl::default();
        let results = run_workers(Phase::Map, jobs, &control, |task_id, slice, aborted| {
            do_map(mapper, task_id, input, slice, &partitions, aborted)
        });
        self.record(results);
        if let Err(e) = control.finish() {
            warn!(error = %e, "map phase aborted");
            self.fail_unfinished(TaskType::Map);
            return Err(e);
        }
        let map_ms = map_start.elapsed().as_millis() as u64;
        let map_totals = self.totals(TaskType::Map);
        info!(
            records_in = map_totals.records_in,
            intermediate_pairs = map_totals.records_out,
            wall_ms = map_ms,
            "map phase complete"
        );

        // every map task is joined; partitions are final from here on
        for task in self
            .tasks
            .iter_mut()
            .filter(|t| t.get_task_type() == TaskType::Reduce)
        {
            task.set_status(TaskStatus::Init);
        }

        let reduce_start = Instant::now();
        let jobs: Vec<(usize, KvList)> = partitions
            .into_partitions()
            .into_iter()
            .enumerate()
            .map(|(p, partition)| {
                let task_id = p + 1 + self.n_map;
                self.tasks[task_id - 1].set_status(TaskStatus::Ongoing);
                (task_id, partition)
            })
            .collect();
        let output = Mutex::new(output);
        let control = PhaseControl::default();
        let results = run_workers(Phase::Reduce, jobs, &control, |task_id, partition, aborted| {
            do_reduce(reducer, task_id, partition, &output, aborted)
        });
        self.record(results);
        if let Err(e) = control.finish() {
            warn!(error = %e, "reduce phase aborted");
            self.fail_unfinished(TaskType::Reduce);
            return Err(e);
        }
        let reduce_ms = reduce_start.elapsed().as_millis() as u64;
        let reduce_totals = self.totals(TaskType::Reduce);
        info!(
            groups = reduce_totals.groups,
            records_out = reduce_totals.records_out,
            wall_ms = reduce_ms,
            "reduce phase complete"
        );

        Ok(JobStats {
            num_mapper: self.n_map,
            num_reducer: self.n_reduce,
            records_in: map_totals.records_in,
            intermediate_pairs: map_totals.records_out,
            groups: reduce_totals.groups,
            records_out: reduce_totals.records_out,
            map_ms,
            reduce_ms,
        })
    }
}

/// Runs a complete map-reduce job over `input`, appending results to
/// `output`. Blocks until every worker of both phases has been joined.
///
/// Fails with [`Error::Configuration`] before any thread starts if either
/// worker count is zero.
pub fn map_reduce<M, R>(
    mapper: &M,
    num_mapper: usize,
    reducer: &R,
    num_reducer: usize,
    input: &KvList,
    output: &mut KvList,
) -> Result<JobStats>
where
    M: Mapper + ?Sized,
    R: Reducer + ?Sized,
{
    Coordinator::new(num_mapper, num_reducer)?.run(mapper, reducer, input, output)
}
