//! Running a configured GEMM on worker threads.
//!
//! [`schedule`] splits every stage's window with [`ThreadPartitioner`]
//! and hands one workload per non-empty range to a [`Scheduler`]. A
//! scheduler returns only when all workloads have finished, which is the
//! barrier between stages.

use crate::driver::{GemmCommon, ThreadInfo};
use gemm_core::{CpuInfo, ThreadPartitioner};
use tracing::trace;

#[cfg(feature = "parallel")]
use crate::error::{GemmError, Result};

/// One unit of work, run with the identity of the worker executing it.
pub type Workload<'a> = Box<dyn FnOnce(&ThreadInfo) + Send + 'a>;

/// Executes batches of workloads.
pub trait Scheduler {
    /// Maximum number of workloads run concurrently.
    fn num_threads(&self) -> usize;

    /// Run every workload and return once all have finished.
    ///
    /// Workload `i` is run with `thread_id == i`.
    fn run_workloads(&self, workloads: Vec<Workload<'_>>);
}

/// Runs workloads one after another on the calling thread.
#[derive(Debug, Clone, Copy)]
pub struct SingleThreadScheduler {
    cpu_info: CpuInfo,
}

impl SingleThreadScheduler {
    pub fn new(cpu_info: &CpuInfo) -> Self {
        Self {
            cpu_info: *cpu_info,
        }
    }
}

impl Scheduler for SingleThreadScheduler {
    fn num_threads(&self) -> usize {
        1
    }

    fn run_workloads(&self, workloads: Vec<Workload<'_>>) {
        let num_threads = workloads.len();
        for (thread_id, work) in workloads.into_iter().enumerate() {
            work(&ThreadInfo::new(thread_id, num_threads, self.cpu_info));
        }
    }
}

/// Runs workloads on a rayon pool.
///
/// Either owns a dedicated pool or borrows the global one.
#[cfg(feature = "parallel")]
pub struct RayonScheduler {
    pool: Option<rayon::ThreadPool>,
    num_threads: usize,
    cpu_info: CpuInfo,
}

#[cfg(feature = "parallel")]
impl RayonScheduler {
    /// A scheduler with its own pool of `num_threads` workers.
    pub fn new(num_threads: usize, cpu_info: &CpuInfo) -> Result<Self> {
        let num_threads = num_threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("gemm-worker-{i}"))
            .build()
            .map_err(|e| GemmError::ThreadPool(e.to_string()))?;
        Ok(Self {
            pool: Some(pool),
            num_threads,
            cpu_info: *cpu_info,
        })
    }

    /// A scheduler on rayon's global pool.
    pub fn global(cpu_info: &CpuInfo) -> Self {
        Self {
            pool: None,
            num_threads: rayon::current_num_threads(),
            cpu_info: *cpu_info,
        }
    }
}

#[cfg(feature = "parallel")]
impl Scheduler for RayonScheduler {
    fn num_threads(&self) -> usize {
        self.num_threads
    }

    fn run_workloads(&self, workloads: Vec<Workload<'_>>) {
        let num_threads = workloads.len();
        let cpu_info = self.cpu_info;
        match &self.pool {
            Some(pool) => pool.scope(|s| {
                for (thread_id, work) in workloads.into_iter().enumerate() {
                    s.spawn(move |_| work(&ThreadInfo::new(thread_id, num_threads, cpu_info)));
                }
            }),
            None => rayon::scope(|s| {
                for (thread_id, work) in workloads.into_iter().enumerate() {
                    s.spawn(move |_| work(&ThreadInfo::new(thread_id, num_threads, cpu_info)));
                }
            }),
        }
    }
}

/// The scheduler used when none is given: the global rayon pool when the
/// `parallel` feature is enabled, the calling thread otherwise.
pub fn default_scheduler(cpu_info: &CpuInfo) -> Box<dyn Scheduler> {
    #[cfg(feature = "parallel")]
    {
        Box::new(RayonScheduler::global(cpu_info))
    }
    #[cfg(not(feature = "parallel"))]
    {
        Box::new(SingleThreadScheduler::new(cpu_info))
    }
}

/// Run every stage of `gemm`, one barrier per stage.
///
/// The number of workers is the smaller of the scheduler's and the GEMM's
/// thread counts.
pub fn schedule<To: 'static, Tout: 'static>(gemm: &dyn GemmCommon<To, Tout>, scheduler: &dyn Scheduler) {
    let threads = scheduler.num_threads().min(gemm.num_threads()).max(1);
    for stage in 0..gemm.num_stages() {
        let window = gemm.stage_window(stage);
        if window == 0 {
            continue;
        }
        let granule = gemm.stage_granule(stage);
        let workloads: Vec<Workload<'_>> = ThreadPartitioner::partition(window, granule, threads)
            .into_iter()
            .filter(|range| !range.is_empty())
            .map(|range| -> Workload<'_> {
                Box::new(move |info: &ThreadInfo| gemm.execute_stage(stage, range, info))
            })
            .collect();
        trace!(stage, window, granule, workers = workloads.len(), "running gemm stage");
        scheduler.run_workloads(workloads);
    }
}
