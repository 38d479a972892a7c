//! Dynamic-concurrency worker pool.
//!
//! Runs jobs from an unbounded source with at most `N` admitted at once,
//! where `N` is the latest value of a `watch` channel.
//!
//! # Architecture
//!
//! - **Intake**: moves jobs from the source stream into a FIFO pending deque,
//!   so the source is never blocked by slow workers
//! - **Supervisor**: watches the desired count and worker exits, spawning
//!   workers into a `JoinSet` while fewer than `N` are live
//! - **Workers**: loop pull → run → report; retire when more than `N` are
//!   live, and never abandon a job once admitted
//!
//! # Concurrency Model
//!
//! - One `std::sync::Mutex` guards the deque and counters; it is never held
//!   across an await
//! - Wake-ups go through a `watch` generation counter: a task marks the
//!   generation seen *before* inspecting state, so a bump between the check
//!   and the wait is never lost
//! - Results travel on an unbounded channel; producers never wait on the
//!   consumer
//!
//! Setting `N` to 0 pauses admission without dropping pending jobs. Lowering
//! `N` bounds new admissions immediately; jobs already running finish first.

mod error;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

pub use error::SchedulerError;

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Latest desired worker count.
    pub desired: usize,
    /// Worker tasks currently alive (running or idle).
    pub live_workers: usize,
    /// Jobs admitted and not yet finished.
    pub running: usize,
    /// Jobs waiting for a worker.
    pub pending: usize,
    /// The source has ended (or the pool was cancelled).
    pub source_done: bool,
}

struct PoolState<J> {
    pending: VecDeque<J>,
    desired: usize,
    live: usize,
    running: usize,
    source_done: bool,
}

struct Shared<J> {
    state: Mutex<PoolState<J>>,
    wake: watch::Sender<u64>,
    cancel: CancellationToken,
}

enum Step<J> {
    Run(J),
    Wait,
    Retire,
}

impl<J> Shared<J> {
    fn lock(&self) -> MutexGuard<'_, PoolState<J>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bump the generation so every waiting task re-checks state.
    fn wake(&self) {
        self.wake.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    fn next_step(&self) -> Step<J> {
        let mut st = self.lock();
        if self.cancel.is_cancelled() || st.live > st.desired {
            st.live -= 1;
            return Step::Retire;
        }
        if st.running < st.desired {
            if let Some(job) = st.pending.pop_front() {
                st.running += 1;
                return Step::Run(job);
            }
        }
        if st.source_done && st.pending.is_empty() {
            st.live -= 1;
            return Step::Retire;
        }
        Step::Wait
    }
}

trait StatsSource: Send + Sync {
    fn stats(&self) -> SchedulerStats;
}

impl<J: Send> StatsSource for Shared<J> {
    fn stats(&self) -> SchedulerStats {
        let st = self.lock();
        SchedulerStats {
            desired: st.desired,
            live_workers: st.live,
            running: st.running,
            pending: st.pending.len(),
            source_done: st.source_done,
        }
    }
}

/// Entry point for spawning a pool.
pub struct DynamicScheduler;

impl DynamicScheduler {
    /// Spawn a pool that runs every job from `jobs` through `run`.
    ///
    /// Must be called within a Tokio runtime. Cancelling `cancel` stops
    /// intake and admission; admitted jobs are left to observe the token
    /// themselves.
    pub fn spawn<J, T, S, F, Fut>(
        jobs: S,
        desired: watch::Receiver<usize>,
        cancel: &CancellationToken,
        run: F,
    ) -> SchedulerHandle<T>
    where
        S: Stream<Item = J> + Send + 'static,
        J: Send + 'static,
        T: Send + 'static,
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let initial = *desired.borrow();
        let (wake, _) = watch::channel(0u64);
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                pending: VecDeque::new(),
                desired: initial,
                live: 0,
                running: 0,
                source_done: false,
            }),
            wake,
            cancel: cancel.child_token(),
        });
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        tokio::spawn(intake(jobs, Arc::clone(&shared)));
        let supervisor = tokio::spawn(supervise(
            Arc::clone(&shared),
            desired,
            Arc::new(run),
            results_tx,
        ));

        SchedulerHandle {
            results: results_rx,
            supervisor,
            stats: shared,
        }
    }
}

/// Handle to a running pool.
///
/// Results arrive in completion order. The result stream ends once the
/// source has ended, every job has finished, and every worker has exited;
/// [`join`](Self::join) then reports whether the pool itself failed.
pub struct SchedulerHandle<T> {
    results: mpsc::UnboundedReceiver<T>,
    supervisor: JoinHandle<Result<(), SchedulerError>>,
    stats: Arc<dyn StatsSource>,
}

impl<T> SchedulerHandle<T> {
    /// Next finished job's output, or `None` once the pool has finished.
    pub async fn next_result(&mut self) -> Option<T> {
        self.results.recv().await
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.stats()
    }

    /// Wait for the supervisor and report infrastructure failure.
    pub async fn join(self) -> Result<(), SchedulerError> {
        match self.supervisor.await {
            Ok(result) => result,
            Err(e) => Err(SchedulerError::Supervisor(e.to_string())),
        }
    }

    /// Drain every remaining result, then join.
    pub async fn collect(mut self) -> (Vec<T>, Result<(), SchedulerError>) {
        let mut outputs = Vec::new();
        while let Some(output) = self.results.recv().await {
            outputs.push(output);
        }
        let result = self.join().await;
        (outputs, result)
    }
}

async fn intake<J, S>(jobs: S, shared: Arc<Shared<J>>)
where
    S: Stream<Item = J>,
{
    let mut jobs = pin!(jobs);
    loop {
        let next = tokio::select! {
            biased;
            () = shared.cancel.cancelled() => None,
            next = jobs.next() => next,
        };
        let Some(job) = next else { break };
        shared.lock().pending.push_back(job);
        shared.wake();
    }
    shared.lock().source_done = true;
    shared.wake();
}

async fn supervise<J, T, F, Fut>(
    shared: Arc<Shared<J>>,
    mut desired: watch::Receiver<usize>,
    run: Arc<F>,
    results: mpsc::UnboundedSender<T>,
) -> Result<(), SchedulerError>
where
    J: Send + 'static,
    T: Send + 'static,
    F: Fn(J) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    let mut workers = JoinSet::new();
    let mut wake_rx = shared.wake.subscribe();
    let mut signal_open = true;
    let mut last_desired = None;

    loop {
        wake_rx.borrow_and_update();

        let (to_spawn, now_desired) = {
            let mut st = shared.lock();
            if signal_open {
                st.desired = *desired.borrow_and_update();
            }
            let stopping =
                shared.cancel.is_cancelled() || (st.source_done && st.pending.is_empty());
            if stopping && st.live == 0 {
                break;
            }
            if !signal_open && !stopping && st.desired == 0 && !st.pending.is_empty() {
                let pending = st.pending.len();
                drop(st);
                shared.cancel.cancel();
                error!(target: "tanko.download", pending, "Worker count signal closed while paused");
                return Err(SchedulerError::SignalClosed { pending });
            }
            let to_spawn = if stopping {
                0
            } else {
                st.desired.saturating_sub(st.live)
            };
            st.live += to_spawn;
            (to_spawn, st.desired)
        };

        for _ in 0..to_spawn {
            workers.spawn(worker_loop(
                Arc::clone(&shared),
                Arc::clone(&run),
                results.clone(),
            ));
        }

        if last_desired != Some(now_desired) {
            if last_desired.is_some() {
                debug!(
                    target: "tanko.download",
                    desired = now_desired,
                    spawned = to_spawn,
                    "Worker count changed"
                );
            }
            last_desired = Some(now_desired);
            // Idle workers re-check retirement and admission against the new count.
            shared.wake();
        }

        tokio::select! {
            changed = desired.changed(), if signal_open => {
                if changed.is_err() {
                    signal_open = false;
                }
            }
            _ = wake_rx.changed() => {}
            Some(joined) = workers.join_next() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        let message = panic_message(e);
                        shared.cancel.cancel();
                        error!(target: "tanko.download", panic = %message, "Download worker panicked");
                        return Err(SchedulerError::WorkerPanicked(message));
                    }
                }
            }
        }
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                return Err(SchedulerError::WorkerPanicked(panic_message(e)));
            }
        }
    }
    Ok(())
}

async fn worker_loop<J, T, F, Fut>(
    shared: Arc<Shared<J>>,
    run: Arc<F>,
    results: mpsc::UnboundedSender<T>,
) where
    F: Fn(J) -> Fut,
    Fut: Future<Output = T>,
{
    let mut wake_rx = shared.wake.subscribe();
    loop {
        wake_rx.borrow_and_update();
        match shared.next_step() {
            Step::Retire => {
                shared.wake();
                return;
            }
            Step::Run(job) => {
                let output = run(job).await;
                // A dropped receiver only means nobody wants the results.
                let _ = results.send(output);
                shared.lock().running -= 1;
                shared.wake();
            }
            Step::Wait => {
                tokio::select! {
                    _ = wake_rx.changed() => {}
                    () = shared.cancel.cancelled() => {}
                }
            }
        }
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string()),
        Err(err) => err.to_string(),
    }
}
