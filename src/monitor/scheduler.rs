//! Interval scheduling for monitoring cycles.
//!
//! The first cycle starts immediately, then one per interval. A tick that
//! lands while the previous cycle is still running is skipped, so cycles
//! never overlap.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// "Cycle in progress" flag shared between the scheduler and running cycles.
#[derive(Debug, Clone, Default)]
pub struct CycleGuard {
    busy: Arc<AtomicBool>,
}

/// Held by a running cycle; clears the guard on drop.
#[derive(Debug)]
pub struct CycleToken {
    busy: Arc<AtomicBool>,
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard, or `None` if a cycle is already running.
    pub fn try_acquire(&self) -> Option<CycleToken> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleToken {
                busy: self.busy.clone(),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for CycleToken {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Counts reported when the scheduler stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub started: u64,
    pub skipped: u64,
}

/// Runs a job on a fixed interval until told to stop.
pub struct Scheduler<F> {
    interval: Duration,
    job: F,
    guard: CycleGuard,
}

impl<F, Fut> Scheduler<F>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    pub fn new(interval: Duration, job: F) -> Self {
        Self {
            interval,
            job,
            guard: CycleGuard::new(),
        }
    }

    /// Tick until `shutdown` resolves, then wait for any in-flight cycle.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> SchedulerStats {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut stats = SchedulerStats::default();
        let mut in_flight: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping scheduler");
                    break;
                }
                _ = ticker.tick() => {
                    let Some(token) = self.guard.try_acquire() else {
                        stats.skipped += 1;
                        warn!("Previous cycle still running, skipping this tick");
                        continue;
                    };
                    stats.started += 1;
                    debug!("Starting scheduled cycle #{}", stats.started);

                    let cycle = (self.job)();
                    in_flight = Some(tokio::spawn(async move {
                        cycle.await;
                        drop(token);
                    }));
                }
            }
        }

        if let Some(handle) = in_flight {
            if !handle.is_finished() {
                info!("Waiting for in-flight cycle to finish");
            }
            if let Err(e) = handle.await {
                warn!("Monitoring cycle task ended abnormally: {}", e);
            }
        }

        stats
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
