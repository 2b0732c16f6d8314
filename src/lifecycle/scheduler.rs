//! Cancellable periodic task runner.
//!
//! # Responsibilities
//! - Run exactly one background tick loop per `Scheduler`
//! - Dispatch the task on every tick without blocking the loop
//! - Stop future ticks on `cancel` (or when the scheduler is dropped)
//!
//! # Design Decisions
//! - Start is guarded by an atomic flag; a second `schedule` is a no-op
//! - The stop signal is a per-run watch channel, so a late cancel can never
//!   stop a loop started after it
//! - `OverlapPolicy::Skip` drops a tick while the previous dispatch is still
//!   running; `Allow` dispatches regardless and tasks must tolerate overlap
//! - `cancel` does not wait for an in-flight dispatch

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};

/// What a tick does while the previous dispatch is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum OverlapPolicy {
    /// Skip the tick (single flight).
    #[default]
    Skip,
    /// Dispatch anyway; executions may overlap.
    Allow,
}

/// A periodic background loop with idempotent start and cancel.
#[derive(Debug)]
pub struct Scheduler {
    name: String,
    overlap: OverlapPolicy,
    running: AtomicBool,
    stop: Mutex<Option<watch::Sender<bool>>>,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag when a dispatch finishes (or panics).
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Scheduler {
    pub fn new(name: impl Into<String>, overlap: OverlapPolicy) -> Self {
        Self {
            name: name.into(),
            overlap,
            running: AtomicBool::new(false),
            stop: Mutex::new(None),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn stop_slot(&self) -> MutexGuard<'_, Option<watch::Sender<bool>>> {
        // The slot only ever holds a sender; a poisoned lock is still usable.
        self.stop.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start ticking `task` every `period`, after an initial `delay`.
    ///
    /// Returns `true` if this call started the loop. A zero or unrepresentably
    /// large period, a call outside a Tokio runtime, or a loop that is already
    /// running is a no-op.
    pub fn schedule<F, Fut>(&self, task: F, period: Duration, delay: Duration) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period.is_zero() {
            tracing::warn!(scheduler = %self.name, "Ignoring schedule with zero period");
            return false;
        }

        if Instant::now().checked_add(delay.saturating_add(period)).is_none() {
            tracing::warn!(
                scheduler = %self.name,
                period_ms = period.as_millis() as u64,
                "Ignoring schedule with unrepresentable period"
            );
            return false;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::error!(scheduler = %self.name, "Cannot schedule outside a Tokio runtime");
                return false;
            }
        };

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(scheduler = %self.name, "Scheduler already running");
            return false;
        }

        let (tx, rx) = watch::channel(false);
        *self.stop_slot() = Some(tx);

        // A cancel may have slipped in between the flag and the slot.
        if !self.running.load(Ordering::Acquire) {
            if let Some(tx) = self.stop_slot().take() {
                let _ = tx.send(true);
            }
        }

        tracing::info!(
            scheduler = %self.name,
            period_ms = period.as_millis() as u64,
            delay_ms = delay.as_millis() as u64,
            "Scheduler started"
        );

        runtime.spawn(run_loop(
            self.name.clone(),
            task,
            period,
            delay,
            rx,
            self.in_flight.clone(),
            self.overlap,
        ));
        true
    }

    /// Stop future ticks. Idempotent; does not wait for an in-flight dispatch.
    pub fn cancel(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            if let Some(tx) = self.stop_slot().take() {
                let _ = tx.send(true);
            }
            tracing::info!(scheduler = %self.name, "Scheduler cancelled");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_loop<F, Fut>(
    name: String,
    task: F,
    period: Duration,
    delay: Duration,
    mut stop: watch::Receiver<bool>,
    in_flight: Arc<AtomicBool>,
    overlap: OverlapPolicy,
) where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    if !delay.is_zero() {
        tokio::select! {
            _ = stop.changed() => return,
            _ = time::sleep(delay) => {}
        }
    }

    let start = match Instant::now().checked_add(period) {
        Some(start) => start,
        None => {
            tracing::warn!(scheduler = %name, "Period overflows the clock, loop not started");
            return;
        }
    };
    let mut ticker = time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            // Fires on cancel and when the sender is dropped
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                match overlap {
                    OverlapPolicy::Allow => {
                        tokio::spawn(task());
                    }
                    OverlapPolicy::Skip => {
                        if in_flight
                            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                            .is_err()
                        {
                            tracing::debug!(scheduler = %name, "Previous run still in flight, skipping tick");
                            continue;
                        }
                        let guard = InFlightGuard(in_flight.clone());
                        let fut = task();
                        tokio::spawn(async move {
                            let _guard = guard;
                            fut.await;
                        });
                    }
                }
            }
        }
    }

    tracing::debug!(scheduler = %name, "Scheduler loop exited");
}
