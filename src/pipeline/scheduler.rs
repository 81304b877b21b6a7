//! Poll scheduler - drives the lifecycle controller on a fixed cadence
//!
//! A single background task owns the timer and runs every cycle inline, so two
//! cycles can never run at the same time. Interval changes and shutdown reach
//! that task over `watch` channels:
//! - interval change: the old timer is dropped and a new one started (first tick immediate)
//! - shutdown: honoured between cycles; an in-flight cycle always completes
//!
//! Ticks that fire while a cycle is still running are skipped, not queued.

use super::config::PollInterval;
use super::engine::LifecycleController;
use super::error::AlertError;
use super::source::SalesReader;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Handle to the running poll loop
pub struct PollScheduler {
    interval_tx: watch::Sender<PollInterval>,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PollScheduler {
    /// Spawn the poll loop. The first cycle runs immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        controller: Arc<LifecycleController>,
        reader: Arc<dyn SalesReader>,
        poll_interval: PollInterval,
    ) -> Self {
        let (interval_tx, interval_rx) = watch::channel(poll_interval);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        log::info!(
            "⏰ Polling scheduler started (interval: {}, reader: {})",
            poll_interval,
            reader.source_name()
        );
        let handle = tokio::spawn(poll_loop(controller, reader, interval_rx, shutdown_rx));

        Self {
            interval_tx,
            shutdown_tx,
            handle,
        }
    }

    /// Current polling interval
    pub fn interval(&self) -> PollInterval {
        *self.interval_tx.borrow()
    }

    /// Replace the timer with one at the new interval.
    ///
    /// Returns false when the interval is unchanged (the running timer is kept).
    pub fn set_interval(&self, poll_interval: PollInterval) -> bool {
        self.interval_tx.send_if_modified(|current| {
            if *current == poll_interval {
                false
            } else {
                *current = poll_interval;
                true
            }
        })
    }

    /// Configuration entry point: validate, then restart the timer
    pub fn set_polling_interval_minutes(&self, minutes: u32) -> Result<(), AlertError> {
        let poll_interval = PollInterval::from_minutes(minutes)?;
        self.set_interval(poll_interval);
        Ok(())
    }

    /// Stop polling and wait for the loop to exit.
    ///
    /// A cycle that is already running finishes before this returns.
    pub async fn stop(self) {
        self.shutdown_tx.send_replace(true);

        if let Err(e) = self.handle.await {
            log::error!("❌ Polling scheduler task failed: {}", e);
        }
        log::info!("Polling scheduler stopped.");
    }
}

fn new_timer(poll_interval: PollInterval) -> Interval {
    let mut timer = interval(poll_interval.as_duration());
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

/// Poll loop task
///
/// Runs until shutdown is requested or the `PollScheduler` handle is dropped.
async fn poll_loop(
    controller: Arc<LifecycleController>,
    reader: Arc<dyn SalesReader>,
    mut interval_rx: watch::Receiver<PollInterval>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut current = *interval_rx.borrow_and_update();
    let mut timer = new_timer(current);
    let mut cycle = 0u64;

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            changed = interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = *interval_rx.borrow_and_update();
                log::info!("⏰ Polling interval changed: {} → {}", current, next);
                current = next;
                timer = new_timer(current);
            }

            _ = timer.tick() => {
                cycle += 1;
                log::debug!("⏰ Poll cycle {} starting", cycle);

                // Runs outside select!: shutdown and interval changes wait for it
                if let Err(e) = controller.poll_once(reader.as_ref()).await {
                    log::warn!(
                        "⚠️  Poll cycle {} failed, next attempt in {}: {}",
                        cycle,
                        current,
                        e
                    );
                }
            }
        }
    }

    log::debug!("Poll loop exited after {} cycles", cycle);
}
