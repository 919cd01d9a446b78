//! Periodic drivers.
//!
//! Each driver is one tokio task calling its tick closure inline, so a
//! tick never starts before the previous one returns. Late ticks are
//! delayed rather than bunched up.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Shutdown flag shared by every driver.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Run `tick` every `period` until the shutdown flag flips to true.
/// The handle resolves to the number of ticks executed.
pub fn spawn_driver<F>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<u64>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks: u64 = 0;

        info!(driver = name, period_ms = period.as_millis() as u64, "Driver started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = timer.tick() => {
                    tick();
                    ticks += 1;
                }
                changed = shutdown.changed() => {
                    // A dropped sender also stops the driver.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!(driver = name, ticks, "Driver stopped");
        ticks
    })
}
