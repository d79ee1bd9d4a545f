use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};

use crate::controller::{SessionController, StopReason};

/// Periods of the three session timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cadence {
    pub simulation_tick_ms: u64,
    pub poll_interval_ms: u64,
    pub counter_tick_ms: u64,
    pub snapshot_freshness_ms: u64,
}

impl Default for Cadence {
    fn default() -> Self {
        Cadence {
            simulation_tick_ms: 100,
            poll_interval_ms: 2000,
            counter_tick_ms: 1000,
            snapshot_freshness_ms: 3000,
        }
    }
}

fn timer(period_ms: u64) -> tokio::time::Interval {
    let period = Duration::from_millis(period_ms.max(1));
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

/// Run the simulation, poll and counter timers for a started session on a
/// single loop until the session leaves its live phases.
///
/// When the battery reads full, the session is stopped once. The automatic
/// stop is not repeated: if it fails, the loop keeps running until the
/// session is stopped by hand.
pub async fn drive_session(controller: Arc<SessionController>, cadence: Cadence) {
    let mut phase_rx = controller.subscribe();
    let mut simulation = timer(cadence.simulation_tick_ms);
    let mut poll = timer(cadence.poll_interval_ms);
    let mut counter = timer(cadence.counter_tick_ms);
    tracing::info!("Driving session for booking {}", controller.booking_id());

    while controller.phase().is_live() {
        tokio::select! {
            _ = simulation.tick() => {
                let Some(tick) = controller.simulation_tick() else { continue };
                if tick.charge_complete {
                    if let Err(e) = controller.stop(StopReason::BatteryFull).await {
                        tracing::error!(
                            "Automatic stop for booking {} failed: {}",
                            controller.booking_id(),
                            e
                        );
                    }
                }
            }
            _ = poll.tick() => {
                // Logged by the controller; extrapolation carries on.
                let _ = controller.poll().await;
            }
            _ = counter.tick() => controller.counter_tick(),
            changed = phase_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    tracing::info!("Session loop for booking {} finished", controller.booking_id());
}

pub fn spawn_session(controller: Arc<SessionController>, cadence: Cadence) -> JoinHandle<()> {
    tokio::spawn(drive_session(controller, cadence))
}
