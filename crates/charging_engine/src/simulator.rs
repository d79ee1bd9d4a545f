//! Smooth battery / energy / cost progression between operator polls.
//!
//! The simulator extrapolates locally from the charger power, and defers to
//! the latest operator snapshot while that snapshot is fresh.

use charging_core::{Money, SessionOutcome, SubscriptionPlan, pricing};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::remote::MonitorSnapshot;

/// Snapshots older than this are ignored in favour of local extrapolation.
pub const DEFAULT_SNAPSHOT_FRESHNESS_MS: i64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParams {
    pub initial_battery_pct: f64,
    pub charging_power_kw: f64,
    pub battery_capacity_kwh: f64,
    pub tariff_per_kwh: Money,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReading {
    pub battery_pct: f64,
    pub energy_kwh: f64,
    pub cost: f64,
}

impl SessionReading {
    fn max(self, other: SessionReading) -> SessionReading {
        SessionReading {
            battery_pct: self.battery_pct.max(other.battery_pct),
            energy_kwh: self.energy_kwh.max(other.energy_kwh),
            cost: self.cost.max(other.cost),
        }
    }
}

impl From<MonitorSnapshot> for SessionReading {
    fn from(snapshot: MonitorSnapshot) -> Self {
        SessionReading {
            battery_pct: snapshot.current_battery_pct.clamp(0.0, 100.0),
            energy_kwh: snapshot.energy_consumed_kwh.max(0.0),
            cost: snapshot.cost_accrued.max(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadingSource {
    Simulated,
    Authoritative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SimulationState {
    Running,
    Paused,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub reading: SessionReading,
    pub source: ReadingSource,
    /// Set on the one tick where the battery first reads 100%.
    pub charge_complete: bool,
}

#[derive(Debug, Clone, Copy)]
struct TimedSnapshot {
    reading: SessionReading,
    received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChargingSimulator {
    params: SimulationParams,
    started_at: DateTime<Utc>,
    paused_at: Option<DateTime<Utc>>,
    paused_total: Duration,
    state: SimulationState,
    freshness: Duration,
    latest_snapshot: Option<TimedSnapshot>,
    display: SessionReading,
    source: ReadingSource,
    elapsed_seconds: u64,
    completion_signalled: bool,
}

impl ChargingSimulator {
    pub fn new(params: SimulationParams, started_at: DateTime<Utc>) -> Self {
        let initial_battery_pct = params.initial_battery_pct.clamp(0.0, 100.0);
        ChargingSimulator {
            params: SimulationParams {
                initial_battery_pct,
                ..params
            },
            started_at,
            paused_at: None,
            paused_total: Duration::zero(),
            state: SimulationState::Running,
            freshness: Duration::milliseconds(DEFAULT_SNAPSHOT_FRESHNESS_MS),
            latest_snapshot: None,
            display: SessionReading {
                battery_pct: initial_battery_pct,
                energy_kwh: 0.0,
                cost: 0.0,
            },
            source: ReadingSource::Simulated,
            elapsed_seconds: 0,
            completion_signalled: false,
        }
    }

    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn reading(&self) -> SessionReading {
        self.display
    }

    pub fn source(&self) -> ReadingSource {
        self.source
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    /// Charging time so far, excluding pauses.
    fn charging_time(&self, now: DateTime<Utc>) -> Duration {
        let until = self.paused_at.unwrap_or(now);
        (until - self.started_at - self.paused_total).max(Duration::zero())
    }

    /// Locally extrapolated values at `now`.
    pub fn simulate_at(&self, now: DateTime<Utc>) -> SessionReading {
        let params = &self.params;
        let hours = self.charging_time(now).num_milliseconds() as f64 / 3_600_000.0;
        let headroom_kwh =
            (100.0 - params.initial_battery_pct) / 100.0 * params.battery_capacity_kwh;
        let energy_kwh = (params.charging_power_kw * hours).clamp(0.0, headroom_kwh.max(0.0));
        let battery_pct = if params.battery_capacity_kwh > 0.0 {
            (params.initial_battery_pct + energy_kwh / params.battery_capacity_kwh * 100.0)
                .min(100.0)
        } else {
            params.initial_battery_pct
        };
        SessionReading {
            battery_pct,
            energy_kwh,
            cost: energy_kwh * params.tariff_per_kwh as f64,
        }
    }

    /// Store the operator's latest figures. Only the poll path calls this.
    pub fn record_snapshot(&mut self, snapshot: MonitorSnapshot, received_at: DateTime<Utc>) {
        self.latest_snapshot = Some(TimedSnapshot {
            reading: snapshot.into(),
            received_at,
        });
    }

    fn fresh_snapshot(&self, now: DateTime<Utc>) -> Option<SessionReading> {
        self.latest_snapshot
            .filter(|snap| {
                let age = now - snap.received_at;
                age >= Duration::zero() && age < self.freshness
            })
            .map(|snap| snap.reading)
    }

    /// Advance the displayed values to `now`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Tick {
        if self.state == SimulationState::Halted {
            return Tick {
                reading: self.display,
                source: self.source,
                charge_complete: false,
            };
        }

        if let Some(reading) = self.fresh_snapshot(now) {
            self.display = reading;
            self.source = ReadingSource::Authoritative;
        } else if self.state == SimulationState::Running {
            self.display = self.display.max(self.simulate_at(now));
            self.source = ReadingSource::Simulated;
        }

        let charge_complete = self.display.battery_pct >= 100.0 && !self.completion_signalled;
        if charge_complete {
            tracing::info!("Battery reached 100%, halting simulation");
            self.completion_signalled = true;
            self.state = SimulationState::Halted;
        }

        Tick {
            reading: self.display,
            source: self.source,
            charge_complete,
        }
    }

    /// One-second counter for display; independent of the energy formula.
    pub fn tick_second(&mut self) {
        if self.state == SimulationState::Running {
            self.elapsed_seconds += 1;
        }
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        if self.state == SimulationState::Running {
            self.paused_at = Some(now);
            self.state = SimulationState::Paused;
        }
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        if self.state == SimulationState::Paused {
            if let Some(paused_at) = self.paused_at.take() {
                self.paused_total += (now - paused_at).max(Duration::zero());
            }
            self.state = SimulationState::Running;
        }
    }

    pub fn halt(&mut self) {
        self.state = SimulationState::Halted;
    }

    /// Terminal values, with the energy billed at the tariff less `plan`'s
    /// discount rather than the running cost shown during the session.
    pub fn outcome(&self, plan: Option<&SubscriptionPlan>) -> SessionOutcome {
        SessionOutcome {
            energy_kwh: self.display.energy_kwh,
            price: pricing::compute_energy_cost(
                self.display.energy_kwh,
                self.params.tariff_per_kwh,
                plan,
            ),
            final_battery_pct: self.display.battery_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 14, 30, 0).unwrap()
    }

    fn params() -> SimulationParams {
        SimulationParams {
            initial_battery_pct: 20.0,
            charging_power_kw: 50.0,
            battery_capacity_kwh: 75.0,
            tariff_per_kwh: 3500,
        }
    }

    #[test]
    fn test_simulation_formula() {
        let sim = ChargingSimulator::new(params(), start());
        let reading = sim.simulate_at(start() + Duration::minutes(18));

        // 50 kW for 0.3 h
        assert!((reading.energy_kwh - 15.0).abs() < 1e-9);
        assert!((reading.battery_pct - 40.0).abs() < 1e-9);
        assert!((reading.cost - 52500.0).abs() < 1e-6);
    }

    #[test]
    fn test_battery_is_monotonic_and_capped() {
        let mut sim = ChargingSimulator::new(params(), start());
        let mut previous = sim.reading().battery_pct;

        for step in 1..=200 {
            let tick = sim.tick(start() + Duration::seconds(step * 30));
            assert!(tick.reading.battery_pct >= previous);
            assert!(tick.reading.battery_pct <= 100.0);
            previous = tick.reading.battery_pct;
        }
        assert_eq!(previous, 100.0);
    }

    #[test]
    fn test_energy_stops_at_full_battery() {
        let sim = ChargingSimulator::new(params(), start());
        let reading = sim.simulate_at(start() + Duration::hours(5));
        assert_eq!(reading.battery_pct, 100.0);
        assert!((reading.energy_kwh - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_charge_complete_signalled_once() {
        let mut sim = ChargingSimulator::new(params(), start());

        // 60 kWh at 50 kW takes 72 minutes
        assert!(!sim.tick(start() + Duration::minutes(71)).charge_complete);
        assert!(sim.tick(start() + Duration::minutes(73)).charge_complete);
        assert_eq!(sim.state(), SimulationState::Halted);
        assert!(!sim.tick(start() + Duration::minutes(74)).charge_complete);
        assert!(!sim.tick(start() + Duration::minutes(90)).charge_complete);
    }

    #[test]
    fn test_fresh_snapshot_wins() {
        let mut sim = ChargingSimulator::new(params(), start());
        let now = start() + Duration::minutes(18);
        sim.record_snapshot(
            MonitorSnapshot {
                current_battery_pct: 37.5,
                energy_consumed_kwh: 13.1,
                cost_accrued: 45850.0,
            },
            now - Duration::seconds(1),
        );

        let tick = sim.tick(now);
        assert_eq!(tick.source, ReadingSource::Authoritative);
        assert_eq!(tick.reading.battery_pct, 37.5);
        assert_eq!(tick.reading.energy_kwh, 13.1);
        assert_eq!(tick.reading.cost, 45850.0);
    }

    #[test]
    fn test_stale_snapshot_falls_back_to_simulation() {
        let mut sim = ChargingSimulator::new(params(), start());
        let now = start() + Duration::minutes(18);
        sim.record_snapshot(
            MonitorSnapshot {
                current_battery_pct: 37.5,
                energy_consumed_kwh: 13.1,
                cost_accrued: 45850.0,
            },
            now - Duration::seconds(3),
        );

        let tick = sim.tick(now);
        assert_eq!(tick.source, ReadingSource::Simulated);
        assert!((tick.reading.battery_pct - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_fallback_never_regresses_below_snapshot() {
        let mut sim = ChargingSimulator::new(params(), start());
        let received = start() + Duration::minutes(10);
        sim.record_snapshot(
            MonitorSnapshot {
                current_battery_pct: 45.0,
                energy_consumed_kwh: 18.75,
                cost_accrued: 65625.0,
            },
            received,
        );
        assert_eq!(sim.tick(received).reading.battery_pct, 45.0);

        // Snapshot is stale; extrapolation alone would read ~31%
        let tick = sim.tick(received + Duration::seconds(5));
        assert_eq!(tick.source, ReadingSource::Simulated);
        assert_eq!(tick.reading.battery_pct, 45.0);
    }

    #[test]
    fn test_snapshot_reaching_full_completes() {
        let mut sim = ChargingSimulator::new(params(), start());
        let now = start() + Duration::minutes(5);
        sim.record_snapshot(
            MonitorSnapshot {
                current_battery_pct: 100.0,
                energy_consumed_kwh: 60.0,
                cost_accrued: 210000.0,
            },
            now,
        );
        assert!(sim.tick(now).charge_complete);
    }

    #[test]
    fn test_pause_freezes_simulation_and_counter() {
        let mut sim = ChargingSimulator::new(params(), start());
        sim.tick_second();
        let paused = sim.tick(start() + Duration::minutes(6)).reading;
        sim.pause(start() + Duration::minutes(6));

        sim.tick_second();
        let later = sim.tick(start() + Duration::minutes(30)).reading;
        assert_eq!(paused, later);
        assert_eq!(sim.elapsed_seconds(), 1);

        sim.resume(start() + Duration::minutes(30));
        // 6 minutes before the pause plus 12 after resuming
        let reading = sim.simulate_at(start() + Duration::minutes(42));
        assert!((reading.energy_kwh - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_halted_simulation_ignores_ticks() {
        let mut sim = ChargingSimulator::new(params(), start());
        let before = sim.tick(start() + Duration::minutes(6)).reading;
        sim.halt();
        sim.tick_second();
        let after = sim.tick(start() + Duration::minutes(30)).reading;
        assert_eq!(before, after);
        assert_eq!(sim.elapsed_seconds(), 0);
    }

    #[test]
    fn test_outcome_bills_energy() {
        let mut sim = ChargingSimulator::new(params(), start());
        sim.tick(start() + Duration::minutes(18));
        let outcome = sim.outcome(None);
        assert!((outcome.energy_kwh - 15.0).abs() < 1e-9);
        assert_eq!(outcome.price.original_price, 52500);
        assert_eq!(outcome.price.discounted_price, 52500);
        assert!((outcome.final_battery_pct - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_outcome_applies_plan_discount() {
        let mut sim = ChargingSimulator::new(params(), start());
        sim.tick(start() + Duration::minutes(18));
        let catalog = charging_core::SubscriptionCatalog::builtin();
        let outcome = sim.outcome(catalog.plan("premium"));
        assert_eq!(outcome.price.original_price, 52500);
        assert_eq!(outcome.price.discount_amount, 10500);
        assert_eq!(outcome.price.discounted_price, 42000);
    }
}
