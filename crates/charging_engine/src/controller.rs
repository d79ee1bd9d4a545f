use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use charging_core::{
    Booking, BookingError, BookingStatus, BookingStore, Clock, Money, SubscriptionPlan,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::SessionError;
use crate::remote::{ChargingService, PaymentDetail, PaymentInitiation, PaymentMethod};
use crate::simulator::{
    ChargingSimulator, DEFAULT_SNAPSHOT_FRESHNESS_MS, ReadingSource, SessionReading,
    SimulationParams, Tick,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Pending,
    Charging,
    Paused,
    Completed,
}

impl SessionPhase {
    pub fn is_live(self) -> bool {
        matches!(self, SessionPhase::Charging | SessionPhase::Paused)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Pending => "pending",
            SessionPhase::Charging => "charging",
            SessionPhase::Paused => "paused",
            SessionPhase::Completed => "completed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    UserRequested,
    BatteryFull,
}

/// Per-session figures the simulator needs besides the first battery reading.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub charging_power_kw: f64,
    pub battery_capacity_kwh: f64,
    pub tariff_per_kwh: Money,
    pub snapshot_freshness: Duration,
    /// The user's active plan; its discount applies to the final bill.
    pub plan: Option<SubscriptionPlan>,
}

impl SessionSettings {
    pub fn new(charging_power_kw: f64, battery_capacity_kwh: f64, tariff_per_kwh: Money) -> Self {
        SessionSettings {
            charging_power_kw,
            battery_capacity_kwh,
            tariff_per_kwh,
            snapshot_freshness: Duration::milliseconds(DEFAULT_SNAPSHOT_FRESHNESS_MS),
            plan: None,
        }
    }
}

/// What the session screen renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub booking_id: String,
    pub phase: SessionPhase,
    pub finishing: bool,
    pub reading: Option<SessionReading>,
    pub source: Option<ReadingSource>,
    pub elapsed_seconds: u64,
    pub payment_url: Option<String>,
}

struct ControllerState {
    phase: SessionPhase,
    simulator: Option<ChargingSimulator>,
    last_reading: Option<SessionReading>,
    elapsed_seconds: u64,
    payment: Option<PaymentInitiation>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Drives one booking through start, pause/resume, stop and payment.
///
/// Remote failures leave the phase where it was so the same action can be
/// retried. The remote session is ended at most once: a stop issued while
/// another is in flight is refused.
pub struct SessionController {
    booking_id: String,
    user_id: String,
    session_id: String,
    store: Arc<Mutex<BookingStore>>,
    remote: Arc<dyn ChargingService>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    finishing: AtomicBool,
    state: Mutex<ControllerState>,
    phase_tx: watch::Sender<SessionPhase>,
}

impl SessionController {
    /// `session_id` is the operator's identifier for the charging run.
    pub fn new(
        booking: &Booking,
        session_id: impl Into<String>,
        store: Arc<Mutex<BookingStore>>,
        remote: Arc<dyn ChargingService>,
        settings: SessionSettings,
    ) -> Self {
        let clock = lock(&store).clock();
        let phase = match booking.status {
            BookingStatus::Confirmed => SessionPhase::Pending,
            BookingStatus::Active => SessionPhase::Charging,
            BookingStatus::Completed | BookingStatus::Cancelled => SessionPhase::Completed,
        };
        let (phase_tx, _) = watch::channel(phase);
        SessionController {
            booking_id: booking.id.clone(),
            user_id: booking.user_id.clone(),
            session_id: session_id.into(),
            store,
            remote,
            clock,
            settings,
            finishing: AtomicBool::new(false),
            state: Mutex::new(ControllerState {
                phase,
                simulator: None,
                last_reading: None,
                elapsed_seconds: 0,
                payment: None,
            }),
            phase_tx,
        }
    }

    pub fn booking_id(&self) -> &str {
        &self.booking_id
    }

    pub fn phase(&self) -> SessionPhase {
        lock(&self.state).phase
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    pub fn is_finishing(&self) -> bool {
        self.finishing.load(Ordering::Acquire)
    }

    fn set_phase(&self, state: &mut ControllerState, phase: SessionPhase) {
        tracing::info!(
            "Session for booking {} moves from {} to {}",
            self.booking_id,
            state.phase,
            phase
        );
        state.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    fn require_phase(
        &self,
        action: &'static str,
        allowed: &[SessionPhase],
    ) -> Result<SessionPhase, SessionError> {
        let phase = self.phase();
        if allowed.contains(&phase) {
            Ok(phase)
        } else {
            Err(SessionError::InvalidPhase { action, phase })
        }
    }

    /// Start charging.
    ///
    /// The first monitor reading seeds the simulator, so the booking's own
    /// battery figure is only a fallback for display before this call.
    pub async fn start(&self) -> Result<Booking, SessionError> {
        self.require_phase("start", &[SessionPhase::Pending])?;
        {
            let store = lock(&self.store);
            let booking =
                store
                    .booking(&self.booking_id)
                    .ok_or_else(|| BookingError::NotFound {
                        id: self.booking_id.clone(),
                    })?;
            if !booking.status.can_transition_to(BookingStatus::Active) {
                return Err(BookingError::InvalidTransition {
                    id: booking.id.clone(),
                    from: booking.status,
                    to: BookingStatus::Active,
                }
                .into());
            }
        }

        let snapshot = self.remote.monitor(&self.session_id).await.map_err(|e| {
            tracing::warn!("Could not start session {}: {}", self.session_id, e);
            e
        })?;

        let now = self.clock.now();
        let booking = lock(&self.store).start_session(&self.booking_id, now)?;

        let mut simulator = ChargingSimulator::new(
            SimulationParams {
                initial_battery_pct: snapshot.current_battery_pct,
                charging_power_kw: self.settings.charging_power_kw,
                battery_capacity_kwh: self.settings.battery_capacity_kwh,
                tariff_per_kwh: self.settings.tariff_per_kwh,
            },
            now,
        )
        .with_freshness(self.settings.snapshot_freshness);
        simulator.record_snapshot(snapshot, now);

        let mut state = lock(&self.state);
        state.last_reading = Some(simulator.reading());
        state.simulator = Some(simulator);
        self.set_phase(&mut state, SessionPhase::Charging);
        Ok(booking)
    }

    /// Pausing freezes the local simulation and the elapsed counter. The
    /// operator session keeps running; snapshots are still recorded.
    pub fn pause(&self) -> Result<(), SessionError> {
        let mut state = lock(&self.state);
        if state.phase != SessionPhase::Charging || self.is_finishing() {
            return Err(SessionError::InvalidPhase {
                action: "pause",
                phase: state.phase,
            });
        }
        let now = self.clock.now();
        if let Some(simulator) = state.simulator.as_mut() {
            simulator.pause(now);
        }
        self.set_phase(&mut state, SessionPhase::Paused);
        Ok(())
    }

    pub fn resume(&self) -> Result<(), SessionError> {
        let mut state = lock(&self.state);
        if state.phase != SessionPhase::Paused || self.is_finishing() {
            return Err(SessionError::InvalidPhase {
                action: "resume",
                phase: state.phase,
            });
        }
        let now = self.clock.now();
        if let Some(simulator) = state.simulator.as_mut() {
            simulator.resume(now);
        }
        self.set_phase(&mut state, SessionPhase::Charging);
        Ok(())
    }

    /// End the charging run and complete the booking.
    pub async fn stop(&self, reason: StopReason) -> Result<Booking, SessionError> {
        self.require_phase("stop", &[SessionPhase::Charging, SessionPhase::Paused])?;
        if self
            .finishing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Stop for booking {} already in flight", self.booking_id);
            return Err(SessionError::AlreadyFinishing {
                booking_id: self.booking_id.clone(),
            });
        }

        tracing::info!("Stopping session {} ({:?})", self.session_id, reason);
        if let Err(e) = self.remote.end_session(&self.session_id).await {
            tracing::warn!("Could not end session {}: {}", self.session_id, e);
            self.finishing.store(false, Ordering::Release);
            return Err(e.into());
        }

        // The operator session is over, so the controller goes terminal even
        // if the booking can no longer be completed.
        let now = self.clock.now();
        let mut state = lock(&self.state);
        let outcome = state.simulator.as_mut().map(|simulator| {
            simulator.tick(now);
            simulator.halt();
            simulator.outcome(self.settings.plan.as_ref())
        });
        let finished = lock(&self.store).finish_session(&self.booking_id, now, outcome);
        if let Some(simulator) = state.simulator.take() {
            state.last_reading = Some(simulator.reading());
        }
        self.set_phase(&mut state, SessionPhase::Completed);
        drop(state);
        finished.map_err(|e| {
            tracing::error!(
                "Session {} ended but booking {} was not completed: {}",
                self.session_id,
                self.booking_id,
                e
            );
            SessionError::from(e)
        })
    }

    /// Ask the operator for a payment link. Failures keep the booking
    /// completed and unpaid, so payment can be retried.
    pub async fn pay(&self, method: PaymentMethod) -> Result<PaymentInitiation, SessionError> {
        self.require_phase("pay for", &[SessionPhase::Completed])?;
        let payment = self
            .remote
            .initiate_payment(&self.session_id, &self.user_id, method)
            .await
            .map_err(|e| {
                tracing::warn!("Payment for session {} failed: {}", self.session_id, e);
                e
            })?;
        lock(&self.state).payment = Some(payment.clone());
        Ok(payment)
    }

    pub async fn payment_detail(&self) -> Result<PaymentDetail, SessionError> {
        Ok(self
            .remote
            .payment_detail(&self.session_id, &self.user_id)
            .await?)
    }

    /// Fast tick. Returns `None` once the session is no longer live.
    pub fn simulation_tick(&self) -> Option<Tick> {
        if self.is_finishing() {
            return None;
        }
        let now = self.clock.now();
        let mut state = lock(&self.state);
        if !state.phase.is_live() {
            return None;
        }
        let tick = state.simulator.as_mut()?.tick(now);
        state.last_reading = Some(tick.reading);
        Some(tick)
    }

    /// Fetch an authoritative snapshot. Failures are reported but leave the
    /// simulation running on its own extrapolation.
    pub async fn poll(&self) -> Result<(), SessionError> {
        if !self.phase().is_live() || self.is_finishing() {
            return Ok(());
        }
        let snapshot = self.remote.monitor(&self.session_id).await.map_err(|e| {
            tracing::warn!("Monitor poll for session {} failed: {}", self.session_id, e);
            e
        })?;

        let now = self.clock.now();
        let mut state = lock(&self.state);
        if state.phase.is_live() {
            if let Some(simulator) = state.simulator.as_mut() {
                tracing::debug!(
                    "Snapshot for session {}: {:.1}%",
                    self.session_id,
                    snapshot.current_battery_pct
                );
                simulator.record_snapshot(snapshot, now);
            }
        }
        Ok(())
    }

    /// One-second tick for the elapsed-time counter.
    pub fn counter_tick(&self) {
        if self.is_finishing() {
            return;
        }
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        if !state.phase.is_live() {
            return;
        }
        if let Some(simulator) = state.simulator.as_mut() {
            simulator.tick_second();
            state.elapsed_seconds = simulator.elapsed_seconds();
        }
    }

    pub fn view(&self) -> SessionView {
        let state = lock(&self.state);
        SessionView {
            booking_id: self.booking_id.clone(),
            phase: state.phase,
            finishing: self.is_finishing(),
            reading: state.last_reading,
            source: state.simulator.as_ref().map(|simulator| simulator.source()),
            elapsed_seconds: state.elapsed_seconds,
            payment_url: state.payment.as_ref().map(|p| p.payment_url.clone()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::RemoteError;
    use crate::remote::MonitorSnapshot;
    use async_trait::async_trait;
    use charging_core::{
        BookingDraft, ChargerClass, ManualClock, SequentialIds, TracingNotifier,
    };
    use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
    use std::sync::atomic::AtomicUsize;

    /// Operator stub that counts calls and can be told to fail.
    #[derive(Default)]
    pub(crate) struct StubService {
        pub monitor_calls: AtomicUsize,
        pub end_calls: AtomicUsize,
        pub payment_calls: AtomicUsize,
        pub fail_monitor: AtomicBool,
        pub fail_end: AtomicBool,
        pub fail_payment: AtomicBool,
        pub battery_pct: Mutex<f64>,
    }

    impl StubService {
        pub fn new(battery_pct: f64) -> Self {
            StubService {
                battery_pct: Mutex::new(battery_pct),
                ..Default::default()
            }
        }

        fn unavailable() -> RemoteError {
            RemoteError::Unavailable {
                message: "connection refused".into(),
            }
        }
    }

    #[async_trait]
    impl ChargingService for StubService {
        async fn monitor(&self, _session_id: &str) -> Result<MonitorSnapshot, RemoteError> {
            self.monitor_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_monitor.load(Ordering::SeqCst) {
                return Err(Self::unavailable());
            }
            let battery = *self.battery_pct.lock().unwrap();
            Ok(MonitorSnapshot {
                current_battery_pct: battery,
                energy_consumed_kwh: 0.0,
                cost_accrued: 0.0,
            })
        }

        async fn end_session(&self, _session_id: &str) -> Result<(), RemoteError> {
            self.end_calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail_end.load(Ordering::SeqCst) {
                return Err(Self::unavailable());
            }
            Ok(())
        }

        async fn initiate_payment(
            &self,
            session_id: &str,
            _user_id: &str,
            _method: PaymentMethod,
        ) -> Result<PaymentInitiation, RemoteError> {
            self.payment_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_payment.load(Ordering::SeqCst) {
                return Err(Self::unavailable());
            }
            Ok(PaymentInitiation {
                payment_url: format!("https://pay.example.test/{session_id}"),
            })
        }

        async fn payment_detail(
            &self,
            _session_id: &str,
            _user_id: &str,
        ) -> Result<PaymentDetail, RemoteError> {
            Err(RemoteError::AuthExpired {
                message: "token expired".into(),
            })
        }
    }

    pub(crate) fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, hour, minute, 0).unwrap()
    }

    pub(crate) fn setup(
        stub: Arc<StubService>,
    ) -> (SessionController, Arc<Mutex<BookingStore>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(at(14, 30)));
        let mut store = BookingStore::new(
            clock.clone(),
            Arc::new(SequentialIds::default()),
            Arc::new(TracingNotifier),
        );
        let booking = store
            .add_booking(BookingDraft {
                user_id: "U1".into(),
                station_id: "ST-01".into(),
                date: NaiveDate::from_ymd_opt(2025, 3, 14),
                time: NaiveTime::from_hms_opt(14, 30, 0),
                duration_minutes: 45,
                current_battery: 20,
                target_battery: 80,
                charger_class: ChargerClass::Fast,
            })
            .unwrap();
        let store = Arc::new(Mutex::new(store));
        let controller = SessionController::new(
            &booking,
            "S-1",
            store.clone(),
            stub,
            SessionSettings::new(50.0, 75.0, 3500),
        );
        (controller, store, clock)
    }

    #[tokio::test]
    async fn test_start_seeds_from_monitor_reading() {
        let stub = Arc::new(StubService::new(35.0));
        let (controller, store, _) = setup(stub.clone());

        let booking = controller.start().await.unwrap();
        assert_eq!(booking.status, BookingStatus::Active);
        assert_eq!(controller.phase(), SessionPhase::Charging);
        assert_eq!(stub.monitor_calls.load(Ordering::SeqCst), 1);
        assert_eq!(controller.view().reading.unwrap().battery_pct, 35.0);
        assert_eq!(
            store.lock().unwrap().booking("BK-1").unwrap().status,
            BookingStatus::Active
        );
    }

    #[tokio::test]
    async fn test_start_failure_does_not_advance() {
        let stub = Arc::new(StubService::new(35.0));
        stub.fail_monitor.store(true, Ordering::SeqCst);
        let (controller, store, _) = setup(stub.clone());

        let result = controller.start().await;
        assert!(matches!(
            result,
            Err(SessionError::Remote(RemoteError::Unavailable { .. }))
        ));
        assert!(result.unwrap_err().is_retriable());
        assert_eq!(controller.phase(), SessionPhase::Pending);
        assert_eq!(
            store.lock().unwrap().booking("BK-1").unwrap().status,
            BookingStatus::Confirmed
        );

        // Retry from the same state succeeds
        stub.fail_monitor.store(false, Ordering::SeqCst);
        controller.start().await.unwrap();
        assert_eq!(controller.phase(), SessionPhase::Charging);
    }

    #[tokio::test]
    async fn test_concurrent_stops_end_remote_session_once() {
        let stub = Arc::new(StubService::new(20.0));
        let (controller, store, clock) = setup(stub.clone());
        controller.start().await.unwrap();
        clock.advance(Duration::minutes(18));

        let (first, second) = tokio::join!(
            controller.stop(StopReason::UserRequested),
            controller.stop(StopReason::BatteryFull)
        );

        assert_eq!(stub.end_calls.load(Ordering::SeqCst), 1);
        assert!(first.is_ok());
        assert!(matches!(second, Err(SessionError::AlreadyFinishing { .. })));
        assert_eq!(controller.phase(), SessionPhase::Completed);

        let store = store.lock().unwrap();
        let booking = store.booking("BK-1").unwrap();
        assert_eq!(booking.status, BookingStatus::Completed);
        let outcome = booking.outcome.unwrap();
        assert!((outcome.energy_kwh - 15.0).abs() < 1e-9);
        assert_eq!(outcome.price.discounted_price, 52500);
    }

    #[tokio::test]
    async fn test_stop_completes_session_when_booking_was_closed_elsewhere() {
        let stub = Arc::new(StubService::new(20.0));
        let (controller, store, _) = setup(stub.clone());
        controller.start().await.unwrap();
        store
            .lock()
            .unwrap()
            .update_status("BK-1", BookingStatus::Completed)
            .unwrap();

        let result = controller.stop(StopReason::UserRequested).await;
        assert!(matches!(
            result,
            Err(SessionError::Booking(BookingError::InvalidTransition { .. }))
        ));
        assert_eq!(stub.end_calls.load(Ordering::SeqCst), 1);
        assert_eq!(controller.phase(), SessionPhase::Completed);
        assert!(controller.simulation_tick().is_none());

        let again = controller.stop(StopReason::UserRequested).await;
        assert!(matches!(again, Err(SessionError::InvalidPhase { .. })));
        assert_eq!(stub.end_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_after_completion_is_refused() {
        let stub = Arc::new(StubService::new(20.0));
        let (controller, _, _) = setup(stub.clone());
        controller.start().await.unwrap();
        controller.stop(StopReason::UserRequested).await.unwrap();

        assert!(matches!(
            controller.stop(StopReason::UserRequested).await,
            Err(SessionError::InvalidPhase { .. })
        ));
        assert_eq!(stub.end_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_stop_releases_guard() {
        let stub = Arc::new(StubService::new(20.0));
        stub.fail_end.store(true, Ordering::SeqCst);
        let (controller, store, _) = setup(stub.clone());
        controller.start().await.unwrap();

        assert!(controller.stop(StopReason::UserRequested).await.is_err());
        assert!(!controller.is_finishing());
        assert_eq!(controller.phase(), SessionPhase::Charging);
        assert_eq!(
            store.lock().unwrap().booking("BK-1").unwrap().status,
            BookingStatus::Active
        );

        stub.fail_end.store(false, Ordering::SeqCst);
        controller.stop(StopReason::UserRequested).await.unwrap();
        assert_eq!(stub.end_calls.load(Ordering::SeqCst), 2);
        assert_eq!(controller.phase(), SessionPhase::Completed);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let stub = Arc::new(StubService::new(20.0));
        let (controller, _, clock) = setup(stub);

        assert!(matches!(
            controller.pause(),
            Err(SessionError::InvalidPhase { .. })
        ));
        controller.start().await.unwrap();

        clock.advance(Duration::minutes(6));
        let before = controller.simulation_tick().unwrap().reading;
        controller.pause().unwrap();
        assert_eq!(controller.phase(), SessionPhase::Paused);
        assert!(controller.resume().is_ok());
        controller.pause().unwrap();

        clock.advance(Duration::minutes(30));
        let paused = controller.simulation_tick().unwrap().reading;
        assert_eq!(before, paused);

        controller.resume().unwrap();
        assert_eq!(controller.phase(), SessionPhase::Charging);
        assert!(controller.resume().is_err());
        clock.advance(Duration::minutes(6));
        let resumed = controller.simulation_tick().unwrap().reading;
        assert!(resumed.battery_pct > paused.battery_pct);
    }

    #[tokio::test]
    async fn test_ticks_are_noops_after_stop() {
        let stub = Arc::new(StubService::new(20.0));
        let (controller, _, clock) = setup(stub.clone());
        controller.start().await.unwrap();
        clock.advance(Duration::minutes(6));
        controller.counter_tick();
        controller.stop(StopReason::UserRequested).await.unwrap();

        let view = controller.view();
        clock.advance(Duration::minutes(6));
        assert!(controller.simulation_tick().is_none());
        controller.counter_tick();
        controller.poll().await.unwrap();
        assert_eq!(controller.view(), view);
        assert_eq!(stub.monitor_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_poll_failure_is_not_fatal() {
        let stub = Arc::new(StubService::new(20.0));
        let (controller, _, clock) = setup(stub.clone());
        controller.start().await.unwrap();

        stub.fail_monitor.store(true, Ordering::SeqCst);
        assert!(controller.poll().await.is_err());
        assert_eq!(controller.phase(), SessionPhase::Charging);

        clock.advance(Duration::minutes(6));
        let tick = controller.simulation_tick().unwrap();
        assert_eq!(tick.source, ReadingSource::Simulated);
        assert!(tick.reading.battery_pct > 20.0);
    }

    #[tokio::test]
    async fn test_poll_snapshot_overrides_simulation() {
        let stub = Arc::new(StubService::new(20.0));
        let (controller, _, clock) = setup(stub.clone());
        controller.start().await.unwrap();

        clock.advance(Duration::minutes(6));
        *stub.battery_pct.lock().unwrap() = 23.0;
        controller.poll().await.unwrap();
        clock.advance(Duration::seconds(1));

        let tick = controller.simulation_tick().unwrap();
        assert_eq!(tick.source, ReadingSource::Authoritative);
        assert_eq!(tick.reading.battery_pct, 23.0);
    }

    #[tokio::test]
    async fn test_payment_flow() {
        let stub = Arc::new(StubService::new(20.0));
        let (controller, store, _) = setup(stub.clone());

        assert!(matches!(
            controller.pay(PaymentMethod::Card).await,
            Err(SessionError::InvalidPhase { .. })
        ));
        controller.start().await.unwrap();
        controller.stop(StopReason::UserRequested).await.unwrap();

        stub.fail_payment.store(true, Ordering::SeqCst);
        assert!(controller.pay(PaymentMethod::Card).await.is_err());
        assert_eq!(controller.view().payment_url, None);
        assert_eq!(
            store.lock().unwrap().booking("BK-1").unwrap().status,
            BookingStatus::Completed
        );

        stub.fail_payment.store(false, Ordering::SeqCst);
        let payment = controller.pay(PaymentMethod::Card).await.unwrap();
        assert_eq!(payment.payment_url, "https://pay.example.test/S-1");
        assert_eq!(
            controller.view().payment_url.as_deref(),
            Some("https://pay.example.test/S-1")
        );
        assert_eq!(stub.payment_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_expired_is_distinct() {
        let stub = Arc::new(StubService::new(20.0));
        let (controller, _, _) = setup(stub);
        let error = controller.payment_detail().await.unwrap_err();
        assert!(matches!(
            error,
            SessionError::Remote(RemoteError::AuthExpired { .. })
        ));
        assert!(!error.is_retriable());
    }

    #[tokio::test]
    async fn test_start_rejects_cancelled_booking() {
        let stub = Arc::new(StubService::new(20.0));
        let (controller, store, _) = setup(stub.clone());
        store.lock().unwrap().cancel_booking("BK-1").unwrap();

        assert!(matches!(
            controller.start().await,
            Err(SessionError::Booking(BookingError::InvalidTransition { .. }))
        ));
        assert_eq!(stub.monitor_calls.load(Ordering::SeqCst), 0);
    }
}
