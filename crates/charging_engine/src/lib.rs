//! Charging session runtime: simulation, lifecycle control and the
//! operator backend contract.

pub mod controller;
pub mod driver;
pub mod http;
pub mod remote;
pub mod simulator;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use charging_core::{
    Booking, BookingDraft, BookingError, BookingStatus, BookingStore, Station, SubscriptionCatalog,
};
use thiserror::Error;

pub use crate::controller::{SessionController, SessionPhase, SessionSettings, SessionView, StopReason};
pub use crate::driver::Cadence;
pub use crate::remote::ChargingService;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("Charging service unavailable: {message}")]
    Unavailable { message: String },
    #[error("Authentication expired: {message}")]
    AuthExpired { message: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Booking(#[from] BookingError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("Station {station_id} not found")]
    StationNotFound { station_id: String },
    #[error("Session for booking {booking_id} is already finishing")]
    AlreadyFinishing { booking_id: String },
    #[error("Cannot {action} a session that is {phase}")]
    InvalidPhase {
        action: &'static str,
        phase: SessionPhase,
    },
}

impl SessionError {
    /// Whether repeating the same action may succeed without user changes.
    pub fn is_retriable(&self) -> bool {
        matches!(self, SessionError::Remote(RemoteError::Unavailable { .. }))
    }
}

/// Owns the booking store and one controller per booking that has a session.
pub struct Engine {
    store: Arc<Mutex<BookingStore>>,
    remote: Arc<dyn ChargingService>,
    stations: Vec<Station>,
    catalog: Arc<SubscriptionCatalog>,
    battery_capacity_kwh: f64,
    cadence: Cadence,
    sessions: Mutex<HashMap<String, Arc<SessionController>>>,
}

impl Engine {
    pub fn new(
        store: BookingStore,
        remote: Arc<dyn ChargingService>,
        stations: Vec<Station>,
        catalog: Arc<SubscriptionCatalog>,
        battery_capacity_kwh: f64,
        cadence: Cadence,
    ) -> Self {
        Engine {
            store: Arc::new(Mutex::new(store)),
            remote,
            stations,
            catalog,
            battery_capacity_kwh,
            cadence,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> Arc<Mutex<BookingStore>> {
        self.store.clone()
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn station(&self, station_id: &str) -> Result<&Station, SessionError> {
        self.stations
            .iter()
            .find(|station| station.id == station_id)
            .ok_or_else(|| SessionError::StationNotFound {
                station_id: station_id.into(),
            })
    }

    pub fn catalog(&self) -> Arc<SubscriptionCatalog> {
        self.catalog.clone()
    }

    pub fn battery_capacity_kwh(&self) -> f64 {
        self.battery_capacity_kwh
    }

    /// Book a slot at a known station.
    pub fn add_booking(&self, draft: BookingDraft) -> Result<Booking, SessionError> {
        self.station(&draft.station_id)?;
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        Ok(store.add_booking(draft)?)
    }

    /// Staff override of a booking status. Starting and completing are
    /// refused while a live session owns the booking; those go through the
    /// session controls so the operator session is ended too.
    pub fn update_status(
        &self,
        booking_id: &str,
        status: BookingStatus,
    ) -> Result<Booking, SessionError> {
        if matches!(status, BookingStatus::Active | BookingStatus::Completed) {
            if let Some(controller) = self.session(booking_id) {
                let phase = controller.phase();
                if phase.is_live() {
                    tracing::warn!(
                        "Refused {} override for booking {} with a {} session",
                        status,
                        booking_id,
                        phase
                    );
                    return Err(SessionError::InvalidPhase {
                        action: "override the status of",
                        phase,
                    });
                }
            }
        }
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        Ok(store.update_status(booking_id, status)?)
    }

    fn settings_for(&self, booking: &Booking) -> Result<SessionSettings, SessionError> {
        let station = self.station(&booking.station_id)?;
        let charging_power_kw = station
            .connectors
            .iter()
            .find(|connector| connector.charger_class == booking.charger_class)
            .map(|connector| connector.power_kw)
            .unwrap_or_else(|| booking.charger_class.rated_power_kw());

        let mut settings = SessionSettings::new(
            charging_power_kw,
            self.battery_capacity_kwh,
            station.tariff_per_kwh,
        );
        settings.snapshot_freshness =
            chrono::Duration::milliseconds(self.cadence.snapshot_freshness_ms as i64);
        settings.plan = self.catalog.active_plan(&booking.user_id).cloned();
        Ok(settings)
    }

    pub fn session(&self, booking_id: &str) -> Option<Arc<SessionController>> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(booking_id)
            .cloned()
    }

    /// The controller for a booking, created on first use. The booking id
    /// doubles as the operator session id.
    pub fn controller(&self, booking_id: &str) -> Result<Arc<SessionController>, SessionError> {
        if let Some(controller) = self.session(booking_id) {
            return Ok(controller);
        }
        let booking = self
            .store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .booking(booking_id)
            .cloned()
            .ok_or_else(|| BookingError::NotFound {
                id: booking_id.into(),
            })?;
        let settings = self.settings_for(&booking)?;

        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let controller = sessions
            .entry(booking_id.to_string())
            .or_insert_with(|| {
                Arc::new(SessionController::new(
                    &booking,
                    booking.id.clone(),
                    self.store.clone(),
                    self.remote.clone(),
                    settings,
                ))
            })
            .clone();
        Ok(controller)
    }

    /// Start charging and spawn the session timers.
    pub async fn start_session(&self, booking_id: &str) -> Result<Booking, SessionError> {
        let controller = self.controller(booking_id)?;
        let booking = controller.start().await?;
        driver::spawn_session(controller, self.cadence);
        Ok(booking)
    }
}
