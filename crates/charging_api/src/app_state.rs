use std::sync::Arc;

use charging_core::{BookingStore, SubscriptionCatalog};
use charging_engine::Engine;

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// Bookings, stations and live sessions
    pub engine: Arc<Engine>,
    /// Plans and enrollments loaded at startup (immutable), shared with the engine
    pub catalog: Arc<SubscriptionCatalog>,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            catalog: engine.catalog(),
            engine: Arc::new(engine),
        }
    }

    /// Runs `f` with the booking store locked. Never hold the lock across an await.
    pub fn with_store<T>(&self, f: impl FnOnce(&mut BookingStore) -> T) -> T {
        let store = self.engine.store();
        let mut guard = store.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}
