//! Charging API Library
//!
//! HTTP surface for booking charging slots, running charging sessions and
//! paying for them.

pub mod app_state;
pub mod booking;
pub mod config;
pub mod error;
pub mod session;
pub mod station;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Create the application router with all endpoints
pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stations", get(station::list_stations))
        .route("/stations/{station_id}", get(station::get_station))
        .route("/stations/{station_id}/quote", post(station::quote))
        .route("/subscriptions/plans", get(station::list_plans))
        .route(
            "/users/{user_id}/subscription",
            get(station::get_user_subscription),
        )
        .route(
            "/bookings",
            get(booking::list_bookings).post(booking::create_booking),
        )
        .route("/bookings/{booking_id}", get(booking::get_booking))
        .route("/bookings/{booking_id}/cancel", post(booking::cancel_booking))
        .route("/bookings/{booking_id}/status", put(booking::update_status))
        .route("/reports/summary", get(booking::summary))
        .route("/notifications", get(booking::list_notifications))
        .route("/notifications/unread-count", get(booking::unread_count))
        .route("/notifications/read-all", post(booking::mark_all_read))
        .route(
            "/notifications/{notification_id}/read",
            post(booking::mark_read),
        )
        .route("/bookings/{booking_id}/session", get(session::get_session))
        .route(
            "/bookings/{booking_id}/session/start",
            post(session::start_session),
        )
        .route(
            "/bookings/{booking_id}/session/pause",
            post(session::pause_session),
        )
        .route(
            "/bookings/{booking_id}/session/resume",
            post(session::resume_session),
        )
        .route(
            "/bookings/{booking_id}/session/stop",
            post(session::stop_session),
        )
        .route("/bookings/{booking_id}/session/pay", post(session::pay_session))
        .route(
            "/bookings/{booking_id}/session/payment",
            get(session::payment_detail),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
