use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use charging_core::{Booking, BookingDraft, BookingError, BookingStatus, BookingSummary, Notification};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::error::ApiError;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub booking: Booking,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingListQuery {
    pub status: Option<BookingStatus>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub status: BookingStatus,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub unread: usize,
}

/// Create a booking at a known station
pub async fn create_booking(
    State(app_state): State<AppState>,
    Json(draft): Json<BookingDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = app_state.engine.add_booking(draft)?;
    Ok((StatusCode::CREATED, Json(BookingResponse { booking })))
}

/// List bookings, most recent first
pub async fn list_bookings(
    State(app_state): State<AppState>,
    Query(query): Query<BookingListQuery>,
) -> Json<Vec<Booking>> {
    let bookings = app_state.with_store(|store| match query.status {
        Some(status) => store
            .bookings_with_status(status)
            .into_iter()
            .cloned()
            .collect(),
        None => store.bookings().to_vec(),
    });
    Json(bookings)
}

pub async fn get_booking(
    State(app_state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking = app_state
        .with_store(|store| store.booking(&booking_id).cloned())
        .ok_or(BookingError::NotFound { id: booking_id })?;
    Ok(Json(BookingResponse { booking }))
}

/// Cancel a booking that has not started yet
pub async fn cancel_booking(
    State(app_state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking = app_state.with_store(|store| store.cancel_booking(&booking_id))?;
    Ok(Json(BookingResponse { booking }))
}

/// Staff override of a booking status, subject to the same transition rules.
/// Refused while the booking has a live session.
pub async fn update_status(
    State(app_state): State<AppState>,
    Path(booking_id): Path<String>,
    Json(payload): Json<StatusUpdateRequest>,
) -> Result<Json<BookingResponse>, ApiError> {
    tracing::info!("Setting booking {} to {}", booking_id, payload.status);
    let booking = app_state.engine.update_status(&booking_id, payload.status)?;
    Ok(Json(BookingResponse { booking }))
}

pub async fn summary(State(app_state): State<AppState>) -> Json<BookingSummary> {
    Json(app_state.with_store(|store| store.summary()))
}

pub async fn list_notifications(State(app_state): State<AppState>) -> Json<Vec<Notification>> {
    Json(app_state.with_store(|store| store.notifications().to_vec()))
}

pub async fn unread_count(State(app_state): State<AppState>) -> Json<UnreadCountResponse> {
    Json(UnreadCountResponse {
        unread: app_state.with_store(|store| store.unread_count()),
    })
}

pub async fn mark_read(
    State(app_state): State<AppState>,
    Path(notification_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    app_state.with_store(|store| store.mark_read(&notification_id))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(State(app_state): State<AppState>) -> Json<UnreadCountResponse> {
    app_state.with_store(|store| store.mark_all_read());
    Json(UnreadCountResponse { unread: 0 })
}
