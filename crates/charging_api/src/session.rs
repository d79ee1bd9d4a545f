use axum::{
    Json,
    extract::{Path, State},
};
use charging_engine::{
    SessionView, StopReason,
    remote::{PaymentDetail, PaymentInitiation, PaymentMethod},
};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::booking::BookingResponse;
use crate::error::ApiError;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub method: PaymentMethod,
}

/// Current state of the session screen for a booking
pub async fn get_session(
    State(app_state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let controller = app_state.engine.controller(&booking_id)?;
    Ok(Json(controller.view()))
}

/// Start charging for a confirmed booking
pub async fn start_session(
    State(app_state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking = app_state.engine.start_session(&booking_id).await?;
    Ok(Json(BookingResponse { booking }))
}

pub async fn pause_session(
    State(app_state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let controller = app_state.engine.controller(&booking_id)?;
    controller.pause()?;
    Ok(Json(controller.view()))
}

pub async fn resume_session(
    State(app_state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let controller = app_state.engine.controller(&booking_id)?;
    controller.resume()?;
    Ok(Json(controller.view()))
}

/// Stop charging and complete the booking
pub async fn stop_session(
    State(app_state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<BookingResponse>, ApiError> {
    let controller = app_state.engine.controller(&booking_id)?;
    let booking = controller.stop(StopReason::UserRequested).await?;
    Ok(Json(BookingResponse { booking }))
}

/// Request a payment link for a completed session
pub async fn pay_session(
    State(app_state): State<AppState>,
    Path(booking_id): Path<String>,
    Json(payload): Json<PaymentRequest>,
) -> Result<Json<PaymentInitiation>, ApiError> {
    let controller = app_state.engine.controller(&booking_id)?;
    Ok(Json(controller.pay(payload.method).await?))
}

pub async fn payment_detail(
    State(app_state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<PaymentDetail>, ApiError> {
    let controller = app_state.engine.controller(&booking_id)?;
    Ok(Json(controller.payment_detail().await?))
}
