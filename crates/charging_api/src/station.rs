use axum::{
    Json,
    extract::{Path, State},
};
use charging_core::{Station, SubscriptionPlan, UserSubscription, pricing};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::error::ApiError;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub user_id: Option<String>,
    pub current_battery: u8,
    pub target_battery: u8,
    /// Index of the connector; the primary connector when absent
    pub connector: Option<usize>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSubscriptionResponse {
    pub subscription: Option<UserSubscription>,
    pub plan: Option<SubscriptionPlan>,
}

/// List every station
pub async fn list_stations(State(app_state): State<AppState>) -> Json<Vec<Station>> {
    Json(app_state.engine.stations().to_vec())
}

pub async fn get_station(
    State(app_state): State<AppState>,
    Path(station_id): Path<String>,
) -> Result<Json<Station>, ApiError> {
    Ok(Json(app_state.engine.station(&station_id)?.clone()))
}

/// Estimate energy, duration and price for a charge at a station
pub async fn quote(
    State(app_state): State<AppState>,
    Path(station_id): Path<String>,
    Json(payload): Json<QuoteRequest>,
) -> Result<Json<pricing::ChargeQuote>, ApiError> {
    tracing::info!("Quoting charge at station {}", station_id);
    let station = app_state.engine.station(&station_id)?;
    let plan = payload
        .user_id
        .as_deref()
        .and_then(|user_id| app_state.catalog.active_plan(user_id));
    let quote = pricing::quote(
        station,
        payload.current_battery,
        payload.target_battery,
        app_state.engine.battery_capacity_kwh(),
        plan,
        payload.connector,
    )?;
    Ok(Json(quote))
}

pub async fn list_plans(State(app_state): State<AppState>) -> Json<Vec<SubscriptionPlan>> {
    Json(app_state.catalog.plans().to_vec())
}

/// The user's active subscription, if any
pub async fn get_user_subscription(
    State(app_state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<UserSubscriptionResponse> {
    Json(UserSubscriptionResponse {
        subscription: app_state.catalog.current_subscription(&user_id).cloned(),
        plan: app_state.catalog.active_plan(&user_id).cloned(),
    })
}
