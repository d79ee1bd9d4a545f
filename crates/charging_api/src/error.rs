use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use charging_core::BookingError;
use charging_engine::{RemoteError, SessionError};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub retriable: bool,
}

/// Any failure a handler can report, rendered as a JSON error body.
#[derive(Debug)]
pub struct ApiError(pub SessionError);

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        ApiError(error)
    }
}

impl From<BookingError> for ApiError {
    fn from(error: BookingError) -> Self {
        ApiError(error.into())
    }
}

fn status_for(error: &SessionError) -> StatusCode {
    match error {
        SessionError::Booking(BookingError::Validation { .. }) => StatusCode::BAD_REQUEST,
        SessionError::Booking(BookingError::NotFound { .. })
        | SessionError::Booking(BookingError::NotificationNotFound { .. })
        | SessionError::StationNotFound { .. } => StatusCode::NOT_FOUND,
        SessionError::Booking(BookingError::InvalidTransition { .. })
        | SessionError::AlreadyFinishing { .. }
        | SessionError::InvalidPhase { .. } => StatusCode::CONFLICT,
        SessionError::Remote(RemoteError::Unavailable { .. }) => StatusCode::BAD_GATEWAY,
        SessionError::Remote(RemoteError::AuthExpired { .. }) => StatusCode::UNAUTHORIZED,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", self.0);
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
            retriable: self.0.is_retriable(),
        };
        (status, Json(body)).into_response()
    }
}
