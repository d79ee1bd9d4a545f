//! JSON-over-HTTP client for the operator backend, authenticated with a
//! bearer token handed over by the host.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::RemoteError;
use crate::remote::{ChargingService, MonitorSnapshot, PaymentDetail, PaymentInitiation, PaymentMethod};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    pub base_url: String,
    pub auth_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitiatePaymentRequest<'a> {
    session_id: &'a str,
    user_id: &'a str,
    method: PaymentMethod,
}

pub struct HttpChargingService {
    client: reqwest::Client,
    base_url: String,
    auth_token: String,
}

impl HttpChargingService {
    pub fn new(config: &RemoteConfig) -> Self {
        HttpChargingService {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let response = request
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable {
                message: e.to_string(),
            })?;
        match classify_status(response.status()) {
            Some(error) => Err(error),
            None => Ok(response),
        }
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RemoteError> {
        response.json::<T>().await.map_err(|e| RemoteError::Unavailable {
            message: format!("unreadable response: {e}"),
        })
    }
}

/// Map a non-success status to the error the caller should surface.
pub(crate) fn classify_status(status: StatusCode) -> Option<RemoteError> {
    if status.is_success() {
        return None;
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Some(RemoteError::AuthExpired {
            message: format!("operator backend answered {status}"),
        });
    }
    Some(RemoteError::Unavailable {
        message: format!("operator backend answered {status}"),
    })
}

#[async_trait]
impl ChargingService for HttpChargingService {
    async fn monitor(&self, session_id: &str) -> Result<MonitorSnapshot, RemoteError> {
        tracing::debug!("Polling monitor for session {}", session_id);
        let response = self
            .send(self.client.get(self.url(&format!("sessions/{session_id}/monitor"))))
            .await?;
        Self::read_json(response).await
    }

    async fn end_session(&self, session_id: &str) -> Result<(), RemoteError> {
        tracing::info!("Ending remote session {}", session_id);
        self.send(self.client.post(self.url(&format!("sessions/{session_id}/end"))))
            .await?;
        Ok(())
    }

    async fn initiate_payment(
        &self,
        session_id: &str,
        user_id: &str,
        method: PaymentMethod,
    ) -> Result<PaymentInitiation, RemoteError> {
        tracing::info!("Initiating {:?} payment for session {}", method, session_id);
        let body = InitiatePaymentRequest {
            session_id,
            user_id,
            method,
        };
        let response = self
            .send(self.client.post(self.url("payments/initiate")).json(&body))
            .await?;
        Self::read_json(response).await
    }

    async fn payment_detail(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<PaymentDetail, RemoteError> {
        let response = self
            .send(
                self.client
                    .get(self.url(&format!("payments/{session_id}")))
                    .query(&[("userId", user_id)]),
            )
            .await?;
        Self::read_json(response).await
    }
}
