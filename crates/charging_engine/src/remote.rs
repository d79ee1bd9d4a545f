use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::RemoteError;

/// Authoritative battery, energy and cost figures reported by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub current_battery_pct: f64,
    pub energy_consumed_kwh: f64,
    pub cost_accrued: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaymentMethod {
    Card,
    EWallet,
    BankTransfer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiation {
    pub payment_url: String,
}

/// Summary shown on the payment confirmation screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetail {
    pub user_name: String,
    pub station_name: String,
    pub station_address: String,
    pub session_start: DateTime<Utc>,
    pub session_end: Option<DateTime<Utc>>,
    pub energy_consumed: f64,
    pub base_cost: f64,
    pub total_fee: f64,
}

/// Operations the session core needs from the charging operator's backend.
///
/// `end_session` is not safe to call twice for one stop; callers guard it.
#[async_trait]
pub trait ChargingService: Send + Sync {
    async fn monitor(&self, session_id: &str) -> Result<MonitorSnapshot, RemoteError>;

    async fn end_session(&self, session_id: &str) -> Result<(), RemoteError>;

    async fn initiate_payment(
        &self,
        session_id: &str,
        user_id: &str,
        method: PaymentMethod,
    ) -> Result<PaymentInitiation, RemoteError>;

    async fn payment_detail(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<PaymentDetail, RemoteError>;
}
