use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pricing::PriceBreakdown;

/// Amounts of money are expressed in currency minor units.
pub type Money = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BookingStatus {
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// `completed` and `cancelled` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Confirmed, BookingStatus::Active)
                | (BookingStatus::Active, BookingStatus::Completed)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Active => "active",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Power class of a charger, each with a nominal rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChargerClass {
    Slow,
    Fast,
    UltraFast,
}

impl ChargerClass {
    /// Nominal power in kW
    pub fn rated_power_kw(self) -> f64 {
        match self {
            ChargerClass::Slow => 7.0,
            ChargerClass::Fast => 50.0,
            ChargerClass::UltraFast => 150.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectorType {
    Type2,
    Ccs,
    Chademo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    pub connector_type: ConnectorType,
    pub charger_class: ChargerClass,
    /// Power in kW delivered by this connector
    pub power_kw: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub id: String,
    pub name: String,
    pub address: String,
    /// Price of one kWh in minor units
    pub tariff_per_kwh: Money,
    pub connectors: Vec<Connector>,
}

impl Station {
    /// Return the power of the selected connector, or of the primary
    /// (first) connector when none is selected.
    pub fn charging_power_kw(&self, connector: Option<usize>) -> Option<f64> {
        self.connectors
            .get(connector.unwrap_or(0))
            .map(|connector| connector.power_kw)
    }
}

/// What a customer submits from the booking form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDraft {
    pub user_id: String,
    pub station_id: String,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub duration_minutes: u32,
    pub current_battery: u8,
    pub target_battery: u8,
    pub charger_class: ChargerClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyFees {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub late_arrival: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overstay: Option<Money>,
    pub total: Money,
}

impl PenaltyFees {
    /// Build the fee structure from its parts. Zero or missing parts are
    /// dropped and `None` is returned when nothing is left to charge.
    pub fn from_parts(late_arrival: Option<Money>, overstay: Option<Money>) -> Option<Self> {
        let late_arrival = late_arrival.filter(|fee| *fee > 0);
        let overstay = overstay.filter(|fee| *fee > 0);
        let total = late_arrival.unwrap_or(0) + overstay.unwrap_or(0);
        if total == 0 {
            return None;
        }
        Some(PenaltyFees {
            late_arrival,
            overstay,
            total,
        })
    }
}

/// Terminal values of a charging run, folded into the booking on completion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutcome {
    pub energy_kwh: f64,
    /// Final bill for the energy, after the user's plan discount.
    pub price: PriceBreakdown,
    pub final_battery_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub station_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: u32,
    pub current_battery: u8,
    pub target_battery: u8,
    pub charger_class: ChargerClass,
    pub status: BookingStatus,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub penalty_fees: Option<PenaltyFees>,
    pub outcome: Option<SessionOutcome>,
}

impl Booking {
    /// Scheduled date and time combined into a single instant.
    pub fn scheduled_start(&self) -> DateTime<Utc> {
        self.date.and_time(self.time).and_utc()
    }

    pub fn scheduled_end(&self) -> DateTime<Utc> {
        self.scheduled_start() + Duration::minutes(i64::from(self.duration_minutes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingConfirmed,
    SessionStarted,
    SessionCompleted,
    BookingCancelled,
    LateArrivalPenalty,
    OverstayPenalty,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub booking_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}
