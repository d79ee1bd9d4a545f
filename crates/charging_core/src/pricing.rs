use serde::{Deserialize, Serialize};

use crate::{BookingError, Money, Station, SubscriptionPlan};

/// Usable battery capacity assumed for every vehicle, in kWh.
pub const DEFAULT_BATTERY_CAPACITY_KWH: f64 = 75.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub original_price: Money,
    pub discounted_price: Money,
    pub discount_percent: u8,
    pub discount_amount: Money,
}

impl PriceBreakdown {
    fn undiscounted(original_price: Money) -> Self {
        PriceBreakdown {
            original_price,
            discounted_price: original_price,
            discount_percent: 0,
            discount_amount: 0,
        }
    }
}

/// Price `energy_kwh` at `tariff_per_kwh`, applying the flat charging
/// discount of the user's plan when there is one.
pub fn compute_energy_cost(
    energy_kwh: f64,
    tariff_per_kwh: Money,
    plan: Option<&SubscriptionPlan>,
) -> PriceBreakdown {
    let original_price = (energy_kwh.max(0.0) * tariff_per_kwh as f64).round() as Money;
    let Some(plan) = plan else {
        return PriceBreakdown::undiscounted(original_price);
    };
    if original_price <= 0 {
        return PriceBreakdown::undiscounted(original_price.max(0));
    }

    let discount_percent = plan.charging_discount.min(100);
    let discount_amount =
        (original_price as f64 * f64::from(discount_percent) / 100.0).round() as Money;
    PriceBreakdown {
        original_price,
        discounted_price: (original_price - discount_amount).max(0),
        discount_percent,
        discount_amount,
    }
}

/// Energy needed to go from `current_pct` to `target_pct`. A target at or
/// below the current level needs nothing.
pub fn energy_needed_kwh(current_pct: u8, target_pct: u8, battery_capacity_kwh: f64) -> f64 {
    f64::from(target_pct.saturating_sub(current_pct)) * battery_capacity_kwh / 100.0
}

/// Charging time in whole minutes, rounded up.
pub fn estimate_duration_minutes(energy_kwh: f64, charger_power_kw: f64) -> u32 {
    if energy_kwh <= 0.0 || charger_power_kw <= 0.0 {
        return 0;
    }
    (energy_kwh / charger_power_kw * 60.0).ceil() as u32
}

/// Everything the booking form shows before a booking is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeQuote {
    pub energy_kwh: f64,
    pub duration_minutes: u32,
    pub charger_power_kw: f64,
    pub price: PriceBreakdown,
}

pub fn quote(
    station: &Station,
    current_pct: u8,
    target_pct: u8,
    battery_capacity_kwh: f64,
    plan: Option<&SubscriptionPlan>,
    connector: Option<usize>,
) -> Result<ChargeQuote, BookingError> {
    let charger_power_kw =
        station
            .charging_power_kw(connector)
            .ok_or_else(|| BookingError::Validation {
                field: "connector".into(),
                message: format!(
                    "station {} has no connector {}",
                    station.id,
                    connector.unwrap_or(0)
                ),
            })?;

    let energy_kwh = energy_needed_kwh(current_pct, target_pct, battery_capacity_kwh);
    Ok(ChargeQuote {
        energy_kwh,
        duration_minutes: estimate_duration_minutes(energy_kwh, charger_power_kw),
        charger_power_kw,
        price: compute_energy_cost(energy_kwh, station.tariff_per_kwh, plan),
    })
}
