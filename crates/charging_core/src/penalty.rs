//! Late-arrival and overstay fees.
//!
//! Fees are charged per started minute beyond a grace period, measured
//! against the booking's schedule.

use chrono::{DateTime, Utc};

use crate::{Booking, Money, PenaltyFees};

/// Minutes a driver may arrive late without being charged.
pub const GRACE_LATE_MINUTES: f64 = 10.0;
/// Fee per minute of late arrival beyond the grace period.
pub const RATE_LATE_PER_MINUTE: Money = 2000;
/// Minutes a vehicle may stay past the scheduled end without being charged.
pub const GRACE_OVERSTAY_MINUTES: f64 = 15.0;
/// Fee per minute of overstay beyond the grace period.
pub const RATE_OVERSTAY_PER_MINUTE: Money = 1500;

fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 60_000.0
}

fn fee_beyond_grace(minutes: f64, grace: f64, rate: Money) -> Option<Money> {
    let chargeable = (minutes - grace).max(0.0);
    if chargeable > 0.0 {
        Some(chargeable.ceil() as Money * rate)
    } else {
        None
    }
}

pub fn late_arrival_fee(scheduled_start: DateTime<Utc>, actual_start: DateTime<Utc>) -> Option<Money> {
    fee_beyond_grace(
        minutes_between(scheduled_start, actual_start),
        GRACE_LATE_MINUTES,
        RATE_LATE_PER_MINUTE,
    )
}

pub fn overstay_fee(scheduled_end: DateTime<Utc>, actual_end: DateTime<Utc>) -> Option<Money> {
    fee_beyond_grace(
        minutes_between(scheduled_end, actual_end),
        GRACE_OVERSTAY_MINUTES,
        RATE_OVERSTAY_PER_MINUTE,
    )
}

/// Compute the fees owed for a booking snapshot.
///
/// The late-arrival fee needs `actual_start_time`; the overstay fee needs both
/// actual times. Returns `None` when no fee applies.
pub fn compute_penalties(booking: &Booking) -> Option<PenaltyFees> {
    let actual_start = booking.actual_start_time?;
    let late_arrival = late_arrival_fee(booking.scheduled_start(), actual_start);
    let overstay = booking
        .actual_end_time
        .and_then(|actual_end| overstay_fee(booking.scheduled_end(), actual_end));

    PenaltyFees::from_parts(late_arrival, overstay)
}
