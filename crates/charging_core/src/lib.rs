mod clock;
mod ids;
mod models;
mod notifier;
pub mod penalty;
pub mod pricing;
mod subscription;

pub use crate::clock::*;
pub use crate::ids::*;
pub use crate::models::*;
pub use crate::notifier::*;
pub use crate::subscription::*;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookingError {
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },
    #[error("Booking {id} not found")]
    NotFound { id: String },
    #[error("Notification {id} not found")]
    NotificationNotFound { id: String },
    #[error("Booking {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: BookingStatus,
        to: BookingStatus,
    },
}

impl BookingError {
    fn validation(field: &str, message: impl Into<String>) -> Self {
        BookingError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Totals over every booking in the store, for staff reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSummary {
    pub confirmed: usize,
    pub active: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub energy_delivered_kwh: f64,
    pub energy_revenue: Money,
    pub penalties_collected: Money,
}

/// System of record for the bookings and notifications of one host.
///
/// Bookings and notifications are both kept most-recent-first.
pub struct BookingStore {
    bookings: Vec<Booking>,
    notifications: Vec<Notification>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    notifier: Arc<dyn Notifier>,
}

impl Default for BookingStore {
    fn default() -> Self {
        BookingStore::new(
            Arc::new(SystemClock),
            Arc::new(UuidGenerator),
            Arc::new(TracingNotifier),
        )
    }
}

impl BookingStore {
    pub fn new(
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        BookingStore {
            bookings: Vec::new(),
            notifications: Vec::new(),
            clock,
            ids,
            notifier,
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn bookings(&self) -> &[Booking] {
        &self.bookings
    }

    pub fn booking(&self, id: &str) -> Option<&Booking> {
        self.bookings.iter().find(|booking| booking.id == id)
    }

    pub fn bookings_with_status(&self, status: BookingStatus) -> Vec<&Booking> {
        self.bookings
            .iter()
            .filter(|booking| booking.status == status)
            .collect()
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    fn index_of(&self, id: &str) -> Result<usize, BookingError> {
        self.bookings
            .iter()
            .position(|booking| booking.id == id)
            .ok_or_else(|| BookingError::NotFound { id: id.into() })
    }

    fn ensure_transition(&self, idx: usize, to: BookingStatus) -> Result<(), BookingError> {
        let booking = &self.bookings[idx];
        if booking.status.can_transition_to(to) {
            Ok(())
        } else {
            tracing::warn!(
                "Rejected transition of booking {} from {} to {}",
                booking.id,
                booking.status,
                to
            );
            Err(BookingError::InvalidTransition {
                id: booking.id.clone(),
                from: booking.status,
                to,
            })
        }
    }

    fn validate(draft: &BookingDraft) -> Result<(), BookingError> {
        if draft.station_id.trim().is_empty() {
            return Err(BookingError::validation("stationId", "a station is required"));
        }
        if draft.date.is_none() {
            return Err(BookingError::validation("date", "a date is required"));
        }
        if draft.time.is_none() {
            return Err(BookingError::validation("time", "a time is required"));
        }
        if draft.duration_minutes == 0 {
            return Err(BookingError::validation(
                "durationMinutes",
                "duration must be at least one minute",
            ));
        }
        if draft.target_battery > 100 {
            return Err(BookingError::validation(
                "targetBattery",
                "target battery cannot exceed 100%",
            ));
        }
        if draft.target_battery <= draft.current_battery {
            return Err(BookingError::validation(
                "targetBattery",
                format!(
                    "target battery {}% must be above current battery {}%",
                    draft.target_battery, draft.current_battery
                ),
            ));
        }
        Ok(())
    }

    fn push_notification(
        &mut self,
        kind: NotificationKind,
        title: &str,
        message: String,
        booking_id: Option<&str>,
    ) {
        let notification = Notification {
            id: self.ids.next_id("NT"),
            kind,
            title: title.into(),
            message,
            booking_id: booking_id.map(str::to_string),
            created_at: self.clock.now(),
            is_read: false,
        };
        self.notifier.notify(&notification);
        self.notifications.insert(0, notification);
    }

    /// Record a new booking and announce it.
    pub fn add_booking(&mut self, draft: BookingDraft) -> Result<Booking, BookingError> {
        Self::validate(&draft)?;
        let (Some(date), Some(time)) = (draft.date, draft.time) else {
            return Err(BookingError::validation("date", "a schedule is required"));
        };

        let booking = Booking {
            id: self.ids.next_id("BK"),
            user_id: draft.user_id,
            created_at: self.clock.now(),
            station_id: draft.station_id,
            date,
            time,
            duration_minutes: draft.duration_minutes,
            current_battery: draft.current_battery,
            target_battery: draft.target_battery,
            charger_class: draft.charger_class,
            status: BookingStatus::Confirmed,
            actual_start_time: None,
            actual_end_time: None,
            penalty_fees: None,
            outcome: None,
        };
        tracing::info!("Booking {} confirmed at {}", booking.id, booking.station_id);

        self.bookings.insert(0, booking.clone());
        self.push_notification(
            NotificationKind::BookingConfirmed,
            "Booking confirmed",
            format!(
                "Your charging slot at {} on {} at {} is confirmed",
                booking.station_id,
                booking.date,
                booking.time.format("%H:%M")
            ),
            Some(&booking.id),
        );
        Ok(booking)
    }

    /// Move a booking to `status`. Starting and completing stamp the actual
    /// times with the store's clock.
    pub fn update_status(&mut self, id: &str, status: BookingStatus) -> Result<Booking, BookingError> {
        match status {
            BookingStatus::Active => {
                let now = self.clock.now();
                self.start_session(id, now)
            }
            BookingStatus::Completed => {
                let now = self.clock.now();
                self.end_session(id, now)
            }
            BookingStatus::Cancelled => self.cancel_booking(id),
            BookingStatus::Confirmed => {
                let idx = self.index_of(id)?;
                self.ensure_transition(idx, status)?;
                Ok(self.bookings[idx].clone())
            }
        }
    }

    pub fn cancel_booking(&mut self, id: &str) -> Result<Booking, BookingError> {
        let idx = self.index_of(id)?;
        self.ensure_transition(idx, BookingStatus::Cancelled)?;
        self.bookings[idx].status = BookingStatus::Cancelled;
        let booking = self.bookings[idx].clone();
        tracing::info!("Booking {} cancelled", booking.id);

        self.push_notification(
            NotificationKind::BookingCancelled,
            "Booking cancelled",
            format!("Your booking at {} has been cancelled", booking.station_id),
            Some(&booking.id),
        );
        Ok(booking)
    }

    /// Activate a booking and charge the late-arrival fee, if any.
    pub fn start_session(
        &mut self,
        id: &str,
        actual_start_time: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        let idx = self.index_of(id)?;
        self.ensure_transition(idx, BookingStatus::Active)?;

        let booking = &mut self.bookings[idx];
        booking.status = BookingStatus::Active;
        booking.actual_start_time = Some(actual_start_time);
        booking.penalty_fees = penalty::compute_penalties(booking);
        let booking = booking.clone();
        tracing::info!("Session started for booking {}", booking.id);

        self.push_notification(
            NotificationKind::SessionStarted,
            "Charging started",
            format!("Charging has started at {}", booking.station_id),
            Some(&booking.id),
        );
        if let Some(fee) = booking.penalty_fees.and_then(|fees| fees.late_arrival) {
            self.push_notification(
                NotificationKind::LateArrivalPenalty,
                "Late arrival fee",
                format!("A late arrival fee of {fee} has been applied"),
                Some(&booking.id),
            );
        }
        Ok(booking)
    }

    pub fn end_session(
        &mut self,
        id: &str,
        actual_end_time: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        self.finish_session(id, actual_end_time, None)
    }

    /// Complete a booking, folding in the session's terminal values.
    ///
    /// The late-arrival fee recorded at start is kept as is; only the
    /// overstay fee is computed here.
    pub fn finish_session(
        &mut self,
        id: &str,
        actual_end_time: DateTime<Utc>,
        outcome: Option<SessionOutcome>,
    ) -> Result<Booking, BookingError> {
        let idx = self.index_of(id)?;
        self.ensure_transition(idx, BookingStatus::Completed)?;

        let booking = &mut self.bookings[idx];
        booking.status = BookingStatus::Completed;
        booking.actual_end_time = Some(actual_end_time);
        let late_arrival = booking.penalty_fees.and_then(|fees| fees.late_arrival);
        let overstay = penalty::compute_penalties(booking).and_then(|fees| fees.overstay);
        booking.penalty_fees = PenaltyFees::from_parts(late_arrival, overstay);
        booking.outcome = outcome;
        let booking = booking.clone();
        tracing::info!("Session completed for booking {}", booking.id);

        let message = match booking.outcome {
            Some(outcome) => format!(
                "Charging finished at {}: {:.2} kWh delivered",
                booking.station_id, outcome.energy_kwh
            ),
            None => format!("Charging finished at {}", booking.station_id),
        };
        self.push_notification(
            NotificationKind::SessionCompleted,
            "Charging completed",
            message,
            Some(&booking.id),
        );
        if let Some(fee) = overstay {
            self.push_notification(
                NotificationKind::OverstayPenalty,
                "Overstay fee",
                format!("An overstay fee of {fee} has been applied"),
                Some(&booking.id),
            );
        }
        Ok(booking)
    }

    /// Post a notice that is not tied to any booking.
    pub fn notify_system(&mut self, title: &str, message: impl Into<String>) {
        self.push_notification(NotificationKind::System, title, message.into(), None);
    }

    pub fn mark_read(&mut self, notification_id: &str) -> Result<(), BookingError> {
        let notification = self
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id)
            .ok_or_else(|| BookingError::NotificationNotFound {
                id: notification_id.into(),
            })?;
        notification.is_read = true;
        Ok(())
    }

    /// Returns how many notifications were flipped.
    pub fn mark_all_read(&mut self) -> usize {
        let mut flipped = 0;
        for notification in self.notifications.iter_mut().filter(|n| !n.is_read) {
            notification.is_read = true;
            flipped += 1;
        }
        flipped
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.is_read).count()
    }

    pub fn summary(&self) -> BookingSummary {
        self.bookings
            .iter()
            .fold(BookingSummary::default(), |mut summary, booking| {
                match booking.status {
                    BookingStatus::Confirmed => summary.confirmed += 1,
                    BookingStatus::Active => summary.active += 1,
                    BookingStatus::Completed => summary.completed += 1,
                    BookingStatus::Cancelled => summary.cancelled += 1,
                }
                if let Some(outcome) = booking.outcome {
                    summary.energy_delivered_kwh += outcome.energy_kwh;
                    summary.energy_revenue += outcome.price.discounted_price;
                }
                if let Some(fees) = booking.penalty_fees {
                    summary.penalties_collected += fees.total;
                }
                summary
            })
    }
}
