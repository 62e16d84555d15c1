use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use mongodb::bson::DateTime;

use crate::config::BookingSettings;
use crate::error::{BookingError, BookingResult};
use crate::models::booking_model::{Booking, BookingDetail, CancellationReceipt};
use crate::services::booking_detail;
use crate::store::BookingStore;
use crate::utils::{day_of, parse_object_id, today_in};

const PAST_BOOKING_REMOVED: &str = "Booking removed from history successfully";
const BOOKING_CANCELED: &str =
    "Booking canceled successfully. Your refund will be processed within 2-3 working days.";

/// Cancellation and expiry of existing bookings.
pub struct BookingLifecycleManager {
    store: Arc<dyn BookingStore>,
    settings: BookingSettings,
}

impl BookingLifecycleManager {
    pub fn new(store: Arc<dyn BookingStore>, settings: BookingSettings) -> Self {
        BookingLifecycleManager { store, settings }
    }

    pub async fn get_booking(&self, booking_id: &str) -> BookingResult<BookingDetail> {
        let id = parse_object_id("booking", booking_id)?;
        let booking = self
            .store
            .get_booking(id)
            .await?
            .ok_or_else(|| BookingError::NotFound("Booking".to_string()))?;
        booking_detail(&self.store, booking).await
    }

    /// Deletes the booking, releases its seats and unlinks it from its user
    /// and movie. A show day before today counts as history cleanup.
    pub async fn cancel(&self, booking_id: &str) -> BookingResult<(Booking, CancellationReceipt)> {
        let id = parse_object_id("booking", booking_id)?;
        let booking = self
            .store
            .get_booking(id)
            .await?
            .ok_or_else(|| BookingError::NotFound("Booking".to_string()))?;

        let offset = self.settings.offset();
        let is_past_booking = day_of(booking.date, offset) < today_in(offset, Utc::now());

        let removed = self.store.remove(id).await?;
        tracing::info!(
            booking_id = %id,
            is_past_booking,
            seats = ?removed.seat_numbers,
            status = removed.payment_info.status.as_str(),
            "booking removed"
        );

        let message = if is_past_booking {
            PAST_BOOKING_REMOVED
        } else {
            BOOKING_CANCELED
        };
        Ok((
            removed,
            CancellationReceipt {
                message: message.to_string(),
                is_past_booking,
            },
        ))
    }

    /// Fails pending bookings older than the configured TTL and frees their seats.
    pub async fn expire_stale(&self) -> BookingResult<Vec<Booking>> {
        let ttl = ChronoDuration::from_std(self.settings.pending_ttl).unwrap_or(ChronoDuration::zero());
        let cutoff = DateTime::from_chrono(Utc::now() - ttl);
        self.expire_created_before(cutoff).await
    }

    pub async fn expire_created_before(&self, cutoff: DateTime) -> BookingResult<Vec<Booking>> {
        let expired = self.store.expire_pending(cutoff).await?;
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired unpaid bookings");
        }
        Ok(expired)
    }
}
