use std::sync::Arc;
use std::time::Duration;

use crate::error::{BookingError, BookingResult};
use crate::models::booking_model::{BookingDetail, PaymentStatus};
use crate::payment::{PaymentError, PaymentProvider, SessionStatus};
use crate::services::booking_detail;
use crate::store::{BookingStore, Completion};

#[derive(Debug, Clone)]
pub enum ConfirmationOutcome {
    /// This call moved the booking to `completed`.
    Confirmed(BookingDetail),
    /// The booking was completed before; nothing changed.
    AlreadyProcessed(BookingDetail),
    /// The provider has not seen a payment for the session yet.
    NotPaid,
}

/// Turns a paid checkout session into a completed booking.
pub struct PaymentConfirmationHandler {
    store: Arc<dyn BookingStore>,
    payments: Arc<dyn PaymentProvider>,
    timeout: Duration,
}

impl PaymentConfirmationHandler {
    pub fn new(
        store: Arc<dyn BookingStore>,
        payments: Arc<dyn PaymentProvider>,
        timeout: Duration,
    ) -> Self {
        PaymentConfirmationHandler {
            store,
            payments,
            timeout,
        }
    }

    pub async fn confirm(&self, session_id: &str) -> BookingResult<ConfirmationOutcome> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(BookingError::InvalidArgument("session id is required".to_string()));
        }

        let booking = self
            .store
            .find_by_session(session_id)
            .await?
            .ok_or_else(|| BookingError::NotFound("Booking".to_string()))?;

        if booking.payment_info.status == PaymentStatus::Completed {
            tracing::debug!(booking_id = %booking.id, "payment already processed");
            let detail = booking_detail(&self.store, booking).await?;
            return Ok(ConfirmationOutcome::AlreadyProcessed(detail));
        }

        if !self.session_status(session_id).await?.paid {
            return Ok(ConfirmationOutcome::NotPaid);
        }

        match self.store.complete(booking.id).await {
            Ok(Completion::Completed(booking)) => {
                tracing::info!(booking_id = %booking.id, session_id, "payment confirmed");
                Ok(ConfirmationOutcome::Confirmed(booking_detail(&self.store, booking).await?))
            }
            Ok(Completion::AlreadyCompleted(booking)) => Ok(ConfirmationOutcome::AlreadyProcessed(
                booking_detail(&self.store, booking).await?,
            )),
            Err(BookingError::Conflict { seats }) => {
                tracing::warn!(
                    booking_id = %booking.id,
                    session_id,
                    seats = ?seats,
                    "paid for an expired reservation whose seats were resold, refund required"
                );
                Err(BookingError::Conflict { seats })
            }
            Err(err) => Err(err),
        }
    }

    async fn session_status(&self, session_id: &str) -> BookingResult<SessionStatus> {
        match tokio::time::timeout(self.timeout, self.payments.session_status(session_id)).await {
            Ok(status) => Ok(status?),
            Err(_) => Err(PaymentError::Timeout.into()),
        }
    }
}
