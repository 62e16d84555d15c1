use axum::{
    extract::{Extension, Path},
    response::Json,
};
use std::sync::Arc;

use crate::app::AppState;
use crate::error::BookingError;
use crate::models::booking_model::PaymentVerification;
use crate::services::ConfirmationOutcome;

pub async fn verify_payment(
    Path(session_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<PaymentVerification>, BookingError> {
    let verification = match state.confirmations.confirm(&session_id).await? {
        ConfirmationOutcome::Confirmed(booking) => PaymentVerification {
            status: "paid".to_string(),
            message: "Payment verified successfully".to_string(),
            booking: Some(booking),
            already_processed: false,
        },
        ConfirmationOutcome::AlreadyProcessed(booking) => PaymentVerification {
            status: "paid".to_string(),
            message: "Payment already processed".to_string(),
            booking: Some(booking),
            already_processed: true,
        },
        ConfirmationOutcome::NotPaid => PaymentVerification {
            status: "unpaid".to_string(),
            message: "Payment not completed".to_string(),
            booking: None,
            already_processed: false,
        },
    };

    Ok(Json(verification))
}
