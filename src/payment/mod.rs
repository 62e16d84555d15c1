//! Checkout provider used to collect payment for a pending booking.
//!
//! The services only see [`PaymentProvider`]; handles are injected at
//! construction time so tests can swap in [`mock::MockPaymentProvider`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BookingError;

pub mod mock;
pub mod stripe;

pub use mock::MockPaymentProvider;
pub use stripe::StripeProvider;

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub product_name: String,
    pub description: String,
    pub currency: String,
    /// Price of one seat in minor currency units.
    pub unit_amount: i64,
    pub quantity: u32,
    pub success_url: String,
    pub cancel_url: String,
    pub client_reference_id: String,
    pub metadata: BTreeMap<String, String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStatus {
    pub paid: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("request to payment provider failed: {0}")]
    Transport(String),

    #[error("payment provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("payment provider did not answer in time")]
    Timeout,

    #[error("unexpected payment provider response: {0}")]
    Malformed(String),
}

impl From<PaymentError> for BookingError {
    fn from(err: PaymentError) -> Self {
        BookingError::UpstreamFailure(err.to_string())
    }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, PaymentError>;
}

/// Converts a price in major units to the provider's minor units.
pub fn to_minor_units(price: f64) -> i64 {
    (price * 100.0).round() as i64
}
