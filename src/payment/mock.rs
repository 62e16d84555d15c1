use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CheckoutRequest, CheckoutSession, PaymentError, PaymentProvider, SessionStatus};

#[derive(Default)]
struct Ledger {
    next_id: u64,
    requests: Vec<CheckoutRequest>,
    paid: HashMap<String, bool>,
}

/// In-process provider for development and tests.
///
/// Sessions start unpaid; [`MockPaymentProvider::mark_paid`] flips them.
#[derive(Default)]
pub struct MockPaymentProvider {
    ledger: Mutex<Ledger>,
    fail_checkout: bool,
    delay: Option<Duration>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every checkout request is rejected.
    pub fn failing() -> Self {
        MockPaymentProvider {
            fail_checkout: true,
            ..Self::default()
        }
    }

    /// Every call sleeps first, to exercise caller timeouts.
    pub fn slow(delay: Duration) -> Self {
        MockPaymentProvider {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub async fn mark_paid(&self, session_id: &str) {
        self.ledger
            .lock()
            .await
            .paid
            .insert(session_id.to_string(), true);
    }

    pub async fn requests(&self) -> Vec<CheckoutRequest> {
        self.ledger.lock().await.requests.clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        self.pause().await;
        if self.fail_checkout {
            return Err(PaymentError::Rejected {
                status: 500,
                message: "mock checkout failure".to_string(),
            });
        }

        let mut ledger = self.ledger.lock().await;
        ledger.next_id += 1;
        let session_id = format!("cs_mock_{}", ledger.next_id);
        ledger.requests.push(request.clone());
        ledger.paid.insert(session_id.clone(), false);

        Ok(CheckoutSession {
            redirect_url: format!("https://checkout.mock/{session_id}"),
            session_id,
        })
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, PaymentError> {
        self.pause().await;
        match self.ledger.lock().await.paid.get(session_id) {
            Some(paid) => Ok(SessionStatus { paid: *paid }),
            None => Err(PaymentError::Rejected {
                status: 404,
                message: format!("no such checkout session: {session_id}"),
            }),
        }
    }
}
