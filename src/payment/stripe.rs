use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{CheckoutRequest, CheckoutSession, PaymentError, PaymentProvider, SessionStatus};

const STRIPE_API: &str = "https://api.stripe.com/v1";

/// Stripe Checkout over its REST API.
pub struct StripeProvider {
    http: reqwest::Client,
    secret_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    id: String,
    url: Option<String>,
    payment_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

impl StripeProvider {
    pub fn new(secret_key: impl Into<String>, timeout: Duration) -> Result<Self, PaymentError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Transport(e.to_string()))?;
        Ok(StripeProvider {
            http,
            secret_key: secret_key.into(),
            base_url: STRIPE_API.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn read_session(response: reqwest::Response) -> Result<SessionBody, PaymentError> {
        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error.message.unwrap_or_default(),
                Err(_) => String::new(),
            };
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<SessionBody>()
            .await
            .map_err(|e| PaymentError::Malformed(e.to_string()))
    }
}

fn transport_error(err: reqwest::Error) -> PaymentError {
    if err.is_timeout() {
        PaymentError::Timeout
    } else {
        PaymentError::Transport(err.to_string())
    }
}

/// Flattens a checkout request into Stripe's bracketed form encoding.
pub(crate) fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        ("line_items[0][quantity]".to_string(), request.quantity.to_string()),
        (
            "line_items[0][price_data][currency]".to_string(),
            request.currency.clone(),
        ),
        (
            "line_items[0][price_data][unit_amount]".to_string(),
            request.unit_amount.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".to_string(),
            request.product_name.clone(),
        ),
        (
            "line_items[0][price_data][product_data][description]".to_string(),
            request.description.clone(),
        ),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        (
            "client_reference_id".to_string(),
            request.client_reference_id.clone(),
        ),
    ];
    for (key, value) in &request.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }
    if let Some(expires_at) = request.expires_at {
        form.push(("expires_at".to_string(), expires_at.timestamp().to_string()));
    }
    form
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let response = self
            .http
            .post(format!("{}/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&checkout_form(request))
            .send()
            .await
            .map_err(transport_error)?;

        let session = Self::read_session(response).await?;
        let redirect_url = session
            .url
            .ok_or_else(|| PaymentError::Malformed("checkout session has no url".to_string()))?;

        tracing::info!(session_id = %session.id, reference = %request.client_reference_id, "checkout session created");
        Ok(CheckoutSession {
            session_id: session.id,
            redirect_url,
        })
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, PaymentError> {
        let response = self
            .http
            .get(format!("{}/checkout/sessions/{}", self.base_url, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(transport_error)?;

        let session = Self::read_session(response).await?;
        let paid = matches!(session.payment_status.as_deref(), Some("paid"));
        Ok(SessionStatus { paid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn form_encodes_line_item_and_metadata() {
        let mut metadata = BTreeMap::new();
        metadata.insert("bookingId".to_string(), "abc".to_string());
        let request = CheckoutRequest {
            product_name: "Movie Tickets for Dune".to_string(),
            description: "2 seat(s) for 2026-05-01".to_string(),
            currency: "inr".to_string(),
            unit_amount: 15000,
            quantity: 2,
            success_url: "http://app/booking/success?session_id={CHECKOUT_SESSION_ID}".to_string(),
            cancel_url: "http://app/booking/cancel".to_string(),
            client_reference_id: "abc".to_string(),
            metadata,
            expires_at: None,
        };

        let form = checkout_form(&request);
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("line_items[0][quantity]"), Some("2"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("15000"));
        assert_eq!(get("metadata[bookingId]"), Some("abc"));
        assert_eq!(get("expires_at"), None);
    }

    mod stub {
        use std::collections::HashMap;

        use axum::{
            extract::{Form, Path},
            http::{header, HeaderMap, StatusCode},
            response::Json,
            routing::{get, post},
            Router,
        };
        use serde_json::{json, Value};

        type Reply = Result<Json<Value>, (StatusCode, Json<Value>)>;

        fn rejected(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
            (status, Json(json!({ "error": { "message": message } })))
        }

        fn authorized(headers: &HeaderMap) -> bool {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                == Some("Bearer sk_test_123")
        }

        async fn create(headers: HeaderMap, Form(form): Form<HashMap<String, String>>) -> Reply {
            if !authorized(&headers) {
                return Err(rejected(StatusCode::UNAUTHORIZED, "Invalid API Key provided"));
            }
            if form.get("line_items[0][quantity]").map(String::as_str) == Some("0") {
                return Err(rejected(StatusCode::BAD_REQUEST, "Quantity must be positive"));
            }
            let reference = form.get("client_reference_id").cloned().unwrap_or_default();
            Ok(Json(json!({
                "id": format!("cs_test_{reference}"),
                "url": format!("https://checkout.stripe.test/cs_test_{reference}"),
                "payment_status": "unpaid",
            })))
        }

        async fn retrieve(headers: HeaderMap, Path(id): Path<String>) -> Reply {
            if !authorized(&headers) {
                return Err(rejected(StatusCode::UNAUTHORIZED, "Invalid API Key provided"));
            }
            match id.as_str() {
                "cs_test_paid" => Ok(Json(json!({ "id": id, "payment_status": "paid" }))),
                "cs_test_missing" => Err(rejected(StatusCode::NOT_FOUND, "No such checkout session")),
                _ => Ok(Json(json!({ "id": id, "payment_status": "unpaid" }))),
            }
        }

        /// Serves the two checkout endpoints on an ephemeral port.
        pub async fn serve() -> String {
            let app = Router::new()
                .route("/checkout/sessions", post(create))
                .route("/checkout/sessions/:id", get(retrieve));
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            format!("http://{addr}/")
        }
    }

    fn request(reference: &str, quantity: u32) -> CheckoutRequest {
        CheckoutRequest {
            product_name: "Movie Tickets for Dune".to_string(),
            description: "1 seat(s) for 2026-05-01".to_string(),
            currency: "inr".to_string(),
            unit_amount: 15000,
            quantity,
            success_url: "http://app/booking/success".to_string(),
            cancel_url: "http://app/booking/cancel".to_string(),
            client_reference_id: reference.to_string(),
            metadata: BTreeMap::new(),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn talks_to_the_configured_endpoint() {
        let base_url = stub::serve().await;
        let provider = StripeProvider::new("sk_test_123", Duration::from_secs(5))
            .unwrap()
            .with_base_url(base_url);

        let session = provider.create_checkout_session(&request("b1", 2)).await.unwrap();
        assert_eq!(session.session_id, "cs_test_b1");
        assert_eq!(session.redirect_url, "https://checkout.stripe.test/cs_test_b1");

        assert!(!provider.session_status("cs_test_b1").await.unwrap().paid);
        assert!(provider.session_status("cs_test_paid").await.unwrap().paid);

        match provider.session_status("cs_test_missing").await {
            Err(PaymentError::Rejected { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "No such checkout session");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(matches!(
            provider.create_checkout_session(&request("b2", 0)).await,
            Err(PaymentError::Rejected { status: 400, .. })
        ));
    }

    #[tokio::test]
    async fn wrong_key_is_rejected() {
        let provider = StripeProvider::new("sk_test_wrong", Duration::from_secs(5))
            .unwrap()
            .with_base_url(stub::serve().await);

        assert!(matches!(
            provider.session_status("cs_test_paid").await,
            Err(PaymentError::Rejected { status: 401, .. })
        ));
    }
}
