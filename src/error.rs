use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

pub type BookingResult<T> = Result<T, BookingError>;

/// Failure taxonomy shared by the booking services and the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    /// Malformed input: bad id, empty seat list, date outside the window.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Some of the requested seats are already held for the show.
    #[error("seats already booked: {seats:?}")]
    Conflict { seats: Vec<u32> },

    /// Storage or transaction failure; the caller may retry the whole operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Payment provider error or timeout.
    #[error("payment provider failure: {0}")]
    UpstreamFailure(String),
}

impl BookingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::Conflict { .. } => StatusCode::CONFLICT,
            BookingError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            BookingError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BookingError::Unavailable(_) | BookingError::UpstreamFailure(_)
        )
    }
}

impl From<mongodb::error::Error> for BookingError {
    fn from(err: mongodb::error::Error) -> Self {
        BookingError::Unavailable(err.to_string())
    }
}

impl From<mongodb::bson::de::Error> for BookingError {
    fn from(err: mongodb::bson::de::Error) -> Self {
        BookingError::Unavailable(format!("malformed document: {err}"))
    }
}

impl From<mongodb::bson::ser::Error> for BookingError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        BookingError::Unavailable(format!("unserializable document: {err}"))
    }
}

impl From<JsonRejection> for BookingError {
    fn from(rejection: JsonRejection) -> Self {
        BookingError::InvalidArgument(rejection.body_text())
    }
}

impl From<QueryRejection> for BookingError {
    fn from(rejection: QueryRejection) -> Self {
        BookingError::InvalidArgument(rejection.body_text())
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            BookingError::Conflict { seats } => json!({
                "message": "Some seats are already booked",
                "unavailableSeats": seats,
            }),
            BookingError::InvalidArgument(reason) => json!({ "message": reason }),
            BookingError::NotFound(what) => json!({ "message": format!("{what} not found") }),
            BookingError::Unavailable(_) | BookingError::UpstreamFailure(_) => {
                tracing::error!(error = %self, "request failed");
                json!({
                    "message": "Something went wrong, please try again",
                    "retryable": true,
                })
            }
        };

        (status, Json(body)).into_response()
    }
}
