use std::collections::BTreeSet;

use chrono::{FixedOffset, NaiveDate};
use mongodb::bson::{oid::ObjectId, serde_helpers::serialize_bson_datetime_as_rfc3339_string, DateTime};
use serde::{Deserialize, Serialize};

use crate::error::{BookingError, BookingResult};
use crate::utils::{day_of, parse_object_id, serialize_object_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    /// Pending and completed bookings hold their seats; failed ones do not.
    pub fn holds_seats(&self) -> bool {
        !matches!(self, PaymentStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub amount: f64,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TheaterSnapshot {
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlotSnapshot {
    pub time: String,
    pub price: f64,
}

/// Stored booking document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub movie: ObjectId,
    pub user: ObjectId,
    pub theater: TheaterSnapshot,
    pub time_slot: TimeSlotSnapshot,
    /// Start of the show's calendar day in the reference timezone.
    pub date: DateTime,
    pub seat_numbers: Vec<u32>,
    pub payment_info: PaymentInfo,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Booking {
    pub fn holds_seats(&self) -> bool {
        self.payment_info.status.holds_seats()
    }

    pub fn show_key(&self, offset: FixedOffset) -> ShowKey {
        ShowKey {
            movie_id: self.movie,
            theater: self.theater.name.clone(),
            time_slot: self.time_slot.time.clone(),
            date: day_of(self.date, offset),
        }
    }
}

/// Identity of a single screening: the unit seats are reserved against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShowKey {
    pub movie_id: ObjectId,
    pub theater: String,
    pub time_slot: String,
    pub date: NaiveDate,
}

impl ShowKey {
    pub fn day_label(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    #[serde(rename = "_id", serialize_with = "serialize_object_id")]
    pub id: ObjectId,
    #[serde(serialize_with = "serialize_object_id")]
    pub movie: ObjectId,
    #[serde(serialize_with = "serialize_object_id")]
    pub user: ObjectId,
    pub theater: TheaterSnapshot,
    pub time_slot: TimeSlotSnapshot,
    #[serde(serialize_with = "serialize_bson_datetime_as_rfc3339_string")]
    pub date: DateTime,
    pub seat_numbers: Vec<u32>,
    pub payment_info: PaymentInfo,
    #[serde(serialize_with = "serialize_bson_datetime_as_rfc3339_string")]
    pub created_at: DateTime,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        BookingResponse {
            id: booking.id,
            movie: booking.movie,
            user: booking.user,
            theater: booking.theater,
            time_slot: booking.time_slot,
            date: booking.date,
            seat_numbers: booking.seat_numbers,
            payment_info: booking.payment_info,
            created_at: booking.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieSummary {
    #[serde(rename = "_id", serialize_with = "serialize_object_id")]
    pub id: ObjectId,
    pub title: String,
    pub poster_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    #[serde(rename = "_id", serialize_with = "serialize_object_id")]
    pub id: ObjectId,
    pub name: String,
    pub email: String,
}

/// Booking with its movie and user resolved, for receipts and admin listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetail {
    #[serde(flatten)]
    pub booking: BookingResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movie_details: Option<MovieSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_details: Option<UserSummary>,
}

/// Body of `POST /bookings`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReservationRequest {
    pub movie_id: String,
    pub user_id: String,
    pub theater: String,
    pub time_slot: String,
    pub date: NaiveDate,
    pub seat_numbers: Vec<i64>,
}

/// Query string of `GET /bookings/booked-seats`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BookedSeatsQuery {
    pub movie_id: String,
    pub theater: String,
    pub time_slot: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookedSeatsResponse {
    pub movie_id: String,
    pub theater: String,
    pub time_slot: String,
    pub date: NaiveDate,
    pub booked_seat_numbers: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationReceipt {
    pub message: String,
    pub is_past_booking: bool,
}

/// Body of a successful `POST /bookings`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResponse {
    pub booking: BookingResponse,
    pub checkout_url: Option<String>,
    pub session_id: Option<String>,
}

/// Body of `GET /payments/verify/:session_id`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerification {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<BookingDetail>,
    pub already_processed: bool,
}

/// Seat list must be non-empty, positive and free of duplicates.
pub fn validate_seat_numbers(raw: &[i64]) -> BookingResult<BTreeSet<u32>> {
    if raw.is_empty() {
        return Err(BookingError::InvalidArgument(
            "at least one seat must be selected".to_string(),
        ));
    }

    let mut seats = BTreeSet::new();
    for &seat in raw {
        let seat = u32::try_from(seat)
            .ok()
            .filter(|seat| *seat > 0)
            .ok_or_else(|| BookingError::InvalidArgument(format!("invalid seat number: {seat}")))?;
        if !seats.insert(seat) {
            return Err(BookingError::InvalidArgument(format!("duplicate seat number: {seat}")));
        }
    }

    Ok(seats)
}

impl BookedSeatsQuery {
    pub fn show_key(&self) -> BookingResult<ShowKey> {
        Ok(ShowKey {
            movie_id: parse_object_id("movie", &self.movie_id)?,
            theater: self.theater.clone(),
            time_slot: self.time_slot.clone(),
            date: self.date,
        })
    }
}
