//! Write path for new bookings.
//!
//! A request is validated in full before the store is touched. The store's
//! `reserve` is the only place a seat conflict is decided; the resolver read
//! beforehand just gives a cheap, precise answer when there is no contention.
//! The checkout session is opened only after the hold is committed, and a
//! failed or slow provider releases the hold again.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use mongodb::bson::{oid::ObjectId, DateTime};

use crate::config::BookingSettings;
use crate::error::{BookingError, BookingResult};
use crate::models::{
    booking_model::{
        validate_seat_numbers, Booking, PaymentInfo, PaymentStatus, ReservationRequest, ShowKey,
        TheaterSnapshot, TimeSlotSnapshot,
    },
    movie_model::Movie,
};
use crate::payment::{to_minor_units, CheckoutRequest, CheckoutSession, PaymentError, PaymentProvider};
use crate::store::{intersect, BookingStore};
use crate::utils::{day_of, day_start, parse_object_id, today_in};

/// Stripe refuses checkout sessions that expire sooner than this.
const MIN_CHECKOUT_EXPIRY_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
pub struct Reservation {
    pub booking: Booking,
    /// Where to send the customer to pay; `None` for free shows.
    pub checkout_url: Option<String>,
}

pub struct ReservationEngine {
    store: Arc<dyn BookingStore>,
    payments: Arc<dyn PaymentProvider>,
    settings: BookingSettings,
}

impl ReservationEngine {
    pub fn new(
        store: Arc<dyn BookingStore>,
        payments: Arc<dyn PaymentProvider>,
        settings: BookingSettings,
    ) -> Self {
        ReservationEngine {
            store,
            payments,
            settings,
        }
    }

    pub async fn create_reservation(&self, request: ReservationRequest) -> BookingResult<Reservation> {
        let seats = validate_seat_numbers(&request.seat_numbers)?;
        self.validate_show_date(request.date)?;
        let movie_id = parse_object_id("movie", &request.movie_id)?;
        let user_id = parse_object_id("user", &request.user_id)?;

        let movie = self
            .store
            .get_movie(movie_id)
            .await?
            .ok_or_else(|| BookingError::NotFound("Movie".to_string()))?;
        let theater = movie.theater(&request.theater).ok_or_else(|| {
            BookingError::InvalidArgument(format!("invalid theater selected: {}", request.theater))
        })?;
        let slot = theater.slot(&request.time_slot).ok_or_else(|| {
            BookingError::InvalidArgument(format!("invalid time slot selected: {}", request.time_slot))
        })?;

        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| BookingError::NotFound("User".to_string()))?;

        let show = ShowKey {
            movie_id,
            theater: theater.name.clone(),
            time_slot: slot.time.clone(),
            date: request.date,
        };
        let requested: Vec<u32> = seats.iter().copied().collect();
        let conflicts = intersect(&requested, &self.store.held_seats(&show).await?);
        if !conflicts.is_empty() {
            tracing::info!(movie_id = %movie_id, seats = ?conflicts, "requested seats already held");
            return Err(BookingError::Conflict { seats: conflicts });
        }

        let amount = requested.len() as f64 * slot.price;
        let status = if amount > 0.0 {
            PaymentStatus::Pending
        } else {
            PaymentStatus::Completed
        };
        let now = DateTime::now();
        let booking = Booking {
            id: ObjectId::new(),
            movie: movie_id,
            user: user_id,
            theater: TheaterSnapshot {
                name: theater.name.clone(),
                location: theater.location.clone(),
            },
            time_slot: TimeSlotSnapshot {
                time: slot.time.clone(),
                price: slot.price,
            },
            date: day_start(request.date, self.settings.offset())?,
            seat_numbers: requested,
            payment_info: PaymentInfo {
                session_id: None,
                amount,
                status,
            },
            created_at: now,
            updated_at: now,
        };

        let booking = self.store.reserve(booking).await?;
        tracing::info!(
            booking_id = %booking.id,
            movie_id = %movie_id,
            theater = %show.theater,
            time_slot = %show.time_slot,
            date = %show.day_label(),
            seats = ?booking.seat_numbers,
            amount,
            "seats reserved"
        );

        if status == PaymentStatus::Completed {
            return Ok(Reservation {
                booking,
                checkout_url: None,
            });
        }

        let session = match self.open_checkout(&movie, &booking, &seats).await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(booking_id = %booking.id, error = %err, "checkout failed, releasing seats");
                self.release(&booking).await;
                return Err(err);
            }
        };

        match self.store.attach_session(booking.id, &session.session_id).await {
            Ok(booking) => Ok(Reservation {
                booking,
                checkout_url: Some(session.redirect_url),
            }),
            Err(err) => {
                self.release(&booking).await;
                Err(err)
            }
        }
    }

    fn validate_show_date(&self, date: NaiveDate) -> BookingResult<()> {
        let today = today_in(self.settings.offset(), Utc::now());
        if date < today {
            return Err(BookingError::InvalidArgument(
                "booking date must not be in the past".to_string(),
            ));
        }
        if let Some(window) = self.settings.booking_window_days {
            // A window too large to add to today leaves no upper bound.
            let last_day = ChronoDuration::try_days(window).and_then(|span| today.checked_add_signed(span));
            if last_day.is_some_and(|last_day| date > last_day) {
                return Err(BookingError::InvalidArgument(format!(
                    "bookings open at most {window} days in advance"
                )));
            }
        }
        Ok(())
    }

    async fn open_checkout(
        &self,
        movie: &Movie,
        booking: &Booking,
        seats: &BTreeSet<u32>,
    ) -> BookingResult<CheckoutSession> {
        let app_url = &self.settings.app_url;
        let date = day_of(booking.date, self.settings.offset());
        let seat_list = seats
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let mut metadata = BTreeMap::new();
        metadata.insert("bookingId".to_string(), booking.id.to_hex());
        metadata.insert("movieId".to_string(), movie.id.to_hex());
        metadata.insert("userId".to_string(), booking.user.to_hex());
        metadata.insert("date".to_string(), date.to_string());
        metadata.insert("selectedSeats".to_string(), seat_list);

        let ttl = ChronoDuration::from_std(self.settings.pending_ttl).unwrap_or(ChronoDuration::zero());
        let expires_at = (ttl >= ChronoDuration::minutes(MIN_CHECKOUT_EXPIRY_MINUTES))
            .then(|| booking.created_at.to_chrono() + ttl);

        let request = CheckoutRequest {
            product_name: format!("Movie Tickets for {}", movie.title),
            description: format!("{} seat(s) for {}", seats.len(), date),
            currency: self.settings.currency.clone(),
            unit_amount: to_minor_units(booking.time_slot.price),
            quantity: seats.len() as u32,
            success_url: format!("{app_url}/booking/success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{app_url}/booking/cancel"),
            client_reference_id: booking.id.to_hex(),
            metadata,
            expires_at,
        };

        match tokio::time::timeout(
            self.settings.payment_timeout,
            self.payments.create_checkout_session(&request),
        )
        .await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(PaymentError::Timeout.into()),
        }
    }

    async fn release(&self, booking: &Booking) {
        if let Err(err) = self.store.remove(booking.id).await {
            tracing::error!(booking_id = %booking.id, error = %err, "failed to release seat hold");
        }
    }
}
