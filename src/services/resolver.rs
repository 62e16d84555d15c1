use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::{BookingError, BookingResult};
use crate::models::booking_model::{BookedSeatsQuery, BookedSeatsResponse, ShowKey};
use crate::store::BookingStore;
use crate::utils::parse_object_id;

/// Read path for the seat map of one show.
pub struct SeatInventoryResolver {
    store: Arc<dyn BookingStore>,
}

impl SeatInventoryResolver {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        SeatInventoryResolver { store }
    }

    /// Seats held by pending or completed bookings for the show. A movie that
    /// does not exist is `NotFound`, not an empty seat map.
    pub async fn resolve(
        &self,
        movie_id: &str,
        theater: &str,
        time_slot: &str,
        date: NaiveDate,
    ) -> BookingResult<BTreeSet<u32>> {
        let show = ShowKey {
            movie_id: parse_object_id("movie", movie_id)?,
            theater: theater.to_string(),
            time_slot: time_slot.to_string(),
            date,
        };
        self.resolve_show(&show).await
    }

    pub async fn resolve_show(&self, show: &ShowKey) -> BookingResult<BTreeSet<u32>> {
        if self.store.get_movie(show.movie_id).await?.is_none() {
            return Err(BookingError::NotFound("Movie".to_string()));
        }
        self.store.held_seats(show).await
    }

    pub async fn booked_seats(&self, query: BookedSeatsQuery) -> BookingResult<BookedSeatsResponse> {
        let held = self.resolve_show(&query.show_key()?).await?;
        Ok(BookedSeatsResponse {
            movie_id: query.movie_id,
            theater: query.theater,
            time_slot: query.time_slot,
            date: query.date,
            booked_seat_numbers: held.into_iter().collect(),
        })
    }
}
