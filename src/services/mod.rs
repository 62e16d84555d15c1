//! Booking services. Each one receives its store and provider handles at
//! construction and holds no other shared state.

use std::sync::Arc;

use crate::error::BookingResult;
use crate::models::booking_model::{Booking, BookingDetail, MovieSummary, UserSummary};
use crate::store::BookingStore;

pub mod catalog;
pub mod confirmation;
pub mod identity;
pub mod lifecycle;
pub mod reservation;
pub mod resolver;

pub use catalog::CatalogService;
pub use confirmation::{ConfirmationOutcome, PaymentConfirmationHandler};
pub use identity::IdentityService;
pub use lifecycle::BookingLifecycleManager;
pub use reservation::{Reservation, ReservationEngine};
pub use resolver::SeatInventoryResolver;

/// Resolves a booking's movie and user for display. Missing references are
/// left out rather than treated as errors.
pub async fn booking_detail(
    store: &Arc<dyn BookingStore>,
    booking: Booking,
) -> BookingResult<BookingDetail> {
    let movie_details = store.get_movie(booking.movie).await?.map(|movie| MovieSummary {
        id: movie.id,
        title: movie.title,
        poster_url: movie.poster_url,
    });
    let user_details = store.get_user(booking.user).await?.map(|user| UserSummary {
        id: user.id,
        name: user.name,
        email: user.email,
    });

    Ok(BookingDetail {
        booking: booking.into(),
        movie_details,
        user_details,
    })
}

pub async fn booking_details(
    store: &Arc<dyn BookingStore>,
    bookings: Vec<Booking>,
) -> BookingResult<Vec<BookingDetail>> {
    let mut details = Vec::with_capacity(bookings.len());
    for booking in bookings {
        details.push(booking_detail(store, booking).await?);
    }
    Ok(details)
}
