//! Persistence for movies, users and bookings.
//!
//! Every booking mutation that touches more than one record goes through a
//! single [`BookingStore`] call so the implementation can apply it atomically.
//! Seat conflicts are arbitrated here, never in the services: two overlapping
//! `reserve` calls for the same show yield exactly one winner.

use std::collections::BTreeSet;

use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, DateTime};

use crate::error::BookingResult;
use crate::models::{
    booking_model::{Booking, ShowKey},
    movie_model::Movie,
    user_model::User,
};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Result of moving a booking to `completed`.
#[derive(Debug, Clone)]
pub enum Completion {
    /// This call performed the transition.
    Completed(Booking),
    /// Another call got there first; the booking is returned unchanged.
    AlreadyCompleted(Booking),
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert_movie(&self, movie: Movie) -> BookingResult<Movie>;

    async fn get_movie(&self, id: ObjectId) -> BookingResult<Option<Movie>>;

    async fn list_movies(&self) -> BookingResult<Vec<Movie>>;

    /// Fails with `InvalidArgument` when the email is already registered.
    async fn insert_user(&self, user: User) -> BookingResult<User>;

    async fn get_user(&self, id: ObjectId) -> BookingResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> BookingResult<Option<User>>;

    async fn get_booking(&self, id: ObjectId) -> BookingResult<Option<Booking>>;

    async fn find_by_session(&self, session_id: &str) -> BookingResult<Option<Booking>>;

    async fn bookings_for_movie(&self, movie_id: ObjectId) -> BookingResult<Vec<Booking>>;

    async fn bookings_for_user(&self, user_id: ObjectId) -> BookingResult<Vec<Booking>>;

    /// Seats held by pending or completed bookings of exactly this show.
    async fn held_seats(&self, show: &ShowKey) -> BookingResult<BTreeSet<u32>>;

    /// Inserts the booking and links it into its user and movie, provided none
    /// of its seats is held. Fails with `Conflict` listing the taken seats.
    async fn reserve(&self, booking: Booking) -> BookingResult<Booking>;

    async fn attach_session(&self, booking_id: ObjectId, session_id: &str) -> BookingResult<Booking>;

    /// Marks a booking `completed` and re-links it into its movie. A `failed`
    /// booking must win its seats back first or the call fails with `Conflict`.
    async fn complete(&self, booking_id: ObjectId) -> BookingResult<Completion>;

    /// Deletes the booking, its seat holds and both back references.
    async fn remove(&self, booking_id: ObjectId) -> BookingResult<Booking>;

    /// Moves pending bookings created before `cutoff` to `failed`, releasing
    /// their seats. Returns the bookings that were expired.
    async fn expire_pending(&self, cutoff: DateTime) -> BookingResult<Vec<Booking>>;
}

pub(crate) fn intersect(requested: &[u32], held: &BTreeSet<u32>) -> Vec<u32> {
    requested
        .iter()
        .copied()
        .filter(|seat| held.contains(seat))
        .collect()
}
