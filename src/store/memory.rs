use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::FixedOffset;
use mongodb::bson::{oid::ObjectId, DateTime};
use tokio::sync::Mutex;

use super::{intersect, BookingStore, Completion};
use crate::error::{BookingError, BookingResult};
use crate::models::{
    booking_model::{Booking, PaymentStatus, ShowKey},
    movie_model::Movie,
    user_model::User,
};

#[derive(Default)]
struct State {
    movies: HashMap<ObjectId, Movie>,
    users: HashMap<ObjectId, User>,
    bookings: HashMap<ObjectId, Booking>,
    /// Seat -> owning booking, per show. Plays the role of the unique index.
    holds: HashMap<ShowKey, BTreeMap<u32, ObjectId>>,
}

impl State {
    fn held(&self, show: &ShowKey) -> BTreeSet<u32> {
        self.holds
            .get(show)
            .map(|seats| seats.keys().copied().collect())
            .unwrap_or_default()
    }

    fn hold(&mut self, show: ShowKey, booking: &Booking) {
        let seats = self.holds.entry(show).or_default();
        for seat in &booking.seat_numbers {
            seats.insert(*seat, booking.id);
        }
    }

    fn release(&mut self, show: &ShowKey, booking_id: ObjectId) {
        if let Some(seats) = self.holds.get_mut(show) {
            seats.retain(|_, owner| *owner != booking_id);
            if seats.is_empty() {
                self.holds.remove(show);
            }
        }
    }
}

/// In-process store; one mutex serializes every operation.
pub struct MemoryStore {
    state: Mutex<State>,
    offset: FixedOffset,
}

impl MemoryStore {
    pub fn new(offset: FixedOffset) -> Self {
        MemoryStore {
            state: Mutex::new(State::default()),
            offset,
        }
    }
}

fn sorted_newest_first(mut bookings: Vec<Booking>) -> Vec<Booking> {
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    bookings
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_movie(&self, movie: Movie) -> BookingResult<Movie> {
        let mut state = self.state.lock().await;
        state.movies.insert(movie.id, movie.clone());
        Ok(movie)
    }

    async fn get_movie(&self, id: ObjectId) -> BookingResult<Option<Movie>> {
        Ok(self.state.lock().await.movies.get(&id).cloned())
    }

    async fn list_movies(&self) -> BookingResult<Vec<Movie>> {
        let state = self.state.lock().await;
        let mut movies: Vec<Movie> = state.movies.values().cloned().collect();
        movies.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(movies)
    }

    async fn insert_user(&self, user: User) -> BookingResult<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|existing| existing.email == user.email) {
            return Err(BookingError::InvalidArgument(
                "email is already registered".to_string(),
            ));
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: ObjectId) -> BookingResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> BookingResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|user| user.email == email).cloned())
    }

    async fn get_booking(&self, id: ObjectId) -> BookingResult<Option<Booking>> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn find_by_session(&self, session_id: &str) -> BookingResult<Option<Booking>> {
        let state = self.state.lock().await;
        Ok(state
            .bookings
            .values()
            .find(|booking| booking.payment_info.session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn bookings_for_movie(&self, movie_id: ObjectId) -> BookingResult<Vec<Booking>> {
        let state = self.state.lock().await;
        Ok(sorted_newest_first(
            state
                .bookings
                .values()
                .filter(|booking| booking.movie == movie_id)
                .cloned()
                .collect(),
        ))
    }

    async fn bookings_for_user(&self, user_id: ObjectId) -> BookingResult<Vec<Booking>> {
        let state = self.state.lock().await;
        Ok(sorted_newest_first(
            state
                .bookings
                .values()
                .filter(|booking| booking.user == user_id)
                .cloned()
                .collect(),
        ))
    }

    async fn held_seats(&self, show: &ShowKey) -> BookingResult<BTreeSet<u32>> {
        let state = self.state.lock().await;
        Ok(state
            .bookings
            .values()
            .filter(|booking| booking.holds_seats() && booking.show_key(self.offset) == *show)
            .flat_map(|booking| booking.seat_numbers.iter().copied())
            .collect())
    }

    async fn reserve(&self, booking: Booking) -> BookingResult<Booking> {
        let mut state = self.state.lock().await;
        let show = booking.show_key(self.offset);

        let conflicts = intersect(&booking.seat_numbers, &state.held(&show));
        if !conflicts.is_empty() {
            return Err(BookingError::Conflict { seats: conflicts });
        }
        if !state.users.contains_key(&booking.user) {
            return Err(BookingError::NotFound("User".to_string()));
        }
        if !state.movies.contains_key(&booking.movie) {
            return Err(BookingError::NotFound("Movie".to_string()));
        }

        if booking.holds_seats() {
            state.hold(show, &booking);
        }
        if let Some(user) = state.users.get_mut(&booking.user) {
            user.bookings.push(booking.id);
        }
        if let Some(movie) = state.movies.get_mut(&booking.movie) {
            movie.bookings.push(booking.id);
        }
        state.bookings.insert(booking.id, booking.clone());

        Ok(booking)
    }

    async fn attach_session(&self, booking_id: ObjectId, session_id: &str) -> BookingResult<Booking> {
        let mut state = self.state.lock().await;
        let booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| BookingError::NotFound("Booking".to_string()))?;
        booking.payment_info.session_id = Some(session_id.to_string());
        booking.updated_at = DateTime::now();
        Ok(booking.clone())
    }

    async fn complete(&self, booking_id: ObjectId) -> BookingResult<Completion> {
        let mut state = self.state.lock().await;
        let booking = state
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| BookingError::NotFound("Booking".to_string()))?;

        match booking.payment_info.status {
            PaymentStatus::Completed => return Ok(Completion::AlreadyCompleted(booking)),
            PaymentStatus::Failed => {
                let show = booking.show_key(self.offset);
                let conflicts = intersect(&booking.seat_numbers, &state.held(&show));
                if !conflicts.is_empty() {
                    return Err(BookingError::Conflict { seats: conflicts });
                }
                state.hold(show, &booking);
            }
            PaymentStatus::Pending => {}
        }

        if let Some(movie) = state.movies.get_mut(&booking.movie) {
            if !movie.bookings.contains(&booking_id) {
                movie.bookings.push(booking_id);
            }
        }

        let stored = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| BookingError::NotFound("Booking".to_string()))?;
        stored.payment_info.status = PaymentStatus::Completed;
        stored.updated_at = DateTime::now();
        Ok(Completion::Completed(stored.clone()))
    }

    async fn remove(&self, booking_id: ObjectId) -> BookingResult<Booking> {
        let mut state = self.state.lock().await;
        let booking = state
            .bookings
            .remove(&booking_id)
            .ok_or_else(|| BookingError::NotFound("Booking".to_string()))?;

        state.release(&booking.show_key(self.offset), booking_id);
        if let Some(user) = state.users.get_mut(&booking.user) {
            user.bookings.retain(|id| *id != booking_id);
        }
        if let Some(movie) = state.movies.get_mut(&booking.movie) {
            movie.bookings.retain(|id| *id != booking_id);
        }

        Ok(booking)
    }

    async fn expire_pending(&self, cutoff: DateTime) -> BookingResult<Vec<Booking>> {
        let mut state = self.state.lock().await;
        let stale: Vec<ObjectId> = state
            .bookings
            .values()
            .filter(|booking| {
                booking.payment_info.status == PaymentStatus::Pending && booking.created_at < cutoff
            })
            .map(|booking| booking.id)
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for id in stale {
            let Some(booking) = state.bookings.get_mut(&id) else {
                continue;
            };
            booking.payment_info.status = PaymentStatus::Failed;
            booking.updated_at = DateTime::now();
            let booking = booking.clone();
            state.release(&booking.show_key(self.offset), id);
            expired.push(booking);
        }

        Ok(expired)
    }
}
