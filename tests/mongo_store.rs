//! Integration tests for [`MongoStore`] against a real MongoDB replica set.
//!
//! These cover what the in-memory store cannot: the `seatHolds` unique index,
//! snapshot transactions and their retries.
//!
//! # Running These Tests
//!
//! These tests are marked as `#[ignore]` by default because they need a
//! MongoDB replica set (multi-document transactions do not run on a
//! standalone server). Point `MONGODB_TEST_URI` at one, for example a
//! single-node set started with `mongod --replSet rs0`.
//!
//! To run explicitly:
//! ```bash
//! MONGODB_TEST_URI="mongodb://localhost:27017/?replicaSet=rs0" \
//!     cargo test --test mongo_store -- --ignored
//! ```
//!
//! Every test works in its own throwaway database and drops it at the end.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use mongodb::{
    bson::{oid::ObjectId, DateTime},
    Client, Database,
};

use movie_booking_api::{
    config::BookingSettings,
    error::BookingError,
    models::{
        booking_model::{PaymentStatus, ReservationRequest, ShowKey},
        movie_model::{Movie, Theater, TimeSlot},
        user_model::User,
    },
    payment::MockPaymentProvider,
    services::{
        BookingLifecycleManager, ConfirmationOutcome, PaymentConfirmationHandler, Reservation,
        ReservationEngine,
    },
    store::{BookingStore, MongoStore},
    utils::today_in,
};

const DEFAULT_TEST_URI: &str = "mongodb://localhost:27017/?replicaSet=rs0";

struct Harness {
    db: Database,
    store: Arc<MongoStore>,
    payments: Arc<MockPaymentProvider>,
    settings: BookingSettings,
    movie: Movie,
    users: Vec<User>,
}

impl Harness {
    async fn start(user_count: usize) -> Harness {
        let uri = std::env::var("MONGODB_TEST_URI").unwrap_or_else(|_| DEFAULT_TEST_URI.to_string());
        let client = Client::with_uri_str(&uri).await.expect("MONGODB_TEST_URI should parse");
        let name = format!("movie_booking_test_{}", ObjectId::new().to_hex());
        let settings = BookingSettings::default();

        let store = Arc::new(MongoStore::new(client.clone(), &name, settings.offset()));
        store.ensure_indexes().await.expect("indexes should be created");

        let movie = Movie {
            id: ObjectId::new(),
            title: "Interstellar".to_string(),
            description: "Space".to_string(),
            language: "English".to_string(),
            actors: vec![],
            release_date: DateTime::now(),
            poster_url: "https://img/interstellar.png".to_string(),
            featured: false,
            theaters: vec![Theater {
                name: "Cinema A".to_string(),
                location: "Downtown".to_string(),
                time_slots: vec![TimeSlot {
                    time: "18:00".to_string(),
                    price: 150.0,
                }],
            }],
            bookings: vec![],
            admin: None,
        };
        store.insert_movie(movie.clone()).await.expect("movie insert");

        let mut users = Vec::with_capacity(user_count);
        for n in 0..user_count {
            let user = User {
                id: ObjectId::new(),
                name: format!("Guest {n}"),
                email: format!("guest{n}@example.com"),
                password: "hash".to_string(),
                bookings: vec![],
            };
            users.push(store.insert_user(user).await.expect("user insert"));
        }

        Harness {
            db: client.database(&name),
            store,
            payments: Arc::new(MockPaymentProvider::new()),
            settings,
            movie,
            users,
        }
    }

    fn engine(&self) -> Arc<ReservationEngine> {
        Arc::new(ReservationEngine::new(
            self.store.clone(),
            self.payments.clone(),
            self.settings.clone(),
        ))
    }

    fn show_date(&self) -> NaiveDate {
        today_in(self.settings.offset(), Utc::now()) + ChronoDuration::days(2)
    }

    fn show(&self) -> ShowKey {
        ShowKey {
            movie_id: self.movie.id,
            theater: "Cinema A".to_string(),
            time_slot: "18:00".to_string(),
            date: self.show_date(),
        }
    }

    fn request(&self, user: usize, seats: &[i64]) -> ReservationRequest {
        ReservationRequest {
            movie_id: self.movie.id.to_hex(),
            user_id: self.users[user].id.to_hex(),
            theater: "Cinema A".to_string(),
            time_slot: "18:00".to_string(),
            date: self.show_date(),
            seat_numbers: seats.to_vec(),
        }
    }

    async fn held(&self) -> BTreeSet<u32> {
        self.store.held_seats(&self.show()).await.expect("held seats")
    }

    async fn finish(self) {
        self.db.drop(None).await.expect("test database should drop");
    }
}

/// Retries `Unavailable` the way a client honouring `retryable` would.
async fn reserve(
    engine: &ReservationEngine,
    request: ReservationRequest,
) -> Result<Reservation, BookingError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match engine.create_reservation(request.clone()).await {
            Err(BookingError::Unavailable(_)) if attempts < 10 => {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
            outcome => return outcome,
        }
    }
}

#[tokio::test]
#[ignore = "requires a MongoDB replica set (MONGODB_TEST_URI)"]
async fn contended_seat_has_exactly_one_winner() {
    let harness = Harness::start(8).await;
    let engine = harness.engine();

    let mut tasks = Vec::new();
    for user in 0..harness.users.len() {
        let engine = engine.clone();
        let request = harness.request(user, &[7, user as i64 + 20]);
        tasks.push(tokio::spawn(async move { reserve(&engine, request).await }));
    }

    let mut winners = Vec::new();
    for task in tasks {
        match task.await.expect("task should not panic") {
            Ok(reservation) => winners.push(reservation.booking),
            Err(BookingError::Conflict { seats }) => assert_eq!(seats, vec![7]),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(winners.len(), 1);
    let held = harness.held().await;
    let expected: BTreeSet<u32> = winners[0].seat_numbers.iter().copied().collect();
    assert_eq!(held, expected);

    harness.finish().await;
}

#[tokio::test]
#[ignore = "requires a MongoDB replica set (MONGODB_TEST_URI)"]
async fn disjoint_seats_all_succeed_concurrently() {
    let harness = Harness::start(4).await;
    let engine = harness.engine();

    let mut tasks = Vec::new();
    for user in 0..harness.users.len() {
        let engine = engine.clone();
        let seats = [user as i64 * 2 + 1, user as i64 * 2 + 2];
        let request = harness.request(user, &seats);
        tasks.push(tokio::spawn(async move { reserve(&engine, request).await }));
    }
    for task in tasks {
        let reservation = task.await.expect("task should not panic").expect("disjoint seats should book");
        assert_eq!(reservation.booking.payment_info.status, PaymentStatus::Pending);
        assert!(reservation.checkout_url.is_some());
    }

    assert_eq!(harness.held().await, (1..=8).collect::<BTreeSet<u32>>());
    let movie = harness
        .store
        .get_movie(harness.movie.id)
        .await
        .unwrap()
        .expect("movie should exist");
    assert_eq!(movie.bookings.len(), 4);

    harness.finish().await;
}

#[tokio::test]
#[ignore = "requires a MongoDB replica set (MONGODB_TEST_URI)"]
async fn cancel_releases_holds_and_back_references() {
    let harness = Harness::start(2).await;
    let engine = harness.engine();
    let lifecycle = BookingLifecycleManager::new(harness.store.clone(), harness.settings.clone());

    let booking = reserve(&engine, harness.request(0, &[5, 6])).await.unwrap().booking;
    let user = harness.store.get_user(harness.users[0].id).await.unwrap().unwrap();
    assert_eq!(user.bookings, vec![booking.id]);

    let (removed, receipt) = lifecycle.cancel(&booking.id.to_hex()).await.unwrap();
    assert_eq!(removed.id, booking.id);
    assert!(!receipt.is_past_booking);

    assert!(harness.held().await.is_empty());
    assert!(harness.store.get_booking(booking.id).await.unwrap().is_none());
    let user = harness.store.get_user(harness.users[0].id).await.unwrap().unwrap();
    assert!(user.bookings.is_empty());
    let movie = harness.store.get_movie(harness.movie.id).await.unwrap().unwrap();
    assert!(!movie.bookings.contains(&booking.id));

    // The freed seats go to the next customer.
    reserve(&engine, harness.request(1, &[6])).await.unwrap();
    assert!(matches!(
        lifecycle.cancel(&booking.id.to_hex()).await,
        Err(BookingError::NotFound(_))
    ));

    harness.finish().await;
}

#[tokio::test]
#[ignore = "requires a MongoDB replica set (MONGODB_TEST_URI)"]
async fn payment_after_expiry_wins_seats_back_only_if_free() {
    let harness = Harness::start(2).await;
    let engine = harness.engine();
    let lifecycle = BookingLifecycleManager::new(harness.store.clone(), harness.settings.clone());
    let confirmations = PaymentConfirmationHandler::new(
        harness.store.clone(),
        harness.payments.clone(),
        harness.settings.payment_timeout,
    );

    let kept = reserve(&engine, harness.request(0, &[9])).await.unwrap().booking;
    let resold = reserve(&engine, harness.request(0, &[10])).await.unwrap().booking;

    let cutoff = DateTime::from_millis(DateTime::now().timestamp_millis() + 1_000);
    let expired = lifecycle.expire_created_before(cutoff).await.unwrap();
    assert_eq!(expired.len(), 2);
    assert!(harness.held().await.is_empty());

    reserve(&engine, harness.request(1, &[10])).await.unwrap();

    let kept_session = kept.payment_info.session_id.clone().expect("checkout session");
    harness.payments.mark_paid(&kept_session).await;
    match confirmations.confirm(&kept_session).await.unwrap() {
        ConfirmationOutcome::Confirmed(detail) => {
            assert_eq!(detail.booking.payment_info.status, PaymentStatus::Completed);
        }
        other => panic!("expected confirmation, got {other:?}"),
    }

    let resold_session = resold.payment_info.session_id.clone().expect("checkout session");
    harness.payments.mark_paid(&resold_session).await;
    assert!(matches!(
        confirmations.confirm(&resold_session).await,
        Err(BookingError::Conflict { seats }) if seats == vec![10]
    ));

    assert_eq!(harness.held().await, BTreeSet::from([9, 10]));
    let stored = harness.store.get_booking(resold.id).await.unwrap().unwrap();
    assert_eq!(stored.payment_info.status, PaymentStatus::Failed);

    harness.finish().await;
}

#[tokio::test]
#[ignore = "requires a MongoDB replica set (MONGODB_TEST_URI)"]
async fn unique_email_index_rejects_duplicates() {
    let harness = Harness::start(1).await;

    let mut duplicate = harness.users[0].clone();
    duplicate.id = ObjectId::new();
    assert!(matches!(
        harness.store.insert_user(duplicate).await,
        Err(BookingError::InvalidArgument(_))
    ));

    harness.finish().await;
}
