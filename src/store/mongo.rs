use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::FixedOffset;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime, Document},
    error::{
        Error as DriverError, ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR,
        UNKNOWN_TRANSACTION_COMMIT_RESULT,
    },
    options::{
        Acknowledgment, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReadConcern,
        ReturnDocument, TransactionOptions, WriteConcern,
    },
    ClientSession, Client, Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};

use super::{intersect, BookingStore, Completion};
use crate::error::{BookingError, BookingResult};
use crate::models::{
    booking_model::{Booking, PaymentStatus, ShowKey},
    movie_model::Movie,
    user_model::User,
};
use crate::utils::day_range;

const MAX_TRANSACTION_ATTEMPTS: usize = 3;
const DUPLICATE_KEY: i32 = 11000;

/// One document per held seat. The unique index over the show fields and the
/// seat number is what rejects a second booking of the same seat.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeatHold {
    #[serde(rename = "_id")]
    id: ObjectId,
    booking: ObjectId,
    movie: ObjectId,
    theater: String,
    time_slot: String,
    day: String,
    seat: i64,
}

fn holds_for(booking: &Booking, show: &ShowKey) -> Vec<SeatHold> {
    booking
        .seat_numbers
        .iter()
        .map(|seat| SeatHold {
            id: ObjectId::new(),
            booking: booking.id,
            movie: show.movie_id,
            theater: show.theater.clone(),
            time_slot: show.time_slot.clone(),
            day: show.day_label(),
            seat: i64::from(*seat),
        })
        .collect()
}

/// Why a transaction attempt did not commit.
#[derive(Debug)]
enum TxnFailure {
    Domain(BookingError),
    Driver(DriverError),
    /// Lost a seat race to a transaction that committed meanwhile.
    SeatRace,
}

impl TxnFailure {
    fn is_transient(&self) -> bool {
        match self {
            TxnFailure::Driver(err) => err.contains_label(TRANSIENT_TRANSACTION_ERROR),
            TxnFailure::SeatRace => true,
            TxnFailure::Domain(_) => false,
        }
    }
}

impl From<DriverError> for TxnFailure {
    fn from(err: DriverError) -> Self {
        if is_duplicate_key(&err) {
            TxnFailure::SeatRace
        } else {
            TxnFailure::Driver(err)
        }
    }
}

impl From<BookingError> for TxnFailure {
    fn from(err: BookingError) -> Self {
        TxnFailure::Domain(err)
    }
}

impl From<TxnFailure> for BookingError {
    fn from(failure: TxnFailure) -> Self {
        match failure {
            TxnFailure::Domain(err) => err,
            TxnFailure::Driver(err) => BookingError::from(err),
            TxnFailure::SeatRace => {
                BookingError::Unavailable("seat holds changed during the transaction".to_string())
            }
        }
    }
}

fn is_duplicate_key(err: &DriverError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == DUPLICATE_KEY,
        ErrorKind::BulkWrite(failure) => failure
            .write_errors
            .as_ref()
            .map_or(false, |errors| errors.iter().any(|e| e.code == DUPLICATE_KEY)),
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Commits with an unknown outcome are retried a bounded number of times.
fn may_retry_commit(attempt: usize, unknown_result: bool) -> bool {
    unknown_result && attempt < MAX_TRANSACTION_ATTEMPTS
}

fn commit_failure(err: DriverError, unknown_result: bool) -> TxnFailure {
    if unknown_result {
        TxnFailure::Domain(BookingError::Unavailable(format!(
            "transaction commit outcome unknown: {err}"
        )))
    } else {
        err.into()
    }
}

fn show_filter(show: &ShowKey, offset: FixedOffset) -> BookingResult<Document> {
    let (start, end) = day_range(show.date, offset)?;
    Ok(doc! {
        "movie": show.movie_id,
        "theater.name": show.theater.as_str(),
        "timeSlot.time": show.time_slot.as_str(),
        "date": { "$gte": start, "$lt": end },
        "paymentInfo.status": { "$ne": PaymentStatus::Failed.as_str() },
    })
}

/// MongoDB-backed store. Multi-document transactions need a replica set.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
    offset: FixedOffset,
}

impl MongoStore {
    pub fn new(client: Client, database_name: &str, offset: FixedOffset) -> Self {
        let db = client.database(database_name);
        MongoStore { client, db, offset }
    }

    fn movies(&self) -> Collection<Movie> {
        self.db.collection::<Movie>("movies")
    }

    fn users(&self) -> Collection<User> {
        self.db.collection::<User>("users")
    }

    fn bookings(&self) -> Collection<Booking> {
        self.db.collection::<Booking>("bookings")
    }

    fn holds(&self) -> Collection<SeatHold> {
        self.db.collection::<SeatHold>("seatHolds")
    }

    /// Creates the indexes the store relies on. Safe to run on every start.
    pub async fn ensure_indexes(&self) -> BookingResult<()> {
        let unique_seat = IndexModel::builder()
            .keys(doc! { "movie": 1, "theater": 1, "timeSlot": 1, "day": 1, "seat": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("unique_seat_per_show".to_string())
                    .build(),
            )
            .build();
        let by_booking = IndexModel::builder().keys(doc! { "booking": 1 }).build();
        self.holds().create_indexes([unique_seat, by_booking], None).await?;

        let by_show = IndexModel::builder()
            .keys(doc! { "movie": 1, "theater.name": 1, "timeSlot.time": 1, "date": 1 })
            .build();
        let by_session = IndexModel::builder()
            .keys(doc! { "paymentInfo.sessionId": 1 })
            .options(IndexOptions::builder().unique(true).sparse(true).build())
            .build();
        let by_status = IndexModel::builder()
            .keys(doc! { "paymentInfo.status": 1, "createdAt": 1 })
            .build();
        self.bookings()
            .create_indexes([by_show, by_session, by_status], None)
            .await?;

        let unique_email = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.users().create_index(unique_email, None).await?;

        tracing::info!(database = %self.db.name(), "booking indexes ensured");
        Ok(())
    }

    async fn begin(&self) -> BookingResult<ClientSession> {
        let mut session = self.client.start_session(None).await?;
        let options = TransactionOptions::builder()
            .read_concern(ReadConcern::snapshot())
            .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
            .build();
        session.start_transaction(options).await?;
        Ok(session)
    }

    /// Commits on success, aborts on failure.
    async fn finish<T>(
        session: &mut ClientSession,
        outcome: Result<T, TxnFailure>,
    ) -> Result<T, TxnFailure> {
        match outcome {
            Ok(value) => {
                let mut attempt = 0;
                loop {
                    attempt += 1;
                    match session.commit_transaction().await {
                        Ok(()) => break,
                        Err(err) => {
                            let unknown = err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT);
                            if !may_retry_commit(attempt, unknown) {
                                return Err(commit_failure(err, unknown));
                            }
                            tracing::debug!(attempt, error = %err, "retrying commit with unknown result");
                        }
                    }
                }
                Ok(value)
            }
            Err(failure) => {
                if let Err(err) = session.abort_transaction().await {
                    tracing::debug!(error = %err, "abort after failed transaction");
                }
                Err(failure)
            }
        }
    }

    async fn held_seats_in(
        &self,
        session: &mut ClientSession,
        show: &ShowKey,
    ) -> Result<BTreeSet<u32>, TxnFailure> {
        let mut cursor = self
            .bookings()
            .find_with_session(show_filter(show, self.offset)?, None, session)
            .await?;
        let mut held = BTreeSet::new();
        while let Some(booking) = cursor.next(session).await {
            held.extend(booking?.seat_numbers);
        }
        Ok(held)
    }

    async fn link(
        &self,
        session: &mut ClientSession,
        booking: &Booking,
    ) -> Result<(), TxnFailure> {
        let user = self
            .users()
            .update_one_with_session(
                doc! { "_id": booking.user },
                doc! { "$addToSet": { "bookings": booking.id } },
                None,
                session,
            )
            .await?;
        if user.matched_count == 0 {
            return Err(BookingError::NotFound("User".to_string()).into());
        }

        let movie = self
            .movies()
            .update_one_with_session(
                doc! { "_id": booking.movie },
                doc! { "$addToSet": { "bookings": booking.id } },
                None,
                session,
            )
            .await?;
        if movie.matched_count == 0 {
            return Err(BookingError::NotFound("Movie".to_string()).into());
        }
        Ok(())
    }

    async fn reserve_in(
        &self,
        session: &mut ClientSession,
        booking: &Booking,
    ) -> Result<(), TxnFailure> {
        let show = booking.show_key(self.offset);

        let held = self.held_seats_in(session, &show).await?;
        let conflicts = intersect(&booking.seat_numbers, &held);
        if !conflicts.is_empty() {
            return Err(BookingError::Conflict { seats: conflicts }.into());
        }

        if booking.holds_seats() {
            self.holds()
                .insert_many_with_session(holds_for(booking, &show), None, session)
                .await?;
        }
        self.bookings()
            .insert_one_with_session(booking, None, session)
            .await?;
        self.link(session, booking).await
    }

    async fn complete_in(
        &self,
        session: &mut ClientSession,
        booking_id: ObjectId,
    ) -> Result<Completion, TxnFailure> {
        let booking = self
            .bookings()
            .find_one_with_session(doc! { "_id": booking_id }, None, session)
            .await?
            .ok_or_else(|| BookingError::NotFound("Booking".to_string()))?;

        let current = booking.payment_info.status;
        match current {
            PaymentStatus::Completed => return Ok(Completion::AlreadyCompleted(booking)),
            PaymentStatus::Failed => {
                let show = booking.show_key(self.offset);
                let held = self.held_seats_in(session, &show).await?;
                let conflicts = intersect(&booking.seat_numbers, &held);
                if !conflicts.is_empty() {
                    return Err(BookingError::Conflict { seats: conflicts }.into());
                }
                self.holds()
                    .insert_many_with_session(holds_for(&booking, &show), None, session)
                    .await?;
            }
            PaymentStatus::Pending => {}
        }

        let now = DateTime::now();
        let updated = self
            .bookings()
            .update_one_with_session(
                doc! { "_id": booking_id, "paymentInfo.status": current.as_str() },
                doc! { "$set": {
                    "paymentInfo.status": PaymentStatus::Completed.as_str(),
                    "updatedAt": now,
                } },
                None,
                session,
            )
            .await?;
        if updated.matched_count == 0 {
            return Err(TxnFailure::SeatRace);
        }

        self.movies()
            .update_one_with_session(
                doc! { "_id": booking.movie },
                doc! { "$addToSet": { "bookings": booking_id } },
                None,
                session,
            )
            .await?;

        let mut booking = booking;
        booking.payment_info.status = PaymentStatus::Completed;
        booking.updated_at = now;
        Ok(Completion::Completed(booking))
    }

    async fn remove_in(
        &self,
        session: &mut ClientSession,
        booking_id: ObjectId,
    ) -> Result<Booking, TxnFailure> {
        let booking = self
            .bookings()
            .find_one_and_delete_with_session(doc! { "_id": booking_id }, None, session)
            .await?
            .ok_or_else(|| BookingError::NotFound("Booking".to_string()))?;

        self.holds()
            .delete_many_with_session(doc! { "booking": booking_id }, None, session)
            .await?;
        self.users()
            .update_one_with_session(
                doc! { "_id": booking.user },
                doc! { "$pull": { "bookings": booking_id } },
                None,
                session,
            )
            .await?;
        self.movies()
            .update_one_with_session(
                doc! { "_id": booking.movie },
                doc! { "$pull": { "bookings": booking_id } },
                None,
                session,
            )
            .await?;

        Ok(booking)
    }

    async fn expire_in(
        &self,
        session: &mut ClientSession,
        booking: &Booking,
    ) -> Result<bool, TxnFailure> {
        let updated = self
            .bookings()
            .update_one_with_session(
                doc! { "_id": booking.id, "paymentInfo.status": PaymentStatus::Pending.as_str() },
                doc! { "$set": {
                    "paymentInfo.status": PaymentStatus::Failed.as_str(),
                    "updatedAt": DateTime::now(),
                } },
                None,
                session,
            )
            .await?;
        if updated.matched_count == 0 {
            return Ok(false);
        }

        self.holds()
            .delete_many_with_session(doc! { "booking": booking.id }, None, session)
            .await?;
        Ok(true)
    }

    async fn collect(&self, filter: Document) -> BookingResult<Vec<Booking>> {
        let options = FindOptions::builder().sort(doc! { "createdAt": -1 }).build();
        let cursor = self.bookings().find(filter, options).await?;
        Ok(cursor.try_collect().await?)
    }
}

#[async_trait]
impl BookingStore for MongoStore {
    async fn insert_movie(&self, movie: Movie) -> BookingResult<Movie> {
        self.movies().insert_one(&movie, None).await?;
        Ok(movie)
    }

    async fn get_movie(&self, id: ObjectId) -> BookingResult<Option<Movie>> {
        Ok(self.movies().find_one(doc! { "_id": id }, None).await?)
    }

    async fn list_movies(&self) -> BookingResult<Vec<Movie>> {
        let cursor = self.movies().find(None, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert_user(&self, user: User) -> BookingResult<User> {
        match self.users().insert_one(&user, None).await {
            Ok(_) => Ok(user),
            Err(err) if is_duplicate_key(&err) => Err(BookingError::InvalidArgument(
                "email is already registered".to_string(),
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn get_user(&self, id: ObjectId) -> BookingResult<Option<User>> {
        Ok(self.users().find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> BookingResult<Option<User>> {
        Ok(self.users().find_one(doc! { "email": email }, None).await?)
    }

    async fn get_booking(&self, id: ObjectId) -> BookingResult<Option<Booking>> {
        Ok(self.bookings().find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_by_session(&self, session_id: &str) -> BookingResult<Option<Booking>> {
        Ok(self
            .bookings()
            .find_one(doc! { "paymentInfo.sessionId": session_id }, None)
            .await?)
    }

    async fn bookings_for_movie(&self, movie_id: ObjectId) -> BookingResult<Vec<Booking>> {
        self.collect(doc! { "movie": movie_id }).await
    }

    async fn bookings_for_user(&self, user_id: ObjectId) -> BookingResult<Vec<Booking>> {
        self.collect(doc! { "user": user_id }).await
    }

    async fn held_seats(&self, show: &ShowKey) -> BookingResult<BTreeSet<u32>> {
        let mut cursor = self
            .bookings()
            .find(show_filter(show, self.offset)?, None)
            .await?;
        let mut held = BTreeSet::new();
        while let Some(booking) = cursor.try_next().await? {
            held.extend(booking.seat_numbers);
        }
        Ok(held)
    }

    async fn reserve(&self, booking: Booking) -> BookingResult<Booking> {
        let show = booking.show_key(self.offset);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut session = self.begin().await?;
            let outcome = self.reserve_in(&mut session, &booking).await;
            match Self::finish(&mut session, outcome).await {
                Ok(()) => return Ok(booking),
                Err(TxnFailure::SeatRace) => {
                    // The winner may already be visible; report its seats if so.
                    let conflicts = intersect(&booking.seat_numbers, &self.held_seats(&show).await?);
                    if !conflicts.is_empty() {
                        return Err(BookingError::Conflict { seats: conflicts });
                    }
                    if attempt >= MAX_TRANSACTION_ATTEMPTS {
                        return Err(TxnFailure::SeatRace.into());
                    }
                }
                Err(failure) if failure.is_transient() && attempt < MAX_TRANSACTION_ATTEMPTS => {
                    tracing::debug!(attempt, booking_id = %booking.id, "retrying reservation transaction");
                }
                Err(failure) => return Err(failure.into()),
            }
        }
    }

    async fn attach_session(&self, booking_id: ObjectId, session_id: &str) -> BookingResult<Booking> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        self.bookings()
            .find_one_and_update(
                doc! { "_id": booking_id },
                doc! { "$set": {
                    "paymentInfo.sessionId": session_id,
                    "updatedAt": DateTime::now(),
                } },
                options,
            )
            .await?
            .ok_or_else(|| BookingError::NotFound("Booking".to_string()))
    }

    async fn complete(&self, booking_id: ObjectId) -> BookingResult<Completion> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut session = self.begin().await?;
            let outcome = self.complete_in(&mut session, booking_id).await;
            match Self::finish(&mut session, outcome).await {
                Ok(completion) => return Ok(completion),
                Err(failure) if failure.is_transient() && attempt < MAX_TRANSACTION_ATTEMPTS => {
                    tracing::debug!(attempt, %booking_id, "retrying completion transaction");
                }
                Err(failure) => return Err(failure.into()),
            }
        }
    }

    async fn remove(&self, booking_id: ObjectId) -> BookingResult<Booking> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut session = self.begin().await?;
            let outcome = self.remove_in(&mut session, booking_id).await;
            match Self::finish(&mut session, outcome).await {
                Ok(booking) => return Ok(booking),
                Err(failure) if failure.is_transient() && attempt < MAX_TRANSACTION_ATTEMPTS => {
                    tracing::debug!(attempt, %booking_id, "retrying removal transaction");
                }
                Err(failure) => return Err(failure.into()),
            }
        }
    }

    async fn expire_pending(&self, cutoff: DateTime) -> BookingResult<Vec<Booking>> {
        let stale = self
            .collect(doc! {
                "paymentInfo.status": PaymentStatus::Pending.as_str(),
                "createdAt": { "$lt": cutoff },
            })
            .await?;

        let mut expired = Vec::with_capacity(stale.len());
        for mut booking in stale {
            let mut session = self.begin().await?;
            let outcome = self.expire_in(&mut session, &booking).await;
            match Self::finish(&mut session, outcome).await {
                Ok(true) => {
                    booking.payment_info.status = PaymentStatus::Failed;
                    expired.push(booking);
                }
                Ok(false) => {}
                // Left for the next sweep.
                Err(failure) => {
                    tracing::warn!(booking_id = %booking.id, error = ?failure, "failed to expire booking");
                }
            }
        }
        Ok(expired)
    }
}
