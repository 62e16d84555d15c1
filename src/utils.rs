use chrono::{DateTime as ChronoDateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{ser::SerializeSeq, Serializer};

use crate::error::{BookingError, BookingResult};

pub fn serialize_object_id<S>(id: &ObjectId, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&id.to_hex())
}

pub fn serialize_object_ids<S>(ids: &[ObjectId], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut seq = serializer.serialize_seq(Some(ids.len()))?;
    for id in ids {
        seq.serialize_element(&id.to_hex())?;
    }
    seq.end()
}

pub fn serialize_optional_object_id<S>(id: &Option<ObjectId>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match id {
        Some(id) => serializer.serialize_str(&id.to_hex()),
        None => serializer.serialize_none(),
    }
}

/// Parses a hex object id, naming the entity in the error.
pub fn parse_object_id(entity: &str, raw: &str) -> BookingResult<ObjectId> {
    ObjectId::parse_str(raw.trim())
        .map_err(|_| BookingError::InvalidArgument(format!("invalid {entity} id format: {raw}")))
}

pub fn reference_offset(utc_offset_minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
}

/// Calendar day of `now` as seen in the reference timezone.
pub fn today_in(offset: FixedOffset, now: ChronoDateTime<Utc>) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Instant at which `date` begins in the reference timezone. Dates at the
/// edge of the representable range are rejected.
pub fn day_start(date: NaiveDate, offset: FixedOffset) -> BookingResult<DateTime> {
    date.and_time(NaiveTime::MIN)
        .checked_sub_signed(Duration::seconds(i64::from(offset.local_minus_utc())))
        .map(|utc| DateTime::from_chrono(ChronoDateTime::<Utc>::from_naive_utc_and_offset(utc, Utc)))
        .ok_or_else(|| BookingError::InvalidArgument(format!("date out of range: {date}")))
}

/// Half-open `[start, next day start)` range covering `date`.
pub fn day_range(date: NaiveDate, offset: FixedOffset) -> BookingResult<(DateTime, DateTime)> {
    let start = day_start(date, offset)?;
    let end = start
        .timestamp_millis()
        .checked_add(Duration::days(1).num_milliseconds())
        .map(DateTime::from_millis)
        .ok_or_else(|| BookingError::InvalidArgument(format!("date out of range: {date}")))?;
    Ok((start, end))
}

pub fn day_of(stored: DateTime, offset: FixedOffset) -> NaiveDate {
    stored.to_chrono().with_timezone(&offset).date_naive()
}
