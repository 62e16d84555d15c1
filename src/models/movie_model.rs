use std::collections::HashSet;

use mongodb::bson::{oid::ObjectId, serde_helpers::serialize_bson_datetime_as_rfc3339_string, DateTime};
use serde::{Deserialize, Serialize};

use crate::error::{BookingError, BookingResult};
use crate::utils::{
    day_start, parse_object_id, reference_offset, serialize_object_id, serialize_object_ids,
    serialize_optional_object_id,
};

pub const DEFAULT_SLOT_PRICE: f64 = 150.0;

fn default_price() -> f64 {
    DEFAULT_SLOT_PRICE
}

fn default_language() -> String {
    "English".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub time: String,
    #[serde(default = "default_price")]
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theater {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub time_slots: Vec<TimeSlot>,
}

impl Theater {
    pub fn slot(&self, time: &str) -> Option<&TimeSlot> {
        self.time_slots.iter().find(|slot| slot.time == time)
    }
}

/// Stored movie document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub description: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub actors: Vec<String>,
    pub release_date: DateTime,
    pub poster_url: String,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub theaters: Vec<Theater>,
    #[serde(default)]
    pub bookings: Vec<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<ObjectId>,
}

impl Movie {
    pub fn theater(&self, name: &str) -> Option<&Theater> {
        self.theaters.iter().find(|theater| theater.name == name)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieResponse {
    #[serde(rename = "_id", serialize_with = "serialize_object_id")]
    pub id: ObjectId,
    pub title: String,
    pub description: String,
    pub language: String,
    pub actors: Vec<String>,
    #[serde(serialize_with = "serialize_bson_datetime_as_rfc3339_string")]
    pub release_date: DateTime,
    pub poster_url: String,
    pub featured: bool,
    pub theaters: Vec<Theater>,
    #[serde(serialize_with = "serialize_object_ids")]
    pub bookings: Vec<ObjectId>,
    #[serde(
        serialize_with = "serialize_optional_object_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub admin: Option<ObjectId>,
}

impl From<Movie> for MovieResponse {
    fn from(movie: Movie) -> Self {
        MovieResponse {
            id: movie.id,
            title: movie.title,
            description: movie.description,
            language: movie.language,
            actors: movie.actors,
            release_date: movie.release_date,
            poster_url: movie.poster_url,
            featured: movie.featured,
            theaters: movie.theaters,
            bookings: movie.bookings,
            admin: movie.admin,
        }
    }
}

/// Body of `POST /movies`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewMovie {
    pub title: String,
    pub description: String,
    #[serde(default = "default_language")]
    pub language: String,
    pub actors: Vec<String>,
    pub release_date: chrono::NaiveDate,
    pub poster_url: String,
    #[serde(default)]
    pub featured: bool,
    pub theaters: Vec<Theater>,
    #[serde(default)]
    pub admin_id: Option<String>,
}

impl NewMovie {
    /// Checks the catalog invariants and builds the document to insert.
    pub fn into_movie(self) -> BookingResult<Movie> {
        let required = [
            ("title", &self.title),
            ("description", &self.description),
            ("posterUrl", &self.poster_url),
            ("language", &self.language),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(BookingError::InvalidArgument(format!("{field} is required")));
            }
        }

        validate_theaters(&self.theaters)?;

        let admin = match self.admin_id.as_deref() {
            Some(raw) => Some(parse_object_id("admin", raw)?),
            None => None,
        };

        let release_date = day_start(self.release_date, reference_offset(0))?;

        Ok(Movie {
            id: ObjectId::new(),
            title: self.title.trim().to_string(),
            description: self.description,
            language: self.language,
            actors: self
                .actors
                .into_iter()
                .map(|actor| actor.trim().to_string())
                .filter(|actor| !actor.is_empty())
                .collect(),
            release_date,
            poster_url: self.poster_url,
            featured: self.featured,
            theaters: self.theaters,
            bookings: Vec::new(),
            admin,
        })
    }
}

pub fn validate_theaters(theaters: &[Theater]) -> BookingResult<()> {
    if theaters.is_empty() {
        return Err(BookingError::InvalidArgument(
            "at least one theater is required".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for theater in theaters {
        if theater.name.trim().is_empty() || theater.location.trim().is_empty() {
            return Err(BookingError::InvalidArgument("invalid theater data".to_string()));
        }
        if !names.insert(theater.name.as_str()) {
            return Err(BookingError::InvalidArgument(format!(
                "duplicate theater name: {}",
                theater.name
            )));
        }
        if theater.time_slots.is_empty() {
            return Err(BookingError::InvalidArgument(format!(
                "theater {} has no time slots",
                theater.name
            )));
        }

        let mut times = HashSet::new();
        for slot in &theater.time_slots {
            if slot.time.trim().is_empty() || !slot.price.is_finite() || slot.price < 0.0 {
                return Err(BookingError::InvalidArgument("invalid time slot data".to_string()));
            }
            if !times.insert(slot.time.as_str()) {
                return Err(BookingError::InvalidArgument(format!(
                    "duplicate time slot {} in theater {}",
                    slot.time, theater.name
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn theater(name: &str, slots: &[(&str, f64)]) -> Theater {
        Theater {
            name: name.to_string(),
            location: "Downtown".to_string(),
            time_slots: slots
                .iter()
                .map(|(time, price)| TimeSlot {
                    time: time.to_string(),
                    price: *price,
                })
                .collect(),
        }
    }

    #[test]
    fn slot_price_defaults_to_150() {
        let slot: TimeSlot = serde_json::from_str(r#"{"time":"18:00"}"#).unwrap();
        assert_eq!(slot.price, 150.0);
    }

    #[test]
    fn theaters_must_be_unique_and_priced() {
        assert!(validate_theaters(&[theater("Cinema A", &[("18:00", 150.0)])]).is_ok());
        assert!(validate_theaters(&[]).is_err());
        assert!(validate_theaters(&[
            theater("Cinema A", &[("18:00", 150.0)]),
            theater("Cinema A", &[("21:00", 150.0)]),
        ])
        .is_err());
        assert!(validate_theaters(&[theater("Cinema A", &[("18:00", 150.0), ("18:00", 200.0)])]).is_err());
        assert!(validate_theaters(&[theater("Cinema A", &[("18:00", -1.0)])]).is_err());
    }

    #[test]
    fn new_movie_rejects_unknown_fields() {
        let body = r#"{
            "title": "Dune",
            "description": "Sand",
            "actors": ["Timothee"],
            "releaseDate": "2026-01-01",
            "posterUrl": "https://img/dune.png",
            "theaters": [],
            "rating": 5
        }"#;
        assert!(serde_json::from_str::<NewMovie>(body).is_err());
    }
}
