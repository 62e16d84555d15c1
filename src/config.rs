use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::FixedOffset;

use crate::utils::reference_offset;

/// Upper bound for `BOOKING_WINDOW_DAYS`, roughly ten years.
pub const MAX_BOOKING_WINDOW_DAYS: i64 = 3650;

/// Settings read from the deployment's secret store (`Secrets.toml`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_name: String,
    pub app_url: String,
    pub stripe_secret_key: String,
    pub booking: BookingSettings,
    pub sweep_interval: Duration,
}

/// The knobs the booking services themselves depend on.
#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub utc_offset_minutes: i32,
    /// How many days ahead a show may be booked; `None` for no cap.
    pub booking_window_days: Option<i64>,
    pub payment_timeout: Duration,
    pub pending_ttl: Duration,
    pub currency: String,
    pub app_url: String,
}

impl BookingSettings {
    pub fn offset(&self) -> FixedOffset {
        reference_offset(self.utc_offset_minutes)
    }
}

impl Default for BookingSettings {
    fn default() -> Self {
        BookingSettings {
            utc_offset_minutes: 330,
            booking_window_days: Some(15),
            payment_timeout: Duration::from_secs(10),
            pending_ttl: Duration::from_secs(30 * 60),
            currency: "inr".to_string(),
            app_url: "http://localhost:3000".to_string(),
        }
    }
}

impl AppConfig {
    /// Builds the config from any key lookup, e.g. `|key| secret_store.get(key)`.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| anyhow!("secret {key} was not found"));
        let defaults = BookingSettings::default();

        let database_url = required("MONGODB_URI")?;
        let app_url = required("APP_URL")?.trim_end_matches('/').to_string();
        let stripe_secret_key = required("STRIPE_SECRET_KEY")?;

        let database_name = lookup("DATABASE_NAME").unwrap_or_else(|| "movie-booking".to_string());
        let currency = lookup("CURRENCY").unwrap_or(defaults.currency);

        let utc_offset_minutes: i32 = parse_or(&lookup, "UTC_OFFSET_MINUTES", defaults.utc_offset_minutes)?;
        if utc_offset_minutes.abs() >= 24 * 60 {
            return Err(anyhow!("UTC_OFFSET_MINUTES must be within one day"));
        }

        let booking_window_days = match lookup("BOOKING_WINDOW_DAYS") {
            Some(raw) if raw.eq_ignore_ascii_case("none") => None,
            Some(raw) => {
                let days = raw
                    .trim()
                    .parse::<i64>()
                    .with_context(|| format!("BOOKING_WINDOW_DAYS is not a number: {raw}"))?;
                if !(0..=MAX_BOOKING_WINDOW_DAYS).contains(&days) {
                    return Err(anyhow!(
                        "BOOKING_WINDOW_DAYS must be between 0 and {MAX_BOOKING_WINDOW_DAYS}"
                    ));
                }
                Some(days)
            }
            None => defaults.booking_window_days,
        };

        let payment_timeout_secs: u64 = parse_or(&lookup, "PAYMENT_TIMEOUT_SECS", 10)?;
        let pending_ttl_minutes: u64 = parse_or(&lookup, "PENDING_TTL_MINUTES", 30)?;
        let sweep_interval_secs: u64 = parse_or(&lookup, "SWEEP_INTERVAL_SECS", 60)?;

        Ok(AppConfig {
            database_url,
            database_name,
            app_url: app_url.clone(),
            stripe_secret_key,
            booking: BookingSettings {
                utc_offset_minutes,
                booking_window_days,
                payment_timeout: Duration::from_secs(payment_timeout_secs.max(1)),
                pending_ttl: Duration::from_secs(pending_ttl_minutes * 60),
                currency,
                app_url,
            },
            sweep_interval: Duration::from_secs(sweep_interval_secs.max(1)),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}
