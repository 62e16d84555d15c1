use anyhow::{anyhow, Context};
use axum::http::HeaderValue;
use mongodb::{bson::doc, options::ClientOptions, Client};
use shuttle_secrets::{SecretStore, Secrets};
use std::sync::Arc;

use movie_booking_api::{
    app::{build_router, spawn_expiry_sweep, AppState},
    config::AppConfig,
    payment::StripeProvider,
    store::MongoStore,
};

#[shuttle_runtime::main]
async fn main(#[Secrets] secret_store: SecretStore) -> shuttle_axum::ShuttleAxum {
    // secrets are defined in the `Secrets.toml` file
    let config = AppConfig::from_lookup(|key| secret_store.get(key))?;

    let client_options = ClientOptions::parse(&config.database_url)
        .await
        .context("failed to parse MONGODB_URI")?;
    let client = Client::with_options(client_options).context("failed to initialize MongoDB client")?;

    client
        .database(&config.database_name)
        .run_command(doc! {"ping": 1}, None)
        .await
        .context("failed to ping MongoDB")?;
    tracing::info!(database = %config.database_name, "connected to MongoDB");

    let store = MongoStore::new(client, &config.database_name, config.booking.offset());
    store
        .ensure_indexes()
        .await
        .map_err(|err| anyhow!("failed to create indexes: {err}"))?;

    let payments = StripeProvider::new(config.stripe_secret_key.clone(), config.booking.payment_timeout)
        .map_err(|err| anyhow!("failed to build the Stripe client: {err}"))?;

    let allowed_origin = config
        .app_url
        .parse::<HeaderValue>()
        .with_context(|| format!("APP_URL is not a valid origin: {}", config.app_url))?;

    let state = Arc::new(AppState::new(
        Arc::new(store),
        Arc::new(payments),
        config.booking.clone(),
    ));
    spawn_expiry_sweep(state.clone(), config.sweep_interval);

    let app = build_router(state, allowed_origin);

    Ok(app.into())
}
