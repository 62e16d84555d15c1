use axum::{
    extract::Extension,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use crate::config::BookingSettings;
use crate::controllers::{
    booking_controller::*, home_controller, movie_controller::*, payment_controller::*,
    user_controller::*,
};
use crate::payment::PaymentProvider;
use crate::services::{
    BookingLifecycleManager, CatalogService, IdentityService, PaymentConfirmationHandler,
    ReservationEngine, SeatInventoryResolver,
};
use crate::store::BookingStore;
use crate::websockets::{websocket_handler, SeatFeed};

/// Everything a request handler can reach, shared behind one `Extension`.
pub struct AppState {
    pub catalog: CatalogService,
    pub identity: IdentityService,
    pub resolver: SeatInventoryResolver,
    pub reservations: ReservationEngine,
    pub confirmations: PaymentConfirmationHandler,
    pub lifecycle: BookingLifecycleManager,
    pub feed: SeatFeed,
}

impl AppState {
    pub fn new(
        store: Arc<dyn BookingStore>,
        payments: Arc<dyn PaymentProvider>,
        settings: BookingSettings,
    ) -> Self {
        AppState {
            catalog: CatalogService::new(store.clone()),
            identity: IdentityService::new(store.clone()),
            resolver: SeatInventoryResolver::new(store.clone()),
            reservations: ReservationEngine::new(store.clone(), payments.clone(), settings.clone()),
            confirmations: PaymentConfirmationHandler::new(
                store.clone(),
                payments,
                settings.payment_timeout,
            ),
            lifecycle: BookingLifecycleManager::new(store, settings),
            feed: SeatFeed::new(),
        }
    }
}

pub fn build_router(state: Arc<AppState>, allowed_origin: HeaderValue) -> Router {
    Router::new()
        .route("/", get(home_controller::index))
        .route("/ws", get(websocket_handler))
        .route("/movies", get(load_movies).post(add_movie))
        .route("/movies/:id", get(load_movie))
        .route("/movies/:id/bookings", get(load_movie_bookings))
        .route("/users", post(signup))
        .route("/users/:id/bookings", get(load_user_bookings))
        .route("/bookings", post(create_booking))
        .route("/bookings/booked-seats", get(load_booked_seats))
        .route("/bookings/:id", get(load_booking).delete(cancel_booking))
        .route("/payments/verify/:session_id", get(verify_payment))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_origin(allowed_origin)
                .allow_headers([header::CONTENT_TYPE]),
        )
        .layer(Extension(state))
}

/// Periodically fails unpaid bookings past their TTL and announces the freed seats.
pub fn spawn_expiry_sweep(state: Arc<AppState>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match state.lifecycle.expire_stale().await {
                Ok(expired) => {
                    for booking in &expired {
                        state.feed.seats_released(booking).await;
                    }
                }
                Err(err) => tracing::warn!(error = %err, "expiry sweep failed"),
            }
        }
    })
}
