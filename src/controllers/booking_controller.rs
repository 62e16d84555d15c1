use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    response::Json,
};
use std::sync::Arc;

use crate::app::AppState;
use crate::error::BookingError;
use crate::models::booking_model::{
    BookedSeatsQuery, BookedSeatsResponse, BookingDetail, CancellationReceipt, ReservationRequest,
    ReservationResponse,
};

pub async fn load_booked_seats(
    Extension(state): Extension<Arc<AppState>>,
    query: Result<Query<BookedSeatsQuery>, QueryRejection>,
) -> Result<Json<BookedSeatsResponse>, BookingError> {
    let Query(query) = query?;
    Ok(Json(state.resolver.booked_seats(query).await?))
}

pub async fn create_booking(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<ReservationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ReservationResponse>), BookingError> {
    let Json(request) = payload?;
    let reservation = state.reservations.create_reservation(request).await?;
    state.feed.seats_held(&reservation.booking).await;

    let session_id = reservation.booking.payment_info.session_id.clone();
    Ok((
        StatusCode::CREATED,
        Json(ReservationResponse {
            booking: reservation.booking.into(),
            checkout_url: reservation.checkout_url,
            session_id,
        }),
    ))
}

pub async fn load_booking(
    Path(id_str): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<BookingDetail>, BookingError> {
    Ok(Json(state.lifecycle.get_booking(&id_str).await?))
}

pub async fn cancel_booking(
    Path(id_str): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<CancellationReceipt>, BookingError> {
    let (booking, receipt) = state.lifecycle.cancel(&id_str).await?;
    if booking.holds_seats() {
        state.feed.seats_released(&booking).await;
    }
    Ok(Json(receipt))
}
