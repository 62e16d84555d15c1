use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::Json,
};
use std::sync::Arc;

use crate::app::AppState;
use crate::error::BookingError;
use crate::models::{
    booking_model::BookingDetail,
    user_model::{SignupRequest, UserResponse},
};

pub async fn signup(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), BookingError> {
    let Json(request) = payload?;
    let user = state.identity.signup(request).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn load_user_bookings(
    Path(id_str): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<BookingDetail>>, BookingError> {
    Ok(Json(state.identity.user_bookings(&id_str).await?))
}
