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
    movie_model::{MovieResponse, NewMovie},
};

pub async fn load_movies(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<MovieResponse>>, BookingError> {
    let movies = state.catalog.list_movies().await?;
    Ok(Json(movies.into_iter().map(MovieResponse::from).collect()))
}

pub async fn load_movie(
    Path(id_str): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<MovieResponse>, BookingError> {
    let movie = state.catalog.get_movie(&id_str).await?;
    Ok(Json(movie.into()))
}

pub async fn add_movie(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<NewMovie>, JsonRejection>,
) -> Result<(StatusCode, Json<MovieResponse>), BookingError> {
    let Json(new_movie) = payload?;
    let movie = state.catalog.add_movie(new_movie).await?;
    Ok((StatusCode::CREATED, Json(movie.into())))
}

pub async fn load_movie_bookings(
    Path(id_str): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<BookingDetail>>, BookingError> {
    Ok(Json(state.catalog.movie_bookings(&id_str).await?))
}
