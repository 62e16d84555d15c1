use std::sync::Arc;

use crate::error::{BookingError, BookingResult};
use crate::models::{
    booking_model::BookingDetail,
    movie_model::{Movie, NewMovie},
};
use crate::services::booking_details;
use crate::store::BookingStore;
use crate::utils::parse_object_id;

pub struct CatalogService {
    store: Arc<dyn BookingStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        CatalogService { store }
    }

    pub async fn add_movie(&self, new_movie: NewMovie) -> BookingResult<Movie> {
        let movie = new_movie.into_movie()?;
        let movie = self.store.insert_movie(movie).await?;
        tracing::info!(movie_id = %movie.id, title = %movie.title, "movie added");
        Ok(movie)
    }

    pub async fn list_movies(&self) -> BookingResult<Vec<Movie>> {
        self.store.list_movies().await
    }

    pub async fn get_movie(&self, movie_id: &str) -> BookingResult<Movie> {
        let id = parse_object_id("movie", movie_id)?;
        self.store
            .get_movie(id)
            .await?
            .ok_or_else(|| BookingError::NotFound("Movie".to_string()))
    }

    /// Every booking for the movie, newest first, with user details resolved.
    pub async fn movie_bookings(&self, movie_id: &str) -> BookingResult<Vec<BookingDetail>> {
        let movie = self.get_movie(movie_id).await?;
        let bookings = self.store.bookings_for_movie(movie.id).await?;
        booking_details(&self.store, bookings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking_model::PaymentStatus;
    use crate::models::movie_model::{Theater, TimeSlot};
    use crate::services::fixtures::world;
    use chrono::NaiveDate;

    fn new_movie(title: &str) -> NewMovie {
        NewMovie {
            title: title.to_string(),
            description: "A heist inside dreams".to_string(),
            language: "English".to_string(),
            actors: vec!["Leonardo DiCaprio".to_string(), " ".to_string()],
            release_date: NaiveDate::from_ymd_opt(2010, 7, 16).unwrap(),
            poster_url: "https://img/inception.png".to_string(),
            featured: false,
            theaters: vec![Theater {
                name: "Cinema C".to_string(),
                location: "Harbour".to_string(),
                time_slots: vec![TimeSlot {
                    time: "20:00".to_string(),
                    price: 180.0,
                }],
            }],
            admin_id: None,
        }
    }

    #[tokio::test]
    async fn added_movies_are_listed_and_fetchable() {
        let world = world().await;
        let catalog = CatalogService::new(world.store.clone());

        let movie = catalog.add_movie(new_movie("Inception")).await.unwrap();
        assert_eq!(movie.actors, vec!["Leonardo DiCaprio".to_string()]);
        assert!(movie.bookings.is_empty());

        let listed = catalog.list_movies().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|listed| listed.id == movie.id));

        let fetched = catalog.get_movie(&movie.id.to_hex()).await.unwrap();
        assert_eq!(fetched.title, "Inception");
    }

    #[tokio::test]
    async fn invalid_movies_are_rejected() {
        let world = world().await;
        let catalog = CatalogService::new(world.store.clone());

        let mut movie = new_movie("Inception");
        movie.theaters.clear();
        assert!(matches!(
            catalog.add_movie(movie).await,
            Err(BookingError::InvalidArgument(_))
        ));

        assert!(matches!(
            catalog.add_movie(new_movie("  ")).await,
            Err(BookingError::InvalidArgument(_))
        ));
        assert_eq!(catalog.list_movies().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn movie_bookings_resolve_users() {
        let world = world().await;
        let catalog = CatalogService::new(world.store.clone());

        world.seed_booking(world.in_days(1), &[1], PaymentStatus::Completed).await;
        world.seed_booking(world.in_days(2), &[2], PaymentStatus::Pending).await;

        let bookings = catalog.movie_bookings(&world.movie.id.to_hex()).await.unwrap();
        assert_eq!(bookings.len(), 2);
        for booking in &bookings {
            assert_eq!(booking.user_details.as_ref().unwrap().name, "Asha");
        }

        assert!(matches!(
            catalog.movie_bookings("zzz").await,
            Err(BookingError::InvalidArgument(_))
        ));
    }
}
