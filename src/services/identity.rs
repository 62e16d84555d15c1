use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use mongodb::bson::oid::ObjectId;

use crate::error::{BookingError, BookingResult};
use crate::models::{
    booking_model::BookingDetail,
    user_model::{SignupRequest, User},
};
use crate::services::booking_details;
use crate::store::BookingStore;
use crate::utils::parse_object_id;

pub struct IdentityService {
    store: Arc<dyn BookingStore>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        IdentityService { store }
    }

    pub async fn signup(&self, request: SignupRequest) -> BookingResult<User> {
        request.validate()?;
        let email = request.email.trim().to_lowercase();

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(BookingError::InvalidArgument(
                "email is already registered".to_string(),
            ));
        }

        let user = User {
            id: ObjectId::new(),
            name: request.name.trim().to_string(),
            email,
            password: hash_password(&request.password)?,
            bookings: Vec::new(),
        };
        let user = self.store.insert_user(user).await?;
        tracing::info!(user_id = %user.id, "user signed up");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: &str) -> BookingResult<User> {
        let id = parse_object_id("user", user_id)?;
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| BookingError::NotFound("User".to_string()))
    }

    /// The user's bookings, newest first, with movie details resolved.
    pub async fn user_bookings(&self, user_id: &str) -> BookingResult<Vec<BookingDetail>> {
        let user = self.get_user(user_id).await?;
        let bookings = self.store.bookings_for_user(user.id).await?;
        booking_details(&self.store, bookings).await
    }
}

fn hash_password(password: &str) -> BookingResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| BookingError::Unavailable(format!("password hashing failed: {err}")))
}
