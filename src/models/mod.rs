pub mod booking_model;
pub mod movie_model;
pub mod user_model;
