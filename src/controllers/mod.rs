pub mod booking_controller;
pub mod home_controller;
pub mod movie_controller;
pub mod payment_controller;
pub mod user_controller;
