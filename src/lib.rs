pub mod app;
pub mod config;
pub mod controllers;
pub mod error;
pub mod models;
pub mod payment;
pub mod services;
pub mod store;
pub mod utils;
pub mod websockets;
