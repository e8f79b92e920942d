pub mod api;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod notifications;
pub mod pool;
pub mod recommendations;
pub mod stores;
pub mod utils;
