pub mod api;
pub mod clients;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod idempotency;
pub mod models;
pub mod providers;
pub mod queue;
pub mod store;
pub mod utils;
