pub mod channel;
pub mod event;
pub mod health;
pub mod job;
pub mod record;
pub mod retry;
