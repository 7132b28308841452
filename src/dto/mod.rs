pub mod appointments;
pub mod auth;
pub mod blocked_days;
