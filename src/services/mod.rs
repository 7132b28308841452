pub mod appointment_service;
pub mod auth_service;
pub mod blocked_day_service;
pub mod notification_service;
pub mod patient_service;
pub mod schedule_service;
