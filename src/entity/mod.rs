pub mod appointments;
pub mod audit_logs;
pub mod blocked_days;
pub mod patients;
pub mod users;

pub use appointments::Entity as Appointments;
pub use audit_logs::Entity as AuditLogs;
pub use blocked_days::Entity as BlockedDays;
pub use patients::Entity as Patients;
pub use users::Entity as Users;
