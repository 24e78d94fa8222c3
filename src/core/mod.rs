//! Core business logic - framework-agnostic scheduling, settlement and reporting.
//!
//! Every operation takes the database connection (and a [`shift::Clock`] where
//! the answer depends on the time) and returns [`crate::errors::Result`].

/// Vehicle registration per user
pub mod license_plate;
/// Usage records and reservation settlement
pub mod record;
/// Monthly usage and settlement reports
pub mod report;
/// Reservation scheduling and cancellation
pub mod reservation;
/// Shift windows, date parsing and the clock
pub mod shift;
/// Read-only "what next" projection for a user
pub mod status;
/// Users, unit prices and the per-user write lock
pub mod user;
