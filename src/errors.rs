//! Unified error types for the charging coordinator.
//!
//! Every fallible operation returns [`Result`]. The variants follow the four
//! client-facing classes (invalid input, not found, conflict, transient) plus
//! startup configuration failures.

use crate::entities::ReservationStatus;
use sea_orm::{DbErr, RuntimeErr, SqlErr, sqlx};
use thiserror::Error;

/// `SQLite` primary result code for a busy database file.
const SQLITE_BUSY: i32 = 5;
/// `SQLite` primary result code for a locked table.
const SQLITE_LOCKED: i32 = 6;
/// Postgres SQLSTATEs for serialization failure, deadlock and statement timeout.
const POSTGRES_RETRYABLE_STATES: [&str; 3] = ["40001", "40P01", "57014"];

/// Why a write was refused by one of the reservation or settlement guards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictReason {
    /// The user already holds a pending reservation dated today or later.
    #[error("outstanding reservation exists")]
    OutstandingReservation,
    /// The user's previous shift has ended without a usage record.
    #[error("must settle previous reservation {reservation_id} first")]
    UnsettledReservation {
        /// The reservation that still needs a record
        reservation_id: i64,
    },
    /// A non-cancelled reservation already covers this date and shift.
    #[error("slot already reserved by this user for this date/shift")]
    DuplicateSlot,
    /// The reservation is not in the `pending` state.
    #[error("reservation not awaiting settlement (status: {})", .status.as_str())]
    NotAwaitingSettlement {
        /// Status found on the reservation
        status: ReservationStatus,
    },
    /// A record already references the reservation.
    #[error("reservation already settled")]
    AlreadySettled,
    /// The reservation already reached a terminal state other than the requested one.
    #[error("reservation already {}", .status.as_str())]
    AlreadyTerminal {
        /// Terminal status found on the reservation
        status: ReservationStatus,
    },
    /// The user already registered this plate number.
    #[error("license plate already registered")]
    DuplicatePlate,
    /// The plate is referenced by reservations or records.
    #[error("license plate is referenced by reservations or records")]
    PlateInUse,
    /// A uniqueness constraint in the store rejected the write.
    #[error("duplicate write rejected by the store")]
    UniqueViolation,
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Startup configuration could not be read or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable description
        message: String,
    },

    /// Malformed date, timeslot, kWh, price or other caller input.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Human-readable description
        message: String,
    },

    /// The referenced row does not exist or is not owned by the caller.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of row that was looked up
        entity: &'static str,
        /// Identifier used for the lookup
        id: String,
    },

    /// A business guard refused the write.
    #[error("Conflict: {0}")]
    Conflict(ConflictReason),

    /// The store is unreachable or timed out; the caller may retry.
    #[error("Store unavailable: {0}")]
    Transient(#[source] DbErr),

    /// Any other store failure.
    #[error("Database error: {0}")]
    Database(#[source] DbErr),
}

impl Error {
    /// Shorthand for an [`Error::InvalidInput`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Shorthand for an [`Error::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Only transient store failures are worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Rewrites a store-level uniqueness violation into the guard it stands in for.
    #[must_use]
    pub fn or_conflict(self, reason: ConflictReason) -> Self {
        match self {
            Self::Conflict(ConflictReason::UniqueViolation) => Self::Conflict(reason),
            other => other,
        }
    }
}

impl From<DbErr> for Error {
    fn from(err: DbErr) -> Self {
        if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
            return Self::Conflict(ConflictReason::UniqueViolation);
        }
        let transient = match &err {
            DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
            DbErr::Exec(RuntimeErr::SqlxError(e)) | DbErr::Query(RuntimeErr::SqlxError(e)) => {
                is_transient_sqlx(e)
            }
            _ => false,
        };
        if transient {
            Self::Transient(err)
        } else {
            Self::Database(err)
        }
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| is_transient_code(&code)),
        _ => false,
    }
}

/// Whether a driver error code means "busy, try again".
///
/// `SQLite` reports numeric, possibly extended, result codes whose low byte is the
/// primary code. Postgres reports five-character SQLSTATEs.
fn is_transient_code(code: &str) -> bool {
    if POSTGRES_RETRYABLE_STATES.contains(&code) {
        return true;
    }
    code.len() < 5
        && code
            .parse::<i32>()
            .is_ok_and(|c| matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
