//! Shared test utilities for the charging coordinator.
//!
//! This module provides common helper functions for setting up test databases,
//! pinning the clock and creating test entities with sensible defaults.

#![allow(clippy::unwrap_used)]

use crate::{
    core::{license_plate, shift::FixedClock, user},
    entities::{self, ReservationStatus, Timeslot, UserRole},
    errors::Result,
};
use chrono::{FixedOffset, NaiveDate, NaiveDateTime};
use sea_orm::{
    ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, DbErr, RuntimeErr, Set,
    SqlxSqliteConnector,
    sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::time::Duration;
use tempfile::TempDir;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
///
/// The pool holds a single connection, because each `SQLite` in-memory
/// connection is a separate database. Use [`setup_concurrent_test_db`] when
/// transactions must overlap.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// A `SQLite` database file in a temporary directory, removed on drop.
///
/// Unlike [`setup_test_db`], pools opened here hold several connections, so
/// concurrent transactions really overlap and contend on the store's locks.
pub struct FileTestDb {
    dir: TempDir,
}

impl FileTestDb {
    /// Creates an empty temporary directory for the database file.
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Opens a pool on the shared file and makes sure the tables exist.
    ///
    /// `busy_timeout` is how long a connection waits for another writer's lock
    /// before the store reports the database as locked.
    pub async fn connect(
        &self,
        max_connections: u32,
        busy_timeout: Duration,
    ) -> Result<DatabaseConnection> {
        let options = SqliteConnectOptions::new()
            .filename(self.dir.path().join("shared_charge.sqlite"))
            .create_if_missing(true)
            .busy_timeout(busy_timeout);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| DbErr::Conn(RuntimeErr::SqlxError(e)))?;
        let db = SqlxSqliteConnector::from_sqlx_sqlite_pool(pool);
        crate::config::database::create_tables(&db).await?;
        Ok(db)
    }
}

/// Sets up a file-backed database whose pool lets transactions run side by side.
/// Keep the returned [`FileTestDb`] alive for as long as the connection is used.
pub async fn setup_concurrent_test_db() -> Result<(FileTestDb, DatabaseConnection)> {
    let file = FileTestDb::new();
    let db = file.connect(4, Duration::from_secs(5)).await?;
    Ok((file, db))
}

/// Calendar date shorthand.
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Local wall-clock time shorthand.
pub fn local(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    date(year, month, day).and_hms_opt(hour, minute, 0).unwrap()
}

/// A clock frozen at the given local time in UTC+8.
pub fn clock_at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> FixedClock {
    let offset = FixedOffset::east_opt(8 * 3600).unwrap();
    FixedClock::at_local(local(year, month, day, hour, minute), offset)
}

/// Creates a regular test user with sensible defaults.
///
/// # Defaults
/// * `role`: user
/// * `unit_price`: None (deployment default applies)
/// * `can_reserve`: true
pub async fn create_test_user(db: &DatabaseConnection, name: &str) -> Result<entities::UserModel> {
    user::create_user(db, name.to_string(), UserRole::User, None, true).await
}

/// Creates a test user with a personal unit price.
pub async fn create_custom_user(
    db: &DatabaseConnection,
    name: &str,
    unit_price: Option<f64>,
) -> Result<entities::UserModel> {
    user::create_user(db, name.to_string(), UserRole::User, unit_price, true).await
}

/// Inserts a pending reservation directly, bypassing the scheduling guards.
/// Use this to arrange history that the guards would otherwise refuse.
pub async fn create_test_reservation(
    db: &DatabaseConnection,
    user_id: i64,
    date: NaiveDate,
    timeslot: Timeslot,
) -> Result<entities::ReservationModel> {
    let now = chrono::Utc::now();
    let reservation = entities::reservation::ActiveModel {
        user_id: Set(user_id),
        date: Set(date),
        timeslot: Set(timeslot),
        status: Set(ReservationStatus::Pending),
        remark: Set(String::new()),
        license_plate_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    reservation.insert(db).await.map_err(Into::into)
}

/// Inserts a record for a reservation without touching the reservation's status.
/// This reproduces a settlement whose completion flip was lost.
///
/// # Defaults
/// * `unit_price`: 0.7
pub async fn insert_record_for(
    db: &DatabaseConnection,
    reservation: &entities::ReservationModel,
    kwh: f64,
) -> Result<entities::RecordModel> {
    let now = chrono::Utc::now();
    let record = entities::record::ActiveModel {
        user_id: Set(reservation.user_id),
        date: Set(reservation.date),
        kwh: Set(kwh),
        unit_price: Set(0.7),
        amount: Set(crate::core::record::calculate_amount(kwh, 0.7)),
        image_ref: Set(None),
        remark: Set(String::new()),
        reservation_id: Set(Some(reservation.id)),
        timeslot: Set(Some(reservation.timeslot)),
        license_plate_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    record.insert(db).await.map_err(Into::into)
}

/// Creates a non-default-requesting plate for a user.
pub async fn create_test_plate(
    db: &DatabaseConnection,
    user_id: i64,
    plate_number: &str,
) -> Result<entities::LicensePlateModel> {
    license_plate::create_license_plate(db, user_id, plate_number, false).await
}

/// Sets up a complete test environment with one user.
/// Returns (db, user) for common test scenarios.
pub async fn setup_with_user() -> Result<(DatabaseConnection, entities::UserModel)> {
    let db = setup_test_db().await?;
    let user = create_test_user(&db, "alice").await?;
    Ok((db, user))
}
