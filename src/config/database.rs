//! Database configuration module for the charging coordinator.
//!
//! This module handles the database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs. On top of the generated tables it
//! creates the partial unique index that backs the one-reservation-per-slot guard, which
//! `SeaORM` cannot express from the entity alone.

use crate::entities::{LicensePlate, Record, Reservation, User};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};

const DEFAULT_DATABASE_URL: &str = "sqlite://shared_charge.sqlite?mode=rwc";

/// At most one non-cancelled reservation per user, date and shift.
const RESERVATION_SLOT_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS \
     idx_reservations_user_date_timeslot ON reservations (user_id, date, timeslot) \
     WHERE status <> 'cancelled'";

/// Gets the database URL from environment variable or returns default `SQLite` path.
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
///
/// Falls back to a default local `SQLite` file if no environment variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    tracing::debug!("Connecting to database at {}", database_url);
    Database::connect(&database_url).await.map_err(Into::into)
}

/// Creates all tables and uniqueness guards if they do not exist yet.
///
/// Users come first because every other table references them.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut user_table = schema.create_table_from_entity(User);
    let mut plate_table = schema.create_table_from_entity(LicensePlate);
    let mut reservation_table = schema.create_table_from_entity(Reservation);
    let mut record_table = schema.create_table_from_entity(Record);

    db.execute(builder.build(user_table.if_not_exists())).await?;
    db.execute(builder.build(plate_table.if_not_exists())).await?;
    db.execute(builder.build(reservation_table.if_not_exists()))
        .await?;
    db.execute(builder.build(record_table.if_not_exists())).await?;

    db.execute_unprepared(RESERVATION_SLOT_INDEX).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::{
        LicensePlateModel, RecordModel, ReservationModel, ReservationStatus, Timeslot, UserModel,
        reservation, user,
    };
    use crate::errors::{ConflictReason, Error};
    use crate::test_utils::setup_test_db;
    use sea_orm::{ActiveModelTrait, EntityTrait, QuerySelect, Set};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = setup_test_db().await?;

        let _: Vec<UserModel> = User::find().limit(1).all(&db).await?;
        let _: Vec<LicensePlateModel> = LicensePlate::find().limit(1).all(&db).await?;
        let _: Vec<ReservationModel> = Reservation::find().limit(1).all(&db).await?;
        let _: Vec<RecordModel> = Record::find().limit(1).all(&db).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;
        create_tables(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_slot_index_rejects_second_live_reservation() -> Result<()> {
        let db = setup_test_db().await?;

        let now = chrono::Utc::now();
        let owner = user::ActiveModel {
            name: Set("alice".to_string()),
            role: Set(crate::entities::UserRole::User),
            unit_price: Set(None),
            can_reserve: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        let row = |status| reservation::ActiveModel {
            user_id: Set(owner.id),
            date: Set(chrono::NaiveDate::from_ymd_opt(2025, 7, 10).unwrap()),
            timeslot: Set(Timeslot::Day),
            status: Set(status),
            remark: Set(String::new()),
            license_plate_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        // Cancelled rows never collide with live ones
        row(ReservationStatus::Cancelled).insert(&db).await?;
        row(ReservationStatus::Pending).insert(&db).await?;

        let err = Error::from(
            row(ReservationStatus::Pending)
                .insert(&db)
                .await
                .unwrap_err(),
        );
        assert!(matches!(
            err,
            Error::Conflict(ConflictReason::UniqueViolation)
        ));
        Ok(())
    }
}
