//! License plate business logic - The vehicles each user charges.
//!
//! Each user keeps a small list of plates with at most one default. Changing the
//! default is an explicit two-step update (clear, then set) inside a transaction.

use crate::{
    core::user::lock_user_row,
    entities::{LicensePlate, Record, Reservation, license_plate, record, reservation},
    errors::{ConflictReason, Error, Result},
};
use sea_orm::{
    PaginatorTrait, QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr,
};
use tracing::info;

const MIN_PLATE_CHARS: usize = 6;
const MAX_PLATE_CHARS: usize = 10;

fn validate_plate_number(plate_number: &str) -> Result<String> {
    let plate_number = plate_number.trim();
    let len = plate_number.chars().count();
    if !(MIN_PLATE_CHARS..=MAX_PLATE_CHARS).contains(&len) {
        return Err(Error::invalid(format!(
            "plate number must be {MIN_PLATE_CHARS}-{MAX_PLATE_CHARS} characters, got {plate_number:?}"
        )));
    }
    Ok(plate_number.to_string())
}

/// Finds a plate by ID and owner, failing with `NotFound` otherwise.
pub async fn require_owned_plate<C>(
    db: &C,
    user_id: i64,
    plate_id: i64,
) -> Result<license_plate::Model>
where
    C: ConnectionTrait,
{
    LicensePlate::find()
        .filter(license_plate::Column::Id.eq(plate_id))
        .filter(license_plate::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("license plate", plate_id))
}

async fn ensure_plate_number_free<C>(
    db: &C,
    user_id: i64,
    plate_number: &str,
    except_id: Option<i64>,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let mut query = LicensePlate::find()
        .filter(license_plate::Column::UserId.eq(user_id))
        .filter(license_plate::Column::PlateNumber.eq(plate_number));
    if let Some(id) = except_id {
        query = query.filter(license_plate::Column::Id.ne(id));
    }
    if query.count(db).await? > 0 {
        return Err(Error::Conflict(ConflictReason::DuplicatePlate));
    }
    Ok(())
}

async fn clear_defaults<C>(db: &C, user_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    LicensePlate::update_many()
        .col_expr(license_plate::Column::IsDefault, Expr::value(false))
        .filter(license_plate::Column::UserId.eq(user_id))
        .filter(license_plate::Column::IsDefault.eq(true))
        .exec(db)
        .await?;
    Ok(())
}

/// Registers a plate for a user.
///
/// The user's first plate always becomes the default. Asking for `is_default`
/// moves the default flag to the new plate.
pub async fn create_license_plate(
    db: &DatabaseConnection,
    user_id: i64,
    plate_number: &str,
    is_default: bool,
) -> Result<license_plate::Model> {
    let plate_number = validate_plate_number(plate_number)?;

    let txn = db.begin().await?;
    lock_user_row(&txn, user_id).await?;
    ensure_plate_number_free(&txn, user_id, &plate_number, None).await?;

    let existing = LicensePlate::find()
        .filter(license_plate::Column::UserId.eq(user_id))
        .count(&txn)
        .await?;
    let is_default = is_default || existing == 0;
    if is_default {
        clear_defaults(&txn, user_id).await?;
    }

    let now = chrono::Utc::now();
    let plate = license_plate::ActiveModel {
        user_id: Set(user_id),
        plate_number: Set(plate_number),
        is_default: Set(is_default),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let created = plate.insert(&txn).await?;
    txn.commit().await?;

    info!(user_id, plate_id = created.id, is_default, "License plate created");
    Ok(created)
}

/// Lists a user's plates, default first.
pub async fn list_license_plates(
    db: &DatabaseConnection,
    user_id: i64,
) -> Result<Vec<license_plate::Model>> {
    LicensePlate::find()
        .filter(license_plate::Column::UserId.eq(user_id))
        .order_by_desc(license_plate::Column::IsDefault)
        .order_by_asc(license_plate::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// The user's default plate, if any.
pub async fn get_default_license_plate(
    db: &DatabaseConnection,
    user_id: i64,
) -> Result<Option<license_plate::Model>> {
    LicensePlate::find()
        .filter(license_plate::Column::UserId.eq(user_id))
        .filter(license_plate::Column::IsDefault.eq(true))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Makes the given plate the user's default.
pub async fn set_default_license_plate(
    db: &DatabaseConnection,
    user_id: i64,
    plate_id: i64,
) -> Result<license_plate::Model> {
    let txn = db.begin().await?;
    lock_user_row(&txn, user_id).await?;
    let plate = require_owned_plate(&txn, user_id, plate_id).await?;

    clear_defaults(&txn, user_id).await?;
    let mut plate: license_plate::ActiveModel = plate.into();
    plate.is_default = Set(true);
    plate.updated_at = Set(chrono::Utc::now());
    let updated = plate.update(&txn).await?;
    txn.commit().await?;

    info!(user_id, plate_id, "Default license plate changed");
    Ok(updated)
}

/// Renames a plate.
pub async fn update_license_plate(
    db: &DatabaseConnection,
    user_id: i64,
    plate_id: i64,
    plate_number: &str,
) -> Result<license_plate::Model> {
    let plate_number = validate_plate_number(plate_number)?;

    let txn = db.begin().await?;
    lock_user_row(&txn, user_id).await?;
    let plate = require_owned_plate(&txn, user_id, plate_id).await?;
    ensure_plate_number_free(&txn, user_id, &plate_number, Some(plate_id)).await?;

    let mut plate: license_plate::ActiveModel = plate.into();
    plate.plate_number = Set(plate_number);
    plate.updated_at = Set(chrono::Utc::now());
    let updated = plate.update(&txn).await?;
    txn.commit().await?;

    info!(user_id, plate_id, "License plate updated");
    Ok(updated)
}

/// Deletes a plate that no reservation or record references.
///
/// Deleting the default plate promotes the user's oldest remaining plate.
pub async fn delete_license_plate(
    db: &DatabaseConnection,
    user_id: i64,
    plate_id: i64,
) -> Result<()> {
    let txn = db.begin().await?;
    lock_user_row(&txn, user_id).await?;
    let plate = require_owned_plate(&txn, user_id, plate_id).await?;

    let reservations = Reservation::find()
        .filter(reservation::Column::LicensePlateId.eq(plate_id))
        .count(&txn)
        .await?;
    let records = Record::find()
        .filter(record::Column::LicensePlateId.eq(plate_id))
        .count(&txn)
        .await?;
    if reservations + records > 0 {
        return Err(Error::Conflict(ConflictReason::PlateInUse));
    }

    let was_default = plate.is_default;
    LicensePlate::delete_by_id(plate_id).exec(&txn).await?;

    if was_default {
        let successor = LicensePlate::find()
            .filter(license_plate::Column::UserId.eq(user_id))
            .order_by_asc(license_plate::Column::Id)
            .one(&txn)
            .await?;
        if let Some(successor) = successor {
            let mut successor: license_plate::ActiveModel = successor.into();
            successor.is_default = Set(true);
            successor.updated_at = Set(chrono::Utc::now());
            successor.update(&txn).await?;
        }
    }

    txn.commit().await?;
    info!(user_id, plate_id, "License plate deleted");
    Ok(())
}
