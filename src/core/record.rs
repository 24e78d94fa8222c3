//! Record business logic - Settling reservations with charging usage.
//!
//! A record closes its reservation: the guards and the insert run in one
//! transaction, then the reservation is flipped to `completed` on a best-effort
//! basis. A failed flip leaves the record in place and is counted as drift,
//! which the status projector tolerates.

use crate::{
    config::settings::Settings,
    core::{
        license_plate,
        reservation::{get_owned_reservation, mark_completed, validate_remark},
        shift::{parse_date, parse_month},
        user::lock_user_row,
    },
    entities::{Record, ReservationStatus, record},
    errors::{ConflictReason, Error, Result},
};
use sea_orm::{
    PaginatorTrait, QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*,
};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

static COMPLETION_DRIFT: AtomicU64 = AtomicU64::new(0);

/// Number of settlements whose reservation could not be marked completed
/// since the process started.
pub fn completion_drift_count() -> u64 {
    COMPLETION_DRIFT.load(Ordering::Relaxed)
}

/// A usage record to settle against a pending reservation.
#[derive(Debug, Clone)]
pub struct NewRecord {
    /// Owner of the reservation
    pub user_id: i64,
    /// Charging date as `YYYY-MM-DD`
    pub date: String,
    /// Energy delivered
    pub kwh: f64,
    /// Reservation being settled
    pub reservation_id: i64,
    /// Price per kWh at the time of submission
    pub unit_price: f64,
    /// Free-text note
    pub remark: String,
    /// Reference to an uploaded meter photo
    pub image_ref: Option<String>,
    /// Plate charged, which must belong to the user
    pub license_plate_id: Option<i64>,
}

impl NewRecord {
    /// Record with no remark, image or plate.
    pub fn new(
        user_id: i64,
        date: impl Into<String>,
        kwh: f64,
        reservation_id: i64,
        unit_price: f64,
    ) -> Self {
        Self {
            user_id,
            date: date.into(),
            kwh,
            reservation_id,
            unit_price,
            remark: String::new(),
            image_ref: None,
            license_plate_id: None,
        }
    }

    /// Attaches a remark.
    #[must_use]
    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = remark.into();
        self
    }

    /// Attaches an image reference.
    #[must_use]
    pub fn with_image_ref(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    /// Attaches a license plate.
    #[must_use]
    pub const fn with_license_plate(mut self, license_plate_id: i64) -> Self {
        self.license_plate_id = Some(license_plate_id);
        self
    }
}

/// Field changes accepted by [`update_record`]. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    /// New energy amount; the cost is recomputed from it
    pub kwh: Option<f64>,
    /// New remark
    pub remark: Option<String>,
    /// New image reference
    pub image_ref: Option<String>,
    /// New license plate
    pub license_plate_id: Option<i64>,
}

fn validate_kwh(kwh: f64) -> Result<()> {
    if !kwh.is_finite() || kwh <= 0.0 {
        return Err(Error::invalid(format!(
            "kWh must be a positive number, got {kwh}"
        )));
    }
    Ok(())
}

fn validate_price(unit_price: f64) -> Result<()> {
    if !unit_price.is_finite() || unit_price <= 0.0 {
        return Err(Error::invalid(format!(
            "unit price must be a positive number, got {unit_price}"
        )));
    }
    Ok(())
}

/// Cost in minor currency units: `round(kwh * unit_price * 100)`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn calculate_amount(kwh: f64, unit_price: f64) -> i64 {
    (kwh * unit_price * 100.0).round() as i64
}

/// Number of records settling the given reservation.
pub async fn count_records_for_reservation<C>(db: &C, reservation_id: i64) -> Result<u64>
where
    C: ConnectionTrait,
{
    Record::find()
        .filter(record::Column::ReservationId.eq(reservation_id))
        .count(db)
        .await
        .map_err(Into::into)
}

/// Settles a pending reservation with a usage record.
///
/// The amount is computed from the snapshot `unit_price` carried by the request.
/// After the record is committed the reservation is marked completed; if that
/// second write fails the record still stands and the drift is logged and counted.
///
/// # Errors
/// - `InvalidInput` for a malformed date, non-positive kWh or price
/// - `NotFound` if the reservation (or plate) does not exist or is not the user's
/// - `Conflict(NotAwaitingSettlement)` if the reservation is not pending
/// - `Conflict(AlreadySettled)` if a record already references the reservation
pub async fn create_record(db: &DatabaseConnection, new_record: NewRecord) -> Result<record::Model> {
    let date = parse_date(&new_record.date)?;
    validate_kwh(new_record.kwh)?;
    validate_price(new_record.unit_price)?;
    let remark = validate_remark(&new_record.remark)?;
    let user_id = new_record.user_id;
    let reservation_id = new_record.reservation_id;

    let txn = db.begin().await?;
    lock_user_row(&txn, user_id).await?;

    let reservation = get_owned_reservation(&txn, reservation_id, user_id).await?;
    if reservation.status != ReservationStatus::Pending {
        warn!(
            reservation_id,
            user_id,
            status = reservation.status.as_str(),
            "Rejected record: reservation not awaiting settlement"
        );
        return Err(Error::Conflict(ConflictReason::NotAwaitingSettlement {
            status: reservation.status,
        }));
    }
    if count_records_for_reservation(&txn, reservation_id).await? > 0 {
        warn!(reservation_id, user_id, "Rejected record: reservation already settled");
        return Err(Error::Conflict(ConflictReason::AlreadySettled));
    }
    if let Some(plate_id) = new_record.license_plate_id {
        license_plate::require_owned_plate(&txn, user_id, plate_id).await?;
    }

    let now = chrono::Utc::now();
    let record = record::ActiveModel {
        user_id: Set(user_id),
        date: Set(date),
        kwh: Set(new_record.kwh),
        unit_price: Set(new_record.unit_price),
        amount: Set(calculate_amount(new_record.kwh, new_record.unit_price)),
        image_ref: Set(new_record.image_ref),
        remark: Set(remark),
        reservation_id: Set(Some(reservation_id)),
        timeslot: Set(Some(reservation.timeslot)),
        license_plate_id: Set(new_record.license_plate_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let created = record
        .insert(&txn)
        .await
        .map_err(|e| Error::from(e).or_conflict(ConflictReason::AlreadySettled))?;

    txn.commit().await?;

    info!(
        user_id,
        reservation_id,
        record_id = created.id,
        kwh = created.kwh,
        amount = created.amount,
        "Record created"
    );

    match mark_completed(db, reservation_id, user_id).await {
        Ok(true) => {}
        Ok(false) => {
            COMPLETION_DRIFT.fetch_add(1, Ordering::Relaxed);
            warn!(
                reservation_id,
                user_id, "Reservation no longer pending after settlement; left as is"
            );
        }
        Err(e) => {
            COMPLETION_DRIFT.fetch_add(1, Ordering::Relaxed);
            warn!(
                reservation_id,
                user_id,
                error = %e,
                "Failed to mark reservation completed after settlement"
            );
        }
    }

    Ok(created)
}

/// Updates a record owned by the user, recomputing its amount.
///
/// The stored unit price snapshot is kept; only the kWh side of the amount changes.
pub async fn update_record(
    db: &DatabaseConnection,
    user_id: i64,
    record_id: i64,
    changes: RecordUpdate,
) -> Result<record::Model> {
    if let Some(kwh) = changes.kwh {
        validate_kwh(kwh)?;
    }
    let remark = changes.remark.as_deref().map(validate_remark).transpose()?;

    let existing = get_record_by_id(db, user_id, record_id).await?;
    if let Some(plate_id) = changes.license_plate_id {
        license_plate::require_owned_plate(db, user_id, plate_id).await?;
    }

    let kwh = changes.kwh.unwrap_or(existing.kwh);
    let amount = calculate_amount(kwh, existing.unit_price);
    let mut record: record::ActiveModel = existing.into();
    record.kwh = Set(kwh);
    record.amount = Set(amount);
    if let Some(remark) = remark {
        record.remark = Set(remark);
    }
    if let Some(image_ref) = changes.image_ref.filter(|r| !r.is_empty()) {
        record.image_ref = Set(Some(image_ref));
    }
    if let Some(plate_id) = changes.license_plate_id {
        record.license_plate_id = Set(Some(plate_id));
    }
    record.updated_at = Set(chrono::Utc::now());

    let updated = record.update(db).await?;
    info!(user_id, record_id, kwh, amount, "Record updated");
    Ok(updated)
}

/// Finds a record by ID and owner, failing with `NotFound` otherwise.
pub async fn get_record_by_id(
    db: &DatabaseConnection,
    user_id: i64,
    record_id: i64,
) -> Result<record::Model> {
    Record::find()
        .filter(record::Column::Id.eq(record_id))
        .filter(record::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("record", record_id))
}

/// Records with no reservation link, i.e. imported usage that still counts as debt.
pub async fn get_unsubmitted_records(
    db: &DatabaseConnection,
    user_id: i64,
) -> Result<Vec<record::Model>> {
    Record::find()
        .filter(record::Column::UserId.eq(user_id))
        .filter(record::Column::ReservationId.is_null())
        .order_by_desc(record::Column::Date)
        .order_by_desc(record::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Most recently created records of a user, capped at `limit`.
///
/// Without an explicit limit the deployment's `recent_records_limit` applies.
pub async fn get_recent_records(
    db: &DatabaseConnection,
    settings: &Settings,
    user_id: i64,
    limit: Option<u64>,
) -> Result<Vec<record::Model>> {
    Record::find()
        .filter(record::Column::UserId.eq(user_id))
        .order_by_desc(record::Column::CreatedAt)
        .order_by_desc(record::Column::Id)
        .limit(limit.unwrap_or(settings.recent_records_limit))
        .all(db)
        .await
        .map_err(Into::into)
}

/// Records of a user dated within a `YYYY-MM` month, newest date first.
pub async fn get_records_by_month(
    db: &DatabaseConnection,
    user_id: i64,
    month: &str,
) -> Result<Vec<record::Model>> {
    let range = parse_month(month)?;
    Record::find()
        .filter(record::Column::UserId.eq(user_id))
        .filter(record::Column::Date.between(range.first, range.last))
        .order_by_desc(record::Column::Date)
        .order_by_desc(record::Column::CreatedAt)
        .order_by_desc(record::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Stores a record that is not linked to any reservation (bulk imports).
pub async fn insert_unsubmitted_record(
    db: &DatabaseConnection,
    user_id: i64,
    date: &str,
    kwh: f64,
    unit_price: f64,
    remark: &str,
) -> Result<record::Model> {
    let date = parse_date(date)?;
    validate_kwh(kwh)?;
    validate_price(unit_price)?;
    let remark = validate_remark(remark)?;

    let now = chrono::Utc::now();
    let record = record::ActiveModel {
        user_id: Set(user_id),
        date: Set(date),
        kwh: Set(kwh),
        unit_price: Set(unit_price),
        amount: Set(calculate_amount(kwh, unit_price)),
        image_ref: Set(None),
        remark: Set(remark),
        reservation_id: Set(None),
        timeslot: Set(None),
        license_plate_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let created = record.insert(db).await?;
    info!(user_id, record_id = created.id, "Imported unsubmitted record");
    Ok(created)
}
