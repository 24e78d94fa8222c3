//! Reservation business logic - Scheduling shifts on the shared charging slots.
//!
//! A user may hold one live reservation at a time. Creating a reservation runs three
//! guards in order (outstanding reservation, unsettled previous shift, duplicate slot)
//! inside one transaction that first locks the caller's user row, so two requests from
//! the same user cannot both pass the guards. Guards only ever look at the caller's own
//! rows; different users never contend with each other.

use crate::{
    core::{
        license_plate,
        record::count_records_for_reservation,
        shift::{Clock, MonthRange, parse_date, parse_month},
        user::lock_user_row,
    },
    entities::{Reservation, ReservationStatus, Timeslot, reservation},
    errors::{ConflictReason, Error, Result},
};
use chrono::NaiveDate;
use sea_orm::{
    PaginatorTrait, QueryOrder, Select, Set, TransactionTrait, prelude::*, sea_query::Expr,
};
use tracing::{debug, info, warn};

/// Longest remark accepted on a reservation.
pub const MAX_REMARK_CHARS: usize = 255;

/// Date filter accepted by the reservation listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationFilter {
    /// No date restriction
    All,
    /// A single calendar day (`YYYY-MM-DD`)
    Day(NaiveDate),
    /// A calendar month (`YYYY-MM`)
    Month(MonthRange),
}

impl ReservationFilter {
    /// Parses an empty string, a `YYYY-MM-DD` day or a `YYYY-MM` month.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        match trimmed.len() {
            0 => Ok(Self::All),
            10 => parse_date(trimmed).map(Self::Day),
            7 => parse_month(trimmed).map(Self::Month),
            _ => Err(Error::invalid(format!(
                "filter must be YYYY-MM-DD or YYYY-MM, got {input:?}"
            ))),
        }
    }

    fn apply(self, query: Select<Reservation>) -> Select<Reservation> {
        match self {
            Self::All => query,
            Self::Day(date) => query.filter(reservation::Column::Date.eq(date)),
            Self::Month(range) => {
                query.filter(reservation::Column::Date.between(range.first, range.last))
            }
        }
    }
}

pub(crate) fn validate_remark(remark: &str) -> Result<String> {
    let remark = remark.trim();
    if remark.chars().count() > MAX_REMARK_CHARS {
        return Err(Error::invalid(format!(
            "remark longer than {MAX_REMARK_CHARS} characters"
        )));
    }
    Ok(remark.to_string())
}

/// Creates a pending reservation after checking the scheduling guards.
///
/// # Arguments
/// * `clock` - Source of "now" and "today" in the site's time zone
/// * `user_id` - Authenticated caller
/// * `date` - Shift date as `YYYY-MM-DD`
/// * `timeslot` - `"day"` or `"night"`
/// * `remark` - Free-text note
/// * `license_plate_id` - Optional plate, which must belong to the caller
///
/// # Errors
/// - `InvalidInput` for a malformed date, timeslot or remark (before any store access)
/// - `NotFound` if the user or the plate does not exist
/// - `Conflict` when the caller has an outstanding reservation, an unsettled
///   previous shift, or already holds this date and shift
pub async fn create_reservation(
    db: &DatabaseConnection,
    clock: &dyn Clock,
    user_id: i64,
    date: &str,
    timeslot: &str,
    remark: &str,
    license_plate_id: Option<i64>,
) -> Result<reservation::Model> {
    let date = parse_date(date)?;
    let timeslot: Timeslot = timeslot.parse()?;
    let remark = validate_remark(remark)?;

    let txn = db.begin().await?;
    lock_user_row(&txn, user_id).await?;

    check_scheduling_guards(&txn, clock, user_id, date, timeslot).await?;

    if let Some(plate_id) = license_plate_id {
        license_plate::require_owned_plate(&txn, user_id, plate_id).await?;
    }

    let now = chrono::Utc::now();
    let reservation = reservation::ActiveModel {
        user_id: Set(user_id),
        date: Set(date),
        timeslot: Set(timeslot),
        status: Set(ReservationStatus::Pending),
        remark: Set(remark),
        license_plate_id: Set(license_plate_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let created = reservation
        .insert(&txn)
        .await
        .map_err(|e| Error::from(e).or_conflict(ConflictReason::DuplicateSlot))?;

    txn.commit().await?;

    info!(
        user_id,
        reservation_id = created.id,
        date = %created.date,
        timeslot = created.timeslot.as_str(),
        "Reservation created"
    );
    Ok(created)
}

/// Runs the three scheduling guards in order; the first failure wins.
async fn check_scheduling_guards<C>(
    db: &C,
    clock: &dyn Clock,
    user_id: i64,
    date: NaiveDate,
    timeslot: Timeslot,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let today = clock.today();

    let outstanding = Reservation::find()
        .filter(reservation::Column::UserId.eq(user_id))
        .filter(reservation::Column::Status.eq(ReservationStatus::Pending))
        .filter(reservation::Column::Date.gte(today))
        .one(db)
        .await?;
    if let Some(outstanding) = outstanding {
        warn!(
            user_id,
            reservation_id = outstanding.id,
            "Rejected reservation: outstanding reservation exists"
        );
        return Err(Error::Conflict(ConflictReason::OutstandingReservation));
    }

    if let Some(last) = latest_live_reservation(db, user_id).await? {
        if last.timeslot.has_ended(last.date, clock.local_now())
            && count_records_for_reservation(db, last.id).await? == 0
        {
            warn!(
                user_id,
                reservation_id = last.id,
                "Rejected reservation: previous reservation not settled"
            );
            return Err(Error::Conflict(ConflictReason::UnsettledReservation {
                reservation_id: last.id,
            }));
        }
    }

    let duplicates = Reservation::find()
        .filter(reservation::Column::UserId.eq(user_id))
        .filter(reservation::Column::Date.eq(date))
        .filter(reservation::Column::Timeslot.eq(timeslot))
        .filter(reservation::Column::Status.ne(ReservationStatus::Cancelled))
        .count(db)
        .await?;
    if duplicates > 0 {
        warn!(
            user_id,
            date = %date,
            shift = timeslot.label(),
            "Rejected reservation: slot already reserved"
        );
        return Err(Error::Conflict(ConflictReason::DuplicateSlot));
    }

    Ok(())
}

/// The user's most recent non-cancelled reservation by date.
pub async fn latest_live_reservation<C>(db: &C, user_id: i64) -> Result<Option<reservation::Model>>
where
    C: ConnectionTrait,
{
    Reservation::find()
        .filter(reservation::Column::UserId.eq(user_id))
        .filter(reservation::Column::Status.ne(ReservationStatus::Cancelled))
        .order_by_desc(reservation::Column::Date)
        .order_by_desc(reservation::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// The user's most recent pending reservation by date.
pub async fn latest_pending_reservation<C>(
    db: &C,
    user_id: i64,
) -> Result<Option<reservation::Model>>
where
    C: ConnectionTrait,
{
    Reservation::find()
        .filter(reservation::Column::UserId.eq(user_id))
        .filter(reservation::Column::Status.eq(ReservationStatus::Pending))
        .order_by_desc(reservation::Column::Date)
        .order_by_desc(reservation::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Cancels a reservation owned by the caller.
///
/// Cancelling is allowed whatever the shift's progress. Cancelling an already
/// cancelled reservation is a no-op that returns it unchanged; a completed
/// reservation cannot be cancelled.
///
/// # Errors
/// - `NotFound` if the reservation does not exist or belongs to someone else
/// - `Conflict(AlreadyTerminal)` if the reservation was already completed
pub async fn cancel_reservation(
    db: &DatabaseConnection,
    reservation_id: i64,
    user_id: i64,
) -> Result<reservation::Model> {
    let existing = get_owned_reservation(db, reservation_id, user_id).await?;

    if existing.status == ReservationStatus::Cancelled {
        debug!(reservation_id, user_id, "Reservation already cancelled");
        return Ok(existing);
    }
    if existing.status.is_terminal() {
        warn!(
            reservation_id,
            user_id,
            status = existing.status.as_str(),
            "Rejected cancel of terminal reservation"
        );
        return Err(Error::Conflict(ConflictReason::AlreadyTerminal {
            status: existing.status,
        }));
    }

    // Conditional on `pending` so a settlement racing this cancel is never overwritten
    let result = Reservation::update_many()
        .col_expr(
            reservation::Column::Status,
            Expr::value(ReservationStatus::Cancelled),
        )
        .col_expr(
            reservation::Column::UpdatedAt,
            Expr::value(chrono::Utc::now()),
        )
        .filter(reservation::Column::Id.eq(reservation_id))
        .filter(reservation::Column::UserId.eq(user_id))
        .filter(reservation::Column::Status.eq(ReservationStatus::Pending))
        .exec(db)
        .await?;

    let current = get_owned_reservation(db, reservation_id, user_id).await?;
    if result.rows_affected == 0 && current.status == ReservationStatus::Completed {
        return Err(Error::Conflict(ConflictReason::AlreadyTerminal {
            status: current.status,
        }));
    }

    info!(reservation_id, user_id, "Reservation cancelled");
    Ok(current)
}

/// Marks a pending reservation completed, scoped to its owner.
///
/// Returns whether a row changed. Reservations that are no longer pending are
/// left alone so a terminal state is never rewritten.
pub async fn mark_completed<C>(db: &C, reservation_id: i64, user_id: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = Reservation::update_many()
        .col_expr(
            reservation::Column::Status,
            Expr::value(ReservationStatus::Completed),
        )
        .col_expr(
            reservation::Column::UpdatedAt,
            Expr::value(chrono::Utc::now()),
        )
        .filter(reservation::Column::Id.eq(reservation_id))
        .filter(reservation::Column::UserId.eq(user_id))
        .filter(reservation::Column::Status.eq(ReservationStatus::Pending))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Finds a reservation by ID regardless of owner.
pub async fn get_reservation_by_id<C>(db: &C, reservation_id: i64) -> Result<Option<reservation::Model>>
where
    C: ConnectionTrait,
{
    Reservation::find_by_id(reservation_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds a reservation by ID and owner, failing with `NotFound` otherwise.
pub async fn get_owned_reservation<C>(
    db: &C,
    reservation_id: i64,
    user_id: i64,
) -> Result<reservation::Model>
where
    C: ConnectionTrait,
{
    Reservation::find()
        .filter(reservation::Column::Id.eq(reservation_id))
        .filter(reservation::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("reservation", reservation_id))
}

/// Lists every non-cancelled reservation, newest date first.
///
/// `filter` is empty, a `YYYY-MM-DD` day or a `YYYY-MM` month.
pub async fn list_reservations(
    db: &DatabaseConnection,
    filter: &str,
) -> Result<Vec<reservation::Model>> {
    let filter = ReservationFilter::parse(filter)?;
    let query = Reservation::find()
        .filter(reservation::Column::Status.ne(ReservationStatus::Cancelled));
    filter
        .apply(query)
        .order_by_desc(reservation::Column::Date)
        .order_by_desc(reservation::Column::CreatedAt)
        .order_by_desc(reservation::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Lists one user's reservations including cancelled ones, newest date first.
pub async fn list_user_reservations(
    db: &DatabaseConnection,
    user_id: i64,
    filter: &str,
) -> Result<Vec<reservation::Model>> {
    let filter = ReservationFilter::parse(filter)?;
    let query = Reservation::find().filter(reservation::Column::UserId.eq(user_id));
    filter
        .apply(query)
        .order_by_desc(reservation::Column::Date)
        .order_by_desc(reservation::Column::CreatedAt)
        .order_by_desc(reservation::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// The user's earliest non-cancelled reservation dated today or later.
pub async fn get_upcoming_reservation(
    db: &DatabaseConnection,
    clock: &dyn Clock,
    user_id: i64,
) -> Result<Option<reservation::Model>> {
    Reservation::find()
        .filter(reservation::Column::UserId.eq(user_id))
        .filter(reservation::Column::Status.ne(ReservationStatus::Cancelled))
        .filter(reservation::Column::Date.gte(clock.today()))
        .order_by_asc(reservation::Column::Date)
        .order_by_asc(reservation::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}
