//! Status projection - What a user should do next.
//!
//! Read-only view over reservations and records. It never changes state, so
//! clients can poll it freely.

use crate::{
    core::{
        record::count_records_for_reservation, reservation::latest_pending_reservation,
        shift::Clock,
    },
    entities::reservation,
    errors::Result,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;

/// The user's position in the reserve, charge, settle cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CurrentStatus {
    /// Pending reservation whose shift has not ended yet
    pub current_reservation: Option<reservation::Model>,
    /// Whether a finished shift is waiting for its usage record
    pub needs_upload: bool,
    /// The finished reservation that needs a record, when `needs_upload` is set
    pub last_reservation: Option<reservation::Model>,
}

/// Projects the user's current status from their latest pending reservation.
///
/// A pending reservation whose shift ended but which already has a record
/// (the completion flip was lost) is treated as settled.
pub async fn get_current_status(
    db: &DatabaseConnection,
    clock: &dyn Clock,
    user_id: i64,
) -> Result<CurrentStatus> {
    let Some(latest) = latest_pending_reservation(db, user_id).await? else {
        return Ok(CurrentStatus::default());
    };

    if !latest.timeslot.has_ended(latest.date, clock.local_now()) {
        return Ok(CurrentStatus {
            current_reservation: Some(latest),
            ..Default::default()
        });
    }

    if count_records_for_reservation(db, latest.id).await? == 0 {
        return Ok(CurrentStatus {
            current_reservation: None,
            needs_upload: true,
            last_reservation: Some(latest),
        });
    }

    Ok(CurrentStatus::default())
}
