//! Reservation entity - A user's claim on one shift of one calendar day.
//!
//! Reservations start `pending`, become `completed` once a usage record settles
//! them, or `cancelled` when the owner withdraws. Both end states are terminal.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One of the two fixed daily charging windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum Timeslot {
    /// 08:00 to 20:00 of the reservation date
    #[sea_orm(string_value = "day")]
    Day,
    /// 20:00 of the reservation date to 08:00 of the next day
    #[sea_orm(string_value = "night")]
    Night,
}

/// Lifecycle state of a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Awaiting its shift or its usage record
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Withdrawn by the owner
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    /// Settled by a usage record
    #[sea_orm(string_value = "completed")]
    Completed,
}

impl ReservationStatus {
    /// Returns the stored token for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    /// Cancelled and completed reservations never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Reservation database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reservations")]
pub struct Model {
    /// Unique identifier for the reservation
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owner of the reservation
    pub user_id: i64,
    /// Calendar day of the shift (no time of day)
    pub date: Date,
    /// Which shift of that day
    pub timeslot: Timeslot,
    /// Current lifecycle state
    pub status: ReservationStatus,
    /// Free-text note from the owner
    pub remark: String,
    /// Plate the owner intends to charge, if any
    pub license_plate_id: Option<i64>,
    /// When the reservation was created
    pub created_at: DateTimeUtc,
    /// When the reservation was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Reservation and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each reservation belongs to one user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    /// A reservation is settled by at most one record
    #[sea_orm(has_one = "super::record::Entity")]
    Record,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Record.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
