//! Record entity - A usage record (kWh charged) and its computed cost.
//!
//! Amounts are stored in integer minor-currency units. `unit_price` is the
//! price snapshot taken when the record was created. A record whose
//! `reservation_id` is `NULL` is an unsubmitted (legacy) record.
use super::reservation::Timeslot;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Record database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "records")]
pub struct Model {
    /// Unique identifier for the record
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User who charged
    pub user_id: i64,
    /// Day the charge is booked on
    pub date: Date,
    /// Energy charged in kWh
    pub kwh: f64,
    /// Price per kWh at creation time
    pub unit_price: f64,
    /// Cost in minor currency units (`round(kwh * unit_price * 100)`)
    pub amount: i64,
    /// Reference to the meter screenshot in the object store
    pub image_ref: Option<String>,
    /// Free-text note
    pub remark: String,
    /// Reservation settled by this record; unique when present
    #[sea_orm(unique)]
    pub reservation_id: Option<i64>,
    /// Shift copied from the owning reservation
    pub timeslot: Option<Timeslot>,
    /// Plate that was charged, if recorded
    pub license_plate_id: Option<i64>,
    /// When the record was created
    pub created_at: DateTimeUtc,
    /// When the record was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Record and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each record belongs to one user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    /// Each submitted record settles one reservation
    #[sea_orm(
        belongs_to = "super::reservation::Entity",
        from = "Column::ReservationId",
        to = "super::reservation::Column::Id"
    )]
    Reservation,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::reservation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reservation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
