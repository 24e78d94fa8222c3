//! License plate entity - Vehicles a user charges.
//!
//! At most one plate per user is the default; the core layer keeps that
//! invariant with explicit transactional updates.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// License plate database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "license_plates")]
pub struct Model {
    /// Unique identifier for the plate
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owner of the plate
    pub user_id: i64,
    /// Plate number as registered
    pub plate_number: String,
    /// Whether this is the owner's default plate
    pub is_default: bool,
    /// When the plate was created
    pub created_at: DateTimeUtc,
    /// When the plate was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between `LicensePlate` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each plate belongs to one user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
