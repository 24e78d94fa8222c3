//! User entity - A member of the fixed group sharing the charging slots.
//!
//! Users carry an optional personal unit price; when unset the deployment
//! default applies at settlement time.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Role of a user within the group
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Regular member
    #[sea_orm(string_value = "user")]
    User,
    /// Administrator with access to group-wide reports
    #[sea_orm(string_value = "admin")]
    Admin,
}

/// User database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Unique identifier for the user
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name, unique within the group
    #[sea_orm(unique)]
    pub name: String,
    /// Role within the group
    pub role: UserRole,
    /// Personal price per kWh, `None` to use the deployment default
    pub unit_price: Option<f64>,
    /// Whether the user takes part in the monthly settlement report
    pub can_reserve: bool,
    /// When the user was created
    pub created_at: DateTimeUtc,
    /// When the user was last modified (also bumped to serialise same-user writes)
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between User and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One user has many reservations
    #[sea_orm(has_many = "super::reservation::Entity")]
    Reservations,
    /// One user has many usage records
    #[sea_orm(has_many = "super::record::Entity")]
    Records,
    /// One user has many license plates
    #[sea_orm(has_many = "super::license_plate::Entity")]
    LicensePlates,
}

impl Related<super::reservation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reservations.def()
    }
}

impl Related<super::record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Records.def()
    }
}

impl Related<super::license_plate::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LicensePlates.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
