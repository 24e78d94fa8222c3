//! User business logic - The fixed group of people sharing the charging slots.
//!
//! Provides user creation, roster seeding from config.toml, unit price lookup and
//! the per-user row lock every guarded write takes before checking its invariants.

use crate::{
    config::settings::Config,
    entities::{User, UserRole, user},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};
use tracing::{debug, info};

fn validate_unit_price(price: f64) -> Result<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(Error::invalid(format!(
            "unit price must be a positive number, got {price}"
        )));
    }
    Ok(())
}

/// Creates a new user, validating the name and the optional personal price.
pub async fn create_user(
    db: &DatabaseConnection,
    name: String,
    role: UserRole,
    unit_price: Option<f64>,
    can_reserve: bool,
) -> Result<user::Model> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(Error::invalid("user name cannot be empty"));
    }
    if let Some(price) = unit_price {
        validate_unit_price(price)?;
    }

    let now = chrono::Utc::now();
    let user = user::ActiveModel {
        name: Set(name),
        role: Set(role),
        unit_price: Set(unit_price),
        can_reserve: Set(can_reserve),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    user.insert(db).await.map_err(Into::into)
}

/// Finds a user by ID, returning None if absent.
pub async fn get_user_by_id<C>(db: &C, user_id: i64) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    User::find_by_id(user_id).one(db).await.map_err(Into::into)
}

/// Finds a user by ID, failing with `NotFound` if absent.
pub async fn require_user<C>(db: &C, user_id: i64) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    get_user_by_id(db, user_id)
        .await?
        .ok_or_else(|| Error::not_found("user", user_id))
}

/// Lists every user in creation order.
pub async fn list_users(db: &DatabaseConnection) -> Result<Vec<user::Model>> {
    User::find()
        .order_by_asc(user::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Inserts every roster entry from the configuration whose name is not yet present.
///
/// Returns the number of users created. Existing users are left untouched so that
/// prices changed at runtime survive restarts.
pub async fn seed_users(db: &DatabaseConnection, config: &Config) -> Result<usize> {
    let mut created = 0;
    for entry in &config.users {
        let existing = User::find()
            .filter(user::Column::Name.eq(entry.name.trim()))
            .one(db)
            .await?;
        if existing.is_some() {
            debug!("User {} already present, skipping seed", entry.name);
            continue;
        }
        create_user(
            db,
            entry.name.clone(),
            entry.role,
            entry.unit_price,
            entry.can_reserve,
        )
        .await?;
        created += 1;
    }
    info!("Seeded {} users from configuration", created);
    Ok(created)
}

/// Price per kWh that applies to this user.
///
/// The personal price wins when it is positive, otherwise the deployment default.
#[must_use]
pub fn effective_unit_price(user: &user::Model, default_price: f64) -> f64 {
    user.unit_price
        .filter(|price| *price > 0.0)
        .unwrap_or(default_price)
}

/// Looks up the price per kWh for a user.
pub async fn get_unit_price(
    db: &DatabaseConnection,
    user_id: i64,
    default_price: f64,
) -> Result<f64> {
    let user = require_user(db, user_id).await?;
    Ok(effective_unit_price(&user, default_price))
}

/// Sets a user's personal price per kWh.
pub async fn update_unit_price(
    db: &DatabaseConnection,
    user_id: i64,
    unit_price: f64,
) -> Result<user::Model> {
    validate_unit_price(unit_price)?;
    let mut user: user::ActiveModel = require_user(db, user_id).await?.into();
    user.unit_price = Set(Some(unit_price));
    user.updated_at = Set(chrono::Utc::now());
    let updated = user.update(db).await?;
    info!(user_id, unit_price, "Updated user unit price");
    Ok(updated)
}

/// Includes or excludes a user from the monthly settlement report.
pub async fn update_can_reserve(
    db: &DatabaseConnection,
    user_id: i64,
    can_reserve: bool,
) -> Result<user::Model> {
    let mut user: user::ActiveModel = require_user(db, user_id).await?.into();
    user.can_reserve = Set(can_reserve);
    user.updated_at = Set(chrono::Utc::now());
    let updated = user.update(db).await?;
    info!(user_id, can_reserve, "Updated user reservation permission");
    Ok(updated)
}

/// Takes the write lock on a user's row for the rest of the enclosing transaction.
///
/// Bumping `updated_at` makes concurrent guarded writes by the same user queue
/// behind each other (row lock on Postgres, database write lock on `SQLite`),
/// so check-then-insert sequences cannot interleave. Fails with `NotFound`
/// if the user does not exist.
pub async fn lock_user_row<C>(txn: &C, user_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = User::update_many()
        .col_expr(user::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
        .filter(user::Column::Id.eq(user_id))
        .exec(txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(Error::not_found("user", user_id));
    }
    Ok(())
}
