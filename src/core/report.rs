//! Report generation business logic.
//!
//! Monthly usage figures for a single user and the admin settlement report across
//! users. Aggregation happens in Rust over the fetched rows, so the functions work
//! the same on any backend. All functions return structured data; formatting is up
//! to the caller apart from [`format_amount`].

use crate::{
    core::shift::{MonthRange, parse_month},
    entities::{
        Record, Reservation, ReservationStatus, Timeslot, User, record, reservation, user,
    },
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::{QueryOrder, prelude::*};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Totals for one user over one month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyStatistics {
    /// Month as `YYYY-MM`
    pub month: String,
    /// Energy charged
    pub total_kwh: f64,
    /// Cost in minor currency units
    pub total_amount: i64,
}

/// Energy charged on one day, split by shift.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStatistics {
    /// Calendar day
    pub date: NaiveDate,
    /// Energy charged in the day shift
    pub day_kwh: f64,
    /// Energy charged in the night shift
    pub night_kwh: f64,
    /// All energy charged that day, including records without a shift
    pub total_kwh: f64,
}

/// Energy charged over one month, split by shift.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ShiftStatistics {
    /// Energy charged in day shifts
    pub day_kwh: f64,
    /// Energy charged in night shifts
    pub night_kwh: f64,
    /// All energy charged, including records without a shift
    pub total_kwh: f64,
}

/// One row of the admin settlement report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserMonthlySummary {
    /// User the row describes
    pub user_id: i64,
    /// Display name
    pub name: String,
    /// Cost of the month's records in minor currency units
    pub total_amount: i64,
    /// Whether every live reservation of the month has a record
    pub has_uploaded: bool,
}

/// Settlement report for every user allowed to reserve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminMonthlyReport {
    /// Month as `YYYY-MM`
    pub month: String,
    /// One row per user, in user ID order
    pub users: Vec<UserMonthlySummary>,
}

async fn records_in_month(
    db: &DatabaseConnection,
    user_id: i64,
    range: MonthRange,
) -> Result<Vec<record::Model>> {
    Record::find()
        .filter(record::Column::UserId.eq(user_id))
        .filter(record::Column::Date.between(range.first, range.last))
        .all(db)
        .await
        .map_err(Into::into)
}

fn split_by_shift<'a>(records: impl IntoIterator<Item = &'a record::Model>) -> ShiftStatistics {
    records
        .into_iter()
        .fold(ShiftStatistics::default(), |mut stats, record| {
            match record.timeslot {
                Some(Timeslot::Day) => stats.day_kwh += record.kwh,
                Some(Timeslot::Night) => stats.night_kwh += record.kwh,
                None => {}
            }
            stats.total_kwh += record.kwh;
            stats
        })
}

/// Total energy and cost of a user's records dated in `month` (`YYYY-MM`).
pub async fn monthly_statistics(
    db: &DatabaseConnection,
    user_id: i64,
    month: &str,
) -> Result<MonthlyStatistics> {
    let range = parse_month(month)?;
    let records = records_in_month(db, user_id, range).await?;

    Ok(MonthlyStatistics {
        month: range.label(),
        total_kwh: records.iter().map(|r| r.kwh).sum(),
        total_amount: records.iter().map(|r| r.amount).sum(),
    })
}

/// Per-day energy of a user in `month`, newest day first. Days without records are omitted.
pub async fn daily_statistics(
    db: &DatabaseConnection,
    user_id: i64,
    month: &str,
) -> Result<Vec<DailyStatistics>> {
    let range = parse_month(month)?;
    let records = records_in_month(db, user_id, range).await?;

    let mut by_day: BTreeMap<NaiveDate, Vec<&record::Model>> = BTreeMap::new();
    for record in &records {
        by_day.entry(record.date).or_default().push(record);
    }

    Ok(by_day
        .into_iter()
        .rev()
        .map(|(date, day_records)| {
            let stats = split_by_shift(day_records);
            DailyStatistics {
                date,
                day_kwh: stats.day_kwh,
                night_kwh: stats.night_kwh,
                total_kwh: stats.total_kwh,
            }
        })
        .collect())
}

/// Energy of a user in `month` split into day and night shifts.
pub async fn monthly_shift_statistics(
    db: &DatabaseConnection,
    user_id: i64,
    month: &str,
) -> Result<ShiftStatistics> {
    let range = parse_month(month)?;
    let records = records_in_month(db, user_id, range).await?;
    Ok(split_by_shift(&records))
}

/// Builds the month's settlement report for every user who can reserve.
///
/// A user has uploaded when each non-cancelled reservation dated in the month
/// has a record.
pub async fn admin_monthly_report(
    db: &DatabaseConnection,
    month: &str,
) -> Result<AdminMonthlyReport> {
    let range = parse_month(month)?;

    let users = User::find()
        .filter(user::Column::CanReserve.eq(true))
        .order_by_asc(user::Column::Id)
        .all(db)
        .await?;

    let records = Record::find()
        .filter(record::Column::Date.between(range.first, range.last))
        .all(db)
        .await?;
    let mut amounts: HashMap<i64, i64> = HashMap::new();
    for record in &records {
        *amounts.entry(record.user_id).or_default() += record.amount;
    }

    let reservations = Reservation::find()
        .filter(reservation::Column::Date.between(range.first, range.last))
        .filter(reservation::Column::Status.ne(ReservationStatus::Cancelled))
        .all(db)
        .await?;
    let reservation_ids: Vec<i64> = reservations.iter().map(|r| r.id).collect();
    let settled: HashSet<i64> = if reservation_ids.is_empty() {
        HashSet::new()
    } else {
        Record::find()
            .filter(record::Column::ReservationId.is_in(reservation_ids))
            .all(db)
            .await?
            .into_iter()
            .filter_map(|r| r.reservation_id)
            .collect()
    };
    let mut unsettled_users: HashSet<i64> = HashSet::new();
    for reservation in &reservations {
        if !settled.contains(&reservation.id) {
            unsettled_users.insert(reservation.user_id);
        }
    }

    let users = users
        .into_iter()
        .map(|user| UserMonthlySummary {
            user_id: user.id,
            total_amount: amounts.get(&user.id).copied().unwrap_or(0),
            has_uploaded: !unsettled_users.contains(&user.id),
            name: user.name,
        })
        .collect();

    Ok(AdminMonthlyReport {
        month: range.label(),
        users,
    })
}

/// Formats minor currency units for display, e.g. `1234` as `"¥12.34"`.
#[must_use]
pub fn format_amount(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{sign}¥{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::record::{NewRecord, create_record, insert_unsubmitted_record};
    use crate::core::reservation::cancel_reservation;
    use crate::core::user::update_can_reserve;
    use crate::errors::Error;
    use crate::test_utils::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(1234), "¥12.34");
        assert_eq!(format_amount(5), "¥0.05");
        assert_eq!(format_amount(0), "¥0.00");
        assert_eq!(format_amount(-250), "-¥2.50");
    }

    #[tokio::test]
    async fn test_monthly_and_shift_statistics() -> Result<()> {
        let (db, user) = setup_with_user().await?;
        let day = create_test_reservation(&db, user.id, date(2025, 7, 3), Timeslot::Day).await?;
        let night =
            create_test_reservation(&db, user.id, date(2025, 7, 3), Timeslot::Night).await?;
        let later = create_test_reservation(&db, user.id, date(2025, 7, 9), Timeslot::Night).await?;
        create_record(&db, NewRecord::new(user.id, "2025-07-03", 10.5, day.id, 0.7)).await?;
        create_record(&db, NewRecord::new(user.id, "2025-07-03", 4.5, night.id, 0.7)).await?;
        create_record(&db, NewRecord::new(user.id, "2025-07-09", 20.0, later.id, 0.7)).await?;
        insert_unsubmitted_record(&db, user.id, "2025-07-20", 5.0, 1.0, "").await?;
        insert_unsubmitted_record(&db, user.id, "2025-08-01", 99.0, 1.0, "").await?;

        let monthly = monthly_statistics(&db, user.id, "2025-07").await?;
        assert_eq!(monthly.month, "2025-07");
        assert_eq!(monthly.total_kwh, 40.0);
        assert_eq!(monthly.total_amount, 735 + 315 + 1400 + 500);

        let shifts = monthly_shift_statistics(&db, user.id, "2025-07").await?;
        assert_eq!(shifts.day_kwh, 10.5);
        assert_eq!(shifts.night_kwh, 24.5);
        assert_eq!(shifts.total_kwh, 40.0);

        let daily = daily_statistics(&db, user.id, "2025-07").await?;
        let dates: Vec<NaiveDate> = daily.iter().map(|d| d.date).collect();
        assert_eq!(dates, vec![date(2025, 7, 20), date(2025, 7, 9), date(2025, 7, 3)]);
        assert_eq!(daily[2].day_kwh, 10.5);
        assert_eq!(daily[2].night_kwh, 4.5);
        assert_eq!(daily[2].total_kwh, 15.0);
        assert_eq!(daily[0].total_kwh, 5.0);
        assert_eq!(daily[0].day_kwh, 0.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_empty_month_statistics() -> Result<()> {
        let (db, user) = setup_with_user().await?;

        let monthly = monthly_statistics(&db, user.id, "2025-02").await?;
        assert_eq!(monthly.total_amount, 0);
        assert!(daily_statistics(&db, user.id, "2025-02").await?.is_empty());

        let result = monthly_statistics(&db, user.id, "2025-2").await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_monthly_report() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = create_test_user(&db, "alice").await?;
        let bob = create_test_user(&db, "bob").await?;
        let carol = create_test_user(&db, "carol").await?;
        update_can_reserve(&db, carol.id, false).await?;

        let settled =
            create_test_reservation(&db, alice.id, date(2025, 7, 2), Timeslot::Day).await?;
        create_record(&db, NewRecord::new(alice.id, "2025-07-02", 10.0, settled.id, 0.7)).await?;
        let dropped =
            create_test_reservation(&db, alice.id, date(2025, 7, 5), Timeslot::Day).await?;
        cancel_reservation(&db, dropped.id, alice.id).await?;

        create_test_reservation(&db, bob.id, date(2025, 7, 8), Timeslot::Night).await?;

        let report = admin_monthly_report(&db, "2025-07").await?;
        assert_eq!(report.month, "2025-07");
        assert_eq!(report.users.len(), 2);

        assert_eq!(report.users[0].user_id, alice.id);
        assert_eq!(report.users[0].name, "alice");
        assert_eq!(report.users[0].total_amount, 700);
        assert!(report.users[0].has_uploaded);

        assert_eq!(report.users[1].user_id, bob.id);
        assert_eq!(report.users[1].total_amount, 0);
        assert!(!report.users[1].has_uploaded);

        Ok(())
    }
}
