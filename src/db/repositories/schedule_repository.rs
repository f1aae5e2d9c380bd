use crate::db::connection::DbPool;
use crate::db::models::{DateGroup, DateOption, GroupStatus, Period, TimeSlot};
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{Error, Row};
use uuid::Uuid;

fn map_group(row: &PgRow) -> Result<DateGroup, Error> {
    let status_raw: String = row.try_get("status")?;
    let status = GroupStatus::parse(&status_raw)
        .ok_or_else(|| Error::Decode(format!("unknown group status '{status_raw}'").into()))?;
    Ok(DateGroup {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        status,
        vote_closing_date: row.try_get("vote_closing_date")?,
    })
}

fn map_slot(row: &PgRow) -> Result<TimeSlot, Error> {
    let period_raw: String = row.try_get("period")?;
    let period = Period::parse(&period_raw)
        .ok_or_else(|| Error::Decode(format!("unknown period '{period_raw}'").into()))?;
    Ok(TimeSlot {
        id: row.try_get("id")?,
        date_option_id: row.try_get("date_option_id")?,
        period,
    })
}

pub async fn create_date_group(
    pool: &DbPool,
    created_by: Uuid,
    title: &str,
    description: Option<&str>,
    status: GroupStatus,
    vote_closing_date: Option<NaiveDate>,
) -> Result<Uuid, Error> {
    let group_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO date_groups (id, title, description, created_by, status, vote_closing_date) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(group_id)
    .bind(title)
    .bind(description)
    .bind(created_by)
    .bind(status.as_str())
    .bind(vote_closing_date)
    .execute(pool)
    .await?;

    Ok(group_id)
}

pub async fn update_date_group(
    pool: &DbPool,
    group_id: Uuid,
    title: &str,
    description: Option<&str>,
    status: GroupStatus,
    vote_closing_date: Option<NaiveDate>,
) -> Result<bool, Error> {
    let result = sqlx::query(
        "UPDATE date_groups SET title = $1, description = $2, status = $3, vote_closing_date = $4 \
         WHERE id = $5",
    )
    .bind(title)
    .bind(description)
    .bind(status.as_str())
    .bind(vote_closing_date)
    .bind(group_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Cascades to the group's date options, time slots and votes.
pub async fn delete_date_group(pool: &DbPool, group_id: Uuid) -> Result<bool, Error> {
    let result = sqlx::query("DELETE FROM date_groups WHERE id = $1")
        .bind(group_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn get_date_group(pool: &DbPool, group_id: Uuid) -> Result<Option<DateGroup>, Error> {
    let row = sqlx::query(
        "SELECT id, title, description, created_by, created_at, status, vote_closing_date \
         FROM date_groups WHERE id = $1",
    )
    .bind(group_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(map_group).transpose()
}

/// Groups visible to parents: active and closed ones, newest first.
pub async fn list_votable_groups(pool: &DbPool) -> Result<Vec<DateGroup>, Error> {
    let rows = sqlx::query(
        "SELECT id, title, description, created_by, created_at, status, vote_closing_date \
         FROM date_groups WHERE status IN ('active', 'closed') ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_group).collect()
}

/// All groups with their total vote counts, for the admin dashboard.
pub async fn list_groups_with_totals(pool: &DbPool) -> Result<Vec<(DateGroup, i64)>, Error> {
    let rows = sqlx::query(
        "SELECT g.id, g.title, g.description, g.created_by, g.created_at, g.status, \
                g.vote_closing_date, COUNT(v.id) AS total_votes \
         FROM date_groups g \
         LEFT JOIN date_options o ON o.date_group_id = g.id \
         LEFT JOIN time_slots s ON s.date_option_id = o.id \
         LEFT JOIN votes v ON v.time_slot_id = s.id \
         GROUP BY g.id \
         ORDER BY g.created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let total: i64 = row.try_get("total_votes")?;
            Ok((map_group(row)?, total))
        })
        .collect()
}

pub async fn create_date_option(
    pool: &DbPool,
    group_id: Uuid,
    date: NaiveDate,
) -> Result<Uuid, Error> {
    let option_id = Uuid::new_v4();

    sqlx::query("INSERT INTO date_options (id, date_group_id, date) VALUES ($1, $2, $3)")
        .bind(option_id)
        .bind(group_id)
        .bind(date)
        .execute(pool)
        .await?;

    Ok(option_id)
}

/// Idempotently create the three default time slots for a date option.
///
/// Safe to re-run at any time; the (date_option_id, period) uniqueness key
/// turns repeated application into a no-op.
pub async fn ensure_default_time_slots(pool: &DbPool, option_id: Uuid) -> Result<(), Error> {
    for period in Period::ALL {
        sqlx::query(
            "INSERT INTO time_slots (id, date_option_id, period) VALUES ($1, $2, $3) \
             ON CONFLICT (date_option_id, period) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(option_id)
        .bind(period.as_str())
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn delete_date_option(pool: &DbPool, option_id: Uuid) -> Result<bool, Error> {
    let result = sqlx::query("DELETE FROM date_options WHERE id = $1")
        .bind(option_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn date_options_of(pool: &DbPool, group_id: Uuid) -> Result<Vec<DateOption>, Error> {
    let rows = sqlx::query(
        "SELECT id, date_group_id, date FROM date_options WHERE date_group_id = $1 ORDER BY date",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(DateOption {
                id: row.try_get("id")?,
                date_group_id: row.try_get("date_group_id")?,
                date: row.try_get("date")?,
            })
        })
        .collect()
}

/// Time slots of one date option in the fixed morning, lunch, afternoon order.
pub async fn time_slots_of(pool: &DbPool, option_id: Uuid) -> Result<Vec<TimeSlot>, Error> {
    let rows = sqlx::query(
        "SELECT id, date_option_id, period FROM time_slots WHERE date_option_id = $1",
    )
    .bind(option_id)
    .fetch_all(pool)
    .await?;

    let mut slots = rows.iter().map(map_slot).collect::<Result<Vec<_>, _>>()?;
    slots.sort_by_key(|s| s.period.sort_key());
    Ok(slots)
}

#[derive(Debug, Clone)]
pub struct ClosedGroup {
    pub id: Uuid,
    pub title: String,
    pub vote_closing_date: NaiveDate,
}

/// Transition every active group whose closing date is strictly before
/// `today` to closed, reporting which groups were affected.
///
/// Idempotent; the second run over the same data closes nothing. The
/// active->closed transition is one-way, so this is safe to run while
/// votes are being submitted.
pub async fn close_expired_groups(
    pool: &DbPool,
    today: NaiveDate,
) -> Result<Vec<ClosedGroup>, Error> {
    let rows = sqlx::query(
        "UPDATE date_groups SET status = 'closed' \
         WHERE status = 'active' AND vote_closing_date IS NOT NULL AND vote_closing_date < $1 \
         RETURNING id, title, vote_closing_date",
    )
    .bind(today)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(ClosedGroup {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                vote_closing_date: row.try_get("vote_closing_date")?,
            })
        })
        .collect()
}
