use crate::db::connection::DbPool;
use crate::db::models::Choice;
use chrono::NaiveDate;
use sqlx::{Error, Row};
use std::collections::HashMap;
use uuid::Uuid;

/// What a single upsert did, so a whole batch of per-slot submissions can
/// be folded into one user-facing status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Created,
    Updated,
    Deleted,
    Unchanged,
}

/// One vote row joined with the voting child, the shape the aggregation
/// engine and the sign-in sheet consume.
#[derive(Debug, Clone)]
pub struct VoterRecord {
    pub child_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub choice: Choice,
}

/// Create-or-replace the vote of `child_id` on `time_slot_id`; an absent
/// choice deletes any existing vote instead of storing a null state.
///
/// The write is a single storage-level upsert, so concurrent submissions
/// for the same pair (a double-click) degrade to last-write-wins instead
/// of tripping the uniqueness key.
pub async fn upsert_vote(
    pool: &DbPool,
    child_id: Uuid,
    time_slot_id: Uuid,
    choice: Option<Choice>,
) -> Result<VoteOutcome, Error> {
    match choice {
        Some(choice) => {
            // xmax = 0 distinguishes a fresh insert from an overwrite.
            let row = sqlx::query(
                "INSERT INTO votes (id, time_slot_id, child_id, choice) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (time_slot_id, child_id) DO UPDATE \
                 SET choice = EXCLUDED.choice, voted_at = CURRENT_TIMESTAMP \
                 RETURNING (xmax = 0) AS inserted",
            )
            .bind(Uuid::new_v4())
            .bind(time_slot_id)
            .bind(child_id)
            .bind(choice.as_str())
            .fetch_one(pool)
            .await?;
            Ok(write_outcome(row.try_get("inserted")?))
        }
        None => {
            let result = sqlx::query("DELETE FROM votes WHERE time_slot_id = $1 AND child_id = $2")
                .bind(time_slot_id)
                .bind(child_id)
                .execute(pool)
                .await?;
            Ok(delete_outcome(result.rows_affected()))
        }
    }
}

fn write_outcome(inserted: bool) -> VoteOutcome {
    if inserted {
        VoteOutcome::Created
    } else {
        VoteOutcome::Updated
    }
}

fn delete_outcome(rows_affected: u64) -> VoteOutcome {
    if rows_affected > 0 {
        VoteOutcome::Deleted
    } else {
        VoteOutcome::Unchanged
    }
}

/// A child's existing choices across one date group, keyed by time slot,
/// used to pre-populate the ballot form.
pub async fn votes_for_child_in_group(
    pool: &DbPool,
    child_id: Uuid,
    group_id: Uuid,
) -> Result<HashMap<Uuid, Choice>, Error> {
    let rows = sqlx::query(
        "SELECT v.time_slot_id, v.choice \
         FROM votes v \
         JOIN time_slots s ON s.id = v.time_slot_id \
         JOIN date_options o ON o.id = s.date_option_id \
         WHERE v.child_id = $1 AND o.date_group_id = $2",
    )
    .bind(child_id)
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    let mut choices = HashMap::new();
    for row in rows {
        let slot_id: Uuid = row.try_get("time_slot_id")?;
        let raw: String = row.try_get("choice")?;
        let choice = Choice::parse(&raw)
            .ok_or_else(|| Error::Decode(format!("unknown choice '{raw}'").into()))?;
        choices.insert(slot_id, choice);
    }
    Ok(choices)
}

/// All votes on one time slot joined with the voting children.
pub async fn votes_for_slot(pool: &DbPool, time_slot_id: Uuid) -> Result<Vec<VoterRecord>, Error> {
    let rows = sqlx::query(
        "SELECT v.choice, c.id AS child_id, c.first_name, c.last_name, c.birth_date \
         FROM votes v \
         JOIN children c ON c.id = v.child_id \
         WHERE v.time_slot_id = $1",
    )
    .bind(time_slot_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let raw: String = row.try_get("choice")?;
            let choice = Choice::parse(&raw)
                .ok_or_else(|| Error::Decode(format!("unknown choice '{raw}'").into()))?;
            Ok(VoterRecord {
                child_id: row.try_get("child_id")?,
                first_name: row.try_get("first_name")?,
                last_name: row.try_get("last_name")?,
                birth_date: row.try_get("birth_date")?,
                choice,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_insert_counts_as_created() {
        assert_eq!(write_outcome(true), VoteOutcome::Created);
    }

    #[test]
    fn overwritten_row_counts_as_updated() {
        // The conflicting write wins; the caller only sees a different tally.
        assert_eq!(write_outcome(false), VoteOutcome::Updated);
    }

    #[test]
    fn clearing_reports_deleted_only_when_a_row_existed() {
        assert_eq!(delete_outcome(1), VoteOutcome::Deleted);
        assert_eq!(delete_outcome(0), VoteOutcome::Unchanged);
    }
}
