use crate::db::connection::DbPool;
use crate::db::models::Child;
use sqlx::postgres::PgRow;
use sqlx::{Error, Row};
use uuid::Uuid;

fn map_child(row: &PgRow) -> Result<Child, Error> {
    Ok(Child {
        id: row.try_get("id")?,
        parent_id: row.try_get("parent_id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        birth_date: row.try_get("birth_date")?,
    })
}

pub async fn create_child(
    pool: &DbPool,
    child_id: Uuid,
    parent_id: Uuid,
    first_name: &str,
    last_name: &str,
    birth_date: chrono::NaiveDate,
) -> Result<(), Error> {
    sqlx::query(
        "INSERT INTO children (id, parent_id, first_name, last_name, birth_date) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(child_id)
    .bind(parent_id)
    .bind(first_name)
    .bind(last_name)
    .bind(birth_date)
    .execute(pool)
    .await?;

    Ok(())
}

/// Children of one parent, in (last name, first name) order.
pub async fn children_of(pool: &DbPool, parent_id: Uuid) -> Result<Vec<Child>, Error> {
    let rows = sqlx::query(
        "SELECT id, parent_id, first_name, last_name, birth_date \
         FROM children WHERE parent_id = $1 ORDER BY last_name, first_name",
    )
    .bind(parent_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_child).collect()
}

/// Fetch one child, scoped to its parent so one account can never touch
/// another account's children.
pub async fn get_child(
    pool: &DbPool,
    child_id: Uuid,
    parent_id: Uuid,
) -> Result<Option<Child>, Error> {
    let row = sqlx::query(
        "SELECT id, parent_id, first_name, last_name, birth_date \
         FROM children WHERE id = $1 AND parent_id = $2",
    )
    .bind(child_id)
    .bind(parent_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(map_child).transpose()
}

pub async fn update_child(
    pool: &DbPool,
    child_id: Uuid,
    parent_id: Uuid,
    first_name: &str,
    last_name: &str,
    birth_date: chrono::NaiveDate,
) -> Result<bool, Error> {
    let result = sqlx::query(
        "UPDATE children SET first_name = $1, last_name = $2, birth_date = $3 \
         WHERE id = $4 AND parent_id = $5",
    )
    .bind(first_name)
    .bind(last_name)
    .bind(birth_date)
    .bind(child_id)
    .bind(parent_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete_child(pool: &DbPool, child_id: Uuid, parent_id: Uuid) -> Result<bool, Error> {
    let result = sqlx::query("DELETE FROM children WHERE id = $1 AND parent_id = $2")
        .bind(child_id)
        .bind(parent_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
