use crate::db::connection::DbPool;
use crate::db::models::{Role, User};
use sqlx::postgres::PgRow;
use sqlx::{Error, Row};
use uuid::Uuid;

fn map_user(row: &PgRow) -> Result<User, Error> {
    let role_raw: String = row.try_get("role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| Error::Decode(format!("unknown role '{role_raw}'").into()))?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        role,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn create_user(
    pool: &DbPool,
    user_id: Uuid,
    username: &str,
    email: &str,
    first_name: &str,
    last_name: &str,
    password_hash: &str,
    role: Role,
) -> Result<(), Error> {
    sqlx::query(
        "INSERT INTO users (id, username, email, first_name, last_name, password_hash, role) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(user_id)
    .bind(username)
    .bind(email)
    .bind(first_name)
    .bind(last_name)
    .bind(password_hash)
    .bind(role.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

/// Look up a user by username together with the stored password hash,
/// for login verification.
pub async fn find_credentials(
    pool: &DbPool,
    username: &str,
) -> Result<Option<(User, String)>, Error> {
    let row = sqlx::query(
        "SELECT id, username, email, first_name, last_name, password_hash, role, created_at \
         FROM users WHERE username = $1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let hash: String = row.try_get("password_hash")?;
            Ok(Some((map_user(&row)?, hash)))
        }
        None => Ok(None),
    }
}

pub async fn get_user(pool: &DbPool, user_id: Uuid) -> Result<Option<User>, Error> {
    let row = sqlx::query(
        "SELECT id, username, email, first_name, last_name, role, created_at \
         FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(map_user).transpose()
}

pub async fn list_parents(pool: &DbPool) -> Result<Vec<User>, Error> {
    let rows = sqlx::query(
        "SELECT id, username, email, first_name, last_name, role, created_at \
         FROM users WHERE role = 'parent' ORDER BY last_name, first_name",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_user).collect()
}

pub async fn set_role(pool: &DbPool, user_id: Uuid, role: Role) -> Result<(), Error> {
    sqlx::query("UPDATE users SET role = $1 WHERE id = $2")
        .bind(role.as_str())
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn set_password_hash(
    pool: &DbPool,
    user_id: Uuid,
    password_hash: &str,
) -> Result<(), Error> {
    sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(password_hash)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Cascades to the user's children and their votes.
pub async fn delete_user(pool: &DbPool, user_id: Uuid) -> Result<(), Error> {
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}
