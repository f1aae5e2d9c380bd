use crate::auth::session_identity;
use crate::db;
use crate::error::{ApiError, FieldError};
use crate::startup::AppState;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ChildPayload {
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
}

fn validate_child(payload: &ChildPayload) -> Result<(), ApiError> {
    let mut errors = Vec::new();
    if payload.first_name.trim().is_empty() {
        errors.push(FieldError {
            field: "first_name",
            message: "Ce champ est obligatoire.".to_string(),
        });
    }
    if payload.last_name.trim().is_empty() {
        errors.push(FieldError {
            field: "last_name",
            message: "Ce champ est obligatoire.".to_string(),
        });
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

/// The parent dashboard: the caller's children in (last, first) name order.
pub async fn list_children(
    Extension(app_state): Extension<AppState>,
    session: Session,
) -> Result<impl IntoResponse, ApiError> {
    let (parent_id, _) = session_identity(&session).await?;
    let children = db::children_of(&app_state.db, parent_id).await?;
    Ok(Json(json!({ "children": children })))
}

pub async fn create_child(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Json(payload): Json<ChildPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let (parent_id, _) = session_identity(&session).await?;
    validate_child(&payload)?;

    let child_id = Uuid::new_v4();
    db::create_child(
        &app_state.db,
        child_id,
        parent_id,
        payload.first_name.trim(),
        payload.last_name.trim(),
        payload.birth_date,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": child_id,
            "message": format!(
                "{} {} a été ajouté avec succès !",
                payload.first_name.trim(),
                payload.last_name.trim()
            ),
        })),
    ))
}

pub async fn update_child(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Path(child_id): Path<Uuid>,
    Json(payload): Json<ChildPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let (parent_id, _) = session_identity(&session).await?;
    validate_child(&payload)?;

    let updated = db::update_child(
        &app_state.db,
        child_id,
        parent_id,
        payload.first_name.trim(),
        payload.last_name.trim(),
        payload.birth_date,
    )
    .await?;
    if !updated {
        return Err(ApiError::NotFound);
    }

    Ok(Json(json!({
        "message": format!(
            "{} {} a été mis à jour avec succès !",
            payload.first_name.trim(),
            payload.last_name.trim()
        ),
    })))
}

pub async fn delete_child(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Path(child_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (parent_id, _) = session_identity(&session).await?;

    let child = db::get_child(&app_state.db, child_id, parent_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    db::delete_child(&app_state.db, child_id, parent_id).await?;

    Ok(Json(json!({
        "message": format!("{} a été supprimé avec succès !", child.display_name()),
    })))
}
