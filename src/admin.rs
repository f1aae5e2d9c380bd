use crate::auth::require_admin;
use crate::db;
use crate::db::models::{GroupStatus, Role};
use crate::error::{ApiError, FieldError};
use crate::reports::{
    ReportError, SignInPolicy, results_csv, results_workbook, sign_in_sheet, sign_in_workbook,
};
use crate::startup::AppState;
use crate::stats::{group_statistics, load_group_ballots};
use axum::{
    extract::{Extension, Json, Path, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct DateGroupPayload {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub vote_closing_date: Option<NaiveDate>,
    /// Candidate dates; creation requires at least one.
    #[serde(default)]
    pub dates: Vec<NaiveDate>,
    /// Date options to drop on edit.
    #[serde(default)]
    pub remove_option_ids: Vec<Uuid>,
}

fn parse_group_fields(
    payload: &DateGroupPayload,
    require_dates: bool,
) -> Result<GroupStatus, ApiError> {
    let mut errors = Vec::new();
    if payload.title.trim().is_empty() {
        errors.push(FieldError {
            field: "title",
            message: "Ce champ est obligatoire.".to_string(),
        });
    }
    if require_dates && payload.dates.is_empty() {
        errors.push(FieldError {
            field: "dates",
            message: "Au moins une date est requise.".to_string(),
        });
    }
    let status = match payload.status.as_deref() {
        None => Some(GroupStatus::Active),
        Some(raw) => {
            let parsed = GroupStatus::parse(raw);
            if parsed.is_none() {
                errors.push(FieldError {
                    field: "status",
                    message: "Statut invalide.".to_string(),
                });
            }
            parsed
        }
    };
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    Ok(status.unwrap_or(GroupStatus::Active))
}

/// A payload can repeat a date; the duplicates would become duplicate
/// option rows and, later, sign-in worksheets with clashing names.
fn unique_dates(dates: &[NaiveDate]) -> Vec<NaiveDate> {
    let mut seen = Vec::new();
    for date in dates {
        if !seen.contains(date) {
            seen.push(*date);
        }
    }
    seen
}

/// Admin dashboard: every group with its total vote count, newest first.
pub async fn dashboard(
    Extension(app_state): Extension<AppState>,
    session: Session,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&session).await?;

    let groups = db::list_groups_with_totals(&app_state.db).await?;
    let rows: Vec<_> = groups
        .into_iter()
        .map(|(group, total_votes)| json!({ "date_group": group, "total_votes": total_votes }))
        .collect();

    Ok(Json(json!({ "date_groups": rows })))
}

pub async fn create_group(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Json(payload): Json<DateGroupPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let admin_id = require_admin(&session).await?;
    let status = parse_group_fields(&payload, true)?;

    let group_id = db::create_date_group(
        &app_state.db,
        admin_id,
        payload.title.trim(),
        payload.description.as_deref(),
        status,
        payload.vote_closing_date,
    )
    .await?;

    // Explicit two-step creation: the option row, then its default slots.
    for date in unique_dates(&payload.dates) {
        let option_id = db::create_date_option(&app_state.db, group_id, date).await?;
        db::ensure_default_time_slots(&app_state.db, option_id).await?;
    }

    info!("created date group {group_id} ({})", payload.title.trim());

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": group_id,
            "message": format!(
                "Le groupe de dates \"{}\" a été créé avec succès !",
                payload.title.trim()
            ),
        })),
    ))
}

pub async fn update_group(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<DateGroupPayload>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&session).await?;
    let status = parse_group_fields(&payload, false)?;

    let updated = db::update_date_group(
        &app_state.db,
        group_id,
        payload.title.trim(),
        payload.description.as_deref(),
        status,
        payload.vote_closing_date,
    )
    .await?;
    if !updated {
        return Err(ApiError::NotFound);
    }

    for option_id in &payload.remove_option_ids {
        db::delete_date_option(&app_state.db, *option_id).await?;
    }
    let existing: Vec<NaiveDate> = db::date_options_of(&app_state.db, group_id)
        .await?
        .into_iter()
        .map(|o| o.date)
        .collect();
    for date in unique_dates(&payload.dates) {
        if existing.contains(&date) {
            continue;
        }
        let option_id = db::create_date_option(&app_state.db, group_id, date).await?;
        db::ensure_default_time_slots(&app_state.db, option_id).await?;
    }

    Ok(Json(json!({
        "message": format!(
            "Le groupe de dates \"{}\" a été mis à jour avec succès !",
            payload.title.trim()
        ),
    })))
}

pub async fn delete_group(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&session).await?;

    let group = db::get_date_group(&app_state.db, group_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    db::delete_date_group(&app_state.db, group_id).await?;

    Ok(Json(json!({
        "message": format!(
            "Le groupe de dates \"{}\" a été supprimé avec succès !",
            group.title
        ),
    })))
}

pub async fn results(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&session).await?;

    let group = db::get_date_group(&app_state.db, group_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let ballots = load_group_ballots(&app_state.db, group_id).await?;
    let statistics = group_statistics(&ballots);

    Ok(Json(json!({
        "date_group": group,
        "statistics": statistics,
    })))
}

/// A failed export is reported back to the user with a pointer at the
/// results page instead of surfacing as an unhandled fault.
fn export_failure(group_id: Uuid, error: ReportError) -> Response {
    error!("export failed for group {group_id}: {error}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "L'export a échoué. Veuillez réessayer depuis la page des résultats.",
            "details": error.to_string(),
            "redirect": format!("/admin/groups/{group_id}/results"),
        })),
    )
        .into_response()
}

fn attachment(bytes: Vec<u8>, content_type: &'static str, filename: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub async fn export_csv(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Path(group_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    require_admin(&session).await?;

    let group = db::get_date_group(&app_state.db, group_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let ballots = load_group_ballots(&app_state.db, group_id).await?;
    let statistics = group_statistics(&ballots);

    match results_csv(&statistics) {
        Ok(bytes) => Ok(attachment(
            bytes,
            "text/csv; charset=utf-8",
            format!("{}_results.csv", group.title),
        )),
        Err(e) => Ok(export_failure(group_id, e)),
    }
}

pub async fn export_xlsx(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Path(group_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    require_admin(&session).await?;

    let group = db::get_date_group(&app_state.db, group_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let ballots = load_group_ballots(&app_state.db, group_id).await?;
    let statistics = group_statistics(&ballots);

    match results_workbook(&statistics) {
        Ok(bytes) => Ok(attachment(
            bytes,
            XLSX_CONTENT_TYPE,
            format!("{}_results.xlsx", group.title),
        )),
        Err(e) => Ok(export_failure(group_id, e)),
    }
}

#[derive(Debug, Deserialize)]
pub struct SignInExportParams {
    pub policy: Option<String>,
    #[serde(default)]
    pub summary: bool,
}

/// One sign-in sheet per date, youngest children first, optionally preceded
/// by a Résumé sheet of per-period yes/no counts.
pub async fn export_sign_in(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Path(group_id): Path<Uuid>,
    Query(params): Query<SignInExportParams>,
) -> Result<Response, ApiError> {
    require_admin(&session).await?;

    let policy = match params.policy.as_deref() {
        None => SignInPolicy::default(),
        Some(raw) => SignInPolicy::parse(raw).ok_or(ApiError::InvalidRequest)?,
    };

    let group = db::get_date_group(&app_state.db, group_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let ballots = load_group_ballots(&app_state.db, group_id).await?;

    let today = Utc::now().date_naive();
    let sheets: Vec<_> = ballots
        .iter()
        .map(|(option, slots)| sign_in_sheet(option.date, slots, policy, today))
        .collect();

    match sign_in_workbook(&sheets, params.summary) {
        Ok(bytes) => Ok(attachment(
            bytes,
            XLSX_CONTENT_TYPE,
            format!("{}_results.xlsx", group.title),
        )),
        Err(e) => Ok(export_failure(group_id, e)),
    }
}

/// All parent accounts with their children, for the parents list page.
pub async fn parents_list(
    Extension(app_state): Extension<AppState>,
    session: Session,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&session).await?;

    let mut rows = Vec::new();
    for parent in db::list_parents(&app_state.db).await? {
        let children = db::children_of(&app_state.db, parent.id).await?;
        rows.push(json!({ "parent": parent, "children": children }));
    }

    Ok(Json(json!({ "parents": rows })))
}

const RESET_PIN: &str = "0000";

pub async fn reset_parent_password(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Path(parent_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&session).await?;

    let parent = db::get_user(&app_state.db, parent_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if parent.role != Role::Parent {
        return Err(ApiError::NotFound);
    }

    let hash = bcrypt::hash(RESET_PIN, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;
    db::set_password_hash(&app_state.db, parent_id, &hash).await?;

    Ok(Json(json!({
        "message": format!(
            "Le mot de passe de {} {} a été réinitialisé à 0000.",
            parent.first_name, parent.last_name
        ),
    })))
}

/// Promote a parent to administrator or demote an administrator back to
/// parent. Changing your own role is rejected.
pub async fn toggle_admin_status(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let admin_id = require_admin(&session).await?;
    if user_id == admin_id {
        return Err(ApiError::OwnAccount);
    }

    let user = db::get_user(&app_state.db, user_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let new_role = match user.role {
        Role::Parent => Role::Admin,
        Role::Admin => Role::Parent,
    };
    db::set_role(&app_state.db, user_id, new_role).await?;

    let message = match new_role {
        Role::Admin => format!(
            "{} {} a été promu administrateur.",
            user.first_name, user.last_name
        ),
        Role::Parent => format!(
            "{} {} n'est plus administrateur.",
            user.first_name, user.last_name
        ),
    };

    Ok(Json(json!({ "role": new_role, "message": message })))
}

/// Delete an account; children and votes go with it. Deleting your own
/// account is rejected.
pub async fn delete_parent_account(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let admin_id = require_admin(&session).await?;
    if user_id == admin_id {
        return Err(ApiError::OwnAccount);
    }

    let user = db::get_user(&app_state.db, user_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    db::delete_user(&app_state.db, user_id).await?;

    Ok(Json(json!({
        "message": format!(
            "Le compte de {} {} a été supprimé avec succès.",
            user.first_name, user.last_name
        ),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn repeated_dates_collapse_to_one_in_payload_order() {
        let christmas = date(2025, 12, 24);
        let new_year = date(2025, 12, 31);
        assert_eq!(
            unique_dates(&[christmas, new_year, christmas, christmas]),
            vec![christmas, new_year]
        );
        assert_eq!(unique_dates(&[]), Vec::<NaiveDate>::new());
    }

    #[test]
    fn group_payload_collects_field_errors() {
        let payload = DateGroupPayload {
            title: "  ".to_string(),
            description: None,
            status: Some("archived".to_string()),
            vote_closing_date: None,
            dates: vec![],
            remove_option_ids: vec![],
        };
        match parse_group_fields(&payload, true) {
            Err(ApiError::Validation(fields)) => {
                let names: Vec<&str> = fields.iter().map(|f| f.field).collect();
                assert_eq!(names, vec!["title", "dates", "status"]);
            }
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn group_payload_defaults_to_active_status() {
        let payload = DateGroupPayload {
            title: "Semaine de Noël".to_string(),
            description: None,
            status: None,
            vote_closing_date: None,
            dates: vec![date(2025, 12, 24)],
            remove_option_ids: vec![],
        };
        assert_eq!(parse_group_fields(&payload, true).unwrap(), GroupStatus::Active);
    }
}
