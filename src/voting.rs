use crate::auth::session_identity;
use crate::db;
use crate::db::models::{Child, Choice, DateGroup};
use crate::error::ApiError;
use crate::startup::AppState;
use crate::stats::{group_statistics, load_group_ballots};
use axum::{
    extract::{Extension, Form, Json, Path},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use tower_sessions::Session;
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct SlotView {
    id: Uuid,
    period: &'static str,
    label: &'static str,
}

#[derive(Debug, Serialize)]
struct OptionView {
    id: Uuid,
    date: chrono::NaiveDate,
    time_slots: Vec<SlotView>,
}

#[derive(Debug, Serialize)]
struct GroupView {
    #[serde(flatten)]
    group: DateGroup,
    can_vote: bool,
    date_options: Vec<OptionView>,
}

async fn group_view(app_state: &AppState, group: DateGroup) -> Result<GroupView, ApiError> {
    let today = Utc::now().date_naive();
    let mut options = Vec::new();
    for option in db::date_options_of(&app_state.db, group.id).await? {
        let slots = db::time_slots_of(&app_state.db, option.id).await?;
        options.push(OptionView {
            id: option.id,
            date: option.date,
            time_slots: slots
                .into_iter()
                .map(|s| SlotView {
                    id: s.id,
                    period: s.period.as_str(),
                    label: s.period.label_fr(),
                })
                .collect(),
        });
    }
    Ok(GroupView {
        can_vote: group.can_vote(today),
        group,
        date_options: options,
    })
}

async fn existing_votes(
    app_state: &AppState,
    children: &[Child],
    group_id: Uuid,
) -> Result<HashMap<Uuid, HashMap<Uuid, Choice>>, ApiError> {
    let mut votes = HashMap::new();
    for child in children {
        let choices = db::votes_for_child_in_group(&app_state.db, child.id, group_id).await?;
        votes.insert(child.id, choices);
    }
    Ok(votes)
}

/// Active and closed groups with the caller's children and their prior
/// choices, for the voting overview page.
pub async fn list_groups(
    Extension(app_state): Extension<AppState>,
    session: Session,
) -> Result<impl IntoResponse, ApiError> {
    let (parent_id, _) = session_identity(&session).await?;

    let children = db::children_of(&app_state.db, parent_id).await?;
    let mut groups = Vec::new();
    let mut votes = HashMap::new();
    for group in db::list_votable_groups(&app_state.db).await? {
        let group_id = group.id;
        groups.push(group_view(&app_state, group).await?);
        votes.insert(group_id, existing_votes(&app_state, &children, group_id).await?);
    }

    Ok(Json(json!({
        "date_groups": groups,
        "children": children,
        "votes": votes,
    })))
}

/// The ballot form for one group: structure plus prior choices per child.
pub async fn ballot_form(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (parent_id, _) = session_identity(&session).await?;

    let group = db::get_date_group(&app_state.db, group_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let children = db::children_of(&app_state.db, parent_id).await?;
    let votes = existing_votes(&app_state, &children, group_id).await?;

    Ok(Json(json!({
        "date_group": group_view(&app_state, group).await?,
        "children": children,
        "existing_votes": votes,
    })))
}

fn outcome_message(created: usize, updated: usize, deleted: usize) -> &'static str {
    if created > 0 || updated > 0 {
        "Vos votes ont été enregistrés avec succès !"
    } else if deleted > 0 {
        "Vos votes ont été effacés avec succès !"
    } else {
        "Aucune modification n'a été apportée."
    }
}

/// Batched ballot submission: one form carrying a
/// `choice_<child_id>_<time_slot_id>` field per (child, slot) pair, values
/// in {yes, no, maybe, ""}. A missing field counts as empty, and empty
/// clears any prior vote.
pub async fn submit_votes(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Path(group_id): Path<Uuid>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let (parent_id, _) = session_identity(&session).await?;

    let group = db::get_date_group(&app_state.db, group_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let today = Utc::now().date_naive();
    if !group.can_vote(today) {
        // Not an error: the caller is pointed at the read-only results.
        return Ok(Json(json!({
            "status": "closed",
            "message": "Ce groupe de dates est fermé. Vous ne pouvez plus voter, \
                        mais vous pouvez consulter les résultats.",
            "results": format!("/voting/groups/{group_id}/results"),
        })));
    }

    let children = db::children_of(&app_state.db, parent_id).await?;
    if children.is_empty() {
        return Ok(Json(json!({
            "status": "no-children",
            "message": "Vous devez enregistrer au moins un enfant avant de voter.",
            "redirect": "/children",
        })));
    }

    let mut schedule = Vec::new();
    for option in db::date_options_of(&app_state.db, group_id).await? {
        let slots = db::time_slots_of(&app_state.db, option.id).await?;
        schedule.push(slots);
    }

    let mut created = 0;
    let mut updated = 0;
    let mut deleted = 0;

    for child in &children {
        for slots in &schedule {
            for slot in slots {
                let key = format!("choice_{}_{}", child.id, slot.id);
                let raw = form.get(&key).map(String::as_str).unwrap_or("");
                let choice = Choice::parse(raw);
                if choice.is_none() && !raw.is_empty() {
                    // Unknown values are ignored rather than rejected.
                    continue;
                }
                match db::upsert_vote(&app_state.db, child.id, slot.id, choice).await? {
                    db::VoteOutcome::Created => created += 1,
                    db::VoteOutcome::Updated => updated += 1,
                    db::VoteOutcome::Deleted => deleted += 1,
                    db::VoteOutcome::Unchanged => {}
                }
            }
        }
    }

    info!(
        "ballot for group {group_id}: {created} created, {updated} updated, {deleted} deleted"
    );

    Ok(Json(json!({
        "status": "ok",
        "created": created,
        "updated": updated,
        "deleted": deleted,
        "message": outcome_message(created, updated, deleted),
    })))
}

/// Read-only aggregated results for one group.
pub async fn results(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    session_identity(&session).await?;

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_message_wins_over_cleared() {
        assert_eq!(
            outcome_message(1, 0, 2),
            "Vos votes ont été enregistrés avec succès !"
        );
        assert_eq!(
            outcome_message(0, 3, 0),
            "Vos votes ont été enregistrés avec succès !"
        );
    }

    #[test]
    fn cleared_message_when_only_deletions() {
        assert_eq!(
            outcome_message(0, 0, 1),
            "Vos votes ont été effacés avec succès !"
        );
    }

    #[test]
    fn no_change_message_for_empty_batch() {
        assert_eq!(
            outcome_message(0, 0, 0),
            "Aucune modification n'a été apportée."
        );
    }
}
