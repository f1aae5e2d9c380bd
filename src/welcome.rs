//! The public welcome page: process-wide Markdown content, initialized on
//! first access and replaceable by an administrator. Deliberately held as
//! in-process configuration state rather than a one-row database table.

use crate::auth::require_admin;
use crate::error::ApiError;
use crate::startup::AppState;
use axum::{
    extract::{Extension, Json},
    response::{Html, IntoResponse},
};
use pulldown_cmark::{Options, Parser, html};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::types::chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_sessions::Session;
use uuid::Uuid;

const DEFAULT_CONTENT: &str = "# Bienvenue\n\nBienvenue sur le site des Bons P'tits Loups !";

#[derive(Debug, Clone, Serialize)]
pub struct WelcomePage {
    pub content: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<Uuid>,
}

impl WelcomePage {
    fn default_page() -> Self {
        WelcomePage {
            content: DEFAULT_CONTENT.to_string(),
            updated_at: Utc::now(),
            updated_by: None,
        }
    }
}

pub type WelcomeState = Arc<RwLock<Option<WelcomePage>>>;

pub fn new_state() -> WelcomeState {
    Arc::new(RwLock::new(None))
}

/// The current page, seeding the default content on first access.
pub async fn current(state: &WelcomeState) -> WelcomePage {
    {
        let guard = state.read().await;
        if let Some(page) = guard.as_ref() {
            return page.clone();
        }
    }
    let mut guard = state.write().await;
    guard.get_or_insert_with(WelcomePage::default_page).clone()
}

pub fn render_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::empty());
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

pub async fn welcome_page(Extension(app_state): Extension<AppState>) -> Html<String> {
    let page = current(&app_state.welcome).await;
    Html(render_html(&page.content))
}

#[derive(Debug, Deserialize)]
pub struct UpdateWelcomeRequest {
    pub content: String,
}

pub async fn update_welcome(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Json(payload): Json<UpdateWelcomeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let admin_id = require_admin(&session).await?;

    let page = WelcomePage {
        content: payload.content,
        updated_at: Utc::now(),
        updated_by: Some(admin_id),
    };
    *app_state.welcome.write().await = Some(page.clone());

    info!("welcome page updated by {admin_id}");

    Ok(Json(json!({
        "message": "La page d'accueil a été mise à jour avec succès !",
        "page": page,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_access_seeds_default_content() {
        let state = new_state();
        let page = current(&state).await;
        assert!(page.content.starts_with("# Bienvenue"));
        assert!(page.updated_by.is_none());

        // A second read sees the same initialized state.
        let again = current(&state).await;
        assert_eq!(again.content, page.content);
    }

    #[test]
    fn markdown_renders_to_html() {
        let html = render_html(DEFAULT_CONTENT);
        assert!(html.contains("<h1>Bienvenue</h1>"));
        assert!(html.contains("Bons P'tits Loups"));
    }
}
