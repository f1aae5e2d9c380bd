use crate::startup::AppState;
use axum::{
    Router,
    extract::Extension,
    http::{
        StatusCode,
        header::{ACCEPT, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_sessions::{
    Expiry, MemoryStore, SessionManagerLayer,
    cookie::{SameSite, time::Duration},
};
use tracing_subscriber::EnvFilter;

#[macro_use]
extern crate tracing;

mod admin;
mod auth;
mod children;
mod db;
mod error;
mod reports;
mod startup;
mod stats;
mod voting;
mod welcome;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = db::init_db(&database_url)
        .await
        .expect("Failed to initialise database");

    let app_state = AppState::new(pool);

    let session_store = MemoryStore::default();

    let app = Router::new()
        .route("/", get(welcome::welcome_page))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/children", get(children::list_children).post(children::create_child))
        .route(
            "/children/:id",
            put(children::update_child).delete(children::delete_child),
        )
        .route("/voting/groups", get(voting::list_groups))
        .route("/voting/groups/:id", get(voting::ballot_form))
        .route("/voting/groups/:id/votes", post(voting::submit_votes))
        .route("/voting/groups/:id/results", get(voting::results))
        .route("/admin/dashboard", get(admin::dashboard))
        .route("/admin/groups", post(admin::create_group))
        .route(
            "/admin/groups/:id",
            put(admin::update_group).delete(admin::delete_group),
        )
        .route("/admin/groups/:id/results", get(admin::results))
        .route("/admin/groups/:id/export.csv", get(admin::export_csv))
        .route("/admin/groups/:id/export.xlsx", get(admin::export_xlsx))
        .route("/admin/groups/:id/signin.xlsx", get(admin::export_sign_in))
        .route("/admin/parents", get(admin::parents_list))
        .route(
            "/admin/users/:id/reset-password",
            post(admin::reset_parent_password),
        )
        .route(
            "/admin/users/:id/toggle-admin",
            post(admin::toggle_admin_status),
        )
        .route("/admin/users/:id", delete(admin::delete_parent_account))
        .route("/admin/welcome", put(welcome::update_welcome))
        .layer(Extension(app_state))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::mirror_request())
                .allow_credentials(true)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([CONTENT_TYPE, ACCEPT]),
        )
        .layer(
            SessionManagerLayer::new(session_store)
                .with_name("garderie")
                .with_same_site(SameSite::Lax)
                .with_secure(false)
                .with_expiry(Expiry::OnInactivity(Duration::minutes(30))),
        )
        .fallback(handler_404);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let addr: SocketAddr = bind_addr.parse().expect("Invalid BIND_ADDR");
    info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Unable to spawn tcp listener");

    axum::serve(listener, app).await.unwrap();
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "nothing to see here")
}
