use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// A single field-level validation message, reported back to the submitter
/// without mutating any state.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("User already exists")]
    UserAlreadyExists,
    #[error("Validation failed")]
    Validation(Vec<FieldError>),
    #[error("Password hashing failed")]
    Hashing,
    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Administrator access required")]
    Forbidden,
    #[error("Not found")]
    NotFound,
    #[error("Invalid request")]
    InvalidRequest,
    #[error("Validation failed")]
    Validation(Vec<FieldError>),
    #[error("You cannot change your own account")]
    OwnAccount,
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Validation(fields) = &self {
            let body = Json(json!({
                "error": "Validation failed",
                "fields": fields,
            }));
            return (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
        }

        let (status, error_message) = match &self {
            AuthError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "Nom d'utilisateur ou mot de passe invalide.",
            ),
            AuthError::UserAlreadyExists => (StatusCode::CONFLICT, "User already exists"),
            AuthError::Validation(_) => unreachable!(),
            AuthError::Hashing => (StatusCode::INTERNAL_SERVER_ERROR, "Password hashing failed"),
            AuthError::DatabaseError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.as_str()),
        };

        let body = Json(json!({
            "error": error_message,
            "details": self.to_string()
        }));

        (status, body).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Validation(fields) = &self {
            let body = Json(json!({
                "error": "Validation failed",
                "fields": fields,
            }));
            return (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
        }

        let (status, error_message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Administrator access required"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found"),
            ApiError::InvalidRequest => (StatusCode::BAD_REQUEST, "Invalid request"),
            ApiError::Validation(_) => unreachable!(),
            ApiError::OwnAccount => (
                StatusCode::BAD_REQUEST,
                "Vous ne pouvez pas modifier votre propre compte.",
            ),
            ApiError::DatabaseError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.as_str()),
        };

        let body = Json(json!({
            "error": error_message,
            "details": self.to_string()
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(error: sqlx::Error) -> Self {
        AuthError::DatabaseError(error.to_string())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> Self {
        ApiError::DatabaseError(error.to_string())
    }
}
