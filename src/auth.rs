use crate::db;
use crate::db::models::Role;
use crate::error::{ApiError, AuthError, FieldError};
use crate::startup::AppState;
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use uuid::Uuid;

const SESSION_USER_KEY: &str = "user_id";
const SESSION_ROLE_KEY: &str = "role";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub pin: String,
    pub pin_confirm: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub pin: String,
}

/// Passwords are 4-8 digit PIN codes. Returns the user-facing message for
/// the first failed rule.
pub fn validate_pin(pin: &str) -> Option<&'static str> {
    if !pin.chars().all(|c| c.is_ascii_digit()) || pin.is_empty() {
        return Some("Le mot de passe doit contenir uniquement des chiffres.");
    }
    if pin.len() < 4 {
        return Some("Le mot de passe doit contenir au moins 4 chiffres.");
    }
    if pin.len() > 8 {
        return Some("Le mot de passe doit contenir au maximum 8 chiffres.");
    }
    None
}

fn validate_registration(payload: &RegisterRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let required = [
        ("username", &payload.username),
        ("email", &payload.email),
        ("first_name", &payload.first_name),
        ("last_name", &payload.last_name),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            errors.push(FieldError {
                field,
                message: "Ce champ est obligatoire.".to_string(),
            });
        }
    }
    if !payload.email.trim().is_empty() && !payload.email.contains('@') {
        errors.push(FieldError {
            field: "email",
            message: "Adresse e-mail invalide.".to_string(),
        });
    }
    if let Some(message) = validate_pin(&payload.pin) {
        errors.push(FieldError {
            field: "pin",
            message: message.to_string(),
        });
    }
    if payload.pin != payload.pin_confirm {
        errors.push(FieldError {
            field: "pin_confirm",
            message: "Les deux mots de passe ne correspondent pas.".to_string(),
        });
    }
    if Role::parse(&payload.role).is_none() {
        errors.push(FieldError {
            field: "role",
            message: "Rôle invalide.".to_string(),
        });
    }
    errors
}

pub async fn register(
    Extension(app_state): Extension<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let errors = validate_registration(&payload);
    if !errors.is_empty() {
        return Err(AuthError::Validation(errors));
    }
    let role = Role::parse(&payload.role).ok_or(AuthError::InvalidCredentials)?;

    let password_hash =
        bcrypt::hash(&payload.pin, bcrypt::DEFAULT_COST).map_err(|_| AuthError::Hashing)?;

    let user_id = Uuid::new_v4();
    db::create_user(
        &app_state.db,
        user_id,
        payload.username.trim(),
        payload.email.trim(),
        payload.first_name.trim(),
        payload.last_name.trim(),
        &password_hash,
        role,
    )
    .await
    .map_err(|e| {
        if e.as_database_error()
            .map(|db_err| db_err.is_unique_violation())
            .unwrap_or(false)
        {
            AuthError::UserAlreadyExists
        } else {
            AuthError::DatabaseError(e.to_string())
        }
    })?;

    info!("registered account {}", payload.username);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": format!(
                "Compte créé pour {} ! Veuillez vous connecter.",
                payload.username.trim()
            ),
        })),
    ))
}

pub async fn login(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let (user, password_hash) = db::find_credentials(&app_state.db, payload.username.trim())
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    let verified = bcrypt::verify(&payload.pin, &password_hash).unwrap_or(false);
    if !verified {
        return Err(AuthError::InvalidCredentials);
    }

    // The role is resolved once here and carried by the session; handlers
    // never re-derive it.
    session
        .insert(SESSION_USER_KEY, user.id)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
    session
        .insert(SESSION_ROLE_KEY, user.role)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

    info!("login for {} ({})", user.username, user.role.as_str());

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "user": {
                "id": user.id,
                "username": user.username,
                "first_name": user.first_name,
                "last_name": user.last_name,
                "role": user.role,
            },
        })),
    ))
}

pub async fn logout(session: Session) -> Result<impl IntoResponse, AuthError> {
    session
        .flush()
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "message": "Vous avez été déconnecté avec succès.",
    })))
}

/// The logged-in caller's identity as established at login time.
pub async fn session_identity(session: &Session) -> Result<(Uuid, Role), ApiError> {
    let user_id = session
        .get::<Uuid>(SESSION_USER_KEY)
        .await
        .map_err(|_| ApiError::Unauthorized)?
        .ok_or(ApiError::Unauthorized)?;
    let role = session
        .get::<Role>(SESSION_ROLE_KEY)
        .await
        .map_err(|_| ApiError::Unauthorized)?
        .ok_or(ApiError::Unauthorized)?;
    Ok((user_id, role))
}

pub async fn require_admin(session: &Session) -> Result<Uuid, ApiError> {
    let (user_id, role) = session_identity(session).await?;
    if role != Role::Admin {
        return Err(ApiError::Forbidden);
    }
    Ok(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_must_be_numeric() {
        assert!(validate_pin("12a4").is_some());
        assert!(validate_pin("").is_some());
        assert!(validate_pin("1 34").is_some());
    }

    #[test]
    fn pin_length_bounds_are_inclusive() {
        assert!(validate_pin("123").is_some());
        assert!(validate_pin("1234").is_none());
        assert!(validate_pin("12345678").is_none());
        assert!(validate_pin("123456789").is_some());
    }

    #[test]
    fn registration_collects_all_field_errors() {
        let payload = RegisterRequest {
            username: "".to_string(),
            email: "not-an-email".to_string(),
            first_name: "Claire".to_string(),
            last_name: "Dupont".to_string(),
            pin: "12".to_string(),
            pin_confirm: "34".to_string(),
            role: "teacher".to_string(),
        };
        let errors = validate_registration(&payload);
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"username"));
        assert!(fields.contains(&"email"));
        assert!(fields.contains(&"pin"));
        assert!(fields.contains(&"pin_confirm"));
        assert!(fields.contains(&"role"));
    }

    #[test]
    fn valid_registration_has_no_errors() {
        let payload = RegisterRequest {
            username: "claire".to_string(),
            email: "claire@example.org".to_string(),
            first_name: "Claire".to_string(),
            last_name: "Dupont".to_string(),
            pin: "1234".to_string(),
            pin_confirm: "1234".to_string(),
            role: "parent".to_string(),
        };
        assert!(validate_registration(&payload).is_empty());
    }
}
