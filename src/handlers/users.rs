use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::error::AppError;
use crate::extract::ApiJson;
use crate::models::{LoginRequest, RegisterRequest};
use crate::state::AppState;
use crate::utils::{validate_email, ApiResponse};

const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 50;

pub async fn register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    // Validate input
    let username = request.username.trim();
    if username.is_empty() {
        return Err(AppError::BadRequest("Username is required".to_string()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::BadRequest(format!(
            "Username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }

    if request.email.trim().is_empty() {
        return Err(AppError::BadRequest("Email is required".to_string()));
    }
    if !validate_email(request.email.trim()) {
        return Err(AppError::BadRequest("Invalid email format".to_string()));
    }

    validate_password(&request.password)?;

    let response = state.auth.register_user(state.store.as_ref(), request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.email.trim().is_empty() {
        return Err(AppError::BadRequest("Email is required".to_string()));
    }

    if request.password.is_empty() {
        return Err(AppError::BadRequest("Password is required".to_string()));
    }

    let response = state.auth.authenticate_user(state.store.as_ref(), request).await?;
    Ok(Json(ApiResponse::success(response)))
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if !is_strong_password(password) {
        return Err(AppError::BadRequest(
            "Password must contain at least one letter and one number".to_string(),
        ));
    }
    Ok(())
}

fn is_strong_password(password: &str) -> bool {
    let has_letter = password.chars().any(char::is_alphabetic);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    has_letter && has_digit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_strength() {
        assert!(is_strong_password("hunter22"));
        assert!(!is_strong_password("password"));
        assert!(!is_strong_password("12345678"));
    }

    #[test]
    fn password_length_counts_characters() {
        // Seven characters, fifteen bytes.
        assert!(validate_password("ééééééé1").is_err());
        assert!(validate_password("éééééé12").is_ok());
        assert!(validate_password("hunter22").is_ok());
    }
}
