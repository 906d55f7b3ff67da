use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AppError;
use crate::models::{AuthResponse, LoginRequest, NewUser, RegisterRequest, User};
use crate::state::AppState;
use crate::store::UserRepository;
use crate::utils::normalize_email;

const INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const USER_GONE: &str = "The user belonging to this token no longer exists";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

#[derive(Clone)]
pub struct AuthService {
    keys: Arc<Keys>,
    token_ttl: Duration,
    hash_cost: u32,
}

impl AuthService {
    pub fn new(jwt_secret: &str, token_ttl: Duration, hash_cost: u32) -> Self {
        Self {
            keys: Arc::new(Keys {
                encoding: EncodingKey::from_secret(jwt_secret.as_bytes()),
                decoding: DecodingKey::from_secret(jwt_secret.as_bytes()),
            }),
            token_ttl,
            hash_cost,
        }
    }

    pub async fn hash_password(&self, password: &str) -> Result<String, AppError> {
        let password = password.to_owned();
        let cost = self.hash_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {e}")))?
            .map_err(AppError::from)
    }

    pub async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AppError> {
        let password = password.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {e}")))?
            .map_err(AppError::from)
    }

    pub fn generate_token(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.token_ttl.as_secs()).unwrap_or(i64::MAX);

        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            iat: now,
            exp: now.saturating_add(ttl),
        };

        Ok(encode(&Header::default(), &claims, &self.keys.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AppError> {
        let token_data = decode::<Claims>(token, &self.keys.decoding, &Validation::default())
            .map_err(|e| {
                debug!(error = %e, "Rejected bearer token");
                AppError::Unauthorized("Invalid or expired token".to_string())
            })?;

        Ok(token_data.claims)
    }

    pub async fn register_user<R>(&self, users: &R, request: RegisterRequest) -> Result<AuthResponse, AppError>
    where
        R: UserRepository + ?Sized,
    {
        let password_hash = self.hash_password(&request.password).await?;

        let user = users
            .create_user(NewUser {
                username: request.username.trim().to_string(),
                email: normalize_email(&request.email),
                password_hash,
            })
            .await?;

        info!(user_id = %user.id, "Registered user");
        let token = self.generate_token(&user)?;
        Ok(AuthResponse { token, user })
    }

    pub async fn authenticate_user<R>(&self, users: &R, request: LoginRequest) -> Result<AuthResponse, AppError>
    where
        R: UserRepository + ?Sized,
    {
        let user = users
            .find_user_by_email(&normalize_email(&request.email))
            .await?
            .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

        if !self.verify_password(&request.password, &user.password_hash).await? {
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        let token = self.generate_token(&user)?;
        Ok(AuthResponse { token, user })
    }
}

/// Caller identity attached by `require_auth`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
}

impl From<User> for CurrentUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("You are not logged in. Please provide a bearer token".to_string()))?;

    header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Authorization header must be 'Bearer <token>'".to_string()))
}

/// Gate for the protected route group. Rejected requests never reach a handler.
///
/// A valid signature is not enough: the account behind the token must still
/// exist.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = state.auth.verify_token(bearer_token(request.headers())?)?;

    let user = state
        .store
        .find_user_by_id(&claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized(USER_GONE.to_string()))?;

    request.extensions_mut().insert(CurrentUser::from(user));

    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}
