//! Shared fixtures for the HTTP-level tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderName, HeaderValue};
use axum_test::TestServer;
use chrono::Utc;
use posts_api::{
    build_router,
    memory::MemoryStore,
    models::{NewPost, NewUser, Post, PostChanges, PostFilter, User},
    store::{PostRepository, Store, UserRepository},
    AppError, AppState, Config, PaginationParams,
};
use serde_json::{json, Value};

pub fn test_config() -> Config {
    Config {
        jwt_secret: "integration-test-secret".to_string(),
        bcrypt_cost: 4,
        rate_limit_max: 1_000,
        ..Config::default()
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
}

impl TestApp {
    pub fn with_store(config: Config, store: Arc<dyn Store>) -> Self {
        let state = AppState::new(config, store);
        let server = TestServer::new(build_router(state.clone())).unwrap();
        Self { server, state }
    }

    /// Token for a user that exists only in the token, not in any store.
    pub fn token_for(&self, id: &str) -> String {
        let user = User {
            id: id.to_string(),
            username: "probe".to_string(),
            email: "probe@example.com".to_string(),
            password_hash: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.state.auth.generate_token(&user).unwrap()
    }

    /// Registers a user through the API and returns `(token, user id)`.
    pub async fn register(&self, username: &str, email: &str) -> (String, String) {
        let response = self
            .server
            .post("/api/v1/users/register")
            .json(&json!({
                "username": username,
                "email": email,
                "password": "hunter22"
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);

        let body: Value = response.json();
        (
            body["data"]["token"].as_str().unwrap().to_string(),
            body["data"]["user"]["id"].as_str().unwrap().to_string(),
        )
    }
}

pub fn memory_app() -> (TestApp, MemoryStore) {
    memory_app_with(test_config())
}

pub fn memory_app_with(config: Config) -> (TestApp, MemoryStore) {
    let store = MemoryStore::new();
    let app = TestApp::with_store(config, Arc::new(store.clone()));
    (app, store)
}

pub fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    )
}

/// A store whose every call fails, standing in for a lost database.
pub struct FailingStore;

fn offline() -> AppError {
    AppError::Internal("store offline at 10.0.0.7:27017".to_string())
}

#[async_trait]
impl UserRepository for FailingStore {
    async fn create_user(&self, _: NewUser) -> Result<User, AppError> {
        Err(offline())
    }

    async fn find_user_by_email(&self, _: &str) -> Result<Option<User>, AppError> {
        Err(offline())
    }

    async fn find_user_by_id(&self, _: &str) -> Result<Option<User>, AppError> {
        Err(offline())
    }
}

#[async_trait]
impl PostRepository for FailingStore {
    async fn create_post(&self, _: NewPost) -> Result<Post, AppError> {
        Err(offline())
    }

    async fn list_posts(&self, _: PostFilter, _: PaginationParams) -> Result<(Vec<Post>, u64), AppError> {
        Err(offline())
    }

    async fn find_post(&self, _: &str) -> Result<Option<Post>, AppError> {
        Err(offline())
    }

    async fn update_post(&self, _: &str, _: PostChanges) -> Result<Option<Post>, AppError> {
        Err(offline())
    }

    async fn delete_post(&self, _: &str) -> Result<bool, AppError> {
        Err(offline())
    }
}
