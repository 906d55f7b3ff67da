//! # posts-api
//!
//! REST API for user accounts and posts, stored in MongoDB.
//!
//! | Endpoint | Method | Auth | Description |
//! |----------|--------|------|-------------|
//! | `/` | GET | no | Welcome message |
//! | `/api/v1/users/register` | POST | no | Create an account, returns a token |
//! | `/api/v1/users/login` | POST | no | Exchange credentials for a token |
//! | `/api/v1/posts` | GET, POST | bearer | List or create posts |
//! | `/api/v1/posts/:id` | GET, PATCH, DELETE | bearer | Read, edit or remove a post |
//!
//! Failures always come back as `{"status": "error", "message": ...}`.

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod pipeline;
pub mod rate_limit;
pub mod sanitize;
pub mod security;
pub mod server;
pub mod state;
pub mod store;
pub mod utils;

pub use config::Config;
pub use error::{AppError, StartupError};
pub use server::{build_router, run};
pub use state::AppState;
pub use utils::{ApiResponse, PaginatedResponse, PaginationParams};
