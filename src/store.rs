//! Persistence traits. Handlers only see these; MongoDB and the in-memory
//! store both implement them.

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{NewPost, NewUser, Post, PostChanges, PostFilter, User};
use crate::utils::PaginationParams;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `AppError::Conflict` when the email is taken.
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, AppError>;
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create_post(&self, new_post: NewPost) -> Result<Post, AppError>;

    /// Newest first, with the total number of matching posts.
    async fn list_posts(
        &self,
        filter: PostFilter,
        page: PaginationParams,
    ) -> Result<(Vec<Post>, u64), AppError>;

    async fn find_post(&self, id: &str) -> Result<Option<Post>, AppError>;

    async fn update_post(&self, id: &str, changes: PostChanges) -> Result<Option<Post>, AppError>;

    /// Returns whether a post was removed.
    async fn delete_post(&self, id: &str) -> Result<bool, AppError>;
}

pub trait Store: UserRepository + PostRepository {}

impl<T: UserRepository + PostRepository + ?Sized> Store for T {}

pub const DUPLICATE_EMAIL: &str = "User with this email already exists";
