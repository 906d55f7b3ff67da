//! In-process store with the same semantics as the MongoDB one. Backs the
//! test suite and local runs without a database.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bson::oid::ObjectId;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};

use crate::error::AppError;
use crate::models::{NewPost, NewUser, Post, PostChanges, PostFilter, User};
use crate::store::{PostRepository, UserRepository, DUPLICATE_EMAIL};
use crate::utils::PaginationParams;

#[derive(Clone, Default)]
pub struct MemoryStore {
    users: Arc<DashMap<String, User>>,
    /// email -> user id
    emails: Arc<DashMap<String, String>>,
    posts: Arc<DashMap<String, Post>>,
    post_calls: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of post repository calls made so far.
    pub fn post_calls(&self) -> usize {
        self.post_calls.load(Ordering::SeqCst)
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    fn record_post_call(&self) {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        let id = ObjectId::new().to_hex();

        match self.emails.entry(new_user.email.clone()) {
            Entry::Occupied(_) => return Err(AppError::Conflict(DUPLICATE_EMAIL.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(id.clone());
            }
        }

        let now = Utc::now();
        let user = User {
            id: id.clone(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let Some(id) = self.emails.get(email).map(|entry| entry.value().clone()) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|user| user.clone()))
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.get(id).map(|user| user.clone()))
    }
}

#[async_trait]
impl PostRepository for MemoryStore {
    async fn create_post(&self, new_post: NewPost) -> Result<Post, AppError> {
        self.record_post_call();

        let now = Utc::now();
        let post = Post {
            id: ObjectId::new().to_hex(),
            title: new_post.title,
            content: new_post.content,
            author: new_post.author,
            created_at: now,
            updated_at: now,
        };
        self.posts.insert(post.id.clone(), post.clone());
        Ok(post)
    }

    async fn list_posts(
        &self,
        filter: PostFilter,
        page: PaginationParams,
    ) -> Result<(Vec<Post>, u64), AppError> {
        self.record_post_call();

        let mut posts: Vec<Post> = self
            .posts
            .iter()
            .filter(|entry| {
                filter
                    .author
                    .as_ref()
                    .map_or(true, |author| &entry.author == author)
            })
            .map(|entry| entry.value().clone())
            .collect();

        // ObjectIds grow monotonically, so they break timestamp ties.
        posts.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = posts.len() as u64;
        let items = posts
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.limit as usize)
            .collect();

        Ok((items, total))
    }

    async fn find_post(&self, id: &str) -> Result<Option<Post>, AppError> {
        self.record_post_call();
        Ok(self.posts.get(id).map(|post| post.clone()))
    }

    async fn update_post(&self, id: &str, changes: PostChanges) -> Result<Option<Post>, AppError> {
        self.record_post_call();

        let Some(mut post) = self.posts.get_mut(id) else {
            return Ok(None);
        };
        if let Some(title) = changes.title {
            post.title = title;
        }
        if let Some(content) = changes.content {
            post.content = content;
        }
        post.updated_at = Utc::now();
        Ok(Some(post.clone()))
    }

    async fn delete_post(&self, id: &str) -> Result<bool, AppError> {
        self.record_post_call();
        Ok(self.posts.remove(id).is_some())
    }
}
