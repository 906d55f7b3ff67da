use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::info;

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::extract::{ApiJson, ApiQuery};
use crate::models::{CreatePostRequest, NewPost, Post, PostChanges, PostFilter, PostListQuery, UpdatePostRequest};
use crate::state::AppState;
use crate::store::PostRepository;
use crate::utils::{ApiResponse, PaginatedResponse, PaginationParams};

const MAX_TITLE_LEN: usize = 200;
const MAX_CONTENT_LEN: usize = 20_000;

fn post_not_found() -> AppError {
    AppError::NotFound("Post not found".to_string())
}

fn validate_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::BadRequest("Post title is required".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::BadRequest(format!(
            "Post title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(title.to_string())
}

fn validate_content(content: &str) -> Result<String, AppError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("Post content is required".to_string()));
    }
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(AppError::BadRequest(format!(
            "Post content must be at most {MAX_CONTENT_LEN} characters"
        )));
    }
    Ok(content.to_string())
}

/// Loads a post the caller is allowed to modify.
async fn owned_post(state: &AppState, id: &str, user: &CurrentUser) -> Result<Post, AppError> {
    let post = state.store.find_post(id).await?.ok_or_else(post_not_found)?;

    if post.author != user.id {
        return Err(AppError::Forbidden(
            "You are not allowed to modify this post".to_string(),
        ));
    }
    Ok(post)
}

pub async fn list_posts(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PostListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let pagination = PaginationParams::new(query.page, query.limit);
    let filter = PostFilter {
        author: query.author.filter(|author| !author.trim().is_empty()),
    };

    let (posts, total) = state.store.list_posts(filter, pagination).await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        posts, pagination, total,
    ))))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    match state.store.find_post(&id).await? {
        Some(post) => Ok(Json(ApiResponse::success(post))),
        None => Err(post_not_found()),
    }
}

pub async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(request): ApiJson<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    let new_post = NewPost {
        title: validate_title(&request.title)?,
        content: validate_content(&request.content)?,
        author: user.id,
    };

    let post = state.store.create_post(new_post).await?;
    info!(post_id = %post.id, author = %post.author, "Created post");

    Ok((StatusCode::CREATED, Json(ApiResponse::success(post))))
}

pub async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.title.is_none() && request.content.is_none() {
        return Err(AppError::BadRequest(
            "Provide a title or content to update".to_string(),
        ));
    }

    let changes = PostChanges {
        title: request.title.as_deref().map(validate_title).transpose()?,
        content: request.content.as_deref().map(validate_content).transpose()?,
    };

    owned_post(&state, &id, &user).await?;

    let post = state
        .store
        .update_post(&id, changes)
        .await?
        .ok_or_else(post_not_found)?;

    Ok(Json(ApiResponse::success(post)))
}

pub async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    owned_post(&state, &id, &user).await?;

    if !state.store.delete_post(&id).await? {
        return Err(post_not_found());
    }
    info!(post_id = %id, "Deleted post");

    Ok(Json(ApiResponse::message("Post deleted")))
}
