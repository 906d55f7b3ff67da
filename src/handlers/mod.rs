pub mod posts;
pub mod root;
pub mod users;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::auth::require_auth;
use crate::state::AppState;

/// Public routes: registration and login.
///
/// A known path with the wrong method is treated like an unknown path, so
/// every method router carries the 404 fallback.
pub fn users_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(users::register).fallback(root::not_found))
        .route("/login", post(users::login).fallback(root::not_found))
}

/// Every route here sits behind the bearer token gate, including paths that
/// match nothing, so an unauthenticated caller cannot probe the route table.
pub fn posts_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(posts::list_posts)
                .post(posts::create_post)
                .fallback(root::not_found),
        )
        .route(
            "/:id",
            get(posts::get_post)
                .patch(posts::update_post)
                .delete(posts::delete_post)
                .fallback(root::not_found),
        )
        .fallback(root::not_found)
        .layer(middleware::from_fn_with_state(state, require_auth))
}
