use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    error_handling::HandleErrorLayer,
    http::{HeaderValue, Method},
    middleware,
    routing::get,
    BoxError, Router,
};
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
    LatencyUnit,
};
use tracing::{error, info, warn, Level};

use crate::config::Config;
use crate::error::{AppError, StartupError};
use crate::handlers::{self, root};
use crate::pipeline::run_pipeline;
use crate::security::security_headers;
use crate::state::AppState;
use crate::store::Store;

pub const API_PREFIX: &str = "/api/v1";

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Skipping invalid CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any)
}

async fn handle_layer_error(err: BoxError) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        AppError::RequestTimeout
    } else {
        AppError::Internal(format!("Unhandled middleware error: {err}"))
    }
}

/// Route table without the shared middleware.
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(root::welcome).fallback(root::not_found))
        .nest(&format!("{API_PREFIX}/users"), handlers::users_router())
        .nest(
            &format!("{API_PREFIX}/posts"),
            handlers::posts_router(state.clone()),
        )
        .fallback(root::not_found)
}

/// Wraps `routes` in the shared middleware and binds the state.
///
/// Layers run outermost first: access log, CORS, security headers, timeout,
/// then the sanitizing pipeline (`pipeline::Pipeline::standard`). CORS and
/// the security headers sit outside the timeout, so a 408 carries them too.
/// Every failure is rendered by `AppError`.
pub fn with_middleware(routes: Router<AppState>, state: AppState) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        )
        .layer(cors_layer(&state.config))
        .layer(middleware::from_fn(security_headers))
        .layer(HandleErrorLayer::new(handle_layer_error))
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(middleware::from_fn_with_state(state.clone(), run_pipeline));

    routes.layer(middleware_stack).with_state(state)
}

/// Builds the full application. The posts group adds the bearer gate on top
/// of the shared middleware, and anything unmatched ends in the 404 fallback.
pub fn build_router(state: AppState) -> Router {
    with_middleware(routes(&state), state)
}

/// Connects to the database, then listens. No socket is bound unless
/// `connect` succeeds.
pub async fn run<F, S>(config: Config, connect: F) -> Result<(), StartupError>
where
    F: Future<Output = Result<S, StartupError>>,
    S: Store + 'static,
{
    info!("Connecting to database");
    let store = match connect.await {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, "Error connecting to database");
            return Err(err);
        }
    };

    let addr = config.socket_addr();
    let state = AppState::new(config, Arc::new(store));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;
    info!(%addr, "Server is running");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(StartupError::Serve)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
