//! Ordered request stages that run before routing.
//!
//! The order is part of the contract: the body must be parsed before it can
//! be scrubbed, and scrubbing must finish before any handler sees the input.
//! Rate limiting comes last so it sees the request as the handler will.
//!
//! ```text
//! ParseJson -> StripOperators -> EscapeHtml -> CollapseParameters -> RateLimit
//! ```

use std::net::SocketAddr;

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        request::Parts,
        uri::PathAndQuery,
        HeaderMap, HeaderName, HeaderValue, Uri,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::warn;

use crate::error::AppError;
use crate::rate_limit::RateLimiter;
use crate::sanitize;
use crate::state::AppState;

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ParseJson,
    StripOperators,
    EscapeHtml,
    CollapseParameters,
    RateLimit,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::ParseJson => "parse-json",
            Stage::StripOperators => "strip-operators",
            Stage::EscapeHtml => "escape-html",
            Stage::CollapseParameters => "collapse-parameters",
            Stage::RateLimit => "rate-limit",
        }
    }

    fn apply(self, request: &mut PendingRequest, limiter: &RateLimiter) -> Outcome {
        match self {
            Stage::ParseJson => {
                if !request.is_json || request.raw_body.is_empty() {
                    return Outcome::Continue;
                }
                match serde_json::from_slice::<Value>(&request.raw_body) {
                    Ok(value) => {
                        request.body = Some(value);
                        Outcome::Continue
                    }
                    Err(e) => Outcome::Fail(AppError::BadRequest(format!("Malformed JSON body: {e}"))),
                }
            }
            Stage::StripOperators => {
                let mut removed = request
                    .body
                    .as_mut()
                    .map(sanitize::strip_operator_keys)
                    .unwrap_or_default();

                request.query.retain(|(name, _)| {
                    let keep = !sanitize::is_operator_param(name);
                    if !keep {
                        removed.push(name.clone());
                    }
                    keep
                });

                if !removed.is_empty() {
                    warn!(client = %request.client, keys = ?removed, "Removed operator keys from request");
                }
                Outcome::Continue
            }
            Stage::EscapeHtml => {
                if let Some(body) = request.body.as_mut() {
                    sanitize::escape_html_values(body);
                }
                for (_, value) in request.query.iter_mut() {
                    *value = sanitize::escape_html(value);
                }
                Outcome::Continue
            }
            Stage::CollapseParameters => {
                let repeated = sanitize::collapse_repeated(&mut request.query);
                if !repeated.is_empty() {
                    warn!(client = %request.client, params = ?repeated, "Collapsed repeated query parameters");
                }
                Outcome::Continue
            }
            Stage::RateLimit => {
                if !limiter.is_enabled() {
                    return Outcome::Continue;
                }
                let decision = limiter.check(&request.client);

                let headers = &mut request.response_headers;
                headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
                headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
                headers.insert(RATE_LIMIT_RESET, HeaderValue::from(decision.reset_after.as_secs()));

                if decision.allowed {
                    Outcome::Continue
                } else {
                    warn!(client = %request.client, "Rate limit exceeded");
                    Outcome::Fail(AppError::TooManyRequests {
                        retry_after: decision.reset_after,
                    })
                }
            }
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Continue,
    Fail(AppError),
}

/// The parts of an inbound request the stages read and rewrite.
#[derive(Debug)]
pub struct PendingRequest {
    pub client: String,
    pub is_json: bool,
    pub raw_body: Bytes,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
    /// Added to the response whether the request succeeds or fails.
    pub response_headers: HeaderMap,
}

impl PendingRequest {
    pub fn new(client: impl Into<String>, is_json: bool, raw_body: Bytes, query: Option<&str>) -> Self {
        let query = query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            client: client.into(),
            is_json,
            raw_body,
            body: None,
            query,
            response_headers: HeaderMap::new(),
        }
    }

    fn encoded_query(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish()
    }

    fn body_bytes(&self) -> Result<Bytes, AppError> {
        match &self.body {
            Some(value) => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| AppError::Internal(format!("Failed to re-encode request body: {e}"))),
            None => Ok(self.raw_body.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn standard() -> Self {
        Self::new(vec![
            Stage::ParseJson,
            Stage::StripOperators,
            Stage::EscapeHtml,
            Stage::CollapseParameters,
            Stage::RateLimit,
        ])
    }

    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Runs every stage in order, stopping at the first failure.
    pub fn run(&self, request: &mut PendingRequest, limiter: &RateLimiter) -> Result<(), AppError> {
        for stage in &self.stages {
            if let Outcome::Fail(error) = stage.apply(request, limiter) {
                tracing::debug!(stage = stage.name(), error = %error, "Pipeline stopped");
                return Err(error);
            }
        }
        Ok(())
    }
}

fn is_json_content(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
        })
        .unwrap_or(false)
}

fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn rewrite_uri(uri: &Uri, query: &str) -> Result<Uri, AppError> {
    let path_and_query = if query.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), query)
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        PathAndQuery::try_from(path_and_query)
            .map_err(|e| AppError::BadRequest(format!("Invalid query string: {e}")))?,
    );
    Uri::from_parts(parts).map_err(|e| AppError::BadRequest(format!("Invalid request URI: {e}")))
}

fn rebuild(parts: &mut Parts, pending: &mut PendingRequest) -> Result<(), AppError> {
    if parts.uri.query().is_some() {
        parts.uri = rewrite_uri(&parts.uri, &pending.encoded_query())?;
    }
    if pending.body.is_some() {
        let bytes = pending.body_bytes()?;
        parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        pending.raw_body = bytes;
    }
    Ok(())
}

/// Buffers the body, runs the stages and rebuilds the request from what they
/// left behind. Both arms carry the headers destined for the response.
async fn prepare(state: &AppState, request: Request) -> Result<(Request, HeaderMap), (AppError, HeaderMap)> {
    let limit = state.config.body_limit;
    let client = client_key(&request);
    let is_json = is_json_content(request.headers());

    let (mut parts, body) = request.into_parts();

    let declared_length = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared_length.is_some_and(|length| length > limit) {
        return Err((AppError::PayloadTooLarge { limit }, HeaderMap::new()));
    }

    let raw_body = to_bytes(body, limit)
        .await
        .map_err(|_| (AppError::PayloadTooLarge { limit }, HeaderMap::new()))?;

    let mut pending = PendingRequest::new(client, is_json, raw_body, parts.uri.query());

    let outcome = state
        .pipeline
        .run(&mut pending, &state.limiter)
        .and_then(|()| rebuild(&mut parts, &mut pending));
    let headers = std::mem::take(&mut pending.response_headers);

    match outcome {
        Ok(()) => Ok((Request::from_parts(parts, Body::from(pending.raw_body)), headers)),
        Err(error) => Err((error, headers)),
    }
}

/// Middleware running `AppState::pipeline` over every request.
pub async fn run_pipeline(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match prepare(&state, request).await {
        Ok((request, headers)) => {
            let mut response = next.run(request).await;
            response.headers_mut().extend(headers);
            response
        }
        Err((error, headers)) => {
            let mut response = error.into_response();
            response.headers_mut().extend(headers);
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pending(body: &str, query: Option<&str>) -> PendingRequest {
        PendingRequest::new("127.0.0.1", true, Bytes::from(body.to_string()), query)
    }

    fn open_limiter() -> RateLimiter {
        RateLimiter::new(0, Duration::from_secs(60))
    }

    #[test]
    fn standard_order() {
        let names: Vec<_> = Pipeline::standard().stages().iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            ["parse-json", "strip-operators", "escape-html", "collapse-parameters", "rate-limit"]
        );
    }

    #[test]
    fn scrubs_body_and_query() {
        let mut request = pending(
            r#"{"title":"<i>hi</i>","$set":{"admin":true}}"#,
            Some("page=1&author[$ne]=x&page=2&q=%3Cb%3E"),
        );

        Pipeline::standard().run(&mut request, &open_limiter()).unwrap();

        assert_eq!(request.body, Some(serde_json::json!({"title": "&lt;i&gt;hi&lt;/i&gt;"})));
        assert_eq!(
            request.query,
            vec![
                ("page".to_string(), "2".to_string()),
                ("q".to_string(), "&lt;b&gt;".to_string()),
            ]
        );
    }

    #[test]
    fn malformed_json_stops_before_rate_limit() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let mut request = pending("{not json", None);

        let err = Pipeline::standard().run(&mut request, &limiter).unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn parsing_runs_before_scrubbing() {
        // Scrubbing an unparsed body is a no-op, so a reordered pipeline lets
        // operators through.
        let reordered = Pipeline::new(vec![Stage::StripOperators, Stage::ParseJson]);
        let mut request = pending(r#"{"$where":"1"}"#, None);
        reordered.run(&mut request, &open_limiter()).unwrap();
        assert_eq!(request.body, Some(serde_json::json!({"$where": "1"})));

        let mut request = pending(r#"{"$where":"1"}"#, None);
        Pipeline::standard().run(&mut request, &open_limiter()).unwrap();
        assert_eq!(request.body, Some(serde_json::json!({})));
    }

    #[test]
    fn non_json_bodies_are_untouched() {
        let mut request =
            PendingRequest::new("127.0.0.1", false, Bytes::from_static(b"<p>$x</p>"), None);
        Pipeline::standard().run(&mut request, &open_limiter()).unwrap();
        assert!(request.body.is_none());
        assert_eq!(request.body_bytes().unwrap(), Bytes::from_static(b"<p>$x</p>"));
    }

    #[test]
    fn rate_limit_failure_keeps_headers() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let pipeline = Pipeline::standard();

        let mut first = pending("", None);
        pipeline.run(&mut first, &limiter).unwrap();
        assert_eq!(first.response_headers[RATE_LIMIT_REMAINING], "0");

        let mut second = pending("", None);
        let err = pipeline.run(&mut second, &limiter).unwrap_err();
        assert!(matches!(err, AppError::TooManyRequests { .. }));
        assert_eq!(second.response_headers[RATE_LIMIT_LIMIT], "1");
    }

    #[test]
    fn json_content_types() {
        let mut headers = HeaderMap::new();
        assert!(!is_json_content(&headers));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        assert!(is_json_content(&headers));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/merge-patch+json"));
        assert!(is_json_content(&headers));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!is_json_content(&headers));
    }
}
