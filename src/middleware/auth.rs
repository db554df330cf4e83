//! Access-key authentication for requests coming from Poe

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::future::BoxFuture;
use serde::Serialize;
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::warn;

/// Paths reachable without the access key
const PUBLIC_PATHS: &[&str] = &["/health"];

/// Authentication error response
#[derive(Serialize)]
struct AuthError {
    error: AuthErrorDetail,
}

#[derive(Serialize)]
struct AuthErrorDetail {
    message: String,
    r#type: String,
    code: String,
}

/// Authentication layer
#[derive(Clone)]
pub struct AuthLayer {
    access_key: Arc<str>,
}

impl AuthLayer {
    /// An empty key rejects every protected request
    pub fn new(access_key: impl Into<Arc<str>>) -> Self {
        Self {
            access_key: access_key.into(),
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            access_key: self.access_key.clone(),
        }
    }
}

/// Authentication middleware service
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    access_key: Arc<str>,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        if PUBLIC_PATHS.contains(&request.uri().path()) {
            let future = self.inner.call(request);
            return Box::pin(future);
        }

        // Poe sends `Authorization: Bearer <access key>`
        let presented = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(|h| h.strip_prefix("Bearer ").unwrap_or(h).trim().to_string());

        match presented {
            Some(key) if is_accepted(&self.access_key, &key) => {
                let future = self.inner.call(request);
                Box::pin(future)
            }
            Some(_) => {
                warn!(path = %request.uri().path(), "Invalid access key provided");
                Box::pin(async move { Ok(create_auth_error_response("Invalid access key")) })
            }
            None => {
                warn!(path = %request.uri().path(), "No access key provided");
                Box::pin(async move {
                    Ok(create_auth_error_response(
                        "Access key required. Provide via Authorization header: 'Bearer ACCESS_KEY'",
                    ))
                })
            }
        }
    }
}

fn is_accepted(expected: &str, presented: &str) -> bool {
    !expected.is_empty() && expected == presented
}

fn create_auth_error_response(message: &str) -> Response {
    let error = AuthError {
        error: AuthErrorDetail {
            message: message.to_string(),
            r#type: "authentication_error".to_string(),
            code: "invalid_access_key".to_string(),
        },
    };

    (StatusCode::UNAUTHORIZED, Json(error)).into_response()
}
