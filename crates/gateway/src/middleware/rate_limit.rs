//! Rate limiting middleware using token bucket algorithm

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use medrag_common::config::RateLimitConfig;
use medrag_common::errors::{AppError, Result};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Process-wide limiter shared by every route
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<DefaultDirectRateLimiter>,
    requests_per_second: u32,
}

impl RateLimit {
    /// Create a limiter; zero rates are a configuration error
    pub fn new(requests_per_second: u32, burst: u32) -> Result<Self> {
        let rate = NonZeroU32::new(requests_per_second).ok_or_else(|| AppError::Configuration {
            message: "rate_limit.requests_per_second must be positive".to_string(),
        })?;
        let burst = NonZeroU32::new(burst).ok_or_else(|| AppError::Configuration {
            message: "rate_limit.burst must be positive".to_string(),
        })?;

        Ok(Self {
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate).allow_burst(burst))),
            requests_per_second,
        })
    }

    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }

    /// `None` when rate limiting is disabled
    pub fn from_config(config: &RateLimitConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        Self::new(config.requests_per_second, config.burst).map(Some)
    }
}

impl std::fmt::Debug for RateLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimit")
            .field("requests_per_second", &self.requests_per_second)
            .finish()
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limit): State<RateLimit>,
    request: Request,
    next: Next,
) -> Result<Response> {
    match limit.limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            Err(AppError::RateLimited { limit: limit.requests_per_second })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{self, StatusCode}, routing::get, Router};
    use tower::ServiceExt;

    fn app(limit: RateLimit) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(limit, rate_limit_middleware))
    }

    #[test]
    fn test_rate_limiter_creation() {
        tokio_test::assert_ok!(RateLimit::new(100, 200));
        tokio_test::assert_err!(RateLimit::new(0, 10));
        tokio_test::assert_err!(RateLimit::new(10, 0));
    }

    #[test]
    fn test_disabled_config() {
        let config = RateLimitConfig { requests_per_second: 0, burst: 0, enabled: false };
        assert!(RateLimit::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_burst_exhaustion_returns_429() {
        let app = app(RateLimit::new(1, 1).unwrap());

        let first = app
            .clone()
            .oneshot(http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
