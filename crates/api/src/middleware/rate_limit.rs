//! Per-client rate limiting.
//!
//! Authenticated requests are keyed by user id, anonymous ones by client IP.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovRateLimiter,
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    num::NonZeroU32,
    sync::{Arc, RwLock},
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::user_auth::UserAuth;

type ClientRateLimiter = GovRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const FALLBACK_LIMIT: NonZeroU32 = match NonZeroU32::new(100) {
    Some(n) => n,
    None => NonZeroU32::MIN,
};

/// One governor limiter per client key.
pub struct RateLimiterState {
    limiters: RwLock<HashMap<String, Arc<ClientRateLimiter>>>,
    rate_limit_per_minute: u32,
}

impl RateLimiterState {
    pub fn new(rate_limit_per_minute: u32) -> Self {
        Self {
            limiters: RwLock::new(HashMap::new()),
            rate_limit_per_minute,
        }
    }

    fn get_or_create_limiter(&self, key: &str) -> Arc<ClientRateLimiter> {
        if let Ok(limiters) = self.limiters.read() {
            if let Some(limiter) = limiters.get(key) {
                return limiter.clone();
            }
        }

        // A poisoned lock only means another request panicked mid-insert
        let mut limiters = match self.limiters.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        limiters
            .entry(key.to_string())
            .or_insert_with(|| {
                let per_minute =
                    NonZeroU32::new(self.rate_limit_per_minute).unwrap_or(FALLBACK_LIMIT);
                Arc::new(GovRateLimiter::direct(Quota::per_minute(per_minute)))
            })
            .clone()
    }

    /// `Err(retry_after_secs)` when the client is over its quota.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        let limiter = self.get_or_create_limiter(key);
        limiter.check().map_err(|not_until| {
            not_until
                .wait_time_from(DefaultClock::default().now())
                .as_secs()
                .max(1)
        })
    }

    pub fn active_limiters(&self) -> usize {
        self.limiters.read().map(|l| l.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for RateLimiterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterState")
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("active_limiters", &self.active_limiters())
            .finish()
    }
}

/// Key for a request: the authenticated user, else the forwarded or peer IP.
fn client_key(req: &Request<Body>) -> String {
    if let Some(auth) = req.extensions().get::<UserAuth>() {
        return format!("user:{}", auth.user_id);
    }

    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return format!("ip:{}", ip);
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| format!("ip:{}", addr.ip()))
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Must run after authentication on protected routes so the user id is known.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(ref rate_limiter) = state.rate_limiter {
        let key = client_key(&req);
        if let Err(retry_after) = rate_limiter.check(&key) {
            tracing::warn!(client = %key, retry_after, "Rate limit exceeded");
            return rate_limited_response(retry_after);
        }
    }

    next.run(req).await
}

fn rate_limited_response(retry_after: u64) -> Response {
    let mut response = ApiError::RateLimited.into_response();
    if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use uuid::Uuid;

    #[test]
    fn test_rate_limiter_exhaustion() {
        let state = RateLimiterState::new(1);
        assert!(state.check("ip:10.0.0.1").is_ok());
        let result = state.check("ip:10.0.0.1");
        assert!(result.unwrap_err() >= 1);
    }

    #[test]
    fn test_rate_limiter_keys_independent() {
        let state = RateLimiterState::new(1);
        assert!(state.check("user:a").is_ok());
        assert!(state.check("user:b").is_ok());
        assert!(state.check("user:a").is_err());
        assert_eq!(state.active_limiters(), 2);
    }

    #[test]
    fn test_rate_limiter_allows_quota() {
        let state = RateLimiterState::new(5);
        for i in 0..5 {
            assert!(state.check("k").is_ok(), "Request {} should be allowed", i);
        }
        assert!(state.check("k").is_err());
    }

    #[test]
    fn test_limiter_reused() {
        let state = RateLimiterState::new(100);
        let a = state.get_or_create_limiter("k");
        let b = state.get_or_create_limiter("k");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_rate_limited_response() {
        let response = rate_limited_response(60);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "60");
    }

    #[test]
    fn test_client_key_prefers_user() {
        let user_id = Uuid::new_v4();
        let mut req = Request::builder()
            .header("x-forwarded-for", "1.2.3.4")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&req), "ip:1.2.3.4");

        req.extensions_mut().insert(UserAuth {
            user_id,
            jti: "jti".to_string(),
        });
        assert_eq!(client_key(&req), format!("user:{}", user_id));
    }

    #[test]
    fn test_client_key_forwarded_chain() {
        let req = Request::builder()
            .header("x-forwarded-for", " 9.9.9.9 , 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&req), "ip:9.9.9.9");

        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_key(&req), "anonymous");
    }
}
