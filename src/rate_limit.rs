//! Per-IP request rate limiting for the HTTP transport.
//!
//! Not part of the assignment engine's own concurrency model (spec.md §5's
//! assignment lock is the correctness boundary); this is ambient transport
//! hardening against a single noisy or misbehaving client starving others.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use std::{net::IpAddr, net::SocketAddr, num::NonZeroU32, sync::Arc};
use tracing::warn;

pub const REQUESTS_PER_MINUTE: u32 = 60;

#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>>,
}

impl RateLimitState {
    pub fn new() -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(REQUESTS_PER_MINUTE).unwrap());
        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
        }
    }
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new()
    }
}

fn client_ip(headers: &axum::http::HeaderMap, fallback: SocketAddr) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .unwrap_or(fallback.ip())
}

/// Rejects with 429 once an IP exceeds `REQUESTS_PER_MINUTE`. Limiter state is
/// keyed per-IP and lives for the process lifetime of the HTTP transport.
pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimitState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let ip = client_ip(request.headers(), addr);
    if state.limiter.check_key(&ip).is_err() {
        warn!(%ip, path = request.uri().path(), "rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_quota_requests_are_allowed() {
        let state = RateLimitState::new();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..REQUESTS_PER_MINUTE {
            assert!(state.limiter.check_key(&ip).is_ok());
        }
    }

    #[test]
    fn exceeding_quota_is_rejected() {
        let state = RateLimitState::new();
        let ip: IpAddr = "127.0.0.2".parse().unwrap();
        for _ in 0..REQUESTS_PER_MINUTE {
            let _ = state.limiter.check_key(&ip);
        }
        assert!(state.limiter.check_key(&ip).is_err());
    }

    #[test]
    fn different_ips_have_independent_quotas() {
        let state = RateLimitState::new();
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        for _ in 0..REQUESTS_PER_MINUTE {
            let _ = state.limiter.check_key(&a);
        }
        assert!(state.limiter.check_key(&a).is_err());
        assert!(state.limiter.check_key(&b).is_ok());
    }
}
