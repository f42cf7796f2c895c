//! Per-IP rate limiting using governor.
//!
//! Three independent budgets: a global one for every request, a strict one
//! for `/api/auth/*`, and one for the public widget endpoints. Limiters are
//! process-local.

use axum::{
    extract::{ConnectInfo, Extension, Request},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use serde::Serialize;
use std::{net::IpAddr, net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};
use tracing::warn;

pub type KeyedRateLimiter =
    RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock, NoOpMiddleware>;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_secs: u64,
    pub enabled: bool,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 60,
            window_secs: 60,
            enabled: true,
            burst_size: 30,
        }
    }
}

impl RateLimitConfig {
    pub fn new(requests_per_window: u32, window_secs: u64) -> Self {
        Self {
            requests_per_window,
            window_secs,
            enabled: true,
            burst_size: requests_per_window / 2,
        }
    }

    pub fn strict() -> Self {
        Self {
            requests_per_window: 20,
            window_secs: 60,
            enabled: true,
            burst_size: 10,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn create_limiter(&self) -> Option<Arc<KeyedRateLimiter>> {
        if !self.enabled || self.requests_per_window == 0 {
            return None;
        }

        let replenish_interval_ns =
            (self.window_secs as u128 * 1_000_000_000) / self.requests_per_window as u128;
        let replenish_interval = Duration::from_nanos(replenish_interval_ns.max(1) as u64);

        let quota = Quota::with_period(replenish_interval)?
            .allow_burst(NonZeroU32::new(self.burst_size.max(1))?);

        Some(Arc::new(RateLimiter::dashmap(quota)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LimiterKind {
    Global,
    Auth,
    Widget,
}

#[derive(Clone)]
pub struct RateLimitState {
    pub global_limiter: Option<Arc<KeyedRateLimiter>>,
    pub auth_limiter: Option<Arc<KeyedRateLimiter>>,
    pub widget_limiter: Option<Arc<KeyedRateLimiter>>,
    pub config: RateLimitConfig,
}

impl RateLimitState {
    pub fn with_config(
        global_config: RateLimitConfig,
        auth_config: RateLimitConfig,
        widget_config: RateLimitConfig,
    ) -> Self {
        Self {
            global_limiter: global_config.create_limiter(),
            auth_limiter: auth_config.create_limiter(),
            widget_limiter: widget_config.create_limiter(),
            config: global_config,
        }
    }

    pub fn disabled() -> Self {
        Self {
            global_limiter: None,
            auth_limiter: None,
            widget_limiter: None,
            config: RateLimitConfig::disabled(),
        }
    }

    fn limiter(&self, kind: LimiterKind) -> Option<&Arc<KeyedRateLimiter>> {
        match kind {
            LimiterKind::Global => self.global_limiter.as_ref(),
            LimiterKind::Auth => self.auth_limiter.as_ref(),
            LimiterKind::Widget => self.widget_limiter.as_ref(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RateLimitExceeded {
    pub error: String,
    pub code: String,
    pub retry_after_secs: u64,
}

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after_secs.to_string();
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(&self)).into_response();

        if let Ok(value) = HeaderValue::from_str(&retry_after) {
            response.headers_mut().insert(header::RETRY_AFTER, value.clone());
            response.headers_mut().insert("X-RateLimit-Reset", value);
        }

        response
    }
}

fn client_ip(req: &Request) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED))
}

async fn enforce(
    kind: LimiterKind,
    rate_limit_state: Option<Extension<RateLimitState>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitExceeded> {
    let Some(Extension(state)) = rate_limit_state else {
        return Ok(next.run(request).await);
    };
    let Some(limiter) = state.limiter(kind) else {
        return Ok(next.run(request).await);
    };

    let ip = client_ip(&request);

    match limiter.check_key(&ip) {
        Ok(_) => {
            let mut response = next.run(request).await;
            if kind == LimiterKind::Global {
                add_rate_limit_headers(&mut response, &state.config);
            }
            Ok(response)
        }
        Err(not_until) => {
            let wait_duration = not_until.wait_time_from(DefaultClock::default().now());
            let retry_after = wait_duration.as_secs().max(1);

            warn!(ip = %ip, limiter = ?kind, retry_after_secs = retry_after, "Rate limit exceeded");

            let error = match kind {
                LimiterKind::Auth => "Too many authentication attempts",
                LimiterKind::Widget => "Too many widget requests",
                LimiterKind::Global => "Too many requests",
            };

            Err(RateLimitExceeded {
                error: error.to_string(),
                code: "RATE_LIMITED".to_string(),
                retry_after_secs: retry_after,
            })
        }
    }
}

pub async fn rate_limit_middleware(
    rate_limit_state: Option<Extension<RateLimitState>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitExceeded> {
    enforce(LimiterKind::Global, rate_limit_state, request, next).await
}

pub async fn auth_rate_limit_middleware(
    rate_limit_state: Option<Extension<RateLimitState>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitExceeded> {
    enforce(LimiterKind::Auth, rate_limit_state, request, next).await
}

pub async fn widget_rate_limit_middleware(
    rate_limit_state: Option<Extension<RateLimitState>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitExceeded> {
    enforce(LimiterKind::Widget, rate_limit_state, request, next).await
}

fn add_rate_limit_headers(response: &mut Response, config: &RateLimitConfig) {
    if let Ok(value) = HeaderValue::from_str(&config.requests_per_window.to_string()) {
        response.headers_mut().insert("X-RateLimit-Limit", value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_config_strict() {
        let config = RateLimitConfig::strict();
        assert_eq!(config.requests_per_window, 20);
        assert!(config.enabled);
    }

    #[test]
    fn test_disabled_config_builds_no_limiter() {
        assert!(RateLimitConfig::disabled().create_limiter().is_none());
        assert!(RateLimitConfig::new(0, 60).create_limiter().is_none());
    }

    #[test]
    fn test_state_exposes_each_limiter() {
        let state = RateLimitState::with_config(
            RateLimitConfig::default(),
            RateLimitConfig::strict(),
            RateLimitConfig::disabled(),
        );
        assert!(state.limiter(LimiterKind::Global).is_some());
        assert!(state.limiter(LimiterKind::Auth).is_some());
        assert!(state.limiter(LimiterKind::Widget).is_none());

        let off = RateLimitState::disabled();
        assert!(off.limiter(LimiterKind::Global).is_none());
    }

    #[test]
    fn test_rate_limit_exceeded_response() {
        let response = RateLimitExceeded {
            error: "Too many requests".to_string(),
            code: "RATE_LIMITED".to_string(),
            retry_after_secs: 7,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "7");
    }

    #[test]
    fn test_per_ip_keyed_limiter() {
        let config = RateLimitConfig {
            requests_per_window: 2,
            window_secs: 60,
            enabled: true,
            burst_size: 2,
        };
        let limiter = config.create_limiter().unwrap();

        let ip1: IpAddr = "1.2.3.4".parse().unwrap();
        let ip2: IpAddr = "5.6.7.8".parse().unwrap();

        assert!(limiter.check_key(&ip1).is_ok());
        assert!(limiter.check_key(&ip1).is_ok());
        assert!(limiter.check_key(&ip1).is_err());

        assert!(limiter.check_key(&ip2).is_ok());
        assert!(limiter.check_key(&ip2).is_ok());
        assert!(limiter.check_key(&ip2).is_err());
    }
}
