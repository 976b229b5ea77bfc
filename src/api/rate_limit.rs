//! Per-IP request throttling.
//!
//! Counters are fixed windows keyed by client IP. Login and registration
//! draw from a small allowance so credential stuffing burns out quickly;
//! the rest of the API gets a larger one.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::AppState;

/// Which allowance a request draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Api,
    Auth,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// What an allowed request has left, surfaced as response headers.
#[derive(Debug)]
pub struct Allowance {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: u64,
}

pub struct RateLimiter {
    windows: DashMap<(IpAddr, Tier), Window>,
    config: RateLimitConfig,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            window: Duration::from_secs(config.window_seconds),
            config,
        }
    }

    fn limit_for(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Api => self.config.api_requests_per_window,
            Tier::Auth => self.config.auth_requests_per_window,
        }
    }

    /// Count one request against the IP's window. `Err` carries the seconds
    /// until the window turns over.
    pub fn check(&self, ip: IpAddr, tier: Tier) -> Result<Allowance, u64> {
        if !self.config.enabled {
            return Ok(Allowance {
                limit: u32::MAX,
                remaining: u32::MAX,
                reset_after: 0,
            });
        }

        let limit = self.limit_for(tier);
        let now = Instant::now();

        let mut window = self.windows.entry((ip, tier)).or_insert_with(|| Window {
            started: now,
            count: 0,
        });

        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }

        let elapsed = now.duration_since(window.started);
        let reset_after = self.window.saturating_sub(elapsed).as_secs();

        if window.count < limit {
            window.count += 1;
            Ok(Allowance {
                limit,
                remaining: limit - window.count,
                reset_after,
            })
        } else {
            Err(reset_after.max(1))
        }
    }

    /// Drop windows that turned over long enough ago that a returning client
    /// would start a fresh one anyway.
    pub fn evict_stale(&self) {
        let now = Instant::now();
        let expiry = self.window * 2;
        self.windows
            .retain(|_, window| now.duration_since(window.started) < expiry);
    }

    pub fn tracked_windows(&self) -> usize {
        self.windows.len()
    }
}

/// Client address as seen through a reverse proxy, falling back to loopback.
fn client_ip(request: &Request<Body>) -> IpAddr {
    let header_ip = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|value| value.trim().parse::<IpAddr>().ok())
    };

    header_ip("x-forwarded-for")
        .or_else(|| header_ip("x-real-ip"))
        .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST))
}

pub async fn rate_limit_api(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    throttle(state, request, next, Tier::Api).await
}

pub async fn rate_limit_auth(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    throttle(state, request, next, Tier::Auth).await
}

async fn throttle(
    state: Arc<AppState>,
    request: Request<Body>,
    next: Next,
    tier: Tier,
) -> Response {
    let ip = client_ip(&request);

    match state.rate_limiter.check(ip, tier) {
        Ok(allowance) => {
            let mut response = next.run(request).await;
            set_count_header(&mut response, "X-RateLimit-Limit", allowance.limit as u64);
            set_count_header(
                &mut response,
                "X-RateLimit-Remaining",
                allowance.remaining as u64,
            );
            set_count_header(&mut response, "X-RateLimit-Reset", allowance.reset_after);
            response
        }
        Err(retry_after) => (
            StatusCode::TOO_MANY_REQUESTS,
            [
                ("Retry-After", retry_after.to_string()),
                ("X-RateLimit-Remaining", "0".to_string()),
            ],
            format!("Rate limit exceeded. Try again in {} seconds.", retry_after),
        )
            .into_response(),
    }
}

fn set_count_header(response: &mut Response, name: &'static str, value: u64) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        response.headers_mut().insert(name, value);
    }
}

/// Periodically evict stale windows so the map does not grow with every IP
/// ever seen.
pub fn spawn_eviction_task(rate_limiter: Arc<RateLimiter>, interval_secs: u64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            rate_limiter.evict_stale();
            tracing::debug!(
                windows = rate_limiter.tracked_windows(),
                "Evicted stale rate limit windows"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            enabled: true,
            api_requests_per_window: 4,
            auth_requests_per_window: 2,
            window_seconds: 600,
            cleanup_interval: 60,
        })
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(std::net::Ipv4Addr::new(10, 20, 30, last))
    }

    #[test]
    fn test_allowance_counts_down_then_blocks() {
        let limiter = limiter();

        for expected_remaining in (0..4).rev() {
            let allowance = limiter.check(ip(1), Tier::Api).unwrap();
            assert_eq!(allowance.remaining, expected_remaining);
            assert_eq!(allowance.limit, 4);
        }

        let retry_after = limiter.check(ip(1), Tier::Api).unwrap_err();
        assert!(retry_after >= 1);
    }

    #[test]
    fn test_tiers_draw_from_separate_allowances() {
        let limiter = limiter();

        limiter.check(ip(1), Tier::Auth).unwrap();
        limiter.check(ip(1), Tier::Auth).unwrap();
        assert!(limiter.check(ip(1), Tier::Auth).is_err());

        // Spent auth allowance does not touch the API one.
        assert!(limiter.check(ip(1), Tier::Api).is_ok());
    }

    #[test]
    fn test_ips_do_not_share_windows() {
        let limiter = limiter();

        for _ in 0..4 {
            limiter.check(ip(1), Tier::Api).unwrap();
        }
        assert!(limiter.check(ip(1), Tier::Api).is_err());
        assert!(limiter.check(ip(2), Tier::Api).is_ok());
    }

    #[test]
    fn test_disabled_limiter_passes_everything() {
        let mut config = RateLimitConfig::default();
        config.enabled = false;
        let limiter = RateLimiter::new(config);

        for _ in 0..1000 {
            assert!(limiter.check(ip(1), Tier::Auth).is_ok());
        }
        assert_eq!(limiter.tracked_windows(), 0);
    }

    #[test]
    fn test_eviction_keeps_live_windows() {
        let limiter = limiter();
        limiter.check(ip(1), Tier::Api).unwrap();
        assert_eq!(limiter.tracked_windows(), 1);

        limiter.evict_stale();
        assert_eq!(limiter.tracked_windows(), 1);
    }

    #[test]
    fn test_eviction_drops_turned_over_windows() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: true,
            api_requests_per_window: 4,
            auth_requests_per_window: 2,
            window_seconds: 0,
            cleanup_interval: 60,
        });
        limiter.check(ip(1), Tier::Api).unwrap();
        assert_eq!(limiter.tracked_windows(), 1);

        limiter.evict_stale();
        assert_eq!(limiter.tracked_windows(), 0);
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), "203.0.113.9".parse::<IpAddr>().unwrap());

        let request = Request::builder()
            .header("x-real-ip", "198.51.100.7")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), "198.51.100.7".parse::<IpAddr>().unwrap());

        let request = Request::builder().body(Body::empty()).unwrap();
        assert!(client_ip(&request).is_loopback());
    }
}
