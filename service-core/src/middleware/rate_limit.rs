use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
};
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

/// Idle keys are dropped every this many checks.
const PRUNE_EVERY: u64 = 1024;

/// Rate limiter keyed by the peer IP address.
pub struct IpRateLimiter {
    limiter: RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>,
    checks: AtomicU64,
}

impl IpRateLimiter {
    fn with_quota(quota: Quota) -> Self {
        Self {
            limiter: RateLimiter::dashmap(quota),
            checks: AtomicU64::new(0),
        }
    }

    /// `Err` carries how long the caller should wait.
    pub fn check(&self, ip: &IpAddr) -> Result<(), Duration> {
        if self.checks.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune();
        }
        self.limiter
            .check_key(ip)
            .map_err(|negative| negative.wait_time_from(DefaultClock::default().now()))
    }

    /// Forget keys whose quota has fully replenished.
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Number of IPs currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.limiter.len()
    }
}

/// Create a per-IP limiter allowing `per_minute` requests with a matching burst.
pub fn create_ip_rate_limiter(per_minute: u32) -> Arc<IpRateLimiter> {
    let per_minute = NonZeroU32::new(per_minute.max(1)).unwrap_or(NonZeroU32::MIN);
    Arc::new(IpRateLimiter::with_quota(Quota::per_minute(per_minute)))
}

/// Socket peer only. Client-supplied forwarding headers are not trusted.
fn client_ip(request: &Request) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Middleware for IP-based rate limiting.
pub async fn ip_rate_limit_middleware(
    State(limiter): State<Arc<IpRateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match client_ip(&request) {
        Some(ip) => match limiter.check(&ip) {
            Ok(()) => Ok(next.run(request).await),
            Err(wait_time) => Err(AppError::TooManyRequests(
                "Too many requests from this IP. Please try again later.".to_string(),
                Some(wait_time.as_secs().max(1)),
            )),
        },
        None => {
            tracing::warn!("Could not determine IP for rate limiting");
            Ok(next.run(request).await)
        }
    }
}
