use crate::error::AppError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
};
use std::{net::IpAddr, num::NonZeroU32, sync::Arc, time::Duration};

/// Rate limiter keyed by client IP address
pub type IpRateLimiter = Arc<RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>>;

fn quota(attempts: u32, window_seconds: u64) -> Quota {
    let attempts = NonZeroU32::new(attempts).unwrap_or(NonZeroU32::MIN);
    let period_ms = (window_seconds.max(1) * 1000) / u64::from(attempts.get());
    let period = Duration::from_millis(period_ms.max(1));

    // `with_period` only rejects a zero period, which the max(1) above rules out.
    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(attempts))
        .allow_burst(attempts)
}

/// Create a keyed rate limiter allowing `attempts` per `window_seconds` per IP
pub fn create_ip_rate_limiter(attempts: u32, window_seconds: u64) -> IpRateLimiter {
    Arc::new(RateLimiter::dashmap(quota(attempts, window_seconds)))
}

fn client_ip(request: &Request) -> Option<IpAddr> {
    let forwarded_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok());

    forwarded_ip.or_else(|| {
        request
            .extensions()
            .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
            .map(|axum::extract::ConnectInfo(addr)| addr.ip())
    })
}

/// Middleware for IP-based rate limiting
pub async fn ip_rate_limit_middleware(
    State(limiter): State<IpRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match client_ip(&request) {
        Some(ip) => match limiter.check_key(&ip) {
            Ok(_) => Ok(next.run(request).await),
            Err(negative) => {
                let wait_time = negative.wait_time_from(DefaultClock::default().now());
                tracing::warn!(ip = %ip, "Rate limit exceeded");
                Err(AppError::TooManyRequests(
                    "Too many requests from this IP. Please try again later.".to_string(),
                    Some(wait_time.as_secs()),
                ))
            }
        },
        None => {
            tracing::warn!("Could not determine IP for rate limiting");
            Ok(next.run(request).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_allows_burst_then_rejects() {
        let limiter = create_ip_rate_limiter(2, 60);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();

        assert!(limiter.check_key(&ip).is_ok());
        assert!(limiter.check_key(&ip).is_ok());
        assert!(limiter.check_key(&ip).is_err());

        let other: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(limiter.check_key(&other).is_ok());
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        let limiter = create_ip_rate_limiter(0, 0);
        let ip: IpAddr = "10.0.0.3".parse().unwrap();
        assert!(limiter.check_key(&ip).is_ok());
    }
}
