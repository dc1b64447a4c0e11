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
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};

/// Rate limiter keyed by IP address
pub type IpRateLimiter = Arc<RateLimiter<SocketAddr, DashMapStateStore<SocketAddr>, DefaultClock>>;

/// Create a keyed rate limiter (by IP)
pub fn create_ip_rate_limiter(attempts: u32, window_seconds: u64) -> IpRateLimiter {
    let attempts = attempts.max(1);
    let period = Duration::from_millis((window_seconds * 1000) / attempts as u64);
    let quota = Quota::with_period(period)
        .expect("Failed to create quota with valid period")
        .allow_burst(NonZeroU32::new(attempts).expect("attempts is guaranteed to be non-zero"));

    Arc::new(RateLimiter::dashmap(quota))
}

/// Middleware for IP-based rate limiting
pub async fn ip_rate_limit_middleware(
    State(limiter): State<IpRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let forwarded_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<std::net::IpAddr>().ok());

    let addr = if let Some(ip) = forwarded_ip {
        Some(SocketAddr::new(ip, 0))
    } else {
        request
            .extensions()
            .get::<axum::extract::ConnectInfo<SocketAddr>>()
            .map(|axum::extract::ConnectInfo(addr)| *addr)
    };

    match addr {
        Some(addr) => match limiter.check_key(&addr) {
            Ok(_) => Ok(next.run(request).await),
            Err(negative) => {
                let wait_time = negative.wait_time_from(DefaultClock::default().now());
                Err(AppError::TooManyRequests(
                    "Too many requests. Please try again later.".to_string(),
                    Some(wait_time.as_secs()),
                ))
            }
        },
        // No resolvable peer address: let the request through rather than
        // rate-limiting every anonymous caller into one bucket.
        None => Ok(next.run(request).await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_allows_within_quota() {
        let limiter = create_ip_rate_limiter(3, 60);
        let addr: SocketAddr = "10.0.0.1:0".parse().unwrap();

        for _ in 0..3 {
            assert!(limiter.check_key(&addr).is_ok());
        }
        assert!(limiter.check_key(&addr).is_err());
    }

    #[test]
    fn test_limiter_keys_are_independent() {
        let limiter = create_ip_rate_limiter(1, 60);
        let a: SocketAddr = "10.0.0.1:0".parse().unwrap();
        let b: SocketAddr = "10.0.0.2:0".parse().unwrap();

        assert!(limiter.check_key(&a).is_ok());
        assert!(limiter.check_key(&a).is_err());
        assert!(limiter.check_key(&b).is_ok());
    }
}
