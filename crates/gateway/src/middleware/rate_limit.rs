//! Login throttling using a keyed token bucket
//!
//! Each account email gets its own bucket, so a burst of guesses against one
//! account does not lock out the others.

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use papervault_common::config::RateLimitConfig;
use papervault_common::errors::{AppError, Result};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Rate limiter keyed by normalized email
pub type LoginRateLimiter = DefaultKeyedRateLimiter<String>;

/// Create the login limiter. Returns `None` when limiting is disabled or the
/// configured rate is zero.
pub fn create_login_limiter(config: &RateLimitConfig) -> Option<Arc<LoginRateLimiter>> {
    if !config.enabled {
        return None;
    }

    let per_minute = NonZeroU32::new(config.login_per_minute)?;
    let burst = NonZeroU32::new(config.login_burst).unwrap_or(per_minute);
    let quota = Quota::per_minute(per_minute).allow_burst(burst);

    Some(Arc::new(RateLimiter::keyed(quota)))
}

/// Take one login attempt from the bucket of `email`
pub fn check_login(limiter: &LoginRateLimiter, email: &str) -> Result<()> {
    limiter.check_key(&email.to_string()).map_err(|_| {
        tracing::warn!(email, "Login rate limit exceeded");
        AppError::RateLimited
    })
}

/// Periodically forget buckets that have refilled completely
pub fn spawn_cleanup(limiter: Arc<LoginRateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            limiter.retain_recent();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn config(per_minute: u32, burst: u32) -> RateLimitConfig {
        RateLimitConfig {
            login_per_minute: per_minute,
            login_burst: burst,
            enabled: true,
        }
    }

    #[test]
    fn test_burst_is_per_email() {
        let limiter = create_login_limiter(&config(1, 2)).unwrap();

        assert_ok!(check_login(&limiter, "a@example.edu"));
        assert_ok!(check_login(&limiter, "a@example.edu"));
        assert!(matches!(
            check_login(&limiter, "a@example.edu"),
            Err(AppError::RateLimited)
        ));

        assert_ok!(check_login(&limiter, "b@example.edu"));
        assert_ok!(check_login(&limiter, "b@example.edu"));
        assert_err!(check_login(&limiter, "b@example.edu"));
    }

    #[test]
    fn test_disabled_limiter() {
        let mut disabled = config(10, 5);
        disabled.enabled = false;
        assert!(create_login_limiter(&disabled).is_none());
        assert!(create_login_limiter(&config(0, 5)).is_none());
    }
}
