//! Application state and per-client request budgets.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ota_eval::{FileUrlResolver, ResolutionEngine};
use ota_storage::BundleStore;
use tokio::sync::Mutex;

/// Fixed one-minute window per client address.
pub(crate) struct RateLimiter {
    windows: Mutex<HashMap<IpAddr, Window>>,
    per_minute: u64,
}

struct Window {
    started: Instant,
    used: u64,
}

impl RateLimiter {
    const WINDOW: Duration = Duration::from_secs(60);

    pub(crate) fn new(per_minute: u64) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            per_minute,
        }
    }

    /// Spend one request for `ip`. `Err` carries the seconds until the
    /// client's window reopens.
    pub(crate) async fn acquire(&self, ip: IpAddr) -> Result<(), u64> {
        self.acquire_at(ip, Instant::now()).await
    }

    async fn acquire_at(&self, ip: IpAddr, now: Instant) -> Result<(), u64> {
        let mut windows = self.windows.lock().await;
        windows.retain(|_, w| now.duration_since(w.started) < Self::WINDOW);

        let window = windows.entry(ip).or_insert(Window { started: now, used: 0 });
        if window.used >= self.per_minute {
            let reopens = Self::WINDOW.saturating_sub(now.duration_since(window.started));
            return Err(reopens.as_secs().max(1));
        }
        window.used += 1;
        Ok(())
    }
}

/// Shared by every handler.
pub(crate) struct AppState {
    pub(crate) engine: ResolutionEngine<Arc<dyn BundleStore>>,
    pub(crate) file_urls: Arc<dyn FileUrlResolver>,
    /// `None` disables rate limiting.
    pub(crate) rate_limiter: Option<RateLimiter>,
}

impl AppState {
    pub(crate) fn new(store: Arc<dyn BundleStore>, file_urls: Arc<dyn FileUrlResolver>) -> Self {
        Self {
            engine: ResolutionEngine::new(store),
            file_urls,
            rate_limiter: None,
        }
    }

    pub(crate) fn with_rate_limit(mut self, per_minute: u64) -> Self {
        self.rate_limiter = Some(RateLimiter::new(per_minute));
        self
    }

    pub(crate) fn store(&self) -> &dyn BundleStore {
        self.engine.store().as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn budget_resets_after_window() {
        let limiter = RateLimiter::new(2);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let t0 = Instant::now();

        assert!(limiter.acquire_at(ip, t0).await.is_ok());
        assert!(limiter.acquire_at(ip, t0).await.is_ok());
        let retry = limiter.acquire_at(ip, t0 + Duration::from_secs(15)).await.unwrap_err();
        assert_eq!(retry, 45);

        assert!(limiter.acquire_at(ip, t0 + Duration::from_secs(61)).await.is_ok());
    }

    #[tokio::test]
    async fn clients_have_separate_budgets() {
        let limiter = RateLimiter::new(1);
        let t0 = Instant::now();
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        assert!(limiter.acquire_at(a, t0).await.is_ok());
        assert!(limiter.acquire_at(a, t0).await.is_err());
        assert!(limiter.acquire_at(b, t0).await.is_ok());
    }
}
