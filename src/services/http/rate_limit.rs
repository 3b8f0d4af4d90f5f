use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::LedgerError;
use crate::settings::RateLimit;

const FORWARDED_FOR: &str = "x-forwarded-for";

struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by client address.
#[derive(Clone)]
pub struct RateLimiter {
    clients: Arc<DashMap<String, Window>>,
    max_requests: u32,
    window: Duration,
    trust_proxy: bool,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, trust_proxy: bool) -> Self {
        RateLimiter {
            clients: Arc::new(DashMap::new()),
            max_requests,
            window,
            trust_proxy,
        }
    }

    pub fn from_settings(settings: &RateLimit) -> Option<Self> {
        settings.enabled.then(|| {
            RateLimiter::new(
                settings.max_requests,
                settings.window(),
                settings.trust_proxy,
            )
        })
    }

    /// Counts one request for `client`, failing once its window is used up.
    pub fn check(&self, client: &str) -> Result<(), LedgerError> {
        let now = Instant::now();
        let mut window = self
            .clients
            .entry(client.to_string())
            .or_insert_with(|| Window {
                started: now,
                count: 0,
            });

        let elapsed = now.duration_since(window.started);
        if elapsed >= self.window {
            window.started = now;
            window.count = 0;
        }

        if window.count >= self.max_requests {
            let remaining = self.window.saturating_sub(elapsed);
            return Err(LedgerError::RateLimited {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }

        window.count += 1;
        Ok(())
    }

    fn client_key(&self, request: &Request) -> String {
        if self.trust_proxy {
            let forwarded = request
                .headers()
                .get(FORWARDED_FOR)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.rsplit(',').next())
                .map(str::trim)
                .filter(|hop| !hop.is_empty());

            if let Some(hop) = forwarded {
                return hop.to_string();
            }
        }

        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn sweep(&self) {
        let now = Instant::now();
        self.clients
            .retain(|_, window| now.duration_since(window.started) < self.window);
    }

    pub fn start_sweep_task(&self) {
        let limiter = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.window);

            loop {
                interval.tick().await;
                limiter.sweep();
                log::debug!("Rate limiter tracking {} clients.", limiter.clients.len());
            }
        });

        log::info!(
            "Rate limiting at {} requests per {}s per client.",
            self.max_requests,
            self.window.as_secs()
        );
    }
}

pub async fn limit_requests(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, LedgerError> {
    let client = limiter.client_key(&request);
    limiter.check(&client).inspect_err(|e| {
        log::warn!("Rate limited {} {}: {}", client, request.uri().path(), e);
    })?;

    Ok(next.run(request).await)
}
