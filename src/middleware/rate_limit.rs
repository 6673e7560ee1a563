//! Rate limiting middleware.
//!
//! One token bucket per client identity with continuous refill. A background
//! sweeper evicts clients that have been idle longer than the configured
//! threshold, so distinct-client churn cannot grow the registry unbounded.

use crate::api::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// How often the sweeper wakes.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Clients unseen for longer than this are evicted.
pub const IDLE_TTL: Duration = Duration::from_secs(180);

/// Configuration for rate limiting.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Refill rate in tokens per second.
    pub requests_per_second: f64,
    /// Bucket capacity, also the initial token count.
    pub burst: u32,
    /// When false every request is allowed and no sweeper runs.
    pub enabled: bool,
    pub sweep_interval: Duration,
    pub idle_ttl: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2.0,
            burst: 4,
            enabled: true,
            sweep_interval: SWEEP_INTERVAL,
            idle_ttl: IDLE_TTL,
        }
    }
}

#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    tokens_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(tokens_per_sec: f64, burst: u32, now: Instant) -> Self {
        Self {
            capacity: burst as f64,
            tokens: burst as f64,
            tokens_per_sec,
            last_refill: now,
        }
    }

    fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.tokens_per_sec).min(self.capacity);
        self.last_refill = now;
    }
}

struct ClientBucket {
    limiter: TokenBucket,
    last_seen: Instant,
}

/// Registry of per-client buckets. Cloning shares the registry.
#[derive(Clone)]
pub struct RateLimiter {
    config: Arc<RateLimitConfig>,
    clients: Arc<Mutex<HashMap<String, ClientBucket>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: Arc::new(config),
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Consumes one token for `identity`, returning false when none is left.
    pub fn allow(&self, identity: &str) -> bool {
        if !self.config.enabled {
            return true;
        }
        self.allow_at(identity, Instant::now())
    }

    fn allow_at(&self, identity: &str, now: Instant) -> bool {
        let mut clients = self.clients.lock();
        let client = clients
            .entry(identity.to_string())
            .or_insert_with(|| ClientBucket {
                limiter: TokenBucket::new(self.config.requests_per_second, self.config.burst, now),
                last_seen: now,
            });
        client.last_seen = now;
        client.limiter.try_consume(now)
    }

    /// Evicts idle clients, returning how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let idle_ttl = self.config.idle_ttl;
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|_, client| now.saturating_duration_since(client.last_seen) <= idle_ttl);
        before - clients.len()
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().len()
    }

    /// Spawns the eviction task. Returns `None` when limiting is disabled.
    pub fn start_sweeper(&self) -> Option<SweeperHandle> {
        if !self.config.enabled {
            return None;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let limiter = self.clone();
        let every = self.config.sweep_interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.sweep();
                        if evicted > 0 {
                            debug!(
                                evicted,
                                remaining = limiter.tracked_clients(),
                                "Evicted idle rate limit clients"
                            );
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
        });

        info!(
            interval_secs = every.as_secs(),
            idle_ttl_secs = self.config.idle_ttl.as_secs(),
            "Rate limit sweeper started"
        );
        Some(SweeperHandle {
            stop: stop_tx,
            task,
        })
    }
}

/// Owns the background sweeper; stop it at shutdown.
pub struct SweeperHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(err) = self.task.await {
            warn!(error = %err, "Rate limit sweeper ended abnormally");
        }
    }
}

/// Identity used for rate limiting: the originating address, honouring
/// proxy-forwarded headers.
pub fn client_identity(request: &Request) -> String {
    let headers = request.headers();

    let forwarded = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limiting middleware function.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let identity = client_identity(&request);
    if limiter.allow(&identity) {
        next.run(request).await
    } else {
        warn!(client = %identity, "Rate limit exceeded");
        ApiError::RateLimited.into_response()
    }
}
