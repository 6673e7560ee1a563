//! Request pipeline layers.
//!
//! This module provides:
//! - Panic recovery
//! - CORS for trusted origins
//! - Rate limiting per client address
//! - Request logging with latency tracking

pub mod cors;
pub mod logging;
pub mod rate_limit;
pub mod recovery;

pub use cors::{cors_layer, forward_untrusted_preflight, TrustedOrigins};
pub use logging::request_logging;
pub use rate_limit::{rate_limit_middleware, RateLimitConfig, RateLimiter, SweeperHandle};
pub use recovery::recover_panic;
