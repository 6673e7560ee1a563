//! Process configuration: command-line flags with environment fallbacks.

use crate::middleware::RateLimitConfig;
use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(name = "rpg-vault")]
#[command(about = "RPG Vault REST backend", version)]
pub struct Config {
    /// API server port
    #[arg(long, env = "PORT", default_value_t = 4000)]
    pub port: u16,

    /// Rate limiter maximum requests per second
    #[arg(long, env = "LIMITER_RPS", default_value_t = 2.0)]
    pub limiter_rps: f64,

    /// Rate limiter maximum burst
    #[arg(long, env = "LIMITER_BURST", default_value_t = 4)]
    pub limiter_burst: u32,

    /// Enable rate limiter
    #[arg(long, env = "LIMITER_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub limiter_enabled: bool,

    /// Trusted CORS origins (space separated)
    #[arg(long, env = "CORS_TRUSTED_ORIGINS", default_value = "")]
    pub cors_trusted_origins: String,

    /// Backing file for the partitioned store
    #[arg(long, env = "DB_PATH", default_value = "rpg_vault.db")]
    pub db_path: String,

    /// Directory holding uploaded objects
    #[arg(long, env = "BLOB_DIR", default_value = "blobs")]
    pub blob_dir: String,

    /// Public URL prefix for uploaded objects
    #[arg(long, env = "BLOB_BASE_URL", default_value = "http://localhost:4000/blobs")]
    pub blob_base_url: String,

    /// Authentication token lifetime in hours
    #[arg(long, env = "TOKEN_TTL_HOURS", default_value_t = 24)]
    pub token_ttl_hours: i64,

    /// bcrypt work factor for password hashes
    #[arg(long, env = "BCRYPT_COST", default_value_t = 12)]
    pub bcrypt_cost: u32,

    /// Permission codes granted on registration (space separated)
    #[arg(
        long,
        env = "DEFAULT_PERMISSIONS",
        default_value = "worlds:read worlds:write characters:read characters:write"
    )]
    pub default_permissions: String,
}

impl Config {
    pub fn trusted_origins(&self) -> Vec<String> {
        split_words(&self.cors_trusted_origins)
    }

    pub fn default_permissions(&self) -> Vec<String> {
        split_words(&self.default_permissions)
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second: self.limiter_rps,
            burst: self.limiter_burst,
            enabled: self.limiter_enabled,
            ..RateLimitConfig::default()
        }
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours)
    }
}

fn split_words(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}
