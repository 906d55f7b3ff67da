//! Process configuration, read once from the environment at startup.

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

const DEV_JWT_SECRET: &str = "development-only-jwt-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    /// Listening port
    pub port: u16,

    /// MongoDB connection string. Startup halts when absent.
    pub mongo_uri: Option<String>,

    /// Database used when the URI does not name one
    pub database_name: String,

    /// Server selection timeout for the initial connection
    pub db_connect_timeout: Duration,

    // === Authentication ===
    pub jwt_secret: String,
    pub jwt_expires_in: Duration,
    pub bcrypt_cost: u32,

    // === Request limits ===
    /// Requests allowed per client per window, 0 disables limiting
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    pub body_limit: usize,
    pub request_timeout: Duration,

    /// Allowed CORS origins, empty means any
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET is not set, using the development secret");
            DEV_JWT_SECRET.to_string()
        });

        Self {
            port: parse_or(&lookup, "PORT", 3000),
            mongo_uri: lookup("MONGO_URI").filter(|uri| !uri.trim().is_empty()),
            database_name: lookup("MONGO_DB_NAME").unwrap_or_else(|| "posts_api".to_string()),
            db_connect_timeout: Duration::from_secs(parse_or(&lookup, "DB_CONNECT_TIMEOUT_SECS", 10)),

            jwt_secret,
            jwt_expires_in: Duration::from_secs(
                parse_or::<u64, _>(&lookup, "JWT_EXPIRES_IN_DAYS", 7).saturating_mul(24 * 3600),
            ),
            bcrypt_cost: parse_or(&lookup, "BCRYPT_COST", bcrypt::DEFAULT_COST),

            rate_limit_max: parse_or(&lookup, "RATE_LIMIT_MAX", 100),
            rate_limit_window: Duration::from_secs(parse_or(&lookup, "RATE_LIMIT_WINDOW_SECS", 15 * 60)),
            body_limit: parse_or(&lookup, "BODY_LIMIT_BYTES", 100 * 1024),
            request_timeout: Duration::from_secs(parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30)),

            cors_origins: lookup("CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Ignoring unparseable setting, using default");
            default
        }),
        None => default,
    }
}
