//! Server configuration from environment variables

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub ban_db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub static_dir: PathBuf,
    pub session_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            ban_db_path: PathBuf::from("data/db.json"),
            upload_dir: PathBuf::from("uploads"),
            static_dir: PathBuf::from("static"),
            session_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl ServerConfig {
    /// Load config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let path_var = |key: &str, default: PathBuf| {
            std::env::var(key)
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or(default)
        };

        let session_ttl = std::env::var("SESSION_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|h| *h > 0)
            .and_then(|h| h.checked_mul(60 * 60))
            .map(Duration::from_secs)
            // Session expiry is computed as now + ttl
            .filter(|ttl| Instant::now().checked_add(*ttl).is_some())
            .unwrap_or(defaults.session_ttl);

        let config = Self {
            port,
            ban_db_path: path_var("BAN_DB_PATH", defaults.ban_db_path),
            upload_dir: path_var("UPLOAD_DIR", defaults.upload_dir),
            static_dir: path_var("STATIC_DIR", defaults.static_dir),
            session_ttl,
        };

        tracing::info!(
            port = config.port,
            ban_db = %config.ban_db_path.display(),
            uploads = %config.upload_dir.display(),
            static_dir = %config.static_dir.display(),
            session_ttl_secs = config.session_ttl.as_secs(),
            "Server config loaded"
        );
        config
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}
