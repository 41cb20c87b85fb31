//! Login credentials and username rules

use crate::error::{ChatError, ChatResult};
use crate::types::{USERNAME_MAX_CHARS, USERNAME_MIN_CHARS};

/// Admin login configuration
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl AdminCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Load credentials from ADMIN_USER and ADMIN_PASSWORD
    pub fn from_env() -> Self {
        let username = std::env::var("ADMIN_USER")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let password = std::env::var("ADMIN_PASSWORD")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        match (username, password) {
            (Some(username), Some(password)) => {
                tracing::info!(username = %username, "Admin credentials loaded");
                Self { username, password }
            }
            (username, password) => {
                if username.is_some() || password.is_some() {
                    tracing::warn!(
                        "ADMIN_USER and ADMIN_PASSWORD must both be set; falling back to defaults"
                    );
                }
                tracing::warn!(
                    "Using DEFAULT admin credentials (admin/password) - set ADMIN_USER and ADMIN_PASSWORD!"
                );
                Self::new("admin", "password")
            }
        }
    }

    pub fn validate(&self, username: &str, password: &str) -> bool {
        constant_time_eq(self.username.as_bytes(), username.as_bytes())
            && constant_time_eq(self.password.as_bytes(), password.as_bytes())
    }
}

/// Trim and check a login name. Returns the trimmed name.
pub fn validate_username(username: &str) -> ChatResult<String> {
    let trimmed = username.trim();
    let len = trimmed.chars().count();
    if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&len) {
        return Err(ChatError::InvalidUsername);
    }
    Ok(trimmed.to_string())
}

/// Constant-time byte comparison to prevent timing attacks
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
