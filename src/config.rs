//! Backend configuration parsed from environment variables.
//!
//! DESIGN
//! ======
//! Two values are mandatory: the Supabase project URL and its public anon key.
//! Everything else has a default. Missing mandatory values are a startup-time
//! failure; the binary exits before any client is constructed.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_USER_CACHE_STALE_SECS: u64 = 5 * 60;
pub const DEFAULT_USER_CACHE_GC_SECS: u64 = 10 * 60;

const URL_VAR: &str = "SUPABASE_URL";
const ANON_KEY_VAR: &str = "SUPABASE_ANON_KEY";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration: env var {var} not set")]
    MissingVar { var: &'static str },
    #[error("invalid service url {url:?}: expected http:// or https://")]
    InvalidUrl { url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl HttpTimeouts {
    #[must_use]
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

/// How long a fetched "current user" stays fresh, and when it is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub stale_after: Duration,
    pub gc_after: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(DEFAULT_USER_CACHE_STALE_SECS),
            gc_after: Duration::from_secs(DEFAULT_USER_CACHE_GC_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Project base URL without trailing slash, e.g. `https://abc.supabase.co`.
    pub url: String,
    pub anon_key: String,
    pub timeouts: HttpTimeouts,
    pub auto_refresh: bool,
    pub session_file: Option<PathBuf>,
    pub site_url: Option<String>,
    pub cache: CachePolicy,
}

impl BackendConfig {
    /// Build config from the process environment.
    ///
    /// Required:
    /// - `SUPABASE_URL`
    /// - `SUPABASE_ANON_KEY`
    ///
    /// Optional:
    /// - `SUPABASE_REQUEST_TIMEOUT_SECS`: default 30
    /// - `SUPABASE_CONNECT_TIMEOUT_SECS`: default 10
    /// - `SUPABASE_AUTO_REFRESH`: default true
    /// - `SUPABASE_SESSION_FILE`: no persistence when absent
    /// - `SITE_URL`: base for the password-reset redirect
    /// - `USER_CACHE_STALE_SECS`: default 300
    /// - `USER_CACHE_GC_SECS`: default 600
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required value is missing or blank.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`BackendConfig::from_env`] with an injectable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required value is missing or blank.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = required(&lookup, URL_VAR)?
            .trim_end_matches('/')
            .to_owned();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::InvalidUrl { url });
        }
        let anon_key = required(&lookup, ANON_KEY_VAR)?;

        let timeouts = HttpTimeouts {
            request_secs: parse_or(&lookup, "SUPABASE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_or(&lookup, "SUPABASE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let auto_refresh = lookup("SUPABASE_AUTO_REFRESH")
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(true);
        let session_file = lookup("SUPABASE_SESSION_FILE")
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let site_url = lookup("SITE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_owned())
            .filter(|v| !v.is_empty());
        let cache = CachePolicy {
            stale_after: Duration::from_secs(parse_or(&lookup, "USER_CACHE_STALE_SECS", DEFAULT_USER_CACHE_STALE_SECS)),
            gc_after: Duration::from_secs(parse_or(&lookup, "USER_CACHE_GC_SECS", DEFAULT_USER_CACHE_GC_SECS)),
        };

        Ok(Self { url, anon_key, timeouts, auto_refresh, session_file, site_url, cache })
    }

    /// Redirect target embedded in password-reset emails.
    #[must_use]
    pub fn password_reset_redirect(&self) -> Option<String> {
        self.site_url
            .as_ref()
            .map(|site| format!("{site}/reset-password"))
    }
}

fn required<F>(lookup: &F, var: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingVar { var })
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
