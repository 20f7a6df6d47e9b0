//! Backend wire types and errors.
//!
//! Shapes follow the hosted GoTrue (`/auth/v1`) and PostgREST (`/rest/v1`)
//! JSON payloads. Only the fields this client reads are modeled; unknown
//! fields are ignored.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// =============================================================================
// ERROR
// =============================================================================

/// Failure reported by (or while talking to) the hosted backend.
///
/// `Clone` because one fetch result can be handed to several coalesced waiters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    /// HTTP status when the server answered; `None` for transport failures.
    pub status: Option<u16>,
    /// Machine-readable error code when the server supplied one.
    pub code: Option<String>,
    /// Raw human-readable message as sent by the server.
    pub message: String,
}

impl BackendError {
    #[must_use]
    pub fn new(status: Option<u16>, code: Option<String>, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into() }
    }

    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, Some("transport".into()), message)
    }

    #[must_use]
    pub fn session_missing() -> Self {
        Self::new(None, Some("session_missing".into()), "Auth session missing!")
    }

    #[must_use]
    pub fn kind(&self) -> BackendErrorKind {
        BackendErrorKind::classify(self)
    }
}

/// Closed classification of backend failures the client reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
    InvalidCredentials,
    EmailNotConfirmed,
    RateLimited,
    InvalidEmail,
    UserAlreadyRegistered,
    WeakPassword,
    SessionMissing,
    Other,
}

/// How a rule matches a raw backend message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRule {
    Exact(&'static str),
    Contains(&'static str),
}

impl MessageRule {
    #[must_use]
    pub fn matches(self, raw: &str) -> bool {
        match self {
            Self::Exact(s) => raw == s,
            Self::Contains(s) => raw.contains(s),
        }
    }
}

/// Known backend messages, checked in order.
pub const KNOWN_BACKEND_MESSAGES: &[(MessageRule, BackendErrorKind)] = &[
    (MessageRule::Exact("Invalid login credentials"), BackendErrorKind::InvalidCredentials),
    (MessageRule::Exact("Email not confirmed"), BackendErrorKind::EmailNotConfirmed),
    (MessageRule::Exact("Too many requests"), BackendErrorKind::RateLimited),
    (MessageRule::Exact("User already registered"), BackendErrorKind::UserAlreadyRegistered),
    (MessageRule::Contains("already registered"), BackendErrorKind::UserAlreadyRegistered),
    (MessageRule::Exact("Password should be at least 6 characters"), BackendErrorKind::WeakPassword),
    (MessageRule::Contains("Invalid email"), BackendErrorKind::InvalidEmail),
    (MessageRule::Exact("Auth session missing!"), BackendErrorKind::SessionMissing),
];

/// Machine codes newer GoTrue releases send alongside the message.
const KNOWN_BACKEND_CODES: &[(&str, BackendErrorKind)] = &[
    ("invalid_credentials", BackendErrorKind::InvalidCredentials),
    ("email_not_confirmed", BackendErrorKind::EmailNotConfirmed),
    ("over_request_rate_limit", BackendErrorKind::RateLimited),
    ("user_already_exists", BackendErrorKind::UserAlreadyRegistered),
    ("email_exists", BackendErrorKind::UserAlreadyRegistered),
    ("weak_password", BackendErrorKind::WeakPassword),
    ("email_address_invalid", BackendErrorKind::InvalidEmail),
    ("session_missing", BackendErrorKind::SessionMissing),
];

impl BackendErrorKind {
    /// Classify by raw message first, then by machine code, then by status.
    #[must_use]
    pub fn classify(err: &BackendError) -> Self {
        if let Some((_, kind)) = KNOWN_BACKEND_MESSAGES
            .iter()
            .find(|(rule, _)| rule.matches(&err.message))
        {
            return *kind;
        }
        if let Some(code) = err.code.as_deref() {
            if let Some((_, kind)) = KNOWN_BACKEND_CODES.iter().find(|(c, _)| *c == code) {
                return *kind;
            }
        }
        if err.status == Some(429) {
            return Self::RateLimited;
        }
        Self::Other
    }
}

// =============================================================================
// AUTH PAYLOADS
// =============================================================================

/// User record embedded in GoTrue responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub user_metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub email_confirmed_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl AuthUser {
    /// String-valued metadata entry; empty strings count as absent.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata
            .get(key)
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Token pair plus the user it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    /// Unix seconds. Filled from `expires_in` when the server omits it.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".into()
}

impl Session {
    /// Fill `expires_at` relative to `now_unix` when missing.
    pub fn stamp_expiry(&mut self, now_unix: i64) {
        if self.expires_at.is_none() {
            self.expires_at = Some(now_unix + self.expires_in);
        }
    }

    /// Seconds until expiry (negative once expired). Unknown expiry counts as expired.
    #[must_use]
    pub fn seconds_left(&self, now_unix: i64) -> i64 {
        self.expires_at.map_or(0, |at| at - now_unix)
    }
}

/// Metadata attached to the auth record at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUpMetadata {
    pub full_name: String,
    pub phone: Option<String>,
    pub username: String,
    pub referred_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub metadata: SignUpMetadata,
}

/// Result of a sign-up call. `session` is only present when the project
/// auto-confirms emails; the client never adopts it.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUpResponse {
    pub user: Option<AuthUser>,
    pub session: Option<Session>,
}

/// Push notification about the local auth state.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(AuthUser),
    SignedOut,
    TokenRefreshed,
    UserUpdated(AuthUser),
}

impl AuthEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SignedIn(_) => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
            Self::UserUpdated(_) => "USER_UPDATED",
        }
    }
}

// =============================================================================
// PROFILE STORE
// =============================================================================

/// Row written to `user_profiles` after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProfile {
    pub user_id: String,
    pub username: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub referred_by: Option<String>,
}

/// Row read from `user_profiles`. The table has no email column.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Columns selected by profile lookups.
pub const PROFILE_COLUMNS: &str = "id,username,full_name,phone,created_at,user_id";

/// Exact-match filter combinations supported by profile lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileFilter {
    /// Password recovery: account identifier plus phone.
    UsernameAndPhone { username: String, phone: String },
    /// Identifier recovery: full name plus phone.
    NameAndPhone { full_name: String, phone: String },
}

impl ProfileFilter {
    /// `(column, value)` pairs, all compared with `eq`.
    #[must_use]
    pub fn pairs(&self) -> [(&'static str, &str); 2] {
        match self {
            Self::UsernameAndPhone { username, phone } => [("username", username.as_str()), ("phone", phone.as_str())],
            Self::NameAndPhone { full_name, phone } => [("full_name", full_name.as_str()), ("phone", phone.as_str())],
        }
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
