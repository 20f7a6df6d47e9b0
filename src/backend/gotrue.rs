//! GoTrue + PostgREST HTTP client.
//!
//! Thin `reqwest` wrapper around the hosted auth and table endpoints. Response
//! parsing lives in pure functions below the client so it can be tested
//! without a network.
//!
//! SESSION HANDLING
//! ================
//! The client owns the current session (tokens + user). Sign-in adopts the
//! returned session; sign-up never does. When a session file is configured,
//! every change is written through so a restarted process resumes signed in.
//! The file is written while the session lock is held, so it always matches
//! memory. A refresh only lands if the session it started from is still held.

use std::fs::OpenOptions;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use reqwest::header::{HeaderMap, HeaderValue};
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::AuthBackend;
use super::realtime::{self, ChangeFeed, ChannelSubscription, RealtimeError};
use super::types::{
    AuthEvent, AuthUser, BackendError, NewProfile, PROFILE_COLUMNS, ProfileFilter, ProfileRow, Session,
    SignUpRequest, SignUpResponse,
};
use crate::config::BackendConfig;

const EVENT_CHANNEL_CAPACITY: usize = 32;
const PROFILE_TABLE: &str = "user_profiles";
#[cfg(unix)]
const SESSION_FILE_MODE: u32 = 0o600;

// =============================================================================
// CLIENT
// =============================================================================

pub struct GoTrueClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: RwLock<Option<Session>>,
    session_file: Option<PathBuf>,
    events: broadcast::Sender<AuthEvent>,
}

impl GoTrueClient {
    /// Build the single long-lived client handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the anon key is not a valid header value or the
    /// HTTP client fails to build.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.anon_key)
            .map_err(|e| BackendError::transport(format!("invalid anon key header: {e}")))?;
        headers.insert("apikey", key);

        let http = reqwest::Client::builder()
            .timeout(config.timeouts.request())
            .connect_timeout(config.timeouts.connect())
            .default_headers(headers)
            .build()
            .map_err(|e| BackendError::transport(format!("http client build failed: {e}")))?;

        let session = config
            .session_file
            .as_deref()
            .and_then(load_session_file);
        if session.is_some() {
            info!("auth: restored persisted session");
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            http,
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            session: RwLock::new(session),
            session_file: config.session_file.clone(),
            events,
        })
    }

    /// Snapshot of the held session, if any.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    fn set_session(&self, session: Option<Session>) {
        let mut held = self
            .session
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.persist(session.as_ref());
        *held = session;
    }

    /// Swap in `next` only while the held session still carries
    /// `refresh_token`. A sign-out or new sign-in during the exchange wins.
    fn replace_if_current(&self, refresh_token: &str, next: Option<Session>) -> bool {
        let mut held = self
            .session
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if held.as_ref().map(|s| s.refresh_token.as_str()) != Some(refresh_token) {
            return false;
        }
        self.persist(next.as_ref());
        *held = next;
        true
    }

    fn persist(&self, session: Option<&Session>) {
        if let Some(path) = &self.session_file {
            store_session_file(path, session);
        }
    }

    fn emit(&self, event: AuthEvent) {
        info!(event = event.name(), "auth: state change");
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<String, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::transport(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::transport(e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(parse_error(status, &text));
        }
        Ok(text)
    }

    /// Exchange the held refresh token for a new session.
    ///
    /// A refresh token the server rejects ends the session locally. The result
    /// is dropped if the session was replaced or cleared while the exchange
    /// was in flight.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when no session is held, the exchange fails,
    /// or the session changed before the exchange finished.
    pub async fn refresh_session(&self) -> Result<Session, BackendError> {
        let refresh_token = self
            .session()
            .map(|s| s.refresh_token)
            .ok_or_else(BackendError::session_missing)?;

        let request = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "refresh_token")])
            .json(&serde_json::json!({ "refresh_token": refresh_token }));

        match self.execute(request).await {
            Ok(text) => {
                let session = parse_session(&text, now_unix())?;
                if !self.replace_if_current(&refresh_token, Some(session.clone())) {
                    info!("auth: session changed during refresh; discarding refreshed tokens");
                    return Err(BackendError::session_missing());
                }
                self.emit(AuthEvent::TokenRefreshed);
                Ok(session)
            }
            Err(e) if matches!(e.status, Some(400 | 401 | 403)) => {
                if self.replace_if_current(&refresh_token, None) {
                    warn!(error = %e, "auth: refresh token rejected; signing out locally");
                    self.emit(AuthEvent::SignedOut);
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Follow a table change feed, authenticated as the held session when
    /// there is one.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError`] if the websocket cannot be opened or joined.
    pub async fn subscribe_changes(&self, feed: ChangeFeed) -> Result<ChannelSubscription, RealtimeError> {
        realtime::subscribe(&self.base_url, &self.anon_key, feed, self.access_token()).await
    }
}

#[async_trait::async_trait]
impl AuthBackend for GoTrueClient {
    async fn get_user(&self) -> Result<Option<AuthUser>, BackendError> {
        let Some(token) = self.access_token() else {
            return Ok(None);
        };
        let request = self.http.get(self.auth_url("user")).bearer_auth(token);
        match self.execute(request).await {
            Ok(text) => parse_user(&text).map(Some),
            Err(e) if matches!(e.status, Some(401 | 403)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let request = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .json(&serde_json::json!({ "email": email, "password": password }));
        let text = self.execute(request).await?;
        let session = parse_session(&text, now_unix())?;
        self.set_session(Some(session.clone()));
        self.emit(AuthEvent::SignedIn(session.user.clone()));
        Ok(session)
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpResponse, BackendError> {
        let body = serde_json::json!({
            "email": request.email,
            "password": request.password,
            "data": request.metadata,
        });
        let text = self
            .execute(self.http.post(self.auth_url("signup")).json(&body))
            .await?;
        parse_sign_up(&text, now_unix())
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if let Some(token) = self.access_token() {
            let request = self.http.post(self.auth_url("logout")).bearer_auth(token);
            match self.execute(request).await {
                Ok(_) => {}
                // Session already gone server-side.
                Err(e) if matches!(e.status, Some(401 | 403 | 404)) => {}
                Err(e) => return Err(e),
            }
        }
        self.set_session(None);
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: Option<&str>) -> Result<(), BackendError> {
        let mut request = self.http.post(self.auth_url("recover"));
        if let Some(redirect) = redirect_to {
            request = request.query(&[("redirect_to", redirect)]);
        }
        self.execute(request.json(&serde_json::json!({ "email": email })))
            .await?;
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> Result<AuthUser, BackendError> {
        let token = self
            .access_token()
            .ok_or_else(BackendError::session_missing)?;
        let request = self
            .http
            .put(self.auth_url("user"))
            .bearer_auth(token)
            .json(&serde_json::json!({ "password": new_password }));
        let user = parse_user(&self.execute(request).await?)?;

        if let Some(mut held) = self.session() {
            let refresh_token = held.refresh_token.clone();
            held.user = user.clone();
            self.replace_if_current(&refresh_token, Some(held));
        }
        self.emit(AuthEvent::UserUpdated(user.clone()));
        Ok(user)
    }

    async fn insert_profile(&self, profile: &NewProfile, access_token: Option<&str>) -> Result<(), BackendError> {
        let token = access_token
            .map(str::to_owned)
            .or_else(|| self.access_token())
            .unwrap_or_else(|| self.anon_key.clone());
        let request = self
            .http
            .post(self.rest_url(PROFILE_TABLE))
            .bearer_auth(token)
            .header("Prefer", "return=representation")
            .json(profile);
        self.execute(request).await?;
        Ok(())
    }

    async fn find_profile(&self, filter: &ProfileFilter) -> Result<Option<ProfileRow>, BackendError> {
        let token = self
            .access_token()
            .unwrap_or_else(|| self.anon_key.clone());
        let mut query: Vec<(&str, String)> = vec![("select", PROFILE_COLUMNS.to_owned())];
        query.extend(
            filter
                .pairs()
                .iter()
                .map(|(column, value)| (*column, format!("eq.{value}"))),
        );
        let request = self
            .http
            .get(self.rest_url(PROFILE_TABLE))
            .bearer_auth(token)
            .query(&query);
        parse_profile_rows(&self.execute(request).await?)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

// =============================================================================
// SESSION FILE
// =============================================================================

fn load_session_file(path: &Path) -> Option<Session> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(error = %e, path = %path.display(), "auth: session file unreadable");
            return None;
        }
    };
    match serde_json::from_str::<Session>(&raw) {
        Ok(session) => Some(session),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "auth: session file corrupt; ignoring");
            None
        }
    }
}

fn store_session_file(path: &Path, session: Option<&Session>) {
    let result = match session {
        Some(session) => serde_json::to_string(session)
            .map_err(std::io::Error::other)
            .and_then(|json| write_private(path, json.as_bytes())),
        None => match std::fs::remove_file(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        },
    };
    if let Err(e) = result {
        warn!(error = %e, path = %path.display(), "auth: session file write failed");
    }
}

/// Write `bytes` readable by the owner only. The file holds a refresh token.
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(SESSION_FILE_MODE);
    let mut file = options.open(path)?;

    // `mode` only applies on creation; tighten a file that already existed.
    #[cfg(unix)]
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(SESSION_FILE_MODE))?;

    file.write_all(bytes)?;
    file.sync_all()
}

pub(crate) fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

// =============================================================================
// PARSING
// =============================================================================

/// Build a [`BackendError`] from a non-2xx response body.
///
/// GoTrue has used several shapes over time (`msg`, `error_description`,
/// `message`); PostgREST uses `message` + string `code`.
pub(crate) fn parse_error(status: u16, body: &str) -> BackendError {
    let json: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let field = |key: &str| {
        json.as_ref()
            .and_then(|v| v.get(key))
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
    };

    let message = field("msg")
        .or_else(|| field("error_description"))
        .or_else(|| field("message"))
        .or_else(|| field("error"))
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() { format!("HTTP {status}") } else { trimmed.to_owned() }
        });
    let code = field("error_code")
        .or_else(|| field("code"))
        .or_else(|| field("error_description").and_then(|_| field("error")));

    BackendError::new(Some(status), code, message)
}

fn parse_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, BackendError> {
    serde_json::from_str(text).map_err(|e| BackendError::transport(format!("unexpected response: {e}")))
}

pub(crate) fn parse_user(text: &str) -> Result<AuthUser, BackendError> {
    parse_json(text)
}

pub(crate) fn parse_session(text: &str, now_unix: i64) -> Result<Session, BackendError> {
    let mut session: Session = parse_json(text)?;
    session.stamp_expiry(now_unix);
    Ok(session)
}

/// Sign-up answers with a full session (auto-confirm) or with the bare user
/// (confirmation email pending).
pub(crate) fn parse_sign_up(text: &str, now_unix: i64) -> Result<SignUpResponse, BackendError> {
    let value: serde_json::Value = parse_json(text)?;
    if value.get("access_token").is_some() {
        let session = parse_session(text, now_unix)?;
        return Ok(SignUpResponse { user: Some(session.user.clone()), session: Some(session) });
    }
    if let Some(user) = value.get("user").filter(|u| !u.is_null()) {
        let user: AuthUser =
            serde_json::from_value(user.clone()).map_err(|e| BackendError::transport(e.to_string()))?;
        return Ok(SignUpResponse { user: Some(user), session: None });
    }
    if value.get("id").is_some() {
        return Ok(SignUpResponse { user: Some(parse_user(text)?), session: None });
    }
    Ok(SignUpResponse { user: None, session: None })
}

/// Maybe-single semantics: zero rows is `None`, two or more is an error.
pub(crate) fn parse_profile_rows(text: &str) -> Result<Option<ProfileRow>, BackendError> {
    let mut rows: Vec<ProfileRow> = parse_json(text)?;
    match rows.len() {
        0 => Ok(None),
        1 => Ok(rows.pop()),
        n => Err(BackendError::new(
            Some(406),
            Some("PGRST116".into()),
            format!("JSON object requested, multiple (or no) rows returned ({n} rows)"),
        )),
    }
}

#[cfg(test)]
#[path = "gotrue_test.rs"]
mod tests;
