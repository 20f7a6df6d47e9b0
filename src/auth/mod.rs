//! Auth operations over the hosted backend.
//!
//! DESIGN
//! ======
//! Every operation catches backend failures at its own boundary and returns a
//! typed, localized [`AuthError`]. Mutating operations finish by refreshing
//! the session store before they return, so a read right after success sees
//! the new state.
//!
//! Registration writes the extended profile row after the account exists. A
//! failed profile write is logged and otherwise ignored: the account is kept
//! even if it ends up without a profile.

pub mod errors;

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::backend::{AuthBackend, NewProfile, ProfileFilter, Session, SignUpRequest};
use crate::backend::types::SignUpMetadata;
use crate::error::ErrorCode;
use crate::session::{SessionStore, User};

pub use errors::AuthError;
use errors::MSG_INVALID_EMAIL;

/// Registration input as collected by the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpData {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub phone: String,
    pub referral_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpOutcome {
    pub user_id: Option<String>,
    /// False when the extended profile could not be written.
    pub profile_saved: bool,
}

/// Profile found by an account-recovery lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountMatch {
    pub id: String,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub created_at: Option<String>,
    pub user_id: Option<String>,
    /// The profile table has no email column; always `None`.
    pub email: Option<String>,
}

// =============================================================================
// INPUT HELPERS
// =============================================================================

/// True if `text` contains a Hangul syllable.
#[must_use]
pub fn contains_hangul(text: &str) -> bool {
    text.chars().any(|c| ('가'..='힣').contains(&c))
}

/// `local@domain.tld` with no whitespace and exactly one `@`.
#[must_use]
pub fn has_email_shape(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// Email accepted by the backend-facing operations: right shape, no Hangul.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    has_email_shape(email) && !contains_hangul(email)
}

/// Keep digits only: `010-1234-5678` becomes `01012345678`.
#[must_use]
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

/// Profile username derived from the email's local part.
#[must_use]
pub fn username_from_email(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// =============================================================================
// SERVICE
// =============================================================================

#[derive(Clone)]
pub struct AuthService {
    backend: Arc<dyn AuthBackend>,
    session: SessionStore,
    reset_redirect: Option<String>,
}

impl AuthService {
    #[must_use]
    pub fn new(backend: Arc<dyn AuthBackend>, session: SessionStore) -> Self {
        Self { backend, session, reset_redirect: None }
    }

    /// Page the password-reset email links back to.
    #[must_use]
    pub fn with_reset_redirect(mut self, url: Option<String>) -> Self {
        self.reset_redirect = url;
        self
    }

    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// [`AuthError::LoginFailed`] with a localized message. A malformed email
    /// is rejected before any network call.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        if !is_valid_email(email) {
            return Err(AuthError::LoginFailed(MSG_INVALID_EMAIL.into()));
        }
        let session = self
            .backend
            .sign_in_with_password(email, password)
            .await
            .map_err(|e| {
                warn!(error = %e, kind = ?e.kind(), "auth: sign-in failed");
                AuthError::login(&e)
            })?;
        info!(user_id = %session.user.id, "auth: signed in");
        self.session.refetch().await;
        Ok(session)
    }

    /// Create an account, then its profile row. Never signs the user in.
    ///
    /// # Errors
    ///
    /// [`AuthError::RegistrationFailed`] when the account itself could not be
    /// created. Profile write failures do not fail the call.
    pub async fn sign_up(&self, data: &SignUpData) -> Result<SignUpOutcome, AuthError> {
        if !is_valid_email(&data.email) {
            return Err(AuthError::RegistrationFailed(MSG_INVALID_EMAIL.into()));
        }
        let phone = Some(normalize_phone(&data.phone)).filter(|p| !p.is_empty());
        let referred_by = non_empty(data.referral_code.as_deref()).map(str::to_owned);
        let username = username_from_email(&data.email).to_owned();
        let request = SignUpRequest {
            email: data.email.clone(),
            password: data.password.clone(),
            metadata: SignUpMetadata {
                full_name: data.full_name.clone(),
                phone: phone.clone(),
                username: username.clone(),
                referred_by: referred_by.clone(),
            },
        };

        let response = self.backend.sign_up(&request).await.map_err(|e| {
            warn!(error = %e, kind = ?e.kind(), "auth: sign-up failed");
            AuthError::registration(&e)
        })?;

        let mut outcome = SignUpOutcome { user_id: None, profile_saved: false };
        if let Some(user) = &response.user {
            info!(user_id = %user.id, "auth: account created");
            outcome.user_id = Some(user.id.clone());
            let profile = NewProfile {
                user_id: user.id.clone(),
                username,
                full_name: data.full_name.clone(),
                phone,
                referred_by,
            };
            let token = response.session.as_ref().map(|s| s.access_token.as_str());
            match self.backend.insert_profile(&profile, token).await {
                Ok(()) => {
                    info!(user_id = %user.id, "auth: profile created");
                    outcome.profile_saved = true;
                }
                Err(e) => {
                    let err = AuthError::ProfileWriteFailed(e.message);
                    warn!(user_id = %user.id, code = err.error_code(), error = %err, "auth: profile write failed; keeping account");
                }
            }
        } else {
            warn!("auth: sign-up returned no user; profile not written");
        }

        self.session.refetch().await;
        Ok(outcome)
    }

    /// End the session and clear the cached user.
    ///
    /// # Errors
    ///
    /// [`AuthError::LogoutFailed`] with the backend's message.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.backend.sign_out().await.map_err(|e| {
            warn!(error = %e, "auth: sign-out failed");
            AuthError::LogoutFailed(e.message)
        })?;
        self.session.clear();
        info!("auth: signed out");
        Ok(())
    }

    /// Send a password-reset email.
    ///
    /// # Errors
    ///
    /// [`AuthError::PasswordResetFailed`]; malformed emails are rejected locally.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        if !is_valid_email(email) {
            return Err(AuthError::PasswordResetFailed(MSG_INVALID_EMAIL.into()));
        }
        self.backend
            .reset_password_for_email(email, self.reset_redirect.as_deref())
            .await
            .map_err(|e| {
                warn!(error = %e, "auth: password reset request failed");
                AuthError::PasswordResetFailed(e.message)
            })?;
        info!("auth: password reset email requested");
        Ok(())
    }

    /// Change the password of the signed-in user.
    ///
    /// # Errors
    ///
    /// [`AuthError::PasswordUpdateFailed`], including when no session exists.
    pub async fn update_password(&self, new_password: &str) -> Result<User, AuthError> {
        let user = self.backend.update_password(new_password).await.map_err(|e| {
            warn!(error = %e, "auth: password update failed");
            AuthError::PasswordUpdateFailed(e.message)
        })?;
        info!(user_id = %user.id, "auth: password updated");
        self.session.refetch().await;
        Ok(User::from(&user))
    }

    /// Look up a profile for account recovery.
    ///
    /// `user_id` + `phone` searches by username; otherwise `name` + `phone`
    /// searches by full name. Any other combination finds nothing.
    ///
    /// # Errors
    ///
    /// [`AuthError::UserNotFound`] when nothing matches,
    /// [`AuthError::LookupFailed`] when the query itself fails.
    pub async fn find_account_by_info(
        &self,
        user_id: Option<&str>,
        name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<AccountMatch, AuthError> {
        let phone = non_empty(phone).map(normalize_phone).filter(|p| !p.is_empty());
        let filter = match (non_empty(user_id), non_empty(name), phone) {
            (Some(username), _, Some(phone)) => ProfileFilter::UsernameAndPhone { username: username.to_owned(), phone },
            (None, Some(full_name), Some(phone)) => {
                ProfileFilter::NameAndPhone { full_name: full_name.to_owned(), phone }
            }
            _ => return Err(AuthError::UserNotFound),
        };

        let row = self.backend.find_profile(&filter).await.map_err(|e| {
            warn!(error = %e, "auth: profile lookup failed");
            AuthError::LookupFailed(e.message)
        })?;
        let Some(row) = row else {
            info!("auth: no profile matched");
            return Err(AuthError::UserNotFound);
        };
        Ok(AccountMatch {
            id: row.id,
            username: row.username,
            full_name: row.full_name,
            phone: row.phone,
            created_at: row.created_at,
            user_id: row.user_id,
            email: None,
        })
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
