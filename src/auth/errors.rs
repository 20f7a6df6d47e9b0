//! Typed auth failures and their localized messages.
//!
//! Each operation has its own table from [`BackendErrorKind`] to the message
//! shown to the user. Kinds missing from an operation's table fall back to the
//! backend's raw message.

use crate::backend::{BackendError, BackendErrorKind};
use crate::error::ErrorCode;

pub const MSG_INVALID_CREDENTIALS: &str = "이메일 또는 비밀번호가 올바르지 않습니다.";
pub const MSG_EMAIL_NOT_CONFIRMED: &str = "이메일 인증이 필요합니다. 이메일을 확인해주세요.";
pub const MSG_TOO_MANY_ATTEMPTS: &str = "너무 많은 로그인 시도가 있었습니다. 잠시 후 다시 시도해주세요.";
pub const MSG_INVALID_EMAIL: &str = "올바른 이메일 형식을 입력해주세요.";
pub const MSG_ALREADY_REGISTERED: &str = "이미 등록된 이메일입니다.";
pub const MSG_WEAK_PASSWORD: &str = "비밀번호는 최소 6자 이상이어야 합니다.";
pub const MSG_USER_NOT_FOUND: &str = "일치하는 사용자 정보를 찾을 수 없습니다.";

pub const LOGIN_MESSAGES: &[(BackendErrorKind, &str)] = &[
    (BackendErrorKind::InvalidCredentials, MSG_INVALID_CREDENTIALS),
    (BackendErrorKind::EmailNotConfirmed, MSG_EMAIL_NOT_CONFIRMED),
    (BackendErrorKind::RateLimited, MSG_TOO_MANY_ATTEMPTS),
    (BackendErrorKind::InvalidEmail, MSG_INVALID_EMAIL),
];

pub const SIGN_UP_MESSAGES: &[(BackendErrorKind, &str)] = &[
    (BackendErrorKind::UserAlreadyRegistered, MSG_ALREADY_REGISTERED),
    (BackendErrorKind::WeakPassword, MSG_WEAK_PASSWORD),
    (BackendErrorKind::InvalidEmail, MSG_INVALID_EMAIL),
];

/// Localized message for `err` under `table`, or the raw backend message.
#[must_use]
pub fn localize(table: &[(BackendErrorKind, &'static str)], err: &BackendError) -> String {
    let kind = err.kind();
    table
        .iter()
        .find(|(k, _)| *k == kind)
        .map_or_else(|| err.message.clone(), |(_, msg)| (*msg).to_owned())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    LoginFailed(String),
    #[error("{0}")]
    RegistrationFailed(String),
    #[error("{0}")]
    LogoutFailed(String),
    #[error("일치하는 사용자 정보를 찾을 수 없습니다.")]
    UserNotFound,
    #[error("{0}")]
    LookupFailed(String),
    #[error("{0}")]
    PasswordResetFailed(String),
    #[error("{0}")]
    PasswordUpdateFailed(String),
    /// Never returned from sign-up; kept so the swallowed failure has a code in logs.
    #[error("profile write failed: {0}")]
    ProfileWriteFailed(String),
}

impl AuthError {
    #[must_use]
    pub fn login(err: &BackendError) -> Self {
        Self::LoginFailed(localize(LOGIN_MESSAGES, err))
    }

    #[must_use]
    pub fn registration(err: &BackendError) -> Self {
        Self::RegistrationFailed(localize(SIGN_UP_MESSAGES, err))
    }

    /// Localized, user-facing message.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl ErrorCode for AuthError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::LoginFailed(_) => "E_LOGIN_FAILED",
            Self::RegistrationFailed(_) => "E_REGISTRATION_FAILED",
            Self::LogoutFailed(_) => "E_LOGOUT_FAILED",
            Self::UserNotFound => "E_USER_NOT_FOUND",
            Self::LookupFailed(_) => "E_LOOKUP_FAILED",
            Self::PasswordResetFailed(_) => "E_PASSWORD_RESET_FAILED",
            Self::PasswordUpdateFailed(_) => "E_PASSWORD_UPDATE_FAILED",
            Self::ProfileWriteFailed(_) => "E_PROFILE_WRITE_FAILED",
        }
    }

    /// Nothing is retried automatically; this only tells the caller whether
    /// asking the user to try again can help.
    fn retryable(&self) -> bool {
        matches!(self, Self::LogoutFailed(_) | Self::LookupFailed(_) | Self::PasswordResetFailed(_))
    }
}

#[cfg(test)]
#[path = "errors_test.rs"]
mod tests;
