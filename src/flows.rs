//! Form submit handlers.
//!
//! Each handler validates its form, runs the auth operation, and reports the
//! outcome the way the storefront does: a toast for every result, plus a
//! `general` field error when the operation failed. Nothing is retried.

use std::sync::Arc;

use tracing::warn;

use crate::auth::{AccountMatch, AuthError, AuthService, SignUpOutcome};
use crate::error::ErrorCode;
use crate::forms::{FieldErrors, FindIdForm, FindPasswordForm, LoginForm, PasswordChangeForm, RegisterForm};
use crate::notify::{DEFAULT_AUTO_CLOSE, Notifier, Toast};
use crate::session::Navigator;
use crate::session::guard::HOME;

pub const LOGIN_OK: &str = "로그인되었습니다!";
pub const LOGIN_FAILED: &str = "로그인에 실패했습니다.";
pub const REGISTER_OK: &str = "회원가입이 완료되었습니다! 이제 로그인해주세요.";
pub const REGISTER_FAILED: &str = "회원가입에 실패했습니다. 다시 시도해주세요.";
pub const FIND_ID_OK: &str = "아이디를 찾았습니다!";
pub const FIND_ID_FAILED: &str = "일치하는 정보를 찾을 수 없습니다. 이름과 휴대폰번호를 확인해주세요.";
pub const FIND_PASSWORD_OK: &str = "사용자 정보가 확인되었습니다. 비밀번호를 변경해주세요.";
pub const FIND_PASSWORD_FAILED: &str = "일치하는 정보를 찾을 수 없습니다. 아이디와 휴대폰번호를 확인해주세요.";
pub const CURRENT_PASSWORD_WRONG: &str = "현재 비밀번호가 올바르지 않습니다.";
pub const PASSWORD_CHANGE_FAILED: &str = "비밀번호 변경에 실패했습니다. 다시 시도해주세요.";
pub const PASSWORD_CHANGE_OK: &str = "비밀번호가 성공적으로 변경되었습니다!";
pub const LOGOUT_OK: &str = "로그아웃되었습니다!";
pub const LOGOUT_FAILED: &str = "로그아웃에 실패했습니다. 다시 시도해주세요.";

/// Message for `err`, or `fallback` when the error carries none.
fn message_or(err: &AuthError, fallback: &str) -> String {
    let message = err.message();
    if message.trim().is_empty() { fallback.to_owned() } else { message }
}

#[derive(Clone)]
pub struct Flows {
    auth: AuthService,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
}

impl Flows {
    #[must_use]
    pub fn new(auth: AuthService, notifier: Arc<dyn Notifier>, navigator: Arc<dyn Navigator>) -> Self {
        Self { auth, notifier, navigator }
    }

    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    fn fail(&self, message: String) -> FieldErrors {
        self.notifier.notify(Toast::error(message.clone()));
        FieldErrors::general(message)
    }

    /// Login modal submit. Closes the modal on success; never navigates.
    ///
    /// # Errors
    ///
    /// Field errors from validation (no toast), or a `general` error after a
    /// failed sign-in.
    pub async fn login(&self, form: &LoginForm) -> Result<(), FieldErrors> {
        form.validate()?;
        match self.auth.sign_in(&form.email, &form.password).await {
            Ok(_) => {
                self.notifier.notify(Toast::success(LOGIN_OK));
                self.auth.session().close_login_modal();
                Ok(())
            }
            Err(e) => Err(self.fail(message_or(&e, LOGIN_FAILED))),
        }
    }

    /// Registration page submit. Leaves the visitor signed out.
    ///
    /// # Errors
    ///
    /// Field errors from validation, or a `general` error after a failed
    /// registration.
    pub async fn register(&self, form: &RegisterForm) -> Result<SignUpOutcome, FieldErrors> {
        form.validate()?;
        match self.auth.sign_up(&form.to_sign_up()).await {
            Ok(outcome) => {
                self.notifier
                    .notify(Toast::success(REGISTER_OK).with_auto_close(DEFAULT_AUTO_CLOSE));
                Ok(outcome)
            }
            Err(e) => Err(self.fail(message_or(&e, REGISTER_FAILED))),
        }
    }

    /// "Forgot ID" tab. Returns the account identifier.
    ///
    /// # Errors
    ///
    /// Field errors from validation, or a `general` error when nothing matched.
    pub async fn find_id(&self, form: &FindIdForm) -> Result<String, FieldErrors> {
        form.validate()?;
        let phone = form.phone.full();
        match self.auth.find_account_by_info(None, Some(&form.name), Some(&phone)).await {
            Ok(AccountMatch { username: Some(username), .. }) => {
                self.notifier.notify(Toast::success(FIND_ID_OK));
                Ok(username)
            }
            Ok(_) => Err(self.fail(FIND_ID_FAILED.to_owned())),
            Err(e) => Err(self.fail(message_or(&e, FIND_ID_FAILED))),
        }
    }

    /// "Forgot password" tab, first step: confirm the account exists.
    ///
    /// # Errors
    ///
    /// Field errors from validation, or a `general` error when nothing matched.
    pub async fn find_password(&self, form: &FindPasswordForm) -> Result<AccountMatch, FieldErrors> {
        form.validate()?;
        let phone = form.phone.full();
        match self
            .auth
            .find_account_by_info(Some(&form.user_id), None, Some(&phone))
            .await
        {
            Ok(found) => {
                self.notifier.notify(Toast::success(FIND_PASSWORD_OK));
                Ok(found)
            }
            Err(e) => Err(self.fail(message_or(&e, FIND_PASSWORD_FAILED))),
        }
    }

    /// "Forgot password" tab, second step: sign in with the current password,
    /// set the new one, then sign out again.
    ///
    /// # Errors
    ///
    /// Field errors from validation, or a `general` error when the current
    /// password is wrong or the update fails.
    pub async fn change_password(&self, form: &PasswordChangeForm) -> Result<(), FieldErrors> {
        form.validate()?;
        if let Err(e) = self.auth.sign_in(&form.email, &form.current_password).await {
            warn!(code = e.error_code(), "flows: current password rejected");
            return Err(self.fail(CURRENT_PASSWORD_WRONG.to_owned()));
        }
        if let Err(e) = self.auth.update_password(&form.new_password).await {
            warn!(error = %e, "flows: password update failed");
            return Err(self.fail(PASSWORD_CHANGE_FAILED.to_owned()));
        }
        self.notifier.notify(Toast::success(PASSWORD_CHANGE_OK));
        if let Err(e) = self.auth.sign_out().await {
            warn!(error = %e, "flows: sign-out after password change failed");
        }
        Ok(())
    }

    /// My-page logout button: sign out, then go home.
    ///
    /// # Errors
    ///
    /// Returns the sign-out failure after showing an error toast; the visitor
    /// stays where they are.
    pub async fn logout(&self) -> Result<(), AuthError> {
        match self.auth.sign_out().await {
            Ok(()) => {
                self.notifier.notify(Toast::success(LOGOUT_OK));
                self.navigator.navigate(HOME);
                Ok(())
            }
            Err(e) => {
                self.notifier.notify(Toast::error(LOGOUT_FAILED));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "flows_test.rs"]
mod tests;
