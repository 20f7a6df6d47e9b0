//! Form models and client-side validation.
//!
//! Validation runs before any backend call and reports every failing field
//! at once. Messages are the ones shown beside each input.

use std::collections::BTreeMap;

use crate::auth::{SignUpData, contains_hangul, has_email_shape, normalize_phone};

pub const GENERAL: &str = "general";

/// Field name to message. `general` carries operation-level failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<&'static str, String>);

impl FieldErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn general(message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.set(GENERAL, message);
        errors
    }

    pub fn set(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    /// Clear one field, as when the user starts typing in it again.
    pub fn clear(&mut self, field: &str) {
        self.0.remove(field);
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

// =============================================================================
// INPUT FILTERS
// =============================================================================

/// Drop everything but ASCII letters, digits, `@`, `.` and `-`.
#[must_use]
pub fn sanitize_email_input(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '-'))
        .collect()
}

const PHONE_PART_LEN: [usize; 3] = [3, 4, 4];

/// Mobile number entered as three boxes (`010`, `1234`, `5678`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhoneInput {
    parts: [String; 3],
}

impl PhoneInput {
    /// Split a typed number: either dash separated or eleven bare digits.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut input = Self::default();
        let pieces: Vec<&str> = raw.split('-').map(str::trim).collect();
        if pieces.len() == 3 {
            for (i, piece) in pieces.into_iter().enumerate() {
                input.set_part(i, piece);
            }
            return input;
        }
        let digits = normalize_phone(raw);
        let mut rest = digits.as_str();
        for (i, len) in PHONE_PART_LEN.iter().enumerate() {
            let split = (*len).min(rest.len());
            let (head, tail) = rest.split_at(split);
            input.set_part(i, head);
            rest = tail;
        }
        input
    }

    /// Set one box, keeping digits only and truncating to its width.
    pub fn set_part(&mut self, index: usize, raw: &str) {
        if let (Some(part), Some(len)) = (self.parts.get_mut(index), PHONE_PART_LEN.get(index)) {
            *part = normalize_phone(raw).chars().take(*len).collect();
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.parts.iter().all(|p| !p.is_empty())
    }

    #[must_use]
    pub fn full(&self) -> String {
        self.parts.concat()
    }

    fn validate(&self, errors: &mut FieldErrors) {
        if !self.is_complete() {
            errors.set("phone", "휴대폰번호를 모두 입력해주세요.");
        } else if !is_mobile_number(&self.full()) {
            errors.set("phone", "올바른 휴대폰번호 형식을 입력해주세요.");
        }
    }
}

/// `010` followed by eight digits.
#[must_use]
pub fn is_mobile_number(digits: &str) -> bool {
    digits.len() == 11 && digits.starts_with("010") && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Four to thirty lowercase ASCII letters or digits.
#[must_use]
pub fn is_valid_user_id(user_id: &str) -> bool {
    (4..=30).contains(&user_id.len())
        && user_id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

fn validate_email(email: &str, errors: &mut FieldErrors) {
    if email.is_empty() {
        errors.set("email", "이메일을 입력해주세요.");
    } else if !has_email_shape(email) {
        errors.set("email", "올바른 이메일 형식을 입력해주세요.");
    } else if contains_hangul(email) {
        errors.set("email", "이메일에는 한글이 포함될 수 없습니다.");
    }
}

// =============================================================================
// FORMS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    /// # Errors
    ///
    /// Returns every failing field.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        validate_email(&self.email, &mut errors);
        if self.password.is_empty() {
            errors.set("password", "비밀번호를 입력해주세요.");
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterForm {
    pub email: String,
    pub user_id: String,
    pub password: String,
    pub confirm_password: String,
    pub name: String,
    pub phone: PhoneInput,
    pub referral_code: String,
}

impl RegisterForm {
    /// # Errors
    ///
    /// Returns every failing field.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        validate_email(&self.email, &mut errors);

        if self.user_id.is_empty() {
            errors.set("user_id", "아이디를 입력해주세요.");
        } else if !is_valid_user_id(&self.user_id) {
            errors.set("user_id", "4~30자의 영문 소문자, 숫자만 사용 가능합니다.");
        }

        if self.password.is_empty() {
            errors.set("password", "비밀번호를 입력해주세요.");
        } else if self.password.chars().count() < 8 {
            errors.set("password", "비밀번호는 8자 이상이어야 합니다.");
        }

        if self.confirm_password.is_empty() {
            errors.set("confirm_password", "비밀번호를 다시 입력해주세요.");
        } else if self.password != self.confirm_password {
            errors.set("confirm_password", "비밀번호가 일치하지 않습니다.");
        }

        if self.name.is_empty() {
            errors.set("name", "이름을 입력해주세요.");
        }
        self.phone.validate(&mut errors);
        errors.into_result()
    }

    /// Registration payload. The profile username comes from the email, not
    /// from `user_id`.
    #[must_use]
    pub fn to_sign_up(&self) -> SignUpData {
        SignUpData {
            email: self.email.clone(),
            password: self.password.clone(),
            full_name: self.name.clone(),
            phone: self.phone.full(),
            referral_code: Some(self.referral_code.clone()).filter(|c| !c.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindIdForm {
    pub name: String,
    pub phone: PhoneInput,
}

impl FindIdForm {
    /// # Errors
    ///
    /// Returns every failing field.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.name.is_empty() {
            errors.set("name", "이름을 입력해주세요.");
        }
        self.phone.validate(&mut errors);
        errors.into_result()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindPasswordForm {
    pub user_id: String,
    pub phone: PhoneInput,
}

impl FindPasswordForm {
    /// # Errors
    ///
    /// Returns every failing field.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.user_id.is_empty() {
            errors.set("user_id", "아이디를 입력해주세요.");
        }
        self.phone.validate(&mut errors);
        errors.into_result()
    }
}

/// Second step of password recovery: prove the current password, pick a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordChangeForm {
    pub email: String,
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl PasswordChangeForm {
    /// # Errors
    ///
    /// Returns every failing field.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.email.is_empty() {
            errors.set("email", "이메일 주소를 입력해주세요.");
        } else if !has_email_shape(&self.email) {
            errors.set("email", "올바른 이메일 형식을 입력해주세요.");
        }

        if self.current_password.is_empty() {
            errors.set("current_password", "현재 비밀번호를 입력해주세요.");
        }

        if self.new_password.is_empty() {
            errors.set("new_password", "새 비밀번호를 입력해주세요.");
        } else if self.new_password.chars().count() < 6 {
            errors.set("new_password", "비밀번호는 최소 6자 이상이어야 합니다.");
        }

        if self.confirm_password.is_empty() {
            errors.set("confirm_password", "비밀번호 확인을 입력해주세요.");
        } else if self.new_password != self.confirm_password {
            errors.set("confirm_password", "비밀번호가 일치하지 않습니다.");
        }
        errors.into_result()
    }
}

#[cfg(test)]
#[path = "forms_test.rs"]
mod tests;
