//! Client-side session layer.
//!
//! ARCHITECTURE
//! ============
//! `UserCache` is the only path to the backend's "current user". `SessionStore`
//! wraps it in an observable state machine, and `RouteGate` derives redirect
//! decisions from that state. Components never query identity directly.

pub mod cache;
pub mod guard;
pub mod store;

use serde::Serialize;

use crate::backend::AuthUser;

pub use cache::UserCache;
pub use guard::{GatePolicy, GateView, History, Navigator, Redirect, Route, RouteGate, drive_gate, find_route};
pub use store::SessionStore;

/// Identity summary derived from the backend's auth record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: Option<String>,
    pub full_name: Option<String>,
}

impl From<&AuthUser> for User {
    fn from(user: &AuthUser) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone().unwrap_or_default(),
            username: user.metadata_str("username").map(str::to_owned),
            full_name: user.metadata_str("full_name").map(str::to_owned),
        }
    }
}

/// Observable session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Loading,
    Ready(Option<User>),
}

impl SessionState {
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Ready(user) => user.as_ref(),
            Self::Uninitialized | Self::Loading => None,
        }
    }

    /// Anything short of `Ready` renders as loading.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        !matches!(self, Self::Ready(_))
    }

    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.user().is_some()
    }
}
