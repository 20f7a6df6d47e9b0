//! Hosted backend: auth, profile store, and change feeds.
//!
//! DESIGN
//! ======
//! `AuthBackend` is the seam between the session layer and the network.
//! `GoTrueClient` implements it over HTTPS; tests swap in an in-memory mock.
//! Everything above this module talks to the trait, never to `reqwest`.

pub mod gotrue;
pub mod realtime;
pub mod refresh;
pub mod types;

#[cfg(test)]
pub mod test_helpers;

use tokio::sync::broadcast;

pub use gotrue::GoTrueClient;
pub use types::{
    AuthEvent, AuthUser, BackendError, BackendErrorKind, NewProfile, ProfileFilter, ProfileRow, Session,
    SignUpRequest, SignUpResponse,
};

/// Operations the session layer needs from the hosted backend.
#[async_trait::async_trait]
pub trait AuthBackend: Send + Sync {
    /// Current user for the held session. `Ok(None)` when signed out.
    async fn get_user(&self) -> Result<Option<AuthUser>, BackendError>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpResponse, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    async fn reset_password_for_email(&self, email: &str, redirect_to: Option<&str>) -> Result<(), BackendError>;

    async fn update_password(&self, new_password: &str) -> Result<AuthUser, BackendError>;

    /// Insert an extended profile row. `access_token` overrides the held session.
    async fn insert_profile(&self, profile: &NewProfile, access_token: Option<&str>) -> Result<(), BackendError>;

    /// Exact-match lookup; more than one matching row is an error.
    async fn find_profile(&self, filter: &ProfileFilter) -> Result<Option<ProfileRow>, BackendError>;

    /// Receiver for auth-state change notifications.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}
