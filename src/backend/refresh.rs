//! Background token refresh.
//!
//! DESIGN
//! ======
//! A ticker wakes every `REFRESH_TICK` and refreshes the held session once it
//! is within `REFRESH_MARGIN_SECS` of expiry. Transport failures are retried
//! on the next tick; a rejected refresh token ends the session (handled in
//! [`GoTrueClient::refresh_session`]).

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::gotrue::{GoTrueClient, now_unix};
use super::types::Session;

pub const REFRESH_TICK: Duration = Duration::from_secs(30);
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Handle to the refresh loop. Dropping it stops the loop.
pub struct RefreshTask {
    handle: JoinHandle<()>,
}

impl RefreshTask {
    pub fn stop(self) {
        self.handle.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// True once the session is close enough to expiry to refresh.
#[must_use]
pub fn needs_refresh(session: &Session, now_unix: i64) -> bool {
    session.seconds_left(now_unix) <= REFRESH_MARGIN_SECS
}

/// Spawn the refresh loop for `client`.
#[must_use]
pub fn spawn_refresh_task(client: Arc<GoTrueClient>) -> RefreshTask {
    info!(tick_secs = REFRESH_TICK.as_secs(), margin_secs = REFRESH_MARGIN_SECS, "auth: auto refresh enabled");
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REFRESH_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(session) = client.session() else {
                continue;
            };
            if !needs_refresh(&session, now_unix()) {
                continue;
            }
            debug!("auth: session near expiry; refreshing");
            match client.refresh_session().await {
                Ok(s) => info!(expires_at = ?s.expires_at, "auth: session refreshed"),
                Err(e) => warn!(error = %e, "auth: session refresh failed"),
            }
        }
    });
    RefreshTask { handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::AuthUser;

    fn session_expiring_at(at: i64) -> Session {
        Session {
            access_token: "a".into(),
            refresh_token: "r".into(),
            token_type: "bearer".into(),
            expires_in: 3600,
            expires_at: Some(at),
            user: AuthUser {
                id: "u".into(),
                email: None,
                phone: None,
                user_metadata: std::collections::HashMap::new(),
                email_confirmed_at: None,
                created_at: None,
            },
        }
    }

    #[test]
    fn fresh_session_does_not_need_refresh() {
        assert!(!needs_refresh(&session_expiring_at(10_000), 1_000));
    }

    #[test]
    fn session_inside_margin_needs_refresh() {
        assert!(needs_refresh(&session_expiring_at(1_000 + REFRESH_MARGIN_SECS), 1_000));
        assert!(needs_refresh(&session_expiring_at(1_030), 1_000));
    }

    #[test]
    fn expired_session_needs_refresh() {
        assert!(needs_refresh(&session_expiring_at(500), 1_000));
    }
}
