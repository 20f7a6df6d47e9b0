//! Application wiring.
//!
//! DESIGN
//! ======
//! One `AppContext` per process: config, the HTTP backend, the session store
//! and the auth service built on top of it. It owns the background refresh
//! task. `shutdown()` detaches the store listener and stops the refresh loop;
//! dropping the context without calling it does the same through the task
//! guards.

use std::sync::Arc;

use tracing::info;

use crate::auth::AuthService;
use crate::backend::realtime::{ChangeFeed, ChannelSubscription, RealtimeError};
use crate::backend::refresh::{RefreshTask, spawn_refresh_task};
use crate::backend::{AuthBackend, BackendError, GoTrueClient};
use crate::config::BackendConfig;
use crate::flows::Flows;
use crate::notify::Notifier;
use crate::session::{Navigator, SessionStore};

pub struct AppContext {
    pub config: BackendConfig,
    pub client: Arc<GoTrueClient>,
    pub session: SessionStore,
    pub auth: AuthService,
    refresh: Option<RefreshTask>,
}

impl AppContext {
    /// Build the stack and perform the first session load. Must run inside a
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the HTTP client cannot be constructed.
    pub async fn init(config: BackendConfig) -> Result<Self, BackendError> {
        let client = Arc::new(GoTrueClient::new(&config)?);
        let backend = Arc::clone(&client) as Arc<dyn AuthBackend>;
        let session = SessionStore::new(Arc::clone(&backend), config.cache);
        let auth = AuthService::new(backend, session.clone()).with_reset_redirect(config.password_reset_redirect());
        let refresh = config
            .auto_refresh
            .then(|| spawn_refresh_task(Arc::clone(&client)));

        let user = session.start().await;
        info!(url = %config.url, signed_in = user.is_some(), auto_refresh = refresh.is_some(), "app: initialized");
        Ok(Self { config, client, session, auth, refresh })
    }

    /// Form handlers reporting through `notifier` and navigating with `navigator`.
    #[must_use]
    pub fn flows(&self, notifier: Arc<dyn Notifier>, navigator: Arc<dyn Navigator>) -> Flows {
        Flows::new(self.auth.clone(), notifier, navigator)
    }

    /// Open a change feed as the current session.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError`] if the channel cannot be joined.
    pub async fn subscribe_feed(&self, feed: ChangeFeed) -> Result<ChannelSubscription, RealtimeError> {
        self.client.subscribe_changes(feed).await
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.refresh.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn shutdown(mut self) {
        self.session.dispose();
        if let Some(task) = self.refresh.take() {
            task.stop();
        }
        info!("app: shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    fn config(auto_refresh: &str) -> BackendConfig {
        let auto_refresh = auto_refresh.to_owned();
        BackendConfig::from_lookup(move |key| match key {
            "SUPABASE_URL" => Some("http://127.0.0.1:9".to_owned()),
            "SUPABASE_ANON_KEY" => Some("anon".to_owned()),
            "SUPABASE_AUTO_REFRESH" => Some(auto_refresh.clone()),
            "SITE_URL" => Some("https://lotto.test".to_owned()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn init_without_session_is_signed_out() {
        let app = AppContext::init(config("true")).await.unwrap();
        assert_eq!(app.session.state(), SessionState::Ready(None));
        assert!(app.session.is_listening());
        assert!(app.is_refreshing());
        app.shutdown();
    }

    #[tokio::test]
    async fn auto_refresh_can_be_disabled() {
        let app = AppContext::init(config("false")).await.unwrap();
        assert!(!app.is_refreshing());
    }

    #[tokio::test]
    async fn shutdown_detaches_listener() {
        let app = AppContext::init(config("false")).await.unwrap();
        let session = app.session.clone();
        app.shutdown();
        assert!(!session.is_listening());
    }
}
