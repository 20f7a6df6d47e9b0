//! Route gates layered on the session state.
//!
//! DESIGN
//! ======
//! A gate is a small state machine fed with every observed `SessionState`:
//!
//! ```text
//! Waiting --Ready(allowed)--> Open
//! Waiting --Ready(blocked)--> RedirectPending --take_redirect--> Redirected
//! ```
//!
//! The gate remembers which user it last redirected for, so re-observing the
//! same state (a refetch, a duplicate notification) never fires twice. A
//! change to a different user, or back through `Open`, arms it again.

use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;
use tracing::info;

use super::SessionState;
use crate::notify::{Notifier, Toast, ToastKind};

pub const HOME: &str = "/";
pub const GUEST_ONLY_NOTICE: &str = "이미 로그인되어 있습니다.";
pub const MEMBERS_ONLY_NOTICE: &str = "로그인이 필요합니다.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePolicy {
    /// Only visitors without a session; signed-in users are sent away.
    GuestOnly,
    /// Only signed-in users. No route in [`ROUTES`] uses it.
    MembersOnly,
}

impl GatePolicy {
    fn blocks(self, state: &SessionState) -> bool {
        match self {
            Self::GuestOnly => state.is_signed_in(),
            Self::MembersOnly => !state.is_signed_in(),
        }
    }

    fn default_notice(self) -> (ToastKind, &'static str) {
        match self {
            Self::GuestOnly => (ToastKind::Success, GUEST_ONLY_NOTICE),
            Self::MembersOnly => (ToastKind::Info, MEMBERS_ONLY_NOTICE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
    pub notice: Toast,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatePhase {
    Waiting,
    Open,
    RedirectPending(Redirect),
    Redirected,
}

/// What the guarded page should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateView {
    Loading,
    Content,
    Redirecting,
}

#[derive(Debug, Clone)]
pub struct RouteGate {
    policy: GatePolicy,
    redirect_to: String,
    notice: Toast,
    phase: GatePhase,
    /// User id the last redirect fired for; `Some(None)` means "no user".
    fired_for: Option<Option<String>>,
}

impl RouteGate {
    #[must_use]
    pub fn new(policy: GatePolicy) -> Self {
        let (kind, message) = policy.default_notice();
        Self {
            policy,
            redirect_to: HOME.to_owned(),
            notice: Toast::new(kind, message),
            phase: GatePhase::Waiting,
            fired_for: None,
        }
    }

    #[must_use]
    pub fn guest_only() -> Self {
        Self::new(GatePolicy::GuestOnly)
    }

    #[must_use]
    pub fn members_only() -> Self {
        Self::new(GatePolicy::MembersOnly)
    }

    #[must_use]
    pub fn redirect_to(mut self, path: impl Into<String>) -> Self {
        self.redirect_to = path.into();
        self
    }

    #[must_use]
    pub fn with_notice(mut self, message: impl Into<String>) -> Self {
        self.notice = Toast::new(self.notice.kind, message);
        self
    }

    #[must_use]
    pub fn policy(&self) -> GatePolicy {
        self.policy
    }

    #[must_use]
    pub fn phase(&self) -> &GatePhase {
        &self.phase
    }

    /// Feed one observed state. Arms a redirect at most once per distinct
    /// blocking state.
    pub fn observe(&mut self, state: &SessionState) -> GateView {
        if state.is_loading() {
            if !matches!(self.phase, GatePhase::RedirectPending(_) | GatePhase::Redirected) {
                self.phase = GatePhase::Waiting;
            }
            return match self.phase {
                GatePhase::Waiting | GatePhase::Open => GateView::Loading,
                GatePhase::RedirectPending(_) | GatePhase::Redirected => GateView::Redirecting,
            };
        }

        if !self.policy.blocks(state) {
            self.phase = GatePhase::Open;
            self.fired_for = None;
            return GateView::Content;
        }

        let key = state.user().map(|u| u.id.clone());
        if self.fired_for.as_ref() == Some(&key) {
            if !matches!(self.phase, GatePhase::RedirectPending(_)) {
                self.phase = GatePhase::Redirected;
            }
        } else {
            self.fired_for = Some(key);
            self.phase = GatePhase::RedirectPending(Redirect {
                to: self.redirect_to.clone(),
                notice: self.notice.clone(),
            });
        }
        GateView::Redirecting
    }

    /// Hand out the pending redirect, moving to `Redirected`.
    pub fn take_redirect(&mut self) -> Option<Redirect> {
        if !matches!(self.phase, GatePhase::RedirectPending(_)) {
            return None;
        }
        match std::mem::replace(&mut self.phase, GatePhase::Redirected) {
            GatePhase::RedirectPending(redirect) => Some(redirect),
            _ => None,
        }
    }
}

// =============================================================================
// NAVIGATION
// =============================================================================

pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// In-memory navigation history.
#[derive(Debug)]
pub struct History {
    paths: Mutex<Vec<String>>,
}

impl History {
    #[must_use]
    pub fn new(start: &str) -> Self {
        Self { paths: Mutex::new(vec![start.to_owned()]) }
    }

    #[must_use]
    pub fn current(&self) -> String {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
            .unwrap_or_else(|| HOME.to_owned())
    }

    #[must_use]
    pub fn visited(&self) -> Vec<String> {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Navigator for History {
    fn navigate(&self, path: &str) {
        info!(%path, "navigate");
        self.paths.lock().unwrap_or_else(PoisonError::into_inner).push(path.to_owned());
    }
}

/// Run `gate` against the store until it redirects. Returns the redirect that
/// was performed, or `None` if the store went away first.
pub async fn drive_gate(
    gate: &mut RouteGate,
    mut states: watch::Receiver<SessionState>,
    navigator: &dyn Navigator,
    notifier: &dyn Notifier,
) -> Option<Redirect> {
    loop {
        let state = states.borrow_and_update().clone();
        gate.observe(&state);
        if let Some(redirect) = gate.take_redirect() {
            info!(to = %redirect.to, policy = ?gate.policy(), "session: gate redirect");
            notifier.notify(redirect.notice.clone());
            navigator.navigate(&redirect.to);
            return Some(redirect);
        }
        if states.changed().await.is_err() {
            return None;
        }
    }
}

// =============================================================================
// ROUTES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub path: &'static str,
    pub title: &'static str,
    pub policy: Option<GatePolicy>,
}

impl Route {
    /// Gate for this route, if it has an access policy.
    #[must_use]
    pub fn gate(&self) -> Option<RouteGate> {
        self.policy.map(RouteGate::new)
    }
}

pub const ROUTES: &[Route] = &[
    Route { path: "/", title: "메인", policy: None },
    Route { path: "/mega-millions", title: "메가밀리언", policy: None },
    Route { path: "/powerball", title: "파워볼", policy: None },
    Route { path: "/results", title: "당첨결과", policy: None },
    Route { path: "/charge", title: "충전하기", policy: None },
    Route { path: "/events", title: "이벤트", policy: None },
    Route { path: "/register", title: "회원가입", policy: Some(GatePolicy::GuestOnly) },
    // Renders its own sign-in prompt for visitors instead of redirecting.
    Route { path: "/mypage", title: "마이페이지", policy: None },
    Route { path: "/forgot-id", title: "아이디/비밀번호 찾기", policy: Some(GatePolicy::GuestOnly) },
];

#[must_use]
pub fn find_route(path: &str) -> Option<&'static Route> {
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    ROUTES.iter().find(|r| r.path == path)
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
