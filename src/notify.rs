//! Transient user notifications.
//!
//! Front ends implement [`Notifier`]; the CLI logs through `tracing`, tests
//! collect into a [`ToastLog`].

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::{error, info, warn};

pub const SUCCESS_AUTO_CLOSE: Duration = Duration::from_millis(2000);
pub const DEFAULT_AUTO_CLOSE: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
    Info,
    Warning,
}

impl ToastKind {
    #[must_use]
    pub fn default_auto_close(self) -> Duration {
        match self {
            Self::Success => SUCCESS_AUTO_CLOSE,
            Self::Error | Self::Info | Self::Warning => DEFAULT_AUTO_CLOSE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
    pub auto_close: Duration,
}

impl Toast {
    #[must_use]
    pub fn new(kind: ToastKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), auto_close: kind.default_auto_close() }
    }

    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Success, message)
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Error, message)
    }

    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Info, message)
    }

    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Warning, message)
    }

    #[must_use]
    pub fn with_auto_close(mut self, auto_close: Duration) -> Self {
        self.auto_close = auto_close;
        self
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, toast: Toast);
}

/// Emits toasts as log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, toast: Toast) {
        let auto_close_ms = u64::try_from(toast.auto_close.as_millis()).unwrap_or(u64::MAX);
        match toast.kind {
            ToastKind::Success | ToastKind::Info => info!(kind = ?toast.kind, auto_close_ms, "{}", toast.message),
            ToastKind::Warning => warn!(auto_close_ms, "{}", toast.message),
            ToastKind::Error => error!(auto_close_ms, "{}", toast.message),
        }
    }
}

/// Records every toast in order.
#[derive(Debug, Default)]
pub struct ToastLog {
    toasts: Mutex<Vec<Toast>>,
}

impl ToastLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<Toast> {
        self.toasts.lock().unwrap_or_else(PoisonError::into_inner).last().cloned()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.toasts.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }
}

impl Notifier for ToastLog {
    fn notify(&self, toast: Toast) {
        self.toasts.lock().unwrap_or_else(PoisonError::into_inner).push(toast);
    }
}
