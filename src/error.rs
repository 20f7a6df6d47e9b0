//! Stable error codes shared by every fallible surface of the crate.

/// Maps an error to a stable `E_*` code for logs and CLI output.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

impl ErrorCode for crate::config::ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingVar { .. } => "E_CONFIG_MISSING",
            Self::InvalidUrl { .. } => "E_CONFIG_INVALID_URL",
        }
    }
}

impl ErrorCode for crate::backend::realtime::RealtimeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "E_REALTIME_URL",
            Self::Connect(_) => "E_REALTIME_CONNECT",
            Self::Protocol(_) => "E_REALTIME_PROTOCOL",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Connect(_))
    }
}
