use std::collections::HashMap;

use super::*;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

fn minimal() -> Vec<(&'static str, &'static str)> {
    vec![("SUPABASE_URL", "https://abc.supabase.co"), ("SUPABASE_ANON_KEY", "anon-key")]
}

// =============================================================================
// required values
// =============================================================================

#[test]
fn from_lookup_minimal_uses_defaults() {
    let cfg = BackendConfig::from_lookup(lookup_from(&minimal())).unwrap();
    assert_eq!(cfg.url, "https://abc.supabase.co");
    assert_eq!(cfg.anon_key, "anon-key");
    assert_eq!(
        cfg.timeouts,
        HttpTimeouts { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    );
    assert!(cfg.auto_refresh);
    assert!(cfg.session_file.is_none());
    assert!(cfg.site_url.is_none());
    assert_eq!(cfg.cache, CachePolicy::default());
    assert_eq!(cfg.cache.stale_after, Duration::from_secs(300));
    assert_eq!(cfg.cache.gc_after, Duration::from_secs(600));
}

#[test]
fn missing_url_is_fatal() {
    let err = BackendConfig::from_lookup(lookup_from(&[("SUPABASE_ANON_KEY", "k")])).unwrap_err();
    assert_eq!(err, ConfigError::MissingVar { var: "SUPABASE_URL" });
}

#[test]
fn missing_anon_key_is_fatal() {
    let err = BackendConfig::from_lookup(lookup_from(&[("SUPABASE_URL", "https://x.supabase.co")])).unwrap_err();
    assert_eq!(err, ConfigError::MissingVar { var: "SUPABASE_ANON_KEY" });
}

#[test]
fn blank_values_count_as_missing() {
    let err = BackendConfig::from_lookup(lookup_from(&[
        ("SUPABASE_URL", "https://x.supabase.co"),
        ("SUPABASE_ANON_KEY", "   "),
    ]))
    .unwrap_err();
    assert_eq!(err, ConfigError::MissingVar { var: "SUPABASE_ANON_KEY" });
}

#[test]
fn url_without_scheme_is_rejected() {
    let err = BackendConfig::from_lookup(lookup_from(&[
        ("SUPABASE_URL", "abc.supabase.co"),
        ("SUPABASE_ANON_KEY", "k"),
    ]))
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidUrl { .. }));
}

#[test]
fn trailing_slash_is_trimmed() {
    let cfg = BackendConfig::from_lookup(lookup_from(&[
        ("SUPABASE_URL", "https://abc.supabase.co/"),
        ("SUPABASE_ANON_KEY", "k"),
    ]))
    .unwrap();
    assert_eq!(cfg.url, "https://abc.supabase.co");
}

#[test]
fn missing_var_message_names_the_variable() {
    let err = ConfigError::MissingVar { var: "SUPABASE_URL" };
    assert!(err.to_string().contains("SUPABASE_URL"));
}

// =============================================================================
// optional values
// =============================================================================

#[test]
fn overrides_are_parsed() {
    let mut pairs = minimal();
    pairs.extend([
        ("SUPABASE_REQUEST_TIMEOUT_SECS", "42"),
        ("SUPABASE_CONNECT_TIMEOUT_SECS", "7"),
        ("SUPABASE_AUTO_REFRESH", "off"),
        ("SUPABASE_SESSION_FILE", "/tmp/session.json"),
        ("SITE_URL", "https://lucky.example/"),
        ("USER_CACHE_STALE_SECS", "1"),
        ("USER_CACHE_GC_SECS", "2"),
    ]);
    let cfg = BackendConfig::from_lookup(lookup_from(&pairs)).unwrap();
    assert_eq!(cfg.timeouts, HttpTimeouts { request_secs: 42, connect_secs: 7 });
    assert!(!cfg.auto_refresh);
    assert_eq!(cfg.session_file, Some(PathBuf::from("/tmp/session.json")));
    assert_eq!(cfg.site_url.as_deref(), Some("https://lucky.example"));
    assert_eq!(cfg.cache.stale_after, Duration::from_secs(1));
    assert_eq!(cfg.cache.gc_after, Duration::from_secs(2));
}

#[test]
fn unparsable_numbers_fall_back_to_defaults() {
    let mut pairs = minimal();
    pairs.push(("SUPABASE_REQUEST_TIMEOUT_SECS", "soon"));
    let cfg = BackendConfig::from_lookup(lookup_from(&pairs)).unwrap();
    assert_eq!(cfg.timeouts.request_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
}

#[test]
fn password_reset_redirect_uses_site_url() {
    let mut pairs = minimal();
    pairs.push(("SITE_URL", "https://lucky.example"));
    let cfg = BackendConfig::from_lookup(lookup_from(&pairs)).unwrap();
    assert_eq!(cfg.password_reset_redirect().as_deref(), Some("https://lucky.example/reset-password"));
}

#[test]
fn password_reset_redirect_absent_without_site_url() {
    let cfg = BackendConfig::from_lookup(lookup_from(&minimal())).unwrap();
    assert!(cfg.password_reset_redirect().is_none());
}

// =============================================================================
// parse_bool
// =============================================================================

#[test]
fn parse_bool_variants() {
    for v in ["1", "true", "YES", " on "] {
        assert_eq!(parse_bool(v), Some(true), "expected true for {v:?}");
    }
    for v in ["0", "false", "No", "OFF"] {
        assert_eq!(parse_bool(v), Some(false), "expected false for {v:?}");
    }
    assert_eq!(parse_bool("maybe"), None);
    assert_eq!(parse_bool(""), None);
}

#[test]
fn config_errors_carry_codes() {
    use crate::error::ErrorCode;

    let missing = BackendConfig::from_lookup(lookup_from(&[])).unwrap_err();
    assert_eq!(missing.error_code(), "E_CONFIG_MISSING");
    assert!(!missing.retryable());

    let bad_url = BackendConfig::from_lookup(lookup_from(&[
        ("SUPABASE_URL", "ftp://example.com"),
        ("SUPABASE_ANON_KEY", "anon"),
    ]))
    .unwrap_err();
    assert_eq!(bad_url.error_code(), "E_CONFIG_INVALID_URL");
}
