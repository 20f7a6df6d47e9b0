use super::*;

// =============================================================================
// websocket_url
// =============================================================================

#[test]
fn websocket_url_upgrades_scheme() {
    assert_eq!(
        websocket_url("https://abc.supabase.co", "key").unwrap(),
        "wss://abc.supabase.co/realtime/v1/websocket?apikey=key&vsn=1.0.0"
    );
    assert_eq!(
        websocket_url("http://127.0.0.1:54321/", "key").unwrap(),
        "ws://127.0.0.1:54321/realtime/v1/websocket?apikey=key&vsn=1.0.0"
    );
}

#[test]
fn websocket_url_rejects_other_schemes() {
    assert!(matches!(websocket_url("ftp://x", "k"), Err(RealtimeError::InvalidUrl(_))));
}

// =============================================================================
// ChangeFeed
// =============================================================================

#[test]
fn ticket_feed_is_scoped_to_user() {
    let feed = ChangeFeed::Tickets { user_id: "u-1".into() };
    assert_eq!(feed.topic(), "realtime:tickets");
    assert_eq!(feed.filter().as_deref(), Some("user_id=eq.u-1"));

    let join = feed.join_message("1", Some("jwt"));
    assert_eq!(join.event, "phx_join");
    assert_eq!(join.reference.as_deref(), Some("1"));
    let change = &join.payload["config"]["postgres_changes"][0];
    assert_eq!(change["table"], "tickets");
    assert_eq!(change["schema"], "public");
    assert_eq!(change["event"], "*");
    assert_eq!(change["filter"], "user_id=eq.u-1");
    assert_eq!(join.payload["access_token"], "jwt");
}

#[test]
fn draw_results_feed_is_unfiltered() {
    let join = ChangeFeed::DrawResults.join_message("1", None);
    let change = &join.payload["config"]["postgres_changes"][0];
    assert_eq!(change["table"], "draw_results");
    assert!(change.get("filter").is_none());
    assert!(join.payload.get("access_token").is_none());
}

#[test]
fn heartbeat_targets_phoenix_topic() {
    let json = serde_json::to_value(PhxMessage::heartbeat("7")).unwrap();
    assert_eq!(json["topic"], "phoenix");
    assert_eq!(json["event"], "heartbeat");
    assert_eq!(json["ref"], "7");
}

// =============================================================================
// parse_incoming
// =============================================================================

#[test]
fn parse_insert_change() {
    let text = r#"{"topic":"realtime:tickets","event":"postgres_changes","ref":null,"payload":{"data":{"table":"tickets","type":"INSERT","commit_timestamp":"2026-10-19T00:00:00Z","record":{"id":1},"old_record":null}}}"#;
    let Incoming::Change(change) = parse_incoming(text, "realtime:tickets").unwrap() else {
        panic!("expected change");
    };
    assert_eq!(change.kind, ChangeKind::Insert);
    assert_eq!(change.table, "tickets");
    assert_eq!(change.record["id"], 1);
    assert!(change.old_record.is_null());
    assert_eq!(change.commit_timestamp.as_deref(), Some("2026-10-19T00:00:00Z"));
}

#[test]
fn parse_change_accepts_event_type_key() {
    let text = r#"{"topic":"realtime:draw_results","event":"postgres_changes","payload":{"data":{"table":"draw_results","eventType":"DELETE","old_record":{"id":9}}}}"#;
    let Incoming::Change(change) = parse_incoming(text, "realtime:draw_results").unwrap() else {
        panic!("expected change");
    };
    assert_eq!(change.kind, ChangeKind::Delete);
    assert_eq!(change.old_record["id"], 9);
}

#[test]
fn parse_join_replies() {
    let ok = r#"{"topic":"realtime:tickets","event":"phx_reply","ref":"1","payload":{"status":"ok","response":{}}}"#;
    assert!(matches!(parse_incoming(ok, "realtime:tickets").unwrap(), Incoming::JoinReply { ok: true, .. }));
    let err = r#"{"topic":"realtime:tickets","event":"phx_reply","ref":"1","payload":{"status":"error","response":{"reason":"unauthorized"}}}"#;
    let Incoming::JoinReply { ok, detail } = parse_incoming(err, "realtime:tickets").unwrap() else {
        panic!("expected reply");
    };
    assert!(!ok);
    assert!(detail.contains("unauthorized"));
}

#[test]
fn other_topics_are_ignored() {
    let text = r#"{"topic":"phoenix","event":"phx_reply","ref":"2","payload":{"status":"ok"}}"#;
    assert_eq!(parse_incoming(text, "realtime:tickets").unwrap(), Incoming::Ignored);
}

#[test]
fn close_events_end_the_channel() {
    let text = r#"{"topic":"realtime:tickets","event":"phx_close","payload":{}}"#;
    assert_eq!(parse_incoming(text, "realtime:tickets").unwrap(), Incoming::Closed);
}

#[test]
fn malformed_frames_are_protocol_errors() {
    assert!(matches!(parse_incoming("nope", "t"), Err(RealtimeError::Protocol(_))));
    let unknown = r#"{"topic":"t","event":"postgres_changes","payload":{"data":{"type":"TRUNCATE"}}}"#;
    assert!(matches!(parse_incoming(unknown, "t"), Err(RealtimeError::Protocol(_))));
}

#[test]
fn only_connect_failures_are_retryable() {
    use crate::error::ErrorCode;

    let connect = RealtimeError::Connect("refused".into());
    assert_eq!(connect.error_code(), "E_REALTIME_CONNECT");
    assert!(connect.retryable());
    assert!(!RealtimeError::Protocol("bad frame".into()).retryable());
    assert_eq!(RealtimeError::InvalidUrl("x".into()).error_code(), "E_REALTIME_URL");
}
