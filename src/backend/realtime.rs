//! Realtime table change feeds over the Phoenix channel protocol.
//!
//! ARCHITECTURE
//! ============
//! One websocket per subscription. The task joins a single
//! `postgres_changes` topic, keeps the socket alive with heartbeats, and
//! forwards row changes into a bounded channel. Dropping the
//! [`ChannelSubscription`] aborts the task and closes the socket.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const PROTOCOL_VERSION: &str = "1.0.0";
const EVENT_BUFFER: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("invalid realtime url: {0}")]
    InvalidUrl(String),
    #[error("websocket connect failed: {0}")]
    Connect(String),
    #[error("realtime protocol error: {0}")]
    Protocol(String),
}

// =============================================================================
// FEEDS
// =============================================================================

/// Table feeds the storefront knows how to follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeFeed {
    Tickets { user_id: String },
    Notifications { user_id: String },
    DrawResults,
}

impl ChangeFeed {
    #[must_use]
    pub fn table(&self) -> &'static str {
        match self {
            Self::Tickets { .. } => "tickets",
            Self::Notifications { .. } => "notifications",
            Self::DrawResults => "draw_results",
        }
    }

    #[must_use]
    pub fn topic(&self) -> String {
        format!("realtime:{}", self.table())
    }

    /// Row filter in PostgREST syntax, if the feed is scoped to a user.
    #[must_use]
    pub fn filter(&self) -> Option<String> {
        match self {
            Self::Tickets { user_id } | Self::Notifications { user_id } => Some(format!("user_id=eq.{user_id}")),
            Self::DrawResults => None,
        }
    }

    #[must_use]
    pub fn join_message(&self, reference: &str, access_token: Option<&str>) -> PhxMessage {
        let mut change = json!({ "event": "*", "schema": "public", "table": self.table() });
        if let Some(filter) = self.filter() {
            change["filter"] = Value::String(filter);
        }
        let mut payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [change],
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = Value::String(token.to_owned());
        }
        PhxMessage {
            topic: self.topic(),
            event: "phx_join".into(),
            payload,
            reference: Some(reference.to_owned()),
        }
    }
}

// =============================================================================
// WIRE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhxMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhxMessage {
    #[must_use]
    pub fn heartbeat(reference: &str) -> Self {
        Self {
            topic: "phoenix".into(),
            event: "heartbeat".into(),
            payload: json!({}),
            reference: Some(reference.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single row change pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub record: Value,
    pub old_record: Value,
    pub commit_timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Incoming {
    Change(ChangeEvent),
    JoinReply { ok: bool, detail: String },
    Closed,
    Ignored,
}

/// Build the websocket endpoint from the project URL.
///
/// # Errors
///
/// Returns [`RealtimeError::InvalidUrl`] for non-http(s) base URLs.
pub fn websocket_url(base_url: &str, anon_key: &str) -> Result<String, RealtimeError> {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(RealtimeError::InvalidUrl(base_url.to_owned()));
    };
    Ok(format!("{ws_base}/realtime/v1/websocket?apikey={anon_key}&vsn={PROTOCOL_VERSION}"))
}

pub(crate) fn parse_incoming(text: &str, topic: &str) -> Result<Incoming, RealtimeError> {
    let msg: PhxMessage = serde_json::from_str(text).map_err(|e| RealtimeError::Protocol(e.to_string()))?;
    if msg.topic != topic {
        return Ok(Incoming::Ignored);
    }
    match msg.event.as_str() {
        "phx_reply" => {
            let ok = msg.payload.get("status").and_then(Value::as_str) == Some("ok");
            let detail = msg
                .payload
                .get("response")
                .map(Value::to_string)
                .unwrap_or_default();
            Ok(Incoming::JoinReply { ok, detail })
        }
        "phx_close" | "phx_error" => Ok(Incoming::Closed),
        "postgres_changes" => parse_change(&msg.payload).map(Incoming::Change),
        _ => Ok(Incoming::Ignored),
    }
}

fn parse_change(payload: &Value) -> Result<ChangeEvent, RealtimeError> {
    let data = payload
        .get("data")
        .ok_or_else(|| RealtimeError::Protocol("postgres_changes without data".into()))?;
    let kind = match data
        .get("type")
        .or_else(|| data.get("eventType"))
        .and_then(Value::as_str)
    {
        Some("INSERT") => ChangeKind::Insert,
        Some("UPDATE") => ChangeKind::Update,
        Some("DELETE") => ChangeKind::Delete,
        other => return Err(RealtimeError::Protocol(format!("unknown change type {other:?}"))),
    };
    Ok(ChangeEvent {
        table: data
            .get("table")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        kind,
        record: data.get("record").cloned().unwrap_or(Value::Null),
        old_record: data.get("old_record").cloned().unwrap_or(Value::Null),
        commit_timestamp: data
            .get("commit_timestamp")
            .and_then(Value::as_str)
            .map(str::to_owned),
    })
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Live change feed. Dropping it closes the socket.
pub struct ChannelSubscription {
    events: mpsc::Receiver<ChangeEvent>,
    handle: JoinHandle<()>,
}

impl ChannelSubscription {
    /// Next change; `None` once the channel has closed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    pub fn unsubscribe(self) {
        self.handle.abort();
    }
}

impl Drop for ChannelSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Open a websocket and join `feed`.
///
/// # Errors
///
/// Returns an error if the URL is invalid, the socket cannot be opened, or
/// the join message cannot be sent.
pub async fn subscribe(
    base_url: &str,
    anon_key: &str,
    feed: ChangeFeed,
    access_token: Option<String>,
) -> Result<ChannelSubscription, RealtimeError> {
    let url = websocket_url(base_url, anon_key)?;
    let (mut stream, _) = connect_async(url)
        .await
        .map_err(|e| RealtimeError::Connect(e.to_string()))?;

    let join = feed.join_message("1", access_token.as_deref());
    let join_text = serde_json::to_string(&join).map_err(|e| RealtimeError::Protocol(e.to_string()))?;
    stream
        .send(Message::Text(join_text.into()))
        .await
        .map_err(|e| RealtimeError::Connect(e.to_string()))?;

    let topic = feed.topic();
    info!(%topic, "realtime: joined");
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);

    let handle = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut next_ref: u64 = 2;
        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let beat = PhxMessage::heartbeat(&next_ref.to_string());
                    next_ref += 1;
                    let Ok(text) = serde_json::to_string(&beat) else { break };
                    if let Err(e) = stream.send(Message::Text(text.into())).await {
                        warn!(%topic, error = %e, "realtime: heartbeat failed");
                        break;
                    }
                }
                message = stream.next() => {
                    let text = match message {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            warn!(%topic, error = %e, "realtime: socket error");
                            break;
                        }
                    };
                    match parse_incoming(text.as_str(), &topic) {
                        Ok(Incoming::Change(change)) => {
                            if tx.send(change).await.is_err() {
                                break;
                            }
                        }
                        Ok(Incoming::JoinReply { ok: false, detail }) => {
                            warn!(%topic, %detail, "realtime: join rejected");
                            break;
                        }
                        Ok(Incoming::Closed) => break,
                        Ok(Incoming::JoinReply { ok: true, .. } | Incoming::Ignored) => {}
                        Err(e) => warn!(%topic, error = %e, "realtime: unreadable message"),
                    }
                }
            }
        }
        info!(%topic, "realtime: channel closed");
    });

    Ok(ChannelSubscription { events: rx, handle })
}

#[cfg(test)]
#[path = "realtime_test.rs"]
mod tests;
