//! Realtime change feed.
//!
//! Speaks the Phoenix channel protocol used by Supabase realtime: one
//! websocket, one `phx_join` per channel listing the tables to watch, a
//! heartbeat every 25 seconds, and `postgres_changes` frames whenever a row
//! changes. Frames carry row payloads but the client only needs to know that
//! something changed, so they are reduced to a `ChangeNotification`.

use std::fmt;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc::UnboundedSender, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::Table;
use crate::error::{Error, Result};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A named group of watched tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub name: &'static str,
    pub tables: &'static [Table],
}

pub const TASKS_CHANNEL: Channel = Channel {
    name: "tasks-changes",
    tables: &[Table::Tasks, Table::Subtasks, Table::Comments],
};

pub const DEPT_CHANNEL: Channel = Channel {
    name: "dept-changes",
    tables: &[Table::Departments],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    Other,
}

/// "Something in `table` changed."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotification {
    pub table: Table,
    pub kind: ChangeKind,
}

/// Handle to a running change feed. Unsubscribes exactly once, either through
/// `unsubscribe` or when dropped.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Subscription {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Websocket endpoint for a REST base URL.
pub fn websocket_url(base: &Url, key: &str) -> Result<Url> {
    let scheme = match base.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => return Err(Error::Realtime(format!("unsupported scheme '{}'", other))),
    };
    let mut url = base.clone();
    url.set_scheme(scheme)
        .map_err(|_| Error::Realtime(format!("cannot derive websocket url from {}", base)))?;
    let path = format!("{}/realtime/v1/websocket", base.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", key)
        .append_pair("vsn", "1.0.0");
    Ok(url)
}

fn topic(channel: &Channel) -> String {
    format!("realtime:{}", channel.name)
}

pub fn join_message(channel: &Channel, key: &str, msg_ref: u64) -> Value {
    let changes: Vec<Value> = channel
        .tables
        .iter()
        .map(|t| json!({"event": "*", "schema": "public", "table": t.as_str()}))
        .collect();
    json!({
        "topic": topic(channel),
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": {"self": false},
                "presence": {"key": ""},
                "postgres_changes": changes,
            },
            "access_token": key,
        },
        "ref": msg_ref.to_string(),
    })
}

pub fn leave_message(channel: &Channel, msg_ref: u64) -> Value {
    json!({
        "topic": topic(channel),
        "event": "phx_leave",
        "payload": {},
        "ref": msg_ref.to_string(),
    })
}

pub fn heartbeat_message(msg_ref: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref.to_string(),
    })
}

/// Reduce an incoming frame to a notification; `None` for protocol traffic.
pub fn parse_frame(text: &str) -> Option<ChangeNotification> {
    let frame: Value = serde_json::from_str(text).ok()?;
    match frame.get("event").and_then(Value::as_str)? {
        "postgres_changes" => {
            let data = frame.get("payload")?.get("data")?;
            let table = Table::parse(data.get("table")?.as_str()?)?;
            let kind = match data.get("type").and_then(Value::as_str) {
                Some("INSERT") => ChangeKind::Insert,
                Some("UPDATE") => ChangeKind::Update,
                Some("DELETE") => ChangeKind::Delete,
                _ => ChangeKind::Other,
            };
            Some(ChangeNotification { table, kind })
        }
        "phx_reply" => {
            let status = frame.pointer("/payload/status").and_then(Value::as_str);
            if status == Some("error") {
                warn!(frame = text, "realtime channel rejected a request");
            }
            None
        }
        "phx_error" | "phx_close" => {
            warn!(frame = text, "realtime channel closed by server");
            None
        }
        _ => None,
    }
}

/// Open the feed in the background and return its handle.
pub fn subscribe(
    base: &Url,
    key: &str,
    channels: &[Channel],
    tx: UnboundedSender<ChangeNotification>,
) -> Result<Subscription> {
    let url = websocket_url(base, key)?;
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    tokio::spawn(run(url, key.to_string(), channels.to_vec(), tx, stop_rx));
    Ok(Subscription::new(move || {
        let _ = stop_tx.send(());
    }))
}

enum SessionEnd {
    Stopped,
    Dropped,
}

async fn run(
    url: Url,
    key: String,
    channels: Vec<Channel>,
    tx: UnboundedSender<ChangeNotification>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut backoff = MIN_BACKOFF;
    loop {
        match session(&url, &key, &channels, &tx, &mut stop).await {
            Ok(SessionEnd::Stopped) => {
                info!("realtime feed stopped");
                return;
            }
            Ok(SessionEnd::Dropped) => {
                warn!("realtime connection closed, reconnecting");
                backoff = MIN_BACKOFF;
            }
            Err(e) => warn!(error = %e, retry_in = ?backoff, "realtime connection failed"),
        }

        if tx.is_closed() {
            return;
        }
        tokio::select! {
            _ = &mut stop => return,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

async fn session(
    url: &Url,
    key: &str,
    channels: &[Channel],
    tx: &UnboundedSender<ChangeNotification>,
    stop: &mut oneshot::Receiver<()>,
) -> Result<SessionEnd> {
    let realtime = |e: tokio_tungstenite::tungstenite::Error| Error::Realtime(e.to_string());

    let (socket, _) = connect_async(url.as_str()).await.map_err(realtime)?;
    let (mut sink, mut stream) = socket.split();
    let mut msg_ref = 0u64;

    for channel in channels {
        msg_ref += 1;
        let join = join_message(channel, key, msg_ref).to_string();
        sink.send(Message::Text(join)).await.map_err(realtime)?;
        debug!(channel = channel.name, "joined");
    }
    info!(channels = channels.len(), "realtime feed connected");

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = &mut *stop => {
                for channel in channels {
                    msg_ref += 1;
                    let leave = leave_message(channel, msg_ref).to_string();
                    let _ = sink.send(Message::Text(leave)).await;
                }
                let _ = sink.close().await;
                return Ok(SessionEnd::Stopped);
            }
            _ = heartbeat.tick() => {
                msg_ref += 1;
                let beat = heartbeat_message(msg_ref).to_string();
                sink.send(Message::Text(beat)).await.map_err(realtime)?;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(change) = parse_frame(&text) {
                        debug!(table = %change.table, kind = ?change.kind, "change notification");
                        if tx.send(change).is_err() {
                            return Ok(SessionEnd::Stopped);
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Dropped),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(realtime(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_websocket_url_from_rest_base() {
        let base = Url::parse("https://abc.supabase.co").unwrap();
        let ws = websocket_url(&base, "k").unwrap();
        assert_eq!(ws.as_str(), "wss://abc.supabase.co/realtime/v1/websocket?apikey=k&vsn=1.0.0");

        let local = Url::parse("http://localhost:54321/").unwrap();
        let ws = websocket_url(&local, "k").unwrap();
        assert_eq!(ws.scheme(), "ws");
        assert_eq!(ws.path(), "/realtime/v1/websocket");
    }

    #[test]
    fn test_join_lists_channel_tables() {
        let join = join_message(&TASKS_CHANNEL, "k", 1);
        assert_eq!(join["topic"], "realtime:tasks-changes");
        assert_eq!(join["event"], "phx_join");
        let tables: Vec<&str> = join["payload"]["config"]["postgres_changes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["table"].as_str().unwrap())
            .collect();
        assert_eq!(tables, vec!["tasks", "subtasks", "comments"]);
        assert_eq!(join["payload"]["access_token"], "k");

        assert_eq!(leave_message(&DEPT_CHANNEL, 2)["event"], "phx_leave");
        assert_eq!(heartbeat_message(3)["topic"], "phoenix");
    }

    #[test]
    fn test_parse_frame() {
        let change = r#"{"topic":"realtime:dept-changes","event":"postgres_changes",
            "payload":{"data":{"table":"departments","type":"DELETE","old_record":{"id":4}},"ids":[1]},
            "ref":null}"#;
        assert_eq!(
            parse_frame(change),
            Some(ChangeNotification { table: Table::Departments, kind: ChangeKind::Delete })
        );

        let reply = r#"{"topic":"phoenix","event":"phx_reply","payload":{"status":"ok","response":{}},"ref":"3"}"#;
        assert_eq!(parse_frame(reply), None);
        assert_eq!(parse_frame("not json"), None);
    }

    #[test]
    fn test_subscription_cancels_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(sub.is_active());
        sub.unsubscribe();
        sub.unsubscribe();
        drop(sub);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
