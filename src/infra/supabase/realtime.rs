//! Row-change notifications over the Phoenix realtime socket.
//!
//! One socket per subscription. A background pump joins the channel, keeps
//! it alive with heartbeats, and forwards each `postgres_changes` frame as a
//! [`ChangeEvent`]. Releasing the subscription leaves the channel and closes
//! the socket.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use defter_api_types::{
    HEARTBEAT, HEARTBEAT_TOPIC, PHX_CLOSE, PHX_ERROR, PHX_JOIN, PHX_LEAVE, PHX_REPLY,
    POSTGRES_CHANGES, PhoenixFrame, PostgresChangesFilter,
};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tokio::time::{MissedTickBehavior, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::application::repos::{
    ChangeEvent, ChangeFeed, ChangeKind, ChangeSubscription, RepoError, SubscriptionRelease,
};
use crate::config::RealtimeSettings;

use super::SupabaseClient;

const JOIN_REF: &str = "1";
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_BUFFER: usize = 32;
const PROTOCOL_VERSION: &str = "1.0.0";

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct SupabaseRealtime {
    client: Arc<SupabaseClient>,
    schema: String,
    table: String,
    channel: String,
    heartbeat: Duration,
}

impl SupabaseRealtime {
    pub fn new(
        client: Arc<SupabaseClient>,
        schema: impl Into<String>,
        table: impl Into<String>,
        settings: &RealtimeSettings,
    ) -> Self {
        Self {
            client,
            schema: schema.into(),
            table: table.into(),
            channel: settings.channel.clone(),
            heartbeat: settings.heartbeat,
        }
    }

    fn topic(&self) -> String {
        format!("realtime:{}", self.channel)
    }

    async fn join(&self, socket: &mut Socket, topic: &str) -> Result<(), RepoError> {
        let filter = PostgresChangesFilter {
            event: "*".to_string(),
            schema: self.schema.clone(),
            table: self.table.clone(),
        };
        let token = self
            .client
            .access_token()
            .unwrap_or_else(|| self.client.anon_key().to_string());
        send_frame(socket, &join_frame(topic, &filter, &token)).await?;

        let reply = timeout(JOIN_TIMEOUT, async {
            while let Some(message) = socket.next().await {
                let message = message.map_err(RepoError::from_transport)?;
                let Some(frame) = decode_frame(&message) else {
                    continue;
                };
                if let Some(outcome) = join_outcome(&frame, topic) {
                    return outcome;
                }
            }
            Err(RepoError::Transport(
                "socket closed before join was acknowledged".to_string(),
            ))
        })
        .await;

        match reply {
            Ok(outcome) => outcome,
            Err(_) => Err(RepoError::Transport(format!(
                "no join reply within {}s",
                JOIN_TIMEOUT.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl ChangeFeed for SupabaseRealtime {
    #[instrument(skip(self), fields(channel = %self.channel, table = %self.table))]
    async fn subscribe(&self) -> Result<ChangeSubscription, RepoError> {
        let url = socket_url(self.client.base(), self.client.anon_key())?;
        let (mut socket, _) = connect_async(url.as_str())
            .await
            .map_err(RepoError::from_transport)?;

        let topic = self.topic();
        self.join(&mut socket, &topic).await?;
        info!(%topic, "Realtime channel joined");

        let (events, receiver) = mpsc::channel(EVENT_BUFFER);
        let (stop, stopped) = oneshot::channel();
        tokio::spawn(pump(socket, topic, self.heartbeat, events, stopped));

        Ok(ChangeSubscription::new(
            receiver,
            ChannelRelease {
                stop: Mutex::new(Some(stop)),
            },
        ))
    }
}

struct ChannelRelease {
    stop: Mutex<Option<oneshot::Sender<()>>>,
}

impl SubscriptionRelease for ChannelRelease {
    fn release(&self) {
        let stop = match self.stop.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(stop) = stop {
            let _ = stop.send(());
        }
    }
}

async fn pump(
    socket: Socket,
    topic: String,
    heartbeat: Duration,
    events: mpsc::Sender<ChangeEvent>,
    mut stopped: oneshot::Receiver<()>,
) {
    let (mut sink, mut stream) = socket.split();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut next_ref: u64 = 2;

    let exit = loop {
        tokio::select! {
            _ = &mut stopped => break PumpExit::Released,
            _ = ticker.tick() => {
                let frame = encode(&heartbeat_frame(&next_ref.to_string()));
                next_ref += 1;
                if let Err(err) = sink.send(Message::Text(frame)).await {
                    warn!(error = %err, "Realtime heartbeat failed");
                    break PumpExit::Lost;
                }
            }
            message = stream.next() => {
                let message = match message {
                    Some(Ok(message)) => message,
                    Some(Err(err)) => {
                        warn!(error = %err, "Realtime socket error");
                        break PumpExit::Lost;
                    }
                    None => break PumpExit::Lost,
                };
                if let Message::Close(_) = message {
                    break PumpExit::Lost;
                }
                let Some(frame) = decode_frame(&message) else {
                    continue;
                };
                if frame.topic == topic && matches!(frame.event.as_str(), PHX_CLOSE | PHX_ERROR) {
                    warn!(event = %frame.event, "Realtime channel closed by server");
                    break PumpExit::Lost;
                }
                let Some(kind) = change_kind(&frame, &topic) else {
                    continue;
                };
                // Events only trigger reloads; a full buffer already has one queued.
                match events.try_send(ChangeEvent { kind }) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        debug!(%topic, "Change buffer full; coalescing event");
                    }
                    Err(TrySendError::Closed(_)) => break PumpExit::Released,
                }
            }
        }
    };

    if let PumpExit::Released = exit {
        let leave = encode(&leave_frame(&topic, &next_ref.to_string()));
        let _ = sink.send(Message::Text(leave)).await;
        let _ = sink.close().await;
        debug!(%topic, "Realtime channel left");
    }
    debug!(%topic, "Realtime pump stopped");
}

enum PumpExit {
    /// The subscriber let go; leave the channel cleanly.
    Released,
    /// The socket or channel went away underneath us.
    Lost,
}

async fn send_frame(socket: &mut Socket, frame: &PhoenixFrame) -> Result<(), RepoError> {
    socket
        .send(Message::Text(encode(frame)))
        .await
        .map_err(RepoError::from_transport)
}

fn encode(frame: &PhoenixFrame) -> String {
    // Serializing a frame of strings and JSON values cannot fail.
    serde_json::to_string(frame).unwrap_or_default()
}

fn decode_frame(message: &Message) -> Option<PhoenixFrame> {
    match message {
        Message::Text(text) => match serde_json::from_str(text) {
            Ok(frame) => Some(frame),
            Err(err) => {
                debug!(error = %err, "Ignoring undecodable realtime frame");
                None
            }
        },
        _ => None,
    }
}

/// Websocket endpoint for a project base URL: `http` maps to `ws`, `https` to `wss`.
pub fn socket_url(base: &Url, anon_key: &str) -> Result<Url, RepoError> {
    let mut url = base
        .join("realtime/v1/websocket")
        .map_err(RepoError::from_transport)?;
    let scheme = match base.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(RepoError::Transport(format!(
                "unsupported scheme `{other}` for realtime"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| RepoError::Transport(format!("cannot use scheme `{scheme}`")))?;
    url.query_pairs_mut()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", PROTOCOL_VERSION);
    Ok(url)
}

pub fn join_frame(topic: &str, filter: &PostgresChangesFilter, access_token: &str) -> PhoenixFrame {
    PhoenixFrame {
        topic: topic.to_string(),
        event: PHX_JOIN.to_string(),
        payload: json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": [filter],
            },
            "access_token": access_token,
        }),
        reference: Some(JOIN_REF.to_string()),
    }
}

pub fn heartbeat_frame(reference: &str) -> PhoenixFrame {
    PhoenixFrame {
        topic: HEARTBEAT_TOPIC.to_string(),
        event: HEARTBEAT.to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
    }
}

pub fn leave_frame(topic: &str, reference: &str) -> PhoenixFrame {
    PhoenixFrame {
        topic: topic.to_string(),
        event: PHX_LEAVE.to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
    }
}

/// Result of the join handshake, if `frame` is the reply to it.
fn join_outcome(frame: &PhoenixFrame, topic: &str) -> Option<Result<(), RepoError>> {
    if frame.topic != topic || frame.reference.as_deref() != Some(JOIN_REF) {
        return None;
    }
    if frame.event != PHX_REPLY {
        return Some(Err(RepoError::Transport(format!(
            "unexpected `{}` while joining",
            frame.event
        ))));
    }

    match frame.payload.get("status").and_then(Value::as_str) {
        Some("ok") => Some(Ok(())),
        status => {
            let reason = frame
                .payload
                .pointer("/response/reason")
                .and_then(Value::as_str)
                .unwrap_or("join rejected");
            Some(Err(RepoError::Unauthorized(format!(
                "{reason} (status {})",
                status.unwrap_or("missing")
            ))))
        }
    }
}

/// Change kind carried by a `postgres_changes` frame on `topic`.
pub fn change_kind(frame: &PhoenixFrame, topic: &str) -> Option<ChangeKind> {
    if frame.topic != topic {
        return None;
    }

    match frame.event.as_str() {
        POSTGRES_CHANGES => Some(
            frame
                .payload
                .pointer("/data/type")
                .and_then(Value::as_str)
                .map_or(ChangeKind::Other, ChangeKind::parse),
        ),
        "INSERT" | "UPDATE" | "DELETE" => Some(ChangeKind::parse(&frame.event)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC: &str = "realtime:blog_posts_channel";

    fn frame(event: &str, payload: Value) -> PhoenixFrame {
        PhoenixFrame {
            topic: TOPIC.to_string(),
            event: event.to_string(),
            payload,
            reference: None,
        }
    }

    #[test]
    fn socket_url_follows_base_scheme() {
        let secure = socket_url(&Url::parse("https://p.supabase.co/").expect("url"), "k")
            .expect("socket url");
        assert_eq!(
            secure.as_str(),
            "wss://p.supabase.co/realtime/v1/websocket?apikey=k&vsn=1.0.0"
        );

        let local = socket_url(&Url::parse("http://127.0.0.1:54321/").expect("url"), "k")
            .expect("socket url");
        assert_eq!(local.scheme(), "ws");
        assert_eq!(local.port(), Some(54321));
    }

    #[test]
    fn join_frame_subscribes_to_all_events_on_table() {
        let filter = PostgresChangesFilter {
            event: "*".into(),
            schema: "public".into(),
            table: "blog_posts".into(),
        };
        let join = join_frame(TOPIC, &filter, "jwt");
        assert_eq!(join.event, "phx_join");
        assert_eq!(join.reference.as_deref(), Some("1"));
        assert_eq!(join.payload["access_token"], "jwt");
        assert_eq!(join.payload["config"]["postgres_changes"][0]["table"], "blog_posts");
        assert_eq!(join.payload["config"]["postgres_changes"][0]["event"], "*");
    }

    #[test]
    fn change_frames_yield_kinds() {
        let insert = frame(POSTGRES_CHANGES, json!({"data": {"type": "INSERT"}}));
        assert_eq!(change_kind(&insert, TOPIC), Some(ChangeKind::Insert));

        let untyped = frame(POSTGRES_CHANGES, json!({}));
        assert_eq!(change_kind(&untyped, TOPIC), Some(ChangeKind::Other));

        let legacy = frame("DELETE", json!({}));
        assert_eq!(change_kind(&legacy, TOPIC), Some(ChangeKind::Delete));

        assert_eq!(change_kind(&frame(PHX_REPLY, json!({})), TOPIC), None);
        assert_eq!(change_kind(&insert, "realtime:other"), None);
    }

    #[test]
    fn join_reply_is_recognised() {
        let mut ok = frame(PHX_REPLY, json!({"status": "ok", "response": {}}));
        ok.reference = Some(JOIN_REF.into());
        assert!(matches!(join_outcome(&ok, TOPIC), Some(Ok(()))));

        let mut rejected = frame(
            PHX_REPLY,
            json!({"status": "error", "response": {"reason": "invalid token"}}),
        );
        rejected.reference = Some(JOIN_REF.into());
        assert!(matches!(
            join_outcome(&rejected, TOPIC),
            Some(Err(RepoError::Unauthorized(reason))) if reason.contains("invalid token")
        ));

        let unrelated = frame(PHX_REPLY, json!({"status": "ok"}));
        assert!(join_outcome(&unrelated, TOPIC).is_none());
    }
}
