//! Websocket transport speaking the Phoenix channel protocol.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::channel::{Channel, ChannelEvent, ChannelState, SubscribeStatus, Transport};
use crate::error::RealtimeError;
use crate::protocol::{
    channel_topic, parse_postgres_change, ChannelConfig, PhoenixMessage, EVENT_BROADCAST,
    EVENT_CLOSE, EVENT_ERROR, EVENT_POSTGRES_CHANGES, EVENT_REPLY, EVENT_SYSTEM, SOCKET_TOPIC,
};

pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);
pub const SOCKET_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type Routes = Arc<RwLock<HashMap<String, mpsc::Sender<PhoenixMessage>>>>;
type ConnectionSlot = Arc<Mutex<Option<Connection>>>;

struct Connection {
    generation: u64,
    outbound: mpsc::Sender<PhoenixMessage>,
    shutdown: CancellationToken,
    writer: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
    reader: Option<JoinHandle<()>>,
}

struct SocketInner {
    endpoint: String,
    access_token: Option<String>,
    join_timeout: Duration,
    connection: ConnectionSlot,
    routes: Routes,
    refs: Arc<AtomicU64>,
}

impl SocketInner {
    fn next_ref(&self) -> String {
        self.refs.fetch_add(1, Ordering::Relaxed).to_string()
    }

    async fn outbound(&self) -> Option<mpsc::Sender<PhoenixMessage>> {
        self.connection
            .lock()
            .await
            .as_ref()
            .map(|conn| conn.outbound.clone())
            .filter(|tx| !tx.is_closed())
    }

    async fn ensure_connected(&self) -> Result<mpsc::Sender<PhoenixMessage>, RealtimeError> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            if !conn.outbound.is_closed() {
                return Ok(conn.outbound.clone());
            }
        }

        let (ws_stream, _) = tokio_tungstenite::connect_async(self.endpoint.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<PhoenixMessage>(64);
        let generation = self.refs.fetch_add(1, Ordering::Relaxed);
        let shutdown = CancellationToken::new();

        let writer_shutdown = shutdown.clone();
        let writer = tokio::spawn(async move {
            loop {
                // queued frames are flushed before a requested close
                let msg = tokio::select! {
                    biased;
                    msg = outbound_rx.recv() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                    _ = writer_shutdown.cancelled() => break,
                };
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "realtime: failed to serialize frame");
                        continue;
                    }
                };
                if write.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = write.close().await;
        });

        let heartbeat_tx = outbound_tx.clone();
        let refs = Arc::clone(&self.refs);
        let heartbeat = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + SOCKET_HEARTBEAT_INTERVAL;
            let mut interval = tokio::time::interval_at(start, SOCKET_HEARTBEAT_INTERVAL);
            loop {
                interval.tick().await;
                let msg_ref = refs.fetch_add(1, Ordering::Relaxed).to_string();
                if heartbeat_tx.send(PhoenixMessage::heartbeat(&msg_ref)).await.is_err() {
                    break;
                }
            }
        });

        let routes = Arc::clone(&self.routes);
        let connection = Arc::clone(&self.connection);
        let reader = tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => route_frame(&routes, &text).await,
                    Ok(Message::Binary(bytes)) => {
                        if let Ok(text) = String::from_utf8(bytes) {
                            route_frame(&routes, &text).await;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "realtime receive error");
                        break;
                    }
                }
            }

            info!("realtime socket disconnected");
            connection_lost(&connection, &routes, generation).await;
        });

        *slot = Some(Connection {
            generation,
            outbound: outbound_tx.clone(),
            shutdown,
            writer,
            heartbeat,
            reader: Some(reader),
        });
        drop(slot);

        info!(endpoint = %redact(&self.endpoint), "realtime socket connected");
        Ok(outbound_tx)
    }
}

/// Tears down connection `generation` and tells every routed topic it is
/// gone. A reader outliving a newer connection changes nothing.
async fn connection_lost(connection: &ConnectionSlot, routes: &Routes, generation: u64) {
    let lost = {
        let mut slot = connection.lock().await;
        if slot.as_ref().map(|c| c.generation) == Some(generation) {
            slot.take()
        } else {
            None
        }
    };
    let Some(lost) = lost else {
        debug!(generation, "stale connection ended");
        return;
    };

    // The reader runs this teardown, so its own handle is only detached.
    lost.heartbeat.abort();
    lost.shutdown.cancel();

    let topics: Vec<(String, mpsc::Sender<PhoenixMessage>)> = routes
        .read()
        .await
        .iter()
        .map(|(topic, tx)| (topic.clone(), tx.clone()))
        .collect();
    for (topic, tx) in topics {
        let _ = tx.send(PhoenixMessage::connection_lost(&topic)).await;
    }
}

async fn route_frame(routes: &Routes, text: &str) {
    let msg: PhoenixMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(err) => {
            warn!(error = %err, "realtime: invalid frame");
            return;
        }
    };

    if msg.topic == SOCKET_TOPIC {
        trace!(reply = ?msg.reply_status(), "socket heartbeat reply");
        return;
    }

    let target = routes.read().await.get(&msg.topic).cloned();
    match target {
        Some(tx) => {
            let _ = tx.send(msg).await;
        }
        None => debug!(topic = %msg.topic, event = %msg.event, "frame for unknown topic"),
    }
}

fn redact(endpoint: &str) -> &str {
    endpoint.split('?').next().unwrap_or(endpoint)
}

/// Shared websocket connection multiplexing every channel of a session.
///
/// The socket connects lazily on the first `subscribe` and reconnects on the
/// next `subscribe` after it drops.
#[derive(Clone)]
pub struct RealtimeSocket {
    inner: Arc<SocketInner>,
}

impl RealtimeSocket {
    pub fn new(endpoint: String, access_token: Option<String>, join_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(SocketInner {
                endpoint,
                access_token,
                join_timeout,
                connection: Arc::new(Mutex::new(None)),
                routes: Arc::new(RwLock::new(HashMap::new())),
                refs: Arc::new(AtomicU64::new(1)),
            }),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.outbound().await.is_some()
    }

    /// Sends a close frame and stops every connection task. Channels should
    /// be left first; they are not notified.
    pub async fn disconnect(&self) {
        let Some(conn) = self.inner.connection.lock().await.take() else {
            return;
        };

        conn.heartbeat.abort();
        conn.shutdown.cancel();
        let mut writer = conn.writer;
        if tokio::time::timeout(CLOSE_TIMEOUT, &mut writer).await.is_err() {
            warn!("realtime close frame not flushed in time");
            writer.abort();
        }
        if let Some(reader) = conn.reader {
            reader.abort();
        }
        info!("realtime socket closed");
    }
}

impl Transport for RealtimeSocket {
    fn channel(&self, name: &str, config: &ChannelConfig) -> Arc<dyn Channel> {
        Arc::new(SocketChannel {
            name: name.to_string(),
            topic: channel_topic(name),
            config: config.clone(),
            socket: Arc::clone(&self.inner),
            state: Arc::new(StdMutex::new(ChannelState::Closed)),
            join_ref: StdMutex::new(None),
            pump: StdMutex::new(None),
        })
    }
}

struct SocketChannel {
    name: String,
    topic: String,
    config: ChannelConfig,
    socket: Arc<SocketInner>,
    state: Arc<StdMutex<ChannelState>>,
    join_ref: StdMutex<Option<String>>,
    pump: StdMutex<Option<JoinHandle<()>>>,
}

fn set_state(state: &StdMutex<ChannelState>, next: ChannelState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = next;
}

impl SocketChannel {
    fn current_join_ref(&self) -> Option<String> {
        self.join_ref
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_pump(&self, pump: Option<JoinHandle<()>>) {
        let previous = std::mem::replace(
            &mut *self.pump.lock().unwrap_or_else(PoisonError::into_inner),
            pump,
        );
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

#[async_trait]
impl Channel for SocketChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ChannelState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<ChannelEvent>, RealtimeError> {
        let outbound = self.socket.ensure_connected().await?;

        let (route_tx, route_rx) = mpsc::channel(64);
        self.socket
            .routes
            .write()
            .await
            .insert(self.topic.clone(), route_tx);

        let join_ref = self.socket.next_ref();
        *self.join_ref.lock().unwrap_or_else(PoisonError::into_inner) = Some(join_ref.clone());
        set_state(&self.state, ChannelState::Joining);

        let join = PhoenixMessage::join(
            &self.topic,
            &self.config,
            self.socket.access_token.as_deref(),
            &join_ref,
        );
        if outbound.send(join).await.is_err() {
            set_state(&self.state, ChannelState::Errored);
            return Err(RealtimeError::NotConnected);
        }

        let (events_tx, events_rx) = mpsc::channel(64);
        let pump = tokio::spawn(pump_events(
            route_rx,
            events_tx,
            Arc::clone(&self.state),
            join_ref,
            self.socket.join_timeout,
        ));
        self.replace_pump(Some(pump));

        debug!(topic = %self.topic, "join sent");
        Ok(events_rx)
    }

    async fn broadcast(&self, event: &str, payload: Value) -> Result<(), RealtimeError> {
        if self.state() != ChannelState::Joined {
            return Err(RealtimeError::NotJoined(self.name.clone()));
        }
        let outbound = self
            .socket
            .outbound()
            .await
            .ok_or(RealtimeError::NotConnected)?;
        let join_ref = self.current_join_ref();
        let msg = PhoenixMessage::broadcast(
            &self.topic,
            event,
            payload,
            &self.socket.next_ref(),
            join_ref.as_deref(),
        );
        outbound
            .send(msg)
            .await
            .map_err(|_| RealtimeError::NotConnected)
    }

    async fn unsubscribe(&self) {
        let was = self.state();
        if matches!(was, ChannelState::Joined | ChannelState::Joining) {
            set_state(&self.state, ChannelState::Leaving);
            if let Some(outbound) = self.socket.outbound().await {
                let join_ref = self.current_join_ref();
                let msg_ref = self.socket.next_ref();
                let leave = PhoenixMessage::leave(&self.topic, &msg_ref, join_ref.as_deref());
                let _ = outbound.send(leave).await;
            }
        }

        self.socket.routes.write().await.remove(&self.topic);
        self.replace_pump(None);
        set_state(&self.state, ChannelState::Closed);
        debug!(topic = %self.topic, "channel left");
    }
}

impl Drop for SocketChannel {
    fn drop(&mut self) {
        self.replace_pump(None);
    }
}

async fn pump_events(
    mut inbound: mpsc::Receiver<PhoenixMessage>,
    events: mpsc::Sender<ChannelEvent>,
    state: Arc<StdMutex<ChannelState>>,
    join_ref: String,
    join_timeout: Duration,
) {
    let deadline = tokio::time::sleep(join_timeout);
    tokio::pin!(deadline);
    let mut joined = false;

    loop {
        let msg = tokio::select! {
            _ = &mut deadline, if !joined => {
                set_state(&state, ChannelState::Errored);
                let _ = events.send(ChannelEvent::Status(SubscribeStatus::TimedOut)).await;
                return;
            }
            msg = inbound.recv() => msg,
        };

        let Some(msg) = msg else {
            set_state(&state, ChannelState::Closed);
            let _ = events.send(ChannelEvent::Status(SubscribeStatus::Closed)).await;
            return;
        };

        let Some(event) = translate(&msg, &join_ref) else {
            continue;
        };

        let terminal = match &event {
            ChannelEvent::Status(SubscribeStatus::Subscribed) => {
                joined = true;
                set_state(&state, ChannelState::Joined);
                false
            }
            ChannelEvent::Status(SubscribeStatus::Closed) => {
                set_state(&state, ChannelState::Closed);
                true
            }
            ChannelEvent::Status(_) => {
                set_state(&state, ChannelState::Errored);
                true
            }
            _ => false,
        };

        if events.send(event).await.is_err() || terminal {
            return;
        }
    }
}

/// Maps one inbound frame for a channel topic onto a channel event.
pub(crate) fn translate(msg: &PhoenixMessage, join_ref: &str) -> Option<ChannelEvent> {
    match msg.event.as_str() {
        EVENT_REPLY => {
            if msg.msg_ref.as_deref() != Some(join_ref) {
                return None;
            }
            match msg.reply_status() {
                Some("ok") => Some(ChannelEvent::Status(SubscribeStatus::Subscribed)),
                Some("timeout") => Some(ChannelEvent::Status(SubscribeStatus::TimedOut)),
                _ => {
                    warn!(topic = %msg.topic, payload = %msg.payload, "join rejected");
                    Some(ChannelEvent::Status(SubscribeStatus::ChannelError))
                }
            }
        }
        EVENT_ERROR => Some(ChannelEvent::Status(SubscribeStatus::ChannelError)),
        EVENT_CLOSE => Some(ChannelEvent::Status(SubscribeStatus::Closed)),
        EVENT_POSTGRES_CHANGES => match parse_postgres_change(&msg.payload) {
            Ok(change) => Some(ChannelEvent::Change(change)),
            Err(err) => {
                warn!(topic = %msg.topic, error = %err, "unreadable change payload");
                None
            }
        },
        EVENT_BROADCAST => {
            let event = msg.payload.get("event")?.as_str()?.to_string();
            let payload = msg.payload.get("payload").cloned().unwrap_or(Value::Null);
            Some(ChannelEvent::Broadcast { event, payload })
        }
        EVENT_SYSTEM => {
            if msg.payload.get("status").and_then(Value::as_str) == Some("error") {
                warn!(topic = %msg.topic, payload = %msg.payload, "realtime system error");
                Some(ChannelEvent::Status(SubscribeStatus::ChannelError))
            } else {
                debug!(topic = %msg.topic, payload = %msg.payload, "realtime system message");
                None
            }
        }
        other => {
            trace!(topic = %msg.topic, event = %other, "ignored frame");
            None
        }
    }
}
