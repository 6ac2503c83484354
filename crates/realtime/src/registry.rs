use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::channel::{Channel, ChannelState, Transport};
use crate::protocol::ChannelConfig;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const HEARTBEAT_EVENT: &str = "heartbeat";

struct ChannelHandle {
    channel: Arc<dyn Channel>,
    heartbeat: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub total: usize,
    pub joined: usize,
}

/// Owns every live channel of a session, at most one per name.
pub struct ChannelRegistry {
    transport: Arc<dyn Transport>,
    heartbeat_interval: Duration,
    channels: RwLock<HashMap<String, ChannelHandle>>,
}

impl ChannelRegistry {
    pub fn new(transport: Arc<dyn Transport>, heartbeat_interval: Duration) -> Self {
        Self {
            transport,
            heartbeat_interval,
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_or_create_channel(
        &self,
        name: &str,
        config: &ChannelConfig,
    ) -> Arc<dyn Channel> {
        if let Some(handle) = self.channels.read().await.get(name) {
            return Arc::clone(&handle.channel);
        }

        let mut channels = self.channels.write().await;
        if let Some(handle) = channels.get(name) {
            return Arc::clone(&handle.channel);
        }

        let channel = self.transport.channel(name, config);
        let heartbeat = spawn_heartbeat(Arc::clone(&channel), self.heartbeat_interval);
        channels.insert(
            name.to_string(),
            ChannelHandle {
                channel: Arc::clone(&channel),
                heartbeat,
            },
        );
        info!(channel = %name, "channel created");
        channel
    }

    pub async fn remove_channel(&self, name: &str) {
        let handle = self.channels.write().await.remove(name);
        if let Some(handle) = handle {
            handle.heartbeat.abort();
            handle.channel.unsubscribe().await;
            info!(channel = %name, "channel removed");
        }
    }

    pub async fn cleanup(&self) {
        let drained: Vec<(String, ChannelHandle)> = self.channels.write().await.drain().collect();
        let count = drained.len();
        for (_, handle) in drained {
            handle.heartbeat.abort();
            handle.channel.unsubscribe().await;
        }
        info!(channels = count, "all channels closed");
    }

    pub async fn connection_stats(&self) -> ConnectionStats {
        let channels = self.channels.read().await;
        let joined = channels
            .values()
            .filter(|h| h.channel.state() == ChannelState::Joined)
            .count();
        ConnectionStats {
            total: channels.len(),
            joined,
        }
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.channels.read().await.contains_key(name)
    }
}

impl Drop for ChannelRegistry {
    fn drop(&mut self) {
        for handle in self.channels.get_mut().values() {
            handle.heartbeat.abort();
        }
    }
}

fn spawn_heartbeat(channel: Arc<dyn Channel>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;
            if channel.state() != ChannelState::Joined {
                continue;
            }
            let payload = json!({ "timestamp": Utc::now().timestamp_millis() });
            if let Err(err) = channel.broadcast(HEARTBEAT_EVENT, payload).await {
                debug!(channel = %channel.name(), error = %err, "heartbeat not sent");
            }
        }
    })
}
