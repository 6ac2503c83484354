use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::RealtimeError;
use crate::protocol::{ChannelConfig, RawChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Closed,
    Joining,
    Joined,
    Leaving,
    Errored,
}

/// Subscription lifecycle as reported to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscribeStatus {
    Subscribed,
    ChannelError,
    TimedOut,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Status(SubscribeStatus),
    Change(RawChange),
    Broadcast { event: String, payload: Value },
}

/// One named realtime channel.
///
/// After `subscribe`, every lifecycle change and every delivered message
/// arrives on the returned receiver, in transport order. A status other than
/// `Subscribed` ends the stream.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    fn state(&self) -> ChannelState;

    async fn subscribe(&self) -> Result<mpsc::Receiver<ChannelEvent>, RealtimeError>;

    async fn broadcast(&self, event: &str, payload: Value) -> Result<(), RealtimeError>;

    async fn unsubscribe(&self);
}

/// Factory for channels. Creating a channel does not touch the network;
/// the connection is opened on `subscribe`.
pub trait Transport: Send + Sync {
    fn channel(&self, name: &str, config: &ChannelConfig) -> Arc<dyn Channel>;
}
