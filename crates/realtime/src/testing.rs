//! In-memory transport used by the registry and query tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::channel::{Channel, ChannelEvent, ChannelState, Transport};
use crate::error::RealtimeError;
use crate::protocol::ChannelConfig;

pub struct FakeChannel {
    name: String,
    config: ChannelConfig,
    state: Mutex<ChannelState>,
    broadcasts: Mutex<Vec<(String, Value)>>,
    fail_broadcasts: Mutex<bool>,
    unsubscribes: Mutex<usize>,
    subscriptions: mpsc::UnboundedSender<mpsc::Sender<ChannelEvent>>,
}

impl FakeChannel {
    pub fn set_state(&self, state: ChannelState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn broadcasts(&self) -> Vec<(String, Value)> {
        self.broadcasts.lock().unwrap().clone()
    }

    pub fn fail_broadcasts(&self, fail: bool) {
        *self.fail_broadcasts.lock().unwrap() = fail;
    }

    pub fn unsubscribe_count(&self) -> usize {
        *self.unsubscribes.lock().unwrap()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }
}

#[async_trait]
impl Channel for FakeChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ChannelState {
        *self.state.lock().unwrap()
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<ChannelEvent>, RealtimeError> {
        let (tx, rx) = mpsc::channel(64);
        self.set_state(ChannelState::Joining);
        let _ = self.subscriptions.send(tx);
        Ok(rx)
    }

    async fn broadcast(&self, event: &str, payload: Value) -> Result<(), RealtimeError> {
        if *self.fail_broadcasts.lock().unwrap() {
            return Err(RealtimeError::NotJoined(self.name.clone()));
        }
        self.broadcasts
            .lock()
            .unwrap()
            .push((event.to_string(), payload));
        Ok(())
    }

    async fn unsubscribe(&self) {
        *self.unsubscribes.lock().unwrap() += 1;
        self.set_state(ChannelState::Closed);
    }
}

/// Records every channel it creates. Each `subscribe` hands the event
/// sender to the test through `next_subscription`.
pub struct FakeTransport {
    channels: Mutex<Vec<Arc<FakeChannel>>>,
    subscriptions_tx: mpsc::UnboundedSender<mpsc::Sender<ChannelEvent>>,
    subscriptions_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<mpsc::Sender<ChannelEvent>>>,
}

impl Default for FakeTransport {
    fn default() -> Self {
        let (subscriptions_tx, subscriptions_rx) = mpsc::unbounded_channel();
        Self {
            channels: Mutex::new(Vec::new()),
            subscriptions_tx,
            subscriptions_rx: tokio::sync::Mutex::new(subscriptions_rx),
        }
    }
}

impl FakeTransport {
    pub fn created_count(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    pub fn created(&self, index: usize) -> Arc<FakeChannel> {
        Arc::clone(&self.channels.lock().unwrap()[index])
    }

    pub async fn next_subscription(&self) -> mpsc::Sender<ChannelEvent> {
        self.subscriptions_rx
            .lock()
            .await
            .recv()
            .await
            .expect("transport dropped")
    }

    pub fn pending_subscription(&self) -> Option<mpsc::Sender<ChannelEvent>> {
        self.subscriptions_rx.try_lock().ok()?.try_recv().ok()
    }
}

impl Transport for FakeTransport {
    fn channel(&self, name: &str, config: &ChannelConfig) -> Arc<dyn Channel> {
        let channel = Arc::new(FakeChannel {
            name: name.to_string(),
            config: config.clone(),
            state: Mutex::new(ChannelState::Closed),
            broadcasts: Mutex::new(Vec::new()),
            fail_broadcasts: Mutex::new(false),
            unsubscribes: Mutex::new(0),
            subscriptions: self.subscriptions_tx.clone(),
        });
        self.channels.lock().unwrap().push(Arc::clone(&channel));
        channel
    }
}
