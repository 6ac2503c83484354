//! Live collections: an initial load followed by a realtime change feed with
//! bounded reconnects.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use trustlink_core::retry::{Backoff, ReconnectPolicy};
use trustlink_core::Entity;

use crate::change::{apply_change, ChangeEvent, Notice};
use crate::channel::{ChannelEvent, SubscribeStatus};
use crate::protocol::{ChangeFilter, ChannelConfig};
use crate::registry::ChannelRegistry;
use crate::rest::{OwnerFilter, RowSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ConnectionPhase {
    Loading,
    Synced,
    Reconnecting { attempt: u32, max: u32 },
    Failed,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SubscriptionState<T> {
    pub items: Vec<T>,
    pub loading: bool,
    pub reconnect_attempts: u32,
}

impl<T> Default for SubscriptionState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: true,
            reconnect_attempts: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub channel_name: String,
    pub schema: String,
    pub table: String,
    pub owner_filter: Option<OwnerFilter>,
    pub policy: ReconnectPolicy,
}

impl QueryOptions {
    pub fn for_entity<T: Entity>() -> Self {
        Self {
            channel_name: format!("{}-changes", T::TABLE),
            schema: "public".to_string(),
            table: T::TABLE.to_string(),
            owner_filter: None,
            policy: ReconnectPolicy::default(),
        }
    }

    /// Restricts both the initial load and the change feed to rows whose
    /// `column` equals `value`.
    pub fn owned_by(mut self, column: &str, value: &str) -> Self {
        self.channel_name = format!("{}-changes-{}", self.table, value);
        self.owner_filter = Some(OwnerFilter {
            column: column.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn channel_config(&self) -> ChannelConfig {
        let mut filter = ChangeFilter::table(&self.schema, &self.table);
        if let Some(owner) = &self.owner_filter {
            filter = filter.with_eq(&owner.column, &owner.value);
        }
        ChannelConfig::with_changes(filter)
    }
}

/// Handle to a running live query.
///
/// Dropping the handle or calling [`ReconnectingQuery::stop`] cancels any
/// pending reconnect and removes the channel from the registry.
pub struct ReconnectingQuery<T: Entity> {
    state: Arc<RwLock<SubscriptionState<T>>>,
    phase: watch::Receiver<ConnectionPhase>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<T: Entity> ReconnectingQuery<T> {
    pub fn start(
        registry: Arc<ChannelRegistry>,
        source: Arc<dyn RowSource<T>>,
        options: QueryOptions,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let state = Arc::new(RwLock::new(SubscriptionState::default()));
        let (phase_tx, phase_rx) = watch::channel(ConnectionPhase::Loading);
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let worker = QueryWorker {
            registry,
            source,
            options,
            state: Arc::clone(&state),
            phase: phase_tx,
            notices: notices_tx,
            cancel: cancel.clone(),
            _entity: PhantomData,
        };
        let task = tokio::spawn(worker.run());

        (
            Self {
                state,
                phase: phase_rx,
                cancel,
                task: Some(task),
            },
            notices_rx,
        )
    }

    pub async fn items(&self) -> Vec<T> {
        self.state.read().await.items.clone()
    }

    pub async fn snapshot(&self) -> SubscriptionState<T> {
        self.state.read().await.clone()
    }

    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<ConnectionPhase> {
        self.phase.clone()
    }

    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<T: Entity> Drop for ReconnectingQuery<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum Ended {
    Failure(SubscribeStatus),
    Cancelled,
}

struct QueryWorker<T: Entity> {
    registry: Arc<ChannelRegistry>,
    source: Arc<dyn RowSource<T>>,
    options: QueryOptions,
    state: Arc<RwLock<SubscriptionState<T>>>,
    phase: watch::Sender<ConnectionPhase>,
    notices: mpsc::UnboundedSender<Notice>,
    cancel: CancellationToken,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> QueryWorker<T> {
    async fn run(self) {
        if !self.initial_load().await {
            self.finish().await;
            return;
        }

        let mut policy = self.options.policy.clone();
        let config = self.options.channel_config();

        loop {
            let status = match self.drive_subscription(&config, &mut policy).await {
                Ended::Cancelled => break,
                Ended::Failure(status) => status,
            };
            self.registry.remove_channel(&self.options.channel_name).await;

            let Some(delay) = policy.next_backoff() else {
                error!(
                    channel = %self.options.channel_name,
                    attempts = policy.attempts(),
                    "realtime reconnect attempts exhausted"
                );
                self.phase.send_replace(ConnectionPhase::Failed);
                let _ = self.notices.send(Notice::ConnectionFailed {
                    attempts: policy.attempts(),
                });
                return;
            };

            let attempt = policy.attempts();
            let max = policy.max_attempts;
            self.state.write().await.reconnect_attempts = attempt;
            self.phase
                .send_replace(ConnectionPhase::Reconnecting { attempt, max });
            let _ = self.notices.send(Notice::Reconnecting { attempt, max });
            warn!(
                channel = %self.options.channel_name,
                ?status,
                attempt,
                max,
                ?delay,
                "realtime subscription lost, reconnecting"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.finish().await;
    }

    /// Returns false when cancelled before the load completed.
    async fn initial_load(&self) -> bool {
        let result = tokio::select! {
            _ = self.cancel.cancelled() => return false,
            result = self
                .source
                .fetch(&self.options.table, self.options.owner_filter.as_ref()) => result,
        };

        let mut state = self.state.write().await;
        match result {
            Ok(rows) => {
                info!(table = %self.options.table, rows = rows.len(), "initial load complete");
                state.items = rows;
            }
            Err(err) => {
                warn!(table = %self.options.table, error = %err, "initial load failed");
                state.items.clear();
                let _ = self.notices.send(Notice::FetchFailed {
                    message: err.to_string(),
                });
            }
        }
        state.loading = false;
        drop(state);

        self.phase.send_replace(ConnectionPhase::Synced);
        true
    }

    async fn drive_subscription(
        &self,
        config: &ChannelConfig,
        policy: &mut ReconnectPolicy,
    ) -> Ended {
        let name = &self.options.channel_name;
        let channel = self.registry.get_or_create_channel(name, config).await;
        let mut events = match channel.subscribe().await {
            Ok(events) => events,
            Err(err) => {
                warn!(channel = %name, error = %err, "subscribe failed");
                return Ended::Failure(SubscribeStatus::ChannelError);
            }
        };

        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => return Ended::Cancelled,
                event = events.recv() => event,
            };

            match event {
                Some(ChannelEvent::Status(SubscribeStatus::Subscribed)) => {
                    policy.reset();
                    self.state.write().await.reconnect_attempts = 0;
                    self.phase.send_replace(ConnectionPhase::Synced);
                    let _ = self.notices.send(Notice::Connected);
                    info!(channel = %name, "realtime subscription active");
                }
                Some(ChannelEvent::Status(status)) => return Ended::Failure(status),
                Some(ChannelEvent::Change(raw)) => match ChangeEvent::<T>::from_raw(raw) {
                    Ok(change) => {
                        let notice = apply_change(&mut self.state.write().await.items, change);
                        if let Some(notice) = notice {
                            let _ = self.notices.send(notice);
                        }
                    }
                    Err(err) => warn!(channel = %name, error = %err, "dropping change event"),
                },
                Some(ChannelEvent::Broadcast { event, .. }) => {
                    debug!(channel = %name, %event, "broadcast ignored");
                }
                None => return Ended::Failure(SubscribeStatus::Closed),
            }
        }
    }

    async fn finish(&self) {
        self.registry.remove_channel(&self.options.channel_name).await;
        self.phase.send_replace(ConnectionPhase::Stopped);
        debug!(channel = %self.options.channel_name, "live query stopped");
    }
}
