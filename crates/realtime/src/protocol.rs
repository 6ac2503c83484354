//! Phoenix channel frames as spoken by the realtime endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const SOCKET_TOPIC: &str = "phoenix";
pub const TOPIC_PREFIX: &str = "realtime:";

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_BROADCAST: &str = "broadcast";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";
pub const EVENT_SYSTEM: &str = "system";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    pub fn join(
        topic: &str,
        config: &ChannelConfig,
        access_token: Option<&str>,
        join_ref: &str,
    ) -> Self {
        let mut payload = json!({ "config": config });
        if let Some(token) = access_token {
            payload["access_token"] = Value::String(token.to_string());
        }
        Self {
            topic: topic.to_string(),
            event: EVENT_JOIN.to_string(),
            payload,
            msg_ref: Some(join_ref.to_string()),
            join_ref: Some(join_ref.to_string()),
        }
    }

    pub fn leave(topic: &str, msg_ref: &str, join_ref: Option<&str>) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_LEAVE.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: join_ref.map(str::to_string),
        }
    }

    pub fn heartbeat(msg_ref: &str) -> Self {
        Self {
            topic: SOCKET_TOPIC.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: None,
        }
    }

    pub fn broadcast(
        topic: &str,
        event: &str,
        payload: Value,
        msg_ref: &str,
        join_ref: Option<&str>,
    ) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_BROADCAST.to_string(),
            payload: json!({
                "type": "broadcast",
                "event": event,
                "payload": payload,
            }),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: join_ref.map(str::to_string),
        }
    }

    /// Frame injected locally when the socket drops so every joined topic
    /// observes the failure.
    pub fn connection_lost(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_ERROR.to_string(),
            payload: json!({ "reason": "connection lost" }),
            msg_ref: None,
            join_ref: None,
        }
    }

    pub fn reply_status(&self) -> Option<&str> {
        if self.event != EVENT_REPLY {
            return None;
        }
        self.payload.get("status").and_then(Value::as_str)
    }
}

pub fn channel_topic(name: &str) -> String {
    format!("{}{}", TOPIC_PREFIX, name)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelConfig {
    pub broadcast: BroadcastConfig,
    pub presence: PresenceConfig,
    pub postgres_changes: Vec<ChangeFilter>,
    #[serde(default)]
    pub private: bool,
}

impl ChannelConfig {
    pub fn with_changes(filter: ChangeFilter) -> Self {
        Self {
            postgres_changes: vec![filter],
            ..Self::default()
        }
    }

    pub fn presence_key(mut self, key: impl Into<String>) -> Self {
        self.presence.key = key.into();
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BroadcastConfig {
    #[serde(rename = "self")]
    pub receive_own: bool,
    pub ack: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PresenceConfig {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeFilter {
    pub event: String,
    pub schema: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl ChangeFilter {
    pub fn table(schema: &str, table: &str) -> Self {
        Self {
            event: "*".to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
            filter: None,
        }
    }

    pub fn with_eq(mut self, column: &str, value: &str) -> Self {
        self.filter = Some(format!("{}=eq.{}", column, value));
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Row change as delivered inside a `postgres_changes` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
    #[serde(default)]
    pub record: Option<Value>,
    #[serde(default)]
    pub old_record: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct PostgresChangesPayload {
    data: RawChange,
}

pub fn parse_postgres_change(payload: &Value) -> Result<RawChange, serde_json::Error> {
    PostgresChangesPayload::deserialize(payload).map(|p| p.data)
}
