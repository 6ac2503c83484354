use serde::Serialize;
use serde_json::Value;
use trustlink_core::Entity;

use crate::error::RealtimeError;
use crate::protocol::{ChangeKind, RawChange};

/// A typed row change.
///
/// `Update::old` is only present when the table publishes full pre-change
/// rows; otherwise the platform sends just the primary key.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<T> {
    Insert { new: T },
    Update { new: T, old: Option<T> },
    Delete { id: String },
}

impl<T: Entity> ChangeEvent<T> {
    pub fn from_raw(raw: RawChange) -> Result<Self, RealtimeError> {
        match raw.kind {
            ChangeKind::Insert => Ok(ChangeEvent::Insert {
                new: decode_row(raw.record, "record")?,
            }),
            ChangeKind::Update => Ok(ChangeEvent::Update {
                new: decode_row(raw.record, "record")?,
                old: raw
                    .old_record
                    .and_then(|old| serde_json::from_value::<T>(old).ok()),
            }),
            ChangeKind::Delete => {
                let id = raw
                    .old_record
                    .as_ref()
                    .and_then(|old| old.get("id"))
                    .and_then(id_string)
                    .ok_or_else(|| {
                        RealtimeError::MalformedChange("delete without old_record.id".to_string())
                    })?;
                Ok(ChangeEvent::Delete { id })
            }
        }
    }
}

fn decode_row<T: Entity>(row: Option<Value>, field: &str) -> Result<T, RealtimeError> {
    let row = row.ok_or_else(|| RealtimeError::MalformedChange(format!("missing {}", field)))?;
    serde_json::from_value(row).map_err(|err| RealtimeError::MalformedChange(err.to_string()))
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// User-facing messages produced by a live query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    FetchFailed {
        message: String,
    },
    Connected,
    ItemInserted {
        id: String,
        label: String,
    },
    StatusChanged {
        id: String,
        label: String,
        from: Option<String>,
        to: Option<String>,
    },
    Reconnecting {
        attempt: u32,
        max: u32,
    },
    ConnectionFailed {
        attempts: u32,
    },
}

/// Applies one change to the local collection.
///
/// Inserts are prepended (replacing any stale copy of the same id), updates
/// replace in place and deletes remove by id. The status comparison for an
/// update uses the event's old row when present and the local copy otherwise.
pub fn apply_change<T: Entity>(items: &mut Vec<T>, event: ChangeEvent<T>) -> Option<Notice> {
    match event {
        ChangeEvent::Insert { new } => {
            items.retain(|item| item.id() != new.id());
            let notice = Notice::ItemInserted {
                id: new.id().to_string(),
                label: new.label(),
            };
            items.insert(0, new);
            Some(notice)
        }
        ChangeEvent::Update { new, old } => {
            let position = items.iter().position(|item| item.id() == new.id())?;
            let previous = std::mem::replace(&mut items[position], new);
            let before = old.as_ref().unwrap_or(&previous).status();
            let current = &items[position];
            if before != current.status() {
                Some(Notice::StatusChanged {
                    id: current.id().to_string(),
                    label: current.label(),
                    from: before.map(str::to_string),
                    to: current.status().map(str::to_string),
                })
            } else {
                None
            }
        }
        ChangeEvent::Delete { id } => {
            items.retain(|item| item.id() != id);
            None
        }
    }
}
