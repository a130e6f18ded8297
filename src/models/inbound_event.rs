use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::event_name::EventName;

/// Kind of row-level mutation carried by a `table_change` event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    /// New row inserted
    Insert,

    /// Existing row updated
    Update,

    /// Row deleted
    Delete,
}

/// Event received from the realtime channel.
///
/// The payload is opaque to this crate: consumers always refetch from the
/// source of truth after an invalidation instead of trusting `data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Globally unique per emission; redeliveries reuse the same id.
    #[serde(default)]
    pub id: String,

    /// Application-level event type (e.g. "exam.graded")
    #[serde(rename = "type", default)]
    pub event_type: String,

    /// Target table for `table_change` events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationKind>,

    /// New/current payload
    #[serde(default)]
    pub data: JsonValue,

    /// Previous payload (for updates and deletes)
    #[serde(default, alias = "oldData", skip_serializing_if = "Option::is_none")]
    pub old_data: Option<JsonValue>,

    /// Emission time in millis since Unix epoch
    #[serde(default)]
    pub timestamp: u64,

    /// Originating user, when the mutation was user-initiated
    #[serde(default, alias = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl InboundEvent {
    /// Whether this event targets `table`.
    pub fn targets_table(&self, table: &str) -> bool {
        self.table.as_deref() == Some(table)
    }
}

/// A parsed inbound event together with the channel event name it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    pub name: EventName,
    pub event: InboundEvent,
}
