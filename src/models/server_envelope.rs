use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Result;

use super::event_name::EventName;
use super::inbound_event::{ChannelEvent, InboundEvent};

/// Server-to-client frame: `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: JsonValue,
}

impl ServerEnvelope {
    /// Parse the event payload.
    ///
    /// Returns `Ok(None)` for event names outside the catalog.
    pub fn into_channel_event(self) -> Result<Option<ChannelEvent>> {
        let Some(name) = EventName::from_name(&self.event) else {
            return Ok(None);
        };
        let event: InboundEvent = if self.data.is_null() {
            InboundEvent::default()
        } else {
            serde_json::from_value(self.data)?
        };
        Ok(Some(ChannelEvent { name, event }))
    }
}

/// Parse a raw text frame into a catalog event.
pub fn parse_frame(text: &str) -> Result<Option<ChannelEvent>> {
    let envelope: ServerEnvelope = serde_json::from_str(text)?;
    envelope.into_channel_event()
}
