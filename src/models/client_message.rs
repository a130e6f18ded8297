use serde::{Deserialize, Serialize};

/// Client-to-server messages on the realtime channel.
///
/// Serialized as `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// Receive row-level changes for a table
    #[serde(rename = "subscribe:table")]
    SubscribeTable { table: String },

    /// Join a generic named channel
    #[serde(rename = "subscribe")]
    Subscribe { channel: String },

    /// Receive events scoped to a class
    #[serde(rename = "subscribe:class", rename_all = "camelCase")]
    SubscribeClass { class_id: String },

    /// Receive events scoped to an exam
    #[serde(rename = "subscribe:exam", rename_all = "camelCase")]
    SubscribeExam { exam_id: String },

    /// Receive events scoped to a report card
    #[serde(rename = "subscribe:reportcard", rename_all = "camelCase")]
    SubscribeReportCard { report_card_id: String },

    #[serde(rename = "unsubscribe:table")]
    UnsubscribeTable { table: String },

    #[serde(rename = "unsubscribe")]
    Unsubscribe { channel: String },

    #[serde(rename = "unsubscribe:class", rename_all = "camelCase")]
    UnsubscribeClass { class_id: String },

    #[serde(rename = "unsubscribe:exam", rename_all = "camelCase")]
    UnsubscribeExam { exam_id: String },

    #[serde(rename = "unsubscribe:reportcard", rename_all = "camelCase")]
    UnsubscribeReportCard { report_card_id: String },
}

impl ClientMessage {
    /// Wire name of this message (the `event` field).
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::SubscribeTable { .. } => "subscribe:table",
            Self::Subscribe { .. } => "subscribe",
            Self::SubscribeClass { .. } => "subscribe:class",
            Self::SubscribeExam { .. } => "subscribe:exam",
            Self::SubscribeReportCard { .. } => "subscribe:reportcard",
            Self::UnsubscribeTable { .. } => "unsubscribe:table",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::UnsubscribeClass { .. } => "unsubscribe:class",
            Self::UnsubscribeExam { .. } => "unsubscribe:exam",
            Self::UnsubscribeReportCard { .. } => "unsubscribe:reportcard",
        }
    }

    pub fn is_subscribe(&self) -> bool {
        matches!(
            self,
            Self::SubscribeTable { .. }
                | Self::Subscribe { .. }
                | Self::SubscribeClass { .. }
                | Self::SubscribeExam { .. }
                | Self::SubscribeReportCard { .. }
        )
    }
}
