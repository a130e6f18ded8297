use serde::{Deserialize, Serialize};

use super::client_message::ClientMessage;

/// One thing a view wants realtime events for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicDescriptor {
    Table(String),
    Channel(String),
    Class(String),
    Exam(String),
    ReportCard(String),
}

impl TopicDescriptor {
    pub fn subscribe_message(&self) -> ClientMessage {
        match self {
            Self::Table(table) => ClientMessage::SubscribeTable {
                table: table.clone(),
            },
            Self::Channel(channel) => ClientMessage::Subscribe {
                channel: channel.clone(),
            },
            Self::Class(class_id) => ClientMessage::SubscribeClass {
                class_id: class_id.clone(),
            },
            Self::Exam(exam_id) => ClientMessage::SubscribeExam {
                exam_id: exam_id.clone(),
            },
            Self::ReportCard(report_card_id) => ClientMessage::SubscribeReportCard {
                report_card_id: report_card_id.clone(),
            },
        }
    }

    pub fn unsubscribe_message(&self) -> ClientMessage {
        match self {
            Self::Table(table) => ClientMessage::UnsubscribeTable {
                table: table.clone(),
            },
            Self::Channel(channel) => ClientMessage::Unsubscribe {
                channel: channel.clone(),
            },
            Self::Class(class_id) => ClientMessage::UnsubscribeClass {
                class_id: class_id.clone(),
            },
            Self::Exam(exam_id) => ClientMessage::UnsubscribeExam {
                exam_id: exam_id.clone(),
            },
            Self::ReportCard(report_card_id) => ClientMessage::UnsubscribeReportCard {
                report_card_id: report_card_id.clone(),
            },
        }
    }
}

/// The set of topics a binder is bound to. Every field is optional.
///
/// # Example
///
/// ```rust
/// use campus_link::Topics;
///
/// let topics = Topics::new().table("report_cards").class_id("class-7b");
/// assert_eq!(topics.descriptors().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_card_id: Option<String>,
}

impl Topics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn class_id(mut self, class_id: impl Into<String>) -> Self {
        self.class_id = Some(class_id.into());
        self
    }

    pub fn exam_id(mut self, exam_id: impl Into<String>) -> Self {
        self.exam_id = Some(exam_id.into());
        self
    }

    pub fn report_card_id(mut self, report_card_id: impl Into<String>) -> Self {
        self.report_card_id = Some(report_card_id.into());
        self
    }

    /// Bound table, if any (empty strings count as unset).
    pub fn bound_table(&self) -> Option<&str> {
        non_empty(&self.table)
    }

    /// Descriptors for every non-empty field, in a stable order.
    pub fn descriptors(&self) -> Vec<TopicDescriptor> {
        let mut out = Vec::with_capacity(5);
        if let Some(table) = non_empty(&self.table) {
            out.push(TopicDescriptor::Table(table.to_string()));
        }
        if let Some(channel) = non_empty(&self.channel) {
            out.push(TopicDescriptor::Channel(channel.to_string()));
        }
        if let Some(class_id) = non_empty(&self.class_id) {
            out.push(TopicDescriptor::Class(class_id.to_string()));
        }
        if let Some(exam_id) = non_empty(&self.exam_id) {
            out.push(TopicDescriptor::Exam(exam_id.to_string()));
        }
        if let Some(report_card_id) = non_empty(&self.report_card_id) {
            out.push(TopicDescriptor::ReportCard(report_card_id.to_string()));
        }
        out
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
