//! Data models for the campus-link realtime layer.
//!
//! Defines the wire envelopes exchanged with the realtime server, the
//! inbound event shape, topic descriptors and connection options.

pub mod client_message;
pub mod connection_options;
pub mod event_name;
pub mod inbound_event;
pub mod query_key;
pub mod server_envelope;
pub mod topic;


pub use client_message::ClientMessage;
pub use connection_options::ConnectionOptions;
pub use event_name::EventName;
pub use inbound_event::{ChannelEvent, InboundEvent, OperationKind};
pub use query_key::QueryKey;
pub use server_envelope::{parse_frame, ServerEnvelope};
pub use topic::{TopicDescriptor, Topics};
