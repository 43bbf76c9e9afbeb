use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RabbitMQ Event envelope wrapping all domain events.
///
/// Routing key format: `sekitar.{domain}.{entity}.{action}`
/// Example: `sekitar.engine.match.created`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            user_id: None,
            data,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// RabbitMQ routing keys
pub mod routing_keys {
    // Chat gateway -> engine
    pub const TRANSPORT_EVENT_RECEIVED: &str = "sekitar.transport.event.received";

    // Engine -> chat gateway
    pub const ENGINE_MESSAGE_OUTBOUND: &str = "sekitar.engine.message.outbound";

    // Engine domain events
    pub const ENGINE_MATCH_CREATED: &str = "sekitar.engine.match.created";
}

/// Event data payloads
pub mod payloads {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    /// One inbound interaction from a chat user, as relayed by the gateway.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct UserEventReceived {
        pub user_id: String,
        #[serde(default)]
        pub username: Option<String>,
        pub event: UserEventKind,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum UserEventKind {
        /// A slash command, e.g. `/start`.
        Command { name: String },
        Text { text: String },
        /// A tap on a button; `data` is the button's callback token.
        Choice { data: String },
        /// Opaque reference to an uploaded photo.
        Photo { file_id: String },
        Location { latitude: f64, longitude: f64 },
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Button {
        pub label: String,
        pub data: String,
    }

    /// Structured content the gateway renders for one user.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct OutboundMessage {
        pub user_id: String,
        pub text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub photo: Option<String>,
        /// Rows of buttons.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub buttons: Vec<Vec<Button>>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MatchCreated {
        pub pair_key: String,
        pub user_a: String,
        pub user_b: String,
        pub created_at: DateTime<Utc>,
    }
}
