//! Outbound side of the chat channel.
//!
//! The engine only knows "send this content to that user"; rendering and
//! delivery belong to the chat gateway on the other end of the bus.

use async_trait::async_trait;

use sekitar_shared::clients::rabbitmq::RabbitMQClient;
use sekitar_shared::types::event::payloads::{Button, OutboundMessage};
use sekitar_shared::types::event::{routing_keys, Event};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to publish outbound message: {0}")]
    Publish(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundContent {
    pub text: String,
    pub photo: Option<String>,
    pub buttons: Vec<Vec<Button>>,
}

impl OutboundContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_photo(mut self, photo: Option<&str>) -> Self {
        self.photo = photo.map(str::to_string);
        self
    }

    pub fn with_buttons(mut self, buttons: Vec<Vec<Button>>) -> Self {
        self.buttons = buttons;
        self
    }
}

pub fn button(label: impl Into<String>, data: impl Into<String>) -> Button {
    Button {
        label: label.into(),
        data: data.into(),
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, user_id: &str, content: OutboundContent) -> Result<(), TransportError>;
}

/// Send and log on failure. Delivery problems never fail the action that produced them.
pub async fn deliver(transport: &dyn Transport, user_id: &str, content: OutboundContent) {
    if let Err(e) = transport.send(user_id, content).await {
        tracing::error!(user_id = %user_id, error = %e, "failed to deliver message");
    }
}

/// Publishes outbound content on the event bus for the chat gateway.
pub struct RabbitTransport {
    rabbitmq: RabbitMQClient,
}

impl RabbitTransport {
    pub fn new(rabbitmq: RabbitMQClient) -> Self {
        Self { rabbitmq }
    }
}

#[async_trait]
impl Transport for RabbitTransport {
    async fn send(&self, user_id: &str, content: OutboundContent) -> Result<(), TransportError> {
        let event = Event::new(
            "sekitar-engine",
            routing_keys::ENGINE_MESSAGE_OUTBOUND,
            OutboundMessage {
                user_id: user_id.to_string(),
                text: content.text,
                photo: content.photo,
                buttons: content.buttons,
            },
        )
        .with_user(user_id);

        self.rabbitmq
            .publish(routing_keys::ENGINE_MESSAGE_OUTBOUND, &event)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))
    }
}
