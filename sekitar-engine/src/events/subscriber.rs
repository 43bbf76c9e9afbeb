use std::sync::Arc;

use futures_lite::StreamExt;
use lapin::options::BasicAckOptions;

use sekitar_shared::clients::rabbitmq::RabbitMQClient;
use sekitar_shared::types::event::{payloads, routing_keys, Event};

use crate::chat::handlers;
use crate::AppState;

/// Consume user interactions relayed by the chat gateway.
pub async fn listen_user_events(state: Arc<AppState>, rabbitmq: RabbitMQClient) -> anyhow::Result<()> {
    let mut consumer = rabbitmq
        .subscribe(
            "sekitar-engine.transport.event.received",
            &[routing_keys::TRANSPORT_EVENT_RECEIVED],
        )
        .await?;

    tracing::info!("listening for transport.event.received events");

    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                match serde_json::from_slice::<Event<payloads::UserEventReceived>>(&delivery.data) {
                    Ok(event) => {
                        tracing::debug!(
                            event_id = %event.id,
                            user_id = %event.data.user_id,
                            "received user event"
                        );
                        handlers::handle_event(&state, event.data).await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to deserialize transport.event.received event");
                    }
                }
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    tracing::warn!(error = %e, "failed to ack delivery");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "consumer error");
            }
        }
    }

    Ok(())
}
