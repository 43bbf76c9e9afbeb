use sekitar_shared::clients::rabbitmq::RabbitMQClient;
use sekitar_shared::types::event::{payloads, routing_keys, Event};

use crate::models::Match;

pub async fn publish_match_created(rabbitmq: &RabbitMQClient, pair: &Match) {
    let event = Event::new(
        "sekitar-engine",
        routing_keys::ENGINE_MATCH_CREATED,
        payloads::MatchCreated {
            pair_key: pair.pair_key.clone(),
            user_a: pair.user_a.clone(),
            user_b: pair.user_b.clone(),
            created_at: pair.created_at,
        },
    )
    .with_user(pair.user_a.as_str());

    if let Err(e) = rabbitmq
        .publish(routing_keys::ENGINE_MATCH_CREATED, &event)
        .await
    {
        tracing::error!(error = %e, pair_key = %pair.pair_key, "failed to publish match.created event");
    }
}
