use std::sync::Arc;
use std::time::Duration;

use sekitar_engine::config::{AppConfig, StoreBackend};
use sekitar_engine::engagement::scheduler;
use sekitar_engine::events::subscriber;
use sekitar_engine::store::{DocumentStore, MemoryStore, RedisStore};
use sekitar_engine::transport::RabbitTransport;
use sekitar_engine::AppState;
use sekitar_shared::clients::rabbitmq::RabbitMQClient;
use sekitar_shared::clients::redis::RedisClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sekitar_shared::middleware::init_tracing("sekitar-engine");

    let config = AppConfig::load()?;
    let port = config.port;

    let metrics = sekitar_shared::middleware::init_metrics()?;

    // Document store
    let store: Arc<dyn DocumentStore> = match config.store_backend {
        StoreBackend::Redis => {
            let redis = RedisClient::connect(&config.redis_url).await?;
            tracing::info!(url = %config.redis_url, "using redis document store");
            Arc::new(RedisStore::new(redis))
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory document store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Event bus: outbound chat messages and inbound user events
    let rabbitmq = RabbitMQClient::connect(&config.rabbitmq_url).await?;
    let transport = Arc::new(RabbitTransport::new(rabbitmq.clone()));

    let state = Arc::new(AppState {
        config,
        store,
        transport,
        rabbitmq: Some(rabbitmq.clone()),
        metrics: Some(metrics),
    });

    scheduler::spawn(
        state.store.clone(),
        state.config.engine.clone(),
        Duration::from_secs(state.config.grant_tick_secs),
        Duration::from_secs(state.config.grant_tick_timeout_secs),
    );

    let listener_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = subscriber::listen_user_events(listener_state, rabbitmq).await {
            tracing::error!(error = %e, "user event listener stopped");
        }
    });

    let app = sekitar_engine::router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "sekitar-engine starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
