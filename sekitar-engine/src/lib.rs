pub mod chat;
pub mod config;
pub mod engagement;
pub mod events;
pub mod models;
pub mod registration;
pub mod routes;
pub mod store;
pub mod transport;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use sekitar_shared::clients::rabbitmq::RabbitMQClient;

use crate::store::DocumentStore;
use crate::transport::Transport;

pub struct AppState {
    pub config: config::AppConfig,
    pub store: Arc<dyn DocumentStore>,
    pub transport: Arc<dyn Transport>,
    /// Domain events go out only when a broker is configured.
    pub rabbitmq: Option<RabbitMQClient>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route("/events", post(routes::events::receive_event))
        .layer(axum::middleware::from_fn(
            sekitar_shared::middleware::metrics_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use chrono::Utc;

    use crate::models::{Gender, GeoPoint, Preference, Profile, RegistrationState};
    use crate::store::{put_doc, Collection, MemoryStore};
    use crate::transport::testing::RecordingTransport;
    use crate::AppState;

    pub fn test_state() -> (Arc<AppState>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let state = AppState {
            config: crate::config::AppConfig::default(),
            store: Arc::new(MemoryStore::new()),
            transport: transport.clone(),
            rabbitmq: None,
            metrics: None,
        };
        (Arc::new(state), transport)
    }

    /// A finished, visible profile: female, open to anyone, aged 25.
    pub fn active(id: &str, latitude: f64, longitude: f64) -> Profile {
        let mut p = Profile::new(id, None, Utc::now());
        p.photos = vec![format!("photo-{id}")];
        p.display_name = Some(format!("user {id}"));
        p.age = Some(25);
        p.height_cm = Some(165);
        p.gender = Some(Gender::Female);
        p.looking_for = Some(Preference::Any);
        p.location = Some(GeoPoint::new(latitude, longitude));
        p.location_enabled = true;
        p.state = RegistrationState::Active;
        p
    }

    pub async fn seed(state: &AppState, profiles: &[Profile]) {
        for p in profiles {
            put_doc(state.store.as_ref(), Collection::Users, &p.user_id, p)
                .await
                .unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::testing::{active, seed, test_state};

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_event(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/events")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn envelope(event_type: &str, data: Value) -> Value {
        json!({
            "id": "01890a5d-ac96-774b-bcce-b302099a8057",
            "source": "sekitar-gateway",
            "event_type": event_type,
            "timestamp": "2026-10-19T08:00:00Z",
            "correlation_id": null,
            "user_id": data["user_id"],
            "data": data,
        })
    }

    #[tokio::test]
    async fn health_reports_store() {
        let (state, _) = test_state();
        let response = router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["checks"][0]["name"], "store");
    }

    #[tokio::test]
    async fn posted_event_is_dispatched() {
        let (state, sent) = test_state();
        seed(&state, &[active("A", 0.0, 0.0), active("B", 0.0, 0.01)]).await;

        let data = json!({"user_id": "A", "event": {"type": "choice", "data": "start_swipe"}});
        let response = router(state)
            .oneshot(post_event(envelope("sekitar.transport.event.received", data)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert!(sent.last_to("A").unwrap().text.starts_with("user B"));
    }

    #[tokio::test]
    async fn wrong_event_type_is_a_bad_request() {
        let (state, _) = test_state();
        let data = json!({"user_id": "A", "event": {"type": "text", "text": "hi"}});
        let response = router(state)
            .oneshot(post_event(envelope("sekitar.engine.match.created", data)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "E0008");
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_not_found() {
        let (state, _) = test_state();
        let response = router(state)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
