use chrono::{DateTime, Utc};
use metrics::counter;

use sekitar_shared::errors::{AppError, AppResult, ErrorCode, StoreError};

use crate::events::publisher;
use crate::models::{decision_key, Decision, DecisionRecord, Match, Profile};
use crate::store::{self, Collection};
use crate::transport::{self, OutboundContent};
use crate::AppState;

use super::swipes;

fn invalid_target(message: &str) -> AppError {
    AppError::new(ErrorCode::InvalidTarget, message)
}

/// Text telling `viewer` how to reach `other` after a match.
pub fn match_notice(other: &Profile) -> String {
    match other.handle() {
        Some(handle) => format!(
            "🎉 It's a match! You and {} like each other.\nSay hi: {handle}",
            other.name_or_default()
        ),
        None => format!(
            "🎉 It's a match! You and {} like each other.\nThey haven't set a username yet, so ask them to add one.",
            other.name_or_default()
        ),
    }
}

/// Match notice for when the other profile could not be loaded.
fn match_notice_without_profile() -> String {
    "🎉 It's a match! Open My Matches from the home menu to see who it is.".to_string()
}

fn already_matched_notice(other: &Profile) -> String {
    format!(
        "💞 You and {} are already matched. Find them under My Matches.",
        other.name_or_default()
    )
}

/// Record `from`'s decision about `to`. Returns true only when this call
/// created the match between them.
///
/// Quota is consumed before anything is written; an exhausted quota
/// rejects the decision outright. A decision that fails to store hands
/// its quota unit back.
pub async fn record_decision(
    state: &AppState,
    from: &str,
    to: &str,
    decision: Decision,
    now: DateTime<Utc>,
) -> AppResult<bool> {
    let store = state.store.as_ref();
    let config = &state.config.engine;

    if from == to {
        return Err(invalid_target("You can't like or skip yourself."));
    }
    let actor = store::require_profile(store, from).await?;
    if !actor.state.is_active() {
        return Err(AppError::new(
            ErrorCode::RegistrationIncomplete,
            "Finish setting up your profile first. Type /start to continue.",
        ));
    }
    let Some(target) = store::get_profile(store, to).await? else {
        return Err(invalid_target("That profile is no longer available."));
    };

    if !swipes::check_and_increment(store, config, from, now).await? {
        return Err(AppError::quota_exceeded(
            "You've used all your swipes for today. Come back tomorrow, or go premium for unlimited swipes.",
        ));
    }

    let record = DecisionRecord {
        from: from.to_string(),
        to: to.to_string(),
        decision,
        decided_at: now,
    };
    if let Err(e) = store::put_doc(store, Collection::Likes, &decision_key(from, to), &record).await {
        if let Err(release_err) = swipes::release(store, from, now).await {
            tracing::error!(user_id = %from, error = %release_err, "failed to release swipe after lost decision");
        }
        return Err(e.into());
    }
    counter!("sekitar_swipes_total", "decision" => decision.as_str()).increment(1);
    tracing::debug!(from = %from, to = %to, decision = decision.as_str(), "decision recorded");

    if decision == Decision::Skip {
        return Ok(false);
    }

    let reciprocal: Option<DecisionRecord> =
        store::get_doc(store, Collection::Likes, &decision_key(to, from)).await?;
    let mutual = reciprocal.is_some_and(|r| r.decision == Decision::Like);

    if !mutual {
        transport::deliver(
            state.transport.as_ref(),
            from,
            OutboundContent::text("❤️ Liked! We'll tell you if it's mutual."),
        )
        .await;
        return Ok(false);
    }

    let pair = Match::new(from, to, now);
    let doc = serde_json::to_value(&pair).map_err(StoreError::from)?;
    let created = store
        .create_if_absent(Collection::Matches, &pair.pair_key, doc)
        .await?;
    if created {
        on_match_created(state, &pair).await;
    } else {
        transport::deliver(
            state.transport.as_ref(),
            from,
            OutboundContent::text(already_matched_notice(&target)),
        )
        .await;
    }
    Ok(created)
}

/// Notify both sides once. Only the caller that created the match gets
/// here, and the match is already committed, so nothing in here may fail.
async fn on_match_created(state: &AppState, pair: &Match) {
    counter!("sekitar_matches_created_total").increment(1);
    tracing::info!(pair_key = %pair.pair_key, "match created");

    let store = state.store.as_ref();
    let transport = state.transport.as_ref();
    for (recipient, other) in [(&pair.user_a, &pair.user_b), (&pair.user_b, &pair.user_a)] {
        let text = match store::get_profile(store, other).await {
            Ok(Some(profile)) => match_notice(&profile),
            Ok(None) => {
                tracing::warn!(pair_key = %pair.pair_key, user_id = %other, "match participant vanished before notification");
                match_notice_without_profile()
            }
            Err(e) => {
                counter!("sekitar_match_notice_fallbacks_total").increment(1);
                tracing::warn!(pair_key = %pair.pair_key, user_id = %other, error = %e, "profile load failed, sending plain match notice");
                match_notice_without_profile()
            }
        };
        transport::deliver(transport, recipient, OutboundContent::text(text)).await;
    }

    if let Some(rabbitmq) = &state.rabbitmq {
        publisher::publish_match_created(rabbitmq, pair).await;
    }
}

/// Every match `user_id` takes part in, oldest first.
pub async fn matches_of(state: &AppState, user_id: &str) -> AppResult<Vec<Match>> {
    let mut matches: Vec<Match> = store::scan_docs::<Match>(state.store.as_ref(), Collection::Matches)
        .await?
        .into_iter()
        .filter(|m| m.involves(user_id))
        .collect();
    matches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.pair_key.cmp(&b.pair_key)));
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::models::pair_key;
    use crate::store::{DocumentStore, MemoryStore, TxFn};
    use crate::testing::{active, seed, test_state};
    use crate::transport::testing::RecordingTransport;

    /// Memory store with switchable faults.
    #[derive(Default)]
    struct FaultyStore {
        inner: MemoryStore,
        /// Profile reads fail once any match exists.
        fail_user_reads_after_match: bool,
        fail_decision_writes: bool,
    }

    impl FaultyStore {
        async fn any_match(&self) -> bool {
            !self.inner.scan_all(Collection::Matches).await.unwrap().is_empty()
        }
    }

    #[async_trait]
    impl DocumentStore for FaultyStore {
        async fn get(&self, c: Collection, key: &str) -> Result<Option<Value>, StoreError> {
            if c == Collection::Users && self.fail_user_reads_after_match && self.any_match().await {
                return Err(StoreError::Backend("transient".into()));
            }
            self.inner.get(c, key).await
        }
        async fn set(&self, c: Collection, key: &str, doc: Value) -> Result<(), StoreError> {
            if c == Collection::Likes && self.fail_decision_writes {
                return Err(StoreError::Backend("write rejected".into()));
            }
            self.inner.set(c, key, doc).await
        }
        async fn delete(&self, c: Collection, key: &str) -> Result<(), StoreError> {
            self.inner.delete(c, key).await
        }
        async fn transaction(&self, c: Collection, key: &str, f: &mut TxFn<'_>) -> Result<(), StoreError> {
            self.inner.transaction(c, key, f).await
        }
        async fn scan_all(&self, c: Collection) -> Result<Vec<Value>, StoreError> {
            self.inner.scan_all(c).await
        }
    }

    fn state_with(store: FaultyStore) -> (Arc<AppState>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let state = AppState {
            config: crate::config::AppConfig::default(),
            store: Arc::new(store),
            transport: transport.clone(),
            rabbitmq: None,
            metrics: None,
        };
        (Arc::new(state), transport)
    }

    fn match_texts(texts: &[String]) -> usize {
        texts.iter().filter(|t| t.contains("It's a match")).count()
    }

    #[tokio::test]
    async fn mutual_like_creates_one_match_and_notifies_both() {
        let (state, sent) = test_state();
        let mut a = active("A", 0.0, 0.0);
        a.username = Some("andi".into());
        let b = active("B", 0.0, 0.01);
        seed(&state, &[a, b]).await;
        let now = Utc::now();

        assert!(!record_decision(&state, "A", "B", Decision::Like, now).await.unwrap());
        assert!(record_decision(&state, "B", "A", Decision::Like, now).await.unwrap());
        // A third like on the same pair changes nothing.
        assert!(!record_decision(&state, "A", "B", Decision::Like, now).await.unwrap());

        let matches = matches_of(&state, "A").await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].pair_key, pair_key("A", "B"));

        let to_a = sent.texts_to("A");
        let to_b = sent.texts_to("B");
        assert_eq!(match_texts(&to_a), 1);
        assert_eq!(match_texts(&to_b), 1);
        // B learns A's handle; A gets the fallback since B has none.
        assert!(to_b.iter().any(|t| t.contains("@andi")));
        assert!(to_a.iter().any(|t| t.contains("haven't set a username")));
        assert!(to_a.last().unwrap().contains("already matched"));
    }

    #[tokio::test]
    async fn match_is_announced_even_when_profiles_cannot_be_loaded() {
        let (state, sent) = state_with(FaultyStore {
            fail_user_reads_after_match: true,
            ..Default::default()
        });
        seed(&state, &[active("A", 0.0, 0.0), active("B", 0.0, 0.01)]).await;
        let now = Utc::now();

        assert!(!record_decision(&state, "A", "B", Decision::Like, now).await.unwrap());
        assert!(record_decision(&state, "B", "A", Decision::Like, now).await.unwrap());

        assert_eq!(matches_of(&state, "A").await.unwrap().len(), 1);
        assert_eq!(match_texts(&sent.texts_to("A")), 1);
        assert_eq!(match_texts(&sent.texts_to("B")), 1);
    }

    #[tokio::test]
    async fn lost_decision_write_gives_the_swipe_back() {
        let (state, _) = state_with(FaultyStore {
            fail_decision_writes: true,
            ..Default::default()
        });
        seed(&state, &[active("A", 0.0, 0.0), active("B", 0.0, 0.01)]).await;
        let now = Utc::now();

        assert!(record_decision(&state, "A", "B", Decision::Skip, now).await.is_err());
        assert_eq!(swipes::count_today(state.store.as_ref(), "A", now).await.unwrap(), 0);
        let stored = state.store.get(Collection::Likes, &decision_key("A", "B")).await.unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn skip_never_matches() {
        let (state, sent) = test_state();
        seed(&state, &[active("A", 0.0, 0.0), active("B", 0.0, 0.01)]).await;
        let now = Utc::now();

        record_decision(&state, "A", "B", Decision::Like, now).await.unwrap();
        assert!(!record_decision(&state, "B", "A", Decision::Skip, now).await.unwrap());
        assert!(matches_of(&state, "A").await.unwrap().is_empty());
        assert!(sent.texts_to("B").is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mutual_likes_create_exactly_one_match() {
        for _ in 0..20 {
            let (state, sent) = test_state();
            seed(&state, &[active("A", 0.0, 0.0), active("B", 0.0, 0.01)]).await;
            let now = Utc::now();

            let s1 = state.clone();
            let s2 = state.clone();
            let t1 = tokio::spawn(async move { record_decision(&s1, "A", "B", Decision::Like, now).await });
            let t2 = tokio::spawn(async move { record_decision(&s2, "B", "A", Decision::Like, now).await });
            let r1 = t1.await.unwrap().unwrap();
            let r2 = t2.await.unwrap().unwrap();

            assert!(r1 ^ r2, "exactly one call must report the new match");
            assert_eq!(matches_of(&state, "B").await.unwrap().len(), 1);
            assert_eq!(match_texts(&sent.texts_to("A")), 1);
            assert_eq!(match_texts(&sent.texts_to("B")), 1);
        }
    }

    #[tokio::test]
    async fn exhausted_quota_writes_nothing() {
        let (state, _) = test_state();
        let state = Arc::new(crate::AppState {
            config: crate::config::AppConfig {
                engine: crate::config::EngineConfig {
                    daily_swipe_limit: 0,
                    ..Default::default()
                },
                ..Default::default()
            },
            store: state.store.clone(),
            transport: state.transport.clone(),
            rabbitmq: None,
            metrics: None,
        });
        seed(&state, &[active("A", 0.0, 0.0), active("B", 0.0, 0.01)]).await;

        let err = record_decision(&state, "A", "B", Decision::Like, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::QuotaExceeded);
        let stored = state.store.get(Collection::Likes, &decision_key("A", "B")).await.unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn invalid_targets_are_rejected() {
        let (state, _) = test_state();
        seed(&state, &[active("A", 0.0, 0.0)]).await;
        let now = Utc::now();

        let err = record_decision(&state, "A", "A", Decision::Like, now).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTarget);
        let err = record_decision(&state, "A", "nobody", Decision::Skip, now).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTarget);
        assert_eq!(swipes::count_today(state.store.as_ref(), "A", now).await.unwrap(), 0);
    }
}
