//! Daily like/skip quota. Counters are keyed by UTC calendar day, so the
//! quota resets at 00:00 UTC without any rollover job.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use sekitar_shared::errors::AppResult;

use crate::config::EngineConfig;
use crate::models::{swipe_key, Profile, SwipeCounter};
use crate::store::{self, Collection, DocumentStore, TxAction};

/// `None` when the user has no cap today.
pub fn daily_limit(profile: &Profile, config: &EngineConfig, now: DateTime<Utc>) -> Option<u32> {
    if profile.is_premium(now) {
        None
    } else {
        Some(config.daily_swipe_limit)
    }
}

fn counter_of(value: Option<Value>) -> u32 {
    value
        .and_then(|v| serde_json::from_value::<SwipeCounter>(v).ok())
        .map(|c| c.count)
        .unwrap_or(0)
}

pub async fn count_today(store: &dyn DocumentStore, user_id: &str, now: DateTime<Utc>) -> AppResult<u32> {
    let key = swipe_key(user_id, now.date_naive());
    Ok(counter_of(store.get(Collection::Swipes, &key).await?))
}

/// True when the user may not swipe any more today.
pub async fn is_exhausted(
    store: &dyn DocumentStore,
    config: &EngineConfig,
    profile: &Profile,
    now: DateTime<Utc>,
) -> AppResult<bool> {
    match daily_limit(profile, config, now) {
        None => Ok(false),
        Some(limit) => Ok(count_today(store, &profile.user_id, now).await? >= limit),
    }
}

/// Consume one unit of today's quota if any is left.
///
/// The check and the increment happen in one store transaction, so
/// concurrent swipes can neither overshoot the limit nor lose a count.
pub async fn check_and_increment(
    store: &dyn DocumentStore,
    config: &EngineConfig,
    user_id: &str,
    now: DateTime<Utc>,
) -> AppResult<bool> {
    let profile = store::require_profile(store, user_id).await?;
    let limit = daily_limit(&profile, config, now);
    let key = swipe_key(user_id, now.date_naive());

    let mut allowed = false;
    store
        .transaction(Collection::Swipes, &key, &mut |current| {
            let count = counter_of(current);
            allowed = limit.map_or(true, |l| count < l);
            if allowed {
                TxAction::Write(json!({ "count": count.saturating_add(1) }))
            } else {
                TxAction::Keep
            }
        })
        .await?;

    if !allowed {
        tracing::debug!(user_id = %user_id, limit = ?limit, "daily swipe quota exhausted");
    }
    Ok(allowed)
}

/// Give back one unit taken by [`check_and_increment`] for a swipe that
/// was never recorded.
pub async fn release(store: &dyn DocumentStore, user_id: &str, now: DateTime<Utc>) -> AppResult<()> {
    let key = swipe_key(user_id, now.date_naive());
    store
        .transaction(Collection::Swipes, &key, &mut |current| match counter_of(current) {
            0 => TxAction::Keep,
            count => TxAction::Write(json!({ "count": count - 1 })),
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    use crate::store::{put_doc, MemoryStore};

    async fn seed(store: &dyn DocumentStore, id: &str, premium: bool, now: DateTime<Utc>) {
        let mut profile = Profile::new(id, None, now);
        if premium {
            profile.premium_until = Some(now + Duration::days(30));
        }
        put_doc(store, Collection::Users, id, &profile).await.unwrap();
    }

    #[tokio::test]
    async fn free_user_stops_at_limit() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let now = Utc::now();
        seed(&store, "1", false, now).await;

        for _ in 0..config.daily_swipe_limit {
            assert!(check_and_increment(&store, &config, "1", now).await.unwrap());
        }
        assert!(!check_and_increment(&store, &config, "1", now).await.unwrap());
        assert_eq!(count_today(&store, "1", now).await.unwrap(), config.daily_swipe_limit);

        let profile = store::require_profile(&store, "1").await.unwrap();
        assert!(is_exhausted(&store, &config, &profile, now).await.unwrap());
    }

    #[tokio::test]
    async fn premium_user_is_not_capped() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let now = Utc::now();
        seed(&store, "2", true, now).await;

        for _ in 0..config.daily_swipe_limit + 5 {
            assert!(check_and_increment(&store, &config, "2", now).await.unwrap());
        }
        let profile = store::require_profile(&store, "2").await.unwrap();
        assert!(!is_exhausted(&store, &config, &profile, now).await.unwrap());
    }

    #[tokio::test]
    async fn quota_resets_on_the_next_utc_day() {
        let store = MemoryStore::new();
        let config = EngineConfig {
            daily_swipe_limit: 1,
            ..EngineConfig::default()
        };
        let now = Utc::now();
        seed(&store, "3", false, now).await;

        assert!(check_and_increment(&store, &config, "3", now).await.unwrap());
        assert!(!check_and_increment(&store, &config, "3", now).await.unwrap());
        assert!(check_and_increment(&store, &config, "3", now + Duration::days(1)).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_swipes_never_exceed_limit() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let config = Arc::new(EngineConfig::default());
        let now = Utc::now();
        seed(store.as_ref(), "4", false, now).await;

        let mut tasks = Vec::new();
        for _ in 0..40 {
            let store = store.clone();
            let config = config.clone();
            tasks.push(tokio::spawn(async move {
                check_and_increment(store.as_ref(), &config, "4", now).await.unwrap()
            }));
        }

        let mut allowed = 0;
        for task in tasks {
            if task.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, config.daily_swipe_limit);
        assert_eq!(count_today(store.as_ref(), "4", now).await.unwrap(), config.daily_swipe_limit);
    }

    #[tokio::test]
    async fn released_unit_can_be_used_again() {
        let store = MemoryStore::new();
        let config = EngineConfig {
            daily_swipe_limit: 1,
            ..EngineConfig::default()
        };
        let now = Utc::now();
        seed(&store, "5", false, now).await;

        assert!(check_and_increment(&store, &config, "5", now).await.unwrap());
        release(&store, "5", now).await.unwrap();
        assert_eq!(count_today(&store, "5", now).await.unwrap(), 0);
        // Never goes below zero.
        release(&store, "5", now).await.unwrap();
        assert_eq!(count_today(&store, "5", now).await.unwrap(), 0);
        assert!(check_and_increment(&store, &config, "5", now).await.unwrap());
    }

    #[tokio::test]
    async fn missing_profile_cannot_swipe() {
        let store = MemoryStore::new();
        let err = check_and_increment(&store, &EngineConfig::default(), "nobody", Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
