//! Diamond balance. Every change goes through [`consume`] or [`grant`],
//! each a single profile transaction.

use metrics::counter;

use sekitar_shared::errors::{AppError, AppResult, ErrorCode};

use crate::store::{self, DocumentStore};

/// Take `amount` diamonds if the balance covers it. On false the balance is untouched.
pub async fn consume(store: &dyn DocumentStore, user_id: &str, amount: u64) -> AppResult<bool> {
    let taken = store::update_profile(store, user_id, |p| Ok(p.debit(amount))).await?;
    if taken {
        counter!("sekitar_diamonds_consumed_total").increment(amount);
    }
    Ok(taken)
}

/// Add `amount` diamonds and return the new balance.
pub async fn grant(store: &dyn DocumentStore, user_id: &str, amount: u64) -> AppResult<u64> {
    let balance = store::update_profile(store, user_id, |p| Ok(p.credit(amount))).await?;
    counter!("sekitar_diamonds_granted_total", "tier" => "manual").increment(amount);
    Ok(balance)
}

/// Spend `cost` diamonds to learn how to reach `target_id`.
/// Returns the text to show the requester.
pub async fn reveal(
    store: &dyn DocumentStore,
    user_id: &str,
    target_id: &str,
    cost: u64,
) -> AppResult<String> {
    if user_id == target_id {
        return Err(AppError::new(ErrorCode::InvalidTarget, "That's your own profile."));
    }
    let target = store::get_profile(store, target_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::InvalidTarget, "That profile is no longer available."))?;

    if !consume(store, user_id, cost).await? {
        return Err(AppError::insufficient_balance(
            "You don't have enough diamonds. Open 💎 Diamond to top up.",
        ));
    }
    tracing::info!(user_id = %user_id, target_id = %target_id, cost, "contact revealed");

    Ok(match target.handle() {
        Some(handle) => format!("💎 {}'s username: {handle}", target.name_or_default()),
        None => format!(
            "💎 {} hasn't set a username yet. Ask them to add one in their chat settings.",
            target.name_or_default()
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    use crate::models::Profile;
    use crate::store::{put_doc, require_profile, Collection, MemoryStore};

    async fn with_balance(store: &dyn DocumentStore, id: &str, diamonds: u64, username: Option<&str>) {
        let mut profile = Profile::new(id, username.map(str::to_string), Utc::now());
        profile.display_name = Some(format!("user {id}"));
        profile.diamonds = diamonds;
        put_doc(store, Collection::Users, id, &profile).await.unwrap();
    }

    #[tokio::test]
    async fn consume_fails_without_touching_balance() {
        let store = MemoryStore::new();
        with_balance(&store, "1", 1, None).await;

        assert!(!consume(&store, "1", 2).await.unwrap());
        assert_eq!(require_profile(&store, "1").await.unwrap().diamonds, 1);
        assert!(consume(&store, "1", 1).await.unwrap());
        assert_eq!(require_profile(&store, "1").await.unwrap().diamonds, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consume_and_grant_stay_consistent() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        with_balance(store.as_ref(), "1", 5, None).await;

        let mut spends = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            spends.push(tokio::spawn(async move { consume(store.as_ref(), "1", 1).await.unwrap() }));
        }
        let mut grants = Vec::new();
        for _ in 0..3 {
            let store = store.clone();
            grants.push(tokio::spawn(async move { grant(store.as_ref(), "1", 1).await.unwrap() }));
        }

        let mut spent = 0u64;
        for task in spends {
            if task.await.unwrap() {
                spent += 1;
            }
        }
        for task in grants {
            task.await.unwrap();
        }

        let balance = require_profile(store.as_ref(), "1").await.unwrap().diamonds;
        assert_eq!(balance, 5 + 3 - spent);
        assert!(spent <= 8);
    }

    #[tokio::test]
    async fn reveal_shows_handle_and_charges() {
        let store = MemoryStore::new();
        with_balance(&store, "me", 2, None).await;
        with_balance(&store, "her", 0, Some("sari")).await;

        let text = reveal(&store, "me", "her", 1).await.unwrap();
        assert!(text.contains("@sari"));
        assert_eq!(require_profile(&store, "me").await.unwrap().diamonds, 1);
    }

    #[tokio::test]
    async fn reveal_without_diamonds_has_no_side_effects() {
        let store = MemoryStore::new();
        with_balance(&store, "me", 0, None).await;
        with_balance(&store, "her", 0, None).await;

        let err = reveal(&store, "me", "her", 1).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientBalance);
        assert_eq!(require_profile(&store, "me").await.unwrap().diamonds, 0);
    }

    #[tokio::test]
    async fn reveal_of_unknown_target_costs_nothing() {
        let store = MemoryStore::new();
        with_balance(&store, "me", 3, None).await;

        let err = reveal(&store, "me", "gone", 1).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTarget);
        assert_eq!(require_profile(&store, "me").await.unwrap().diamonds, 3);
    }

    #[tokio::test]
    async fn fallback_when_target_has_no_handle() {
        let store = MemoryStore::new();
        with_balance(&store, "me", 1, None).await;
        with_balance(&store, "him", 0, None).await;

        let text = reveal(&store, "me", "him", 1).await.unwrap();
        assert!(text.contains("hasn't set a username"));
    }
}
