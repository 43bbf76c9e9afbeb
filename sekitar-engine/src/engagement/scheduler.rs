//! Periodic diamond grants.
//!
//! `last_grant` is both the eligibility cursor and the idempotency marker:
//! it is checked and moved inside the same transaction as the credit, so
//! overlapping ticks cannot grant twice in one period.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use sekitar_shared::errors::AppResult;

use crate::config::EngineConfig;
use crate::models::Profile;
use crate::store::{self, Collection, DocumentStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantTier {
    Free,
    Premium,
}

impl GrantTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantDue {
    pub tier: GrantTier,
    pub amount: u64,
}

/// What `profile` is owed at `now`, if anything.
///
/// Free accounts earn once more than `free_grant_interval_days` have passed
/// since the last grant. Premium accounts earn once per UTC calendar day.
pub fn grant_due(profile: &Profile, config: &EngineConfig, now: DateTime<Utc>) -> Option<GrantDue> {
    if profile.is_premium(now) {
        let granted_today = profile
            .last_grant
            .is_some_and(|at| at.date_naive() == now.date_naive());
        (!granted_today).then_some(GrantDue {
            tier: GrantTier::Premium,
            amount: config.premium_grant_amount,
        })
    } else {
        let interval = chrono::Duration::days(config.free_grant_interval_days);
        let eligible = profile.last_grant.map_or(true, |at| now - at > interval);
        eligible.then_some(GrantDue {
            tier: GrantTier::Free,
            amount: config.free_grant_amount,
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub scanned: usize,
    pub granted: usize,
    pub failed: usize,
}

/// One pass over every profile. A failure on one user is logged and
/// counted; the pass carries on with the rest.
pub async fn run_tick(
    store: &dyn DocumentStore,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> AppResult<TickReport> {
    let profiles: Vec<Profile> = store::scan_docs(store, Collection::Users).await?;
    let mut report = TickReport {
        scanned: profiles.len(),
        ..Default::default()
    };

    for profile in profiles {
        let result = store::update_profile(store, &profile.user_id, |p| {
            let due = grant_due(p, config, now);
            if let Some(due) = due {
                p.credit(due.amount);
                p.last_grant = Some(now);
            }
            Ok(due)
        })
        .await;

        match result {
            Ok(Some(due)) => {
                report.granted += 1;
                counter!("sekitar_diamonds_granted_total", "tier" => due.tier.as_str()).increment(due.amount);
                tracing::debug!(user_id = %profile.user_id, tier = due.tier.as_str(), amount = due.amount, "diamonds granted");
            }
            Ok(None) => {}
            // Deleted since the scan.
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                report.failed += 1;
                counter!("sekitar_grant_tick_failures_total").increment(1);
                tracing::warn!(user_id = %profile.user_id, error = %e, "grant failed, continuing");
            }
        }
    }

    Ok(report)
}

/// Run [`run_tick`] every `every`. A tick still running when the next one
/// is due makes the scheduler skip, never stack, ticks.
pub fn spawn(
    store: Arc<dyn DocumentStore>,
    config: EngineConfig,
    every: Duration,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match tokio::time::timeout(timeout, run_tick(store.as_ref(), &config, Utc::now())).await {
                Ok(Ok(report)) => tracing::info!(
                    scanned = report.scanned,
                    granted = report.granted,
                    failed = report.failed,
                    "grant tick finished"
                ),
                Ok(Err(e)) => {
                    counter!("sekitar_grant_tick_failures_total").increment(1);
                    tracing::error!(error = %e, "grant tick failed");
                }
                Err(_) => tracing::warn!(timeout_secs = timeout.as_secs(), "grant tick timed out"),
            }
        }
    })
}
