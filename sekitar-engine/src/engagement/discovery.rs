use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};

use sekitar_shared::errors::{AppError, AppResult, ErrorCode};

use crate::config::EngineConfig;
use crate::models::{decision_key, GeoPoint, Preference, Profile, UserId};
use crate::store::{self, Collection, DocumentStore};

use super::swipes;

/// A profile ready to show, with its distance from the viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub profile: Profile,
    pub distance_km: f64,
}

/// Haversine distance in km between two points.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    const R: f64 = 6371.0; // Earth radius in km
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();
    R * c
}

/// Profiles the viewer could ever be shown: discoverable, not the viewer,
/// and matching the viewer's own preference. The candidate's preference is
/// not consulted.
fn eligible(viewer: &Profile, candidate: &Profile) -> bool {
    let preference = viewer.looking_for.unwrap_or(Preference::Any);
    candidate.user_id != viewer.user_id
        && candidate.is_discoverable()
        && preference.accepts(candidate.gender)
}

/// Order eligible, undecided profiles nearest first. Equal distances fall
/// back to user id so identical inputs always rank identically.
pub fn rank_candidates(
    viewer: &Profile,
    origin: GeoPoint,
    pool: Vec<Profile>,
    decided: &HashSet<UserId>,
) -> Vec<Candidate> {
    let mut ranked: Vec<Candidate> = pool
        .into_iter()
        .filter(|p| eligible(viewer, p) && !decided.contains(&p.user_id))
        .filter_map(|profile| {
            let at = profile.active_location()?;
            Some(Candidate {
                distance_km: haversine_km(origin, at),
                profile,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.profile.user_id.cmp(&b.profile.user_id))
    });
    ranked
}

/// Users `viewer_id` already liked or skipped among `candidates`.
async fn decided_among(
    store: &dyn DocumentStore,
    viewer_id: &str,
    candidates: &[Profile],
) -> AppResult<HashSet<UserId>> {
    let keys: Vec<String> = candidates
        .iter()
        .map(|c| decision_key(viewer_id, &c.user_id))
        .collect();
    let found = store.get_many(Collection::Likes, &keys).await?;

    Ok(candidates
        .iter()
        .zip(found)
        .filter(|(_, doc)| doc.is_some())
        .map(|(c, _)| c.user_id.clone())
        .collect())
}

/// Find the nearest undecided candidate and mark it as presented.
pub async fn next_candidate(
    store: &dyn DocumentStore,
    config: &EngineConfig,
    user_id: &str,
    now: DateTime<Utc>,
) -> AppResult<Option<Candidate>> {
    let viewer = store::require_profile(store, user_id).await?;
    if !viewer.state.is_active() {
        return Err(AppError::new(
            ErrorCode::RegistrationIncomplete,
            "Finish setting up your profile first. Type /start to continue.",
        ));
    }

    if swipes::is_exhausted(store, config, &viewer, now).await? {
        return Err(AppError::quota_exceeded(
            "You've used all your swipes for today. Come back tomorrow, or go premium for unlimited swipes.",
        ));
    }

    let origin = viewer.active_location().ok_or_else(|| {
        AppError::precondition("Share your location first so we can find people near you.")
    })?;

    let pool: Vec<Profile> = store::scan_docs::<Profile>(store, Collection::Users)
        .await?
        .into_iter()
        .filter(|p| eligible(&viewer, p))
        .collect();
    let decided = decided_among(store, user_id, &pool).await?;

    let scanned = pool.len();
    let next = rank_candidates(&viewer, origin, pool, &decided).into_iter().next();
    tracing::debug!(
        user_id = %user_id,
        scanned,
        excluded = decided.len(),
        found = next.is_some(),
        "discovery pass"
    );

    let presenting = next.as_ref().map(|c| c.profile.user_id.clone());
    store::update_profile(store, user_id, |p| {
        p.presenting = presenting.clone();
        Ok(())
    })
    .await?;

    Ok(next)
}
