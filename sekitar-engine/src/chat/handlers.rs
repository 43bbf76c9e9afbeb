//! Routes one inbound chat event to the engine and answers the user.
//!
//! Failures never escape: they are turned into a message plus the options
//! that are valid from where the user stands.

use std::time::Duration;

use chrono::{DateTime, Utc};

use sekitar_shared::errors::{AppError, AppResult, ErrorCode};
use sekitar_shared::types::event::payloads::{UserEventKind, UserEventReceived};

use crate::engagement::{decisions, diamonds, discovery};
use crate::models::{Decision, GeoPoint, PendingEdit, Profile};
use crate::registration::{self, RegistrationInput};
use crate::store::{self, Collection};
use crate::transport::{self, OutboundContent};
use crate::AppState;

use super::actions::{Action, Command};
use super::menus;

pub async fn handle_event(state: &AppState, event: UserEventReceived) {
    let user_id = event.user_id.clone();
    let now = Utc::now();
    if let Err(e) = dispatch(state, event, now).await {
        report_error(state, &user_id, &e).await;
    }
}

pub async fn dispatch(state: &AppState, event: UserEventReceived, now: DateTime<Utc>) -> AppResult<()> {
    let UserEventReceived { user_id, username, event } = event;
    let user_id = user_id.as_str();

    match event {
        UserEventKind::Command { name } => match Command::parse(&name) {
            Some(Command::Start) => start(state, user_id, username.as_deref(), now).await,
            Some(Command::Home) => show_home(state, user_id, now).await,
            Some(Command::ChangeName) => arm_edit(state, user_id, PendingEdit::Name).await,
            Some(Command::ChangeBio) => arm_edit(state, user_id, PendingEdit::Bio).await,
            None => Err(AppError::bad_request("Unknown command. Type /home to see your options.")),
        },
        UserEventKind::Choice { data } => on_action(state, user_id, data.parse()?, now).await,
        UserEventKind::Text { text } => on_text(state, user_id, text, now).await,
        UserEventKind::Photo { file_id } => on_photo(state, user_id, file_id, now).await,
        UserEventKind::Location { latitude, longitude } => {
            on_location(state, user_id, GeoPoint::new(latitude, longitude), now).await
        }
    }
}

async fn send(state: &AppState, user_id: &str, content: OutboundContent) {
    transport::deliver(state.transport.as_ref(), user_id, content).await;
}

fn incomplete() -> AppError {
    AppError::new(
        ErrorCode::RegistrationIncomplete,
        "Finish setting up your profile first.",
    )
}

async fn require_active(state: &AppState, user_id: &str) -> AppResult<Profile> {
    let profile = store::require_profile(state.store.as_ref(), user_id).await?;
    if !profile.state.is_active() {
        return Err(incomplete());
    }
    Ok(profile)
}

// --- Entry points ---

async fn start(state: &AppState, user_id: &str, username: Option<&str>, now: DateTime<Utc>) -> AppResult<()> {
    let (profile, _) = registration::ensure_profile(state.store.as_ref(), user_id, username, now).await?;
    let content = menus::prompt(profile.state, &state.config.engine).unwrap_or_else(|| menus::home(&profile, now));
    send(state, user_id, content).await;
    Ok(())
}

async fn show_home(state: &AppState, user_id: &str, now: DateTime<Utc>) -> AppResult<()> {
    let profile = require_active(state, user_id).await?;
    send(state, user_id, menus::home(&profile, now)).await;
    Ok(())
}

async fn register_step(
    state: &AppState,
    user_id: &str,
    input: RegistrationInput,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let config = &state.config.engine;
    let next = registration::submit(state.store.as_ref(), config, user_id, input, now.date_naive()).await?;

    let content = match menus::prompt(next, config) {
        Some(prompt) => prompt,
        None => {
            let profile = store::require_profile(state.store.as_ref(), user_id).await?;
            menus::registration_complete(&profile, now)
        }
    };
    send(state, user_id, content).await;
    Ok(())
}

// --- Free-form input ---

async fn on_text(state: &AppState, user_id: &str, text: String, now: DateTime<Utc>) -> AppResult<()> {
    let profile = store::require_profile(state.store.as_ref(), user_id).await?;
    if !profile.state.is_active() {
        return register_step(state, user_id, RegistrationInput::Text(text), now).await;
    }

    match profile.pending_edit {
        Some(edit) => apply_edit(state, user_id, edit, &text).await,
        None => {
            send(state, user_id, menus::home(&profile, now)).await;
            Ok(())
        }
    }
}

async fn on_photo(state: &AppState, user_id: &str, file_id: String, now: DateTime<Utc>) -> AppResult<()> {
    let profile = store::require_profile(state.store.as_ref(), user_id).await?;
    if !profile.state.is_active() {
        return register_step(state, user_id, RegistrationInput::Photo(file_id), now).await;
    }

    let photo = registration::validate_photo(&file_id)?;
    store::update_profile(state.store.as_ref(), user_id, |p| {
        match p.photos.first_mut() {
            Some(primary) => *primary = photo.clone(),
            None => p.photos.push(photo.clone()),
        }
        Ok(())
    })
    .await?;
    send(state, user_id, menus::saved("Photo")).await;
    Ok(())
}

async fn on_location(state: &AppState, user_id: &str, point: GeoPoint, now: DateTime<Utc>) -> AppResult<()> {
    let profile = store::require_profile(state.store.as_ref(), user_id).await?;
    if !profile.state.is_active() {
        return register_step(state, user_id, RegistrationInput::Location(point), now).await;
    }

    let point = registration::validate_location(point)?;
    store::update_profile(state.store.as_ref(), user_id, |p| {
        p.location = Some(point);
        p.location_enabled = true;
        Ok(())
    })
    .await?;
    send(state, user_id, menus::saved("Location")).await;
    Ok(())
}

// --- Profile edits ---

async fn arm_edit(state: &AppState, user_id: &str, edit: PendingEdit) -> AppResult<()> {
    store::update_profile(state.store.as_ref(), user_id, |p| {
        if !p.state.is_active() {
            return Err(incomplete());
        }
        p.pending_edit = Some(edit);
        Ok(())
    })
    .await?;

    let prompt = match edit {
        PendingEdit::Name => menus::edit_prompt_name(),
        PendingEdit::Bio => menus::edit_prompt_bio(state.config.engine.max_bio_chars),
    };
    send(state, user_id, prompt).await;
    Ok(())
}

async fn apply_edit(state: &AppState, user_id: &str, edit: PendingEdit, text: &str) -> AppResult<()> {
    let max_bio = state.config.engine.max_bio_chars;
    let label = store::update_profile(state.store.as_ref(), user_id, |p| {
        let label = match edit {
            PendingEdit::Name => {
                p.display_name = Some(registration::validate_name(text)?);
                "Name"
            }
            PendingEdit::Bio => {
                p.bio = Some(registration::validate_bio(text, max_bio)?);
                "Bio"
            }
        };
        p.pending_edit = None;
        Ok(label)
    })
    .await?;

    send(state, user_id, menus::saved(label)).await;
    Ok(())
}

// --- Buttons ---

async fn on_action(state: &AppState, user_id: &str, action: Action, now: DateTime<Utc>) -> AppResult<()> {
    tracing::debug!(user_id = %user_id, action = %action, "handling action");
    let store = state.store.as_ref();

    match action {
        Action::CancelRegistration => {
            registration::cancel(store, user_id).await?;
            send(
                state,
                user_id,
                OutboundContent::text("Registration cancelled. Type /start to begin again."),
            )
            .await;
        }
        Action::Gender(gender) => {
            register_step(state, user_id, RegistrationInput::Gender(gender), now).await?;
        }
        Action::Looking(preference) => {
            register_step(state, user_id, RegistrationInput::Preference(preference), now).await?;
        }
        Action::StartSwipe => present_next(state, user_id, now).await?,
        Action::Like(target) => decide(state, user_id, &target, Decision::Like, now).await?,
        Action::Skip(target) => decide(state, user_id, &target, Decision::Skip, now).await?,
        Action::Reveal(target) => {
            require_active(state, user_id).await?;
            let text = diamonds::reveal(store, user_id, &target, state.config.engine.reveal_cost).await?;
            send(state, user_id, OutboundContent::text(text)).await;
        }
        Action::Home => show_home(state, user_id, now).await?,
        Action::EditProfile => {
            require_active(state, user_id).await?;
            send(state, user_id, menus::edit_profile()).await;
        }
        Action::DiamondMenu => {
            let profile = require_active(state, user_id).await?;
            send(state, user_id, menus::diamond_menu(&profile)).await;
        }
        Action::Upgrade => {
            require_active(state, user_id).await?;
            send(state, user_id, menus::upgrade_info()).await;
        }
        Action::Boost => {
            require_active(state, user_id).await?;
            send(state, user_id, menus::boost_info()).await;
        }
        Action::Ghost => toggle_ghost(state, user_id, now).await?,
        Action::MyMatches => my_matches(state, user_id).await?,
    }
    Ok(())
}

/// Show the nearest candidate, bounded by the discovery timeout.
async fn present_next(state: &AppState, user_id: &str, now: DateTime<Utc>) -> AppResult<()> {
    let limit = Duration::from_millis(state.config.discovery_timeout_ms);
    let found = tokio::time::timeout(
        limit,
        discovery::next_candidate(state.store.as_ref(), &state.config.engine, user_id, now),
    )
    .await
    .map_err(|_| {
        tracing::warn!(user_id = %user_id, timeout_ms = state.config.discovery_timeout_ms, "discovery timed out");
        AppError::new(ErrorCode::Timeout, "Finding people nearby took too long. Please try again.")
    })??;

    let content = match found {
        Some(candidate) => menus::candidate_card(&candidate),
        None => menus::no_candidates(),
    };
    send(state, user_id, content).await;
    Ok(())
}

async fn decide(
    state: &AppState,
    user_id: &str,
    target: &str,
    decision: Decision,
    now: DateTime<Utc>,
) -> AppResult<()> {
    decisions::record_decision(state, user_id, target, decision, now).await?;
    present_next(state, user_id, now).await
}

async fn toggle_ghost(state: &AppState, user_id: &str, now: DateTime<Utc>) -> AppResult<()> {
    let on = store::update_profile(state.store.as_ref(), user_id, |p| {
        if !p.state.is_active() {
            return Err(incomplete());
        }
        if p.ghost_mode {
            p.ghost_mode = false;
            return Ok(false);
        }
        if !p.is_premium(now) {
            return Err(AppError::new(
                ErrorCode::PremiumRequired,
                "Ghost mode is a premium feature. Tap 👑 Upgrade to learn more.",
            ));
        }
        p.ghost_mode = true;
        Ok(true)
    })
    .await?;

    tracing::info!(user_id = %user_id, ghost_mode = on, "ghost mode toggled");
    send(state, user_id, menus::ghost_toggled(on)).await;
    Ok(())
}

async fn my_matches(state: &AppState, user_id: &str) -> AppResult<()> {
    require_active(state, user_id).await?;
    let matches = decisions::matches_of(state, user_id).await?;

    let others: Vec<String> = matches
        .iter()
        .map(|m| m.counterpart(user_id).unwrap_or_default().to_string())
        .collect();
    let docs = state.store.get_many(Collection::Users, &others).await?;

    let entries: Vec<_> = matches
        .into_iter()
        .zip(docs)
        .map(|(m, doc)| (m, doc.and_then(|d| serde_json::from_value::<Profile>(d).ok())))
        .collect();
    send(state, user_id, menus::matches_list(&entries, user_id)).await;
    Ok(())
}

// --- Failures ---

async fn report_error(state: &AppState, user_id: &str, err: &AppError) {
    match err {
        AppError::Known { code, .. } => {
            tracing::warn!(user_id = %user_id, code = code.code(), error = %err, "action rejected")
        }
        _ => tracing::error!(user_id = %user_id, error = %err, "action failed"),
    }

    let mut reply = OutboundContent::text(err.user_message());
    if !err.is_not_found() {
        // Re-display whatever is valid from the user's current position.
        match store::get_profile(state.store.as_ref(), user_id).await {
            Ok(Some(profile)) if !profile.state.is_active() => {
                if let Some(prompt) = menus::prompt(profile.state, &state.config.engine) {
                    reply.text = format!("{}\n\n{}", reply.text, prompt.text);
                    reply.buttons = prompt.buttons;
                }
            }
            Ok(Some(profile)) if profile.pending_edit.is_none() => {
                reply.buttons = menus::home_keyboard();
            }
            Ok(_) => {}
            Err(e) => tracing::error!(user_id = %user_id, error = %e, "failed to load profile for error reply"),
        }
    }
    send(state, user_id, reply).await;
}
