//! Guided profile setup, one required field per step.
//!
//! A rejected input never moves the state and never touches a field; the
//! caller re-prompts the same step.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use sekitar_shared::errors::{AppError, AppResult, StoreError};

use crate::config::EngineConfig;
use crate::models::{Gender, GeoPoint, Preference, Profile, RegistrationState};
use crate::store::{self, Collection, DocumentStore};

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationInput {
    Photo(String),
    Text(String),
    Gender(Gender),
    Preference(Preference),
    Location(GeoPoint),
}

// --- Field validation ---

pub fn validate_photo(file_id: &str) -> AppResult<String> {
    let trimmed = file_id.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("Please send a profile photo."));
    }
    Ok(trimmed.to_string())
}

pub fn validate_name(input: &str) -> AppResult<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("Your display name can't be empty."));
    }
    Ok(trimmed.to_string())
}

/// Whole years between `birth` and `today`, counting the birthday itself.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years
}

/// Parse a `DD-MM-YYYY` birth date and check the minimum age.
pub fn parse_birth_date(input: &str, today: NaiveDate, min_age: u32) -> AppResult<(NaiveDate, u32)> {
    let birth = NaiveDate::parse_from_str(input.trim(), "%d-%m-%Y")
        .map_err(|_| AppError::validation("Wrong format. Example: 17-08-2000"))?;

    let age = age_on(birth, today);
    if !(0..=120).contains(&age) {
        return Err(AppError::validation("That date doesn't look right."));
    }
    let age = age as u32;
    if age < min_age {
        return Err(AppError::validation(format!(
            "You must be {min_age} or older to use this service."
        )));
    }
    Ok((birth, age))
}

pub fn parse_height(input: &str, config: &EngineConfig) -> AppResult<u16> {
    let invalid = || {
        AppError::validation(format!(
            "Height must be a number between {} and {} cm. Example: 170",
            config.min_height_cm, config.max_height_cm
        ))
    };
    let height: u16 = input.trim().parse().map_err(|_| invalid())?;
    if !(config.min_height_cm..=config.max_height_cm).contains(&height) {
        return Err(invalid());
    }
    Ok(height)
}

/// Bios over the limit are rejected, never truncated.
pub fn validate_bio(input: &str, max_chars: usize) -> AppResult<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("Your bio can't be empty."));
    }
    if trimmed.chars().count() > max_chars {
        return Err(AppError::validation(format!(
            "Your bio is too long. Keep it to {max_chars} characters."
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_location(point: GeoPoint) -> AppResult<GeoPoint> {
    if !point.is_valid() {
        return Err(AppError::validation("That location is not valid."));
    }
    Ok(point)
}

fn wrong_input(expected: &str) -> AppError {
    AppError::validation(format!("Please {expected}."))
}

// --- State machine ---

/// Apply one input at the profile's current step and advance on success.
pub fn apply_input(
    profile: &mut Profile,
    input: RegistrationInput,
    config: &EngineConfig,
    today: NaiveDate,
) -> AppResult<RegistrationState> {
    use RegistrationInput as In;
    use RegistrationState as S;

    let state = profile.state;
    match (state, input) {
        (S::AwaitPhoto, In::Photo(file_id)) => {
            let photo = validate_photo(&file_id)?;
            profile.photos.push(photo);
        }
        (S::AwaitPhoto, _) => return Err(wrong_input("send a profile photo")),

        (S::AwaitName, In::Text(text)) => {
            profile.display_name = Some(validate_name(&text)?);
        }
        (S::AwaitName, _) => return Err(wrong_input("type your display name")),

        (S::AwaitDob, In::Text(text)) => {
            let (birth, age) = parse_birth_date(&text, today, config.min_age)?;
            profile.birth_date = Some(birth);
            profile.age = Some(age);
        }
        (S::AwaitDob, _) => return Err(wrong_input("type your birth date as DD-MM-YYYY")),

        (S::AwaitHeight, In::Text(text)) => {
            profile.height_cm = Some(parse_height(&text, config)?);
        }
        (S::AwaitHeight, _) => return Err(wrong_input("type your height in cm")),

        (S::AwaitGender, In::Gender(gender)) => {
            profile.gender = Some(gender);
        }
        (S::AwaitGender, _) => return Err(wrong_input("choose your gender with the buttons")),

        (S::AwaitLooking, In::Preference(preference)) => {
            profile.looking_for = Some(preference);
        }
        (S::AwaitLooking, _) => return Err(wrong_input("choose who you are looking for with the buttons")),

        (S::AwaitBio, In::Text(text)) => {
            profile.bio = Some(validate_bio(&text, config.max_bio_chars)?);
        }
        (S::AwaitBio, _) => return Err(wrong_input("type a short bio")),

        (S::AwaitLocation, In::Location(point)) => {
            profile.location = Some(validate_location(point)?);
            profile.location_enabled = true;
        }
        (S::AwaitLocation, _) => return Err(wrong_input("share your location")),

        (S::Active, _) => return Err(AppError::bad_request("Your profile is already set up.")),
    }

    profile.state = state.next();
    Ok(profile.state)
}

// --- Store-backed operations ---

/// Create the default profile on first contact. Returns the profile and
/// whether it was just created. A changed chat handle is refreshed.
pub async fn ensure_profile(
    store: &dyn DocumentStore,
    user_id: &str,
    username: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<(Profile, bool)> {
    let fresh = Profile::new(user_id, username.map(str::to_string), now);
    let doc = serde_json::to_value(&fresh).map_err(StoreError::from)?;
    let created = store.create_if_absent(Collection::Users, user_id, doc).await?;
    if created {
        tracing::info!(user_id = %user_id, "profile created");
        return Ok((fresh, true));
    }

    let handle = username.map(str::to_string);
    let profile = store::update_profile(store, user_id, |p| {
        if handle.is_some() && p.username != handle {
            p.username = handle.clone();
        }
        Ok(p.clone())
    })
    .await?;
    Ok((profile, false))
}

/// Feed one input into the state machine of `user_id`.
pub async fn submit(
    store: &dyn DocumentStore,
    config: &EngineConfig,
    user_id: &str,
    input: RegistrationInput,
    today: NaiveDate,
) -> AppResult<RegistrationState> {
    let state = store::update_profile(store, user_id, |p| {
        apply_input(p, input.clone(), config, today)
    })
    .await?;

    if state.is_active() {
        tracing::info!(user_id = %user_id, "registration completed");
    } else {
        tracing::debug!(user_id = %user_id, state = ?state, "registration advanced");
    }
    Ok(state)
}

/// Abort registration by deleting the profile outright.
pub async fn cancel(store: &dyn DocumentStore, user_id: &str) -> AppResult<()> {
    let profile = store::require_profile(store, user_id).await?;
    if profile.state.is_active() {
        return Err(AppError::bad_request("Your registration is already complete."));
    }
    store.delete(Collection::Users, user_id).await?;
    tracing::info!(user_id = %user_id, "registration cancelled, profile deleted");
    Ok(())
}
