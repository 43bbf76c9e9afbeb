//! Everything the engine shows a user, built as transport-neutral content.

use chrono::{DateTime, Utc};

use sekitar_shared::types::event::payloads::Button;

use crate::config::EngineConfig;
use crate::engagement::discovery::Candidate;
use crate::models::{Gender, Match, Preference, Profile, RegistrationState};
use crate::transport::{button, OutboundContent};

use super::actions::Action;

fn action(label: &str, action: Action) -> Button {
    button(label, action.to_string())
}

pub fn home_keyboard() -> Vec<Vec<Button>> {
    vec![
        vec![action("▶️ Start swiping", Action::StartSwipe)],
        vec![
            action("🖼 Edit profile", Action::EditProfile),
            action("💎 Diamond", Action::DiamondMenu),
        ],
        vec![
            action("👑 Upgrade to premium", Action::Upgrade),
            action("🚀 Boost profile", Action::Boost),
        ],
        vec![
            action("👻 Ghost mode", Action::Ghost),
            action("❤️ My matches", Action::MyMatches),
        ],
    ]
}

fn home_button() -> Vec<Vec<Button>> {
    vec![vec![action("🏠 Home", Action::Home)]]
}

pub fn home(profile: &Profile, now: DateTime<Utc>) -> OutboundContent {
    let age = profile.age.map_or_else(|| "?".to_string(), |a| a.to_string());
    let premium = if profile.is_premium(now) { "Yes" } else { "No" };
    let ghost = if profile.ghost_mode { "On" } else { "Off" };
    OutboundContent::text(format!(
        "Name: {}\nAge: {age}\nDiamonds: {}\nPremium: {premium}\nGhost mode: {ghost}",
        profile.name_or_default(),
        profile.diamonds,
    ))
    .with_buttons(home_keyboard())
}

/// The question for a registration step. `Active` has none.
pub fn prompt(state: RegistrationState, config: &EngineConfig) -> Option<OutboundContent> {
    let cancel = vec![action("Cancel registration", Action::CancelRegistration)];
    let content = match state {
        RegistrationState::AwaitPhoto => OutboundContent::text(
            "Welcome to Sekitar! Set up your profile to start meeting people nearby.\n\nFirst, send one profile photo (required).",
        )
        .with_buttons(vec![cancel]),
        RegistrationState::AwaitName => {
            OutboundContent::text("Now send your display name (e.g. Budi).").with_buttons(vec![cancel])
        }
        RegistrationState::AwaitDob => OutboundContent::text(
            "Enter your birth date as DD-MM-YYYY (e.g. 17-08-2000).",
        )
        .with_buttons(vec![cancel]),
        RegistrationState::AwaitHeight => {
            OutboundContent::text("Enter your height in cm, e.g. 170.").with_buttons(vec![cancel])
        }
        RegistrationState::AwaitGender => OutboundContent::text("Choose your gender:").with_buttons(vec![
            vec![
                action("Male", Action::Gender(Gender::Male)),
                action("Female", Action::Gender(Gender::Female)),
            ],
            cancel,
        ]),
        RegistrationState::AwaitLooking => OutboundContent::text("Who would you like to meet?").with_buttons(vec![
            vec![
                action("Men", Action::Looking(Preference::Male)),
                action("Women", Action::Looking(Preference::Female)),
                action("Anyone", Action::Looking(Preference::Any)),
            ],
            cancel,
        ]),
        RegistrationState::AwaitBio => {
            OutboundContent::text(format!("Write a short bio (max {} characters).", config.max_bio_chars))
                .with_buttons(vec![cancel])
        }
        RegistrationState::AwaitLocation => OutboundContent::text(
            "Last step: share your location so we can find people around you.",
        )
        .with_buttons(vec![cancel]),
        RegistrationState::Active => return None,
    };
    Some(content)
}

pub fn registration_complete(profile: &Profile, now: DateTime<Utc>) -> OutboundContent {
    let mut content = home(profile, now);
    content.text = format!("✅ Your profile is ready!\n\n{}", content.text);
    content
}

pub fn candidate_card(candidate: &Candidate) -> OutboundContent {
    let p = &candidate.profile;
    let age = p.age.map_or_else(|| "?".to_string(), |a| a.to_string());
    let mut caption = format!("{}, {age} — {:.1} km", p.name_or_default(), candidate.distance_km);
    if let Some(bio) = p.bio.as_deref().filter(|b| !b.is_empty()) {
        caption.push('\n');
        caption.push_str(bio);
    }

    OutboundContent::text(caption)
        .with_photo(p.primary_photo())
        .with_buttons(vec![
            vec![
                action("❤️ Like", Action::Like(p.user_id.clone())),
                action("⏭ Skip", Action::Skip(p.user_id.clone())),
            ],
            vec![action("💎 Reveal username", Action::Reveal(p.user_id.clone()))],
            vec![action("🏠 Home", Action::Home)],
        ])
}

pub fn no_candidates() -> OutboundContent {
    OutboundContent::text("No one new nearby right now. Check back later!").with_buttons(home_keyboard())
}

pub fn edit_profile() -> OutboundContent {
    OutboundContent::text(
        "Edit your profile:\n• send a new photo to replace your main photo\n• /change_name to change your name\n• /change_bio to change your bio\n• share a location to move your search area",
    )
    .with_buttons(home_button())
}

pub fn diamond_menu(profile: &Profile) -> OutboundContent {
    OutboundContent::text(format!(
        "Diamond balance: {}\n\nPackages:\n5 = Rp10.000\n15 = Rp25.000\n50 = Rp60.000\n\nPayment is manual by bank transfer for now. Contact support to top up.",
        profile.diamonds
    ))
    .with_buttons(home_keyboard())
}

pub fn upgrade_info() -> OutboundContent {
    OutboundContent::text(
        "👑 Premium gives you unlimited swipes, 3 diamonds every day and ghost mode.\n\nPayment is manual for now. Contact support to upgrade.",
    )
    .with_buttons(home_keyboard())
}

pub fn boost_info() -> OutboundContent {
    OutboundContent::text(
        "🚀 Boost puts your profile in front of more people for a while.\n\nBoosts are not on sale yet. Stay tuned!",
    )
    .with_buttons(home_keyboard())
}

pub fn ghost_toggled(on: bool) -> OutboundContent {
    let text = if on {
        "👻 Ghost mode is ON. You are hidden from discovery."
    } else {
        "👻 Ghost mode is OFF. People nearby can find you again."
    };
    OutboundContent::text(text).with_buttons(home_keyboard())
}

/// One line per match: counterpart handle and name.
pub fn matches_list(entries: &[(Match, Option<Profile>)], viewer: &str) -> OutboundContent {
    if entries.is_empty() {
        return OutboundContent::text("No matches yet. Keep swiping!").with_buttons(home_keyboard());
    }

    let lines: Vec<String> = entries
        .iter()
        .filter_map(|(m, other)| {
            let other_id = m.counterpart(viewer)?;
            Some(match other {
                Some(p) => format!(
                    "{} — {}",
                    p.handle().unwrap_or_else(|| "(no username)".to_string()),
                    p.name_or_default()
                ),
                None => format!("(account {other_id} deleted)"),
            })
        })
        .collect();

    OutboundContent::text(format!("❤️ Your matches:\n{}", lines.join("\n"))).with_buttons(home_keyboard())
}

pub fn edit_prompt_name() -> OutboundContent {
    OutboundContent::text("Send your new display name.")
}

pub fn edit_prompt_bio(max_chars: usize) -> OutboundContent {
    OutboundContent::text(format!("Send your new bio (max {max_chars} characters)."))
}

pub fn saved(what: &str) -> OutboundContent {
    OutboundContent::text(format!("✅ {what} updated.")).with_buttons(home_keyboard())
}
