//! Button callback tokens and slash commands.

use std::fmt;
use std::str::FromStr;

use sekitar_shared::errors::AppError;

use crate::models::{Gender, Preference, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CancelRegistration,
    Gender(Gender),
    Looking(Preference),
    StartSwipe,
    Like(UserId),
    Skip(UserId),
    Reveal(UserId),
    Home,
    EditProfile,
    DiamondMenu,
    Upgrade,
    Boost,
    Ghost,
    MyMatches,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CancelRegistration => f.write_str("cancel_reg"),
            Self::Gender(Gender::Male) => f.write_str("gender_m"),
            Self::Gender(Gender::Female) => f.write_str("gender_f"),
            Self::Looking(Preference::Male) => f.write_str("look_m"),
            Self::Looking(Preference::Female) => f.write_str("look_f"),
            Self::Looking(Preference::Any) => f.write_str("look_any"),
            Self::StartSwipe => f.write_str("start_swipe"),
            Self::Like(id) => write!(f, "like_{id}"),
            Self::Skip(id) => write!(f, "skip_{id}"),
            Self::Reveal(id) => write!(f, "diamond_{id}"),
            Self::Home => f.write_str("goto_home"),
            Self::EditProfile => f.write_str("edit_profile"),
            Self::DiamondMenu => f.write_str("diamond"),
            Self::Upgrade => f.write_str("upgrade"),
            Self::Boost => f.write_str("boost"),
            Self::Ghost => f.write_str("ghost"),
            Self::MyMatches => f.write_str("my_matches"),
        }
    }
}

fn target(id: &str) -> Result<UserId, AppError> {
    if id.is_empty() {
        Err(AppError::bad_request("That button has expired. Type /home to start over."))
    } else {
        Ok(id.to_string())
    }
}

impl FromStr for Action {
    type Err = AppError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let action = match token {
            "cancel_reg" => Self::CancelRegistration,
            "gender_m" => Self::Gender(Gender::Male),
            "gender_f" => Self::Gender(Gender::Female),
            "look_m" => Self::Looking(Preference::Male),
            "look_f" => Self::Looking(Preference::Female),
            "look_any" => Self::Looking(Preference::Any),
            "start_swipe" => Self::StartSwipe,
            "goto_home" => Self::Home,
            "edit_profile" => Self::EditProfile,
            "diamond" => Self::DiamondMenu,
            "upgrade" => Self::Upgrade,
            "boost" => Self::Boost,
            "ghost" => Self::Ghost,
            "my_matches" => Self::MyMatches,
            _ => {
                if let Some(id) = token.strip_prefix("like_") {
                    Self::Like(target(id)?)
                } else if let Some(id) = token.strip_prefix("skip_") {
                    Self::Skip(target(id)?)
                } else if let Some(id) = token.strip_prefix("diamond_") {
                    Self::Reveal(target(id)?)
                } else {
                    return Err(AppError::bad_request(
                        "That button has expired. Type /home to start over.",
                    ));
                }
            }
        };
        Ok(action)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Home,
    ChangeName,
    ChangeBio,
}

impl Command {
    /// Accepts `start`, `/start` and `/start@SomeBot`.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().trim_start_matches('/');
        let name = name.split('@').next().unwrap_or(name);
        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "home" => Some(Self::Home),
            "change_name" => Some(Self::ChangeName),
            "change_bio" => Some(Self::ChangeBio),
            _ => None,
        }
    }
}
