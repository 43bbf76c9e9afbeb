use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = String;

// --- Registration lifecycle ---

/// Registration steps in forward order; `Active` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    AwaitPhoto,
    AwaitName,
    AwaitDob,
    AwaitHeight,
    AwaitGender,
    AwaitLooking,
    AwaitBio,
    AwaitLocation,
    Active,
}

impl RegistrationState {
    pub fn next(self) -> Self {
        match self {
            Self::AwaitPhoto => Self::AwaitName,
            Self::AwaitName => Self::AwaitDob,
            Self::AwaitDob => Self::AwaitHeight,
            Self::AwaitHeight => Self::AwaitGender,
            Self::AwaitGender => Self::AwaitLooking,
            Self::AwaitLooking => Self::AwaitBio,
            Self::AwaitBio => Self::AwaitLocation,
            Self::AwaitLocation | Self::Active => Self::Active,
        }
    }

    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

/// Who a user wants to be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preference {
    Male,
    Female,
    Any,
}

impl Preference {
    /// A missing gender only passes an `Any` preference.
    pub fn accepts(self, gender: Option<Gender>) -> bool {
        match (self, gender) {
            (Self::Any, _) => true,
            (Self::Male, Some(Gender::Male)) | (Self::Female, Some(Gender::Female)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Field a user is currently editing from the profile menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingEdit {
    Name,
    Bio,
}

// --- Profile ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub user_id: UserId,
    pub username: Option<String>,
    #[serde(default)]
    pub photos: Vec<String>,
    pub display_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub age: Option<u32>,
    pub height_cm: Option<u16>,
    pub gender: Option<Gender>,
    pub looking_for: Option<Preference>,
    pub bio: Option<String>,
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub location_enabled: bool,
    #[serde(default)]
    pub diamonds: u64,
    /// `None` means the account has never been premium.
    pub premium_until: Option<DateTime<Utc>>,
    pub last_grant: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ghost_mode: bool,
    pub state: RegistrationState,
    /// Candidate currently on screen. Advisory only.
    pub presenting: Option<UserId>,
    #[serde(default)]
    pub pending_edit: Option<PendingEdit>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(user_id: impl Into<UserId>, username: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            username,
            photos: Vec::new(),
            display_name: None,
            birth_date: None,
            age: None,
            height_cm: None,
            gender: None,
            looking_for: None,
            bio: None,
            location: None,
            location_enabled: false,
            diamonds: 0,
            premium_until: None,
            last_grant: None,
            ghost_mode: false,
            state: RegistrationState::AwaitPhoto,
            presenting: None,
            pending_edit: None,
            created_at: now,
        }
    }

    pub fn is_premium(&self, now: DateTime<Utc>) -> bool {
        self.premium_until.is_some_and(|until| until > now)
    }

    /// Location the user has shared and not disabled.
    pub fn active_location(&self) -> Option<GeoPoint> {
        self.location.filter(|_| self.location_enabled)
    }

    /// Visible, located and not hiding behind ghost mode.
    pub fn is_discoverable(&self) -> bool {
        self.state.is_active() && self.active_location().is_some() && !self.ghost_mode
    }

    pub fn primary_photo(&self) -> Option<&str> {
        self.photos.first().map(String::as_str)
    }

    pub fn name_or_default(&self) -> &str {
        self.display_name.as_deref().unwrap_or("(no name)")
    }

    /// `@handle` when the account has one.
    pub fn handle(&self) -> Option<String> {
        self.username
            .as_deref()
            .filter(|u| !u.is_empty())
            .map(|u| format!("@{u}"))
    }

    /// Add diamonds. The only way a balance grows.
    pub fn credit(&mut self, amount: u64) -> u64 {
        self.diamonds = self.diamonds.saturating_add(amount);
        self.diamonds
    }

    /// Remove diamonds if the balance covers `amount`; untouched otherwise.
    pub fn debit(&mut self, amount: u64) -> bool {
        match self.diamonds.checked_sub(amount) {
            Some(rest) => {
                self.diamonds = rest;
                true
            }
            None => false,
        }
    }
}

// --- Decisions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Like,
    Skip,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Skip => "skip",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionRecord {
    pub from: UserId,
    pub to: UserId,
    pub decision: Decision,
    pub decided_at: DateTime<Utc>,
}

/// Store key of the decision `from` made about `to`.
pub fn decision_key(from: &str, to: &str) -> String {
    format!("{from}:{to}")
}

// --- Matches ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Match {
    pub pair_key: String,
    pub user_a: UserId,
    pub user_b: UserId,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn new(a: &str, b: &str, now: DateTime<Utc>) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self {
            pair_key: pair_key(a, b),
            user_a: lo.to_string(),
            user_b: hi.to_string(),
            created_at: now,
        }
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    pub fn counterpart(&self, user_id: &str) -> Option<&str> {
        if self.user_a == user_id {
            Some(&self.user_b)
        } else if self.user_b == user_id {
            Some(&self.user_a)
        } else {
            None
        }
    }
}

/// Canonical key for an unordered pair.
pub fn pair_key(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

// --- Swipes ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SwipeCounter {
    pub count: u32,
}

/// Swipe counters are keyed by user and UTC calendar day.
pub fn swipe_key(user_id: &str, day: NaiveDate) -> String {
    format!("{user_id}:{}", day.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn pair_key_is_order_independent() {
        assert_eq!(pair_key("10", "2"), pair_key("2", "10"));
        assert_eq!(Match::new("b", "a", Utc::now()).user_a, "a");
    }

    #[test]
    fn registration_order() {
        let mut state = RegistrationState::AwaitPhoto;
        let mut steps = 0;
        while !state.is_active() {
            state = state.next();
            steps += 1;
        }
        assert_eq!(steps, 8);
        assert_eq!(RegistrationState::Active.next(), RegistrationState::Active);
    }

    #[test]
    fn preference_is_directional() {
        assert!(Preference::Any.accepts(None));
        assert!(Preference::Female.accepts(Some(Gender::Female)));
        assert!(!Preference::Female.accepts(Some(Gender::Male)));
        assert!(!Preference::Male.accepts(None));
    }

    #[test]
    fn debit_never_goes_negative() {
        let mut profile = Profile::new("1", None, Utc::now());
        profile.credit(1);
        assert!(!profile.debit(2));
        assert_eq!(profile.diamonds, 1);
        assert!(profile.debit(1));
        assert_eq!(profile.diamonds, 0);
    }

    #[test]
    fn premium_expiry() {
        let now = Utc::now();
        let mut profile = Profile::new("1", None, now);
        assert!(!profile.is_premium(now));
        profile.premium_until = Some(now + Duration::days(1));
        assert!(profile.is_premium(now));
        profile.premium_until = Some(now - Duration::seconds(1));
        assert!(!profile.is_premium(now));
    }

    #[test]
    fn state_serializes_as_tag() {
        let json = serde_json::to_string(&RegistrationState::AwaitDob).unwrap();
        assert_eq!(json, "\"await_dob\"");
    }
}
