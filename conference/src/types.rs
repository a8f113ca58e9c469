//! Domain types and their wire shapes.
//!
//! Wire shapes use camelCase field names. A conference is addressed on the
//! wire by its encoded key (`websafeKey`), never by the numeric id inside it.

use crate::error::{Result, ServiceError};
use crate::query::filter::{parse_date, parse_integer};
use chrono::{DateTime, Datelike, Utc};
use conference_central_core::Key;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity kind of profiles.
pub const PROFILE_KIND: &str = "Profile";

/// Entity kind of conferences.
pub const CONFERENCE_KIND: &str = "Conference";

/// The caller, as resolved by the (external) authentication layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Stable user id; names the profile key.
    pub user_id: String,
    /// Email address; never persisted.
    pub email: String,
}

impl Identity {
    /// Identity with the given user id and email.
    #[must_use]
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
        }
    }

    /// Key of this identity's profile.
    #[must_use]
    pub fn profile_key(&self) -> Key {
        Key::named(PROFILE_KIND, self.user_id.clone())
    }
}

/// Resolve the optional caller, or fail with [`ServiceError::Unauthorized`].
pub(crate) fn require_identity(identity: Option<&Identity>) -> Result<&Identity> {
    identity.ok_or(ServiceError::Unauthorized)
}

/// Tee-shirt size stored on a profile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeeShirtSize {
    /// No size chosen.
    #[default]
    NotSpecified,
    /// Extra small.
    Xs,
    /// Small.
    S,
    /// Medium.
    M,
    /// Large.
    L,
    /// Extra large.
    Xl,
    /// 2XL.
    Xxl,
    /// 3XL.
    Xxxl,
}

impl TeeShirtSize {
    /// Stored spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotSpecified => "NOT_SPECIFIED",
            Self::Xs => "XS",
            Self::S => "S",
            Self::M => "M",
            Self::L => "L",
            Self::Xl => "XL",
            Self::Xxl => "XXL",
            Self::Xxxl => "XXXL",
        }
    }
}

impl FromStr for TeeShirtSize {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "NOT_SPECIFIED" => Ok(Self::NotSpecified),
            "XS" => Ok(Self::Xs),
            "S" => Ok(Self::S),
            "M" => Ok(Self::M),
            "L" => Ok(Self::L),
            "XL" => Ok(Self::Xl),
            "XXL" => Ok(Self::Xxl),
            "XXXL" => Ok(Self::Xxxl),
            other => Err(ServiceError::Validation(format!(
                "unknown tee shirt size: {other}"
            ))),
        }
    }
}

impl fmt::Display for TeeShirtSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's profile and registration set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Reattached from the identity on every read.
    pub email: String,
    /// Display name.
    pub display_name: String,
    /// Tee-shirt size.
    pub tee_shirt_size: TeeShirtSize,
    /// Conferences the profile holds a seat at, without duplicates.
    #[serde(rename = "conferenceKeysToAttend")]
    pub conference_keys: Vec<Key>,
}

impl Profile {
    /// Fresh profile for an identity that has none yet.
    #[must_use]
    pub fn for_identity(identity: &Identity) -> Self {
        Self {
            email: identity.email.clone(),
            ..Self::default()
        }
    }

    /// Whether the profile holds a seat at `conference`.
    #[must_use]
    pub fn is_registered(&self, conference: &Key) -> bool {
        self.conference_keys.contains(conference)
    }

    /// Add `conference`; returns false if it was already present.
    pub fn register(&mut self, conference: Key) -> bool {
        if self.is_registered(&conference) {
            return false;
        }
        self.conference_keys.push(conference);
        true
    }

    /// Remove `conference`; returns false if it was absent.
    pub fn unregister(&mut self, conference: &Key) -> bool {
        let before = self.conference_keys.len();
        self.conference_keys.retain(|key| key != conference);
        self.conference_keys.len() != before
    }
}

/// Profile edit request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileForm {
    /// New display name.
    pub display_name: String,
    /// New tee-shirt size.
    pub tee_shirt_size: TeeShirtSize,
}

/// A conference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conference {
    /// Public key, parented under the creator's profile.
    #[serde(rename = "websafeKey")]
    pub key: Key,
    /// Name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Creator's display name at creation time.
    pub organizer_display_name: String,
    /// Topics, in the order given.
    pub topics: Vec<String>,
    /// City.
    pub city: String,
    /// Start date.
    pub start_date: Option<DateTime<Utc>>,
    /// End date.
    pub end_date: Option<DateTime<Utc>>,
    /// Calendar month of the start date, 0 without one.
    pub month: u32,
    /// Capacity, fixed at creation.
    pub max_attendees: u32,
    /// Seats left; never above `max_attendees`.
    pub seats_available: u32,
}

impl Conference {
    /// Build a new conference from a validated creation form.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] if the name is blank, a date or
    /// the capacity does not parse, or the end date precedes the start date.
    pub fn from_form(key: Key, organizer: String, form: &ConferenceForm) -> Result<Self> {
        let name = form.name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation("name is required".to_string()));
        }

        let start_date = optional_date("startDate", form.start_date.as_deref())?;
        let end_date = optional_date("endDate", form.end_date.as_deref())?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                return Err(ServiceError::Validation(
                    "endDate must not precede startDate".to_string(),
                ));
            }
        }

        let max_attendees = match &form.max_attendees {
            None | Some(serde_json::Value::Null) => 0,
            Some(serde_json::Value::String(s)) if s.trim().is_empty() => 0,
            Some(value) => parse_integer(value)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| {
                    ServiceError::Validation(format!("unable to parse maxAttendees: {value}"))
                })?,
        };

        Ok(Self {
            key,
            name: name.to_string(),
            description: form.description.clone(),
            organizer_display_name: organizer,
            topics: form.topics.clone(),
            city: form.city.clone(),
            start_date,
            end_date,
            month: start_date.map_or(0, |date| date.month()),
            max_attendees,
            seats_available: max_attendees,
        })
    }

    /// Seats currently taken.
    #[must_use]
    pub const fn seats_taken(&self) -> u32 {
        self.max_attendees.saturating_sub(self.seats_available)
    }

    /// Plain-text summary used in confirmation messages.
    #[must_use]
    pub fn summary(&self) -> String {
        let date = |d: Option<DateTime<Utc>>| d.map(|d| d.to_rfc3339()).unwrap_or_default();
        format!(
            "Name: {}\nDescription: {}\nTopics: {}\nCity: {}\nStartDate: {}\nEndDate: {}\nMaxAttendees: {}\n",
            self.name,
            self.description,
            self.topics.join(", "),
            self.city,
            date(self.start_date),
            date(self.end_date),
            self.max_attendees,
        )
    }
}

fn optional_date(field: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => parse_date(raw)
            .map(Some)
            .ok_or_else(|| ServiceError::Validation(format!("unable to parse {field}: {raw}"))),
    }
}

/// Conference creation request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConferenceForm {
    /// Required.
    pub name: String,
    /// Description.
    pub description: String,
    /// Topics.
    pub topics: Vec<String>,
    /// City.
    pub city: String,
    /// RFC-3339 or `YYYY-MM-DD`.
    pub start_date: Option<String>,
    /// RFC-3339 or `YYYY-MM-DD`.
    pub end_date: Option<String>,
    /// Number or numeric string.
    pub max_attendees: Option<serde_json::Value>,
}
