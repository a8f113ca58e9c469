//! Declared mapping between domain fields, stored properties and wire names.
//!
//! [`FIELDS`] is the single table the filter parser, the query compiler, the
//! search projection and the entity conversions all read. A queryable field
//! appears here exactly once with its stored column (also used as the search
//! document field), its camelCase wire name and its value kind.

use crate::types::{Conference, Profile, TeeShirtSize};
use conference_central_core::entity::{Entity, EntityError};
use conference_central_core::store::KEY_PROPERTY;
use conference_central_core::Key;
use std::fmt;

/// Stored column of the conference name.
pub const NAME: &str = "NAME";
/// Stored column of the description.
pub const DESCRIPTION: &str = "DESCRIPTION";
/// Stored column of the organizer display name.
pub const ORGANIZER: &str = "ORGANIZER";
/// Stored column of the topic list.
pub const TOPIC: &str = "TOPIC";
/// Stored column of the city.
pub const CITY: &str = "CITY";
/// Stored column of the start date.
pub const START_DATE: &str = "START_DATE";
/// Stored column of the end date.
pub const END_DATE: &str = "END_DATE";
/// Stored column of the start month.
pub const MONTH: &str = "MONTH";
/// Stored column of the capacity.
pub const MAX_ATTENDEES: &str = "MAX_ATTENDEES";
/// Stored column of the seat counter.
pub const SEATS_AVAILABLE: &str = "SEATS_AVAILABLE";
/// Search document field holding the encoded conference key.
pub const KEY: &str = "KEY";

/// Stored column of the profile display name.
pub const DISPLAY_NAME: &str = "DISPLAY_NAME";
/// Stored column of the tee-shirt size.
pub const TEE_SHIRT_SIZE: &str = "TEE_SHIRT_SIZE";
/// Stored column of the registration set (encoded keys).
pub const CONFERENCE_KEYS: &str = "CONFERENCE_KEYS";

/// Fields a conference query may filter on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryField {
    /// The conference key; equality only.
    Key,
    /// Name.
    Name,
    /// City.
    City,
    /// Any topic.
    Topic,
    /// Start date.
    StartDate,
    /// End date.
    EndDate,
    /// Start month.
    Month,
    /// Capacity.
    MaxAttendees,
    /// Seats left.
    SeatsAvailable,
}

/// Value kind of a field; decides filter coercion and lowering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Encoded key, compared exactly.
    Key,
    /// Free text.
    Text,
    /// Multi-valued free text.
    TextList,
    /// Integer.
    Integer,
    /// Timestamp.
    Date,
}

/// One row of the mapping table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    /// Domain field.
    pub field: QueryField,
    /// Stored column and search document field.
    pub column: &'static str,
    /// camelCase wire name.
    pub wire: &'static str,
    /// Value kind.
    pub kind: FieldKind,
}

impl FieldSpec {
    /// Property name a record store filter uses for this field.
    #[must_use]
    pub const fn store_property(&self) -> &'static str {
        match self.kind {
            FieldKind::Key => KEY_PROPERTY,
            _ => self.column,
        }
    }
}

/// The mapping table.
pub const FIELDS: [FieldSpec; 9] = [
    FieldSpec {
        field: QueryField::Key,
        column: KEY,
        wire: "websafeKey",
        kind: FieldKind::Key,
    },
    FieldSpec {
        field: QueryField::Name,
        column: NAME,
        wire: "name",
        kind: FieldKind::Text,
    },
    FieldSpec {
        field: QueryField::City,
        column: CITY,
        wire: "city",
        kind: FieldKind::Text,
    },
    FieldSpec {
        field: QueryField::Topic,
        column: TOPIC,
        wire: "topics",
        kind: FieldKind::TextList,
    },
    FieldSpec {
        field: QueryField::StartDate,
        column: START_DATE,
        wire: "startDate",
        kind: FieldKind::Date,
    },
    FieldSpec {
        field: QueryField::EndDate,
        column: END_DATE,
        wire: "endDate",
        kind: FieldKind::Date,
    },
    FieldSpec {
        field: QueryField::Month,
        column: MONTH,
        wire: "month",
        kind: FieldKind::Integer,
    },
    FieldSpec {
        field: QueryField::MaxAttendees,
        column: MAX_ATTENDEES,
        wire: "maxAttendees",
        kind: FieldKind::Integer,
    },
    FieldSpec {
        field: QueryField::SeatsAvailable,
        column: SEATS_AVAILABLE,
        wire: "seatsAvailable",
        kind: FieldKind::Integer,
    },
];

impl QueryField {
    /// Resolve a field name.
    ///
    /// Accepts the column (`START_DATE`), wire (`startDate`) or Pascal
    /// (`StartDate`) spelling in any case, plus `Topics` and `Key`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let wanted = normalize(name);
        if wanted == "key" {
            return Some(Self::Key);
        }
        FIELDS
            .iter()
            .find(|spec| normalize(spec.column) == wanted || normalize(spec.wire) == wanted)
            .map(|spec| spec.field)
    }

    /// Row of the mapping table.
    #[must_use]
    pub fn spec(self) -> &'static FieldSpec {
        // The table is ordered like the enum.
        &FIELDS[self as usize]
    }

    /// Stored column.
    #[must_use]
    pub fn column(self) -> &'static str {
        self.spec().column
    }

    /// Value kind.
    #[must_use]
    pub fn kind(self) -> FieldKind {
        self.spec().kind
    }
}

impl fmt::Display for QueryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spec().wire)
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Store a conference. The key is not a property.
#[must_use]
pub fn conference_to_entity(conference: &Conference) -> Entity {
    let mut entity = Entity::new()
        .with(NAME, conference.name.as_str())
        .with(DESCRIPTION, conference.description.as_str())
        .with(ORGANIZER, conference.organizer_display_name.as_str())
        .with(TOPIC, conference.topics.clone())
        .with(CITY, conference.city.as_str())
        .with(MONTH, i64::from(conference.month))
        .with(MAX_ATTENDEES, i64::from(conference.max_attendees))
        .with(SEATS_AVAILABLE, i64::from(conference.seats_available));
    if let Some(start) = conference.start_date {
        entity.set(START_DATE, start);
    }
    if let Some(end) = conference.end_date {
        entity.set(END_DATE, end);
    }
    entity
}

/// Load a conference stored under `key`.
///
/// # Errors
///
/// Returns [`EntityError`] if a required property is missing or mistyped.
pub fn conference_from_entity(key: Key, entity: &Entity) -> Result<Conference, EntityError> {
    Ok(Conference {
        key,
        name: entity.text(NAME)?.to_string(),
        description: entity.text_or_empty(DESCRIPTION)?,
        organizer_display_name: entity.text_or_empty(ORGANIZER)?,
        topics: entity.text_list(TOPIC)?,
        city: entity.text_or_empty(CITY)?,
        start_date: entity.date(START_DATE)?,
        end_date: entity.date(END_DATE)?,
        month: count(entity, MONTH)?,
        max_attendees: count(entity, MAX_ATTENDEES)?,
        seats_available: count(entity, SEATS_AVAILABLE)?,
    })
}

fn count(entity: &Entity, property: &str) -> Result<u32, EntityError> {
    u32::try_from(entity.int(property)?).map_err(|_| EntityError::TypeMismatch {
        property: property.to_string(),
        expected: "non-negative 32-bit integer",
    })
}

/// Store a profile. The email is not persisted.
#[must_use]
pub fn profile_to_entity(profile: &Profile) -> Entity {
    let keys: Vec<String> = profile.conference_keys.iter().map(Key::encode).collect();
    Entity::new()
        .with(DISPLAY_NAME, profile.display_name.as_str())
        .with(TEE_SHIRT_SIZE, profile.tee_shirt_size.as_str())
        .with(CONFERENCE_KEYS, keys)
}

/// Load a profile, reattaching `email`.
///
/// # Errors
///
/// Returns [`EntityError`] if a property is mistyped or a stored key does
/// not decode.
pub fn profile_from_entity(email: &str, entity: &Entity) -> Result<Profile, EntityError> {
    let tee_shirt_size = entity
        .text_or_empty(TEE_SHIRT_SIZE)?
        .parse::<TeeShirtSize>()
        .map_err(|_| EntityError::TypeMismatch {
            property: TEE_SHIRT_SIZE.to_string(),
            expected: "tee shirt size",
        })?;
    let conference_keys = entity
        .text_list(CONFERENCE_KEYS)?
        .iter()
        .map(|encoded| Key::decode(encoded))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| EntityError::TypeMismatch {
            property: CONFERENCE_KEYS.to_string(),
            expected: "encoded key list",
        })?;

    Ok(Profile {
        email: email.to_string(),
        display_name: entity.text_or_empty(DISPLAY_NAME)?,
        tee_shirt_size,
        conference_keys,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{CONFERENCE_KIND, PROFILE_KIND};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_table_is_ordered_like_the_enum() {
        for spec in &FIELDS {
            assert_eq!(spec.field.spec(), spec);
        }
    }

    #[test]
    fn test_field_spellings() {
        assert_eq!(QueryField::parse("CITY"), Some(QueryField::City));
        assert_eq!(QueryField::parse("City"), Some(QueryField::City));
        assert_eq!(QueryField::parse("startDate"), Some(QueryField::StartDate));
        assert_eq!(QueryField::parse("START_DATE"), Some(QueryField::StartDate));
        assert_eq!(QueryField::parse("MaxAttendees"), Some(QueryField::MaxAttendees));
        assert_eq!(QueryField::parse("Topics"), Some(QueryField::Topic));
        assert_eq!(QueryField::parse("topic"), Some(QueryField::Topic));
        assert_eq!(QueryField::parse("websafeKey"), Some(QueryField::Key));
        assert_eq!(QueryField::parse("Organizer"), None);
    }

    #[test]
    fn test_conference_entity_mapping() {
        let key = Key::with_id(CONFERENCE_KIND, 9).with_parent(Key::named(PROFILE_KIND, "u"));
        let conference = Conference {
            key: key.clone(),
            name: "dotGo".into(),
            description: String::new(),
            organizer_display_name: "Ada".into(),
            topics: vec!["Go".into()],
            city: "Paris".into(),
            start_date: Some(Utc.with_ymd_and_hms(2016, 10, 10, 0, 0, 0).unwrap()),
            end_date: None,
            month: 10,
            max_attendees: 5,
            seats_available: 4,
        };
        let entity = conference_to_entity(&conference);
        assert!(entity.get(END_DATE).is_none());
        assert_eq!(conference_from_entity(key, &entity).unwrap(), conference);
    }

    #[test]
    fn test_profile_entity_mapping_drops_email() {
        let profile = Profile {
            email: "a@example.com".into(),
            display_name: "Ada".into(),
            tee_shirt_size: TeeShirtSize::M,
            conference_keys: vec![Key::with_id(CONFERENCE_KIND, 1)],
        };
        let entity = profile_to_entity(&profile);
        assert!(entity.properties().all(|(_, value)| !matches!(
            value,
            conference_central_core::entity::Value::Text(t) if t.contains('@')
        )));
        let loaded = profile_from_entity("b@example.com", &entity).unwrap();
        assert_eq!(loaded.email, "b@example.com");
        assert_eq!(loaded.conference_keys, profile.conference_keys);
    }

    #[test]
    fn test_negative_counter_is_corrupt() {
        let entity = Entity::new()
            .with(NAME, "x")
            .with(MONTH, 0_i64)
            .with(MAX_ATTENDEES, 1_i64)
            .with(SEATS_AVAILABLE, -1_i64);
        assert!(matches!(
            conference_from_entity(Key::with_id(CONFERENCE_KIND, 1), &entity),
            Err(EntityError::TypeMismatch { .. })
        ));
    }
}
