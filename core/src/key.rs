//! Opaque entity keys.
//!
//! A [`Key`] addresses one entity in the record store. Keys form ancestor
//! paths (a conference is parented under the profile that created it), and
//! the root of the path names the *entity group* that scopes transactions.
//!
//! Keys leave the process only in their encoded form: a URL-safe base64
//! string that hides the internal addressing. [`Key::decode`] is the single
//! validation point for keys received from callers.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Errors produced while decoding an encoded key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The input is not URL-safe base64.
    #[error("invalid key encoding: {0}")]
    Encoding(String),

    /// The decoded path is structurally invalid.
    #[error("malformed key: {0}")]
    Malformed(String),
}

/// The identifying part of one key segment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyId {
    /// Store-allocated numeric id.
    Id(i64),
    /// Caller-chosen string name.
    Name(String),
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name:?}"),
        }
    }
}

/// Key of an entity in the record store.
///
/// A key whose last segment has no id is *incomplete*; the store allocates
/// an id when such a key is first written.
///
/// # Examples
///
/// ```
/// use conference_central_core::Key;
///
/// let profile = Key::named("Profile", "bob@example.com");
/// let conference = Key::with_id("Conference", 42).with_parent(profile.clone());
///
/// let encoded = conference.encode();
/// let decoded = Key::decode(&encoded).unwrap();
///
/// assert_eq!(decoded, conference);
/// assert_eq!(decoded.root(), &profile);
/// assert!(decoded.has_ancestor(&profile));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    kind: String,
    id: Option<KeyId>,
    parent: Option<Box<Key>>,
}

impl Key {
    /// Key with a caller-chosen name.
    #[must_use]
    pub fn named(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: Some(KeyId::Name(name.into())),
            parent: None,
        }
    }

    /// Key with a numeric id.
    #[must_use]
    pub fn with_id(kind: impl Into<String>, id: i64) -> Self {
        Self {
            kind: kind.into(),
            id: Some(KeyId::Id(id)),
            parent: None,
        }
    }

    /// Key whose id will be allocated by the store on first write.
    #[must_use]
    pub fn incomplete(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            parent: None,
        }
    }

    /// Place this key under `parent`.
    #[must_use]
    pub fn with_parent(mut self, parent: Self) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Complete an incomplete key with a store-allocated id.
    #[must_use]
    pub fn completed(mut self, id: i64) -> Self {
        self.id = Some(KeyId::Id(id));
        self
    }

    /// Entity kind of the last segment.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Id of the last segment, if allocated.
    #[must_use]
    pub const fn id(&self) -> Option<&KeyId> {
        self.id.as_ref()
    }

    /// Immediate parent, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Self> {
        self.parent.as_deref()
    }

    /// Whether every segment of the path carries an id.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.id.is_some() && self.parent().is_none_or(Self::is_complete)
    }

    /// Root of the ancestor path; identifies the entity group.
    #[must_use]
    pub fn root(&self) -> &Self {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Whether `ancestor` is this key or one of its parents.
    #[must_use]
    pub fn has_ancestor(&self, ancestor: &Self) -> bool {
        let mut current = Some(self);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = key.parent();
        }
        false
    }

    /// Encode as an opaque URL-safe string.
    #[must_use]
    pub fn encode(&self) -> String {
        let path = self.segments();
        // Serializing plain strings and integers cannot fail.
        let json = serde_json::to_vec(&path).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode and validate an encoded key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Encoding`] if the input is not URL-safe base64 and
    /// [`KeyError::Malformed`] if the decoded path is empty, incomplete or has
    /// an invalid segment.
    pub fn decode(encoded: &str) -> Result<Self, KeyError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|e| KeyError::Encoding(e.to_string()))?;
        let path: Vec<Segment> =
            serde_json::from_slice(&bytes).map_err(|e| KeyError::Malformed(e.to_string()))?;

        let mut key: Option<Self> = None;
        for segment in path {
            let id = match (segment.id, segment.name) {
                (Some(id), None) if id > 0 => KeyId::Id(id),
                (None, Some(name)) if !name.is_empty() => KeyId::Name(name),
                (None, None) => {
                    return Err(KeyError::Malformed(format!(
                        "incomplete segment of kind {}",
                        segment.kind
                    )));
                }
                _ => {
                    return Err(KeyError::Malformed(format!(
                        "invalid id in segment of kind {}",
                        segment.kind
                    )));
                }
            };
            if segment.kind.is_empty() {
                return Err(KeyError::Malformed("empty kind".to_string()));
            }
            key = Some(Self {
                kind: segment.kind,
                id: Some(id),
                parent: key.map(Box::new),
            });
        }

        key.ok_or_else(|| KeyError::Malformed("empty path".to_string()))
    }

    fn segments(&self) -> Vec<Segment> {
        let mut path = Vec::new();
        let mut current = Some(self);
        while let Some(key) = current {
            let (id, name) = match &key.id {
                Some(KeyId::Id(id)) => (Some(*id), None),
                Some(KeyId::Name(name)) => (None, Some(name.clone())),
                None => (None, None),
            };
            path.push(Segment {
                kind: key.kind.clone(),
                id,
                name,
            });
            current = key.parent();
        }
        path.reverse();
        path
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = self.parent() {
            write!(f, "{parent}/")?;
        }
        match &self.id {
            Some(id) => write!(f, "{}({id})", self.kind),
            None => write!(f, "{}(?)", self.kind),
        }
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::decode(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Wire form of one path segment.
#[derive(Serialize, Deserialize)]
struct Segment {
    #[serde(rename = "k")]
    kind: String,
    #[serde(rename = "i", default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}
