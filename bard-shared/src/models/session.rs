//! # Session identity
//!
//! Every conversation thread is addressed by a version-4 UUID. New threads get a fresh
//! identifier on the client; existing threads arrive through routing or the thread list and
//! must pass [`SessionIdentity::is_valid`] before they are treated as addressable.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};
use thiserror::Error;
use uuid::{Uuid, Variant};

/// Length of the canonical hyphenated UUID form (8-4-4-4-12).
const CANONICAL_LENGTH: usize = 36;

/// Error returned when a string is not a canonical UUIDv4.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid session identifier: {0:?}")]
pub struct InvalidSessionId(pub String);

/// Opaque identifier of a conversation thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionIdentity(Uuid);

impl SessionIdentity {
    /// Generates a new random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns `true` iff `candidate` is a canonical 36-character UUIDv4 string.
    ///
    /// Hex digits may be either case. The version nibble must be `4` and the variant nibble
    /// one of `8`, `9`, `a`, `b`.
    #[must_use]
    pub fn is_valid(candidate: &str) -> bool {
        if candidate.len() != CANONICAL_LENGTH {
            return false;
        }
        let hyphens_in_place = candidate
            .char_indices()
            .all(|(idx, ch)| matches!(idx, 8 | 13 | 18 | 23) == (ch == '-'));
        if !hyphens_in_place {
            return false;
        }

        Uuid::try_parse(candidate)
            .is_ok_and(|uuid| uuid.get_version_num() == 4 && uuid.get_variant() == Variant::RFC4122)
    }

    /// Parses `candidate`, applying the same gate as [`SessionIdentity::is_valid`].
    ///
    /// # Errors
    /// Returns [`InvalidSessionId`] when the string is not a canonical UUIDv4.
    pub fn parse(candidate: &str) -> Result<Self, InvalidSessionId> {
        if !Self::is_valid(candidate) {
            return Err(InvalidSessionId(candidate.to_string()));
        }
        Uuid::try_parse(candidate)
            .map(Self)
            .map_err(|_| InvalidSessionId(candidate.to_string()))
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Display for SessionIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for SessionIdentity {
    type Err = InvalidSessionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionIdentity {
    type Error = InvalidSessionId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionIdentity> for String {
    fn from(value: SessionIdentity) -> Self {
        value.to_string()
    }
}
