use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Joins the two participant ids of a direct conversation.
/// `UserId` can never contain it, so a pair id splits back unambiguously.
pub const PAIR_SEPARATOR: char = '_';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier contains invalid character {0:?}")]
    InvalidChar(char),

    #[error("a conversation needs two distinct participants")]
    SelfPair,

    #[error("malformed conversation id: {0}")]
    MalformedPair(String),
}

/// Opaque user identifier. ASCII alphanumerics and `-` only, which covers
/// the UUID strings the server hands out.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, IdError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(IdError::Empty);
        }
        if let Some(c) = raw.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '-')) {
            return Err(IdError::InvalidChar(c));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<uuid::Uuid> for UserId {
    fn from(id: uuid::Uuid) -> Self {
        Self(id.to_string())
    }
}

impl TryFrom<String> for UserId {
    type Error = IdError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a direct conversation, derived from its two participants.
///
/// The ids are sorted before joining, so whichever side starts the
/// conversation ends up with the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationId(String);

impl ConversationId {
    pub fn for_pair(a: &UserId, b: &UserId) -> Result<Self, IdError> {
        if a == b {
            return Err(IdError::SelfPair);
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self(format!("{}{}{}", low, PAIR_SEPARATOR, high)))
    }

    /// Parse a stored id back into its canonical form. Rejects ids whose
    /// halves are unsorted, since `for_pair` never produces them.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let (a, b) = split_pair(raw)?;
        let id = Self::for_pair(&a, &b)?;
        if id.0 != raw {
            return Err(IdError::MalformedPair(raw.to_string()));
        }
        Ok(id)
    }

    pub fn participants(&self) -> (UserId, UserId) {
        // Construction guarantees a valid pair.
        let (a, b) = self.0.split_once(PAIR_SEPARATOR).unwrap_or((&self.0, ""));
        (UserId(a.to_string()), UserId(b.to_string()))
    }

    /// The participant that is not `me`, or `None` if `me` is not in the pair.
    pub fn counterpart(&self, me: &UserId) -> Option<UserId> {
        let (a, b) = self.participants();
        if &a == me {
            Some(b)
        } else if &b == me {
            Some(a)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn split_pair(raw: &str) -> Result<(UserId, UserId), IdError> {
    let (a, b) = raw
        .split_once(PAIR_SEPARATOR)
        .ok_or_else(|| IdError::MalformedPair(raw.to_string()))?;
    let a = UserId::parse(a).map_err(|_| IdError::MalformedPair(raw.to_string()))?;
    let b = UserId::parse(b).map_err(|_| IdError::MalformedPair(raw.to_string()))?;
    Ok((a, b))
}

impl TryFrom<String> for ConversationId {
    type Error = IdError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<ConversationId> for String {
    fn from(id: ConversationId) -> Self {
        id.0
    }
}

impl FromStr for ConversationId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
