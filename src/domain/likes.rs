//! Identifiers and value types for like relations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// A content item that can be liked (a post, a comment, ...).
///
/// Identifiers are strictly positive; zero and negative values are rejected at
/// construction so that nothing downstream has to re-check them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(i64);

/// The user performing a like or unlike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(i64);

impl ItemId {
    pub fn new(raw: i64) -> Result<Self, DomainError> {
        if raw <= 0 {
            return Err(DomainError::validation(format!(
                "item id must be positive, got {raw}"
            )));
        }
        Ok(Self(raw))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl ActorId {
    pub fn new(raw: i64) -> Result<Self, DomainError> {
        if raw <= 0 {
            return Err(DomainError::validation(format!(
                "actor id must be positive, got {raw}"
            )));
        }
        Ok(Self(raw))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: i64 = s
            .trim()
            .parse()
            .map_err(|_| DomainError::validation(format!("`{s}` is not an item id")))?;
        Self::new(raw)
    }
}

/// Result of flipping the like state of an (item, actor) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToggleOutcome {
    /// Like count for the item after the toggle.
    pub count: u64,
    /// Whether the actor likes the item after the toggle.
    pub liked: bool,
}

/// Authoritative or cached like count for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeCount {
    pub item: ItemId,
    pub count: u64,
}

/// One entry of the like leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankedItem {
    pub item: ItemId,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_negative_ids_are_rejected() {
        assert!(ItemId::new(0).is_err());
        assert!(ItemId::new(-3).is_err());
        assert!(ActorId::new(0).is_err());
        assert_eq!(ItemId::new(42).expect("valid id").get(), 42);
    }

    #[test]
    fn item_ids_parse_from_cache_members() {
        assert_eq!("42".parse::<ItemId>().expect("valid id").get(), 42);
        assert!("0".parse::<ItemId>().is_err());
        assert!("post-1".parse::<ItemId>().is_err());
    }

    #[test]
    fn toggle_outcome_serializes_flat() {
        let outcome = ToggleOutcome {
            count: 1,
            liked: true,
        };
        let json = serde_json::to_value(outcome).expect("serialize outcome");
        assert_eq!(json, serde_json::json!({"count": 1, "liked": true}));
    }
}
