//! Cache key definitions.
//!
//! Key layout is shared with every process that talks to the same Redis, so the
//! rendered strings are part of the operational contract:
//!
//! | key                     | structure  |
//! |-------------------------|------------|
//! | `item:likes:<item>`     | counter    |
//! | `actor:likes:<actor>`   | hash       |
//! | `item:likes:rank`       | sorted set |
//! | `item:updated`          | set        |

use std::fmt;

use crate::domain::likes::{ActorId, ItemId};

const ITEM_COUNTER_PREFIX: &str = "item:likes:";
const ACTOR_MEMBERSHIP_PREFIX: &str = "actor:likes:";
const RANKING_KEY: &str = "item:likes:rank";
const DIRTY_KEY: &str = "item:updated";

/// Field present in a membership map only when the map was loaded in full from
/// the record store. Item ids are strictly positive so it cannot collide.
pub const MEMBERSHIP_LOADED_FIELD: &str = "0";

/// Like cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LikeKey {
    /// Like count of one item.
    ItemCounter(ItemId),
    /// Items one actor currently likes.
    ActorMembership(ActorId),
    /// Leaderboard of items by like count.
    Ranking,
    /// Items whose counter may be stale until the next reconciliation.
    Dirty,
}

impl LikeKey {
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LikeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LikeKey::ItemCounter(item) => write!(f, "{ITEM_COUNTER_PREFIX}{item}"),
            LikeKey::ActorMembership(actor) => write!(f, "{ACTOR_MEMBERSHIP_PREFIX}{actor}"),
            LikeKey::Ranking => f.write_str(RANKING_KEY),
            LikeKey::Dirty => f.write_str(DIRTY_KEY),
        }
    }
}

/// Member/field representation of an item inside maps and sets.
pub fn item_member(item: ItemId) -> String {
    item.to_string()
}
