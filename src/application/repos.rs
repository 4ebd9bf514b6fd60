//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::likes::{ActorId, ItemId};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Read side of the authoritative like relation store.
#[async_trait]
pub trait LikesRepo: Send + Sync {
    /// Number of relations for `item`.
    async fn count_likes(&self, item: ItemId) -> Result<u64, RepoError>;

    /// Every item `actor` currently likes.
    async fn liked_items(&self, actor: ActorId) -> Result<Vec<ItemId>, RepoError>;

    /// Relation counts for `items`. Items without relations are absent from
    /// the result.
    async fn count_likes_grouped(&self, items: &[ItemId]) -> Result<Vec<(ItemId, u64)>, RepoError>;

    async fn begin(&self) -> Result<Box<dyn LikeTransaction>, RepoError>;
}

/// An open transaction against the like relation store.
///
/// Dropping a transaction without committing discards its changes.
#[async_trait]
pub trait LikeTransaction: Send {
    /// Create the relation; `false` when it already existed.
    async fn insert_like(&mut self, item: ItemId, actor: ActorId) -> Result<bool, RepoError>;

    /// Remove the relation; `false` when there was none.
    async fn delete_like(&mut self, item: ItemId, actor: ActorId) -> Result<bool, RepoError>;

    async fn commit(self: Box<Self>) -> Result<(), RepoError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepoError>;
}
