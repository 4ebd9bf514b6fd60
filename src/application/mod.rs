//! Application services: the like read path, toggles and reconciliation.

pub mod error;
pub mod jobs;
pub mod likes;
pub mod reconcile;
pub mod repos;
