//! Like counters served from a cache and kept consistent with a transactional
//! record store.
//!
//! [`application::likes::LikeService`] answers reads cache-aside and performs
//! toggles as a record-store transaction wrapped around a cache batch.
//! [`application::reconcile::Reconciler`] periodically rewrites the counters
//! of items touched since its last pass.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
