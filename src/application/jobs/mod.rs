mod reconcile;

pub use reconcile::{JobHandle, spawn_reconcile_job};
