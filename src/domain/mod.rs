pub mod error;
pub mod likes;
