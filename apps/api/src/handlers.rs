//! HTTP handlers.

pub mod health;
pub mod link;
pub mod sync;
