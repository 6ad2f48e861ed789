//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod identity;
mod policy;

pub use identity::{EmailAddress, ExternalUserId, RoleId};
pub use policy::{PolicyRule, RolePolicy};
