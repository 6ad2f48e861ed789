//! Application services and ports.

#![forbid(unsafe_code)]

mod linking_service;
mod reconciliation_service;

pub use linking_service::{
    IdentityVerifier, LinkCompletion, LinkTokenRecord, LinkTokenRepository, LinkingService,
};
pub use reconciliation_service::{
    GroupDirectory, IdentityLinkRepository, MemberInsert, ReconciliationReport,
    ReconciliationService, RoleProvider,
};
