//! Claims Ledger - tenant-isolated claim identity and lifecycle audit
//!
//! The subsystem behind claim numbering, visibility, and audit in a
//! multi-tenant claims platform:
//!
//! - **Claim numbers**: globally unique, human-readable, sequential per
//!   tenant per year (`CLM-XK-2026-000007`), issued from an atomic
//!   per-(tenant, year) counter inside the same transaction as the claim
//!   write.
//! - **Tenant isolation**: every claim access goes through a tenant-scoped
//!   repository; there is no unscoped query path.
//! - **Visibility scopes**: a caller's role maps to one of six scopes
//!   (member, admin, staff queue/unassigned/all, agent queue), resolved
//!   fail-closed.
//! - **Stage history**: an append-only audit trail of every status
//!   transition, with public/private tagging for member-facing views.
//!
//! Rendering, sessions, notifications, and payments live elsewhere; they
//! call into this crate through the service layer.

pub mod claim_number;
pub mod config;
pub mod db;
pub mod error;
pub mod retry;
pub mod scope;
pub mod services;

// Re-exports
pub use claim_number::ParsedClaimNumber;
pub use config::Config;
pub use db::{ClaimFilter, ClaimPage, ClaimRow, ClaimStatus, ClaimsDb, DbStats};
pub use error::ClaimsError;
pub use retry::RetryPolicy;
pub use scope::{Caller, Role, ScopeParams, VisibilityScope};
pub use services::{BackfillDriver, BackfillPlan, BackfillReport, ClaimsService, EventBus};
