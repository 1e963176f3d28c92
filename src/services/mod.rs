//! Service layer
//!
//! Orchestrates the stores: number issuance inside the caller's transaction,
//! claim submission and transitions, and the backfill job. Services emit
//! events after successful commits; downstream notification and audit sinks
//! subscribe to the bus.

pub mod events;
pub mod issuance;
pub mod claims_service;
pub mod backfill;

pub use backfill::{BackfillDriver, BackfillPlan, BackfillReport, PlannedAssignment};
pub use claims_service::{ClaimsService, SubmitClaimInput};
pub use events::{ClaimEvent, EventBus};
