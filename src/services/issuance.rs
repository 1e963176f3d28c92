//! Number issuance service
//!
//! Orchestrates tenant lookup, atomic counter increment, and formatting
//! inside the caller's transaction. The caller commits the same transaction
//! that writes the owning claim row, so a rollback of the claim insert also
//! rolls back the increment.

use chrono::{Datelike, Utc};
use rusqlite::Connection;

use crate::claim_number;
use crate::db::{counters, tenants};
use crate::error::ClaimsError;

/// Current calendar year (UTC), the default issuance year
pub fn current_year() -> i32 {
    Utc::now().year()
}

/// Issue the next claim number for a tenant.
///
/// `conn` must be the transaction that also writes the claim row. Fails
/// fast with `TenantNotFound` or `MissingCountryCode` (non-retryable);
/// busy/locked conflicts surface as the transient class and the caller
/// retries the whole operation through the retry wrapper.
pub fn issue_claim_number(
    conn: &Connection,
    tenant_id: &str,
    year: i32,
) -> Result<String, ClaimsError> {
    let tenant = tenants::get_tenant(conn, tenant_id)?
        .ok_or_else(|| ClaimsError::TenantNotFound(tenant_id.to_string()))?;

    let country_code = tenant
        .country_code
        .ok_or_else(|| ClaimsError::MissingCountryCode(tenant_id.to_string()))?;

    let sequence = counters::next_sequence(conn, tenant_id, year)?;
    let sequence =
        u32::try_from(sequence).map_err(|_| ClaimsError::OutOfRangeSequence(sequence))?;

    claim_number::format(&country_code, year, sequence)
}
