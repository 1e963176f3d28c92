//! Sequence counter store
//!
//! One row per (tenant, year); `last_number` is monotonically non-decreasing
//! and is the sole source of truth for the next sequence to issue.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::ClaimsError;

/// Atomically advance the counter for (tenant, year) and return the new value.
///
/// This single upsert statement is the concurrency boundary: two concurrent
/// callers for the same tenant/year can never observe or apply the same
/// number. The row is created lazily on first issuance.
///
/// A committed increment whose enclosing claim write later rolls back leaves
/// a gap in the issued range; gaps are acceptable, duplicates are not.
pub fn next_sequence(conn: &Connection, tenant_id: &str, year: i32) -> Result<i64, ClaimsError> {
    conn.query_row(
        "INSERT INTO sequence_counters (tenant_id, year, last_number)
         VALUES (?1, ?2, 1)
         ON CONFLICT(tenant_id, year) DO UPDATE SET last_number = last_number + 1
         RETURNING last_number",
        params![tenant_id, year],
        |row| row.get(0),
    )
    .map_err(|e| super::db_err("Counter increment failed", e))
}

/// Read the last issued number without advancing it (0 if no row exists).
///
/// This is the only counter access the backfill dry run is allowed to make.
pub fn peek_sequence(conn: &Connection, tenant_id: &str, year: i32) -> Result<i64, ClaimsError> {
    let last: Option<i64> = conn
        .query_row(
            "SELECT last_number FROM sequence_counters WHERE tenant_id = ?1 AND year = ?2",
            params![tenant_id, year],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| super::db_err("Counter query failed", e))?;

    Ok(last.unwrap_or(0))
}
