//! SQLite database module for claims, counters, and audit history
//!
//! ## Architecture
//!
//! - `tenants` - tenant registry (short code, country code)
//! - `sequence_counters` - one row per (tenant, year), the claim number source
//! - `claims` - the claim aggregate root, always accessed tenant-scoped
//! - `stage_history` - append-only audit rows, cascade with their claim
//! - `agent_clients` - agent-to-member links backing the agent queue scope
//!
//! All access goes through [`ClaimsDb`], which owns the single connection.
//! Multi-statement writes open an explicit transaction via `with_conn_mut`;
//! the claim insert, counter increment, and initial history row always share
//! one transaction so a rollback leaves no visible trace.

pub mod schema;
pub mod tenants;
pub mod counters;
pub mod claims;
pub mod stage_history;
pub mod agent_links;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::ClaimsError;

/// Translate a driver error into the crate taxonomy.
///
/// Busy/locked conditions are the transient class callers may retry through
/// the retry wrapper; everything else surfaces as internal.
pub(crate) fn db_err(context: &str, e: rusqlite::Error) -> ClaimsError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &e {
        if matches!(
            failure.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ) {
            return ClaimsError::SerializationConflict(format!("{}: {}", context, e));
        }
    }
    ClaimsError::Internal(format!("{}: {}", context, e))
}

/// SQLite database for claims and their audit trail
pub struct ClaimsDb {
    conn: Mutex<Connection>,
}

impl ClaimsDb {
    /// Open or create the claims database at the given path
    pub fn open(db_path: &Path) -> Result<Self, ClaimsError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(db_path)
            .map_err(|e| ClaimsError::Internal(format!("Failed to open SQLite: {}", e)))?;

        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| ClaimsError::Internal(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, ClaimsError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| ClaimsError::Internal(format!("Failed to open in-memory SQLite: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| ClaimsError::Internal(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<(), ClaimsError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ClaimsError::Internal(format!("Lock poisoned: {}", e)))?;

        schema::init_schema(&conn)?;

        Ok(())
    }

    /// Run a read operation against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, ClaimsError>
    where
        F: FnOnce(&Connection) -> Result<T, ClaimsError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ClaimsError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Run a write operation with exclusive access (for transactions)
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, ClaimsError>
    where
        F: FnOnce(&mut Connection) -> Result<T, ClaimsError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| ClaimsError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, ClaimsError> {
        self.with_conn(|conn| {
            let tenant_count: i64 = conn
                .query_row("SELECT COUNT(*) FROM tenants", [], |row| row.get(0))
                .map_err(|e| db_err("Query failed", e))?;

            let claim_count: i64 = conn
                .query_row("SELECT COUNT(*) FROM claims", [], |row| row.get(0))
                .map_err(|e| db_err("Query failed", e))?;

            let unnumbered_count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM claims WHERE claim_number IS NULL",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| db_err("Query failed", e))?;

            let history_count: i64 = conn
                .query_row("SELECT COUNT(*) FROM stage_history", [], |row| row.get(0))
                .map_err(|e| db_err("Query failed", e))?;

            Ok(DbStats {
                tenant_count: tenant_count as u64,
                claim_count: claim_count as u64,
                unnumbered_count: unnumbered_count as u64,
                history_count: history_count as u64,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub tenant_count: u64,
    pub claim_count: u64,
    pub unnumbered_count: u64,
    pub history_count: u64,
}

// Re-exports
pub use claims::{ClaimFilter, ClaimPage, ClaimRow, ClaimStatus, ClaimSummary, NewClaim, TenantClaims};
pub use stage_history::{NewStageEntry, StageHistoryRow};
pub use tenants::{CreateTenantInput, TenantRow};
