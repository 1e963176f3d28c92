//! Tenant registry operations
//!
//! Read-only from the claims subsystem's perspective; the seeding helpers
//! exist for provisioning and tests.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::ClaimsError;

/// Tenant row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRow {
    pub id: String,
    pub name: String,
    pub short_code: String,
    /// Mandatory before any claim number can be issued for the tenant
    pub country_code: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

impl TenantRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            short_code: row.get("short_code")?,
            country_code: row.get("country_code")?,
            is_active: row.get("is_active")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Input for creating a tenant
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTenantInput {
    pub id: String,
    pub name: String,
    pub short_code: String,
    #[serde(default)]
    pub country_code: Option<String>,
}

/// Get a tenant by ID
pub fn get_tenant(conn: &Connection, id: &str) -> Result<Option<TenantRow>, ClaimsError> {
    conn.query_row(
        "SELECT * FROM tenants WHERE id = ?",
        params![id],
        TenantRow::from_row,
    )
    .optional()
    .map_err(|e| super::db_err("Tenant query failed", e))
}

/// Create a tenant (provisioning/seeding path)
pub fn create_tenant(conn: &Connection, input: &CreateTenantInput) -> Result<TenantRow, ClaimsError> {
    conn.execute(
        "INSERT INTO tenants (id, name, short_code, country_code, created_at)
         VALUES (?, ?, ?, ?, datetime('now'))",
        params![input.id, input.name, input.short_code, input.country_code],
    )
    .map_err(|e| super::db_err("Tenant insert failed", e))?;

    get_tenant(conn, &input.id)?
        .ok_or_else(|| ClaimsError::Internal("Tenant not found after insert".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ClaimsDb;

    #[test]
    fn test_create_and_get_tenant() {
        let db = ClaimsDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let tenant = create_tenant(
                conn,
                &CreateTenantInput {
                    id: "t1".into(),
                    name: "Kosovo Ops".into(),
                    short_code: "KOS".into(),
                    country_code: Some("XK".into()),
                },
            )?;
            assert!(tenant.is_active);
            assert_eq!(tenant.country_code.as_deref(), Some("XK"));

            assert!(get_tenant(conn, "missing")?.is_none());
            Ok(())
        })
        .unwrap();
    }
}
