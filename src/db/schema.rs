//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::ClaimsError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), ClaimsError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, ClaimsError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| ClaimsError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), ClaimsError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| ClaimsError::Internal(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| ClaimsError::Internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &Connection) -> Result<(), ClaimsError> {
    conn.execute_batch(TENANTS_SCHEMA)
        .map_err(|e| ClaimsError::Internal(format!("Failed to create tenant tables: {}", e)))?;

    conn.execute_batch(CLAIMS_SCHEMA)
        .map_err(|e| ClaimsError::Internal(format!("Failed to create claim tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| ClaimsError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), ClaimsError> {
    // Add migration steps here as schema evolves
    match from_version {
        _ => {}
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Tenant registry and counter schema
const TENANTS_SCHEMA: &str = r#"
-- Tenant registry
-- country_code may be NULL until the tenant is configured; claim number
-- issuance fails fast for such tenants
CREATE TABLE IF NOT EXISTS tenants (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    short_code TEXT NOT NULL UNIQUE,
    country_code TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One counter row per (tenant, year); last_number is the sole source of
-- truth for the next sequence. Created lazily on first issuance, never
-- deleted.
CREATE TABLE IF NOT EXISTS sequence_counters (
    tenant_id TEXT NOT NULL,
    year INTEGER NOT NULL,
    last_number INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (tenant_id, year),
    FOREIGN KEY (tenant_id) REFERENCES tenants(id)
);

-- Agent-to-client links; backs the agent_queue visibility scope
CREATE TABLE IF NOT EXISTS agent_clients (
    tenant_id TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    member_id TEXT NOT NULL,
    PRIMARY KEY (tenant_id, agent_id, member_id)
);
"#;

/// Claims and stage history schema
const CLAIMS_SCHEMA: &str = r#"
-- The claim aggregate root. tenant_id never changes after creation;
-- claim_number stays NULL until issued, then is immutable.
CREATE TABLE IF NOT EXISTS claims (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    branch_id TEXT,
    member_id TEXT NOT NULL,
    staff_id TEXT,

    status TEXT NOT NULL DEFAULT 'draft',
    claim_number TEXT,

    category TEXT NOT NULL,
    claim_amount REAL,
    currency TEXT NOT NULL DEFAULT 'EUR',

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (tenant_id) REFERENCES tenants(id)
);

-- Append-only audit trail; rows cascade with their claim.
-- from_status is NULL for the initial entry. is_public gates what
-- member-facing views may see.
CREATE TABLE IF NOT EXISTS stage_history (
    id TEXT PRIMARY KEY NOT NULL,
    claim_id TEXT NOT NULL,
    from_status TEXT,
    to_status TEXT NOT NULL,
    note TEXT,
    is_public INTEGER NOT NULL DEFAULT 1,
    actor_id TEXT NOT NULL,
    actor_role TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (claim_id) REFERENCES claims(id) ON DELETE CASCADE
);
"#;

/// Index definitions for fast queries
const INDEXES_SCHEMA: &str = r#"
-- Partial unique index: claim numbers are globally unique once assigned,
-- while many NULL rows coexist during the draft/backfill window
CREATE UNIQUE INDEX IF NOT EXISTS idx_claims_number
    ON claims(claim_number) WHERE claim_number IS NOT NULL;

-- Claim indexes (tenant-scoped access paths)
CREATE INDEX IF NOT EXISTS idx_claims_tenant_status ON claims(tenant_id, status);
CREATE INDEX IF NOT EXISTS idx_claims_tenant_member ON claims(tenant_id, member_id);
CREATE INDEX IF NOT EXISTS idx_claims_tenant_staff ON claims(tenant_id, staff_id);
CREATE INDEX IF NOT EXISTS idx_claims_created_at ON claims(created_at);

-- Stage history ordering
CREATE INDEX IF NOT EXISTS idx_stage_history_claim ON stage_history(claim_id, created_at, id);

-- Agent links
CREATE INDEX IF NOT EXISTS idx_agent_clients_agent ON agent_clients(tenant_id, agent_id);
"#;
