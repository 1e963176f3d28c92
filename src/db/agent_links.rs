//! Agent-to-client links
//!
//! Agents only ever see claims belonging to their linked member clients;
//! this table feeds the `agent_queue` visibility scope.

use rusqlite::{params, Connection};

use crate::error::ClaimsError;

/// Link a member client to an agent within a tenant
pub fn link_client(
    conn: &Connection,
    tenant_id: &str,
    agent_id: &str,
    member_id: &str,
) -> Result<(), ClaimsError> {
    conn.execute(
        "INSERT OR IGNORE INTO agent_clients (tenant_id, agent_id, member_id) VALUES (?, ?, ?)",
        params![tenant_id, agent_id, member_id],
    )
    .map_err(|e| super::db_err("Agent link insert failed", e))?;

    Ok(())
}

/// Member IDs linked to an agent within a tenant
pub fn client_ids(
    conn: &Connection,
    tenant_id: &str,
    agent_id: &str,
) -> Result<Vec<String>, ClaimsError> {
    let mut stmt = conn
        .prepare("SELECT member_id FROM agent_clients WHERE tenant_id = ? AND agent_id = ? ORDER BY member_id")
        .map_err(|e| super::db_err("Prepare failed", e))?;

    let ids: Vec<String> = stmt
        .query_map(params![tenant_id, agent_id], |row| row.get(0))
        .map_err(|e| super::db_err("Query failed", e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| super::db_err("Row parse failed", e))?;

    Ok(ids)
}
