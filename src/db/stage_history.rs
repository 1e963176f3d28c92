//! Append-only stage history
//!
//! One row per status transition or timeline-worthy event. Rows are never
//! updated or deleted; ordering is `(created_at, id)` for a deterministic
//! tie-break. `is_public` separates member-visible entries from staff-only
//! internal notes.

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ClaimsError;
use crate::scope::Role;

use super::claims::{status_from_raw, ClaimStatus};

/// Stage history row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageHistoryRow {
    pub id: String,
    pub claim_id: String,
    /// NULL for the initial entry
    pub from_status: Option<ClaimStatus>,
    pub to_status: ClaimStatus,
    pub note: Option<String>,
    pub is_public: bool,
    pub actor_id: String,
    pub actor_role: String,
    pub created_at: String,
}

impl StageHistoryRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let from_raw: Option<String> = row.get("from_status")?;
        let to_raw: String = row.get("to_status")?;
        Ok(Self {
            id: row.get("id")?,
            claim_id: row.get("claim_id")?,
            from_status: from_raw.as_deref().map(status_from_raw).transpose()?,
            to_status: status_from_raw(&to_raw)?,
            note: row.get("note")?,
            is_public: row.get("is_public")?,
            actor_id: row.get("actor_id")?,
            actor_role: row.get("actor_role")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Input for appending a stage history entry
#[derive(Debug, Clone)]
pub struct NewStageEntry<'a> {
    pub claim_id: &'a str,
    pub from_status: Option<ClaimStatus>,
    pub to_status: ClaimStatus,
    pub note: Option<&'a str>,
    pub is_public: bool,
    pub actor_id: &'a str,
    pub actor_role: Role,
}

/// Append an entry; always called in the same transaction as the
/// status-changing claim update.
pub fn append(conn: &Connection, entry: &NewStageEntry) -> Result<StageHistoryRow, ClaimsError> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        r#"
        INSERT INTO stage_history (
            id, claim_id, from_status, to_status, note,
            is_public, actor_id, actor_role, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            id,
            entry.claim_id,
            entry.from_status.map(|s| s.as_str()),
            entry.to_status.as_str(),
            entry.note,
            entry.is_public,
            entry.actor_id,
            entry.actor_role.as_str(),
            now,
        ],
    )
    .map_err(|e| super::db_err("History insert failed", e))?;

    conn.query_row(
        "SELECT * FROM stage_history WHERE id = ?",
        params![id],
        StageHistoryRow::from_row,
    )
    .map_err(|e| super::db_err("History query failed", e))
}

/// Entries for a claim in timeline order; `public_only` restricts to
/// member-visible rows.
pub fn list_for_claim(
    conn: &Connection,
    claim_id: &str,
    public_only: bool,
) -> Result<Vec<StageHistoryRow>, ClaimsError> {
    let sql = if public_only {
        "SELECT * FROM stage_history WHERE claim_id = ? AND is_public = 1
         ORDER BY created_at ASC, id ASC"
    } else {
        "SELECT * FROM stage_history WHERE claim_id = ?
         ORDER BY created_at ASC, id ASC"
    };

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| super::db_err("Prepare failed", e))?;

    let rows: Vec<StageHistoryRow> = stmt
        .query_map(params![claim_id], StageHistoryRow::from_row)
        .map_err(|e| super::db_err("Query failed", e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| super::db_err("Row parse failed", e))?;

    Ok(rows)
}
