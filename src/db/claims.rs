//! Claim record store
//!
//! All claim reads and writes go through [`TenantClaims`], a repository
//! constructed with a tenant id. Every statement it issues carries the
//! tenant predicate; there is no unscoped constructor and no raw query
//! escape hatch, so a caller-supplied claim id from another tenant can
//! never match.

use std::fmt;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::ClaimsError;
use crate::scope::VisibilityScope;

/// Hard cap on page size for claim listings
pub const MAX_PER_PAGE: u32 = 100;

const DEFAULT_PER_PAGE: u32 = 25;

/// Claim lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Draft,
    Submitted,
    Verification,
    Evaluation,
    Negotiation,
    Court,
    Resolved,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Draft => "draft",
            ClaimStatus::Submitted => "submitted",
            ClaimStatus::Verification => "verification",
            ClaimStatus::Evaluation => "evaluation",
            ClaimStatus::Negotiation => "negotiation",
            ClaimStatus::Court => "court",
            ClaimStatus::Resolved => "resolved",
            ClaimStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(ClaimStatus::Draft),
            "submitted" => Some(ClaimStatus::Submitted),
            "verification" => Some(ClaimStatus::Verification),
            "evaluation" => Some(ClaimStatus::Evaluation),
            "negotiation" => Some(ClaimStatus::Negotiation),
            "court" => Some(ClaimStatus::Court),
            "resolved" => Some(ClaimStatus::Resolved),
            "rejected" => Some(ClaimStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn status_from_raw(raw: &str) -> Result<ClaimStatus, rusqlite::Error> {
    ClaimStatus::parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown claim status: {}", raw).into(),
        )
    })
}

/// Claim row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRow {
    pub id: String,
    pub tenant_id: String,
    pub branch_id: Option<String>,
    pub member_id: String,
    pub staff_id: Option<String>,
    pub status: ClaimStatus,
    /// NULL until first issued, then immutable and globally unique
    pub claim_number: Option<String>,
    pub category: String,
    pub claim_amount: Option<f64>,
    pub currency: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ClaimRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let status_raw: String = row.get("status")?;
        Ok(Self {
            id: row.get("id")?,
            tenant_id: row.get("tenant_id")?,
            branch_id: row.get("branch_id")?,
            member_id: row.get("member_id")?,
            staff_id: row.get("staff_id")?,
            status: status_from_raw(&status_raw)?,
            claim_number: row.get("claim_number")?,
            category: row.get("category")?,
            claim_amount: row.get("claim_amount")?,
            currency: row.get("currency")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Listing projection of a claim
#[derive(Debug, Clone, Serialize)]
pub struct ClaimSummary {
    pub id: String,
    pub claim_number: Option<String>,
    pub status: ClaimStatus,
    pub category: String,
    pub member_id: String,
    pub staff_id: Option<String>,
    pub branch_id: Option<String>,
    pub claim_amount: Option<f64>,
    pub currency: String,
    pub created_at: String,
}

const SUMMARY_COLUMNS: &str =
    "id, claim_number, status, category, member_id, staff_id, branch_id, claim_amount, currency, created_at";

impl ClaimSummary {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let status_raw: String = row.get("status")?;
        Ok(Self {
            id: row.get("id")?,
            claim_number: row.get("claim_number")?,
            status: status_from_raw(&status_raw)?,
            category: row.get("category")?,
            member_id: row.get("member_id")?,
            staff_id: row.get("staff_id")?,
            branch_id: row.get("branch_id")?,
            claim_amount: row.get("claim_amount")?,
            currency: row.get("currency")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Input for inserting a claim
#[derive(Debug, Clone)]
pub struct NewClaim {
    pub member_id: String,
    pub branch_id: Option<String>,
    pub staff_id: Option<String>,
    pub status: ClaimStatus,
    pub claim_number: Option<String>,
    pub category: String,
    pub claim_amount: Option<f64>,
    pub currency: String,
}

/// Filters and pagination for claim listings - camelCase for URL params
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimFilter {
    #[serde(default)]
    pub status: Option<ClaimStatus>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

impl Default for ClaimFilter {
    fn default() -> Self {
        Self {
            status: None,
            search: None,
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

/// One page of claim summaries
#[derive(Debug, Clone, Serialize)]
pub struct ClaimPage {
    pub claims: Vec<ClaimSummary>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

/// A claim awaiting backfill numbering
#[derive(Debug, Clone)]
pub struct UnnumberedClaim {
    pub id: String,
    pub tenant_id: String,
    pub created_at: String,
}

/// Tenant-scoped claim repository; the tenant isolation guard.
pub struct TenantClaims<'c> {
    conn: &'c Connection,
    tenant_id: String,
}

impl<'c> TenantClaims<'c> {
    pub fn new(conn: &'c Connection, tenant_id: impl Into<String>) -> Self {
        Self {
            conn,
            tenant_id: tenant_id.into(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Insert a claim for this tenant
    pub fn insert(&self, input: &NewClaim) -> Result<ClaimRow, ClaimsError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                r#"
                INSERT INTO claims (
                    id, tenant_id, branch_id, member_id, staff_id,
                    status, claim_number, category, claim_amount, currency,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    id,
                    self.tenant_id,
                    input.branch_id,
                    input.member_id,
                    input.staff_id,
                    input.status.as_str(),
                    input.claim_number,
                    input.category,
                    input.claim_amount,
                    input.currency,
                    now,
                    now,
                ],
            )
            .map_err(|e| super::db_err("Claim insert failed", e))?;

        self.get(&id)?
            .ok_or_else(|| ClaimsError::Internal("Claim not found after insert".to_string()))
    }

    /// Get a claim by ID within this tenant
    pub fn get(&self, claim_id: &str) -> Result<Option<ClaimRow>, ClaimsError> {
        self.conn
            .query_row(
                "SELECT * FROM claims WHERE id = ? AND tenant_id = ?",
                params![claim_id, self.tenant_id],
                ClaimRow::from_row,
            )
            .optional()
            .map_err(|e| super::db_err("Claim query failed", e))
    }

    /// Get a claim by its (normalized) claim number within this tenant
    pub fn get_by_number(&self, claim_number: &str) -> Result<Option<ClaimRow>, ClaimsError> {
        self.conn
            .query_row(
                "SELECT * FROM claims WHERE claim_number = ? AND tenant_id = ?",
                params![claim_number, self.tenant_id],
                ClaimRow::from_row,
            )
            .optional()
            .map_err(|e| super::db_err("Claim query failed", e))
    }

    /// List claims visible under the given scope, with filters and pagination
    pub fn list(
        &self,
        scope: &VisibilityScope,
        filter: &ClaimFilter,
    ) -> Result<ClaimPage, ClaimsError> {
        let mut where_sql = String::from("tenant_id = ?");
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(self.tenant_id.clone())];

        scope.push_predicate(&mut where_sql, &mut values);

        if let Some(status) = filter.status {
            where_sql.push_str(" AND status = ?");
            values.push(Box::new(status.as_str().to_string()));
        }

        if let Some(ref search) = filter.search {
            where_sql.push_str(" AND (claim_number LIKE ? ESCAPE '\\' OR category LIKE ? ESCAPE '\\')");
            // The search term matches literally; % and _ are not wildcards
            let escaped = search
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            let pattern = format!("%{}%", escaped);
            values.push(Box::new(pattern.clone()));
            values.push(Box::new(pattern));
        }

        let param_refs: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();

        let total: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM claims WHERE {}", where_sql),
                param_refs.as_slice(),
                |row| row.get(0),
            )
            .map_err(|e| super::db_err("Count failed", e))?;

        let page = filter.page.max(1);
        let per_page = filter.per_page.clamp(1, MAX_PER_PAGE);
        let offset = (page - 1) as i64 * per_page as i64;

        let sql = format!(
            "SELECT {} FROM claims WHERE {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            SUMMARY_COLUMNS, where_sql
        );
        debug!("Executing query: {}", sql);

        values.push(Box::new(per_page as i64));
        values.push(Box::new(offset));
        let param_refs: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| super::db_err("Prepare failed", e))?;

        let claims: Vec<ClaimSummary> = stmt
            .query_map(param_refs.as_slice(), ClaimSummary::from_row)
            .map_err(|e| super::db_err("Query failed", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| super::db_err("Row parse failed", e))?;

        Ok(ClaimPage {
            claims,
            page,
            per_page,
            total: total as u64,
        })
    }

    /// Update a claim's status; returns false if the claim is not in tenant scope
    pub fn set_status(&self, claim_id: &str, new_status: ClaimStatus) -> Result<bool, ClaimsError> {
        let now = Utc::now().to_rfc3339();
        let changes = self
            .conn
            .execute(
                "UPDATE claims SET status = ?, updated_at = ? WHERE id = ? AND tenant_id = ?",
                params![new_status.as_str(), now, claim_id, self.tenant_id],
            )
            .map_err(|e| super::db_err("Status update failed", e))?;

        Ok(changes > 0)
    }

    /// Assign a claim number, conditioned on the claim still being unnumbered.
    /// Returns false when the claim was already numbered (or not in scope),
    /// which the backfill treats as a skip.
    pub fn assign_number_if_unnumbered(
        &self,
        claim_id: &str,
        claim_number: &str,
    ) -> Result<bool, ClaimsError> {
        let now = Utc::now().to_rfc3339();
        let changes = self
            .conn
            .execute(
                "UPDATE claims SET claim_number = ?, updated_at = ?
                 WHERE id = ? AND tenant_id = ? AND claim_number IS NULL",
                params![claim_number, now, claim_id, self.tenant_id],
            )
            .map_err(|e| super::db_err("Claim number assignment failed", e))?;

        Ok(changes > 0)
    }
}

/// Claims with no number yet, grouped by tenant and ordered by
/// `(created_at, id)` - the deterministic tie-break that makes backfill
/// re-runs assign numbers in the same relative order.
pub fn list_unnumbered(conn: &Connection) -> Result<Vec<UnnumberedClaim>, ClaimsError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, tenant_id, created_at FROM claims
             WHERE claim_number IS NULL
             ORDER BY tenant_id, created_at ASC, id ASC",
        )
        .map_err(|e| super::db_err("Prepare failed", e))?;

    let rows: Vec<UnnumberedClaim> = stmt
        .query_map([], |row| {
            Ok(UnnumberedClaim {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                created_at: row.get(2)?,
            })
        })
        .map_err(|e| super::db_err("Query failed", e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| super::db_err("Row parse failed", e))?;

    Ok(rows)
}
