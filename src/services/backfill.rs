//! Backfill driver for historical unnumbered claims
//!
//! Numbers claims created before numbering existed (and drafts that were
//! never submitted), grouped by tenant and ordered by `(created_at, id)` so
//! a re-run after a partial failure assigns numbers in the same relative
//! order. Each claim gets its own transaction; one claim's failure never
//! aborts the batch.
//!
//! The dry run lives in [`BackfillDriver::plan`], a separate code path that
//! only ever reads counters. It has no access to the increment statement,
//! so a dry run can never burn sequence values.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::claim_number;
use crate::db::claims::{self, UnnumberedClaim};
use crate::db::{self, counters, tenants, ClaimsDb, TenantClaims};
use crate::error::ClaimsError;
use crate::retry::{with_retry, RetryPolicy};
use crate::services::events::{ClaimEvent, EventBus};
use crate::services::issuance;

/// Outcome of a backfill run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillReport {
    /// Claims that received a number in this run
    pub numbered: u64,
    /// Claims already numbered by the time their transaction ran
    pub skipped: u64,
    /// Per-claim failures; the batch continued past each one
    pub failures: Vec<String>,
}

/// One assignment a real run would make, as computed by the dry run
#[derive(Debug, Clone, Serialize)]
pub struct PlannedAssignment {
    pub claim_id: String,
    pub tenant_id: String,
    pub claim_number: String,
}

/// Outcome of a dry run; the same shape of answer a real run gives, so an
/// operator previewing a batch sees the failures the run would hit too.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillPlan {
    /// Assignments a real run would make, in the order it would make them
    pub planned: Vec<PlannedAssignment>,
    /// Per-claim problems; the dry run continued past each one
    pub failures: Vec<String>,
}

/// Numbers claims by the year they were created in
fn creation_year(created_at: &str) -> Result<i32, ClaimsError> {
    DateTime::parse_from_rfc3339(created_at)
        .map(|dt| dt.year())
        .map_err(|e| ClaimsError::Internal(format!("Bad created_at {:?}: {}", created_at, e)))
}

/// Backfill driver
pub struct BackfillDriver {
    db: Arc<ClaimsDb>,
    events: Arc<EventBus>,
    retry: RetryPolicy,
}

impl BackfillDriver {
    pub fn new(db: Arc<ClaimsDb>, events: Arc<EventBus>) -> Self {
        Self {
            db,
            events,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Assign numbers to every unnumbered claim.
    ///
    /// Each claim runs in its own transaction that re-checks the claim is
    /// still unnumbered, guarding against a concurrent live issuance.
    pub fn run(&self) -> Result<BackfillReport, ClaimsError> {
        let candidates = self.db.with_conn(claims::list_unnumbered)?;
        info!(candidates = candidates.len(), "Starting claim number backfill");

        let mut report = BackfillReport::default();

        for candidate in candidates {
            match self.backfill_one(&candidate) {
                Ok(Some(number)) => {
                    report.numbered += 1;
                    self.events.emit(ClaimEvent::ClaimNumberBackfilled {
                        id: candidate.id.clone(),
                        claim_number: number,
                        tenant_id: candidate.tenant_id.clone(),
                    });
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    warn!(claim = %candidate.id, error = %e, "Backfill failed for claim");
                    report.failures.push(format!("{}: {}", candidate.id, e));
                }
            }
        }

        info!(
            numbered = report.numbered,
            skipped = report.skipped,
            failures = report.failures.len(),
            "Backfill finished"
        );
        Ok(report)
    }

    fn backfill_one(&self, candidate: &UnnumberedClaim) -> Result<Option<String>, ClaimsError> {
        let year = creation_year(&candidate.created_at)?;

        with_retry(&self.retry, || {
            self.db.with_conn_mut(|conn| {
                let tx = conn
                    .transaction()
                    .map_err(|e| db::db_err("Transaction failed", e))?;

                let repo = TenantClaims::new(&tx, candidate.tenant_id.clone());
                let current = match repo.get(&candidate.id)? {
                    Some(claim) => claim,
                    None => return Ok(None),
                };
                if current.claim_number.is_some() {
                    // A concurrent live issuance got here first
                    return Ok(None);
                }

                let number = issuance::issue_claim_number(&tx, &candidate.tenant_id, year)?;
                let assigned = repo.assign_number_if_unnumbered(&candidate.id, &number)?;

                tx.commit().map_err(|e| db::db_err("Commit failed", e))?;
                Ok(assigned.then_some(number))
            })
        })
    }

    /// Dry run: compute the assignments a real run would make without
    /// writing anything or consuming sequence numbers. Reads the counters
    /// via `peek_sequence` only.
    ///
    /// Mirrors [`BackfillDriver::run`] per claim: a claim that cannot be
    /// numbered lands in `failures` and the rest of the batch still gets
    /// planned.
    pub fn plan(&self) -> Result<BackfillPlan, ClaimsError> {
        self.db.with_conn(|conn| {
            let candidates = claims::list_unnumbered(conn)?;
            let mut simulated: HashMap<(String, i32), i64> = HashMap::new();
            let mut plan = BackfillPlan::default();

            for candidate in candidates {
                match Self::plan_one(conn, &mut simulated, &candidate) {
                    Ok(assignment) => plan.planned.push(assignment),
                    Err(e) => {
                        warn!(claim = %candidate.id, error = %e, "Dry run cannot number claim");
                        plan.failures.push(format!("{}: {}", candidate.id, e));
                    }
                }
            }

            Ok(plan)
        })
    }

    fn plan_one(
        conn: &Connection,
        simulated: &mut HashMap<(String, i32), i64>,
        candidate: &UnnumberedClaim,
    ) -> Result<PlannedAssignment, ClaimsError> {
        let tenant = tenants::get_tenant(conn, &candidate.tenant_id)?
            .ok_or_else(|| ClaimsError::TenantNotFound(candidate.tenant_id.clone()))?;
        let country_code = tenant
            .country_code
            .ok_or_else(|| ClaimsError::MissingCountryCode(candidate.tenant_id.clone()))?;

        let year = creation_year(&candidate.created_at)?;
        let key = (candidate.tenant_id.clone(), year);
        let next = match simulated.get(&key) {
            Some(last) => last + 1,
            None => counters::peek_sequence(conn, &candidate.tenant_id, year)? + 1,
        };

        let sequence = u32::try_from(next).map_err(|_| ClaimsError::OutOfRangeSequence(next))?;
        let claim_number = claim_number::format(&country_code, year, sequence)?;
        // Only a plannable claim advances the simulated counter, matching
        // the rollback a real run's failed transaction would do
        simulated.insert(key, next);

        Ok(PlannedAssignment {
            claim_id: candidate.id.clone(),
            tenant_id: candidate.tenant_id.clone(),
            claim_number,
        })
    }
}
