//! Claims service - submission, lookup, listing, and transitions
//!
//! Every operation resolves the caller's tenant and visibility scope before
//! touching the claim store, and every write shares one transaction with
//! the audit rows it produces.

use std::sync::Arc;

use tracing::info;

use crate::db::{self, stage_history, ClaimsDb, TenantClaims};
use crate::db::claims::{ClaimFilter, ClaimPage, ClaimRow, ClaimStatus, NewClaim};
use crate::db::stage_history::{NewStageEntry, StageHistoryRow};
use crate::error::ClaimsError;
use crate::retry::{with_retry, RetryPolicy};
use crate::scope::{self, Caller, Role, ScopeParams};
use crate::services::events::{ClaimEvent, EventBus};
use crate::services::issuance;
use crate::{claim_number, db::agent_links};

/// Input for submitting a claim - camelCase for request bodies
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitClaimInput {
    /// Ignored for member callers, who always submit for themselves
    #[serde(default)]
    pub member_id: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
    pub category: String,
    #[serde(default)]
    pub claim_amount: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "EUR".to_string()
}

/// Claims service for business logic
pub struct ClaimsService {
    db: Arc<ClaimsDb>,
    events: Arc<EventBus>,
    retry: RetryPolicy,
}

impl ClaimsService {
    /// Create a new claims service with the default retry policy
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

    fn resolve_member_id(
        caller: &Caller,
        input: &SubmitClaimInput,
    ) -> Result<String, ClaimsError> {
        if caller.role == Role::Member {
            Ok(caller.user_id.clone())
        } else {
            input
                .member_id
                .clone()
                .ok_or_else(|| ClaimsError::InvalidInput("memberId is required".to_string()))
        }
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Submit a claim: issue a number, insert the claim, and append the
    /// initial history entry in one transaction.
    pub fn submit_claim(
        &self,
        caller: &Caller,
        input: &SubmitClaimInput,
    ) -> Result<ClaimRow, ClaimsError> {
        let member_id = Self::resolve_member_id(caller, input)?;

        let claim = with_retry(&self.retry, || {
            self.db.with_conn_mut(|conn| {
                let tx = conn
                    .transaction()
                    .map_err(|e| db::db_err("Transaction failed", e))?;

                let year = issuance::current_year();
                let number = issuance::issue_claim_number(&tx, &caller.tenant_id, year)?;

                let repo = TenantClaims::new(&tx, caller.tenant_id.clone());
                let claim = repo.insert(&NewClaim {
                    member_id: member_id.clone(),
                    branch_id: input.branch_id.clone(),
                    staff_id: None,
                    status: ClaimStatus::Submitted,
                    claim_number: Some(number),
                    category: input.category.clone(),
                    claim_amount: input.claim_amount,
                    currency: input.currency.clone(),
                })?;

                stage_history::append(
                    &tx,
                    &NewStageEntry {
                        claim_id: &claim.id,
                        from_status: None,
                        to_status: ClaimStatus::Submitted,
                        note: None,
                        is_public: true,
                        actor_id: &caller.user_id,
                        actor_role: caller.role,
                    },
                )?;

                tx.commit().map_err(|e| db::db_err("Commit failed", e))?;
                Ok(claim)
            })
        })?;

        info!(
            claim = %claim.id,
            number = claim.claim_number.as_deref().unwrap_or(""),
            tenant = %caller.tenant_id,
            "Claim submitted"
        );
        self.events.emit(ClaimEvent::ClaimSubmitted {
            id: claim.id.clone(),
            claim_number: claim.claim_number.clone().unwrap_or_default(),
            tenant_id: caller.tenant_id.clone(),
        });

        Ok(claim)
    }

    /// Create a draft claim with no number; the backfill or a later
    /// submission assigns one.
    pub fn create_draft(
        &self,
        caller: &Caller,
        input: &SubmitClaimInput,
    ) -> Result<ClaimRow, ClaimsError> {
        let member_id = Self::resolve_member_id(caller, input)?;

        let claim = with_retry(&self.retry, || {
            self.db.with_conn_mut(|conn| {
                let tx = conn
                    .transaction()
                    .map_err(|e| db::db_err("Transaction failed", e))?;

                let repo = TenantClaims::new(&tx, caller.tenant_id.clone());
                let claim = repo.insert(&NewClaim {
                    member_id: member_id.clone(),
                    branch_id: input.branch_id.clone(),
                    staff_id: None,
                    status: ClaimStatus::Draft,
                    claim_number: None,
                    category: input.category.clone(),
                    claim_amount: input.claim_amount,
                    currency: input.currency.clone(),
                })?;

                stage_history::append(
                    &tx,
                    &NewStageEntry {
                        claim_id: &claim.id,
                        from_status: None,
                        to_status: ClaimStatus::Draft,
                        note: None,
                        is_public: true,
                        actor_id: &caller.user_id,
                        actor_role: caller.role,
                    },
                )?;

                tx.commit().map_err(|e| db::db_err("Commit failed", e))?;
                Ok(claim)
            })
        })?;

        self.events.emit(ClaimEvent::ClaimDrafted {
            id: claim.id.clone(),
            tenant_id: caller.tenant_id.clone(),
        });

        Ok(claim)
    }

    /// Transition a claim to a new status and append the audit row in one
    /// transaction. No transition graph is validated; any target status may
    /// follow any current one.
    pub fn transition_claim(
        &self,
        caller: &Caller,
        claim_id: &str,
        new_status: ClaimStatus,
        note: Option<&str>,
        is_public: bool,
    ) -> Result<StageHistoryRow, ClaimsError> {
        if caller.role == Role::Member {
            return Err(ClaimsError::Forbidden(
                "members may not transition claims".to_string(),
            ));
        }

        let (entry, from) = with_retry(&self.retry, || {
            self.db.with_conn_mut(|conn| {
                let tx = conn
                    .transaction()
                    .map_err(|e| db::db_err("Transaction failed", e))?;

                let repo = TenantClaims::new(&tx, caller.tenant_id.clone());
                let claim = repo.get(claim_id)?.ok_or(ClaimsError::NotFound)?;

                // Agents may only touch claims of their linked clients;
                // anything else looks like a missing claim.
                if caller.role == Role::Agent {
                    let clients =
                        agent_links::client_ids(&tx, &caller.tenant_id, &caller.user_id)?;
                    if !clients.contains(&claim.member_id) {
                        return Err(ClaimsError::NotFound);
                    }
                }

                let from = claim.status;
                repo.set_status(claim_id, new_status)?;

                let entry = stage_history::append(
                    &tx,
                    &NewStageEntry {
                        claim_id,
                        from_status: Some(from),
                        to_status: new_status,
                        note,
                        is_public,
                        actor_id: &caller.user_id,
                        actor_role: caller.role,
                    },
                )?;

                tx.commit().map_err(|e| db::db_err("Commit failed", e))?;
                Ok((entry, from))
            })
        })?;

        info!(
            claim = %claim_id,
            from = %from,
            to = %new_status,
            actor = %caller.user_id,
            "Claim transitioned"
        );
        self.events.emit(ClaimEvent::ClaimTransitioned {
            id: claim_id.to_string(),
            from,
            to: new_status,
            tenant_id: caller.tenant_id.clone(),
        });

        Ok(entry)
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// List claims visible to the caller under the requested scope
    pub fn list_claims(
        &self,
        caller: &Caller,
        params: &ScopeParams,
        filter: &ClaimFilter,
    ) -> Result<ClaimPage, ClaimsError> {
        self.db.with_conn(|conn| {
            let tenant_id = scope::effective_tenant(caller, params)?;
            let visibility = scope::resolve_scope(conn, caller, params)?;
            TenantClaims::new(conn, tenant_id).list(&visibility, filter)
        })
    }

    /// Get a single claim, subject to the same tenant and scope checks as a
    /// listing. A claim outside the caller's visibility yields `NotFound`.
    pub fn get_claim(
        &self,
        caller: &Caller,
        params: &ScopeParams,
        claim_id: &str,
    ) -> Result<ClaimRow, ClaimsError> {
        self.db.with_conn(|conn| {
            let tenant_id = scope::effective_tenant(caller, params)?;
            let visibility = scope::resolve_scope(conn, caller, params)?;

            let claim = TenantClaims::new(conn, tenant_id)
                .get(claim_id)?
                .ok_or(ClaimsError::NotFound)?;

            if !visibility.admits(&claim) {
                return Err(ClaimsError::NotFound);
            }

            Ok(claim)
        })
    }

    /// Resolve a raw claim number to a claim id within a tenant.
    ///
    /// The format gate runs first: malformed input never reaches storage,
    /// and a malformed number is indistinguishable from a missing one.
    pub fn resolve_claim_number(
        &self,
        raw: &str,
        tenant_id: &str,
    ) -> Result<String, ClaimsError> {
        if !claim_number::is_valid(raw) {
            return Err(ClaimsError::NotFound);
        }
        let normalized = raw.trim().to_ascii_uppercase();

        self.db.with_conn(|conn| {
            TenantClaims::new(conn, tenant_id)
                .get_by_number(&normalized)?
                .map(|claim| claim.id)
                .ok_or(ClaimsError::NotFound)
        })
    }

    /// Stage history for a claim in timeline order. Member and agent callers
    /// see public entries only; staff-level callers see internal notes too.
    pub fn timeline(
        &self,
        caller: &Caller,
        params: &ScopeParams,
        claim_id: &str,
    ) -> Result<Vec<StageHistoryRow>, ClaimsError> {
        let claim = self.get_claim(caller, params, claim_id)?;
        let public_only = matches!(caller.role, Role::Member | Role::Agent);

        self.db
            .with_conn(|conn| stage_history::list_for_claim(conn, &claim.id, public_only))
    }
}
