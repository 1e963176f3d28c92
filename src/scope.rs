//! Caller roles and visibility scopes
//!
//! Every claim listing runs through two layers: the tenant guard (the
//! `TenantClaims` repository, which always ANDs the tenant predicate) and a
//! visibility scope derived from the caller's role. Scopes are a closed sum
//! type so adding one is an exhaustive-match exercise, not an if/else chain.
//!
//! Resolution is fail-closed: an unrecognized or missing scope parameter
//! yields the narrowest scope (`member`), and a recognized scope the role is
//! not entitled to is rejected before any predicate is built.

use rusqlite::{Connection, ToSql};
use serde::{Deserialize, Serialize};

use crate::db::agent_links;
use crate::db::claims::ClaimRow;
use crate::error::ClaimsError;

/// Caller roles as resolved by the surrounding identity layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Agent,
    Staff,
    BranchManager,
    TenantAdmin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Agent => "agent",
            Role::Staff => "staff",
            Role::BranchManager => "branch_manager",
            Role::TenantAdmin => "tenant_admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "member" => Some(Role::Member),
            "agent" => Some(Role::Agent),
            "staff" => Some(Role::Staff),
            "branch_manager" => Some(Role::BranchManager),
            "tenant_admin" => Some(Role::TenantAdmin),
            "super_admin" => Some(Role::SuperAdmin),
            _ => None,
        }
    }

    /// Staff-level visibility: the three staff scopes
    fn has_staff_visibility(&self) -> bool {
        matches!(
            self,
            Role::Staff | Role::BranchManager | Role::TenantAdmin | Role::SuperAdmin
        )
    }

    /// Admin scope: tenant-wide visibility with optional branch filter
    fn has_admin_visibility(&self) -> bool {
        matches!(
            self,
            Role::BranchManager | Role::TenantAdmin | Role::SuperAdmin
        )
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller, as handed over by session resolution
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
    pub tenant_id: String,
    pub branch_id: Option<String>,
}

/// Scope-selection parameters from the request - camelCase for URL params
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeParams {
    /// Requested scope name; unrecognized or absent falls back to `member`
    #[serde(default)]
    pub scope: Option<String>,
    /// Optional branch filter for admin scope
    #[serde(default)]
    pub branch_id: Option<String>,
    /// Explicit cross-tenant target; honored for super admins only
    #[serde(default)]
    pub target_tenant_id: Option<String>,
}

/// One of the six enumerated visibility scopes, with the data its
/// predicate needs already resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityScope {
    /// The claim owner: `member_id = caller.id`
    Member { member_id: String },
    /// Tenant-wide, optionally narrowed to one branch
    Admin { branch_id: Option<String> },
    /// Staff "my queue": `staff_id = caller.id`
    StaffQueue { staff_id: String },
    /// Staff triage view: `staff_id IS NULL`
    StaffUnassigned,
    /// Staff full tenant visibility
    StaffAll,
    /// Agent: claims of linked member clients
    AgentQueue { client_ids: Vec<String> },
}

impl VisibilityScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisibilityScope::Member { .. } => "member",
            VisibilityScope::Admin { .. } => "admin",
            VisibilityScope::StaffQueue { .. } => "staff_queue",
            VisibilityScope::StaffUnassigned => "staff_unassigned",
            VisibilityScope::StaffAll => "staff_all",
            VisibilityScope::AgentQueue { .. } => "agent_queue",
        }
    }

    /// Append this scope's predicate to a WHERE clause that already carries
    /// the tenant guard. An agent with no linked clients matches nothing.
    pub fn push_predicate(&self, sql: &mut String, params: &mut Vec<Box<dyn ToSql>>) {
        match self {
            VisibilityScope::Member { member_id } => {
                sql.push_str(" AND member_id = ?");
                params.push(Box::new(member_id.clone()));
            }
            VisibilityScope::Admin { branch_id: Some(branch) } => {
                sql.push_str(" AND branch_id = ?");
                params.push(Box::new(branch.clone()));
            }
            VisibilityScope::Admin { branch_id: None } => {}
            VisibilityScope::StaffQueue { staff_id } => {
                sql.push_str(" AND staff_id = ?");
                params.push(Box::new(staff_id.clone()));
            }
            VisibilityScope::StaffUnassigned => {
                sql.push_str(" AND staff_id IS NULL");
            }
            VisibilityScope::StaffAll => {}
            VisibilityScope::AgentQueue { client_ids } => {
                if client_ids.is_empty() {
                    sql.push_str(" AND 0");
                } else {
                    let placeholders: Vec<_> = client_ids.iter().map(|_| "?").collect();
                    sql.push_str(&format!(" AND member_id IN ({})", placeholders.join(", ")));
                    for id in client_ids {
                        params.push(Box::new(id.clone()));
                    }
                }
            }
        }
    }

    /// Whether a single fetched claim row is visible under this scope.
    /// Used by single-record lookups so a direct id probe cannot widen
    /// what a listing would show.
    pub fn admits(&self, claim: &ClaimRow) -> bool {
        match self {
            VisibilityScope::Member { member_id } => claim.member_id == *member_id,
            VisibilityScope::Admin { branch_id: Some(branch) } => {
                claim.branch_id.as_deref() == Some(branch.as_str())
            }
            VisibilityScope::Admin { branch_id: None } => true,
            VisibilityScope::StaffQueue { staff_id } => {
                claim.staff_id.as_deref() == Some(staff_id.as_str())
            }
            VisibilityScope::StaffUnassigned => claim.staff_id.is_none(),
            VisibilityScope::StaffAll => true,
            VisibilityScope::AgentQueue { client_ids } => client_ids.contains(&claim.member_id),
        }
    }
}

/// Resolve the tenant a request operates on.
///
/// Only super admins may name a target tenant; for everyone else an explicit
/// target is rejected rather than silently ignored.
pub fn effective_tenant(caller: &Caller, params: &ScopeParams) -> Result<String, ClaimsError> {
    match (&params.target_tenant_id, caller.role) {
        (Some(target), Role::SuperAdmin) => Ok(target.clone()),
        (Some(_), role) => Err(ClaimsError::Forbidden(format!(
            "role {} cannot target another tenant",
            role
        ))),
        (None, _) => Ok(caller.tenant_id.clone()),
    }
}

/// Map the caller's role and requested scope to a concrete visibility scope.
///
/// Authorization happens here, before any predicate exists: a recognized
/// scope the role is not entitled to is a hard `Forbidden`. Unknown or
/// missing scope names fall back to `member`.
pub fn resolve_scope(
    conn: &Connection,
    caller: &Caller,
    params: &ScopeParams,
) -> Result<VisibilityScope, ClaimsError> {
    match params.scope.as_deref() {
        Some("admin") => {
            if !caller.role.has_admin_visibility() {
                return Err(ClaimsError::Forbidden(format!(
                    "role {} may not use admin scope",
                    caller.role
                )));
            }
            Ok(VisibilityScope::Admin {
                branch_id: params.branch_id.clone(),
            })
        }
        Some("staff_queue") => {
            if !caller.role.has_staff_visibility() {
                return Err(ClaimsError::Forbidden(format!(
                    "role {} may not use staff_queue scope",
                    caller.role
                )));
            }
            Ok(VisibilityScope::StaffQueue {
                staff_id: caller.user_id.clone(),
            })
        }
        Some("staff_unassigned") => {
            if !caller.role.has_staff_visibility() {
                return Err(ClaimsError::Forbidden(format!(
                    "role {} may not use staff_unassigned scope",
                    caller.role
                )));
            }
            Ok(VisibilityScope::StaffUnassigned)
        }
        Some("staff_all") => {
            if !caller.role.has_staff_visibility() {
                return Err(ClaimsError::Forbidden(format!(
                    "role {} may not use staff_all scope",
                    caller.role
                )));
            }
            Ok(VisibilityScope::StaffAll)
        }
        Some("agent_queue") => {
            if caller.role != Role::Agent {
                return Err(ClaimsError::Forbidden(format!(
                    "role {} may not use agent_queue scope",
                    caller.role
                )));
            }
            let client_ids = agent_links::client_ids(conn, &caller.tenant_id, &caller.user_id)?;
            Ok(VisibilityScope::AgentQueue { client_ids })
        }
        // Fail closed: the narrowest scope, never the widest
        _ => Ok(VisibilityScope::Member {
            member_id: caller.user_id.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ClaimsDb;

    fn caller(role: Role) -> Caller {
        Caller {
            user_id: "u1".into(),
            role,
            tenant_id: "t1".into(),
            branch_id: None,
        }
    }

    fn resolve(role: Role, scope: Option<&str>) -> Result<VisibilityScope, ClaimsError> {
        let db = ClaimsDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            resolve_scope(
                conn,
                &caller(role),
                &ScopeParams {
                    scope: scope.map(String::from),
                    ..Default::default()
                },
            )
        })
    }

    #[test]
    fn test_missing_scope_defaults_to_member() {
        let scope = resolve(Role::Staff, None).unwrap();
        assert_eq!(scope, VisibilityScope::Member { member_id: "u1".into() });
    }

    #[test]
    fn test_unrecognized_scope_defaults_to_member() {
        let scope = resolve(Role::TenantAdmin, Some("everything")).unwrap();
        assert_eq!(scope.as_str(), "member");
    }

    #[test]
    fn test_member_cannot_request_admin_scope() {
        assert!(matches!(
            resolve(Role::Member, Some("admin")),
            Err(ClaimsError::Forbidden(_))
        ));
        assert!(matches!(
            resolve(Role::Member, Some("staff_all")),
            Err(ClaimsError::Forbidden(_))
        ));
    }

    #[test]
    fn test_staff_gets_staff_scopes_but_not_admin() {
        assert_eq!(resolve(Role::Staff, Some("staff_queue")).unwrap().as_str(), "staff_queue");
        assert_eq!(
            resolve(Role::Staff, Some("staff_unassigned")).unwrap(),
            VisibilityScope::StaffUnassigned
        );
        assert_eq!(resolve(Role::Staff, Some("staff_all")).unwrap(), VisibilityScope::StaffAll);
        assert!(matches!(
            resolve(Role::Staff, Some("admin")),
            Err(ClaimsError::Forbidden(_))
        ));
    }

    #[test]
    fn test_agent_queue_resolves_linked_clients() {
        let db = ClaimsDb::open_in_memory().unwrap();
        let scope = db
            .with_conn(|conn| {
                agent_links::link_client(conn, "t1", "u1", "m1")?;
                agent_links::link_client(conn, "t1", "u1", "m2")?;
                resolve_scope(
                    conn,
                    &caller(Role::Agent),
                    &ScopeParams {
                        scope: Some("agent_queue".into()),
                        ..Default::default()
                    },
                )
            })
            .unwrap();
        assert_eq!(
            scope,
            VisibilityScope::AgentQueue {
                client_ids: vec!["m1".into(), "m2".into()]
            }
        );
    }

    #[test]
    fn test_staff_cannot_request_agent_queue() {
        assert!(matches!(
            resolve(Role::Staff, Some("agent_queue")),
            Err(ClaimsError::Forbidden(_))
        ));
    }

    #[test]
    fn test_only_super_admin_may_target_another_tenant() {
        let params = ScopeParams {
            target_tenant_id: Some("t2".into()),
            ..Default::default()
        };
        assert_eq!(effective_tenant(&caller(Role::SuperAdmin), &params).unwrap(), "t2");
        assert!(matches!(
            effective_tenant(&caller(Role::TenantAdmin), &params),
            Err(ClaimsError::Forbidden(_))
        ));
        assert_eq!(
            effective_tenant(&caller(Role::Member), &ScopeParams::default()).unwrap(),
            "t1"
        );
    }

    #[test]
    fn test_agent_with_no_clients_matches_nothing() {
        let scope = VisibilityScope::AgentQueue { client_ids: vec![] };
        let mut sql = String::from("tenant_id = ?");
        let mut params: Vec<Box<dyn ToSql>> = vec![];
        scope.push_predicate(&mut sql, &mut params);
        assert!(sql.ends_with(" AND 0"));
        assert!(params.is_empty());
    }
}
