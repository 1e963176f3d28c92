//! Integration tests for the claim lifecycle
//!
//! These exercise the service layer end to end against an in-memory
//! database: numbering under concurrency, tenant isolation, scope
//! narrowing, and backfill idempotence.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use chrono::{Datelike, Utc};

use claims_ledger::claim_number;
use claims_ledger::db::claims::NewClaim;
use claims_ledger::db::counters;
use claims_ledger::db::tenants::{create_tenant, CreateTenantInput};
use claims_ledger::db::{agent_links, TenantClaims};
use claims_ledger::services::claims_service::SubmitClaimInput;
use claims_ledger::services::BackfillDriver;
use claims_ledger::{
    Caller, ClaimFilter, ClaimStatus, ClaimsDb, ClaimsError, ClaimsService, EventBus, Role,
    ScopeParams,
};

/// Two tenants, one with country code XK and one with MK
fn setup() -> (Arc<ClaimsDb>, Arc<EventBus>) {
    let db = Arc::new(ClaimsDb::open_in_memory().unwrap());
    db.with_conn(|conn| {
        create_tenant(
            conn,
            &CreateTenantInput {
                id: "t-xk".into(),
                name: "Kosovo Ops".into(),
                short_code: "KOS".into(),
                country_code: Some("XK".into()),
            },
        )?;
        create_tenant(
            conn,
            &CreateTenantInput {
                id: "t-mk".into(),
                name: "Macedonia Ops".into(),
                short_code: "MKD".into(),
                country_code: Some("MK".into()),
            },
        )?;
        Ok(())
    })
    .unwrap();
    (db, Arc::new(EventBus::new()))
}

fn service(db: &Arc<ClaimsDb>, events: &Arc<EventBus>) -> ClaimsService {
    ClaimsService::new(db.clone(), events.clone())
}

fn caller(user_id: &str, role: Role, tenant_id: &str) -> Caller {
    Caller {
        user_id: user_id.into(),
        role,
        tenant_id: tenant_id.into(),
        branch_id: None,
    }
}

fn submit_input(member_id: Option<&str>) -> SubmitClaimInput {
    SubmitClaimInput {
        member_id: member_id.map(String::from),
        branch_id: None,
        category: "vehicle".into(),
        claim_amount: Some(2500.0),
        currency: "EUR".into(),
    }
}

fn scope_params(scope: &str) -> ScopeParams {
    ScopeParams {
        scope: Some(scope.into()),
        ..Default::default()
    }
}

#[test]
fn test_submission_issues_sequential_numbers() {
    let (db, events) = setup();
    let svc = service(&db, &events);
    let member = caller("m1", Role::Member, "t-xk");
    let year = Utc::now().year();

    for expected_seq in 1..=5u32 {
        let claim = svc.submit_claim(&member, &submit_input(None)).unwrap();
        let expected = claim_number::format("XK", year, expected_seq).unwrap();
        assert_eq!(claim.claim_number.as_deref(), Some(expected.as_str()));
        assert_eq!(claim.status, ClaimStatus::Submitted);
        assert_eq!(claim.member_id, "m1");
    }
}

#[test]
fn test_concurrent_submissions_issue_distinct_gapless_numbers() {
    let (db, events) = setup();
    let svc = Arc::new(service(&db, &events));

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let svc = svc.clone();
            thread::spawn(move || {
                let member = caller(&format!("m{}", i), Role::Member, "t-xk");
                svc.submit_claim(&member, &submit_input(None))
                    .unwrap()
                    .claim_number
                    .unwrap()
            })
        })
        .collect();

    let numbers: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let distinct: HashSet<&String> = numbers.iter().collect();
    assert_eq!(distinct.len(), 50);

    let mut sequences: Vec<u32> = numbers
        .iter()
        .map(|n| claim_number::parse(n).unwrap().sequence)
        .collect();
    sequences.sort_unstable();
    assert_eq!(sequences, (1..=50).collect::<Vec<u32>>());
}

#[test]
fn test_tenant_isolation_in_listing_and_direct_lookup() {
    let (db, events) = setup();
    let svc = service(&db, &events);

    let xk_claim = svc
        .submit_claim(&caller("m1", Role::Member, "t-xk"), &submit_input(None))
        .unwrap();
    let mk_claim = svc
        .submit_claim(&caller("m2", Role::Member, "t-mk"), &submit_input(None))
        .unwrap();

    let admin_xk = caller("a1", Role::TenantAdmin, "t-xk");
    let page = svc
        .list_claims(&admin_xk, &scope_params("admin"), &ClaimFilter::default())
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.claims[0].id, xk_claim.id);

    // Supplying the other tenant's claim id directly still finds nothing
    let err = svc
        .get_claim(&admin_xk, &scope_params("admin"), &mk_claim.id)
        .unwrap_err();
    assert!(matches!(err, ClaimsError::NotFound));

    // Nor does its claim number resolve in the wrong tenant
    let err = svc
        .resolve_claim_number(mk_claim.claim_number.as_deref().unwrap(), "t-xk")
        .unwrap_err();
    assert!(matches!(err, ClaimsError::NotFound));
}

#[test]
fn test_staff_queue_and_unassigned_scopes_are_disjoint() {
    let (db, events) = setup();
    let svc = service(&db, &events);

    db.with_conn(|conn| {
        let repo = TenantClaims::new(conn, "t-xk");
        for (member, staff) in [("m1", Some("s1")), ("m2", Some("s1")), ("m3", None)] {
            repo.insert(&NewClaim {
                member_id: member.into(),
                branch_id: None,
                staff_id: staff.map(String::from),
                status: ClaimStatus::Verification,
                claim_number: None,
                category: "property".into(),
                claim_amount: None,
                currency: "EUR".into(),
            })?;
        }
        Ok(())
    })
    .unwrap();

    let staff = caller("s1", Role::Staff, "t-xk");

    let queue = svc
        .list_claims(&staff, &scope_params("staff_queue"), &ClaimFilter::default())
        .unwrap();
    assert_eq!(queue.total, 2);
    assert!(queue
        .claims
        .iter()
        .all(|c| c.staff_id.as_deref() == Some("s1")));

    let unassigned = svc
        .list_claims(&staff, &scope_params("staff_unassigned"), &ClaimFilter::default())
        .unwrap();
    assert_eq!(unassigned.total, 1);
    assert!(unassigned.claims.iter().all(|c| c.staff_id.is_none()));

    let queue_ids: HashSet<_> = queue.claims.iter().map(|c| c.id.clone()).collect();
    assert!(unassigned.claims.iter().all(|c| !queue_ids.contains(&c.id)));
}

#[test]
fn test_agent_sees_only_linked_clients() {
    let (db, events) = setup();
    let svc = service(&db, &events);

    db.with_conn(|conn| agent_links::link_client(conn, "t-xk", "agent-1", "m1")).unwrap();

    svc.submit_claim(&caller("m1", Role::Member, "t-xk"), &submit_input(None))
        .unwrap();
    svc.submit_claim(&caller("m2", Role::Member, "t-xk"), &submit_input(None))
        .unwrap();

    let agent = caller("agent-1", Role::Agent, "t-xk");
    let page = svc
        .list_claims(&agent, &scope_params("agent_queue"), &ClaimFilter::default())
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.claims[0].member_id, "m1");
}

#[test]
fn test_member_listing_defaults_fail_closed() {
    let (db, events) = setup();
    let svc = service(&db, &events);

    svc.submit_claim(&caller("m1", Role::Member, "t-xk"), &submit_input(None))
        .unwrap();
    svc.submit_claim(&caller("m2", Role::Member, "t-xk"), &submit_input(None))
        .unwrap();

    // No scope requested: a staff caller still only sees "their own" claims
    let staff = caller("s1", Role::Staff, "t-xk");
    let page = svc
        .list_claims(&staff, &ScopeParams::default(), &ClaimFilter::default())
        .unwrap();
    assert_eq!(page.total, 0);

    let member = caller("m1", Role::Member, "t-xk");
    let page = svc
        .list_claims(&member, &ScopeParams::default(), &ClaimFilter::default())
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.claims[0].member_id, "m1");
}

#[test]
fn test_resolve_claim_number_is_a_security_gate() {
    let (db, events) = setup();
    let svc = service(&db, &events);

    let claim = svc
        .submit_claim(&caller("m1", Role::Member, "t-xk"), &submit_input(None))
        .unwrap();
    let number = claim.claim_number.unwrap();

    // Case-insensitive resolution of a real number
    let resolved = svc
        .resolve_claim_number(&number.to_lowercase(), "t-xk")
        .unwrap();
    assert_eq!(resolved, claim.id);

    // Malformed and well-formed-but-nonexistent are indistinguishable
    let malformed = svc.resolve_claim_number("not-a-number", "t-xk").unwrap_err();
    let missing = svc
        .resolve_claim_number("CLM-XX-2024-999999", "t-xk")
        .unwrap_err();
    assert!(matches!(malformed, ClaimsError::NotFound));
    assert!(matches!(missing, ClaimsError::NotFound));
}

#[test]
fn test_transition_records_history_and_filters_private_notes() {
    let (db, events) = setup();
    let svc = service(&db, &events);

    let member = caller("m1", Role::Member, "t-xk");
    let claim = svc.submit_claim(&member, &submit_input(None)).unwrap();

    // Members may not transition
    let err = svc
        .transition_claim(&member, &claim.id, ClaimStatus::Resolved, None, true)
        .unwrap_err();
    assert!(matches!(err, ClaimsError::Forbidden(_)));

    let staff = caller("s1", Role::Staff, "t-xk");
    let entry = svc
        .transition_claim(
            &staff,
            &claim.id,
            ClaimStatus::Verification,
            Some("missing police report"),
            false,
        )
        .unwrap();
    assert_eq!(entry.from_status, Some(ClaimStatus::Submitted));
    assert_eq!(entry.to_status, ClaimStatus::Verification);
    assert!(!entry.is_public);

    // No transition graph: a backwards move is accepted
    svc.transition_claim(&staff, &claim.id, ClaimStatus::Submitted, None, true)
        .unwrap();

    // Staff see the full trail, the member only public rows
    let staff_view = svc
        .timeline(&staff, &scope_params("staff_all"), &claim.id)
        .unwrap();
    assert_eq!(staff_view.len(), 3);
    assert!(staff_view[0].from_status.is_none());

    let member_view = svc
        .timeline(&member, &ScopeParams::default(), &claim.id)
        .unwrap();
    assert_eq!(member_view.len(), 2);
    assert!(member_view.iter().all(|e| e.is_public));
}

#[test]
fn test_backfill_numbers_drafts_once_and_dry_run_consumes_nothing() {
    let (db, events) = setup();
    let svc = service(&db, &events);
    let year = Utc::now().year();

    for member in ["m1", "m2", "m3"] {
        svc.create_draft(&caller(member, Role::Member, "t-xk"), &submit_input(None))
            .unwrap();
    }

    let driver = BackfillDriver::new(db.clone(), events.clone());

    // Dry run reports three assignments but advances no counter
    let plan = driver.plan().unwrap();
    assert_eq!(plan.planned.len(), 3);
    assert!(plan.failures.is_empty());
    assert_eq!(
        plan.planned[0].claim_number,
        claim_number::format("XK", year, 1).unwrap()
    );
    db.with_conn(|conn| {
        assert_eq!(counters::peek_sequence(conn, "t-xk", year)?, 0);
        Ok(())
    })
    .unwrap();

    // Real run assigns in creation order
    let report = driver.run().unwrap();
    assert_eq!(report.numbered, 3);
    assert!(report.failures.is_empty());

    // Second run has nothing left to do
    let report = driver.run().unwrap();
    assert_eq!(report.numbered, 0);
    assert!(driver.plan().unwrap().planned.is_empty());

    let stats = db.stats().unwrap();
    assert_eq!(stats.unnumbered_count, 0);
}

#[test]
fn test_dry_run_reports_per_claim_failures_like_the_real_run() {
    let (db, events) = setup();
    let svc = service(&db, &events);

    // A tenant that can hold claims but cannot issue numbers yet
    db.with_conn(|conn| {
        create_tenant(
            conn,
            &CreateTenantInput {
                id: "t-legacy".into(),
                name: "Legacy Ops".into(),
                short_code: "LEG".into(),
                country_code: None,
            },
        )?;
        Ok(())
    })
    .unwrap();

    svc.create_draft(&caller("m1", Role::Member, "t-xk"), &submit_input(None))
        .unwrap();
    svc.create_draft(&caller("m9", Role::Member, "t-legacy"), &submit_input(None))
        .unwrap();

    let driver = BackfillDriver::new(db.clone(), events);

    // The preview plans the numberable claim and reports the other as a
    // failure instead of aborting the whole batch
    let plan = driver.plan().unwrap();
    assert_eq!(plan.planned.len(), 1);
    assert_eq!(plan.planned[0].tenant_id, "t-xk");
    assert_eq!(plan.failures.len(), 1);
    assert!(plan.failures[0].contains("t-legacy"));

    // The real run lands in the same place
    let report = driver.run().unwrap();
    assert_eq!(report.numbered, 1);
    assert_eq!(report.failures.len(), 1);
}

#[test]
fn test_agent_cannot_transition_unlinked_clients_claim() {
    let (db, events) = setup();
    let svc = service(&db, &events);

    db.with_conn(|conn| agent_links::link_client(conn, "t-xk", "agent-1", "m1")).unwrap();

    let linked = svc
        .submit_claim(&caller("m1", Role::Member, "t-xk"), &submit_input(None))
        .unwrap();
    let unlinked = svc
        .submit_claim(&caller("m2", Role::Member, "t-xk"), &submit_input(None))
        .unwrap();

    let agent = caller("agent-1", Role::Agent, "t-xk");

    // A non-client's claim is indistinguishable from a missing one
    let err = svc
        .transition_claim(&agent, &unlinked.id, ClaimStatus::Verification, None, true)
        .unwrap_err();
    assert!(matches!(err, ClaimsError::NotFound));

    let entry = svc
        .transition_claim(&agent, &linked.id, ClaimStatus::Verification, None, true)
        .unwrap();
    assert_eq!(entry.from_status, Some(ClaimStatus::Submitted));
    assert_eq!(entry.to_status, ClaimStatus::Verification);
}

#[test]
fn test_live_issuance_and_backfill_share_one_sequence() {
    let (db, events) = setup();
    let svc = service(&db, &events);
    let year = Utc::now().year();

    let draft = svc
        .create_draft(&caller("m1", Role::Member, "t-xk"), &submit_input(None))
        .unwrap();
    let live = svc
        .submit_claim(&caller("m2", Role::Member, "t-xk"), &submit_input(None))
        .unwrap();
    assert_eq!(
        live.claim_number.as_deref(),
        Some(claim_number::format("XK", year, 1).unwrap().as_str())
    );

    let report = BackfillDriver::new(db.clone(), events).run().unwrap();
    assert_eq!(report.numbered, 1);

    let admin = caller("a1", Role::TenantAdmin, "t-xk");
    let numbered = svc
        .get_claim(&admin, &scope_params("admin"), &draft.id)
        .unwrap();
    assert_eq!(
        numbered.claim_number.as_deref(),
        Some(claim_number::format("XK", year, 2).unwrap().as_str())
    );
}

#[test]
fn test_file_backed_database_round_trip() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let db_path = temp_dir.path().join("claims.db");

    {
        let db = Arc::new(ClaimsDb::open(&db_path).unwrap());
        db.with_conn(|conn| {
            create_tenant(
                conn,
                &CreateTenantInput {
                    id: "t-xk".into(),
                    name: "Kosovo Ops".into(),
                    short_code: "KOS".into(),
                    country_code: Some("XK".into()),
                },
            )?;
            Ok(())
        })
        .unwrap();
        let svc = ClaimsService::new(db, Arc::new(EventBus::new()));
        svc.submit_claim(&caller("m1", Role::Member, "t-xk"), &submit_input(None))
            .unwrap();
    }

    let reopened = ClaimsDb::open(&db_path).unwrap();
    let stats = reopened.stats().unwrap();
    assert_eq!(stats.claim_count, 1);
    assert_eq!(stats.unnumbered_count, 0);
}
