//! Concurrency test: many threads sharing one gate.
//!
//! Validates that decisions, score updates, rate limits and audit appends
//! stay consistent under contention.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;

use agentic_trust::{
    AgentIdentity, CapabilityCard, GatePolicy, ManualClock, TrustCore, TrustGate,
};

const T0: u64 = 1_700_000_000_000_000;

fn signed(name: &str) -> CapabilityCard {
    let identity = AgentIdentity::generate_at(name, ["search"], None, T0);
    let mut card = CapabilityCard::new(name, "", ["search"], 0.9);
    card.sign_at(&identity, T0).expect("signing should succeed");
    card
}

#[test]
fn stress_concurrent_evaluations_share_one_audit_chain() {
    let clock = ManualClock::new(T0);
    let gate = Arc::new(TrustGate::with_clock(GatePolicy::default(), Arc::new(clock)).unwrap());
    let indices = Arc::new(Mutex::new(Vec::new()));
    let required = vec!["search".to_string()];

    let mut handles = Vec::new();
    for thread_id in 0..8 {
        let gate = Arc::clone(&gate);
        let indices = Arc::clone(&indices);
        let required = required.clone();
        handles.push(thread::spawn(move || {
            let card = signed(&format!("agent-{thread_id}"));
            for _ in 0..50 {
                let result = gate
                    .evaluate(&card, &required, None)
                    .expect("audit append should succeed");
                assert!(result.allowed);
                indices.lock().unwrap().push(result.audit_index);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let indices = indices.lock().unwrap();
    let unique: HashSet<u64> = indices.iter().copied().collect();
    assert_eq!(indices.len(), 400);
    assert_eq!(unique.len(), 400, "every decision gets its own entry");
    assert_eq!(unique.iter().max(), Some(&399));

    let log = gate.audit_log();
    assert_eq!(log.len(), 400);
    assert!(log.verify_chain());

    let stats = gate.stats();
    assert_eq!(stats.total, 400);
    assert_eq!(stats.allowed, 400);
    // One miss per agent, the rest served from cache
    assert_eq!(stats.cache_misses, 8);
    assert_eq!(stats.cache_hits, 392);
}

#[test]
fn stress_concurrent_rate_limit_never_over_admits() {
    let clock = ManualClock::new(T0);
    let policy = GatePolicy::default().with_rate_limit(100, 3600.0);
    let gate = Arc::new(TrustGate::with_clock(policy, Arc::new(clock)).unwrap());
    let card = Arc::new(signed("hot-agent"));
    let required = vec!["search".to_string()];

    let mut handles = Vec::new();
    for _ in 0..8 {
        let gate = Arc::clone(&gate);
        let card = Arc::clone(&card);
        let required = required.clone();
        handles.push(thread::spawn(move || {
            (0..25)
                .filter(|_| gate.evaluate(&card, &required, None).unwrap().allowed)
                .count()
        }));
    }
    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    // The clock is frozen, so no token is refilled during the run
    assert_eq!(admitted, 100);
    assert_eq!(gate.stats().denied, 100);
    assert!(gate.audit_log().verify_chain());
}

#[test]
fn stress_concurrent_outcomes_are_not_lost() {
    let core = Arc::new(TrustCore::new(GatePolicy::default()).unwrap());

    let mut handles = Vec::new();
    for thread_id in 0..10 {
        let core = Arc::clone(&core);
        handles.push(thread::spawn(move || {
            for _ in 0..20 {
                core.record_outcome("shared-agent", thread_id % 2 == 0);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let score = core.gate().get_score("shared-agent");
    assert_eq!(score.successes + score.failures, 200);
    assert_eq!(score.successes, 100);
    assert!((0.0..=1.0).contains(&score.overall));
}

#[test]
fn stress_concurrent_host_appends() {
    let core = Arc::new(TrustCore::new(GatePolicy::default()).unwrap());

    let mut handles = Vec::new();
    for thread_id in 0..16 {
        let core = Arc::clone(&core);
        handles.push(thread::spawn(move || {
            (0..25)
                .map(|i| {
                    core.append_audit(
                        &format!("agent-{thread_id}"),
                        "tool_call",
                        "allow",
                        serde_json::json!({ "call": i }),
                    )
                    .unwrap()
                    .entry_id
                })
                .collect::<Vec<_>>()
        }));
    }

    let mut ids: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..400).collect::<Vec<u64>>());
    assert!(core.audit_log().verify_chain());
}
