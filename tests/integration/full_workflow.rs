//! Integration test: full end-to-end workflow.
//!
//! Tests the complete lifecycle on a simulated clock:
//! 1. Create identities and sign capability cards
//! 2. Delegate a capability with a one-hour lifetime
//! 3. Pass the gate on delegated capabilities
//! 4. Let the delegation lapse and get denied
//! 5. Rate-limit a chatty agent without affecting others
//! 6. Verify the audit chain covers every decision

use std::sync::Arc;
use std::time::Duration;

use agentic_trust::audit::{import_jsonl, AuditQuery};
use agentic_trust::{
    AgentIdentity, AuditLog, CapabilityCard, DelegationChain, Dimension, ExportFormat, GatePolicy,
    ManualClock, TrustGate, Verdict,
};

const T0: u64 = 1_700_000_000_000_000;

fn signed(name: &str, caps: &[&str], score: f64, now: u64) -> (AgentIdentity, CapabilityCard) {
    let identity = AgentIdentity::generate_at(name, caps.iter().copied(), None, now);
    let mut card = CapabilityCard::new(name, format!("{name} agent"), caps.iter().copied(), score);
    card.sign_at(&identity, now).expect("fresh identity can sign");
    (identity, card)
}

fn caps(list: &[&str]) -> Vec<String> {
    list.iter().map(|c| c.to_string()).collect()
}

#[test]
fn full_workflow_delegation_to_expiry() {
    let clock = ManualClock::new(T0);
    let gate = TrustGate::with_clock(GatePolicy::default(), Arc::new(clock.clone()))
        .expect("default policy is valid");

    // ── Step 1: Create identities ───────────────────────────────────────
    let (alice, alice_card) = signed("alice", &["translate", "summarize"], 0.8, T0);
    let (_bob, bob_card) = signed("bob", &[], 0.8, T0);

    assert!(alice.id.as_str().starts_with("did:atrust:"));
    assert_ne!(alice_card.agent_id(), bob_card.agent_id());
    assert!(alice_card.verify_at(T0));
    assert!(bob_card.verify_at(T0));

    // ── Step 2: Delegate for one hour ───────────────────────────────────
    let mut chain = DelegationChain::new(&alice);
    chain
        .add_at(&alice, &bob_card, ["translate"], Some(Duration::from_secs(3600)), T0)
        .expect("root may delegate");
    let bob_card = bob_card.with_chain(chain);

    // Attaching a chain leaves the card signature intact
    assert!(bob_card.verify_at(T0));
    assert!(bob_card
        .effective_capabilities_at(T0)
        .capabilities
        .contains("translate"));

    // ── Step 3: Gate allows the delegated capability ────────────────────
    let allowed = gate
        .evaluate(&bob_card, &caps(&["translate"]), Some(0.5))
        .expect("audit append succeeds");
    assert_eq!(allowed.verdict, Verdict::Allow);
    assert!(allowed.allowed);
    assert!(allowed.verified_capabilities.contains("translate"));
    assert!((allowed.trust_score - 0.8).abs() < 1e-9);

    // Capabilities nobody granted are still missing
    let denied = gate
        .evaluate(&bob_card, &caps(&["summarize"]), Some(0.5))
        .unwrap();
    assert!(!denied.allowed);
    assert!(denied.reason.contains("summarize"));

    // ── Step 4: Delegation lapses ───────────────────────────────────────
    clock.advance(Duration::from_secs(3600));
    let expired = gate
        .evaluate(&bob_card, &caps(&["translate"]), Some(0.5))
        .unwrap();
    assert_eq!(expired.verdict, Verdict::Deny);
    assert!(
        expired.reason.contains("delegation"),
        "denial should cite the lapsed delegation, got: {}",
        expired.reason
    );
    assert!(expired.warnings.iter().any(|w| w.contains("expired")));

    // Alice's own card is unaffected
    let alice_ok = gate
        .evaluate(&alice_card, &caps(&["translate"]), Some(0.5))
        .unwrap();
    assert!(alice_ok.allowed);

    // ── Step 5: Audit chain covers every decision ───────────────────────
    let log = gate.audit_log();
    assert_eq!(log.len(), 4);
    assert!(log.verify_chain());
    let bob_id = bob_card.agent_id().unwrap().to_string();
    let bob_entries = log.entries(&AuditQuery {
        agent_id: Some(bob_id),
        ..Default::default()
    });
    assert_eq!(bob_entries.len(), 3);
    assert_eq!(
        bob_entries.iter().map(|e| e.decision.as_str()).collect::<Vec<_>>(),
        vec!["allow", "deny", "deny"]
    );
}

#[test]
fn full_workflow_multi_hop_chain() {
    let (a, _) = signed("a", &["read:*"], 0.9, T0);
    let (b, b_card) = signed("b", &[], 0.9, T0);
    let (_, c_card) = signed("c", &[], 0.9, T0);
    let (_, d_card) = signed("d", &[], 0.9, T0);

    let mut chain = DelegationChain::new(&a);
    chain.add_at(&a, &b_card, ["read:*"], None, T0).unwrap();
    chain.add_at(&b, &c_card, ["read:mail"], None, T0).unwrap();
    assert!(chain.verify_at(T0));

    // A link from someone who never received anything breaks contiguity
    let mut broken = chain.clone();
    let (d_as_delegator, _) = signed("d2", &[], 0.9, T0);
    let mut side = DelegationChain::new(&d_as_delegator);
    let stray = side
        .add_at(&d_as_delegator, &d_card, ["read:mail"], None, T0)
        .unwrap();
    broken.register_identity(&d_as_delegator);
    broken.push(stray);
    assert!(!broken.verify_at(T0));

    // The broken chain contributes nothing to D's card
    let d_card = d_card.with_chain(broken);
    let effective = d_card.effective_capabilities_at(T0);
    assert!(effective.capabilities.is_empty());
    assert_eq!(effective.warnings.len(), 1);
}

#[test]
fn full_workflow_rate_limit_isolated_per_agent() {
    let clock = ManualClock::new(T0);
    let policy = GatePolicy::default().with_rate_limit(3, 60.0);
    let gate = TrustGate::with_clock(policy, Arc::new(clock.clone())).unwrap();

    let (_, chatty) = signed("chatty", &["search"], 0.9, T0);
    let (_, quiet) = signed("quiet", &["search"], 0.9, T0);
    let need = caps(&["search"]);

    for i in 0..3 {
        let r = gate.evaluate(&chatty, &need, None).unwrap();
        assert!(r.allowed, "call {i} should pass");
    }

    let limited = gate.evaluate(&chatty, &need, None).unwrap();
    assert!(!limited.allowed);
    assert!(limited.reason.contains("rate limit"));
    assert!(limited.retry_after.unwrap_or(0.0) > 0.0);

    // Another agent has its own bucket
    assert!(gate.evaluate(&quiet, &need, None).unwrap().allowed);

    // Tokens come back with time
    clock.advance(Duration::from_secs(21));
    assert!(gate.evaluate(&chatty, &need, None).unwrap().allowed);

    let stats = gate.stats();
    assert_eq!(stats.total, 6);
    assert_eq!(stats.denied, 1);
}

#[test]
fn full_workflow_outcomes_feed_back_into_gate() {
    let clock = ManualClock::new(T0);
    let gate = TrustGate::with_clock(GatePolicy::default(), Arc::new(clock)).unwrap();
    let (id, card) = signed("flaky", &["deploy"], 0.9, T0);
    let need = caps(&["deploy"]);

    assert!(gate.evaluate(&card, &need, None).unwrap().allowed);

    // Reliability alone carries a quarter of the weight
    for _ in 0..6 {
        gate.record_failure(id.id.as_str(), &[]);
    }
    let partial = gate.evaluate(&card, &need, None).unwrap();
    assert!((partial.trust_score - 0.85).abs() < 1e-9);
    assert!(partial.allowed);

    for _ in 0..4 {
        gate.record_failure(id.id.as_str(), &Dimension::ALL);
    }
    let after = gate.evaluate(&card, &need, None).unwrap();
    assert!(after.trust_score < 0.9);
    assert!(!after.allowed, "repeated failures should drop below 0.7");
}

#[test]
fn full_workflow_audit_survives_export_import() {
    let clock = ManualClock::new(T0);
    let gate = TrustGate::with_clock(GatePolicy::default(), Arc::new(clock.clone())).unwrap();
    let (_, card) = signed("exporter", &["search"], 0.9, T0);

    for _ in 0..5 {
        gate.evaluate(&card, &caps(&["search"]), None).unwrap();
        clock.advance(Duration::from_secs(1));
    }

    let jsonl = gate.audit_log().export(ExportFormat::Jsonl).unwrap();
    let restored = AuditLog::from_entries(import_jsonl(&jsonl).unwrap(), Arc::new(clock));
    assert_eq!(restored.len(), 5);
    assert!(restored.verify_chain());
    assert_eq!(restored.head_hash(), gate.audit_log().head_hash());

    // The restored log keeps extending the same chain
    restored.append("host", "tool_call", "allow", None).unwrap();
    assert!(restored.verify_chain());
    assert_eq!(restored.len(), 6);
}

#[test]
fn full_workflow_forged_root_rejected_by_pinned_gate() {
    let (alice, _) = signed("alice", &["admin:*"], 0.9, T0);
    let (_, mallory_card) = signed("mallory", &[], 0.9, T0);
    let (mallory_as_alice, _) = signed("mallory-key", &[], 0.9, T0);

    // Mallory builds a chain claiming alice's id as root but carrying
    // its own key, then ships it inside card JSON.
    let mut fake_root = mallory_as_alice.clone();
    fake_root.id = alice.id.clone();
    let mut chain = DelegationChain::new(&fake_root);
    chain
        .add_at(&fake_root, &mallory_card, ["admin:*"], None, T0)
        .unwrap();
    let wire = mallory_card.with_chain(chain).to_json().unwrap();
    let received = CapabilityCard::from_json(&wire).unwrap();
    let chain = received.delegation_chain.as_ref().unwrap();
    assert_eq!(chain.root.id, alice.id);
    assert_ne!(chain.root.public_key, alice.public_key);

    let clock = ManualClock::new(T0);
    let policy = GatePolicy::default().trust_root(alice.public_key.clone());
    let gate = TrustGate::with_clock(policy, Arc::new(clock)).unwrap();
    let r = gate.evaluate(&received, &caps(&["admin:users"]), None).unwrap();
    assert!(!r.allowed);
    assert!(r.reason.contains("is not trusted"));

    // Pinning alice's identity on the chain itself also exposes the swap
    let mut pinned = chain.clone();
    pinned.register_identity(&alice);
    assert!(!pinned.verify_at(T0));
}
