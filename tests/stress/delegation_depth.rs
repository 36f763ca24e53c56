//! Stress test: deep delegation chains.
//!
//! Builds long A→B→C→… chains and checks that verification, attenuation
//! and expiry behave the same at depth as they do for a single hop.

use std::time::Duration;

use agentic_trust::{AgentIdentity, CapabilityCard, DelegationChain, TrustError};

const T0: u64 = 1_700_000_000_000_000;
const HOUR: u64 = 3_600_000_000;

fn agent(i: usize) -> (AgentIdentity, CapabilityCard) {
    let name = format!("hop-{i}");
    let identity = AgentIdentity::generate_at(&name, Vec::<String>::new(), None, T0);
    let mut card = CapabilityCard::new(&name, "", Vec::<String>::new(), 0.8);
    card.sign_at(&identity, T0).expect("signing should succeed");
    (identity, card)
}

/// A linear chain of `depth` links. Link `expiring` (if any) lasts an hour.
fn build_chain(depth: usize, expiring: Option<usize>) -> (DelegationChain, Vec<CapabilityCard>) {
    let agents: Vec<_> = (0..=depth).map(agent).collect();
    let mut chain = DelegationChain::new(&agents[0].0);

    for i in 0..depth {
        let ttl = (expiring == Some(i)).then(|| Duration::from_secs(3600));
        chain
            .add_at(&agents[i].0, &agents[i + 1].1, ["data:read"], ttl, T0)
            .unwrap_or_else(|e| panic!("link {i} should be accepted: {e}"));
    }
    (chain, agents.into_iter().map(|(_, c)| c).collect())
}

#[test]
fn stress_depth_100_chain_verifies() {
    let (chain, cards) = build_chain(100, None);
    assert_eq!(chain.len(), 100);
    assert!(chain.verify_at(T0));

    let leaf = cards.last().unwrap().identity.as_ref().unwrap();
    assert!(chain.capabilities_for_at(&leaf.id, T0).contains("data:read"));
}

#[test]
fn stress_deep_chain_survives_serialization() {
    let (chain, _) = build_chain(60, None);
    let json = serde_json::to_string(&chain).unwrap();
    let restored: DelegationChain = serde_json::from_str(&json).unwrap();
    assert!(restored.verify_at(T0));
    assert_eq!(restored.len(), 60);
}

#[test]
fn stress_mid_chain_expiry_breaks_whole_chain() {
    let (chain, cards) = build_chain(40, Some(20));
    assert!(chain.verify_at(T0 + HOUR - 1));

    let err = chain.check_at(T0 + HOUR).unwrap_err();
    assert!(matches!(err, TrustError::ChainBroken(ref msg) if msg.contains("delegation 20 expired")));

    // The leaf card sees the lapse as a warning and gains nothing
    let leaf = cards.last().unwrap().clone().with_chain(chain);
    let effective = leaf.effective_capabilities_at(T0 + HOUR);
    assert!(effective.capabilities.is_empty());
    assert_eq!(effective.warnings.len(), 1);
}

#[test]
fn stress_tamper_at_every_depth_detected() {
    let (chain, _) = build_chain(25, None);

    for i in 0..chain.len() {
        let mut tampered = chain.clone();
        tampered.delegations[i].capabilities.insert("data:write".into());
        let err = tampered.check_at(T0).unwrap_err();
        assert!(
            err.to_string().contains(&format!("delegation {i}: invalid signature")),
            "link {i}: {err}"
        );
    }
}

#[test]
fn stress_attenuation_holds_at_depth() {
    let agents: Vec<_> = (0..=30).map(agent).collect();
    let mut chain = DelegationChain::new(&agents[0].0);
    chain
        .add_at(&agents[0].0, &agents[1].1, ["data:*"], None, T0)
        .unwrap();
    for i in 1..30 {
        chain
            .add_at(&agents[i].0, &agents[i + 1].1, ["data:read"], None, T0)
            .unwrap();
    }
    assert!(chain.verify_at(T0));

    // Nobody past the first hop can widen the grant
    let last = &agents[30].0;
    let (_, extra) = agent(31);
    assert!(matches!(
        chain.add_at(last, &extra, ["data:write"], None, T0),
        Err(TrustError::CapabilityNotHeld(_))
    ));
    assert_eq!(chain.len(), 30);
}
