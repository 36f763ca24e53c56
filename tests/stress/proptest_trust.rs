//! Property-based tests for signatures, cards, the audit chain and scoring.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use proptest::prelude::*;
use serde_json::json;

use agentic_trust::capability::covers;
use agentic_trust::crypto::canonical::canonicalize;
use agentic_trust::gate::TrustScorer;
use agentic_trust::{AgentIdentity, AuditLog, CapabilityCard, ManualClock, ScoringConfig};

const T0: u64 = 1_700_000_000_000_000;

fn identity() -> AgentIdentity {
    AgentIdentity::generate_at("prop-agent", ["read"], None, T0)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Sign/verify roundtrip always works
    #[test]
    fn sign_verify_roundtrip(message in any::<Vec<u8>>()) {
        let id = identity();
        let sig = id.sign_at(&message, T0).unwrap();
        prop_assert!(id.verify_at(&message, &sig, T0));
    }

    /// Flipping any bit of the signature invalidates it
    #[test]
    fn signature_bit_flip_rejected(
        message in any::<Vec<u8>>(),
        byte in 0usize..64,
        bit in 0u8..8,
    ) {
        let id = identity();
        let mut sig = id.sign_at(&message, T0).unwrap();
        let mut raw = STANDARD.decode(&sig.signature).unwrap();
        raw[byte] ^= 1 << bit;
        sig.signature = STANDARD.encode(raw);
        prop_assert!(!id.verify_at(&message, &sig, T0));
    }

    /// A signature never transfers to a different message
    #[test]
    fn signature_bound_to_message(
        msg1 in any::<Vec<u8>>(),
        msg2 in any::<Vec<u8>>(),
    ) {
        prop_assume!(msg1 != msg2);
        let id = identity();
        let sig = id.sign_at(&msg1, T0).unwrap();
        prop_assert!(!id.verify_at(&msg2, &sig, T0));
    }

    /// Any change to a signed field invalidates the card
    #[test]
    fn card_tamper_rejected(
        name in "[a-z]{1,12}",
        other in "[a-z]{1,12}",
        score in 0.0f64..=1.0,
    ) {
        prop_assume!(name != other);
        let id = identity();
        let mut card = CapabilityCard::new(name.as_str(), "desc", ["read"], score);
        card.sign_at(&id, T0).unwrap();
        prop_assert!(card.verify_at(T0));

        let mut renamed = card.clone();
        renamed.name = other;
        prop_assert!(!renamed.verify_at(T0));

        let mut widened = card.clone();
        widened.capabilities.insert("write".into());
        prop_assert!(!widened.verify_at(T0));

        let mut rescored = card;
        rescored.trust_score = if score > 0.5 { score - 0.25 } else { score + 0.25 };
        prop_assert!(!rescored.verify_at(T0));
    }

    /// Editing any single entry is detected at exactly that entry
    #[test]
    fn audit_tamper_located(len in 2usize..40, pick in any::<prop::sample::Index>()) {
        let log = AuditLog::with_clock(Arc::new(ManualClock::new(T0)));
        for i in 0..len {
            log.append("agent", "act", "allow", Some(json!({ "i": i }))).unwrap();
        }
        prop_assert!(log.verify_chain());

        let target = pick.index(len);
        let mut entries = log.snapshot();
        entries[target].agent_id.push('!');
        let tampered = AuditLog::from_entries(entries, Arc::new(ManualClock::new(T0)));
        prop_assert_eq!(tampered.first_invalid_index(), Some(target as u64));
    }

    /// Success never lowers a score and failure never raises it; every
    /// value stays within [0, 1]
    #[test]
    fn trust_score_monotonic(outcomes in prop::collection::vec(any::<bool>(), 1..60)) {
        let scorer = TrustScorer::new(ScoringConfig::default());
        let mut previous = scorer.get("agent", T0).overall;
        for (i, success) in outcomes.into_iter().enumerate() {
            let now = T0 + i as u64;
            let score = if success {
                scorer.record_success("agent", &[], now)
            } else {
                scorer.record_failure("agent", &[], now)
            };
            if success {
                prop_assert!(score.overall >= previous);
            } else {
                prop_assert!(score.overall <= previous);
            }
            prop_assert!((0.0..=1.0).contains(&score.overall));
            prop_assert!((0.0..=1.0).contains(&score.reliability));
            previous = score.overall;
        }
    }

    /// Canonical form does not depend on key insertion order
    #[test]
    fn canonical_order_independent(
        pairs in prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..12),
    ) {
        let forward: serde_json::Map<String, serde_json::Value> =
            pairs.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
        let reverse: serde_json::Map<String, serde_json::Value> =
            pairs.iter().rev().map(|(k, v)| (k.clone(), json!(v))).collect();
        prop_assert_eq!(
            canonicalize(&serde_json::Value::Object(forward)).unwrap(),
            canonicalize(&serde_json::Value::Object(reverse)).unwrap()
        );
    }

    /// Every capability covers itself and the global wildcard covers all
    #[test]
    fn capability_cover_basics(cap in "[a-z]{1,8}(:[a-z]{1,8}){0,2}") {
        prop_assert!(covers(&cap, &cap));
        prop_assert!(covers("*", &cap));
    }
}
