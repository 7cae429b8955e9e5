//! Property tests over relevance ranking, trust arithmetic and drift.

use proptest::prelude::*;
use sm_core::{
    MemoryNode, MemorySnapshot, MutationKind, MutationPolicy, RelevanceConfig, RelevanceMatcher,
    SymbolicMutation, apply_mutation, score_drift, score_text_drift,
};

const WORDS: &[&str] = &[
    "river", "stone", "shadow", "hero", "mirror", "ash", "fire", "sea", "dream", "gate",
];

fn arb_text() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(WORDS), 0..6).prop_map(|w| w.join(" "))
}

fn arb_timestamp() -> impl Strategy<Value = String> {
    (0u64..5).prop_map(|d| format!("2026-01-0{}T00:00:00.000Z", d + 1))
}

fn arb_node() -> impl Strategy<Value = MemoryNode> {
    (
        "[a-e]{1,2}",
        arb_text(),
        prop::collection::vec(prop::sample::select(WORDS), 0..3),
        0.0f64..=1.0,
        arb_timestamp(),
    )
        .prop_map(|(id, content, tags, trust, touched)| {
            let mut node = MemoryNode::new(id, content)
                .with_tags(tags)
                .with_trust(trust);
            node.created_at = "2026-01-01T00:00:00.000Z".to_string();
            node.last_touched_at = touched;
            node
        })
}

fn arb_nodes() -> impl Strategy<Value = Vec<MemoryNode>> {
    prop::collection::vec(arb_node(), 0..12).prop_map(|mut nodes| {
        // Snapshots hold one version per id.
        let mut seen = std::collections::HashSet::new();
        nodes.retain(|n| seen.insert(n.id.clone()));
        nodes
    })
}

fn snapshot(nodes: Vec<MemoryNode>) -> MemorySnapshot {
    MemorySnapshot::new(nodes)
}

proptest! {
    #[test]
    fn relevance_is_bounded_and_totally_ordered(input in arb_text(), nodes in arb_nodes()) {
        let results = RelevanceMatcher::find_relevant_memories(
            &input,
            &nodes,
            &RelevanceConfig::default(),
        );
        prop_assert!(results.len() <= nodes.len());
        for r in &results {
            prop_assert!((0.0..=1.0).contains(&r.score));
        }
        for pair in results.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let ordered = a.score > b.score
                || (a.score == b.score && a.node.last_touched_at > b.node.last_touched_at)
                || (a.score == b.score
                    && a.node.last_touched_at == b.node.last_touched_at
                    && a.node.id < b.node.id);
            prop_assert!(ordered, "out of order: {:?} then {:?}", a.node.id, b.node.id);
        }
    }

    #[test]
    fn relevance_is_deterministic(input in arb_text(), nodes in arb_nodes()) {
        let cfg = RelevanceConfig::default();
        let first = RelevanceMatcher::find_relevant_memories(&input, &nodes, &cfg);
        let mut reversed = nodes.clone();
        reversed.reverse();
        let second = RelevanceMatcher::find_relevant_memories(&input, &reversed, &cfg);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn reinforce_then_decay_is_net_zero(start in 0.1f64..=0.9, step in 0.0f64..=0.1) {
        let policy = MutationPolicy { reinforce_step: step, decay_step: step, ..Default::default() };
        let node = MemoryNode::new("a", "x").with_trust(start);
        let now = "2026-03-01T00:00:00.000Z";

        let up = apply_mutation(
            &SymbolicMutation::new("m1", MutationKind::Reinforce, "a", ""),
            vec![node.clone()],
            &policy,
            now,
        ).unwrap();
        let down = apply_mutation(
            &SymbolicMutation::new("m2", MutationKind::Decay, "a", ""),
            up.nodes,
            &policy,
            now,
        ).unwrap();
        prop_assert!((down.nodes[0].trust_score() - start).abs() < 1e-9);

        let down_first = apply_mutation(
            &SymbolicMutation::new("m3", MutationKind::Decay, "a", ""),
            vec![node],
            &policy,
            now,
        ).unwrap();
        let up_after = apply_mutation(
            &SymbolicMutation::new("m4", MutationKind::Reinforce, "a", ""),
            down_first.nodes,
            &policy,
            now,
        ).unwrap();
        prop_assert!((up_after.nodes[0].trust_score() - start).abs() < 1e-9);
    }

    #[test]
    fn trust_stays_clamped(start in 0.0f64..=1.0, steps in prop::collection::vec(-2.0f64..2.0, 0..20)) {
        let mut node = MemoryNode::new("a", "x").with_trust(start);
        for delta in steps {
            let t = node.adjust_trust(delta);
            prop_assert!((0.0..=1.0).contains(&t));
        }
    }

    #[test]
    fn drift_of_self_is_zero(nodes in arb_nodes()) {
        let score = score_drift(&snapshot(nodes.clone()), &snapshot(nodes));
        prop_assert_eq!(score.overall_score, 0.0);
    }

    #[test]
    fn drift_is_symmetric_and_bounded(a in arb_nodes(), b in arb_nodes()) {
        let (sa, sb) = (snapshot(a), snapshot(b));
        let ab = score_drift(&sa, &sb);
        let ba = score_drift(&sb, &sa);
        prop_assert_eq!(&ab, &ba);
        prop_assert!((0.0..=1.0).contains(&ab.overall_score));
    }

    #[test]
    fn text_drift_is_symmetric(a in arb_text(), b in arb_text()) {
        prop_assert_eq!(score_text_drift(&a, &b), score_text_drift(&b, &a));
        prop_assert_eq!(score_text_drift(&a, &a).overall_score, 0.0);
    }
}
