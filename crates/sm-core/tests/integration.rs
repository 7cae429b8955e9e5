//! Integration tests exercising the in-memory pipeline:
//! parse trace → apply mutations → rank → drift, across module boundaries.

use std::collections::BTreeMap;

use sm_core::{
    MemoryNode, MemorySnapshot, MutationKind, MutationPolicy, RelevanceConfig, RelevanceMatcher,
    SymbolicTrace, apply_mutation, score_drift,
};

const TRACE_JSON: &str = r#"{
    "traceId": "t-archetypes",
    "input": "the hero meets the shadow at the river",
    "timestamp": "2026-03-01T09:00:00.000Z",
    "stages": [
        {
            "step": "recall",
            "output": {"recalled": 0},
            "insights": ["no prior memory of the river"],
            "mutations": [
                {"id": "m1", "type": "create", "targetSymbol": "river-crossing",
                 "rationale": "the hero crossed the river at dusk", "tags": ["hero"]},
                {"id": "m2", "type": "create", "targetSymbol": "shadow-meeting",
                 "rationale": "a shadow waited on the far bank"}
            ]
        },
        {
            "step": "integrate",
            "output": "linked",
            "mutations": [
                {"id": "m3", "type": "reroute", "targetSymbol": "shadow-meeting",
                 "rationale": "", "tags": ["shadow", "threshold"]},
                {"id": "m4", "type": "reinforce", "targetSymbol": "hero", "rationale": "central"},
                {"id": "m5", "type": "decay", "targetSymbol": "missing-node", "rationale": "stale"}
            ]
        }
    ]
}"#;

/// Minimal in-memory application loop: resolve by id, then by tag.
fn run(trace: &SymbolicTrace, memory: &mut BTreeMap<String, MemoryNode>) -> (usize, usize) {
    let policy = MutationPolicy::default();
    let now = "2026-03-01T09:00:01.000Z";
    let (mut applied, mut rejected) = (0, 0);

    for (_, mutation) in trace.ordered_mutations() {
        let targets: Vec<MemoryNode> = match memory.get(&mutation.target_symbol) {
            Some(node) => vec![node.clone()],
            None if mutation.kind == MutationKind::Create => vec![],
            None => memory
                .values()
                .filter(|n| n.has_tag(&mutation.target_symbol))
                .cloned()
                .collect(),
        };
        match apply_mutation(mutation, targets, &policy, now) {
            Ok(result) => {
                applied += 1;
                for node in result.nodes {
                    memory.insert(node.id.clone(), node);
                }
            }
            Err(_) => rejected += 1,
        }
    }
    (applied, rejected)
}

#[test]
fn trace_applies_in_order_with_partial_success() {
    let trace: SymbolicTrace = serde_json::from_str(TRACE_JSON).unwrap();
    trace.validate().unwrap();

    let mut memory: BTreeMap<String, MemoryNode> = BTreeMap::new();
    let (applied, rejected) = run(&trace, &mut memory);

    assert_eq!(applied, 4);
    assert_eq!(rejected, 1);
    assert_eq!(memory.len(), 2);

    // m4 targeted the "hero" tag, created by m1 in an earlier stage
    let crossing = &memory["river-crossing"];
    assert!((crossing.trust_score() - 0.6).abs() < 1e-12);

    let meeting = &memory["shadow-meeting"];
    assert!(meeting.has_tag("shadow") && meeting.has_tag("threshold"));
    assert_eq!(meeting.content, "a shadow waited on the far bank");
}

#[test]
fn rerouted_tags_change_relevance() {
    let trace: SymbolicTrace = serde_json::from_str(TRACE_JSON).unwrap();
    let mut memory: BTreeMap<String, MemoryNode> = BTreeMap::new();
    run(&trace, &mut memory);

    let nodes: Vec<MemoryNode> = memory.values().cloned().collect();
    let results =
        RelevanceMatcher::find_relevant_memories("crossing a threshold", &nodes, &RelevanceConfig::default());

    assert_eq!(results[0].node.id, "shadow-meeting");
    assert!(results[0].score >= 0.3);
}

#[test]
fn drift_registers_a_mutation_cycle() {
    let trace: SymbolicTrace = serde_json::from_str(TRACE_JSON).unwrap();
    let mut memory: BTreeMap<String, MemoryNode> = BTreeMap::new();
    let before = MemorySnapshot::new(memory.values().cloned().collect());

    run(&trace, &mut memory);
    let after = MemorySnapshot::new(memory.values().cloned().collect());

    let drift = score_drift(&before, &after);
    assert_eq!(drift.component("membership").unwrap().score, 1.0);
    assert!(drift.overall_score > 0.0);
    assert_eq!(score_drift(&after, &after).overall_score, 0.0);
}
