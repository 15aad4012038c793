// tests/planner/sdp_test.rs
mod common;

use common::{assert_complete, oracle, seeded, PairOracle, RecordingOracle, ShapeOracle};
use insta::assert_snapshot;
use ljqo::model::QueryGraph;
use ljqo::planner::join_optimizer::sdp::Sample;
use ljqo::planner::join_optimizer::{
    sample_dp_optimize, CardinalityOracle, JoinEvaluator, JoinGraph, NodeId, SampleDpOptimizer,
};
use ljqo::planner::{CostTrace, PlanError, RelationId};

/// Every binary tree over `order` with the leaves kept in sequence.
fn all_groupings(eval: &mut JoinEvaluator<CardinalityOracle>, order: &[RelationId]) -> Vec<NodeId> {
    if order.len() == 1 {
        return vec![eval.base(order[0])];
    }
    let mut out = Vec::new();
    for split in 1..order.len() {
        let lefts = all_groupings(eval, &order[..split]);
        let rights = all_groupings(eval, &order[split..]);
        for &left in &lefts {
            for &right in &rights {
                if let Some(node) = eval.try_join(left, right) {
                    out.push(node);
                }
            }
        }
    }
    out
}

#[test]
fn test_two_relations_join_directly() {
    let query = QueryGraph::chain(&[100.0, 10.0], 0.1);
    let mut optimizer = SampleDpOptimizer::new(oracle(&query), &seeded(1));
    let plan = optimizer.optimize().unwrap();

    assert_snapshot!(plan.to_string(), @"(0 ⋈ 1)");
    assert_eq!(optimizer.stats().samples, 0);
}

#[test]
fn test_plans_are_complete() {
    for n in [3, 6, 13] {
        let plan = sample_dp_optimize(oracle(&common::chain(n)), &seeded(2)).unwrap();
        assert_complete(&plan, n);

        let plan = sample_dp_optimize(oracle(&common::star(n)), &seeded(2)).unwrap();
        assert_complete(&plan, n);
    }
}

#[test]
fn test_isolated_relation_is_cross_joined() {
    let mut query = common::star(6);
    query.add_relation("lonely", 2.0);

    let plan = sample_dp_optimize(oracle(&query), &seeded(3)).unwrap();
    assert_complete(&plan, 7);
}

#[test]
fn test_same_seed_same_plan() {
    let query = common::chain(15);
    let first = sample_dp_optimize(oracle(&query), &seeded(42)).unwrap();
    let second = sample_dp_optimize(oracle(&query), &seeded(42)).unwrap();

    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(first.cost, second.cost);
}

#[test]
fn test_sample_costs_strictly_decrease() {
    let mut trace = CostTrace::new();
    let mut settings = seeded(6);
    settings.sdp.min_iterations = 30;

    let mut optimizer =
        SampleDpOptimizer::new(oracle(&common::star(10)), &settings).with_observer(&mut trace);
    let plan = optimizer.optimize().unwrap();
    assert_eq!(optimizer.stats().samples, 30);
    drop(optimizer);

    assert!(!trace.samples.is_empty());
    assert!(trace.samples.windows(2).all(|w| w[1] < w[0]));
    // The DP phase never does worse than the best sample.
    assert!(plan.cost <= *trace.samples.last().unwrap());
}

#[test]
fn test_refused_joins_give_no_sample() {
    let mut oracle = PairOracle::new(3, &[(0, 1), (1, 2), (2, 0)]);
    oracle.refuse_all = true;

    let mut optimizer = SampleDpOptimizer::new(oracle, &seeded(1));
    assert_eq!(optimizer.optimize().unwrap_err(), PlanError::NoValidSample);
    assert_eq!(optimizer.stats().failed_samples, optimizer.stats().samples);
}

#[test]
fn test_dp_phase_finds_cheapest_grouping_of_order() {
    let query = QueryGraph::chain(&[5000.0, 20.0, 3000.0, 15.0], 0.02);
    let order = [0, 1, 2, 3];

    let mut eval = JoinEvaluator::new(oracle(&query));
    let candidates = all_groupings(&mut eval, &order);
    assert_eq!(candidates.len(), 5);
    let cheapest = candidates
        .iter()
        .map(|&node| eval.cost(node))
        .fold(f64::INFINITY, f64::min);

    let mut optimizer = SampleDpOptimizer::new(oracle(&query), &seeded(1));
    let root = optimizer.dp_phase(&order).unwrap();
    let plan = optimizer.evaluator().extract_plan(root);

    assert_eq!(plan.relations(), order.to_vec());
    assert_eq!(plan.cost, cheapest);
}

#[test]
fn test_dp_phase_skips_illegal_groupings() {
    // {0,2} may never be joined without 1 in between.
    let oracle = PairOracle::new(3, &[(0, 1), (1, 2)]).forbid(0, 2);
    let mut optimizer = SampleDpOptimizer::new(oracle, &seeded(1));
    let root = optimizer.dp_phase(&[0, 2, 1]);
    assert_eq!(root.unwrap_err(), PlanError::NoCompletePlan);
}

#[test]
fn test_ordering_restrictions_are_honoured() {
    let mut query = common::chain(8);
    query.add_restriction("r7", &["r0", "r1"]);
    let cardinality = oracle(&query);

    let plan = sample_dp_optimize(cardinality.clone(), &seeded(9)).unwrap();
    assert_complete(&plan, 8);
    plan.for_each_join(&mut |left, right| {
        assert!(cardinality.is_legal(&left.relids.union(&right.relids)));
    });
}

#[test]
fn test_joins_only_disjoint_inputs() {
    let mut recording = RecordingOracle::new(oracle(&common::star(9)));
    {
        let mut optimizer = SampleDpOptimizer::new(&mut recording, &seeded(21));
        let plan = optimizer.optimize().unwrap();
        assert_complete(&plan, 9);
    }

    assert!(!recording.requests.is_empty());
    for (left, right) in &recording.requests {
        assert!(!left.intersects(right), "{} overlaps {}", left, right);
    }
}

#[test]
fn test_sampled_chain_beats_dp_grouping() {
    let mut trace = CostTrace::new();
    let mut optimizer =
        SampleDpOptimizer::new(ShapeOracle::new(6), &seeded(5)).with_observer(&mut trace);
    let plan = optimizer.optimize().unwrap();
    drop(optimizer);

    // Every sample is a left-deep chain of five joins at 5 each.
    assert_eq!(trace.samples, vec![25.0]);
    assert_complete(&plan, 6);
    assert!(plan.is_left_deep());
    assert_eq!(plan.cost, 25.0);

    // Replay both phases with the same seed to see what the DP alone picks.
    let shape = ShapeOracle::new(6);
    let graph = JoinGraph::from_edges(6, &shape.path());
    let mut optimizer = SampleDpOptimizer::new(shape, &seeded(5));
    let sample = optimizer.sample_phase(&graph).unwrap();
    assert_eq!(sample.cost, plan.cost);
    assert_eq!(plan.relations(), sample.order);

    let dp_root = optimizer.dp_phase(&sample.order).unwrap();
    let dp_plan = optimizer.evaluator().extract_plan(dp_root);
    assert!(!dp_plan.is_left_deep());
    assert!(plan.cost < dp_plan.cost);
}

#[test]
fn test_dp_grouping_kept_when_sample_cannot_be_rebuilt() {
    // Six samples of five joins, then 35 for the DP over six relations;
    // rebuilding the sampled order is refused.
    let shape = ShapeOracle::new(6).grant_limit(6 * 5 + 35);
    let mut trace = CostTrace::new();
    let mut optimizer = SampleDpOptimizer::new(shape, &seeded(5)).with_observer(&mut trace);
    let plan = optimizer.optimize().unwrap();
    let refused = optimizer.stats().joins_refused;
    drop(optimizer);

    assert_eq!(trace.samples, vec![25.0]);
    assert!(refused > 0);
    assert_complete(&plan, 6);
    assert!(!plan.is_left_deep());
    assert!(plan.cost > 1000.0);
}

#[test]
fn test_dp_grouping_kept_when_rebuild_is_no_cheaper() {
    let query = QueryGraph::chain(&[5000.0, 20.0, 3000.0, 15.0], 0.02);
    let mut optimizer = SampleDpOptimizer::new(oracle(&query), &seeded(1));
    let order = vec![0, 1, 2, 3];
    let dp_root = optimizer.dp_phase(&order).unwrap();

    // The left-deep rebuild of this order costs at least the DP result.
    let sample = Sample { order, cost: 0.0 };
    assert_eq!(optimizer.reconcile(&sample, dp_root), dp_root);
}

#[test]
fn test_invalid_settings_are_rejected() {
    let mut settings = seeded(1);
    settings.sdp.min_iterations = 50;
    settings.sdp.max_iterations = 20;

    let mut optimizer = SampleDpOptimizer::new(oracle(&common::chain(6)), &settings);
    assert!(matches!(optimizer.optimize(), Err(PlanError::InvalidSettings(_))));
    assert_eq!(optimizer.stats().samples, 0);
}
