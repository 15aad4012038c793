// tests/planner/tree_state_test.rs
mod common;

use common::oracle;
use ljqo::planner::join_optimizer::{
    ChildRef, Edge, JoinEvaluator, JoinGraph, TreeKind, TreeState,
};
use ljqo::planner::join_optimizer::tree_state::Elements;
use ljqo::planner::PlanError;
use proptest::prelude::*;

fn permutations(edges: &[Edge]) -> Vec<Vec<Edge>> {
    if edges.len() <= 1 {
        return vec![edges.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..edges.len() {
        let mut rest = edges.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            out.push(tail);
        }
    }
    out
}

#[test]
fn test_bushy_encoding_of_every_cycle_ordering() {
    let query = common::cycle4();
    let mut eval = JoinEvaluator::new(oracle(&query));
    let graph = JoinGraph::build(&mut eval).unwrap();
    let orderings = permutations(graph.edges());
    assert_eq!(orderings.len(), 24);

    for edges in orderings {
        let state = TreeState::encode_bushy(&edges, 4).unwrap();
        assert_eq!(state.len(), 3);
        assert_eq!(state.relations(), vec![0, 1, 2, 3]);

        let root = state.build(&mut eval).expect("cycle tree must build");
        assert_eq!(eval.relids(root).len(), 4);
    }
}

#[test]
fn test_root_is_last_and_covers_everything() {
    let query = common::chain(6);
    let mut eval = JoinEvaluator::new(oracle(&query));
    let graph = JoinGraph::build(&mut eval).unwrap();
    let state = TreeState::encode_bushy(graph.edges(), 6).unwrap();

    let root = state.root().unwrap();
    assert_eq!(root, ChildRef::Element(state.len() - 1));
    assert_eq!(
        state.relations_of(root).to_vec(),
        vec![0, 1, 2, 3, 4, 5]
    );
}

#[test]
fn test_left_deep_encoding_grows_one_spine() {
    let query = common::star(5);
    let mut eval = JoinEvaluator::new(oracle(&query));
    let graph = JoinGraph::build(&mut eval).unwrap();

    let mut edges = graph.edges().to_vec();
    edges.reverse();
    let state = TreeState::encode_left_deep(&edges, 5).unwrap();

    assert_eq!(state.kind(), TreeKind::LeftDeep);
    // Edges fact-dim4 .. fact-dim1: the spine starts with the first edge.
    assert_eq!(state.relations(), vec![0, 4, 3, 2, 1]);

    let root = state.build(&mut eval).unwrap();
    let plan = eval.extract_plan(root);
    assert!(plan.is_left_deep());
    assert_eq!(plan.relations(), vec![0, 4, 3, 2, 1]);
}

#[test]
fn test_left_deep_encoding_revisits_skipped_edges() {
    // (2,3) is useless until 2 is placed by (1,2).
    let edges = vec![Edge::new(0, 1), Edge::new(2, 3), Edge::new(1, 2)];
    let state = TreeState::encode_left_deep(&edges, 4).unwrap();
    assert_eq!(state.relations(), vec![0, 1, 2, 3]);
}

#[test]
fn test_disconnected_edges_are_rejected() {
    let edges = vec![Edge::new(0, 1), Edge::new(2, 3)];
    assert_eq!(
        TreeState::encode_bushy(&edges, 4).unwrap_err(),
        PlanError::DisconnectedGraph
    );
    assert_eq!(
        TreeState::encode_left_deep(&edges, 4).unwrap_err(),
        PlanError::DisconnectedGraph
    );
}

#[test]
fn test_decode_then_reencode_is_identical() {
    let query = common::chain(7);
    let mut eval = JoinEvaluator::new(oracle(&query));
    let graph = JoinGraph::build(&mut eval).unwrap();

    for kind in [TreeKind::Bushy, TreeKind::LeftDeep] {
        let state = TreeState::encode(kind, graph.edges(), 7).unwrap();
        let root = state.build(&mut eval).unwrap();
        let plan = eval.extract_plan(root);

        let again = TreeState::from_plan(&plan, kind);
        assert_eq!(again.elements(), state.elements());
    }
}

#[test]
fn test_illegal_tree_does_not_build() {
    let oracle = common::PairOracle::new(3, &[(0, 1), (1, 2)]).forbid(0, 2);
    let mut eval = JoinEvaluator::new(oracle);
    let state = TreeState::from_left_deep(vec![0, 1, 2]);
    assert!(state.build(&mut eval).is_none());
    assert!(state.cost().is_none());
}

#[test]
fn test_normalised_bushy_state_has_no_forward_references() {
    let query = common::cycle4();
    let mut eval = JoinEvaluator::new(oracle(&query));
    let graph = JoinGraph::build(&mut eval).unwrap();
    let mut state = TreeState::encode_bushy(graph.edges(), 4).unwrap();

    for idx in 0..state.len() {
        state.rotate_at(idx, &graph);
        let Elements::Bushy(elements) = state.elements() else {
            panic!("expected bushy state");
        };
        for (i, element) in elements.iter().enumerate() {
            for child in element.children {
                if let ChildRef::Element(j) = child {
                    assert!(j < i);
                }
            }
        }
        assert_eq!(state.relations(), vec![0, 1, 2, 3]);
    }
}

proptest! {
    #[test]
    fn prop_any_edge_order_encodes_every_relation_once(
        n in 3usize..12,
        keys in prop::collection::vec(any::<u32>(), 32),
        bushy in any::<bool>(),
    ) {
        let query = common::chain(n);
        let mut eval = JoinEvaluator::new(oracle(&query));
        let graph = JoinGraph::build(&mut eval).unwrap();

        let mut edges = graph.edges().to_vec();
        let mut order: Vec<(u32, Edge)> = edges.drain(..).zip(keys.iter().copied()).map(|(e, k)| (k, e)).collect();
        order.sort_by_key(|(k, _)| *k);
        let edges: Vec<Edge> = order.into_iter().map(|(_, e)| e).collect();

        let kind = if bushy { TreeKind::Bushy } else { TreeKind::LeftDeep };
        let state = TreeState::encode(kind, &edges, n).unwrap();
        let mut relations = state.relations();
        relations.sort_unstable();
        prop_assert_eq!(relations, (0..n).collect::<Vec<_>>());

        let root = state.build(&mut eval).unwrap();
        prop_assert_eq!(eval.relids(root).len(), n);
    }
}
