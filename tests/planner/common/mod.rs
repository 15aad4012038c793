// tests/planner/common/mod.rs
#![allow(dead_code)]

use ljqo::model::QueryGraph;
use ljqo::planner::join_optimizer::CardinalityOracle;
use ljqo::planner::{Cost, JoinInput, JoinOracle, JoinPlan, RelationId, RelationSet};
use ljqo::Settings;

pub fn seeded(seed: u64) -> Settings {
    Settings {
        seed: Some(seed),
        ..Settings::default()
    }
}

pub fn oracle(query: &QueryGraph) -> CardinalityOracle {
    CardinalityOracle::new(query).unwrap()
}

/// Relations of varied size joined in a line.
pub fn chain(n: usize) -> QueryGraph {
    let rows: Vec<f64> = (0..n).map(|i| 10.0 + ((i * 37) % 11) as f64 * 90.0).collect();
    QueryGraph::chain(&rows, 0.05)
}

/// One large fact relation joined with `n - 1` small dimensions.
pub fn star(n: usize) -> QueryGraph {
    let mut query = QueryGraph::new();
    query.add_relation("fact", 100_000.0);
    for i in 1..n {
        let name = format!("dim{}", i);
        query.add_relation(&name, 10.0 * i as f64);
        query.add_predicate("fact", &name, 1.0 / (10.0 * i as f64));
    }
    query
}

/// Four relations in a cycle `(0,1),(1,2),(2,3),(3,0)`.
pub fn cycle4() -> QueryGraph {
    let mut query = QueryGraph::chain(&[100.0, 200.0, 300.0, 400.0], 0.01);
    query.add_predicate("r3", "r0", 0.01);
    query
}

/// Every relation of a plan appears exactly once.
pub fn assert_complete<H>(plan: &JoinPlan<H>, n: usize) {
    let mut relations = plan.relations();
    relations.sort_unstable();
    assert_eq!(relations, (0..n).collect::<Vec<_>>(), "plan {}", plan);
    assert_eq!(plan.join_count(), n - 1);
}

/// Wraps an oracle and remembers every join request.
pub struct RecordingOracle<O> {
    pub inner: O,
    pub requests: Vec<(RelationSet, RelationSet)>,
}

impl<O> RecordingOracle<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            requests: Vec::new(),
        }
    }
}

impl<O: JoinOracle> JoinOracle for RecordingOracle<O> {
    type Handle = O::Handle;

    fn relation_count(&self) -> usize {
        self.inner.relation_count()
    }

    fn base_relation(&mut self, rel: RelationId) -> Self::Handle {
        self.inner.base_relation(rel)
    }

    fn try_join(
        &mut self,
        left: JoinInput<'_, Self::Handle>,
        right: JoinInput<'_, Self::Handle>,
    ) -> Option<Self::Handle> {
        self.requests.push((left.relids.clone(), right.relids.clone()));
        self.inner.try_join(left, right)
    }

    fn cheapest_cost(&self, handle: &Self::Handle) -> Cost {
        self.inner.cheapest_cost(handle)
    }

    fn has_join_predicate(&self, a: RelationId, b: RelationId) -> bool {
        self.inner.has_join_predicate(a, b)
    }

    fn has_ordering_restriction(&self, a: RelationId, b: RelationId) -> bool {
        self.inner.has_ordering_restriction(a, b)
    }
}

/// Unit-cost oracle with explicit predicates and a list of relation pairs
/// that may never meet across a join.
pub struct PairOracle {
    pub count: usize,
    pub predicates: Vec<(RelationId, RelationId)>,
    pub forbidden: Vec<(RelationId, RelationId)>,
    /// Refuse every join when set.
    pub refuse_all: bool,
}

impl PairOracle {
    pub fn new(count: usize, predicates: &[(RelationId, RelationId)]) -> Self {
        Self {
            count,
            predicates: predicates.to_vec(),
            forbidden: Vec::new(),
            refuse_all: false,
        }
    }

    pub fn forbid(mut self, a: RelationId, b: RelationId) -> Self {
        self.forbidden.push((a, b));
        self
    }

    fn crosses(pair: (RelationId, RelationId), left: &RelationSet, right: &RelationSet) -> bool {
        (left.contains(pair.0) && right.contains(pair.1)) || (left.contains(pair.1) && right.contains(pair.0))
    }
}

impl JoinOracle for PairOracle {
    /// Number of joins below this node.
    type Handle = f64;

    fn relation_count(&self) -> usize {
        self.count
    }

    fn base_relation(&mut self, _rel: RelationId) -> f64 {
        0.0
    }

    fn try_join(&mut self, left: JoinInput<'_, f64>, right: JoinInput<'_, f64>) -> Option<f64> {
        if self.refuse_all {
            return None;
        }
        if self
            .forbidden
            .iter()
            .any(|&pair| Self::crosses(pair, left.relids, right.relids))
        {
            return None;
        }
        Some(left.handle + right.handle + 1.0)
    }

    fn cheapest_cost(&self, handle: &f64) -> Cost {
        *handle
    }

    fn has_join_predicate(&self, a: RelationId, b: RelationId) -> bool {
        self.predicates
            .iter()
            .any(|&(x, y)| (x, y) == (a, b) || (x, y) == (b, a))
    }

    fn has_ordering_restriction(&self, _a: RelationId, _b: RelationId) -> bool {
        false
    }
}

/// Handle of [`ShapeOracle`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shape {
    pub cost: f64,
    pub is_join: bool,
    /// Some join at or below this node has two joined inputs.
    pub bushy: bool,
}

/// Path-graph oracle whose costs depend on the tree shape, not just the
/// joined set: a join of two joined inputs is cheap, but the root pays 1000
/// when any such join lies beneath it.
pub struct ShapeOracle {
    pub count: usize,
    /// Refuse every join once this many have been granted.
    pub grant_limit: Option<usize>,
    pub granted: usize,
}

impl ShapeOracle {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            grant_limit: None,
            granted: 0,
        }
    }

    pub fn grant_limit(mut self, limit: usize) -> Self {
        self.grant_limit = Some(limit);
        self
    }

    /// The predicates `(0,1), (1,2), ...` the oracle reports.
    pub fn path(&self) -> Vec<(RelationId, RelationId)> {
        (1..self.count).map(|i| (i - 1, i)).collect()
    }
}

impl JoinOracle for ShapeOracle {
    type Handle = Shape;

    fn relation_count(&self) -> usize {
        self.count
    }

    fn base_relation(&mut self, _rel: RelationId) -> Shape {
        Shape {
            cost: 0.0,
            is_join: false,
            bushy: false,
        }
    }

    fn try_join(&mut self, left: JoinInput<'_, Shape>, right: JoinInput<'_, Shape>) -> Option<Shape> {
        if self.grant_limit.is_some_and(|limit| self.granted >= limit) {
            return None;
        }
        self.granted += 1;

        let both_joined = left.handle.is_join && right.handle.is_join;
        let bushy = both_joined || left.handle.bushy || right.handle.bushy;
        let mut cost = left.handle.cost + right.handle.cost + if both_joined { 1.0 } else { 5.0 };
        if bushy && left.relids.len() + right.relids.len() == self.count {
            cost += 1000.0;
        }
        Some(Shape {
            cost,
            is_join: true,
            bushy,
        })
    }

    fn cheapest_cost(&self, handle: &Shape) -> Cost {
        handle.cost
    }

    fn has_join_predicate(&self, a: RelationId, b: RelationId) -> bool {
        a.abs_diff(b) == 1
    }

    fn has_ordering_restriction(&self, _a: RelationId, _b: RelationId) -> bool {
        false
    }
}
