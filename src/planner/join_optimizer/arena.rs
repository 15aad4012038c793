//! Trial arena and the memoising join evaluator built on top of it.
//!
//! Base relations occupy a permanent prefix of the arena. Everything an
//! optimizer explores is allocated behind a scope mark and discarded in bulk
//! by truncating back to it, together with the pair cache that indexes it.

use crate::planner::join_optimizer::SearchStats;
use crate::planner::oracle::{Cost, JoinInput, JoinOracle};
use crate::planner::plan::JoinPlan;
use crate::planner::relation::{RelationId, RelationSet};
use std::collections::HashMap;
use std::mem;

/// Index of a node in the trial arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A base relation or a materialized join of two earlier nodes.
#[derive(Debug, Clone)]
pub struct JoinNode<H> {
    pub relids: RelationSet,
    pub cost: Cost,
    pub handle: H,
    pub children: Option<(NodeId, NodeId)>,
}

struct TrialArena<H> {
    nodes: Vec<JoinNode<H>>,
    scope_start: Option<usize>,
    scope_bytes: usize,
    cache: HashMap<(NodeId, NodeId), NodeId>,
}

impl<H> TrialArena<H> {
    fn push(&mut self, node: JoinNode<H>) -> NodeId {
        if self.scope_start.is_some() {
            self.scope_bytes += mem::size_of::<JoinNode<H>>() + node.relids.heap_bytes();
        }
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn rewind(&mut self, len: usize) {
        self.nodes.truncate(len);
        self.cache.clear();
    }
}

/// Wraps a [`JoinOracle`] and allocates every join it grants in the arena.
pub struct JoinEvaluator<O: JoinOracle> {
    oracle: O,
    arena: TrialArena<O::Handle>,
    relation_count: usize,
    caching: bool,
    pub(crate) stats: SearchStats,
}

impl<O: JoinOracle> JoinEvaluator<O> {
    pub fn new(mut oracle: O) -> Self {
        let relation_count = oracle.relation_count();
        let mut nodes = Vec::with_capacity(relation_count * 4);
        for rel in 0..relation_count {
            let handle = oracle.base_relation(rel);
            nodes.push(JoinNode {
                relids: RelationSet::single(rel),
                cost: oracle.cheapest_cost(&handle),
                handle,
                children: None,
            });
        }

        Self {
            oracle,
            arena: TrialArena {
                nodes,
                scope_start: None,
                scope_bytes: 0,
                cache: HashMap::new(),
            },
            relation_count,
            caching: false,
            stats: SearchStats::default(),
        }
    }

    /// Reuse joins of identical node pairs until the next reset.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.caching = enabled;
        self
    }

    pub fn relation_count(&self) -> usize {
        self.relation_count
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Node of base relation `rel`.
    pub fn base(&self, rel: RelationId) -> NodeId {
        debug_assert!(rel < self.relation_count);
        NodeId(rel)
    }

    pub fn node(&self, id: NodeId) -> &JoinNode<O::Handle> {
        &self.arena.nodes[id.0]
    }

    pub fn relids(&self, id: NodeId) -> &RelationSet {
        &self.arena.nodes[id.0].relids
    }

    pub fn cost(&self, id: NodeId) -> Cost {
        self.arena.nodes[id.0].cost
    }

    /// Join two nodes with disjoint relation sets.
    ///
    /// Returns `None` when the oracle refuses the join.
    pub fn try_join(&mut self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let key = if a <= b { (a, b) } else { (b, a) };
        if self.caching {
            if let Some(&hit) = self.arena.cache.get(&key) {
                self.stats.joins_reused += 1;
                return Some(hit);
            }
        }

        let left = &self.arena.nodes[a.0];
        let right = &self.arena.nodes[b.0];
        assert!(
            !left.relids.intersects(&right.relids),
            "join operands overlap: {} and {}",
            left.relids,
            right.relids
        );

        let joined = self.oracle.try_join(
            JoinInput {
                relids: &left.relids,
                handle: &left.handle,
            },
            JoinInput {
                relids: &right.relids,
                handle: &right.handle,
            },
        );
        let Some(handle) = joined else {
            self.stats.joins_refused += 1;
            return None;
        };
        let relids = left.relids.union(&right.relids);
        let cost = self.oracle.cheapest_cost(&handle);

        self.stats.joins_created += 1;
        let id = self.arena.push(JoinNode {
            relids,
            cost,
            handle,
            children: Some((a, b)),
        });
        if self.caching {
            self.arena.cache.insert(key, id);
        }
        Some(id)
    }

    /// Ask whether two base relations may be joined, leaving no trace.
    pub fn probe_join(&mut self, a: RelationId, b: RelationId) -> bool {
        let mark = self.arena.nodes.len();
        let bytes = self.arena.scope_bytes;
        let legal = self.try_join(self.base(a), self.base(b)).is_some();
        self.arena.rewind(mark);
        self.arena.scope_bytes = bytes;
        legal
    }

    pub fn has_join_predicate(&self, a: RelationId, b: RelationId) -> bool {
        self.oracle.has_join_predicate(a, b)
    }

    pub fn has_ordering_restriction(&self, a: RelationId, b: RelationId) -> bool {
        self.oracle.has_ordering_restriction(a, b)
    }

    /// Start allocating trial joins behind a scope mark.
    pub fn enter_scope(&mut self) {
        debug_assert!(self.arena.scope_start.is_none(), "trial scope already open");
        self.arena.scope_start = Some(self.arena.nodes.len());
        self.arena.scope_bytes = 0;
    }

    /// Discard every node allocated since the scope was entered.
    pub fn reset_scope(&mut self) {
        if let Some(start) = self.arena.scope_start {
            self.arena.rewind(start);
            self.arena.scope_bytes = 0;
            self.stats.arena_resets += 1;
        }
    }

    /// Discard the trial scope; later joins are kept until the evaluator is
    /// dropped.
    pub fn leave_scope(&mut self) {
        self.reset_scope();
        self.arena.scope_start = None;
    }

    /// Estimated bytes held by the trial scope.
    pub fn scope_bytes(&self) -> usize {
        self.arena.scope_bytes
    }

    pub fn node_count(&self) -> usize {
        self.arena.nodes.len()
    }

    /// Copy the tree rooted at `id` out of the arena.
    pub fn extract_plan(&self, id: NodeId) -> JoinPlan<O::Handle> {
        let node = self.node(id);
        match node.children {
            None => JoinPlan {
                relids: node.relids.clone(),
                cost: node.cost,
                handle: node.handle.clone(),
                children: None,
            },
            Some((left, right)) => JoinPlan {
                relids: node.relids.clone(),
                cost: node.cost,
                handle: node.handle.clone(),
                children: Some(Box::new((self.extract_plan(left), self.extract_plan(right)))),
            },
        }
    }
}
