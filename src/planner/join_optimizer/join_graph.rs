// src/planner/join_optimizer/join_graph.rs
use crate::planner::join_optimizer::arena::JoinEvaluator;
use crate::planner::oracle::JoinOracle;
use crate::planner::relation::{RelationId, RelationSet};
use crate::planner::{PlanError, PlanResult};
use petgraph::unionfind::UnionFind;
use tracing::debug;

/// A candidate pairwise join between two base relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub a: RelationId,
    pub b: RelationId,
    pub relids: RelationSet,
}

impl Edge {
    pub fn new(a: RelationId, b: RelationId) -> Self {
        debug_assert_ne!(a, b, "self-join edge");
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        let mut relids = RelationSet::single(a);
        relids.insert(b);
        Self { a, b, relids }
    }
}

/// Query graph: the edge list plus a symmetric adjacency matrix.
#[derive(Debug, Clone)]
pub struct JoinGraph {
    edges: Vec<Edge>,
    adjacency: Vec<RelationSet>,
}

impl JoinGraph {
    /// Build the graph from the oracle's predicates and ordering
    /// restrictions.
    ///
    /// A relation left without any edge is attached to the first relation it
    /// can legally be joined with, which is usually a cross product.
    pub fn build<O: JoinOracle>(eval: &mut JoinEvaluator<O>) -> PlanResult<Self> {
        let n = eval.relation_count();
        let mut graph = Self::empty(n);

        for i in 0..n {
            for j in i + 1..n {
                if eval.has_join_predicate(i, j) || eval.has_ordering_restriction(i, j) {
                    graph.add_edge(i, j);
                }
            }
        }

        for i in 0..n {
            if !graph.adjacency[i].is_empty() {
                continue;
            }
            debug!(relation = i, "relation has no join predicate, forcing a cross product");
            let partner = (0..n).filter(|&j| j != i).find(|&j| eval.probe_join(i, j));
            match partner {
                Some(j) => graph.add_edge(i, j),
                None => return Err(PlanError::UngraphableQuery(i)),
            }
        }

        debug!(relations = n, edges = graph.edges.len(), "join graph built");
        Ok(graph)
    }

    /// Build a graph from explicit pairs.
    pub fn from_edges(relation_count: usize, pairs: &[(RelationId, RelationId)]) -> Self {
        let mut graph = Self::empty(relation_count);
        for &(a, b) in pairs {
            graph.add_edge(a, b);
        }
        graph
    }

    fn empty(relation_count: usize) -> Self {
        Self {
            edges: Vec::new(),
            adjacency: vec![RelationSet::new(); relation_count],
        }
    }

    fn add_edge(&mut self, a: RelationId, b: RelationId) {
        if self.are_joinable(a, b) {
            return;
        }
        self.adjacency[a].insert(b);
        self.adjacency[b].insert(a);
        self.edges.push(Edge::new(a, b));
    }

    /// Link every connected component into one by adding legal cross
    /// products between them.
    pub fn bridge_components<O: JoinOracle>(
        &mut self,
        eval: &mut JoinEvaluator<O>,
    ) -> PlanResult<()> {
        loop {
            let components = self.components();
            if components.len() <= 1 {
                return Ok(());
            }

            match Self::find_bridge(&components, eval) {
                Some((a, b)) => {
                    debug!(a, b, components = components.len(), "bridging join graph components");
                    self.add_edge(a, b);
                }
                None => return Err(PlanError::DisconnectedGraph),
            }
        }
    }

    fn find_bridge<O: JoinOracle>(
        components: &[RelationSet],
        eval: &mut JoinEvaluator<O>,
    ) -> Option<(RelationId, RelationId)> {
        for (ci, left) in components.iter().enumerate() {
            for right in &components[ci + 1..] {
                for a in left.iter() {
                    for b in right.iter() {
                        if eval.probe_join(a, b) {
                            return Some((a, b));
                        }
                    }
                }
            }
        }
        None
    }

    pub fn relation_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn are_joinable(&self, a: RelationId, b: RelationId) -> bool {
        self.adjacency[a].contains(b)
    }

    pub fn neighbours(&self, rel: RelationId) -> &RelationSet {
        &self.adjacency[rel]
    }

    /// True when any relation of `s1` has an edge to any relation of `s2`.
    pub fn are_sets_joinable(&self, s1: &RelationSet, s2: &RelationSet) -> bool {
        s1.iter().any(|rel| self.adjacency[rel].intersects(s2))
    }

    /// Connected components, each as a relation set, ordered by their
    /// smallest member.
    pub fn components(&self) -> Vec<RelationSet> {
        let n = self.relation_count();
        let mut forest = UnionFind::<usize>::new(n);
        for edge in &self.edges {
            forest.union(edge.a, edge.b);
        }

        let mut by_root: Vec<Option<usize>> = vec![None; n];
        let mut components: Vec<RelationSet> = Vec::new();
        for rel in 0..n {
            let root = forest.find(rel);
            let slot = *by_root[root].get_or_insert_with(|| {
                components.push(RelationSet::new());
                components.len() - 1
            });
            components[slot].insert(rel);
        }
        components
    }

    pub fn is_connected(&self) -> bool {
        self.components().len() <= 1
    }
}
