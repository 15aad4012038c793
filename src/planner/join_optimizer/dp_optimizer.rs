// src/planner/join_optimizer/dp_optimizer.rs
use crate::planner::join_optimizer::arena::{JoinEvaluator, NodeId};
use crate::planner::join_optimizer::join_graph::JoinGraph;
use crate::planner::join_optimizer::SearchStats;
use crate::planner::oracle::JoinOracle;
use crate::planner::plan::JoinPlan;
use crate::planner::relation::{RelationId, RelationSet};
use crate::planner::{PlanError, PlanResult};
use std::collections::HashMap;
use tracing::debug;

/// Largest query the exhaustive search accepts.
pub const MAX_EXHAUSTIVE_RELATIONS: usize = 20;

/// Generate all subsets of given size from a list of relations.
pub fn generate_subsets(relations: &[RelationId], size: usize) -> Vec<RelationSet> {
    if size == 0 || size > relations.len() {
        return vec![];
    }

    let mut result = Vec::new();
    let mut current = RelationSet::new();
    generate_subsets_helper(relations, size, 0, &mut current, &mut result);
    result
}

fn generate_subsets_helper(
    relations: &[RelationId],
    size: usize,
    start: usize,
    current: &mut RelationSet,
    result: &mut Vec<RelationSet>,
) {
    if current.len() == size {
        result.push(current.clone());
        return;
    }

    for i in start..relations.len() {
        current.insert(relations[i]);
        generate_subsets_helper(relations, size, i + 1, current, result);
        current.remove(relations[i]);
    }
}

/// Enumerate all ways to split a relation set into two non-empty subsets.
///
/// Each unordered split appears once, with the lowest relation on the left.
pub fn enumerate_splits(subset: &RelationSet) -> Vec<(RelationSet, RelationSet)> {
    let relations = subset.to_vec();
    let Some((&lowest, rest)) = relations.split_first() else {
        return vec![];
    };

    let mut splits = Vec::new();
    for size in 0..rest.len() {
        let partners = if size == 0 {
            vec![RelationSet::new()]
        } else {
            generate_subsets(rest, size)
        };
        for mut left in partners {
            left.insert(lowest);
            let right = subset.difference(&left);
            splits.push((left, right));
        }
    }

    splits
}

/// Exhaustive dynamic programming over relation subsets.
///
/// Exact, and exponential in the number of relations: meant for queries
/// below the randomized threshold.
pub struct ExhaustiveOptimizer<O: JoinOracle> {
    eval: JoinEvaluator<O>,
    memo: HashMap<RelationSet, NodeId>,
}

impl<O: JoinOracle> ExhaustiveOptimizer<O> {
    pub fn new(oracle: O) -> Self {
        Self {
            eval: JoinEvaluator::new(oracle),
            memo: HashMap::new(),
        }
    }

    pub fn stats(&self) -> &SearchStats {
        self.eval.stats()
    }

    /// Main DP optimization entry point.
    pub fn optimize(&mut self) -> PlanResult<JoinPlan<O::Handle>> {
        let n = self.eval.relation_count();
        if n == 0 {
            return Err(PlanError::EmptyQuery);
        }
        if n > MAX_EXHAUSTIVE_RELATIONS {
            return Err(PlanError::TooManyRelations {
                count: n,
                limit: MAX_EXHAUSTIVE_RELATIONS,
            });
        }
        if n == 1 {
            return Ok(self.eval.extract_plan(self.eval.base(0)));
        }

        let graph = JoinGraph::build(&mut self.eval)?;

        self.eval.enter_scope();
        let outcome = self.run(&graph);
        self.eval.leave_scope();
        outcome
    }

    fn run(&mut self, graph: &JoinGraph) -> PlanResult<JoinPlan<O::Handle>> {
        let n = graph.relation_count();
        let relations: Vec<RelationId> = (0..n).collect();

        self.memo.clear();
        for &rel in &relations {
            self.memo.insert(RelationSet::single(rel), self.eval.base(rel));
        }

        for size in 2..=n {
            for subset in generate_subsets(&relations, size) {
                self.find_best_plan_for_subset(graph, &subset);
            }
        }

        let root = *self
            .memo
            .get(&RelationSet::full(n))
            .ok_or(PlanError::NoCompletePlan)?;
        let plan = self.eval.extract_plan(root);
        debug!(relations = n, cost = plan.cost, subsets = self.memo.len(), "exhaustive search finished");
        Ok(plan)
    }

    /// Find the best join for a subset by trying all partitions.
    ///
    /// Partitions connected by the join graph come first; cross products
    /// are only tried when none of them is legal.
    fn find_best_plan_for_subset(&mut self, graph: &JoinGraph, subset: &RelationSet) {
        let splits = enumerate_splits(subset);

        let connected = splits
            .iter()
            .filter(|(s1, s2)| graph.are_sets_joinable(s1, s2));
        let mut best = self.cheapest_split(connected);
        if best.is_none() {
            best = self.cheapest_split(splits.iter());
        }

        if let Some(node) = best {
            self.memo.insert(subset.clone(), node);
        }
    }

    fn cheapest_split<'s, I>(&mut self, splits: I) -> Option<NodeId>
    where
        I: Iterator<Item = &'s (RelationSet, RelationSet)>,
    {
        let mut best: Option<NodeId> = None;
        for (s1, s2) in splits {
            let (Some(&left), Some(&right)) = (self.memo.get(s1), self.memo.get(s2)) else {
                continue;
            };
            let Some(node) = self.eval.try_join(left, right) else {
                continue;
            };
            if best.map_or(true, |b| self.eval.cost(node) < self.eval.cost(b)) {
                best = Some(node);
            }
        }
        best
    }

    /// Helper for tests: check if memo contains a relation set.
    pub fn memo_contains(&self, set: &RelationSet) -> bool {
        self.memo.contains_key(set)
    }
}
