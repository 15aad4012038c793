//! Sampling + dynamic programming.
//!
//! The sampling phase draws random join chains over the query graph and
//! keeps the relation order of the cheapest complete one. The DP phase then
//! finds the best parenthesisation of that fixed order.

use crate::config::{SampleDpSettings, Settings};
use crate::planner::join_optimizer::arena::{JoinEvaluator, NodeId};
use crate::planner::join_optimizer::join_graph::{Edge, JoinGraph};
use crate::planner::join_optimizer::SearchStats;
use crate::planner::observer::{NoopObserver, OptimizerObserver};
use crate::planner::oracle::{Cost, JoinOracle};
use crate::planner::plan::JoinPlan;
use crate::planner::relation::RelationId;
use crate::planner::{seeded_rng, PlanError, PlanResult};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, trace, warn};

/// Relation order and cost of the cheapest complete sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub order: Vec<RelationId>,
    pub cost: Cost,
}

/// A join chain under construction: relations in join order plus the node
/// joining all of them.
struct Chain {
    order: Vec<RelationId>,
    node: NodeId,
}

pub struct SampleDpOptimizer<O: JoinOracle, R: Rng = StdRng, B: OptimizerObserver = NoopObserver> {
    eval: JoinEvaluator<O>,
    settings: SampleDpSettings,
    rng: R,
    observer: B,
}

impl<O: JoinOracle> SampleDpOptimizer<O> {
    pub fn new(oracle: O, settings: &Settings) -> Self {
        Self {
            eval: JoinEvaluator::new(oracle),
            settings: settings.sdp.clone(),
            rng: seeded_rng(settings.seed),
            observer: NoopObserver,
        }
    }
}

impl<O: JoinOracle, R: Rng, B: OptimizerObserver> SampleDpOptimizer<O, R, B> {
    pub fn with_rng<R2: Rng>(self, rng: R2) -> SampleDpOptimizer<O, R2, B> {
        SampleDpOptimizer {
            eval: self.eval,
            settings: self.settings,
            rng,
            observer: self.observer,
        }
    }

    pub fn with_observer<B2: OptimizerObserver>(self, observer: B2) -> SampleDpOptimizer<O, R, B2> {
        SampleDpOptimizer {
            eval: self.eval,
            settings: self.settings,
            rng: self.rng,
            observer,
        }
    }

    pub fn stats(&self) -> &SearchStats {
        self.eval.stats()
    }

    pub fn observer(&self) -> &B {
        &self.observer
    }

    pub fn evaluator(&self) -> &JoinEvaluator<O> {
        &self.eval
    }

    /// Number of samples drawn for `relation_count` relations.
    pub fn iterations(&self, relation_count: usize) -> usize {
        let wanted = relation_count * self.settings.iteration_factor + self.settings.iteration_offset;
        wanted.clamp(self.settings.min_iterations, self.settings.max_iterations)
    }

    pub fn optimize(&mut self) -> PlanResult<JoinPlan<O::Handle>> {
        self.settings.validate()?;
        let n = self.eval.relation_count();
        match n {
            0 => return Err(PlanError::EmptyQuery),
            1 => return Ok(self.eval.extract_plan(self.eval.base(0))),
            2 => {
                let root = self
                    .eval
                    .try_join(self.eval.base(0), self.eval.base(1))
                    .ok_or(PlanError::NoCompletePlan)?;
                return Ok(self.eval.extract_plan(root));
            }
            _ => {}
        }

        let graph = JoinGraph::build(&mut self.eval)?;

        self.eval.enter_scope();
        let outcome = self.run(&graph);
        self.eval.leave_scope();
        outcome
    }

    fn run(&mut self, graph: &JoinGraph) -> PlanResult<JoinPlan<O::Handle>> {
        let sample = self.sample_phase(graph)?;

        self.eval.reset_scope();
        let dp_root = self.dp_phase(&sample.order)?;
        let root = self.reconcile(&sample, dp_root);

        let plan = self.eval.extract_plan(root);
        debug!(
            relations = graph.relation_count(),
            sample_cost = sample.cost,
            cost = plan.cost,
            "sample-dp search finished"
        );
        Ok(plan)
    }

    /// Draw samples and keep the cheapest complete one.
    pub fn sample_phase(&mut self, graph: &JoinGraph) -> PlanResult<Sample> {
        let n = graph.relation_count();
        let iterations = self.iterations(n);
        let mut edges: Vec<Edge> = Vec::with_capacity(graph.edge_count());
        let mut best: Option<Sample> = None;

        for _ in 0..iterations {
            self.eval.reset_scope();
            self.eval.stats.samples += 1;

            edges.clear();
            edges.extend_from_slice(graph.edges());
            let mut chains = self.sample_chains(&mut edges, n);

            let complete = chains.len() == 1 && self.eval.relids(chains[0].node).len() == n;
            if !complete {
                self.eval.stats.failed_samples += 1;
                trace!(chains = chains.len(), "incomplete sample");
                continue;
            }
            let Some(chain) = chains.pop() else {
                continue;
            };

            let cost = self.eval.cost(chain.node);
            trace!(cost, "sample drawn");
            if best.as_ref().map_or(true, |b| cost < b.cost) {
                self.observer.on_sample_cost(cost);
                best = Some(Sample {
                    order: chain.order,
                    cost,
                });
            }
        }

        let best = best.ok_or(PlanError::NoValidSample)?;
        debug!(cost = best.cost, iterations, "sampling finished");
        Ok(best)
    }

    /// Grow one chain from `edges`, recurse on whatever stays disjoint from
    /// it, then merge every chain that the oracle lets us join.
    ///
    /// `edges[..consumed]` are edges already used or discarded; the live
    /// region behind it is reordered lazily by random draws.
    fn sample_chains(&mut self, edges: &mut [Edge], n: usize) -> Vec<Chain> {
        let live = edges.len();
        let mut consumed = 0;
        let mut chain: Option<Chain> = None;

        while consumed < live {
            let Some(current) = chain.as_mut() else {
                let pick = self.rng.random_range(consumed..live);
                edges.swap(consumed, pick);
                let seed = &edges[consumed];
                consumed += 1;
                let (a, b) = (seed.a, seed.b);
                if let Some(node) = self.eval.try_join(self.eval.base(a), self.eval.base(b)) {
                    chain = Some(Chain {
                        order: vec![a, b],
                        node,
                    });
                }
                continue;
            };

            let mut scan = consumed;
            let mut extended = false;
            while scan < live {
                let pick = self.rng.random_range(scan..live);
                edges.swap(scan, pick);

                let relids = self.eval.relids(current.node);
                let edge = &edges[scan];
                let rel = match (relids.contains(edge.a), relids.contains(edge.b)) {
                    (false, false) => {
                        scan += 1;
                        continue;
                    }
                    (true, true) => None,
                    (true, false) => Some(edge.b),
                    (false, true) => Some(edge.a),
                };

                edges.swap(consumed, scan);
                consumed += 1;
                scan += 1;

                let Some(rel) = rel else {
                    continue;
                };
                if let Some(node) = self.eval.try_join(current.node, self.eval.base(rel)) {
                    current.order.push(rel);
                    current.node = node;
                    extended = true;
                    break;
                }
            }

            if self.eval.relids(current.node).len() == n {
                consumed = live;
            } else if !extended {
                break;
            }
        }

        let mut chains: Vec<Chain> = chain.into_iter().collect();
        if consumed < live {
            let rest = self.sample_chains(&mut edges[consumed..live], n);
            chains.extend(rest);
        }
        self.merge_chains(&mut chains);
        chains
    }

    /// Join chains pairwise until a full pass merges nothing.
    fn merge_chains(&mut self, chains: &mut Vec<Chain>) {
        loop {
            let mut merged = false;
            let mut x = 0;
            while x < chains.len() {
                let mut y = x + 1;
                while y < chains.len() {
                    match self.eval.try_join(chains[x].node, chains[y].node) {
                        Some(node) => {
                            let other = chains.remove(y);
                            chains[x].order.extend(other.order);
                            chains[x].node = node;
                            merged = true;
                        }
                        None => y += 1,
                    }
                }
                x += 1;
            }
            if !merged {
                return;
            }
        }
    }

    /// Cheapest parenthesisation of `order`.
    ///
    /// `matrix[level][p]` holds the best join of `order[p..=p + level]`.
    pub fn dp_phase(&mut self, order: &[RelationId]) -> PlanResult<NodeId> {
        let n = order.len();
        if n == 0 {
            return Err(PlanError::EmptyQuery);
        }

        let mut matrix: Vec<Vec<Option<NodeId>>> =
            (0..n).map(|level| vec![None; n - level]).collect();
        for (p, &rel) in order.iter().enumerate() {
            matrix[0][p] = Some(self.eval.base(rel));
        }

        for level in 1..n {
            for p in 0..n - level {
                let mut best: Option<NodeId> = None;
                for i in 0..level {
                    let (Some(left), Some(right)) = (matrix[i][p], matrix[level - i - 1][p + i + 1])
                    else {
                        continue;
                    };
                    let Some(node) = self.eval.try_join(left, right) else {
                        continue;
                    };
                    if best.map_or(true, |b| self.eval.cost(node) < self.eval.cost(b)) {
                        best = Some(node);
                    }
                }
                matrix[level][p] = best;
            }
        }

        matrix[n - 1][0].ok_or(PlanError::NoCompletePlan)
    }

    /// Fall back to the sampled grouping when it beat the DP result.
    ///
    /// Only an oracle whose costs depend on more than the joined set can
    /// make this happen. The sampled order is rebuilt by joining the first
    /// joinable adjacent pair until one node is left.
    pub fn reconcile(&mut self, sample: &Sample, dp_root: NodeId) -> NodeId {
        let dp_cost = self.eval.cost(dp_root);
        if sample.cost >= dp_cost {
            return dp_root;
        }

        let mut nodes: Vec<NodeId> = sample.order.iter().map(|&rel| self.eval.base(rel)).collect();
        while nodes.len() > 1 {
            let joined = (0..nodes.len() - 1)
                .find_map(|k| self.eval.try_join(nodes[k], nodes[k + 1]).map(|node| (k, node)));
            let Some((k, node)) = joined else {
                break;
            };
            nodes[k] = node;
            nodes.remove(k + 1);
        }

        match nodes.as_slice() {
            [root] if self.eval.cost(*root) < dp_cost => *root,
            _ => {
                warn!(
                    sample_cost = sample.cost,
                    dp_cost, "sampled order beat the DP phase but could not be rebuilt"
                );
                dp_root
            }
        }
    }
}

/// Run a sampling + DP search with the settings' seed and no observer.
pub fn sample_dp_optimize<O: JoinOracle>(oracle: O, settings: &Settings) -> PlanResult<JoinPlan<O::Handle>> {
    SampleDpOptimizer::new(oracle, settings).optimize()
}
