//! Two-phase optimization: Iterative Improvement, then Simulated Annealing.
//!
//! Both phases walk the space of [`TreeState`]s. A state is only ever
//! compared by the cost of its last successful build; states that cannot be
//! built are discarded on the spot.

use crate::config::{Settings, TwoPhaseSettings};
use crate::planner::join_optimizer::arena::JoinEvaluator;
use crate::planner::join_optimizer::join_graph::{Edge, JoinGraph};
use crate::planner::join_optimizer::tree_state::{TreeKind, TreeState};
use crate::planner::join_optimizer::SearchStats;
use crate::planner::observer::{NoopObserver, OptimizerObserver};
use crate::planner::oracle::{Cost, JoinOracle};
use crate::planner::plan::JoinPlan;
use crate::planner::{seeded_rng, PlanError, PlanResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, trace};

/// Stages without a new best before a cold annealing run counts as frozen.
const FROZEN_STAGES: usize = 5;

pub struct TwoPhaseOptimizer<O: JoinOracle, R: Rng = StdRng, B: OptimizerObserver = NoopObserver> {
    eval: JoinEvaluator<O>,
    settings: TwoPhaseSettings,
    rng: R,
    observer: B,
}

impl<O: JoinOracle> TwoPhaseOptimizer<O> {
    pub fn new(oracle: O, settings: &Settings) -> Self {
        let eval = JoinEvaluator::new(oracle).with_cache(settings.twopo.cache_plans);
        Self {
            eval,
            settings: settings.twopo.clone(),
            rng: seeded_rng(settings.seed),
            observer: NoopObserver,
        }
    }
}

impl<O: JoinOracle, R: Rng, B: OptimizerObserver> TwoPhaseOptimizer<O, R, B> {
    /// Replace the random source.
    pub fn with_rng<R2: Rng>(self, rng: R2) -> TwoPhaseOptimizer<O, R2, B> {
        TwoPhaseOptimizer {
            eval: self.eval,
            settings: self.settings,
            rng,
            observer: self.observer,
        }
    }

    pub fn with_observer<B2: OptimizerObserver>(self, observer: B2) -> TwoPhaseOptimizer<O, R, B2> {
        TwoPhaseOptimizer {
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

    /// Search for the cheapest join tree over every relation of the oracle.
    pub fn optimize(&mut self) -> PlanResult<JoinPlan<O::Handle>> {
        // A reduction factor of 1 or more never cools down.
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

        let mut graph = JoinGraph::build(&mut self.eval)?;
        graph.bridge_components(&mut self.eval)?;
        let kind = if self.settings.bushy_space {
            TreeKind::Bushy
        } else {
            TreeKind::LeftDeep
        };

        self.eval.enter_scope();
        let outcome = self.search(&graph, kind);
        self.eval.leave_scope();
        let best = outcome?;

        // The trial scope is gone; this build survives with the evaluator.
        let root = best.build(&mut self.eval).ok_or(PlanError::NoValidState)?;
        let plan = self.eval.extract_plan(root);
        debug!(
            relations = n,
            cost = plan.cost,
            states = self.eval.stats().states_built,
            "two-phase search finished"
        );
        Ok(plan)
    }

    fn search(&mut self, graph: &JoinGraph, kind: TreeKind) -> PlanResult<TreeState> {
        let best = self.ii_phase(graph, kind)?;
        if !self.settings.sa_phase {
            return Ok(best);
        }
        Ok(self.sa_phase(graph, best))
    }

    fn ii_phase(&mut self, graph: &JoinGraph, kind: TreeKind) -> PlanResult<TreeState> {
        let mut best: Option<TreeState> = None;

        for iteration in 0..self.settings.ii_stop {
            let Some(start) = self.initial_state(graph, kind, iteration) else {
                debug!(iteration, "no legal initial state");
                continue;
            };
            let candidate = if self.settings.ii_improve_states {
                self.improve(graph, start)
            } else {
                start
            };

            if best.as_ref().map_or(true, |b| cost_of(&candidate) < cost_of(b)) {
                self.observer.on_convergence(cost_of(&candidate));
                best = Some(candidate);
            }
        }

        let best = best.ok_or(PlanError::NoValidState)?;
        debug!(cost = cost_of(&best), "iterative improvement finished");
        Ok(best)
    }

    /// Descend until `state.len()` consecutive neighbours fail to improve.
    fn improve(&mut self, graph: &JoinGraph, mut state: TreeState) -> TreeState {
        let local_minimum = state.len();
        let mut misses = 0;
        while misses < local_minimum {
            match self.downhill_neighbour(graph, &state) {
                Some(next) => {
                    trace!(from = cost_of(&state), to = cost_of(&next), "downhill move");
                    state = next;
                    misses = 0;
                }
                None => misses += 1,
            }
        }
        state
    }

    /// A random neighbour strictly cheaper than `state`.
    fn downhill_neighbour(&mut self, graph: &JoinGraph, state: &TreeState) -> Option<TreeState> {
        self.neighbour(graph, state)
            .filter(|next| cost_of(next) < cost_of(state))
    }

    fn sa_phase(&mut self, graph: &JoinGraph, start: TreeState) -> TreeState {
        let mut best = start.clone();
        let mut current = start;
        let mut temperature = self.settings.sa_initial_temperature * cost_of(&best);
        let equilibrium = self.settings.sa_equilibrium * graph.relation_count();
        let mut stale_stages = 0;

        while temperature >= 1.0 || stale_stages < FROZEN_STAGES {
            let mut improved = false;
            for _ in 0..equilibrium {
                let Some(next) = self.neighbour(graph, &current) else {
                    continue;
                };
                let delta = cost_of(&next) - cost_of(&current);
                if delta > 0.0 {
                    if !self.accept_uphill(delta, temperature) {
                        continue;
                    }
                    self.eval.stats.uphill_moves += 1;
                }
                current = next;

                if cost_of(&current) < cost_of(&best) {
                    best = current.clone();
                    improved = true;
                    self.observer.on_convergence(cost_of(&best));
                }
            }

            stale_stages = if improved { 0 } else { stale_stages + 1 };
            trace!(temperature, best = cost_of(&best), "annealing stage done");
            temperature *= self.settings.sa_temperature_reduction;
        }

        debug!(cost = cost_of(&best), "simulated annealing frozen");
        best
    }

    fn accept_uphill(&mut self, delta: Cost, temperature: f64) -> bool {
        if temperature <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < (-delta / temperature).exp()
    }

    /// First legal initial state for this iteration.
    ///
    /// The first iteration may start from the edges ordered by pair cost;
    /// the rest, and any retry, use a fresh shuffle.
    fn initial_state(&mut self, graph: &JoinGraph, kind: TreeKind, iteration: usize) -> Option<TreeState> {
        let n = graph.relation_count();
        let mut edges = graph.edges().to_vec();

        if self.settings.heuristic_states && iteration == 0 {
            self.order_by_pair_cost(&mut edges);
            if let Some(state) = self.encode_and_build(kind, &edges, n) {
                return Some(state);
            }
        }

        for _ in 0..graph.edge_count().max(1) {
            edges.shuffle(&mut self.rng);
            if let Some(state) = self.encode_and_build(kind, &edges, n) {
                return Some(state);
            }
        }
        None
    }

    fn encode_and_build(&mut self, kind: TreeKind, edges: &[Edge], n: usize) -> Option<TreeState> {
        let mut state = TreeState::encode(kind, edges, n).ok()?;
        self.evaluate(&mut state).then_some(state)
    }

    /// Cheapest pair joins first; illegal pairs sink to the end.
    fn order_by_pair_cost(&mut self, edges: &mut Vec<Edge>) {
        self.eval.reset_scope();
        let mut keyed: Vec<(Cost, Edge)> = edges
            .drain(..)
            .map(|edge| {
                let cost = self
                    .eval
                    .try_join(self.eval.base(edge.a), self.eval.base(edge.b))
                    .map_or(Cost::INFINITY, |id| self.eval.cost(id));
                (cost, edge)
            })
            .collect();
        keyed.sort_by(|x, y| x.0.total_cmp(&y.0));
        edges.extend(keyed.into_iter().map(|(_, edge)| edge));
    }

    /// A random legal neighbour of `state`, or `None` once the attempt
    /// budget is spent.
    fn neighbour(&mut self, graph: &JoinGraph, state: &TreeState) -> Option<TreeState> {
        let attempts = graph.edge_count().max(state.len());
        for _ in 0..attempts {
            let mut next = state.clone();
            if self.mutate(graph, &mut next) && self.evaluate(&mut next) {
                return Some(next);
            }
        }
        None
    }

    fn mutate(&mut self, graph: &JoinGraph, state: &mut TreeState) -> bool {
        let len = state.len();
        match state.kind() {
            TreeKind::Bushy => {
                let idx = self.rng.random_range(0..len);
                state.rotate_at(idx, graph)
            }
            TreeKind::LeftDeep => {
                if len < 3 || self.rng.random_bool(0.5) {
                    let idx = self.rng.random_range(0..len - 1);
                    state.swap_adjacent(idx, graph)
                } else {
                    let idx = self.rng.random_range(0..len - 2);
                    state.rotate_three(idx, graph)
                }
            }
        }
    }

    /// Build `state` inside the trial scope and record its cost.
    fn evaluate(&mut self, state: &mut TreeState) -> bool {
        let budget = self.settings.cache_size_kb * 1024;
        if !self.settings.cache_plans || self.eval.scope_bytes() > budget {
            self.eval.reset_scope();
        }

        let Some(root) = state.build(&mut self.eval) else {
            return false;
        };
        let cost = self.eval.cost(root);
        state.set_cost(cost);
        self.eval.stats.states_built += 1;
        trace!(cost, "state built");
        true
    }
}

fn cost_of(state: &TreeState) -> Cost {
    state.cost().unwrap_or(Cost::INFINITY)
}

/// Run a two-phase search with the settings' seed and no observer.
pub fn two_phase_optimize<O: JoinOracle>(oracle: O, settings: &Settings) -> PlanResult<JoinPlan<O::Handle>> {
    TwoPhaseOptimizer::new(oracle, settings).optimize()
}
