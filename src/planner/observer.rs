//! Hooks for instrumentation layers that watch the search converge.

use crate::planner::oracle::Cost;

/// Receives every new best cost found by an optimizer.
///
/// Observers only watch; nothing they do changes the search outcome.
pub trait OptimizerObserver {
    /// A sampled join sequence beat every earlier sample.
    fn on_sample_cost(&mut self, _cost: Cost) {}

    /// A tree state beat every earlier state.
    fn on_convergence(&mut self, _cost: Cost) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl OptimizerObserver for NoopObserver {}

/// Records the reported costs in order.
#[derive(Debug, Default, Clone)]
pub struct CostTrace {
    pub samples: Vec<Cost>,
    pub convergence: Vec<Cost>,
}

impl CostTrace {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OptimizerObserver for CostTrace {
    fn on_sample_cost(&mut self, cost: Cost) {
        self.samples.push(cost);
    }

    fn on_convergence(&mut self, cost: Cost) {
        self.convergence.push(cost);
    }
}

impl<T: OptimizerObserver + ?Sized> OptimizerObserver for &mut T {
    fn on_sample_cost(&mut self, cost: Cost) {
        (**self).on_sample_cost(cost);
    }

    fn on_convergence(&mut self, cost: Cost) {
        (**self).on_convergence(cost);
    }
}
