//! Join-order planner - picks the order and shape of pairwise joins.
//!
//! Three strategies behind one entry point:
//! 1. Exhaustive: subset DP, exact, for small queries
//! 2. TwoPO: iterative improvement + simulated annealing over join trees
//! 3. SDP: sampled join orders + interval DP over the best order

pub mod join_optimizer;
pub mod observer;
pub mod oracle;
pub mod plan;
pub mod relation;

pub use join_optimizer::{
    sample_dp_optimize, two_phase_optimize, ExhaustiveOptimizer, SampleDpOptimizer, SearchStats,
    TwoPhaseOptimizer,
};
pub use observer::{CostTrace, NoopObserver, OptimizerObserver};
pub use oracle::{Cost, JoinInput, JoinOracle};
pub use plan::JoinPlan;
pub use relation::{RelationId, RelationSet};

use crate::config::{Algorithm, Settings, SettingsError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during join-order search.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Query has no relations to join")]
    EmptyQuery,

    #[error("Could not create a correct join graph: relation {0} cannot be joined with any other relation")]
    UngraphableQuery(RelationId),

    #[error("Join graph is disconnected and no cross product between its components is legal")]
    DisconnectedGraph,

    #[error("Sampling could not produce any valid join sequence")]
    NoValidSample,

    #[error("Could not generate any complete plan")]
    NoCompletePlan,

    #[error("No initial join tree could be built")]
    NoValidState,

    #[error("Exhaustive search supports at most {limit} relations, query has {count}")]
    TooManyRelations { count: usize, limit: usize },

    #[error("Invalid search settings: {0}")]
    InvalidSettings(String),
}

impl From<SettingsError> for PlanError {
    fn from(err: SettingsError) -> Self {
        PlanError::InvalidSettings(err.to_string())
    }
}

pub type PlanResult<T> = Result<T, PlanError>;

/// Random source for a run: the configured seed, or one from the OS.
pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Optimizer that handles a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Exhaustive,
    TwoPhase,
    SampleDp,
}

impl From<Algorithm> for Strategy {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Twopo => Strategy::TwoPhase,
            Algorithm::Sdp => Strategy::SampleDp,
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exhaustive" | "dp" => Ok(Strategy::Exhaustive),
            "twopo" => Ok(Strategy::TwoPhase),
            "sdp" => Ok(Strategy::SampleDp),
            other => Err(format!("unknown strategy: {}", other)),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Exhaustive => write!(f, "exhaustive"),
            Strategy::TwoPhase => write!(f, "twopo"),
            Strategy::SampleDp => write!(f, "sdp"),
        }
    }
}

/// Plan plus how it was found.
#[derive(Debug, Clone)]
pub struct SearchOutcome<H> {
    pub plan: JoinPlan<H>,
    pub strategy: Strategy,
    pub stats: SearchStats,
}

/// Main entry point for join-order search.
///
/// Queries below the selector threshold go to the exhaustive search, the
/// rest to the configured randomized algorithm.
pub struct JoinSearch<O: JoinOracle> {
    oracle: O,
    settings: Settings,
    forced: Option<Strategy>,
}

impl<O: JoinOracle> JoinSearch<O> {
    pub fn new(oracle: O, settings: &Settings) -> Self {
        Self {
            oracle,
            settings: settings.clone(),
            forced: None,
        }
    }

    /// Bypass the threshold and always use `strategy`.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.forced = Some(strategy);
        self
    }

    /// The strategy `optimize` will use for this oracle.
    pub fn strategy(&self) -> Strategy {
        if let Some(strategy) = self.forced {
            return strategy;
        }
        if self.oracle.relation_count() < self.settings.selector.threshold {
            Strategy::Exhaustive
        } else {
            self.settings.selector.algorithm.into()
        }
    }

    pub fn optimize(self) -> PlanResult<JoinPlan<O::Handle>> {
        self.run().map(|outcome| outcome.plan)
    }

    /// Optimize and report the strategy and counters alongside the plan.
    pub fn run(self) -> PlanResult<SearchOutcome<O::Handle>> {
        self.settings.validate()?;
        let strategy = self.strategy();
        debug!(relations = self.oracle.relation_count(), %strategy, "join search started");

        let (plan, stats) = match strategy {
            Strategy::Exhaustive => {
                let mut optimizer = ExhaustiveOptimizer::new(self.oracle);
                (optimizer.optimize()?, optimizer.stats().clone())
            }
            Strategy::TwoPhase => {
                let mut optimizer = TwoPhaseOptimizer::new(self.oracle, &self.settings);
                (optimizer.optimize()?, optimizer.stats().clone())
            }
            Strategy::SampleDp => {
                let mut optimizer = SampleDpOptimizer::new(self.oracle, &self.settings);
                (optimizer.optimize()?, optimizer.stats().clone())
            }
        };

        Ok(SearchOutcome {
            plan,
            strategy,
            stats,
        })
    }
}
