//! Join-order search engines.
//!
//! Everything here works on relation ids and arena nodes; the cost model
//! and join legality come from the [`JoinOracle`](crate::planner::oracle::JoinOracle).

pub mod arena;
pub mod cardinality;
pub mod dp_optimizer;
pub mod join_graph;
pub mod sdp;
pub mod tree_state;
pub mod twopo;

pub use arena::{JoinEvaluator, JoinNode, NodeId};
pub use cardinality::{CardinalityOracle, JoinEstimate};
pub use dp_optimizer::ExhaustiveOptimizer;
pub use join_graph::{Edge, JoinGraph};
pub use sdp::{sample_dp_optimize, SampleDpOptimizer};
pub use tree_state::{ChildRef, JoinElement, TreeKind, TreeState};
pub use twopo::{two_phase_optimize, TwoPhaseOptimizer};

/// Counters collected while one optimizer runs.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SearchStats {
    /// Joins the oracle granted and the arena allocated.
    pub joins_created: usize,
    /// Joins answered from the pair cache.
    pub joins_reused: usize,
    pub joins_refused: usize,
    pub arena_resets: usize,
    /// Tree states that decoded into a complete plan.
    pub states_built: usize,
    pub uphill_moves: usize,
    pub samples: usize,
    pub failed_samples: usize,
}
