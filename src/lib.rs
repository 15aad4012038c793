//! # ljqo
//!
//! Randomized join-order search for queries with many relations.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                JoinOracle (host planner)                 │
//! │      (join legality, cost of a join, predicates)         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [join evaluator + trial arena]
//! ┌─────────────────────────────────────────────────────────┐
//! │                     JoinGraph                            │
//! │        (edges, adjacency, forced cross products)         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [JoinSearch selector]
//! ┌──────────────────┬──────────────────┬───────────────────┐
//! │    Exhaustive    │      TwoPO       │        SDP        │
//! │   (subset DP)    │   (II + SA over  │ (sampled orders + │
//! │                  │   tree states)   │    interval DP)   │
//! └──────────────────┴──────────────────┴───────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                     JoinPlan                             │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod model;
pub mod planner;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::{Algorithm, Settings, SettingsError};
    pub use crate::model::{ModelError, QueryGraph};
    pub use crate::planner::join_optimizer::{CardinalityOracle, JoinEstimate, TreeKind};
    pub use crate::planner::{
        sample_dp_optimize, two_phase_optimize, Cost, CostTrace, ExhaustiveOptimizer, JoinInput,
        JoinOracle, JoinPlan, JoinSearch, NoopObserver, OptimizerObserver, PlanError, PlanResult,
        RelationId, RelationSet, SampleDpOptimizer, SearchOutcome, SearchStats, Strategy,
        TwoPhaseOptimizer,
    };
}

// Also export at crate root for convenience
pub use config::Settings;
pub use model::QueryGraph;
pub use planner::{JoinPlan, JoinSearch, PlanError, PlanResult};
