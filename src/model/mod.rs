//! Query description consumed by the reference cost model.

pub mod query;

pub use query::{JoinPredicate, ModelError, OrderingRestriction, QueryGraph, RelationDef};
