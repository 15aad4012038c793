//! Interface to the host planner's join legality and cost model.

use crate::planner::relation::{RelationId, RelationSet};

/// Estimated execution cost, as reported by the oracle.
pub type Cost = f64;

/// One operand of a join request.
#[derive(Debug, Clone, Copy)]
pub struct JoinInput<'a, H> {
    pub relids: &'a RelationSet,
    pub handle: &'a H,
}

/// The host planner seen from the join-order search.
///
/// The optimizers never invent legality or cost answers; everything comes
/// from here. `try_join` must consider both operand orientations and report
/// the cheaper one, so callers never need to ask twice.
pub trait JoinOracle {
    /// Planner-side representation of a (base or joined) relation.
    type Handle: Clone;

    /// Number of base join inputs.
    fn relation_count(&self) -> usize;

    /// Handle of base relation `rel`.
    fn base_relation(&mut self, rel: RelationId) -> Self::Handle;

    /// Join two disjoint relation sets. `None` when the join is illegal,
    /// e.g. it violates an outer-join ordering.
    fn try_join(
        &mut self,
        left: JoinInput<'_, Self::Handle>,
        right: JoinInput<'_, Self::Handle>,
    ) -> Option<Self::Handle>;

    /// Cheapest total cost of a handle.
    fn cheapest_cost(&self, handle: &Self::Handle) -> Cost;

    /// True when a join predicate connects the two base relations.
    fn has_join_predicate(&self, a: RelationId, b: RelationId) -> bool;

    /// True when the two base relations are tied by a join-order
    /// restriction (outer joins, lateral references).
    fn has_ordering_restriction(&self, a: RelationId, b: RelationId) -> bool;
}

impl<O: JoinOracle + ?Sized> JoinOracle for &mut O {
    type Handle = O::Handle;

    fn relation_count(&self) -> usize {
        (**self).relation_count()
    }

    fn base_relation(&mut self, rel: RelationId) -> Self::Handle {
        (**self).base_relation(rel)
    }

    fn try_join(
        &mut self,
        left: JoinInput<'_, Self::Handle>,
        right: JoinInput<'_, Self::Handle>,
    ) -> Option<Self::Handle> {
        (**self).try_join(left, right)
    }

    fn cheapest_cost(&self, handle: &Self::Handle) -> Cost {
        (**self).cheapest_cost(handle)
    }

    fn has_join_predicate(&self, a: RelationId, b: RelationId) -> bool {
        (**self).has_join_predicate(a, b)
    }

    fn has_ordering_restriction(&self, a: RelationId, b: RelationId) -> bool {
        (**self).has_ordering_restriction(a, b)
    }
}
