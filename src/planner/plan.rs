//! The join tree handed back to the caller.

use crate::planner::oracle::Cost;
use crate::planner::relation::{RelationId, RelationSet};
use std::fmt;

/// A complete, cost-annotated join tree.
///
/// Owns clones of the oracle handles, so it outlives the optimizer and its
/// trial arena.
#[derive(Debug, Clone)]
pub struct JoinPlan<H> {
    pub relids: RelationSet,
    pub cost: Cost,
    pub handle: H,
    pub children: Option<Box<(JoinPlan<H>, JoinPlan<H>)>>,
}

impl<H> JoinPlan<H> {
    pub fn relation(rel: RelationId, cost: Cost, handle: H) -> Self {
        Self {
            relids: RelationSet::single(rel),
            cost,
            handle,
            children: None,
        }
    }

    pub fn join(left: JoinPlan<H>, right: JoinPlan<H>, cost: Cost, handle: H) -> Self {
        Self {
            relids: left.relids.union(&right.relids),
            cost,
            handle,
            children: Some(Box::new((left, right))),
        }
    }

    /// The base relation, when this node is a leaf.
    pub fn as_relation(&self) -> Option<RelationId> {
        match self.children {
            None => self.relids.first(),
            Some(_) => None,
        }
    }

    pub fn left(&self) -> Option<&JoinPlan<H>> {
        self.children.as_deref().map(|(left, _)| left)
    }

    pub fn right(&self) -> Option<&JoinPlan<H>> {
        self.children.as_deref().map(|(_, right)| right)
    }

    /// Leaf relations from left to right.
    pub fn relations(&self) -> Vec<RelationId> {
        let mut out = Vec::with_capacity(self.relids.len());
        self.collect_relations(&mut out);
        out
    }

    fn collect_relations(&self, out: &mut Vec<RelationId>) {
        match self.children.as_deref() {
            None => out.extend(self.relids.iter()),
            Some((left, right)) => {
                left.collect_relations(out);
                right.collect_relations(out);
            }
        }
    }

    pub fn join_count(&self) -> usize {
        match self.children.as_deref() {
            None => 0,
            Some((left, right)) => 1 + left.join_count() + right.join_count(),
        }
    }

    pub fn depth(&self) -> usize {
        match self.children.as_deref() {
            None => 0,
            Some((left, right)) => 1 + left.depth().max(right.depth()),
        }
    }

    /// True when every join has at least one base relation as a child.
    pub fn is_left_deep(&self) -> bool {
        match self.children.as_deref() {
            None => true,
            Some((left, right)) => {
                (left.children.is_none() || right.children.is_none())
                    && left.is_left_deep()
                    && right.is_left_deep()
            }
        }
    }

    /// Visit every join node bottom-up.
    pub fn for_each_join<F: FnMut(&JoinPlan<H>, &JoinPlan<H>)>(&self, f: &mut F) {
        if let Some((left, right)) = self.children.as_deref() {
            left.for_each_join(f);
            right.for_each_join(f);
            f(left, right);
        }
    }
}

impl<H> fmt::Display for JoinPlan<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.children.as_deref() {
            None => write!(f, "{}", self.relids.first().unwrap_or_default()),
            Some((left, right)) => write!(f, "({} ⋈ {})", left, right),
        }
    }
}
