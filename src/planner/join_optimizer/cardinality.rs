// src/planner/join_optimizer/cardinality.rs
use crate::model::{ModelError, QueryGraph};
use crate::planner::oracle::{Cost, JoinInput, JoinOracle};
use crate::planner::relation::{RelationId, RelationSet};
use serde::Serialize;

/// Estimated output size and accumulated cost of a (sub)plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JoinEstimate {
    pub rows: f64,
    pub cost: Cost,
}

/// Cost model driven by row counts and predicate selectivities.
///
/// Each join costs its output rows plus the smaller input, on top of the
/// inputs' own costs, so cheap plans shrink intermediate results early.
/// Cross products are legal but pay for the full product.
#[derive(Debug, Clone)]
pub struct CardinalityOracle {
    rows: Vec<f64>,
    /// Combined selectivity per relation pair, `None` without a predicate.
    selectivity: Vec<Vec<Option<f64>>>,
    restrictions: Vec<(RelationId, RelationSet)>,
}

impl CardinalityOracle {
    pub fn new(query: &QueryGraph) -> Result<Self, ModelError> {
        query.validate()?;
        let n = query.relation_count();

        let mut selectivity = vec![vec![None; n]; n];
        for predicate in &query.predicates {
            let left = query.resolve(&predicate.left)?;
            let right = query.resolve(&predicate.right)?;
            // Several predicates between one pair multiply.
            let combined = selectivity[left][right].unwrap_or(1.0) * predicate.selectivity;
            selectivity[left][right] = Some(combined);
            selectivity[right][left] = Some(combined);
        }

        let mut restrictions = Vec::with_capacity(query.restrictions.len());
        for restriction in &query.restrictions {
            let relation = query.resolve(&restriction.relation)?;
            let mut requires = RelationSet::new();
            for name in &restriction.requires {
                requires.insert(query.resolve(name)?);
            }
            restrictions.push((relation, requires));
        }

        Ok(Self {
            rows: query.relations.iter().map(|r| r.rows).collect(),
            selectivity,
            restrictions,
        })
    }

    /// Estimate output rows for a join of two disjoint sets.
    pub fn estimate_join_output(
        &self,
        left: &RelationSet,
        left_rows: f64,
        right: &RelationSet,
        right_rows: f64,
    ) -> f64 {
        let mut rows = left_rows * right_rows;
        for a in left.iter() {
            for b in right.iter() {
                if let Some(s) = self.selectivity[a][b] {
                    rows *= s;
                }
            }
        }
        rows.max(1.0)
    }

    /// True when joining into `relids` breaks no ordering restriction.
    pub fn is_legal(&self, relids: &RelationSet) -> bool {
        self.restrictions
            .iter()
            .all(|(relation, requires)| !relids.contains(*relation) || requires.is_subset(relids))
    }
}

impl JoinOracle for CardinalityOracle {
    type Handle = JoinEstimate;

    fn relation_count(&self) -> usize {
        self.rows.len()
    }

    fn base_relation(&mut self, rel: RelationId) -> JoinEstimate {
        JoinEstimate {
            rows: self.rows[rel],
            cost: self.rows[rel],
        }
    }

    fn try_join(
        &mut self,
        left: JoinInput<'_, JoinEstimate>,
        right: JoinInput<'_, JoinEstimate>,
    ) -> Option<JoinEstimate> {
        let relids = left.relids.union(right.relids);
        if !self.is_legal(&relids) {
            return None;
        }

        let rows =
            self.estimate_join_output(left.relids, left.handle.rows, right.relids, right.handle.rows);
        let cost = left.handle.cost + right.handle.cost + rows + left.handle.rows.min(right.handle.rows);
        Some(JoinEstimate { rows, cost })
    }

    fn cheapest_cost(&self, handle: &JoinEstimate) -> Cost {
        handle.cost
    }

    fn has_join_predicate(&self, a: RelationId, b: RelationId) -> bool {
        self.selectivity[a][b].is_some()
    }

    fn has_ordering_restriction(&self, a: RelationId, b: RelationId) -> bool {
        self.restrictions.iter().any(|(relation, requires)| {
            (*relation == a && requires.contains(b)) || (*relation == b && requires.contains(a))
        })
    }
}
