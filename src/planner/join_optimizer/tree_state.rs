//! Flat encodings of join trees and their decoding into arena joins.
//!
//! A bushy state is a list of join elements whose children are either base
//! relations or earlier elements; the last element is the root. A left-deep
//! state is the order in which relations are joined onto a growing spine.

use crate::planner::join_optimizer::arena::{JoinEvaluator, NodeId};
use crate::planner::join_optimizer::join_graph::{Edge, JoinGraph};
use crate::planner::oracle::{Cost, JoinOracle};
use crate::planner::plan::JoinPlan;
use crate::planner::relation::{RelationId, RelationSet};
use crate::planner::{PlanError, PlanResult};
use petgraph::unionfind::UnionFind;

/// Child of a bushy join element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildRef {
    Relation(RelationId),
    Element(usize),
}

/// One join of a bushy state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JoinElement {
    pub children: [ChildRef; 2],
}

impl JoinElement {
    pub fn new(left: ChildRef, right: ChildRef) -> Self {
        Self {
            children: [left, right],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeKind {
    Bushy,
    LeftDeep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Elements {
    Bushy(Vec<JoinElement>),
    LeftDeep(Vec<RelationId>),
}

/// One point of the search space plus its cost once built.
#[derive(Debug, Clone)]
pub struct TreeState {
    elements: Elements,
    cost: Option<Cost>,
}

impl TreeState {
    pub fn encode(kind: TreeKind, edges: &[Edge], relation_count: usize) -> PlanResult<Self> {
        match kind {
            TreeKind::Bushy => Self::encode_bushy(edges, relation_count),
            TreeKind::LeftDeep => Self::encode_left_deep(edges, relation_count),
        }
    }

    /// Spanning-forest walk over `edges` in the given order. Every edge that
    /// links two different subtrees becomes a join of those subtrees.
    pub fn encode_bushy(edges: &[Edge], relation_count: usize) -> PlanResult<Self> {
        let target = relation_count.saturating_sub(1);
        let mut forest = UnionFind::<usize>::new(relation_count);
        let mut slot: Vec<ChildRef> = (0..relation_count).map(ChildRef::Relation).collect();
        let mut elements = Vec::with_capacity(target);

        for edge in edges {
            if elements.len() == target {
                break;
            }
            let (root_a, root_b) = (forest.find(edge.a), forest.find(edge.b));
            if root_a == root_b {
                continue;
            }
            elements.push(JoinElement::new(slot[root_a], slot[root_b]));
            forest.union(root_a, root_b);
            slot[forest.find(root_a)] = ChildRef::Element(elements.len() - 1);
        }

        if elements.len() < target {
            return Err(PlanError::DisconnectedGraph);
        }

        let mut state = Self::from_elements(Elements::Bushy(elements));
        state.normalise();
        Ok(state)
    }

    /// Grow one connected spine, taking at each step the first remaining
    /// edge that touches exactly one placed relation.
    pub fn encode_left_deep(edges: &[Edge], relation_count: usize) -> PlanResult<Self> {
        let Some(first) = edges.first() else {
            return match relation_count {
                0 | 1 => Ok(Self::from_left_deep((0..relation_count).collect())),
                _ => Err(PlanError::DisconnectedGraph),
            };
        };

        let mut pending = edges.to_vec();
        let mut placed = vec![false; relation_count];
        let mut spine = Vec::with_capacity(relation_count);
        spine.extend([first.a, first.b]);
        placed[first.a] = true;
        placed[first.b] = true;

        let mut start = 1;
        while spine.len() < relation_count {
            let found = pending[start..]
                .iter()
                .position(|e| placed[e.a] != placed[e.b]);
            let Some(offset) = found else {
                return Err(PlanError::DisconnectedGraph);
            };
            let hit = start + offset;
            let rel = if placed[pending[hit].a] {
                pending[hit].b
            } else {
                pending[hit].a
            };
            spine.push(rel);
            placed[rel] = true;

            // Skipped edges that still reach an unplaced relation move up
            // against the consumed slot; the rest are dropped.
            let mut write = hit;
            for k in (start..hit).rev() {
                if !placed[pending[k].a] || !placed[pending[k].b] {
                    pending[write] = pending[k].clone();
                    write -= 1;
                }
            }
            start = write + 1;
        }

        Ok(Self::from_left_deep(spine))
    }

    /// A bushy state from explicit elements, normalised to post-order.
    pub fn from_bushy(elements: Vec<JoinElement>) -> Self {
        let mut state = Self::from_elements(Elements::Bushy(elements));
        state.normalise();
        state
    }

    pub fn from_left_deep(spine: Vec<RelationId>) -> Self {
        Self::from_elements(Elements::LeftDeep(spine))
    }

    fn from_elements(elements: Elements) -> Self {
        Self {
            elements,
            cost: None,
        }
    }

    /// Re-encode a built join tree.
    ///
    /// Bushy trees are flattened in post-order; left-deep trees by leaf
    /// order.
    pub fn from_plan<H>(plan: &JoinPlan<H>, kind: TreeKind) -> Self {
        match kind {
            TreeKind::LeftDeep => Self::from_left_deep(plan.relations()),
            TreeKind::Bushy => {
                let mut elements = Vec::with_capacity(plan.join_count());
                Self::flatten(plan, &mut elements);
                Self::from_elements(Elements::Bushy(elements))
            }
        }
    }

    fn flatten<H>(plan: &JoinPlan<H>, elements: &mut Vec<JoinElement>) -> ChildRef {
        match plan.children.as_deref() {
            None => ChildRef::Relation(plan.relids.first().unwrap_or_default()),
            Some((left, right)) => {
                let left = Self::flatten(left, elements);
                let right = Self::flatten(right, elements);
                elements.push(JoinElement::new(left, right));
                ChildRef::Element(elements.len() - 1)
            }
        }
    }

    pub fn kind(&self) -> TreeKind {
        match self.elements {
            Elements::Bushy(_) => TreeKind::Bushy,
            Elements::LeftDeep(_) => TreeKind::LeftDeep,
        }
    }

    pub fn elements(&self) -> &Elements {
        &self.elements
    }

    pub fn len(&self) -> usize {
        match &self.elements {
            Elements::Bushy(elements) => elements.len(),
            Elements::LeftDeep(spine) => spine.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cost of the last build, `None` while ungenerated.
    pub fn cost(&self) -> Option<Cost> {
        self.cost
    }

    pub(crate) fn set_cost(&mut self, cost: Cost) {
        self.cost = Some(cost);
    }

    /// Every leaf relation, one entry per occurrence.
    pub fn relations(&self) -> Vec<RelationId> {
        match &self.elements {
            Elements::LeftDeep(spine) => spine.clone(),
            Elements::Bushy(elements) => {
                let mut out: Vec<RelationId> = elements
                    .iter()
                    .flat_map(|e| e.children)
                    .filter_map(|c| match c {
                        ChildRef::Relation(rel) => Some(rel),
                        ChildRef::Element(_) => None,
                    })
                    .collect();
                out.sort_unstable();
                out
            }
        }
    }

    /// Top of the tree: the last bushy element, or the last relation joined
    /// onto a left-deep spine.
    pub fn root(&self) -> Option<ChildRef> {
        match &self.elements {
            Elements::Bushy(elements) => elements.len().checked_sub(1).map(ChildRef::Element),
            Elements::LeftDeep(spine) => spine.last().copied().map(ChildRef::Relation),
        }
    }

    /// Base relations under a bushy child reference.
    pub fn relations_of(&self, child: ChildRef) -> RelationSet {
        let mut set = RelationSet::new();
        self.collect_relations(child, &mut set);
        set
    }

    fn collect_relations(&self, child: ChildRef, set: &mut RelationSet) {
        match child {
            ChildRef::Relation(rel) => set.insert(rel),
            ChildRef::Element(idx) => {
                if let Elements::Bushy(elements) = &self.elements {
                    for c in elements[idx].children {
                        self.collect_relations(c, set);
                    }
                }
            }
        }
    }

    /// Reorder bushy elements so children always precede their parent and
    /// the root comes last. Left-deep states are untouched.
    pub fn normalise(&mut self) {
        let Elements::Bushy(elements) = &mut self.elements else {
            return;
        };
        if elements.is_empty() {
            return;
        }

        let mut referenced = vec![false; elements.len()];
        for element in elements.iter() {
            for child in element.children {
                if let ChildRef::Element(idx) = child {
                    referenced[idx] = true;
                }
            }
        }
        let root = referenced
            .iter()
            .rposition(|r| !r)
            .unwrap_or(elements.len() - 1);

        let mut order = Vec::with_capacity(elements.len());
        post_order(elements, root, &mut order);
        debug_assert_eq!(order.len(), elements.len(), "bushy state is not a single tree");

        let mut remap = vec![0; elements.len()];
        for (new, &old) in order.iter().enumerate() {
            remap[old] = new;
        }
        *elements = order
            .iter()
            .map(|&old| JoinElement {
                children: elements[old].children.map(|child| match child {
                    ChildRef::Element(idx) => ChildRef::Element(remap[idx]),
                    leaf => leaf,
                }),
            })
            .collect();
    }

    /// Decode the state into arena joins.
    ///
    /// Returns the root node, or `None` when any join of the tree is
    /// illegal.
    pub fn build<O: JoinOracle>(&self, eval: &mut JoinEvaluator<O>) -> Option<NodeId> {
        match &self.elements {
            Elements::LeftDeep(spine) => {
                let (first, rest) = spine.split_first()?;
                let mut node = eval.base(*first);
                for &rel in rest {
                    node = eval.try_join(node, eval.base(rel))?;
                }
                Some(node)
            }
            Elements::Bushy(elements) => {
                let mut subplans: Vec<NodeId> = Vec::with_capacity(elements.len());
                for element in elements {
                    let [left, right] = element.children.map(|child| match child {
                        ChildRef::Relation(rel) => eval.base(rel),
                        ChildRef::Element(idx) => subplans[idx],
                    });
                    subplans.push(eval.try_join(left, right)?);
                }
                subplans.last().copied()
            }
        }
    }

    /// Rotate the subtree at `element`: swap one child (the uncle) with a
    /// grandchild under the other child, provided the uncle has an edge to
    /// the grandchild's sibling. Returns false when no such rotation exists.
    pub fn rotate_at(&mut self, element: usize, graph: &JoinGraph) -> bool {
        let Elements::Bushy(elements) = &self.elements else {
            return false;
        };
        let parent = elements[element];

        let mut rotation = None;
        'search: for (father_slot, uncle_slot) in [(0, 1), (1, 0)] {
            let ChildRef::Element(father) = parent.children[father_slot] else {
                continue;
            };
            let uncle = self.relations_of(parent.children[uncle_slot]);
            for (child_slot, brother_slot) in [(0, 1), (1, 0)] {
                let brother = self.relations_of(elements[father].children[brother_slot]);
                if graph.are_sets_joinable(&uncle, &brother) {
                    rotation = Some((father, child_slot, uncle_slot));
                    break 'search;
                }
            }
        }

        let Some((father, child_slot, uncle_slot)) = rotation else {
            return false;
        };
        if let Elements::Bushy(elements) = &mut self.elements {
            let child = elements[father].children[child_slot];
            elements[father].children[child_slot] = elements[element].children[uncle_slot];
            elements[element].children[uncle_slot] = child;
        }
        self.normalise();
        self.cost = None;
        true
    }

    /// Swap spine positions `idx` and `idx + 1`.
    pub fn swap_adjacent(&mut self, idx: usize, graph: &JoinGraph) -> bool {
        let Elements::LeftDeep(spine) = &mut self.elements else {
            return false;
        };
        if idx + 1 >= spine.len() || !can_push_down(spine, spine[idx + 1], idx, graph) {
            return false;
        }
        spine.swap(idx, idx + 1);
        self.cost = None;
        true
    }

    /// Move spine position `idx + 2` to `idx`, shifting the two before it.
    pub fn rotate_three(&mut self, idx: usize, graph: &JoinGraph) -> bool {
        let Elements::LeftDeep(spine) = &mut self.elements else {
            return false;
        };
        if idx + 2 >= spine.len() || !can_push_down(spine, spine[idx + 2], idx, graph) {
            return false;
        }
        spine[idx..idx + 3].rotate_right(1);
        self.cost = None;
        true
    }
}

fn post_order(elements: &[JoinElement], idx: usize, order: &mut Vec<usize>) {
    for child in elements[idx].children {
        if let ChildRef::Element(next) = child {
            post_order(elements, next, order);
        }
    }
    order.push(idx);
}

/// True when `rel` has an edge to a relation placed before `pos`.
fn can_push_down(spine: &[RelationId], rel: RelationId, pos: usize, graph: &JoinGraph) -> bool {
    spine[..pos].iter().any(|&placed| graph.are_joinable(rel, placed))
}
