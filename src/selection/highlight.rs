use std::collections::HashSet;

use super::{Primary, SelectionState};
use crate::api::{DataPoint, GraphNode, GraphSnapshot, PointId, PointTable};

/// Visual priority shared by every renderer; later variants win.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Emphasis {
    Background,
    Foreground,
    Neighbor,
    SearchMatch,
    Selected,
}

/// Per-frame lookup sets derived from a `SelectionState`.
#[derive(Debug, Default)]
pub struct Highlight {
    selected: HashSet<PointId>,
    matches: HashSet<PointId>,
    neighbors: HashSet<PointId>,
    categories: Vec<String>,
}

impl Highlight {
    pub fn compute(state: &SelectionState, graph: Option<&GraphSnapshot>) -> Self {
        let selected = match state.primary() {
            Primary::Idle | Primary::ConceptSearch(_) => HashSet::new(),
            Primary::Point { id, .. } => HashSet::from([*id]),
            Primary::Node(id) => graph
                .and_then(|graph| graph.node(*id))
                .map(|node| node.members.iter().copied().collect())
                .unwrap_or_default(),
            Primary::Edge(edge) => edge.shared.iter().copied().collect(),
            Primary::Lasso(ids) => ids.iter().copied().collect(),
        };
        let matches = state
            .active_search()
            .map(|search| search.matches.iter().copied().collect())
            .unwrap_or_default();
        let neighbors = state
            .neighbors()
            .values()
            .flatten()
            .map(|neighbor| neighbor.id)
            .collect();

        Self {
            selected,
            matches,
            neighbors,
            categories: state
                .active_categories()
                .into_iter()
                .map(str::to_owned)
                .collect(),
        }
    }

    /// True when something is selected or searched, so plain foreground recedes.
    pub fn has_focus(&self) -> bool {
        !self.selected.is_empty() || !self.matches.is_empty()
    }

    pub fn passes_filter(&self, point: &DataPoint) -> bool {
        self.categories.is_empty() || point.in_any(&self.categories)
    }

    pub fn point(&self, point: &DataPoint) -> Emphasis {
        if self.selected.contains(&point.id) {
            Emphasis::Selected
        } else if self.matches.contains(&point.id) {
            Emphasis::SearchMatch
        } else if self.neighbors.contains(&point.id) {
            Emphasis::Neighbor
        } else if self.passes_filter(point) {
            Emphasis::Foreground
        } else {
            Emphasis::Background
        }
    }

    /// Highest emphasis among the node's members.
    pub fn node(&self, node: &GraphNode, points: &PointTable) -> Emphasis {
        node.members
            .iter()
            .filter_map(|&id| points.get(id))
            .map(|point| self.point(point))
            .max()
            .unwrap_or(if self.categories.is_empty() {
                Emphasis::Foreground
            } else {
                Emphasis::Background
            })
    }
}
