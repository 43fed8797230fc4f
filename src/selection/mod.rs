//! Cross-view selection: the single owner of what is selected, filtered and compared.
//!
//! Views translate gestures into [`Event`]s, call [`SelectionState::apply`] and carry
//! out the returned [`Effect`]s. Nothing else writes this state.

mod highlight;

use std::collections::{BTreeMap, BTreeSet};

use eframe::egui::Pos2;

use crate::api::{GraphSnapshot, Neighbor, NodeId, PointId, PointTable};
use crate::geometry::point_in_polygon;

pub use highlight::{Emphasis, Highlight};

#[derive(Clone, Debug, PartialEq)]
pub struct ConceptSearch {
    pub query: String,
    pub matches: BTreeSet<PointId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EdgeSelection {
    pub a: NodeId,
    pub b: NodeId,
    pub shared: BTreeSet<PointId>,
}

/// Mutually exclusive primary selection.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Primary {
    #[default]
    Idle,
    /// A concept search interrupted by a point click is kept so that clicking the
    /// point again returns to it.
    Point {
        id: PointId,
        parked_search: Option<ConceptSearch>,
    },
    Node(NodeId),
    Edge(EdgeSelection),
    Lasso(BTreeSet<PointId>),
    ConceptSearch(ConceptSearch),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    CategoryClicked(String),
    PinToggled(String),
    ComparisonCleared,
    PointClicked(PointId),
    NodeClicked(NodeId),
    EdgeClicked { a: NodeId, b: NodeId },
    /// Closed stroke in projection space.
    LassoCompleted(Vec<Pos2>),
    LassoModeToggled,
    ConceptSubmitted(String),
    ConceptMatchesLoaded { query: String, matches: Vec<PointId> },
    ConceptSearchFailed(String),
    NeighborsLoaded {
        generation: u64,
        source: PointId,
        neighbors: Vec<Neighbor>,
    },
    SelectionCleared,
    /// Layer, threshold or concept dataset changed.
    SessionReset,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    RefetchGraph,
    FetchNeighbors { generation: u64, sources: Vec<PointId> },
    CancelNeighbors,
    SearchConcept(String),
    CancelConceptSearch,
    UnknownConcept(String),
    FetchCategoryOverlaps(String),
    FetchPinnedOrder(String),
}

/// Read-only data a transition may consult.
pub struct SelectionContext<'a> {
    pub points: &'a PointTable,
    pub graph: Option<&'a GraphSnapshot>,
    pub concepts: &'a [String],
}

#[derive(Clone, Debug, Default)]
pub struct SelectionState {
    primary: Primary,
    category_filter: Option<String>,
    pinned: Option<String>,
    compared: Option<String>,
    pending_query: Option<String>,
    lasso_mode: bool,
    generation: u64,
    neighbors: BTreeMap<PointId, Vec<Neighbor>>,
}

impl SelectionState {
    pub fn primary(&self) -> &Primary {
        &self.primary
    }

    pub fn selected_point(&self) -> Option<PointId> {
        match self.primary {
            Primary::Point { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn selected_node(&self) -> Option<NodeId> {
        match self.primary {
            Primary::Node(id) => Some(id),
            _ => None,
        }
    }

    pub fn selected_edge(&self) -> Option<&EdgeSelection> {
        match &self.primary {
            Primary::Edge(edge) => Some(edge),
            _ => None,
        }
    }

    pub fn lasso(&self) -> Option<&BTreeSet<PointId>> {
        match &self.primary {
            Primary::Lasso(ids) => Some(ids),
            _ => None,
        }
    }

    pub fn concept_search(&self) -> Option<&ConceptSearch> {
        match &self.primary {
            Primary::ConceptSearch(search) => Some(search),
            _ => None,
        }
    }

    /// The running concept search, shown or parked behind a point selection.
    pub fn active_search(&self) -> Option<&ConceptSearch> {
        match &self.primary {
            Primary::ConceptSearch(search) => Some(search),
            Primary::Point {
                parked_search: Some(search),
                ..
            } => Some(search),
            _ => None,
        }
    }

    pub fn pending_query(&self) -> Option<&str> {
        self.pending_query.as_deref()
    }

    pub fn category_filter(&self) -> Option<&str> {
        self.category_filter.as_deref()
    }

    pub fn pinned(&self) -> Option<&str> {
        self.pinned.as_deref()
    }

    pub fn compared(&self) -> Option<&str> {
        self.compared.as_deref()
    }

    /// Pinned and compared categories when both are set and distinct.
    pub fn comparison(&self) -> Option<(&str, &str)> {
        match (self.pinned.as_deref(), self.compared.as_deref()) {
            (Some(pinned), Some(compared)) if pinned != compared => Some((pinned, compared)),
            _ => None,
        }
    }

    pub fn lasso_mode(&self) -> bool {
        self.lasso_mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn neighbors(&self) -> &BTreeMap<PointId, Vec<Neighbor>> {
        &self.neighbors
    }

    /// Categories a point must belong to (any of) to be drawn in the foreground.
    pub fn active_categories(&self) -> Vec<&str> {
        match (&self.pinned, &self.compared) {
            (Some(pinned), Some(compared)) => vec![pinned.as_str(), compared.as_str()],
            (Some(pinned), None) => vec![pinned.as_str()],
            _ => self.category_filter.iter().map(String::as_str).collect(),
        }
    }

    pub fn admits(&self, categories: &BTreeSet<String>) -> bool {
        let active = self.active_categories();
        active.is_empty() || active.iter().any(|category| categories.contains(*category))
    }

    pub fn apply(&mut self, event: Event, context: &SelectionContext<'_>) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            Event::CategoryClicked(category) => self.click_category(category, &mut effects),
            Event::PinToggled(category) => self.toggle_pin(category, &mut effects),
            Event::ComparisonCleared => {
                if self.compared.is_some() {
                    self.compared = None;
                    self.filter_changed(&mut effects);
                }
            }
            Event::PointClicked(id) => self.click_point(id, &mut effects),
            Event::NodeClicked(id) => {
                let Some(node) = context.graph.and_then(|graph| graph.node(id)) else {
                    log::debug!("selection: click on unknown node {id}");
                    return effects;
                };
                let sources = node.members.clone();
                self.abandon_pending_search(&mut effects);
                self.primary = Primary::Node(id);
                effects.push(self.restart_neighbors(sources));
            }
            Event::EdgeClicked { a, b } => {
                let Some(edge) = context.graph.and_then(|graph| {
                    graph
                        .edges()
                        .iter()
                        .find(|edge| (edge.a == a && edge.b == b) || (edge.a == b && edge.b == a))
                }) else {
                    log::debug!("selection: click on unknown edge {a}-{b}");
                    return effects;
                };
                let shared = edge.shared.clone();
                let sources = shared.iter().copied().collect();
                self.abandon_pending_search(&mut effects);
                self.primary = Primary::Edge(EdgeSelection {
                    a: edge.a,
                    b: edge.b,
                    shared,
                });
                effects.push(self.restart_neighbors(sources));
            }
            Event::LassoCompleted(path) => {
                if !self.lasso_mode || path.len() < 3 {
                    return effects;
                }
                let ids = context
                    .points
                    .iter()
                    .filter(|point| self.admits(&point.categories))
                    .filter(|point| point_in_polygon(point.projected, &path))
                    .map(|point| point.id)
                    .collect::<BTreeSet<_>>();
                log::debug!("selection: lasso captured {} points", ids.len());
                self.abandon_pending_search(&mut effects);
                self.primary = if ids.is_empty() {
                    Primary::Idle
                } else {
                    Primary::Lasso(ids)
                };
                effects.push(self.restart_neighbors(Vec::new()));
            }
            Event::LassoModeToggled => self.lasso_mode = !self.lasso_mode,
            Event::ConceptSubmitted(query) => self.submit_concept(query, context, &mut effects),
            Event::ConceptMatchesLoaded { query, matches } => {
                if self.pending_query.as_deref() != Some(query.as_str()) {
                    log::debug!("selection: dropping matches for stale query {query:?}");
                    return effects;
                }
                self.pending_query = None;
                let matches = matches.into_iter().collect::<BTreeSet<_>>();
                let sources = matches.iter().copied().collect();
                self.primary = Primary::ConceptSearch(ConceptSearch { query, matches });
                effects.push(self.restart_neighbors(sources));
            }
            Event::ConceptSearchFailed(query) => {
                if self.pending_query.as_deref() == Some(query.as_str()) {
                    self.pending_query = None;
                }
            }
            Event::NeighborsLoaded {
                generation,
                source,
                neighbors,
            } => {
                if generation != self.generation {
                    log::debug!(
                        "selection: dropping neighbors of {source} from generation {generation}"
                    );
                    return effects;
                }
                self.neighbors.insert(source, neighbors);
            }
            Event::SelectionCleared => {
                self.abandon_pending_search(&mut effects);
                let previous = std::mem::take(&mut self.primary);
                let sources = match previous {
                    Primary::Point {
                        parked_search: Some(search),
                        ..
                    } => {
                        let sources = search.matches.iter().copied().collect();
                        self.primary = Primary::ConceptSearch(search);
                        sources
                    }
                    _ => Vec::new(),
                };
                effects.push(self.restart_neighbors(sources));
            }
            Event::SessionReset => {
                let generation = self.generation;
                *self = Self {
                    generation,
                    ..Self::default()
                };
                log::info!("selection: reset for new session");
                effects.push(self.restart_neighbors(Vec::new()));
            }
        }
        effects
    }

    fn click_category(&mut self, category: String, effects: &mut Vec<Effect>) {
        match self.pinned.clone() {
            Some(pinned) if pinned == category => {
                self.unpin();
                self.filter_changed(effects);
            }
            Some(_) => {
                if self.compared.as_deref() == Some(category.as_str()) {
                    self.compared = None;
                } else {
                    self.compared = Some(category);
                }
                self.filter_changed(effects);
            }
            None => {
                if self.category_filter.as_deref() == Some(category.as_str()) {
                    self.category_filter = None;
                } else {
                    effects.push(Effect::FetchCategoryOverlaps(category.clone()));
                    self.category_filter = Some(category);
                }
                self.filter_changed(effects);
            }
        }
    }

    fn toggle_pin(&mut self, category: String, effects: &mut Vec<Effect>) {
        if self.pinned.as_deref() == Some(category.as_str()) {
            self.unpin();
        } else {
            effects.push(Effect::FetchPinnedOrder(category.clone()));
            self.category_filter = Some(category.clone());
            self.pinned = Some(category);
            self.compared = None;
        }
        self.filter_changed(effects);
    }

    fn unpin(&mut self) {
        self.pinned = None;
        self.compared = None;
        self.category_filter = None;
    }

    /// Filtering and concept search exclude each other, and the graph must follow.
    fn filter_changed(&mut self, effects: &mut Vec<Effect>) {
        self.abandon_pending_search(effects);
        if self.primary != Primary::Idle || !self.neighbors.is_empty() {
            self.primary = Primary::Idle;
            effects.push(self.restart_neighbors(Vec::new()));
        }
        effects.push(Effect::RefetchGraph);
    }

    /// A newer primary selection wins over a search still in flight.
    fn abandon_pending_search(&mut self, effects: &mut Vec<Effect>) {
        if let Some(query) = self.pending_query.take() {
            log::debug!("selection: abandoning pending search {query:?}");
            effects.push(Effect::CancelConceptSearch);
        }
    }

    fn click_point(&mut self, id: PointId, effects: &mut Vec<Effect>) {
        self.abandon_pending_search(effects);
        let previous = std::mem::take(&mut self.primary);
        match previous {
            Primary::Point {
                id: current,
                parked_search,
            } if current == id => match parked_search {
                Some(search) => {
                    let sources = search.matches.iter().copied().collect();
                    self.primary = Primary::ConceptSearch(search);
                    effects.push(self.restart_neighbors(sources));
                }
                None => effects.push(self.restart_neighbors(Vec::new())),
            },
            other => {
                let parked_search = match other {
                    Primary::ConceptSearch(search) => Some(search),
                    Primary::Point { parked_search, .. } => parked_search,
                    _ => None,
                };
                self.primary = Primary::Point { id, parked_search };
                effects.push(self.restart_neighbors(vec![id]));
            }
        }
    }

    fn submit_concept(
        &mut self,
        query: String,
        context: &SelectionContext<'_>,
        effects: &mut Vec<Effect>,
    ) {
        let query = query.trim().to_owned();
        if query.is_empty() {
            return;
        }
        if !context.concepts.iter().any(|concept| *concept == query) {
            effects.push(Effect::UnknownConcept(query));
            return;
        }

        let had_filter =
            self.category_filter.is_some() || self.pinned.is_some() || self.compared.is_some();
        self.category_filter = None;
        self.pinned = None;
        self.compared = None;
        self.primary = Primary::Idle;
        effects.push(self.restart_neighbors(Vec::new()));
        if had_filter {
            effects.push(Effect::RefetchGraph);
        }
        self.pending_query = Some(query.clone());
        effects.push(Effect::SearchConcept(query));
    }

    /// Starts a new neighbor generation; results tagged with an older one are dropped.
    fn restart_neighbors(&mut self, sources: Vec<PointId>) -> Effect {
        self.generation += 1;
        self.neighbors.clear();
        if sources.is_empty() {
            Effect::CancelNeighbors
        } else {
            Effect::FetchNeighbors {
                generation: self.generation,
                sources,
            }
        }
    }
}
