use std::sync::Arc;
use std::time::Instant;

use crate::anchor::{ResolvedAnchors, resolve_anchors};
use crate::api::{GraphQuery, GraphResponse, GraphSnapshot, LayerData};
use crate::error::{ExplorerError, ExplorerResult};
use crate::geometry::{DEFAULT_PADDING, SquareMapping};
use crate::selection::{Effect, Event, SelectionContext};
use crate::session::{Panel, Session, SessionKey};

use super::{AnchorSignature, ExplorerParams, ViewModel};

impl ViewModel {
    /// The only path by which views change the selection.
    pub(in crate::app) fn dispatch(&mut self, event: Event) {
        let context = SelectionContext {
            points: &self.session.points,
            graph: self.graph.as_ref().map(|graph| &graph.snapshot),
            concepts: &self.session.concepts,
        };
        let effects = self.selection.apply(event, &context);
        for effect in effects {
            self.run_effect(effect);
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::RefetchGraph => self.schedule_graph(),
            Effect::FetchNeighbors {
                generation,
                sources,
            } => {
                self.session.clear_error(Panel::Details);
                self.neighbor_fetcher.start(
                    Arc::clone(&self.api),
                    self.session.key().clone(),
                    self.active_categories(),
                    generation,
                    sources,
                );
            }
            Effect::CancelNeighbors => self.neighbor_fetcher.cancel(),
            Effect::CancelConceptSearch => self.search_requests.cancel(),
            Effect::SearchConcept(query) => {
                self.session.clear_error(Panel::Concepts);
                let api = Arc::clone(&self.api);
                let key = self.session.key().clone();
                self.search_requests.launch_now(move |cancel| {
                    let matches = api.search_concept(&key, &query, cancel)?;
                    if matches.matches.is_empty() {
                        return Err(ExplorerError::empty(format!("points matching \"{query}\"")));
                    }
                    Ok(matches)
                });
            }
            Effect::UnknownConcept(query) => {
                log::info!("concept {query:?} is not available for this layer");
                self.session.report(
                    Panel::Concepts,
                    ExplorerError::empty(format!("concept named \"{query}\"")),
                );
            }
            Effect::FetchCategoryOverlaps(category) => {
                let api = Arc::clone(&self.api);
                let key = self.session.key().clone();
                self.overlap_requests.launch_now(move |cancel| {
                    let overlaps = api.category_overlaps(&key, &category, cancel)?;
                    Ok((category, overlaps))
                });
            }
            Effect::FetchPinnedOrder(category) => {
                let api = Arc::clone(&self.api);
                let key = self.session.key().clone();
                self.pinned_requests.launch_now(move |cancel| {
                    let ranked = api.pinned_category_overlaps(&key, &category, cancel)?;
                    Ok((category, ranked))
                });
            }
        }
    }

    fn active_categories(&self) -> Vec<String> {
        self.selection
            .active_categories()
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    pub(in crate::app) fn schedule_graph(&mut self) {
        let query = GraphQuery {
            key: self.session.key().clone(),
            max_size: self.params.max_size.max(1),
            epsilon: self.params.epsilon,
            categories: self.active_categories(),
        };
        let api = Arc::clone(&self.api);
        self.graph_requests
            .schedule(move |cancel| api.ball_mapper_graph(&query, cancel), Instant::now());
    }

    fn schedule_layer_load(&mut self, key: SessionKey) {
        log::info!("switching to {}", key.describe());
        let api = Arc::clone(&self.api);
        self.layer_requests.schedule(
            move |cancel| api.layer_data(&key, cancel).map(|data| (key, data)),
            Instant::now(),
        );
    }

    pub(in crate::app) fn fetch_session_metadata(&mut self) {
        let api = Arc::clone(&self.api);
        let key = self.session.key().clone();
        self.concept_requests
            .launch_now(move |cancel| api.concepts(&key, cancel));
    }

    pub(in crate::app) fn fetch_concept_datasets(&mut self) {
        let api = Arc::clone(&self.api);
        self.dataset_requests
            .launch_now(move |cancel| api.concept_datasets(cancel));
    }

    /// Applies edited parameters; dataset changes reload, graph changes refetch.
    ///
    /// Session fields of `params` only change once the new layer is installed.
    pub(in crate::app) fn apply_draft(&mut self) {
        let requested = self.draft.session_key();
        if requested == self.params.session_key() {
            if self.pending_key.take().is_some() {
                log::info!("layer switch withdrawn");
                self.layer_requests.cancel();
            }
        } else if self.pending_key.as_ref() != Some(&requested) {
            self.pending_key = Some(requested.clone());
            self.schedule_layer_load(requested);
        }

        let graph_changed = self.draft.max_size != self.params.max_size
            || self.draft.epsilon != self.params.epsilon;
        let mix_changed = (self.draft.layout_mix - self.params.layout_mix).abs() > f32::EPSILON;
        self.params.max_size = self.draft.max_size;
        self.params.epsilon = self.draft.epsilon;
        self.params.layout_mix = self.draft.layout_mix;

        // A pending layer switch refetches the graph once it lands.
        if graph_changed && self.pending_key.is_none() {
            self.schedule_graph();
        }
        if mix_changed {
            self.layout.set_mix(self.params.layout_mix);
        }
    }

    fn commit_session_params(params: &mut ExplorerParams, key: &SessionKey) {
        params.layer = key.layer;
        params.threshold = key.threshold;
        params.concept_dataset = key.concept_dataset.clone();
    }

    fn install_session(&mut self, key: SessionKey, data: LayerData) {
        self.graph_requests.cancel();
        self.search_requests.cancel();
        self.overlap_requests.cancel();
        self.pinned_requests.cancel();
        self.concept_requests.cancel();

        self.pending_key = None;
        Self::commit_session_params(&mut self.params, &key);
        Self::commit_session_params(&mut self.draft, &key);
        self.session = Session::new(key, data);
        self.graph = None;
        self.layout.clear();
        self.anchor_signature = None;
        self.cloud.lasso_stroke.clear();
        self.concept_input.clear();
        self.dispatch(Event::SessionReset);

        self.fetch_session_metadata();
        self.schedule_graph();
    }

    fn install_graph(&mut self, response: GraphResponse) {
        log::info!(
            "graph: {} nodes, {} edges, radius {:.3}",
            response.snapshot.nodes().len(),
            response.snapshot.edges().len(),
            response.snapshot.resolved_radius()
        );
        let stale_selection =
            self.selection.selected_node().is_some() || self.selection.selected_edge().is_some();

        let anchors = self.compute_anchors(&response.snapshot);
        self.layout.load_snapshot(&response.snapshot, anchors);
        self.anchor_signature = Some(self.anchor_signature_now());
        self.graph = Some(response);

        // Node ids are only meaningful within one snapshot.
        if stale_selection {
            self.dispatch(Event::SelectionCleared);
        }
    }

    fn compute_anchors(&self, snapshot: &GraphSnapshot) -> ResolvedAnchors {
        let mapping = SquareMapping::compute(
            self.session.points.iter().map(|point| point.projected),
            self.graph_view.viewport,
            DEFAULT_PADDING,
        );
        resolve_anchors(
            snapshot,
            &self.session.points,
            |point| self.selection.admits(&point.categories),
            &mapping,
        )
    }

    fn anchor_signature_now(&self) -> AnchorSignature {
        AnchorSignature {
            viewport: (
                self.graph_view.viewport.x.round() as i32,
                self.graph_view.viewport.y.round() as i32,
            ),
            categories: self.active_categories(),
        }
    }

    /// Re-resolves anchors when the viewport or the category filter changed.
    pub(in crate::app) fn sync_anchors(&mut self) {
        let signature = self.anchor_signature_now();
        if self.anchor_signature.as_ref() == Some(&signature) {
            return;
        }
        if let Some(graph) = &self.graph {
            let anchors = self.compute_anchors(&graph.snapshot);
            self.layout.set_anchors(anchors);
        }
        self.anchor_signature = Some(signature);
    }

    fn report_result<T>(&mut self, panel: Panel, result: &ExplorerResult<T>) {
        match result {
            Ok(_) => self.session.clear_error(panel),
            Err(error) => self.session.report(panel, error.clone()),
        }
    }

    /// Collects finished requests; returns true while any are outstanding.
    pub(in crate::app) fn poll_requests(&mut self) -> bool {
        let now = Instant::now();

        if let Some(result) = self.layer_requests.poll(now) {
            match result {
                Ok((key, data)) => self.install_session(key, data),
                Err(error) => {
                    log::warn!("layer switch failed: {error}");
                    // Controls fall back to the session still on screen.
                    self.pending_key = None;
                    let current = self.session.key().clone();
                    Self::commit_session_params(&mut self.draft, &current);
                    self.session.report(Panel::PointCloud, error);
                }
            }
        }

        if let Some(result) = self.graph_requests.poll(now) {
            self.report_result(Panel::Graph, &result);
            match result {
                Ok(response) => self.install_graph(response),
                Err(ExplorerError::EmptyResult { .. }) => {
                    self.graph = None;
                    self.layout.clear();
                }
                Err(_) => {}
            }
        }

        if let Some(result) = self.concept_requests.poll(now) {
            self.report_result(Panel::Concepts, &result);
            if let Ok(concepts) = result {
                self.session.set_concepts(concepts);
            }
        }

        if let Some(result) = self.search_requests.poll(now) {
            match result {
                Ok(matches) => {
                    if self.selection.pending_query() == Some(matches.concept.as_str()) {
                        self.session.match_distribution =
                            Some((matches.concept.clone(), matches.category_distribution));
                    }
                    self.dispatch(Event::ConceptMatchesLoaded {
                        query: matches.concept,
                        matches: matches.matches,
                    });
                }
                Err(error) => {
                    if let Some(query) = self.selection.pending_query().map(str::to_owned) {
                        self.dispatch(Event::ConceptSearchFailed(query));
                    }
                    self.session.report(Panel::Concepts, error);
                }
            }
        }

        if let Some(result) = self.overlap_requests.poll(now) {
            self.report_result(Panel::Categories, &result);
            if let Ok((category, overlaps)) = result
                && self.selection.category_filter() == Some(category.as_str())
            {
                self.session.category_overlaps = Some((category, overlaps));
            }
        }

        if let Some(result) = self.pinned_requests.poll(now) {
            self.report_result(Panel::Categories, &result);
            if let Ok((category, ranked)) = result
                && self.selection.pinned() == Some(category.as_str())
            {
                self.session.pinned_order = Some((category, ranked));
            }
        }

        if let Some(result) = self.dataset_requests.poll(now) {
            match result {
                Ok(datasets) => self.concept_datasets = datasets,
                Err(error) => log::warn!("concept datasets unavailable: {error}"),
            }
        }

        for loaded in self.neighbor_fetcher.drain() {
            match loaded.result {
                Ok(neighbors) => self.dispatch(Event::NeighborsLoaded {
                    generation: loaded.generation,
                    source: loaded.source,
                    neighbors,
                }),
                Err(error) if loaded.generation == self.selection.generation() => {
                    self.session.report(Panel::Details, error);
                }
                Err(_) => {}
            }
        }

        self.layer_requests.is_busy()
            || self.graph_requests.is_busy()
            || self.concept_requests.is_busy()
            || self.search_requests.is_busy()
            || self.overlap_requests.is_busy()
            || self.pinned_requests.is_busy()
            || self.dataset_requests.is_busy()
            || self.neighbor_fetcher.is_active()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use eframe::egui::pos2;

    use super::*;
    use crate::api::model::GraphEdge;
    use crate::api::{
        CategoryCount, ConceptDataset, ConceptMatches, DataApi, DataPoint, GraphNode, Neighbor,
        Overlap, PointId, PointTable, RankedOverlap,
    };
    use crate::request::CancelToken;

    const FAILING_LAYER: u32 = 99;

    #[derive(Default)]
    struct FakeApi {
        layer_calls: AtomicUsize,
        graph_calls: AtomicUsize,
    }

    fn layer_data() -> LayerData {
        let point = |id: PointId, categories: &[&str]| DataPoint {
            id,
            projected: pos2(id as f32, (id % 2) as f32),
            categories: categories.iter().map(|c| (*c).to_owned()).collect(),
            label: format!("feature {id}"),
            concepts: Vec::new(),
        };
        LayerData {
            points: PointTable::new(vec![
                point(0, &["Animal"]),
                point(1, &["Animal"]),
                point(2, &["Tool"]),
                point(3, &["Tool"]),
                point(4, &["Animal", "Tool"]),
            ]),
            category_distribution: vec![
                CategoryCount {
                    category: "Animal".into(),
                    count: 3,
                },
                CategoryCount {
                    category: "Tool".into(),
                    count: 3,
                },
            ],
            total_concepts: Some(2),
        }
    }

    impl DataApi for FakeApi {
        fn layer_data(&self, key: &SessionKey, _: &CancelToken) -> ExplorerResult<LayerData> {
            self.layer_calls.fetch_add(1, Ordering::SeqCst);
            if key.layer == FAILING_LAYER {
                return Err(ExplorerError::network("layer-data", "HTTP 404"));
            }
            Ok(layer_data())
        }

        fn ball_mapper_graph(
            &self,
            _: &GraphQuery,
            _: &CancelToken,
        ) -> ExplorerResult<GraphResponse> {
            self.graph_calls.fetch_add(1, Ordering::SeqCst);
            let snapshot = GraphSnapshot::normalized(
                vec![
                    GraphNode {
                        id: 1,
                        members: vec![0, 1, 2],
                    },
                    GraphNode {
                        id: 2,
                        members: vec![2, 3],
                    },
                ],
                vec![GraphEdge {
                    a: 1,
                    b: 2,
                    shared: BTreeSet::from([2]),
                }],
                0.4,
            );
            Ok(GraphResponse {
                snapshot,
                computed_epsilon: Some(0.4),
                total_points: 5,
            })
        }

        fn nearest_neighbors(
            &self,
            _: &SessionKey,
            point: PointId,
            _: &[String],
            _: &CancelToken,
        ) -> ExplorerResult<Vec<Neighbor>> {
            Ok(vec![Neighbor {
                id: point + 100,
                similarity: 0.8,
                label: format!("near {point}"),
            }])
        }

        fn concepts(&self, _: &SessionKey, _: &CancelToken) -> ExplorerResult<Vec<String>> {
            Ok(vec!["dog".into(), "unreachable".into()])
        }

        fn search_concept(
            &self,
            _: &SessionKey,
            concept: &str,
            _: &CancelToken,
        ) -> ExplorerResult<ConceptMatches> {
            if concept == "unreachable" {
                return Err(ExplorerError::network("search-concept", "HTTP 500"));
            }
            Ok(ConceptMatches {
                concept: concept.to_owned(),
                matches: vec![0, 4],
                category_distribution: vec![CategoryCount {
                    category: "Animal".into(),
                    count: 2,
                }],
            })
        }

        fn category_overlaps(
            &self,
            _: &SessionKey,
            category: &str,
            _: &CancelToken,
        ) -> ExplorerResult<BTreeMap<String, Overlap>> {
            Ok(BTreeMap::from([(
                category.to_owned(),
                Overlap {
                    overlap_count: 3,
                    overlap_percentage: 100.0,
                },
            )]))
        }

        fn pinned_category_overlaps(
            &self,
            _: &SessionKey,
            _: &str,
            _: &CancelToken,
        ) -> ExplorerResult<Vec<RankedOverlap>> {
            Ok(Vec::new())
        }

        fn concept_datasets(&self, _: &CancelToken) -> ExplorerResult<Vec<ConceptDataset>> {
            Ok(Vec::new())
        }
    }

    fn params() -> ExplorerParams {
        ExplorerParams {
            layer: 3,
            threshold: 0.5,
            concept_dataset: "thingsplus".into(),
            max_size: 3,
            epsilon: None,
            layout_mix: 0.0,
        }
    }

    fn settle(model: &mut ViewModel) {
        let started = Instant::now();
        while model.poll_requests() {
            assert!(started.elapsed() < Duration::from_secs(5), "requests never settled");
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn model() -> (Arc<FakeApi>, ViewModel) {
        let api = Arc::new(FakeApi::default());
        let params = params();
        let session = Session::new(params.session_key(), layer_data());
        let mut model = ViewModel::new(api.clone(), params, session);
        settle(&mut model);
        assert!(model.graph.is_some());
        (api, model)
    }

    #[test]
    fn new_snapshot_clears_node_and_edge_selections() {
        let (_, mut model) = model();

        model.dispatch(Event::NodeClicked(1));
        assert_eq!(model.selection.selected_node(), Some(1));
        model.schedule_graph();
        settle(&mut model);
        assert_eq!(model.selection.selected_node(), None);

        model.dispatch(Event::EdgeClicked { a: 1, b: 2 });
        assert!(model.selection.selected_edge().is_some());
        model.schedule_graph();
        settle(&mut model);
        assert!(model.selection.selected_edge().is_none());

        model.dispatch(Event::PointClicked(3));
        model.schedule_graph();
        settle(&mut model);
        assert_eq!(model.selection.selected_point(), Some(3));
    }

    #[test]
    fn overlaps_for_a_category_no_longer_selected_are_dropped() {
        let (_, mut model) = model();

        model.dispatch(Event::CategoryClicked("Animal".into()));
        model.dispatch(Event::CategoryClicked("Animal".into()));
        model.dispatch(Event::PinToggled("Tool".into()));
        model.dispatch(Event::PinToggled("Tool".into()));
        settle(&mut model);
        assert!(model.session.category_overlaps.is_none());
        assert!(model.session.pinned_order.is_none());

        model.dispatch(Event::CategoryClicked("Tool".into()));
        settle(&mut model);
        assert_eq!(
            model
                .session
                .category_overlaps
                .as_ref()
                .map(|(category, _)| category.as_str()),
            Some("Tool")
        );
    }

    #[test]
    fn failed_search_is_reported_and_leaves_selection_idle() {
        let (_, mut model) = model();

        model.dispatch(Event::ConceptSubmitted("unreachable".into()));
        assert_eq!(model.selection.pending_query(), Some("unreachable"));
        settle(&mut model);

        assert_eq!(model.selection.pending_query(), None);
        assert_eq!(model.selection.concept_search(), None);
        assert!(model.session.error_message(Panel::Concepts).is_some());
    }

    #[test]
    fn search_abandoned_by_a_point_click_changes_nothing() {
        let (_, mut model) = model();

        model.dispatch(Event::ConceptSubmitted("dog".into()));
        model.dispatch(Event::PointClicked(1));
        settle(&mut model);

        assert_eq!(model.selection.selected_point(), Some(1));
        assert_eq!(model.selection.active_search(), None);
        assert!(model.session.match_distribution.is_none());

        model.dispatch(Event::ConceptSubmitted("dog".into()));
        settle(&mut model);
        assert_eq!(
            model.selection.concept_search().map(|search| search.matches.len()),
            Some(2)
        );
        assert!(model.session.match_distribution.is_some());
    }

    #[test]
    fn graph_parameters_refetch_without_reloading_the_layer() {
        let (api, mut model) = model();
        let layers = api.layer_calls.load(Ordering::SeqCst);
        let graphs = api.graph_calls.load(Ordering::SeqCst);

        model.draft.max_size = 5;
        model.draft.epsilon = Some(0.2);
        model.apply_draft();
        model.apply_draft();
        settle(&mut model);

        assert_eq!(api.layer_calls.load(Ordering::SeqCst), layers);
        assert_eq!(api.graph_calls.load(Ordering::SeqCst), graphs + 1);
        assert_eq!(model.params.max_size, 5);
        assert_eq!(model.params.epsilon, Some(0.2));
    }

    #[test]
    fn dataset_change_reloads_the_session() {
        let (api, mut model) = model();
        let graphs = api.graph_calls.load(Ordering::SeqCst);
        model.dispatch(Event::PinToggled("Animal".into()));
        settle(&mut model);

        model.draft.layer = 7;
        model.apply_draft();
        assert_eq!(model.params.layer, 3);
        model.apply_draft();
        settle(&mut model);

        assert_eq!(api.layer_calls.load(Ordering::SeqCst), 1);
        assert_eq!(model.session.key().layer, 7);
        assert_eq!(model.params.layer, 7);
        assert_eq!(model.selection.pinned(), None);
        assert!(api.graph_calls.load(Ordering::SeqCst) > graphs);
        assert!(model.pending_key.is_none());
    }

    #[test]
    fn failed_layer_load_keeps_controls_on_the_live_session() {
        let (api, mut model) = model();

        model.draft.layer = FAILING_LAYER;
        model.apply_draft();
        settle(&mut model);

        assert_eq!(model.session.key().layer, 3);
        assert_eq!(model.params.layer, 3);
        assert_eq!(model.draft.layer, 3);
        assert!(model.session.error_message(Panel::PointCloud).is_some());

        model.draft.layer = FAILING_LAYER;
        model.apply_draft();
        settle(&mut model);
        assert_eq!(api.layer_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn neighbor_batches_merge_per_source_and_drop_older_generations() {
        let (_, mut model) = model();

        model.dispatch(Event::NodeClicked(1));
        settle(&mut model);
        let sources = model.selection.neighbors().keys().copied().collect::<Vec<_>>();
        assert_eq!(sources, vec![0, 1, 2]);
        assert_eq!(model.selection.neighbors()[&2][0].id, 102);

        model.dispatch(Event::PointClicked(4));
        let stale = model.selection.generation();
        model.dispatch(Event::NodeClicked(1));
        let current = model.selection.generation();
        model.neighbor_fetcher.cancel();

        let neighbor = |id| Neighbor {
            id,
            similarity: 0.5,
            label: String::new(),
        };
        for (generation, source) in [(current, 2), (stale, 4), (current, 0)] {
            model.dispatch(Event::NeighborsLoaded {
                generation,
                source,
                neighbors: vec![neighbor(source + 10)],
            });
        }

        let sources = model.selection.neighbors().keys().copied().collect::<Vec<_>>();
        assert_eq!(sources, vec![0, 2]);
        assert_eq!(model.selection.neighbors()[&0][0].id, 10);
    }
}
