use std::sync::Arc;
use std::time::Duration;

use eframe::egui::{self, Align, Context, Key, Layout};

use crate::api::DataApi;
use crate::layout::HybridLayoutEngine;
use crate::request::{DEFAULT_DEBOUNCE, NeighborFetcher, RequestCoordinator};
use crate::selection::{Event, Primary, SelectionState};
use crate::session::Session;

use super::super::{CloudViewState, ExplorerParams, GraphViewState, ViewModel};

impl ViewModel {
    pub(in crate::app) fn new(
        api: Arc<dyn DataApi>,
        params: ExplorerParams,
        session: Session,
    ) -> Self {
        let mut model = Self {
            api,
            draft: params.clone(),
            pending_key: None,
            layout: HybridLayoutEngine::new(params.layout_mix),
            params,
            session,
            selection: SelectionState::default(),
            graph: None,
            anchor_signature: None,
            layer_requests: RequestCoordinator::new("layer-data", DEFAULT_DEBOUNCE),
            graph_requests: RequestCoordinator::new("ballmapper", DEFAULT_DEBOUNCE),
            concept_requests: RequestCoordinator::new("concepts", DEFAULT_DEBOUNCE),
            search_requests: RequestCoordinator::new("search-concept", DEFAULT_DEBOUNCE),
            overlap_requests: RequestCoordinator::new("category-overlaps", DEFAULT_DEBOUNCE),
            pinned_requests: RequestCoordinator::new("pinned-overlaps", DEFAULT_DEBOUNCE),
            dataset_requests: RequestCoordinator::new("concept-datasets", DEFAULT_DEBOUNCE),
            neighbor_fetcher: NeighborFetcher::new(),
            concept_datasets: Vec::new(),
            concept_input: String::new(),
            cloud: CloudViewState::default(),
            graph_view: GraphViewState::default(),
        };

        model.fetch_session_metadata();
        model.fetch_concept_datasets();
        model.schedule_graph();
        model
    }

    fn mode_text(&self) -> String {
        let primary = match self.selection.primary() {
            Primary::Idle => "idle".to_owned(),
            Primary::Point { id, .. } => format!("point #{id}"),
            Primary::Node(id) => format!("node {id}"),
            Primary::Edge(edge) => format!("edge {}–{}", edge.a, edge.b),
            Primary::Lasso(ids) => format!("lasso ({})", ids.len()),
            Primary::ConceptSearch(search) => format!("concept \"{}\"", search.query),
        };
        match self.selection.comparison() {
            Some((pinned, compared)) => format!("{primary}  |  {pinned} vs {compared}"),
            None => primary,
        }
    }

    pub(in crate::app) fn show(&mut self, ctx: &Context) {
        let busy = self.poll_requests();
        if busy {
            ctx.request_repaint_after(Duration::from_millis(30));
        }

        if ctx.input(|input| input.key_pressed(Key::Escape)) && !ctx.wants_keyboard_input() {
            self.dispatch(Event::SelectionCleared);
        }

        egui::TopBottomPanel::top("top_bar")
            .resizable(false)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("sae-atlas");
                    ui.separator();
                    ui.label(self.session.key().describe());
                    ui.label(format!("points: {}", self.session.points.len()));
                    if let Some(graph) = &self.graph {
                        ui.label(format!("nodes: {}", graph.snapshot.nodes().len()));
                        ui.label(format!("edges: {}", graph.snapshot.edges().len()));
                    }
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        if busy {
                            ui.spinner();
                        }
                        if self.layout.is_running() {
                            ui.label(format!("layout α {:.3}", self.layout.alpha()));
                        }
                        ui.label(self.mode_text());
                    });
                });
            });

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(330.0)
            .show(ctx, |ui| {
                self.draw_controls(ui);
                ui.add_space(8.0);
                self.draw_categories(ui);
            });

        egui::SidePanel::right("details")
            .resizable(true)
            .default_width(340.0)
            .show(ctx, |ui| self.draw_details(ui));

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.columns(2, |columns| {
                self.draw_point_cloud(&mut columns[0]);
                self.draw_graph(&mut columns[1]);
            });
        });
    }
}
