use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use eframe::egui::{self, Context, Pos2, Vec2};

use crate::api::{
    ConceptDataset, ConceptMatches, DataApi, GraphResponse, LayerData, Overlap, RankedOverlap,
};
use crate::error::ExplorerResult;
use crate::layout::HybridLayoutEngine;
use crate::request::{CancelToken, NeighborFetcher, RequestCoordinator};
use crate::selection::SelectionState;
use crate::session::{Session, SessionKey};

mod cloud_view;
mod dispatch;
mod graph_view;
mod render_utils;
mod ui;

/// User-adjustable parameters, seeded from the command line.
#[derive(Clone, Debug, PartialEq)]
pub struct ExplorerParams {
    pub layer: u32,
    pub threshold: f32,
    pub concept_dataset: String,
    pub max_size: u32,
    pub epsilon: Option<f32>,
    pub layout_mix: f32,
}

impl ExplorerParams {
    pub fn session_key(&self) -> SessionKey {
        SessionKey {
            layer: self.layer,
            threshold: self.threshold,
            concept_dataset: self.concept_dataset.clone(),
        }
    }
}

pub struct ExplorerApp {
    api: Arc<dyn DataApi>,
    params: ExplorerParams,
    state: AppState,
}

enum AppState {
    Loading {
        key: SessionKey,
        rx: Receiver<ExplorerResult<LayerData>>,
    },
    Ready(Box<ViewModel>),
    Error(String),
}

struct ViewModel {
    api: Arc<dyn DataApi>,
    params: ExplorerParams,
    draft: ExplorerParams,
    /// Session the layer load in flight will install.
    pending_key: Option<SessionKey>,
    session: Session,
    selection: SelectionState,
    graph: Option<GraphResponse>,
    layout: HybridLayoutEngine,
    anchor_signature: Option<AnchorSignature>,
    layer_requests: RequestCoordinator<(SessionKey, LayerData)>,
    graph_requests: RequestCoordinator<GraphResponse>,
    concept_requests: RequestCoordinator<Vec<String>>,
    search_requests: RequestCoordinator<ConceptMatches>,
    overlap_requests: RequestCoordinator<(String, BTreeMap<String, Overlap>)>,
    pinned_requests: RequestCoordinator<(String, Vec<RankedOverlap>)>,
    dataset_requests: RequestCoordinator<Vec<ConceptDataset>>,
    neighbor_fetcher: NeighborFetcher,
    concept_datasets: Vec<ConceptDataset>,
    concept_input: String,
    cloud: CloudViewState,
    graph_view: GraphViewState,
}

#[derive(Default)]
struct CloudViewState {
    /// Projection-space vertices of the stroke being drawn.
    lasso_stroke: Vec<Pos2>,
}

struct GraphViewState {
    pan: Vec2,
    zoom: f32,
    viewport: Vec2,
}

impl Default for GraphViewState {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0,
            viewport: Vec2::new(640.0, 480.0),
        }
    }
}

/// Inputs the anchors depend on besides the snapshot itself.
#[derive(Clone, Debug, PartialEq)]
struct AnchorSignature {
    viewport: (i32, i32),
    categories: Vec<String>,
}

impl ExplorerApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        api: Arc<dyn DataApi>,
        params: ExplorerParams,
    ) -> Self {
        let state = Self::start_load(Arc::clone(&api), params.session_key());
        Self { api, params, state }
    }

    fn spawn_load(api: Arc<dyn DataApi>, key: SessionKey) -> Receiver<ExplorerResult<LayerData>> {
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let result = api.layer_data(&key, &CancelToken::new());
            let _ = tx.send(result);
        });

        rx
    }

    fn start_load(api: Arc<dyn DataApi>, key: SessionKey) -> AppState {
        log::info!("loading {}", key.describe());
        AppState::Loading {
            rx: Self::spawn_load(api, key.clone()),
            key,
        }
    }
}

impl eframe::App for ExplorerApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        let mut transition = None;

        match &mut self.state {
            AppState::Loading { key, rx } => {
                if let Ok(result) = rx.try_recv() {
                    transition = Some(match result {
                        Ok(data) => AppState::Ready(Box::new(ViewModel::new(
                            Arc::clone(&self.api),
                            self.params.clone(),
                            Session::new(key.clone(), data),
                        ))),
                        Err(error) => {
                            log::warn!("initial load failed: {error}");
                            AppState::Error(
                                error.user_message().unwrap_or_else(|| error.to_string()),
                            )
                        }
                    });
                }

                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.add_space(120.0);
                        ui.heading(format!("Loading {}...", key.describe()));
                        ui.add_space(8.0);
                        ui.spinner();
                    });
                });
                ctx.request_repaint();
            }
            AppState::Error(error) => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.heading("Failed to load the feature projection");
                    ui.add_space(6.0);
                    ui.label(error.as_str());
                    ui.add_space(10.0);
                    if ui.button("Retry").clicked() {
                        transition = Some(Self::start_load(
                            Arc::clone(&self.api),
                            self.params.session_key(),
                        ));
                    }
                });
            }
            AppState::Ready(model) => model.show(ctx),
        }

        if let Some(next_state) = transition {
            self.state = next_state;
        }
    }
}
