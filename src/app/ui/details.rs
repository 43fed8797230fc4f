use eframe::egui::{self, Color32, RichText, Ui};

use crate::api::PointId;
use crate::comparison::{Bucket, partition};
use crate::selection::{Event, Primary};
use crate::session::Panel;
use crate::util::short_label;

use super::super::ViewModel;

const MEMBER_ROW_HEIGHT: f32 = 20.0;

impl ViewModel {
    fn point_caption(&self, id: PointId) -> String {
        match self.session.points.get(id) {
            Some(point) => format!("#{id}  {}", short_label(&point.label, 48)),
            None => format!("#{id}"),
        }
    }

    /// Scrollable list of point ids; returns the one clicked.
    fn draw_member_list(&self, ui: &mut Ui, salt: &str, ids: &[PointId]) -> Option<PointId> {
        let mut clicked = None;
        egui::ScrollArea::vertical()
            .id_salt(salt)
            .max_height(220.0)
            .auto_shrink([false, true])
            .show_rows(ui, MEMBER_ROW_HEIGHT, ids.len(), |ui, row_range| {
                for &id in &ids[row_range] {
                    if ui.link(self.point_caption(id)).clicked() {
                        clicked = Some(id);
                    }
                }
            });
        clicked
    }

    fn draw_primary(&self, ui: &mut Ui) -> Option<Event> {
        let graph = self.graph.as_ref().map(|graph| &graph.snapshot);
        match self.selection.primary() {
            Primary::Idle => {
                ui.label("Click a point or a graph node, or draw a lasso.");
                None
            }
            Primary::Point { id, parked_search } => {
                let point = self.session.points.get(*id);
                ui.label(RichText::new(self.point_caption(*id)).strong());
                if let Some(point) = point {
                    if !point.label.is_empty() {
                        ui.label(point.label.as_str());
                    }
                    let categories = point
                        .categories
                        .iter()
                        .map(String::as_str)
                        .collect::<Vec<_>>()
                        .join(", ");
                    ui.small(format!("Categories: {categories}"));
                    if !point.concepts.is_empty() {
                        ui.small(format!("Concepts: {}", point.concepts.join(", ")));
                    }
                }
                if let Some(search) = parked_search {
                    ui.small(format!(
                        "Search \"{}\" is kept; click the point again to return to it.",
                        search.query
                    ));
                }
                None
            }
            Primary::Node(id) => {
                let node = graph.and_then(|graph| graph.node(*id))?;
                ui.label(RichText::new(format!("Node {id}")).strong());
                ui.label(format!("{} member points", node.size()));
                if let Some((pinned, compared)) = self.selection.comparison() {
                    let counts = partition(&node.members, &self.session.points, pinned, compared);
                    for bucket in Bucket::ALL {
                        ui.colored_label(
                            bucket.color(),
                            format!("{}: {}", bucket.label(), counts.count(bucket)),
                        );
                    }
                }
                self.draw_member_list(ui, "node_members_scroll", &node.members)
                    .map(Event::PointClicked)
            }
            Primary::Edge(edge) => {
                ui.label(RichText::new(format!("Edge {} ↔ {}", edge.a, edge.b)).strong());
                ui.label(format!("{} shared points", edge.shared.len()));
                let shared = edge.shared.iter().copied().collect::<Vec<_>>();
                self.draw_member_list(ui, "edge_shared_scroll", &shared)
                    .map(Event::PointClicked)
            }
            Primary::Lasso(ids) => {
                ui.label(RichText::new(format!("Lasso: {} points", ids.len())).strong());
                let ids = ids.iter().copied().collect::<Vec<_>>();
                self.draw_member_list(ui, "lasso_members_scroll", &ids)
                    .map(Event::PointClicked)
            }
            Primary::ConceptSearch(search) => {
                ui.label(
                    RichText::new(format!("Concept \"{}\"", search.query)).strong(),
                );
                ui.label(format!("{} matching points", search.matches.len()));
                if let Some((query, counts)) = &self.session.match_distribution
                    && *query == search.query
                {
                    for entry in counts.iter().take(5) {
                        ui.small(format!("{}: {}", entry.category, entry.count));
                    }
                }
                let ids = search.matches.iter().copied().collect::<Vec<_>>();
                self.draw_member_list(ui, "concept_matches_scroll", &ids)
                    .map(Event::PointClicked)
            }
        }
    }

    fn draw_neighbors(&self, ui: &mut Ui) -> Option<Event> {
        let neighbors = self.selection.neighbors();
        if neighbors.is_empty() {
            return None;
        }

        let mut clicked = None;
        ui.label(RichText::new("Nearest neighbors").strong());
        egui::ScrollArea::vertical()
            .id_salt("neighbors_scroll")
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for (source, rows) in neighbors {
                    egui::CollapsingHeader::new(self.point_caption(*source))
                        .id_salt(("neighbors", *source))
                        .default_open(neighbors.len() == 1)
                        .show(ui, |ui| {
                            for neighbor in rows {
                                let text = format!(
                                    "#{}  {:.3}  {}",
                                    neighbor.id,
                                    neighbor.similarity,
                                    short_label(&neighbor.label, 40)
                                );
                                if ui.link(text).clicked() {
                                    clicked = Some(Event::PointClicked(neighbor.id));
                                }
                            }
                        });
                }
            });
        clicked
    }

    pub(in crate::app) fn draw_details(&mut self, ui: &mut Ui) {
        ui.heading("Selection Details");
        ui.add_space(6.0);

        let mut pending = self.draw_primary(ui);

        if let Some(message) = self.session.error_message(Panel::Details) {
            ui.colored_label(Color32::from_rgb(236, 112, 99), message);
        }

        ui.separator();
        if let Some(event) = self.draw_neighbors(ui) {
            pending = Some(event);
        }

        if let Some(event) = pending {
            self.dispatch(event);
        }
    }
}
