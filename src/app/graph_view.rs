use eframe::egui::{self, Align2, Color32, FontId, PointerButton, Rect, Sense, Stroke, Ui, vec2};

use crate::comparison::{NodeFill, comparison_fill};
use crate::selection::{Emphasis, Event, Highlight};
use crate::session::Panel;

use super::ViewModel;
use super::render_utils::{
    SELECTED_COLOR, blend_color, circle_visible, dim_color, draw_background, draw_pie,
    edge_visible, emphasis_color, screen_to_world, world_to_screen,
};

const EDGE_COLOR: Color32 = Color32::from_rgba_premultiplied(72, 72, 72, 200);
const NODE_EDGE_TOLERANCE: f32 = 4.0;
const NODE_CLICK_SLOP: f32 = 2.0;

impl ViewModel {
    fn handle_graph_zoom(&mut self, ui: &Ui, rect: Rect, response: &egui::Response) {
        if !response.hovered() {
            return;
        }

        let scroll = ui.input(|input| input.raw_scroll_delta.y);
        if scroll.abs() <= f32::EPSILON {
            return;
        }

        let view = &mut self.graph_view;
        let pointer = ui
            .input(|input| input.pointer.hover_pos())
            .unwrap_or_else(|| rect.center());
        let world_before = screen_to_world(rect, view.pan, view.zoom, pointer);

        let zoom_factor = (1.0 + (scroll * 0.0018)).clamp(0.85, 1.15);
        view.zoom = (view.zoom * zoom_factor).clamp(0.05, 6.0);
        view.pan = pointer - rect.center() - (world_before * view.zoom);
    }

    fn handle_graph_pan(&mut self, response: &egui::Response) {
        if response.dragged_by(PointerButton::Secondary)
            || response.dragged_by(PointerButton::Middle)
        {
            self.graph_view.pan += response.drag_delta();
        }
    }

    fn handle_node_drag(&mut self, rect: Rect, response: &egui::Response) {
        let (pan, zoom) = (self.graph_view.pan, self.graph_view.zoom);
        let pointer = response.interact_pointer_pos();

        if response.drag_started_by(PointerButton::Primary)
            && let Some(pointer) = pointer
        {
            let world = screen_to_world(rect, pan, zoom, pointer);
            if let Some(id) = self.layout.node_at(world, NODE_CLICK_SLOP / zoom) {
                self.layout.begin_drag(id, world);
            }
        }

        if self.layout.dragged().is_some() {
            if response.dragged_by(PointerButton::Primary)
                && let Some(pointer) = pointer
            {
                self.layout
                    .drag_to(screen_to_world(rect, pan, zoom, pointer));
            }
            if response.drag_stopped() {
                self.layout.end_drag();
            }
        }
    }

    fn handle_graph_click(&mut self, rect: Rect, response: &egui::Response) {
        if !response.clicked_by(PointerButton::Primary) {
            return;
        }
        let Some(pointer) = response.interact_pointer_pos() else {
            return;
        };
        let (pan, zoom) = (self.graph_view.pan, self.graph_view.zoom);
        let world = screen_to_world(rect, pan, zoom, pointer);

        let event = if let Some(id) = self.layout.node_at(world, NODE_CLICK_SLOP / zoom) {
            Event::NodeClicked(id)
        } else if let Some((a, b)) = self
            .layout
            .edge_at(world, NODE_EDGE_TOLERANCE / zoom)
            .and_then(|edge| self.graph.as_ref()?.snapshot.edges().get(edge))
            .map(|edge| (edge.a, edge.b))
        {
            Event::EdgeClicked { a, b }
        } else {
            Event::SelectionCleared
        };
        self.dispatch(event);
    }

    pub(in crate::app) fn draw_graph(&mut self, ui: &mut Ui) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(rect);

        self.graph_view.viewport = rect.size();
        self.sync_anchors();

        draw_background(&painter, rect, self.graph_view.pan, self.graph_view.zoom);

        if let Some(message) = self.session.error_message(Panel::Graph) {
            painter.text(
                rect.left_bottom() + vec2(10.0, -10.0),
                Align2::LEFT_BOTTOM,
                message,
                FontId::proportional(13.0),
                Color32::from_rgb(236, 112, 99),
            );
        }

        if self.graph.is_none() {
            let text = if self.graph_requests.is_busy() {
                "Computing ball mapper graph..."
            } else {
                "No graph for the current filters."
            };
            painter.text(
                rect.center(),
                Align2::CENTER_CENTER,
                text,
                FontId::proportional(14.0),
                Color32::from_gray(180),
            );
            return;
        }

        self.handle_graph_zoom(ui, rect, &response);
        self.handle_graph_pan(&response);
        self.handle_node_drag(rect, &response);
        self.handle_graph_click(rect, &response);

        if self.layout.tick() || response.dragged() {
            ui.ctx().request_repaint();
        }

        let Some(graph) = self.graph.as_ref() else {
            return;
        };
        let snapshot = &graph.snapshot;
        let pan = self.graph_view.pan;
        let zoom = self.graph_view.zoom;
        let zoom_sqrt = zoom.sqrt();
        let highlight = Highlight::compute(&self.selection, Some(snapshot));
        let focus = highlight.has_focus();
        let selected_node = self.selection.selected_node();
        let selected_edge = self
            .selection
            .selected_edge()
            .map(|edge| (edge.a, edge.b));

        for segment in self.layout.edge_segments() {
            let Some(edge) = snapshot.edges().get(segment.edge) else {
                continue;
            };
            let start = world_to_screen(rect, pan, zoom, segment.from);
            let end = world_to_screen(rect, pan, zoom, segment.to);
            if !edge_visible(rect, start, end, 2.5) {
                continue;
            }

            let is_selected = selected_edge == Some((edge.a, edge.b));
            let touches_selection = selected_node.is_some_and(|id| edge.touches(id));
            let (width, color) = if is_selected {
                ((3.3 * zoom_sqrt).clamp(1.7, 5.8), SELECTED_COLOR)
            } else if touches_selection {
                (
                    (2.5 * zoom_sqrt).clamp(1.2, 4.4),
                    blend_color(EDGE_COLOR, SELECTED_COLOR, 0.55),
                )
            } else if focus {
                ((0.82 * zoom_sqrt).clamp(0.45, 2.0), dim_color(EDGE_COLOR, 0.6))
            } else {
                ((1.18 * zoom_sqrt).clamp(0.6, 3.4), EDGE_COLOR)
            };
            painter.line_segment([start, end], Stroke::new(width, color));
        }

        let hover = response
            .hover_pos()
            .map(|pointer| screen_to_world(rect, pan, zoom, pointer))
            .and_then(|world| self.layout.node_at(world, NODE_CLICK_SLOP / zoom));
        if hover.is_some() {
            ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
        }

        let comparison = self.selection.comparison();
        let mut animating = false;
        for (index, node) in snapshot.nodes().iter().enumerate() {
            let Some(world) = self.layout.position(index) else {
                continue;
            };
            let position = world_to_screen(rect, pan, zoom, world);
            let radius = (self.layout.radius(index) * zoom).max(1.5);
            if !circle_visible(rect, position, radius + 14.0) {
                continue;
            }

            let emphasis = highlight.node(node, &self.session.points);
            let selection_mix = ui.ctx().animate_bool(
                ui.make_persistent_id(("ball-node-selection", node.id)),
                selected_node == Some(node.id),
            );
            if selection_mix > 0.0 && selection_mix < 1.0 {
                animating = true;
            }

            match comparison_fill(&node.members, &self.session.points, comparison) {
                NodeFill::Neutral => {
                    painter.circle_filled(position, radius, emphasis_color(emphasis, focus));
                }
                NodeFill::Solid(bucket) => {
                    painter.circle_filled(position, radius, bucket.color());
                }
                NodeFill::Pie(wedges) => draw_pie(&painter, position, radius, &wedges),
            }

            let outline = if emphasis >= Emphasis::Neighbor && comparison.is_some() {
                emphasis_color(emphasis, focus)
            } else {
                Color32::from_rgba_premultiplied(15, 15, 15, 190)
            };
            painter.circle_stroke(
                position,
                radius,
                Stroke::new(1.0 + selection_mix * 1.2, outline),
            );
            if selection_mix > 0.0 {
                let halo = (selection_mix * (1.0 - selection_mix) * 4.0).clamp(0.0, 1.0);
                painter.circle_stroke(
                    position,
                    radius + 4.0 + (1.0 - selection_mix) * 6.0,
                    Stroke::new(
                        1.0 + halo * 1.6,
                        Color32::from_rgba_unmultiplied(245, 206, 93, (30.0 + halo * 145.0) as u8),
                    ),
                );
            }

            let is_hovered = hover == Some(node.id);
            if (is_hovered || selection_mix > 0.0 || radius > 11.0 || zoom > 1.6)
                && let Some(label) = self.layout.label_position(index)
            {
                painter.text(
                    world_to_screen(rect, pan, zoom, label),
                    Align2::CENTER_BOTTOM,
                    node.size().to_string(),
                    FontId::proportional(11.0),
                    Color32::from_gray(232),
                );
            }
        }

        if animating {
            ui.ctx().request_repaint();
        }

        if let Some(node) = hover.and_then(|id| snapshot.node(id))
            && let Some(world) = self.layout.position_of(node.id)
        {
            painter.text(
                world_to_screen(rect, pan, zoom, world) + vec2(12.0, -12.0),
                Align2::LEFT_BOTTOM,
                format!("node {}  |  {} points", node.id, node.size()),
                FontId::proportional(13.0),
                Color32::from_gray(240),
            );
        }

        let epsilon = graph
            .computed_epsilon
            .or(self.params.epsilon)
            .unwrap_or_else(|| snapshot.resolved_radius());
        painter.text(
            rect.right_bottom() + vec2(-10.0, -10.0),
            Align2::RIGHT_BOTTOM,
            format!(
                "ε = {epsilon:.4}  |  {} nodes  |  {} edges",
                snapshot.nodes().len(),
                snapshot.edges().len()
            ),
            FontId::proportional(12.0),
            Color32::from_gray(200),
        );
    }
}
