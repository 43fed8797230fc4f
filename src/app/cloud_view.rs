use eframe::egui::{
    self, Align2, Color32, FontId, PointerButton, Pos2, Rect, RichText, Sense, Shape, Stroke, Ui,
    vec2,
};

use crate::comparison::classify;
use crate::geometry::{DEFAULT_PADDING, SquareMapping};
use crate::selection::{Emphasis, Event, Highlight};
use crate::session::Panel;
use crate::util::short_label;

use super::ViewModel;
use super::render_utils::{SELECTED_COLOR, emphasis_color, point_radius};

const POINT_PICK_RADIUS: f32 = 6.0;

fn to_screen(rect: Rect, mapping: &SquareMapping, projected: Pos2) -> Pos2 {
    rect.min + mapping.to_viewport(projected).to_vec2()
}

fn to_projection(rect: Rect, mapping: &SquareMapping, screen: Pos2) -> Pos2 {
    mapping.to_data((screen - rect.min).to_pos2())
}

impl ViewModel {
    fn draw_cloud_toolbar(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            ui.label(RichText::new("Projection").strong());
            ui.label(format!("{} points", self.session.points.len()));
            let lasso = self.selection.lasso_mode();
            if ui
                .selectable_label(lasso, "Lasso")
                .on_hover_text("Drag to circle points; release to select them.")
                .clicked()
            {
                self.cloud.lasso_stroke.clear();
                self.dispatch(Event::LassoModeToggled);
            }
            if let Some(ids) = self.selection.lasso() {
                ui.label(format!("{} lassoed", ids.len()));
            }
        });
        if let Some(message) = self.session.error_message(Panel::PointCloud) {
            ui.colored_label(Color32::from_rgb(236, 112, 99), message);
        }
    }

    fn handle_lasso(&mut self, rect: Rect, mapping: &SquareMapping, response: &egui::Response) {
        if !self.selection.lasso_mode() {
            return;
        }
        if response.drag_started_by(PointerButton::Primary) {
            self.cloud.lasso_stroke.clear();
        }
        if response.dragged_by(PointerButton::Primary)
            && let Some(pointer) = response.interact_pointer_pos()
        {
            let vertex = to_projection(rect, mapping, pointer);
            let far_enough = self.cloud.lasso_stroke.last().is_none_or(|last| {
                let last = to_screen(rect, mapping, *last);
                last.distance(pointer) >= 2.0
            });
            if far_enough {
                self.cloud.lasso_stroke.push(vertex);
            }
        }
        if response.drag_stopped() && !self.cloud.lasso_stroke.is_empty() {
            let stroke = std::mem::take(&mut self.cloud.lasso_stroke);
            self.dispatch(Event::LassoCompleted(stroke));
        }
    }

    pub(in crate::app) fn draw_point_cloud(&mut self, ui: &mut Ui) {
        self.draw_cloud_toolbar(ui);

        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, Color32::from_rgb(19, 23, 29));

        if self.session.points.is_empty() {
            painter.text(
                rect.center(),
                Align2::CENTER_CENTER,
                "No points for this layer.",
                FontId::proportional(14.0),
                Color32::from_gray(180),
            );
            return;
        }

        let mapping = SquareMapping::compute(
            self.session.points.iter().map(|point| point.projected),
            rect.size(),
            DEFAULT_PADDING,
        );

        self.handle_lasso(rect, &mapping, &response);

        let hovered = response.hover_pos().and_then(|pointer| {
            self.session
                .points
                .iter()
                .map(|point| {
                    let distance = to_screen(rect, &mapping, point.projected).distance(pointer);
                    (point.id, distance)
                })
                .filter(|&(_, distance)| distance <= POINT_PICK_RADIUS)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(id, _)| id)
        });

        if response.clicked_by(PointerButton::Primary) && !self.selection.lasso_mode() {
            self.dispatch(match hovered {
                Some(id) => Event::PointClicked(id),
                None => Event::SelectionCleared,
            });
        }

        let highlight = Highlight::compute(
            &self.selection,
            self.graph.as_ref().map(|graph| &graph.snapshot),
        );
        let focus = highlight.has_focus();
        let comparison = self.selection.comparison();

        let mut ordered = self
            .session
            .points
            .iter()
            .map(|point| (highlight.point(point), point))
            .collect::<Vec<_>>();
        ordered.sort_by_key(|(emphasis, _)| *emphasis);

        for (emphasis, point) in ordered {
            let position = to_screen(rect, &mapping, point.projected);
            let bucket = comparison
                .filter(|_| emphasis >= Emphasis::Foreground)
                .and_then(|(pinned, compared)| classify(&point.categories, pinned, compared));
            let color = match bucket {
                Some(bucket) if emphasis == Emphasis::Foreground => bucket.color(),
                _ => emphasis_color(emphasis, focus),
            };
            painter.circle_filled(position, point_radius(emphasis), color);
        }

        if let Some(point) = self
            .selection
            .selected_point()
            .and_then(|id| self.session.points.get(id))
        {
            let position = to_screen(rect, &mapping, point.projected);
            painter.circle_stroke(
                position,
                POINT_PICK_RADIUS + 2.0,
                Stroke::new(1.6, SELECTED_COLOR),
            );
        }

        if self.selection.lasso_mode() && self.cloud.lasso_stroke.len() > 1 {
            let points = self
                .cloud
                .lasso_stroke
                .iter()
                .map(|vertex| to_screen(rect, &mapping, *vertex))
                .collect::<Vec<_>>();
            painter.add(Shape::closed_line(points, Stroke::new(1.5, SELECTED_COLOR)));
            ui.ctx().request_repaint();
        }

        if let Some(point) = hovered.and_then(|id| self.session.points.get(id)) {
            let position = to_screen(rect, &mapping, point.projected);
            painter.circle_stroke(position, POINT_PICK_RADIUS, Stroke::new(1.2, Color32::WHITE));
            let categories = point
                .categories
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            painter.text(
                rect.left_top() + vec2(10.0, 10.0),
                Align2::LEFT_TOP,
                format!("#{}  {}  |  {categories}", point.id, short_label(&point.label, 60)),
                FontId::proportional(13.0),
                Color32::from_gray(240),
            );
            ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
        }
    }
}
