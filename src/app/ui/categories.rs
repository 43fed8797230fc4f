use eframe::egui::{self, Color32, RichText, Ui};

use crate::comparison::Bucket;
use crate::selection::Event;
use crate::session::{CategoryRow, Panel};
use crate::util::{format_percentage, short_label};

use super::super::ViewModel;

const ROW_HEIGHT: f32 = 22.0;

impl ViewModel {
    fn category_text(&self, row: &CategoryRow) -> RichText {
        let mut text = format!("{}  ({})", short_label(&row.category, 32), row.count);
        if let Some(overlap) = row.overlap {
            text.push_str(&format!(
                "  · {} / {}",
                overlap.overlap_count,
                format_percentage(overlap.overlap_percentage)
            ));
        }

        let category = Some(row.category.as_str());
        let text = RichText::new(text);
        if self.selection.comparison().is_some() {
            if category == self.selection.pinned() {
                return text.color(Bucket::PinnedOnly.color()).strong();
            }
            if category == self.selection.compared() {
                return text.color(Bucket::ComparedOnly.color()).strong();
            }
        }
        if category == self.selection.category_filter() || category == self.selection.pinned() {
            text.strong()
        } else {
            text
        }
    }

    pub(in crate::app) fn draw_categories(&mut self, ui: &mut Ui) {
        ui.heading("Categories");
        ui.separator();

        ui.horizontal_wrapped(|ui| match self.selection.comparison() {
            Some((pinned, compared)) => {
                ui.label(RichText::new(pinned).color(Bucket::PinnedOnly.color()));
                ui.label("vs");
                ui.label(RichText::new(compared).color(Bucket::ComparedOnly.color()));
            }
            None => match (self.selection.pinned(), self.selection.category_filter()) {
                (Some(pinned), _) => {
                    ui.label(format!("Pinned: {pinned}. Click another category to compare."));
                }
                (None, Some(category)) => {
                    ui.label(format!("Filter: {category}"));
                }
                (None, None) => {
                    ui.label("Click to filter, pin to compare.");
                }
            },
        });
        if self.selection.compared().is_some() && ui.button("Clear comparison").clicked() {
            self.dispatch(Event::ComparisonCleared);
        }

        if let Some(message) = self.session.error_message(Panel::Categories) {
            ui.colored_label(Color32::from_rgb(236, 112, 99), message);
        }
        ui.add_space(4.0);

        let rows = self.session.category_rows(self.selection.pinned());
        let mut pending = None;

        egui::ScrollArea::vertical()
            .id_salt("category_rows_scroll")
            .auto_shrink([false, false])
            .show_rows(ui, ROW_HEIGHT, rows.len(), |ui, row_range| {
                for index in row_range {
                    let Some(row) = rows.get(index) else {
                        continue;
                    };
                    let category = Some(row.category.as_str());
                    let active = category == self.selection.category_filter()
                        || category == self.selection.pinned()
                        || category == self.selection.compared();
                    let pinned = category == self.selection.pinned();

                    ui.horizontal(|ui| {
                        if ui
                            .selectable_label(pinned, "📌")
                            .on_hover_text(if pinned { "Unpin" } else { "Pin for comparison" })
                            .clicked()
                        {
                            pending = Some(Event::PinToggled(row.category.clone()));
                        }
                        if ui
                            .selectable_label(active, self.category_text(row))
                            .on_hover_text(row.category.as_str())
                            .clicked()
                        {
                            pending = Some(Event::CategoryClicked(row.category.clone()));
                        }
                    });
                }
            });

        if let Some(event) = pending {
            self.dispatch(event);
        }
    }
}
