use eframe::egui::{self, Color32, Key, RichText, Ui};
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use crate::layout::ANCHORED_EPSILON;
use crate::selection::Event;
use crate::session::Panel;

use super::super::ViewModel;

const MAX_SUGGESTIONS: usize = 8;
const ERROR_COLOR: Color32 = Color32::from_rgb(236, 112, 99);

/// Available concepts ranked against `query`, best first.
fn concept_suggestions<'a>(concepts: &'a [String], query: &str, limit: usize) -> Vec<&'a str> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }

    let matcher = SkimMatcherV2::default().ignore_case();
    let mut scored = concepts
        .iter()
        .filter_map(|concept| {
            matcher
                .fuzzy_match(concept, query)
                .map(|score| (score, concept.as_str()))
        })
        .collect::<Vec<_>>();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored.truncate(limit);
    scored.into_iter().map(|(_, concept)| concept).collect()
}

impl ViewModel {
    pub(in crate::app) fn draw_controls(&mut self, ui: &mut Ui) {
        ui.heading("Data");
        ui.separator();
        ui.add_space(4.0);

        ui.horizontal(|ui| {
            ui.label("Layer");
            ui.add(egui::DragValue::new(&mut self.draft.layer).range(0..=255));
        });
        ui.add(
            egui::Slider::new(&mut self.draft.threshold, 0.0..=1.0)
                .step_by(0.05)
                .text("Concept threshold"),
        )
        .on_hover_text("Minimum activation score for a concept to label a feature.");

        let selected_dataset = self
            .concept_datasets
            .iter()
            .find(|dataset| dataset.id == self.draft.concept_dataset)
            .map(|dataset| dataset.name.clone())
            .unwrap_or_else(|| self.draft.concept_dataset.clone());
        egui::ComboBox::from_label("Concept dataset")
            .selected_text(selected_dataset)
            .show_ui(ui, |ui| {
                for dataset in &self.concept_datasets {
                    ui.selectable_value(
                        &mut self.draft.concept_dataset,
                        dataset.id.clone(),
                        dataset.name.as_str(),
                    )
                    .on_hover_text(dataset.description.as_str());
                }
            });

        ui.add_space(8.0);
        ui.heading("Ball mapper");
        ui.separator();

        ui.horizontal(|ui| {
            ui.label("Max group size");
            ui.add(egui::DragValue::new(&mut self.draft.max_size).range(1..=500));
        });

        let mut override_epsilon = self.draft.epsilon.is_some();
        ui.horizontal(|ui| {
            if ui
                .checkbox(&mut override_epsilon, "Epsilon override")
                .changed()
            {
                self.draft.epsilon = override_epsilon.then(|| {
                    self.graph
                        .as_ref()
                        .and_then(|graph| graph.computed_epsilon)
                        .unwrap_or(0.1)
                });
            }
            if let Some(epsilon) = self.draft.epsilon.as_mut() {
                ui.add(
                    egui::DragValue::new(epsilon)
                        .speed(0.001)
                        .range(0.0001..=10.0)
                        .max_decimals(4),
                );
            }
        });
        if let Some(graph) = &self.graph {
            let epsilon = graph
                .computed_epsilon
                .unwrap_or_else(|| graph.snapshot.resolved_radius());
            ui.small(format!(
                "ε used: {epsilon:.4}  ({} of {} points)",
                graph.snapshot.nodes().iter().map(|node| node.size()).sum::<usize>(),
                graph.total_points
            ));
        }

        ui.add(
            egui::Slider::new(&mut self.draft.layout_mix, 0.0..=1.0)
                .step_by(0.01)
                .clamping(egui::SliderClamping::Always)
                .text("Layout mix"),
        )
        .on_hover_text("0 pins every node to its points' centroid; 1 is free force layout.");
        if self.draft.layout_mix <= ANCHORED_EPSILON {
            ui.small("Anchored: nodes sit over their points in the projection.");
        }

        self.apply_draft();

        ui.add_space(8.0);
        self.draw_concept_search(ui);
    }

    fn draw_concept_search(&mut self, ui: &mut Ui) {
        ui.heading("Concept search");
        ui.separator();

        let response = ui.add(
            egui::TextEdit::singleline(&mut self.concept_input)
                .hint_text("exact concept name"),
        );
        let mut submit = response.lost_focus() && ui.input(|input| input.key_pressed(Key::Enter));

        let suggestions =
            concept_suggestions(&self.session.concepts, &self.concept_input, MAX_SUGGESTIONS);
        let exact = self.session.has_concept(self.concept_input.trim());
        if !exact && !suggestions.is_empty() {
            let mut picked = None;
            ui.horizontal_wrapped(|ui| {
                for concept in &suggestions {
                    if ui.small_button(*concept).clicked() {
                        picked = Some((*concept).to_owned());
                    }
                }
            });
            if let Some(concept) = picked {
                self.concept_input = concept;
                submit = true;
            }
        }

        ui.horizontal(|ui| {
            if ui
                .add_enabled(!self.concept_input.trim().is_empty(), egui::Button::new("Search"))
                .clicked()
            {
                submit = true;
            }
            if self.selection.concept_search().is_some() && ui.button("Clear").clicked() {
                self.concept_input.clear();
                self.dispatch(Event::SelectionCleared);
            }
        });

        if submit {
            let query = self.concept_input.trim().to_owned();
            if !query.is_empty() {
                self.dispatch(Event::ConceptSubmitted(query));
            }
        }

        if let Some(query) = self.selection.pending_query() {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label(format!("Searching \"{query}\"..."));
            });
        } else if let Some(search) = self.selection.active_search() {
            ui.label(
                RichText::new(format!("\"{}\": {} matches", search.query, search.matches.len()))
                    .strong(),
            );
        } else if self.session.concepts.is_empty() {
            ui.small("Concept list is loading or empty.");
        } else {
            let total = self
                .session
                .total_concepts
                .unwrap_or(self.session.concepts.len());
            ui.small(format!("{total} concepts available."));
        }

        if let Some(message) = self.session.error_message(Panel::Concepts) {
            ui.colored_label(ERROR_COLOR, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concepts() -> Vec<String> {
        ["dog", "hot dog", "cat", "dogma", "bird"]
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn suggestions_rank_fuzzy_matches() {
        let concepts = concepts();
        let suggestions = concept_suggestions(&concepts, "dog", 10);
        assert!(suggestions.contains(&"dog"));
        assert!(suggestions.contains(&"hot dog"));
        assert!(suggestions.contains(&"dogma"));
        assert!(!suggestions.contains(&"cat"));
    }

    #[test]
    fn suggestions_are_capped_and_empty_for_blank_input() {
        let concepts = concepts();
        assert!(concept_suggestions(&concepts, "   ", 10).is_empty());
        assert_eq!(concept_suggestions(&concepts, "o", 2).len(), 2);
    }
}
