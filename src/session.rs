use std::collections::BTreeMap;

use crate::api::{CategoryCount, LayerData, Overlap, PointTable, RankedOverlap};
use crate::error::ExplorerError;

/// Identifies the dataset every cached response belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionKey {
    pub layer: u32,
    pub threshold: f32,
    pub concept_dataset: String,
}

impl SessionKey {
    pub fn describe(&self) -> String {
        format!(
            "layer {} / {} / threshold {:.2}",
            self.layer, self.concept_dataset, self.threshold
        )
    }
}

/// Panels that surface their own inline errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Panel {
    PointCloud,
    Graph,
    Categories,
    Concepts,
    Details,
}

/// Fetched results scoped to one `SessionKey`, dropped wholesale when it changes.
#[derive(Debug)]
pub struct Session {
    key: SessionKey,
    pub points: PointTable,
    pub category_distribution: Vec<CategoryCount>,
    pub concepts: Vec<String>,
    pub total_concepts: Option<usize>,
    /// Category counts among the matches of the last concept search.
    pub match_distribution: Option<(String, Vec<CategoryCount>)>,
    pub category_overlaps: Option<(String, BTreeMap<String, Overlap>)>,
    pub pinned_order: Option<(String, Vec<RankedOverlap>)>,
    errors: BTreeMap<Panel, ExplorerError>,
}

impl Session {
    pub fn new(key: SessionKey, data: LayerData) -> Self {
        let mut category_distribution = data.category_distribution;
        category_distribution.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.category.cmp(&b.category))
        });

        Self {
            key,
            points: data.points,
            category_distribution,
            concepts: Vec::new(),
            total_concepts: data.total_concepts,
            match_distribution: None,
            category_overlaps: None,
            pinned_order: None,
            errors: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn set_concepts(&mut self, mut concepts: Vec<String>) {
        concepts.sort();
        concepts.dedup();
        self.concepts = concepts;
    }

    pub fn has_concept(&self, concept: &str) -> bool {
        self.concepts
            .binary_search_by(|candidate| candidate.as_str().cmp(concept))
            .is_ok()
    }

    /// Records an error against one panel; silent errors are dropped.
    pub fn report(&mut self, panel: Panel, error: ExplorerError) {
        if error.is_silent() {
            return;
        }
        log::warn!("{panel:?}: {error}");
        self.errors.insert(panel, error);
    }

    pub fn clear_error(&mut self, panel: Panel) {
        self.errors.remove(&panel);
    }

    pub fn error_message(&self, panel: Panel) -> Option<String> {
        self.errors.get(&panel).and_then(ExplorerError::user_message)
    }

    /// Category rows in display order: pinned overlap ranking when available,
    /// otherwise by count.
    pub fn category_rows(&self, pinned: Option<&str>) -> Vec<CategoryRow> {
        if let (Some(pinned), Some((ranked_for, ranked))) = (pinned, &self.pinned_order)
            && ranked_for == pinned
        {
            let pinned_count = self
                .category_distribution
                .iter()
                .find(|entry| entry.category == pinned)
                .map(|entry| entry.count)
                .unwrap_or(0);
            let mut rows = vec![CategoryRow {
                category: pinned.to_owned(),
                count: pinned_count,
                overlap: None,
            }];
            rows.extend(ranked.iter().map(|entry| CategoryRow {
                category: entry.category.clone(),
                count: entry.count,
                overlap: Some(entry.overlap),
            }));
            return rows;
        }

        let overlaps = self.category_overlaps.as_ref().map(|(_, map)| map);
        self.category_distribution
            .iter()
            .map(|entry| CategoryRow {
                category: entry.category.clone(),
                count: entry.count,
                overlap: overlaps.and_then(|map| map.get(&entry.category).copied()),
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CategoryRow {
    pub category: String,
    pub count: usize,
    pub overlap: Option<Overlap>,
}
