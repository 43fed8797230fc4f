use std::collections::{BTreeMap, BTreeSet};

use eframe::egui::pos2;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::GraphResponse;
use super::model::{
    CategoryCount, ConceptDataset, ConceptMatches, DataPoint, GraphEdge, GraphNode, GraphSnapshot,
    LayerData, Neighbor, Overlap, PointTable, RankedOverlap,
};
use crate::error::{ExplorerError, ExplorerResult};

#[derive(Clone, Debug, Deserialize)]
struct RawFeature {
    index: u32,
    #[serde(default)]
    umap_coordinates: Option<Vec<f32>>,
    #[serde(default)]
    all_categories: Vec<String>,
    #[serde(default)]
    concept: Vec<String>,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct RawCategoryCount {
    category: String,
    #[serde(default)]
    count: usize,
}

#[derive(Clone, Debug, Deserialize)]
struct RawLayerData {
    #[serde(default)]
    saes: Vec<RawFeature>,
    #[serde(default)]
    category_distribution: Vec<RawCategoryCount>,
    #[serde(default)]
    total_concepts: Option<usize>,
}

#[derive(Clone, Debug, Deserialize)]
struct RawNode {
    id: u32,
    #[serde(default)]
    sae_indices: Vec<u32>,
}

#[derive(Clone, Debug, Deserialize)]
struct RawEdge {
    source: u32,
    target: u32,
    #[serde(default)]
    common_saes: Vec<u32>,
}

#[derive(Clone, Debug, Deserialize)]
struct RawGraph {
    #[serde(default)]
    nodes: Vec<RawNode>,
    #[serde(default)]
    edges: Vec<RawEdge>,
    #[serde(default)]
    computed_epsilon: Option<f32>,
    #[serde(default)]
    used_epsilon: Option<f32>,
    #[serde(default)]
    total_saes: usize,
}

#[derive(Clone, Debug, Deserialize)]
struct RawNeighbor {
    #[serde(alias = "id")]
    index: u32,
    similarity: f32,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    concepts: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct RawNeighbors {
    #[serde(default)]
    nearest_saes: Vec<RawNeighbor>,
}

#[derive(Clone, Debug, Deserialize)]
struct RawConcepts {
    #[serde(default)]
    concepts: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct RawConceptSearch {
    #[serde(default)]
    matching_sae_indices: Vec<u32>,
    #[serde(default)]
    category_distribution: Vec<RawCategoryCount>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
struct RawOverlap {
    #[serde(default)]
    overlap_count: usize,
    #[serde(default)]
    overlap_percentage: f32,
}

#[derive(Clone, Debug, Deserialize)]
struct RawOverlaps {
    #[serde(default)]
    overlaps: BTreeMap<String, RawOverlap>,
}

#[derive(Clone, Debug, Deserialize)]
struct RawRankedOverlap {
    category: String,
    #[serde(default)]
    count: usize,
    #[serde(default)]
    overlap_count: usize,
    #[serde(default)]
    overlap_percentage: f32,
}

#[derive(Clone, Debug, Deserialize)]
struct RawPinnedOverlaps {
    #[serde(default)]
    ordered_categories: Vec<RawRankedOverlap>,
}

#[derive(Clone, Debug, Deserialize)]
struct RawConceptDataset {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Clone, Debug, Deserialize)]
struct RawError {
    error: String,
}

fn decode<T: DeserializeOwned>(endpoint: &str, raw: &str) -> ExplorerResult<T> {
    serde_json::from_str(raw).map_err(|error| ExplorerError::decode(endpoint, error.to_string()))
}

fn feature_label(index: u32, explanation: Option<String>, concepts: &[String]) -> String {
    match explanation {
        Some(text) if !text.trim().is_empty() => text.trim().to_owned(),
        _ if !concepts.is_empty() => {
            concepts.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
        }
        _ => format!("feature {index}"),
    }
}

fn category_counts(raw: Vec<RawCategoryCount>) -> Vec<CategoryCount> {
    raw.into_iter()
        .map(|entry| CategoryCount {
            category: entry.category,
            count: entry.count,
        })
        .collect()
}

/// Server-side error text from a non-2xx body, if it has one.
pub(super) fn error_message(raw: &str) -> Option<String> {
    serde_json::from_str::<RawError>(raw)
        .ok()
        .map(|parsed| parsed.error)
}

pub(super) fn parse_layer_data(raw: &str) -> ExplorerResult<LayerData> {
    let parsed: RawLayerData = decode("layer-data", raw)?;

    let mut points = Vec::with_capacity(parsed.saes.len());
    let mut missing_coordinates = 0usize;
    for feature in parsed.saes {
        let Some([x, y]) = feature
            .umap_coordinates
            .as_deref()
            .and_then(|coords| <[f32; 2]>::try_from(coords).ok())
        else {
            missing_coordinates += 1;
            continue;
        };
        if !x.is_finite() || !y.is_finite() {
            missing_coordinates += 1;
            continue;
        }

        let label = feature_label(feature.index, feature.explanation, &feature.concept);
        points.push(DataPoint {
            id: feature.index,
            projected: pos2(x, y),
            categories: feature.all_categories.into_iter().collect::<BTreeSet<_>>(),
            label,
            concepts: feature.concept,
        });
    }

    if missing_coordinates > 0 {
        log::warn!("skipped {missing_coordinates} features without projected coordinates");
    }
    if points.is_empty() {
        return Err(ExplorerError::empty("projected features"));
    }

    Ok(LayerData {
        points: PointTable::new(points),
        category_distribution: category_counts(parsed.category_distribution),
        total_concepts: parsed.total_concepts,
    })
}

pub(super) fn parse_graph(raw: &str) -> ExplorerResult<GraphResponse> {
    let parsed: RawGraph = decode("ballmapper", raw)?;
    if parsed.nodes.is_empty() {
        return Err(ExplorerError::empty("graph nodes"));
    }

    let nodes = parsed
        .nodes
        .into_iter()
        .map(|node| GraphNode {
            id: node.id,
            members: node.sae_indices,
        })
        .collect();
    let edges = parsed
        .edges
        .into_iter()
        .map(|edge| GraphEdge {
            a: edge.source,
            b: edge.target,
            shared: edge.common_saes.into_iter().collect(),
        })
        .collect();
    let radius = parsed
        .used_epsilon
        .or(parsed.computed_epsilon)
        .unwrap_or_default();

    Ok(GraphResponse {
        snapshot: GraphSnapshot::normalized(nodes, edges, radius),
        computed_epsilon: parsed.computed_epsilon,
        total_points: parsed.total_saes,
    })
}

pub(super) fn parse_neighbors(raw: &str) -> ExplorerResult<Vec<Neighbor>> {
    let parsed: RawNeighbors = decode("nearest-saes", raw)?;
    Ok(parsed
        .nearest_saes
        .into_iter()
        .map(|neighbor| {
            let label = match neighbor.label {
                Some(label) => label,
                None => feature_label(neighbor.index, neighbor.explanation, &neighbor.concepts),
            };
            Neighbor {
                id: neighbor.index,
                similarity: neighbor.similarity,
                label,
            }
        })
        .collect())
}

pub(super) fn parse_concepts(raw: &str) -> ExplorerResult<Vec<String>> {
    let parsed: RawConcepts = decode("concepts", raw)?;
    Ok(parsed.concepts)
}

pub(super) fn parse_concept_matches(concept: &str, raw: &str) -> ExplorerResult<ConceptMatches> {
    let parsed: RawConceptSearch = decode("search-concept", raw)?;
    Ok(ConceptMatches {
        concept: concept.to_owned(),
        matches: parsed.matching_sae_indices,
        category_distribution: category_counts(parsed.category_distribution),
    })
}

pub(super) fn parse_overlaps(raw: &str) -> ExplorerResult<BTreeMap<String, Overlap>> {
    let parsed: RawOverlaps = decode("category-overlaps", raw)?;
    Ok(parsed
        .overlaps
        .into_iter()
        .map(|(category, overlap)| {
            (
                category,
                Overlap {
                    overlap_count: overlap.overlap_count,
                    overlap_percentage: overlap.overlap_percentage,
                },
            )
        })
        .collect())
}

pub(super) fn parse_pinned_overlaps(raw: &str) -> ExplorerResult<Vec<RankedOverlap>> {
    let parsed: RawPinnedOverlaps = decode("pinned-category-overlaps", raw)?;
    let mut ranked = parsed
        .ordered_categories
        .into_iter()
        .map(|entry| RankedOverlap {
            category: entry.category,
            count: entry.count,
            overlap: Overlap {
                overlap_count: entry.overlap_count,
                overlap_percentage: entry.overlap_percentage,
            },
        })
        .collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.overlap.overlap_count.cmp(&a.overlap.overlap_count));
    Ok(ranked)
}

pub(super) fn parse_concept_datasets(raw: &str) -> ExplorerResult<Vec<ConceptDataset>> {
    let parsed: Vec<RawConceptDataset> = decode("concept-datasets", raw)?;
    Ok(parsed
        .into_iter()
        .map(|entry| ConceptDataset {
            name: if entry.name.is_empty() {
                entry.id.clone()
            } else {
                entry.name
            },
            id: entry.id,
            description: entry.description,
        })
        .collect())
}
