mod http;
pub(crate) mod model;
mod parse;

use std::collections::BTreeMap;

use crate::error::ExplorerResult;
use crate::request::CancelToken;
use crate::session::SessionKey;

pub use http::{DEFAULT_TIMEOUT, HttpApi};
pub use model::{
    CategoryCount, ConceptDataset, ConceptMatches, DataPoint, GraphNode, GraphSnapshot,
    LayerData, Neighbor, NodeId, Overlap, PointId, PointTable, RankedOverlap,
};

#[derive(Clone, Debug, PartialEq)]
pub struct GraphQuery {
    pub key: SessionKey,
    pub max_size: u32,
    pub epsilon: Option<f32>,
    pub categories: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct GraphResponse {
    pub snapshot: GraphSnapshot,
    pub computed_epsilon: Option<f32>,
    pub total_points: usize,
}

/// Request/response contract of the clustering and statistics backend.
///
/// Every call is an idempotent read that can be abandoned through `cancel`.
pub trait DataApi: Send + Sync {
    fn layer_data(&self, key: &SessionKey, cancel: &CancelToken) -> ExplorerResult<LayerData>;

    fn ball_mapper_graph(
        &self,
        query: &GraphQuery,
        cancel: &CancelToken,
    ) -> ExplorerResult<GraphResponse>;

    fn nearest_neighbors(
        &self,
        key: &SessionKey,
        point: PointId,
        categories: &[String],
        cancel: &CancelToken,
    ) -> ExplorerResult<Vec<Neighbor>>;

    fn concepts(&self, key: &SessionKey, cancel: &CancelToken) -> ExplorerResult<Vec<String>>;

    fn search_concept(
        &self,
        key: &SessionKey,
        concept: &str,
        cancel: &CancelToken,
    ) -> ExplorerResult<ConceptMatches>;

    fn category_overlaps(
        &self,
        key: &SessionKey,
        category: &str,
        cancel: &CancelToken,
    ) -> ExplorerResult<BTreeMap<String, Overlap>>;

    fn pinned_category_overlaps(
        &self,
        key: &SessionKey,
        pinned: &str,
        cancel: &CancelToken,
    ) -> ExplorerResult<Vec<RankedOverlap>>;

    fn concept_datasets(&self, cancel: &CancelToken) -> ExplorerResult<Vec<ConceptDataset>>;
}

/// One category goes out as `category`, several as a JSON `categories` list.
pub(crate) fn category_params(categories: &[String]) -> Vec<(&'static str, String)> {
    match categories {
        [] => Vec::new(),
        [single] => vec![("category", single.clone())],
        many => {
            let encoded = serde_json::to_string(many).unwrap_or_else(|_| "[]".to_owned());
            vec![("categories", encoded)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_categories_send_no_filter() {
        assert!(category_params(&[]).is_empty());
    }

    #[test]
    fn single_category_uses_plain_parameter() {
        let params = category_params(&["Animal".to_owned()]);
        assert_eq!(params, vec![("category", "Animal".to_owned())]);
    }

    #[test]
    fn comparison_pair_is_sent_as_json_list() {
        let params = category_params(&["Animal".to_owned(), "Tool".to_owned()]);
        assert_eq!(
            params,
            vec![("categories", r#"["Animal","Tool"]"#.to_owned())]
        );
    }
}
