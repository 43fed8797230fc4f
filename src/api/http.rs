use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::{Client, ClientBuilder};

use super::parse;
use super::{
    ConceptDataset, ConceptMatches, DataApi, GraphQuery, GraphResponse, LayerData, Neighbor,
    Overlap, PointId, RankedOverlap, category_params,
};
use crate::error::{ExplorerError, ExplorerResult};
use crate::request::CancelToken;
use crate::session::SessionKey;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// `DataApi` over blocking HTTP; every call runs on a request worker thread.
pub struct HttpApi {
    base_url: String,
    client: Client,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ExplorerResult<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|error| ExplorerError::network("client", error.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    fn get(
        &self,
        endpoint: &str,
        path: &str,
        params: &[(&str, String)],
        cancel: &CancelToken,
    ) -> ExplorerResult<String> {
        cancel.check()?;

        let response = self
            .client
            .get(self.url(path))
            .query(params)
            .send()
            .map_err(|error| ExplorerError::network(endpoint, error.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|error| ExplorerError::network(endpoint, error.to_string()))?;

        // A response that lands after cancellation is dropped unread.
        cancel.check()?;

        if !status.is_success() {
            let message = parse::error_message(&body).unwrap_or_else(|| format!("HTTP {status}"));
            return Err(ExplorerError::network(endpoint, message));
        }
        Ok(body)
    }
}

fn session_params(key: &SessionKey) -> Vec<(&'static str, String)> {
    vec![
        ("threshold", key.threshold.to_string()),
        ("concept_dataset_id", key.concept_dataset.clone()),
    ]
}

impl DataApi for HttpApi {
    fn layer_data(&self, key: &SessionKey, cancel: &CancelToken) -> ExplorerResult<LayerData> {
        let body = self.get(
            "layer-data",
            &format!("layer-data/{}", key.layer),
            &session_params(key),
            cancel,
        )?;
        parse::parse_layer_data(&body)
    }

    fn ball_mapper_graph(
        &self,
        query: &GraphQuery,
        cancel: &CancelToken,
    ) -> ExplorerResult<GraphResponse> {
        let mut params = session_params(&query.key);
        params.push(("max_size", query.max_size.max(1).to_string()));
        if let Some(epsilon) = query.epsilon {
            params.push(("epsilon", epsilon.to_string()));
        }
        params.extend(category_params(&query.categories));

        let body = self.get(
            "ballmapper",
            &format!("layer/{}/ballmapper", query.key.layer),
            &params,
            cancel,
        )?;
        parse::parse_graph(&body)
    }

    fn nearest_neighbors(
        &self,
        key: &SessionKey,
        point: PointId,
        categories: &[String],
        cancel: &CancelToken,
    ) -> ExplorerResult<Vec<Neighbor>> {
        let mut params = session_params(key);
        params.extend(category_params(categories));
        let body = self.get(
            "nearest-saes",
            &format!("nearest-saes/{}/{point}", key.layer),
            &params,
            cancel,
        )?;
        parse::parse_neighbors(&body)
    }

    fn concepts(&self, key: &SessionKey, cancel: &CancelToken) -> ExplorerResult<Vec<String>> {
        let body = self.get(
            "concepts",
            &format!("concepts/{}", key.layer),
            &session_params(key),
            cancel,
        )?;
        parse::parse_concepts(&body)
    }

    fn search_concept(
        &self,
        key: &SessionKey,
        concept: &str,
        cancel: &CancelToken,
    ) -> ExplorerResult<ConceptMatches> {
        let mut params = session_params(key);
        params.push(("concept", concept.to_owned()));
        let body = self.get(
            "search-concept",
            &format!("search-concept/{}", key.layer),
            &params,
            cancel,
        )?;
        parse::parse_concept_matches(concept, &body)
    }

    fn category_overlaps(
        &self,
        key: &SessionKey,
        category: &str,
        cancel: &CancelToken,
    ) -> ExplorerResult<BTreeMap<String, Overlap>> {
        let mut params = session_params(key);
        params.push(("category", category.to_owned()));
        let body = self.get(
            "category-overlaps",
            &format!("category-overlaps/{}", key.layer),
            &params,
            cancel,
        )?;
        parse::parse_overlaps(&body)
    }

    fn pinned_category_overlaps(
        &self,
        key: &SessionKey,
        pinned: &str,
        cancel: &CancelToken,
    ) -> ExplorerResult<Vec<RankedOverlap>> {
        let mut params = session_params(key);
        params.push(("pinned_category", pinned.to_owned()));
        let body = self.get(
            "pinned-category-overlaps",
            &format!("pinned-category-overlaps/{}", key.layer),
            &params,
            cancel,
        )?;
        parse::parse_pinned_overlaps(&body)
    }

    fn concept_datasets(&self, cancel: &CancelToken) -> ExplorerResult<Vec<ConceptDataset>> {
        let body = self.get("concept-datasets", "concept-datasets", &[], cancel)?;
        parse::parse_concept_datasets(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base_url: &str) -> HttpApi {
        HttpApi::new(base_url, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn urls_are_rooted_under_api() {
        assert_eq!(
            api("http://localhost:5001/").url("layer/4/ballmapper"),
            "http://localhost:5001/api/layer/4/ballmapper"
        );
    }

    #[test]
    fn cancelled_token_short_circuits_before_sending() {
        let token = CancelToken::new();
        token.cancel();

        let error = api("http://127.0.0.1:9").concept_datasets(&token).unwrap_err();
        assert_eq!(error, ExplorerError::CancelledRequest);
    }

    #[test]
    fn unreachable_service_is_a_network_failure() {
        // Port 1 on loopback refuses connections.
        let error = api("http://127.0.0.1:1")
            .concept_datasets(&CancelToken::new())
            .unwrap_err();
        assert!(matches!(error, ExplorerError::NetworkFailure { .. }));
    }
}
