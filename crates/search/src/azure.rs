//! Azure AI Search client over the REST API.
//!
//! Issues `POST {endpoint}/indexes/{index}/docs/search` with the query key
//! in the `api-key` header. Text, filter, vector and semantic clauses map
//! one-to-one onto the request body; results are read from `value` using
//! the configured field names.

use async_trait::async_trait;
use groundchat_config::SearchConfig;
use groundchat_core::error::SearchError;
use groundchat_core::search::{Passage, Ranking, SearchClient, SearchRequest};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

/// Client for one Azure AI Search index.
pub struct AzureSearchClient {
    endpoint: String,
    index: String,
    api_key: Option<String>,
    api_version: String,
    sourcepage_field: String,
    content_field: String,
    client: reqwest::Client,
}

impl AzureSearchClient {
    pub fn new(endpoint: impl Into<String>, index: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            index: index.into(),
            api_key,
            api_version: "2023-11-01".into(),
            sourcepage_field: "sourcepage".into(),
            content_field: "content".into(),
            client,
        }
    }

    /// Build from the `[search]` configuration section.
    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        let endpoint = config.endpoint.as_deref().ok_or_else(|| {
            SearchError::NotConfigured("No search endpoint configured (set AZURE_SEARCH_ENDPOINT)".into())
        })?;

        let mut client = Self::new(endpoint, &config.index, config.api_key.clone());
        client.api_version = config.api_version.clone();
        client.sourcepage_field = config.sourcepage_field.clone();
        client.content_field = config.content_field.clone();
        Ok(client)
    }

    fn url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.endpoint, self.index, self.api_version
        )
    }

    /// Translate a request into the service's JSON body.
    fn request_body(&self, request: &SearchRequest) -> Value {
        let mut body = Map::new();

        if let Some(text) = &request.text {
            body.insert("search".into(), json!(text));
        }
        if let Some(filter) = &request.filter {
            body.insert("filter".into(), json!(filter));
        }
        body.insert("top".into(), json!(request.top));

        if let Ranking::Semantic {
            query_language,
            query_speller,
            configuration,
            captions,
        } = &request.ranking
        {
            body.insert("queryType".into(), json!("semantic"));
            body.insert("semanticConfiguration".into(), json!(configuration));
            body.insert("queryLanguage".into(), json!(query_language));
            body.insert("speller".into(), json!(query_speller));
            if *captions {
                body.insert("captions".into(), json!("extractive|highlight-false"));
            }
        }

        if !request.vectors.is_empty() {
            let clauses: Vec<Value> = request
                .vectors
                .iter()
                .map(|v| {
                    json!({
                        "kind": "vector",
                        "vector": v.vector,
                        "k": v.k,
                        "fields": v.field,
                    })
                })
                .collect();
            body.insert("vectorQueries".into(), Value::Array(clauses));
        }

        Value::Object(body)
    }

    /// Read passages out of a response body, preserving service order.
    fn parse_response(&self, body: &Value) -> Result<Vec<Passage>, SearchError> {
        let results = body
            .get("value")
            .and_then(Value::as_array)
            .ok_or_else(|| SearchError::Decode("response has no 'value' array".into()))?;

        results
            .iter()
            .map(|doc| {
                let source_id = doc
                    .get(&self.sourcepage_field)
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        SearchError::Decode(format!("result missing '{}' field", self.sourcepage_field))
                    })?
                    .to_string();

                let content = doc
                    .get(&self.content_field)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();

                let captions = doc.get("@search.captions").and_then(Value::as_array).map(|caps| {
                    caps.iter()
                        .filter_map(|c| c.get("text").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                });

                Ok(Passage {
                    source_id,
                    content,
                    captions,
                    score: doc.get("@search.score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
                    reranker_score: doc
                        .get("@search.rerankerScore")
                        .and_then(Value::as_f64)
                        .map(|s| s as f32),
                })
            })
            .collect()
    }
}

#[async_trait]
impl SearchClient for AzureSearchClient {
    fn name(&self) -> &str {
        "azure"
    }

    async fn search(&self, request: SearchRequest) -> Result<Vec<Passage>, SearchError> {
        let body = self.request_body(&request);
        debug!(index = %self.index, top = request.top, vectors = request.vectors.len(), "Azure search request");

        let mut builder = self.client.post(self.url()).header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }

        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let message = response.text().await.unwrap_or_default();
            warn!(index = %self.index, status, body = %message, "Search service returned error");
            return Err(SearchError::Api { status_code: status, message });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;
        self.parse_response(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundchat_core::search::VectorQuery;

    fn client() -> AzureSearchClient {
        AzureSearchClient::new("https://demo.search.windows.net/", "gptkbindex", Some("key".into()))
    }

    fn request() -> SearchRequest {
        SearchRequest {
            text: Some("cardio coverage".into()),
            filter: Some("category eq 'benefits'".into()),
            vectors: vec![],
            top: 3,
            ranking: Ranking::Simple,
        }
    }

    #[test]
    fn url_includes_index_and_version() {
        assert_eq!(
            client().url(),
            "https://demo.search.windows.net/indexes/gptkbindex/docs/search?api-version=2023-11-01"
        );
    }

    #[test]
    fn from_config_requires_endpoint() {
        assert!(matches!(
            AzureSearchClient::from_config(&SearchConfig::default()),
            Err(SearchError::NotConfigured(_))
        ));
    }

    #[test]
    fn from_config_reads_fields() {
        let config = SearchConfig {
            endpoint: Some("https://x.search.windows.net".into()),
            content_field: "chunk".into(),
            ..SearchConfig::default()
        };
        let client = AzureSearchClient::from_config(&config).unwrap();
        assert_eq!(client.content_field, "chunk");
        assert_eq!(client.index, config.index);
    }

    #[test]
    fn simple_body() {
        let body = client().request_body(&request());
        assert_eq!(body["search"], "cardio coverage");
        assert_eq!(body["filter"], "category eq 'benefits'");
        assert_eq!(body["top"], 3);
        assert!(body.get("queryType").is_none());
        assert!(body.get("vectorQueries").is_none());
    }

    #[test]
    fn text_omitted_when_absent() {
        let mut req = request();
        req.text = None;
        req.filter = None;
        let body = client().request_body(&req);
        assert!(body.get("search").is_none());
        assert!(body.get("filter").is_none());
    }

    #[test]
    fn semantic_body_with_captions_and_vectors() {
        let mut req = request();
        req.ranking = Ranking::Semantic {
            query_language: "en-us".into(),
            query_speller: "lexicon".into(),
            configuration: "default".into(),
            captions: true,
        };
        req.vectors = vec![VectorQuery { vector: vec![0.5, 0.25], k: 50, field: "embedding".into() }];

        let body = client().request_body(&req);
        assert_eq!(body["queryType"], "semantic");
        assert_eq!(body["semanticConfiguration"], "default");
        assert_eq!(body["queryLanguage"], "en-us");
        assert_eq!(body["speller"], "lexicon");
        assert_eq!(body["captions"], "extractive|highlight-false");
        assert_eq!(body["vectorQueries"][0]["kind"], "vector");
        assert_eq!(body["vectorQueries"][0]["k"], 50);
        assert_eq!(body["vectorQueries"][0]["fields"], "embedding");
        assert_eq!(body["vectorQueries"][0]["vector"][1], 0.25);
    }

    #[test]
    fn semantic_without_captions() {
        let mut req = request();
        req.ranking = Ranking::Semantic {
            query_language: "en-us".into(),
            query_speller: "lexicon".into(),
            configuration: "default".into(),
            captions: false,
        };
        assert!(client().request_body(&req).get("captions").is_none());
    }

    #[test]
    fn parses_captured_response() {
        let payload = json!({
            "@odata.context": "https://demo.search.windows.net/indexes('gptkbindex')/$metadata#docs(*)",
            "value": [
                {
                    "@search.score": 0.03,
                    "@search.rerankerScore": 2.75,
                    "@search.captions": [
                        { "text": "Cardio is covered under Northwind Plus.", "highlights": "" }
                    ],
                    "id": "file-Benefit_Options_pdf-42656E656669745F4F7074696F6E732E706466-page-2",
                    "content": "Northwind Plus covers cardio\nand dental.",
                    "category": null,
                    "sourcepage": "Benefit_Options-3.pdf",
                    "sourcefile": "Benefit_Options.pdf"
                },
                {
                    "@search.score": 0.02,
                    "content": "Standard plan details.",
                    "sourcepage": "Benefit_Options-4.pdf"
                }
            ]
        });

        let passages = client().parse_response(&payload).unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].source_id, "Benefit_Options-3.pdf");
        assert_eq!(passages[0].content, "Northwind Plus covers cardio\nand dental.");
        assert_eq!(
            passages[0].captions.as_deref(),
            Some(&["Cardio is covered under Northwind Plus.".to_string()][..])
        );
        assert_eq!(passages[0].reranker_score, Some(2.75));
        assert!(passages[1].captions.is_none());
        assert!(passages[1].reranker_score.is_none());
        assert!((passages[1].score - 0.02).abs() < 1e-6);
    }

    #[test]
    fn missing_value_array_is_decode_error() {
        let err = client().parse_response(&json!({"error": "x"})).unwrap_err();
        assert!(matches!(err, SearchError::Decode(_)));
    }

    #[test]
    fn missing_sourcepage_is_decode_error() {
        let payload = json!({ "value": [ { "content": "orphan" } ] });
        assert!(matches!(client().parse_response(&payload), Err(SearchError::Decode(_))));
    }
}
