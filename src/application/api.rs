//! Wire types for the JSON endpoints.
//!
//! Every endpoint answers with HTTP 200; request-level failures travel in the
//! response body's `err` field instead of a transport status.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::{FacetsOutcome, ListOutcome, SchemaOutcome, SearchOutcome};
use super::error::ServiceError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateRequest {
    #[serde(rename = "type")]
    pub content_type: String,
    pub language: String,
    /// Explicit slug; mutually exclusive with deriving one from `slug_text`.
    pub slug: String,
    /// Human text the slug is derived from when `slug` is empty.
    pub slug_text: String,
    pub content: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReadRequest {
    #[serde(rename = "type")]
    pub content_type: String,
    pub language: String,
    pub slug: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateRequest {
    #[serde(rename = "type")]
    pub content_type: String,
    pub language: String,
    pub slug: String,
    pub content: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeleteRequest {
    #[serde(rename = "type")]
    pub content_type: String,
    pub language: String,
    pub slug: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    #[serde(rename = "type")]
    pub content_type: String,
    pub language: String,
    pub query: String,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FacetsRequest {
    #[serde(rename = "type")]
    pub content_type: String,
    pub language: String,
    pub query: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListRequest {
    #[serde(rename = "type")]
    pub content_type: String,
    pub language: String,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchemaRequest {}

/// Envelope for single-document operations.
#[derive(Debug, Serialize)]
pub struct ItemResponse {
    #[serde(rename = "type")]
    pub content_type: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl ItemResponse {
    pub fn from_result(
        content_type: &str,
        language: &str,
        result: Result<Value, ServiceError>,
    ) -> Self {
        match result {
            Ok(content) => Self {
                content_type: content_type.to_string(),
                language: language.to_string(),
                content: Some(content),
                err: None,
            },
            Err(err) => Self {
                content_type: content_type.to_string(),
                language: language.to_string(),
                content: None,
                err: Some(err.to_string()),
            },
        }
    }

    pub fn failure(content_type: &str, language: &str, err: String) -> Self {
        Self {
            content_type: content_type.to_string(),
            language: language.to_string(),
            content: None,
            err: Some(err),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub total: usize,
    pub hits: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl SearchResponse {
    pub fn from_result(result: Result<SearchOutcome, ServiceError>) -> Self {
        match result {
            Ok(outcome) => Self {
                total: outcome.total,
                hits: outcome.hits.into_iter().map(Value::Object).collect(),
                err: None,
            },
            Err(err) => Self {
                total: 0,
                hits: Vec::new(),
                err: Some(err.to_string()),
            },
        }
    }

    pub fn failure(err: String) -> Self {
        Self {
            total: 0,
            hits: Vec::new(),
            err: Some(err),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FacetsResponse {
    pub facets: crate::infra::index::FacetCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl FacetsResponse {
    pub fn from_result(result: Result<FacetsOutcome, ServiceError>) -> Self {
        match result {
            Ok(outcome) => Self {
                facets: outcome.counts,
                err: None,
            },
            Err(err) => Self {
                facets: Default::default(),
                err: Some(err.to_string()),
            },
        }
    }

    pub fn failure(err: String) -> Self {
        Self {
            facets: Default::default(),
            err: Some(err),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub total: u64,
    pub items: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl ListResponse {
    pub fn from_result(result: Result<ListOutcome, ServiceError>) -> Self {
        match result {
            Ok(outcome) => Self {
                total: outcome.total,
                items: outcome.items.into_iter().map(Value::Object).collect(),
                err: None,
            },
            Err(err) => Self {
                total: 0,
                items: Vec::new(),
                err: Some(err.to_string()),
            },
        }
    }

    pub fn failure(err: String) -> Self {
        Self {
            total: 0,
            items: Vec::new(),
            err: Some(err),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub types: Vec<String>,
    pub languages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl SchemaResponse {
    pub fn from_outcome(outcome: SchemaOutcome) -> Self {
        Self {
            types: outcome.types,
            languages: outcome.languages,
            err: None,
        }
    }
}
