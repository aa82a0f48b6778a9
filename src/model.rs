//! Response envelope shared by every platform endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::skip_serializing_none;

/// Standard platform response body.
///
/// All fields are optional; fields the envelope does not name are kept in
/// `extra` so the body reaches the caller unmodified.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope<T = Value> {
    pub success: Option<bool>,
    pub data: Option<T>,
    pub error: Option<Value>,
    pub meta: Option<PageMeta>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl<T> Default for ResponseEnvelope<T> {
    fn default() -> Self {
        Self {
            success: None,
            data: None,
            error: None,
            meta: None,
            extra: Map::new(),
        }
    }
}

impl<T> ResponseEnvelope<T> {
    /// Take the payload out of the envelope.
    pub fn into_data(self) -> Option<T> {
        self.data
    }
}

/// Pagination fields carried in `meta`.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub total: Option<u64>,
    pub total_pages: Option<u64>,
    pub has_more: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
