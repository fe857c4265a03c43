use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Messages --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: i32,
    pub distribution_id: String,
    pub sender_id: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(flatten)]
    pub summary: MessageSummary,
    pub body: String,
    pub delete_pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnType {
    #[default]
    Lite,
    Full,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub return_type: ReturnType,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SearchResults {
    Lite(Vec<MessageSummary>),
    Full(Vec<MessageRecord>),
}

/// Patch for the geolocation and timing fields of a single-content message.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PositionUpdate {
    pub lookup_id: Option<i32>,
    pub date_time_sent: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
    pub cylinder_radius: Option<f64>,
    pub cylinder_half_height: Option<f64>,
    pub date_time_start: DateTime<Utc>,
    pub date_time_stale: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteReport {
    pub deleted: usize,
}

// -- Feeds --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFeedRequest {
    pub id: Option<i32>,
    pub source_id: Option<String>,
    pub source_value: Option<String>,
    pub view_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedResponse {
    pub id: i32,
    pub content_ids: Vec<i32>,
    pub source_id: Option<String>,
    pub source_value: Option<String>,
    pub view_name: Option<String>,
}

// -- Rules --

/// A (list, value) pair naming a feed, e.g. `{"id": "urn:x", "value": "red"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceValueRef {
    pub id: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedRuleRequest {
    #[serde(default)]
    pub element_name: String,
    pub source_id: String,
    pub source_value: String,
    #[serde(default)]
    pub feeds: Vec<SourceValueRef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FederationRuleRequest {
    #[serde(default)]
    pub element_name: String,
    pub source_id: String,
    pub source_value: String,
    #[serde(default)]
    pub federation_uris: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResponse {
    pub id: i32,
    pub element_name: String,
    pub source_id: String,
    pub source_value: String,
    pub feed_ids: Vec<i32>,
    pub federation_uris: Vec<String>,
}

// -- Source values --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceValueListRequest {
    pub id: String,
    pub values: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceValueRequest {
    pub id: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceValueResponse {
    pub id: i32,
    pub list_id: i32,
    pub source_id: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceValueListResponse {
    pub id: i32,
    pub source_id: String,
    pub values: Vec<SourceValueResponse>,
}

// -- View content --

/// One feed-content row keyed by column name.
pub type ViewRow = serde_json::Map<String, serde_json::Value>;
