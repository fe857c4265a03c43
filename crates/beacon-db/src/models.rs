//! Database row types. These map directly to SQLite rows and convert into
//! the beacon-types API models at the edge.

use chrono::{DateTime, Utc};

use beacon_types::api::{
    FeedResponse, MessageRecord, MessageSummary, RuleResponse, SourceValueResponse,
};
use beacon_types::models::GeoPoint;

use crate::matcher::MatchTerms;

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub id: i32,
    pub distribution_id: String,
    pub sender_id: String,
    pub sent_at: DateTime<Utc>,
    pub distribution_type: String,
    pub body: String,
    pub delete_pending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentRow {
    pub id: i32,
    pub message_id: i32,
    pub expires_at: DateTime<Utc>,
    pub payload: String,
    pub terms: MatchTerms,
    pub feed_ids: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedContentRow {
    pub content_id: i32,
    pub message_id: i32,
    pub title: String,
    pub friendly_name: String,
    pub description: String,
    pub icon_url: String,
    pub image_url: String,
    pub location: Option<GeoPoint>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedRow {
    pub id: i32,
    pub source_id: Option<String>,
    pub source_value: Option<String>,
    pub view_name: Option<String>,
    pub content_ids: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleRow {
    pub id: i32,
    pub element_name: String,
    pub source_id: String,
    pub source_value: String,
    pub feed_ids: Vec<i32>,
    pub federation_uris: Vec<String>,
}

impl RuleRow {
    /// Registered but routing nowhere.
    pub fn is_inert(&self) -> bool {
        self.feed_ids.is_empty() && self.federation_uris.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceValueRow {
    pub id: i32,
    pub list_id: i32,
    pub source_id: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRow {
    pub seq: i64,
    pub message_id: i32,
    pub distribution_id: String,
    pub sender_id: String,
    pub sent_at: DateTime<Utc>,
    pub source_ip: String,
    pub logged_at: DateTime<Utc>,
    pub body: String,
}

// -- API conversions --

impl From<&MessageRow> for MessageSummary {
    fn from(row: &MessageRow) -> Self {
        Self {
            id: row.id,
            distribution_id: row.distribution_id.clone(),
            sender_id: row.sender_id.clone(),
            sent_at: row.sent_at,
        }
    }
}

impl From<MessageRow> for MessageRecord {
    fn from(row: MessageRow) -> Self {
        Self {
            summary: MessageSummary::from(&row),
            body: row.body,
            delete_pending: row.delete_pending,
        }
    }
}

impl From<FeedRow> for FeedResponse {
    fn from(row: FeedRow) -> Self {
        Self {
            id: row.id,
            content_ids: row.content_ids,
            source_id: row.source_id,
            source_value: row.source_value,
            view_name: row.view_name,
        }
    }
}

impl From<RuleRow> for RuleResponse {
    fn from(row: RuleRow) -> Self {
        Self {
            id: row.id,
            element_name: row.element_name,
            source_id: row.source_id,
            source_value: row.source_value,
            feed_ids: row.feed_ids,
            federation_uris: row.federation_uris,
        }
    }
}

impl From<SourceValueRow> for SourceValueResponse {
    fn from(row: SourceValueRow) -> Self {
        Self {
            id: row.id,
            list_id: row.list_id,
            source_id: row.source_id,
            value: row.value,
        }
    }
}
