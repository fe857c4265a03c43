use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hasher;

/// What the sender wants done with a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DistributionType {
    Report,
    Update,
    Cancel,
    Other(String),
}

impl DistributionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Report => "Report",
            Self::Update => "Update",
            Self::Cancel => "Cancel",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for DistributionType {
    fn from(name: String) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "report" => Self::Report,
            "update" => Self::Update,
            "cancel" => Self::Cancel,
            _ => Self::Other(name),
        }
    }
}

impl From<DistributionType> for String {
    fn from(kind: DistributionType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for DistributionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named list of terms, e.g. a keyword or role list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValueList {
    pub urn: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonXmlContent {
    pub mime_type: String,
    pub uri: Option<String>,
}

/// One payload carried by a message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContentObject {
    pub description: String,
    pub keywords: Vec<ValueList>,
    /// Standalone XML documents, one per embedded element.
    pub embedded_xml: Vec<String>,
    pub non_xml: Option<NonXmlContent>,
}

/// The distribution envelope: routing metadata plus content objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionElement {
    pub distribution_id: String,
    pub sender_id: String,
    pub sent_at: DateTime<Utc>,
    pub status: String,
    pub distribution_type: DistributionType,
    pub combined_confidentiality: Option<String>,
    pub language: Option<String>,
    pub sender_roles: Vec<ValueList>,
    pub recipient_roles: Vec<ValueList>,
    pub keywords: Vec<ValueList>,
    pub content_objects: Vec<ContentObject>,
}

impl DistributionElement {
    pub fn message_id(&self) -> i32 {
        hasher::message_id(&self.sender_id, &self.distribution_id)
    }

    pub fn content_id(&self, content: &ContentObject) -> i32 {
        hasher::content_id(&self.sender_id, &self.distribution_id, &content.description)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Read-optimised projection of one content object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeedContentView {
    pub title: String,
    pub friendly_name: String,
    pub description: String,
    pub icon_url: String,
    pub image_url: String,
    pub location: Option<GeoPoint>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A content object with everything the store needs precomputed.
#[derive(Debug, Clone)]
pub struct PreparedContent {
    pub id: i32,
    pub expires_at: DateTime<Utc>,
    pub payload: String,
    pub object: ContentObject,
    pub view: FeedContentView,
}

/// A parsed message ready to be written in a single transaction.
#[derive(Debug, Clone)]
pub struct PreparedMessage {
    pub id: i32,
    pub envelope: DistributionElement,
    pub body: String,
    pub items: Vec<PreparedContent>,
}
