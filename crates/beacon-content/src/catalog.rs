use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::ContentError;

/// Icon files available to the extractor, organised by set and detail kind.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IconCatalog {
    #[serde(default)]
    pub sets: Vec<IconSet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IconSet {
    pub kind: String,
    #[serde(default)]
    pub groups: Vec<IconGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IconGroup {
    pub kind: String,
    pub root_folder: String,
    #[serde(default)]
    pub filenames: Vec<String>,
}

impl IconCatalog {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ContentError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Finds the icon for an underscore-delimited type code, dropping trailing
    /// segments until a `<prefix>.png` file exists in the group.
    pub fn resolve(&self, set: &str, group: &str, type_code: &str) -> Option<String> {
        let group = self
            .sets
            .iter()
            .find(|s| s.kind.eq_ignore_ascii_case(set))?
            .groups
            .iter()
            .find(|g| g.kind.eq_ignore_ascii_case(group))?;

        let segments: Vec<&str> = type_code.split('_').collect();
        for len in (0..=segments.len()).rev() {
            let candidate = format!("{}.png", segments[..len].join("_"));
            debug!(%candidate, group = %group.kind, "searching icon");
            if group.filenames.iter().any(|f| *f == candidate) {
                return Some(format!("{}/{candidate}", group.root_folder));
            }
        }
        None
    }
}

/// Event type code to human-readable name. Codes are keyed in dotted form
/// (`ATOM.GRDTRK.EQT`), the way the reference table publishes them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct TypeCodeCatalog {
    names: HashMap<String, String>,
}

impl TypeCodeCatalog {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ContentError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn lookup(&self, type_code: &str) -> Option<&str> {
        self.names.get(&type_code.replace('_', ".")).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
