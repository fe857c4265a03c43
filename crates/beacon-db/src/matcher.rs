//! Rule matching: which feeds a content item belongs to, and where a
//! message is federated.
//!
//! Rules are looked up by (list URN, term) through the `idx_rules_source`
//! index rather than scanning the table. The wildcard rule `("*", "*")`
//! matches everything.

use std::collections::HashSet;

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use beacon_types::hasher;
use beacon_types::models::{ContentObject, DistributionElement, ValueList};

use crate::models::RuleRow;
use crate::rules::{RULE_COLUMNS, map_rule, rule_in};
use crate::{Database, StoreResult, feeds};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Keyword,
    ContentKeyword,
    SenderRole,
    RecipientRole,
}

impl ListKind {
    /// Whether a rule with this `element_name` inspects lists of this kind.
    /// Unknown names inspect both keyword kinds.
    pub fn selected_by(self, element_name: &str) -> bool {
        match element_name.to_ascii_lowercase().as_str() {
            "keyword" => matches!(self, Self::Keyword | Self::ContentKeyword),
            "contentkeyword" => self == Self::ContentKeyword,
            "senderrole" => self == Self::SenderRole,
            "recipientrole" => self == Self::RecipientRole,
            _ => matches!(self, Self::Keyword | Self::ContentKeyword),
        }
    }
}

/// Every value list a rule may inspect for one content item. Stored with the
/// item so feed membership can be recomputed without reparsing the message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchTerms {
    #[serde(default)]
    pub keywords: Vec<ValueList>,
    #[serde(default)]
    pub content_keywords: Vec<ValueList>,
    #[serde(default)]
    pub sender_roles: Vec<ValueList>,
    #[serde(default)]
    pub recipient_roles: Vec<ValueList>,
}

impl MatchTerms {
    pub fn for_content(de: &DistributionElement, object: &ContentObject) -> Self {
        Self {
            keywords: de.keywords.clone(),
            content_keywords: object.keywords.clone(),
            sender_roles: de.sender_roles.clone(),
            recipient_roles: de.recipient_roles.clone(),
        }
    }

    fn lists(&self) -> impl Iterator<Item = (ListKind, &ValueList)> {
        tagged(ListKind::Keyword, &self.keywords)
            .chain(tagged(ListKind::ContentKeyword, &self.content_keywords))
            .chain(tagged(ListKind::SenderRole, &self.sender_roles))
            .chain(tagged(ListKind::RecipientRole, &self.recipient_roles))
    }
}

fn tagged(kind: ListKind, lists: &[ValueList]) -> impl Iterator<Item = (ListKind, &ValueList)> {
    lists.iter().map(move |l| (kind, l))
}

/// Rules keyed on `(urn, term)`. The URN compares case-insensitively, the
/// term exactly.
pub fn match_rules(conn: &Connection, urn: &str, term: &str) -> StoreResult<Vec<RuleRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RULE_COLUMNS} FROM rules WHERE source_id = ?1 COLLATE NOCASE AND source_value = ?2"
    ))?;
    let rows = stmt
        .query_map(params![urn, term], map_rule)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Feeds a content item belongs to. Only feeds that exist are returned, in
/// first-seen order.
pub fn resolve_feed_targets(conn: &Connection, terms: &MatchTerms) -> StoreResult<Vec<i32>> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    let mut collect = |rule: &RuleRow| -> StoreResult<()> {
        for &feed_id in &rule.feed_ids {
            if seen.insert(feed_id) && feeds::feed_exists(conn, feed_id)? {
                targets.push(feed_id);
            }
        }
        Ok(())
    };

    if let Some(wildcard) = rule_in(conn, hasher::wildcard_rule_id())? {
        collect(&wildcard)?;
    }

    for (kind, list) in terms.lists() {
        for value in &list.values {
            for rule in match_rules(conn, &list.urn, value)? {
                if kind.selected_by(&rule.element_name) {
                    collect(&rule)?;
                }
            }
        }
    }
    Ok(targets)
}

/// Destinations for a message: the wildcard rule's URIs, then those of the
/// rule keyed `hash(urn, term)` for every message and content keyword.
/// A failed lookup aborts the whole resolution.
pub fn federation_targets(conn: &Connection, de: &DistributionElement) -> StoreResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    let mut collect = |rule: RuleRow| {
        for uri in rule.federation_uris {
            if seen.insert(uri.clone()) {
                targets.push(uri);
            }
        }
    };

    if let Some(wildcard) = rule_in(conn, hasher::wildcard_rule_id())? {
        collect(wildcard);
    }

    let lists = de
        .keywords
        .iter()
        .chain(de.content_objects.iter().flat_map(|c| c.keywords.iter()));
    for list in lists {
        for value in &list.values {
            if let Some(rule) = rule_in(conn, hasher::rule_id(&list.urn, value))? {
                collect(rule);
            }
        }
    }
    Ok(targets)
}

impl Database {
    pub fn resolve_feed_targets(
        &self,
        de: &DistributionElement,
        object: &ContentObject,
    ) -> StoreResult<Vec<i32>> {
        let terms = MatchTerms::for_content(de, object);
        self.with_conn(|conn| resolve_feed_targets(conn, &terms))
    }

    pub fn federation_targets(&self, de: &DistributionElement) -> StoreResult<Vec<String>> {
        self.with_conn(|conn| federation_targets(conn, de))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_types::api::SourceValueRef;

    fn list(urn: &str, values: &[&str]) -> ValueList {
        ValueList { urn: urn.into(), values: values.iter().map(|v| v.to_string()).collect() }
    }

    fn feed_ref(id: &str, value: &str) -> SourceValueRef {
        SourceValueRef { id: id.into(), value: value.into() }
    }

    #[test]
    fn element_name_selects_lists() {
        assert!(ListKind::Keyword.selected_by("keyword"));
        assert!(ListKind::ContentKeyword.selected_by("KEYWORD"));
        assert!(!ListKind::Keyword.selected_by("contentKeyword"));
        assert!(ListKind::SenderRole.selected_by("senderRole"));
        assert!(!ListKind::SenderRole.selected_by(""));
        assert!(ListKind::ContentKeyword.selected_by("anything"));
    }

    #[test]
    fn match_rules_ignores_urn_case() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_feed_rule("", "urn:X", "red", &[feed_ref("feeds", "red")]).unwrap();

        let hits = db.with_conn(|conn| match_rules(conn, "URN:x", "red")).unwrap();
        assert_eq!(hits.len(), 1);
        let misses = db.with_conn(|conn| match_rules(conn, "urn:x", "RED")).unwrap();
        assert!(misses.is_empty());
    }

    #[test]
    fn feed_targets_honour_element_name_and_wildcard() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_feed_rule("contentKeyword", "urn:x", "red", &[feed_ref("feeds", "red")]).unwrap();
        db.upsert_feed_rule("senderRole", "urn:role", "medic", &[feed_ref("feeds", "medics")]).unwrap();
        db.upsert_feed_rule("", "*", "*", &[feed_ref("feeds", "all")]).unwrap();

        let terms = MatchTerms {
            keywords: vec![list("urn:x", &["red"])],
            sender_roles: vec![list("urn:role", &["medic"])],
            ..Default::default()
        };
        let targets = db.with_conn(|conn| resolve_feed_targets(conn, &terms)).unwrap();
        assert_eq!(
            targets,
            vec![hasher::feed_id("feeds", "all"), hasher::feed_id("feeds", "medics")]
        );
    }

    #[test]
    fn federation_targets_dedup_in_first_seen_order() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_federation_rule("", "*", "*", &["http://a/api/de".into()]).unwrap();
        db.upsert_federation_rule(
            "",
            "urn:x",
            "red",
            &["http://b/api/de".into(), "http://a/api/de".into()],
        )
        .unwrap();
        db.upsert_federation_rule("", "urn:x", "blue", &["http://c/api/de".into()]).unwrap();

        let de = DistributionElement {
            distribution_id: "D1".into(),
            sender_id: "S1".into(),
            sent_at: chrono::Utc::now(),
            status: "Test".into(),
            distribution_type: beacon_types::models::DistributionType::Report,
            combined_confidentiality: None,
            language: None,
            sender_roles: vec![],
            recipient_roles: vec![],
            keywords: vec![list("urn:x", &["blue"])],
            content_objects: vec![ContentObject {
                description: "c".into(),
                keywords: vec![list("urn:x", &["red", "green"])],
                ..Default::default()
            }],
        };
        assert_eq!(
            db.federation_targets(&de).unwrap(),
            vec!["http://a/api/de", "http://c/api/de", "http://b/api/de"]
        );
    }
}
