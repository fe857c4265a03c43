//! Fixtures shared by the store tests.

use beacon_content::{ContentExtractor, parse_envelope, prepare_message};
use beacon_types::api::SourceValueRef;
use beacon_types::models::PreparedMessage;

use crate::Database;

/// Builds and prepares a message whose content objects carry the given
/// `(urn, value)` content keywords.
pub(crate) fn message(
    sender: &str,
    dist: &str,
    kind: &str,
    sent: &str,
    contents: &[(&str, &[(&str, &str)])],
) -> PreparedMessage {
    let mut body = format!(
        "<EDXLDistribution xmlns=\"urn:oasis:names:tc:emergency:EDXL:DE:1.0\">\
         <distributionID>{dist}</distributionID><senderID>{sender}</senderID>\
         <dateTimeSent>{sent}</dateTimeSent><distributionStatus>Test</distributionStatus>\
         <distributionType>{kind}</distributionType>"
    );
    for (description, keywords) in contents {
        body.push_str("<contentObject>");
        body.push_str(&format!("<contentDescription>{description}</contentDescription>"));
        for (urn, value) in keywords.iter() {
            body.push_str(&format!(
                "<contentKeyword><valueListUrn>{urn}</valueListUrn><value>{value}</value></contentKeyword>"
            ));
        }
        body.push_str("</contentObject>");
    }
    body.push_str("</EDXLDistribution>");

    let de = parse_envelope(&body).unwrap();
    prepare_message(de, body, &ContentExtractor::default()).unwrap()
}

/// A store with one rule routing `(urn, value)` to the feed `("units", value)`.
pub(crate) fn open_with_feed_rule(urn: &str, value: &str) -> (Database, i32) {
    let db = Database::open_in_memory().unwrap();
    let rule = db
        .upsert_feed_rule("", urn, value, &[SourceValueRef { id: "units".into(), value: value.into() }])
        .unwrap();
    (db, rule.feed_ids[0])
}
