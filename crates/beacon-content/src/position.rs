//! Geolocation and timing patches for single-content messages.

use chrono::Duration;
use roxmltree::{Document, Node};

use beacon_types::api::PositionUpdate;
use beacon_types::models::{DistributionElement, PreparedMessage};

use crate::envelope::{format_time, parse_envelope, render_envelope};
use crate::error::ContentError;
use crate::extractor::{ContentExtractor, ContentVariant, prepare_message};
use crate::xml;

/// Moves the message to the new position and time. Only messages with a
/// single content object qualify; non-EMLC payloads keep their XML as is.
pub fn apply_position(de: &mut DistributionElement, update: &PositionUpdate) -> Result<(), ContentError> {
    let count = de.content_objects.len();
    let [object] = de.content_objects.as_mut_slice() else {
        return Err(ContentError::NotApplicable(format!(
            "position updates need exactly one content object, found {count}"
        )));
    };
    if object.embedded_xml.len() > 1 {
        return Err(ContentError::NotApplicable("more than one embedded payload".into()));
    }

    if let Some(embedded) = object.embedded_xml.first_mut() {
        if matches!(ContentVariant::classify(embedded)?, ContentVariant::Emlc(_)) {
            *embedded = rewrite_event(embedded, update)?;
        }
    }

    de.sent_at = update.date_time_sent;
    Ok(())
}

/// Parses a stored body, applies the patch and prepares the result for storage.
/// Content expiry is the stale time when given, otherwise one day after the
/// new sent time.
pub fn reposition(
    body: &str,
    update: &PositionUpdate,
    extractor: &ContentExtractor,
) -> Result<PreparedMessage, ContentError> {
    let mut de = parse_envelope(body)?;
    apply_position(&mut de, update)?;

    let expires_at = update
        .date_time_stale
        .unwrap_or(update.date_time_sent + Duration::days(1));
    let rendered = render_envelope(&de);
    let mut prepared = prepare_message(de, rendered, extractor)?;
    for item in &mut prepared.items {
        item.expires_at = expires_at;
        item.view.expires_at = Some(expires_at);
    }
    Ok(prepared)
}

fn rewrite_event(embedded: &str, update: &PositionUpdate) -> Result<String, ContentError> {
    let doc = Document::parse(embedded)?;
    let mut out = String::with_capacity(embedded.len());
    xml::write_subtree(doc.root_element(), &mut out, &|node| replacement(node, update));
    Ok(out)
}

fn replacement(node: Node<'_, '_>, update: &PositionUpdate) -> Option<String> {
    let in_range = node
        .parent_element()
        .is_some_and(|p| xml::is(p, "EventValidityDateTimeRange"));

    if xml::is(node, "EventMessageDateTime") {
        Some(format_time(&update.date_time_sent))
    } else if in_range && xml::is(node, "StartDate") {
        Some(format_time(&update.date_time_start))
    } else if in_range && xml::is(node, "EndDate") {
        update.date_time_stale.as_ref().map(format_time)
    } else if xml::is(node, "pos") {
        Some(match update.elevation {
            Some(h) => format!("{} {} {h}", update.latitude, update.longitude),
            None => format!("{} {}", update.latitude, update.longitude),
        })
    } else if xml::is(node, "LocationCylinderRadiusValue") {
        update.cylinder_radius.map(|r| r.to_string())
    } else if xml::is(node, "LocationCylinderHalfHeightValue") {
        update.cylinder_half_height.map(|h| h.to_string())
    } else {
        None
    }
}
