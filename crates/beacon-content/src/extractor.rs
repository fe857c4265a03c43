use chrono::Duration;
use roxmltree::Document;

use beacon_types::models::{
    ContentObject, DistributionElement, FeedContentView, GeoPoint, PreparedContent, PreparedMessage,
};

use crate::catalog::{IconCatalog, TypeCodeCatalog};
use crate::emlc::{EMLC_NAMESPACE, EmlcEvent};
use crate::envelope::render_content_object;
use crate::error::ContentError;

/// Lifetime of content that does not say when it expires.
pub const DEFAULT_CONTENT_TTL_HOURS: i64 = 24;

/// Known embedded payload schemas.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentVariant {
    Emlc(EmlcEvent),
    Unknown,
}

impl ContentVariant {
    /// Picks the variant from the root element's namespace. Malformed XML is
    /// an error; an unrecognised namespace is `Unknown`.
    pub fn classify(embedded: &str) -> Result<Self, ContentError> {
        // Some producers capitalise the GML position element.
        let normalised = embedded.replace("gml:Pos", "gml:pos");
        let doc = Document::parse(&normalised)?;
        let root = doc.root_element();

        match root.tag_name().namespace() {
            Some(ns) if ns.eq_ignore_ascii_case(EMLC_NAMESPACE) => {
                Ok(Self::Emlc(EmlcEvent::from_node(root)?))
            }
            _ => Ok(Self::Unknown),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContentExtractor {
    icons: IconCatalog,
    type_codes: TypeCodeCatalog,
}

impl ContentExtractor {
    pub fn new(icons: IconCatalog, type_codes: TypeCodeCatalog) -> Self {
        Self { icons, type_codes }
    }

    /// Typed view of the first recognised embedded payload, if any.
    pub fn extract(
        &self,
        de: &DistributionElement,
        object: &ContentObject,
    ) -> Result<Option<FeedContentView>, ContentError> {
        for embedded in &object.embedded_xml {
            match ContentVariant::classify(embedded)? {
                ContentVariant::Emlc(event) => return Ok(Some(self.emlc_view(&event))),
                ContentVariant::Unknown => {
                    tracing::debug!(sender = %de.sender_id, content = %object.description, "unrecognised content schema");
                }
            }
        }
        Ok(None)
    }

    fn emlc_view(&self, event: &EmlcEvent) -> FeedContentView {
        FeedContentView {
            title: event.title(),
            friendly_name: event.friendly_name(&self.type_codes),
            description: event.description(),
            icon_url: event.icon_url(&self.icons),
            image_url: String::new(),
            location: event.location,
            expires_at: event.valid_until,
        }
    }
}

/// Computes everything the store writes for a message, before any write happens.
pub fn prepare_message(
    de: DistributionElement,
    body: String,
    extractor: &ContentExtractor,
) -> Result<PreparedMessage, ContentError> {
    let default_expiry = de.sent_at + Duration::hours(DEFAULT_CONTENT_TTL_HOURS);

    let items = de
        .content_objects
        .iter()
        .map(|object| {
            // Untyped content is still indexed, with blank text and a zero position.
            let view = extractor.extract(&de, object)?.unwrap_or_else(|| FeedContentView {
                location: Some(GeoPoint { lat: 0.0, lon: 0.0 }),
                ..FeedContentView::default()
            });
            let expires_at = view.expires_at.unwrap_or(default_expiry);
            Ok(PreparedContent {
                id: de.content_id(object),
                expires_at,
                payload: render_content_object(object),
                object: object.clone(),
                view: FeedContentView { expires_at: Some(expires_at), ..view },
            })
        })
        .collect::<Result<Vec<_>, ContentError>>()?;

    Ok(PreparedMessage { id: de.message_id(), envelope: de, body, items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_icons;
    use crate::envelope::parse_envelope;
    use crate::envelope::tests::sample_envelope;
    use beacon_types::hasher;

    #[test]
    fn classifies_by_namespace() {
        let unknown = ContentVariant::classify(r#"<alert xmlns="urn:oasis:names:tc:emergency:cap:1.2"/>"#).unwrap();
        assert_eq!(unknown, ContentVariant::Unknown);
        assert!(ContentVariant::classify("<broken").is_err());
    }

    #[test]
    fn prepares_typed_content() {
        let body = sample_envelope("Report", "2024-03-01T12:00:00Z");
        let de = parse_envelope(&body).unwrap();
        let extractor = ContentExtractor::new(sample_icons(), TypeCodeCatalog::default());
        let prepared = prepare_message(de, body, &extractor).unwrap();

        assert_eq!(prepared.id, hasher::message_id("S1", "D1"));
        let item = &prepared.items[0];
        assert_eq!(item.id, hasher::content_id("S1", "D1", "ambulance 7"));
        assert_eq!(item.view.title, "ARDENTMC:TESTMESSAGE:EVENT:SIMPLE");
        assert_eq!(item.view.description, "Available, Staged");
        assert!(item.view.icon_url.ends_with("AMBULANCE.png"));
        assert_eq!(item.expires_at.to_rfc3339(), "2024-03-02T06:00:00+00:00");
        assert_eq!(item.view.expires_at, Some(item.expires_at));
        assert!(item.payload.starts_with("<contentObject xmlns="));
    }

    #[test]
    fn untyped_content_gets_fallback_view_and_default_expiry() {
        let body = sample_envelope("Report", "2024-03-01T12:00:00Z")
            .replace("xmlns:emlc=\"http://release.niem.gov", "xmlns:emlc=\"http://example.org");
        let de = parse_envelope(&body).unwrap();
        let sent = de.sent_at;
        let prepared = prepare_message(de, body, &ContentExtractor::default()).unwrap();

        let item = &prepared.items[0];
        assert_eq!(item.view.title, "");
        assert_eq!(item.view.friendly_name, "");
        assert_eq!(item.view.description, "");
        assert_eq!(item.view.icon_url, "");
        assert_eq!(item.view.location, Some(GeoPoint { lat: 0.0, lon: 0.0 }));
        assert_eq!(item.expires_at, sent + Duration::hours(24));
    }
}
