//! EDXL-DE 1.0 envelope codec.

use std::collections::HashSet;
use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use roxmltree::{Document, Node};

use beacon_types::models::{ContentObject, DistributionElement, NonXmlContent, ValueList};

use crate::error::ContentError;
use crate::xml::{self, child, child_text, children, push_element};

pub const DE_NAMESPACE: &str = "urn:oasis:names:tc:emergency:EDXL:DE:1.0";

pub fn parse_envelope(input: &str) -> Result<DistributionElement, ContentError> {
    let doc = Document::parse(input)?;
    let root = doc.root_element();
    if !xml::is(root, "EDXLDistribution") {
        return Err(ContentError::Invalid(format!(
            "expected EDXLDistribution, found {}",
            root.tag_name().name()
        )));
    }

    let sent = child_text(root, "dateTimeSent").ok_or(ContentError::Missing("dateTimeSent"))?;

    let de = DistributionElement {
        distribution_id: child_text(root, "distributionID").unwrap_or_default(),
        sender_id: child_text(root, "senderID").unwrap_or_default(),
        sent_at: parse_time("dateTimeSent", &sent)?,
        status: child_text(root, "distributionStatus").unwrap_or_default(),
        distribution_type: child_text(root, "distributionType")
            .ok_or(ContentError::Missing("distributionType"))?
            .into(),
        combined_confidentiality: child_text(root, "combinedConfidentiality"),
        language: child_text(root, "language"),
        sender_roles: value_lists(root, "senderRole"),
        recipient_roles: value_lists(root, "recipientRole"),
        keywords: value_lists(root, "keyword"),
        content_objects: children(root, "contentObject").map(content_object).collect(),
    };

    validate(&de)?;
    Ok(de)
}

/// Structural checks every stored message must pass.
pub fn validate(de: &DistributionElement) -> Result<(), ContentError> {
    if de.sender_id.trim().is_empty() {
        return Err(ContentError::Invalid("senderID is required".into()));
    }
    if de.distribution_id.trim().is_empty() {
        return Err(ContentError::Invalid("distributionID is required".into()));
    }

    let mut seen = HashSet::new();
    for object in &de.content_objects {
        if !seen.insert(de.content_id(object)) {
            return Err(ContentError::Invalid(format!(
                "duplicate content object {:?}",
                object.description
            )));
        }
    }
    Ok(())
}

pub fn parse_time(field: &'static str, value: &str) -> Result<DateTime<Utc>, ContentError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ContentError::InvalidValue { field, value: value.to_string() })
}

pub fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn value_lists(node: Node<'_, '_>, local: &'static str) -> Vec<ValueList> {
    children(node, local)
        .map(|list| ValueList {
            urn: child_text(list, "valueListUrn").unwrap_or_default(),
            values: children(list, "value").filter_map(xml::text).collect(),
        })
        .collect()
}

fn content_object(node: Node<'_, '_>) -> ContentObject {
    let embedded_xml = xml::path(node, &["xmlContent", "embeddedXMLContent"])
        .map(|embedded| {
            embedded
                .children()
                .filter(|c| c.is_element())
                .map(xml::subtree_to_string)
                .collect()
        })
        .unwrap_or_default();

    let non_xml = child(node, "nonXMLContent").map(|n| NonXmlContent {
        mime_type: child_text(n, "mimeType").unwrap_or_default(),
        uri: child_text(n, "uri"),
    });

    ContentObject {
        description: child_text(node, "contentDescription").unwrap_or_default(),
        keywords: value_lists(node, "contentKeyword"),
        embedded_xml,
        non_xml,
    }
}

// -- Rendering --

pub fn render_envelope(de: &DistributionElement) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    let _ = write!(out, "<EDXLDistribution xmlns=\"{DE_NAMESPACE}\">");
    push_element(&mut out, "distributionID", &de.distribution_id);
    push_element(&mut out, "senderID", &de.sender_id);
    push_element(&mut out, "dateTimeSent", &format_time(&de.sent_at));
    push_element(&mut out, "distributionStatus", &de.status);
    push_element(&mut out, "distributionType", de.distribution_type.as_str());
    if let Some(confidentiality) = &de.combined_confidentiality {
        push_element(&mut out, "combinedConfidentiality", confidentiality);
    }
    if let Some(language) = &de.language {
        push_element(&mut out, "language", language);
    }
    push_value_lists(&mut out, "senderRole", &de.sender_roles);
    push_value_lists(&mut out, "recipientRole", &de.recipient_roles);
    push_value_lists(&mut out, "keyword", &de.keywords);
    for object in &de.content_objects {
        push_content_object(&mut out, object, false);
    }
    out.push_str("</EDXLDistribution>");
    out
}

/// Standalone XML for a single content object, as stored in the content cache.
pub fn render_content_object(object: &ContentObject) -> String {
    let mut out = String::new();
    push_content_object(&mut out, object, true);
    out
}

fn push_value_lists(out: &mut String, name: &str, lists: &[ValueList]) {
    for list in lists {
        let _ = write!(out, "<{name}>");
        push_element(out, "valueListUrn", &list.urn);
        for value in &list.values {
            push_element(out, "value", value);
        }
        let _ = write!(out, "</{name}>");
    }
}

fn push_content_object(out: &mut String, object: &ContentObject, standalone: bool) {
    if standalone {
        let _ = write!(out, "<contentObject xmlns=\"{DE_NAMESPACE}\">");
    } else {
        out.push_str("<contentObject>");
    }
    push_element(out, "contentDescription", &object.description);
    push_value_lists(out, "contentKeyword", &object.keywords);
    if let Some(non_xml) = &object.non_xml {
        out.push_str("<nonXMLContent>");
        push_element(out, "mimeType", &non_xml.mime_type);
        if let Some(uri) = &non_xml.uri {
            push_element(out, "uri", uri);
        }
        out.push_str("</nonXMLContent>");
    }
    if !object.embedded_xml.is_empty() {
        out.push_str("<xmlContent><embeddedXMLContent>");
        for embedded in &object.embedded_xml {
            out.push_str(xml::strip_declaration(embedded));
        }
        out.push_str("</embeddedXMLContent></xmlContent>");
    }
    out.push_str("</contentObject>");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use beacon_types::models::DistributionType;

    pub(crate) const EMLC_EVENT: &str = r#"<emlc:Event xmlns:emlc="http://release.niem.gov/niem/domains/emergencyManagement/3.1/emevent/0.1/emlc/" xmlns:gml="http://www.opengis.net/gml/3.2">
      <emlc:EventID>ARDENTMC:TESTMESSAGE:EVENT:SIMPLE</emlc:EventID>
      <emlc:EventTypeDescriptor>
        <emlc:EventTypeCode>ATOM_GRDTRK_EQT_GRDVEH_CVLVEH_EM_EMS_AMBULANCE_ALS</emlc:EventTypeCode>
        <emlc:EventTypeDescriptorExtension>Ambulance</emlc:EventTypeDescriptorExtension>
      </emlc:EventTypeDescriptor>
      <emlc:EventLocation>
        <emlc:LocationCylinder>
          <emlc:LocationPoint><gml:Point><gml:Pos>30.5 -80.25</gml:Pos></gml:Point></emlc:LocationPoint>
          <emlc:LocationCylinderRadiusValue>1</emlc:LocationCylinderRadiusValue>
          <emlc:LocationCylinderHalfHeightValue>2</emlc:LocationCylinderHalfHeightValue>
        </emlc:LocationCylinder>
      </emlc:EventLocation>
      <emlc:EventMessageDateTime>2024-03-01T12:00:00Z</emlc:EventMessageDateTime>
      <emlc:EventValidityDateTimeRange>
        <emlc:StartDate>2024-03-01T12:00:00Z</emlc:StartDate>
        <emlc:EndDate>2024-03-02T06:00:00Z</emlc:EndDate>
      </emlc:EventValidityDateTimeRange>
      <emlc:EventDetails>
        <emlc:ResourceDetail>
          <emlc:Status>
            <emlc:SecondaryResourceStatus><emlc:SecondaryResourceStatusText>Available</emlc:SecondaryResourceStatusText></emlc:SecondaryResourceStatus>
            <emlc:SecondaryResourceStatus><emlc:SecondaryResourceStatusText>Staged</emlc:SecondaryResourceStatusText></emlc:SecondaryResourceStatus>
          </emlc:Status>
        </emlc:ResourceDetail>
      </emlc:EventDetails>
    </emlc:Event>"#;

    pub(crate) fn sample_envelope(kind: &str, sent: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<EDXLDistribution xmlns="urn:oasis:names:tc:emergency:EDXL:DE:1.0">
  <distributionID>D1</distributionID>
  <senderID>S1</senderID>
  <dateTimeSent>{sent}</dateTimeSent>
  <distributionStatus>Test</distributionStatus>
  <distributionType>{kind}</distributionType>
  <combinedConfidentiality>Unclassified</combinedConfidentiality>
  <keyword><valueListUrn>urn:agency</valueListUrn><value>EMS</value></keyword>
  <contentObject>
    <contentDescription>ambulance 7</contentDescription>
    <contentKeyword><valueListUrn>urn:x</valueListUrn><value>red</value><value>blue</value></contentKeyword>
    <xmlContent><embeddedXMLContent>{EMLC_EVENT}</embeddedXMLContent></xmlContent>
  </contentObject>
</EDXLDistribution>"#
        )
    }

    #[test]
    fn parses_envelope_fields() {
        let de = parse_envelope(&sample_envelope("Report", "2024-03-01T12:00:00Z")).unwrap();
        assert_eq!(de.sender_id, "S1");
        assert_eq!(de.distribution_id, "D1");
        assert_eq!(de.distribution_type, DistributionType::Report);
        assert_eq!(de.keywords[0].urn, "urn:agency");
        assert_eq!(de.content_objects.len(), 1);

        let object = &de.content_objects[0];
        assert_eq!(object.description, "ambulance 7");
        assert_eq!(object.keywords[0].values, vec!["red", "blue"]);
        assert_eq!(object.embedded_xml.len(), 1);
        assert!(object.embedded_xml[0].contains("xmlns:emlc="));
    }

    #[test]
    fn rejects_missing_identity() {
        let doc = sample_envelope("Report", "2024-03-01T12:00:00Z").replace("<senderID>S1</senderID>", "");
        assert!(matches!(parse_envelope(&doc), Err(ContentError::Invalid(_))));
    }

    #[test]
    fn rejects_bad_timestamp() {
        let doc = sample_envelope("Report", "yesterday");
        assert!(matches!(
            parse_envelope(&doc),
            Err(ContentError::InvalidValue { field: "dateTimeSent", .. })
        ));
    }

    #[test]
    fn rejects_duplicate_content() {
        let doc = sample_envelope("Report", "2024-03-01T12:00:00Z");
        let start = doc.find("<contentObject>").unwrap();
        let end = doc.find("</contentObject>").unwrap() + "</contentObject>".len();
        let doubled = format!("{}{}{}", &doc[..end], &doc[start..end], &doc[end..]);
        assert!(matches!(parse_envelope(&doubled), Err(ContentError::Invalid(_))));
    }

    #[test]
    fn unknown_distribution_type_is_kept() {
        let de = parse_envelope(&sample_envelope("Ack", "2024-03-01T12:00:00Z")).unwrap();
        assert_eq!(de.distribution_type, DistributionType::Other("Ack".into()));
    }

    #[test]
    fn rendered_envelope_parses_back() {
        let de = parse_envelope(&sample_envelope("Update", "2024-03-01T12:00:00+02:00")).unwrap();
        let again = parse_envelope(&render_envelope(&de)).unwrap();
        assert_eq!(again.sent_at, de.sent_at);
        assert_eq!(again.content_objects[0].keywords, de.content_objects[0].keywords);
        assert_eq!(again.message_id(), de.message_id());
    }
}
