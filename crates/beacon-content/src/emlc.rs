//! NIEM EM_LC event payloads.

use chrono::{DateTime, Utc};
use roxmltree::{Document, Node};

use beacon_types::models::GeoPoint;

use crate::catalog::{IconCatalog, TypeCodeCatalog};
use crate::envelope::parse_time;
use crate::error::ContentError;
use crate::xml::{self, child, child_text, children, path};

pub const EMLC_NAMESPACE: &str =
    "http://release.niem.gov/niem/domains/emergencyManagement/3.1/emevent/0.1/emlc/";

const DEFAULT_LABEL: &str = "Emergency Management Event";
const ICON_SET: &str = "NIEM";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailKind {
    Resource,
    Incident,
    Sensor,
    MutualAid,
}

impl DetailKind {
    fn from_local(local: &str) -> Option<Self> {
        match local.to_ascii_lowercase().as_str() {
            "resourcedetail" => Some(Self::Resource),
            "incidentdetail" => Some(Self::Incident),
            "sensordetail" => Some(Self::Sensor),
            "mutualaiddetail" => Some(Self::MutualAid),
            _ => None,
        }
    }

    pub fn icon_group(self) -> &'static str {
        match self {
            Self::Resource => "Resource",
            Self::Incident => "Incident",
            Self::Sensor => "Sensor",
            Self::MutualAid => "MutualAid",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventDetail {
    pub kind: DetailKind,
    pub secondary_statuses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmlcEvent {
    pub event_id: Option<String>,
    pub type_code: Option<String>,
    pub extensions: Vec<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub location: Option<GeoPoint>,
    pub details: Vec<EventDetail>,
}

impl EmlcEvent {
    pub fn parse(input: &str) -> Result<Self, ContentError> {
        let doc = Document::parse(input)?;
        Self::from_node(doc.root_element())
    }

    pub fn from_node(root: Node<'_, '_>) -> Result<Self, ContentError> {
        let descriptor = child(root, "EventTypeDescriptor");
        let range = child(root, "EventValidityDateTimeRange");

        let valid_from = range
            .and_then(|r| child_text(r, "StartDate"))
            .map(|v| parse_time("StartDate", &v))
            .transpose()?;
        let valid_until = range
            .and_then(|r| child_text(r, "EndDate"))
            .map(|v| parse_time("EndDate", &v))
            .transpose()?;

        let location = path(
            root,
            &["EventLocation", "LocationCylinder", "LocationPoint", "Point", "pos"],
        )
        .and_then(xml::text)
        .map(|pos| parse_pos(&pos))
        .transpose()?;

        let details = child(root, "EventDetails")
            .map(|d| {
                d.children()
                    .filter(|c| c.is_element())
                    .filter_map(|c| {
                        let kind = DetailKind::from_local(c.tag_name().name())?;
                        let secondary_statuses = c
                            .descendants()
                            .filter(|n| xml::is(*n, "SecondaryResourceStatusText"))
                            .filter_map(xml::text)
                            .collect();
                        Some(EventDetail { kind, secondary_statuses })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            event_id: child_text(root, "EventID"),
            type_code: descriptor.and_then(|d| child_text(d, "EventTypeCode")),
            extensions: descriptor
                .map(|d| children(d, "EventTypeDescriptorExtension").filter_map(xml::text).collect())
                .unwrap_or_default(),
            valid_from,
            valid_until,
            location,
            details,
        })
    }

    pub fn title(&self) -> String {
        self.event_id.clone().unwrap_or_else(|| DEFAULT_LABEL.to_string())
    }

    /// First descriptor extension, then the catalog name for the code, then the raw code.
    pub fn friendly_name(&self, codes: &TypeCodeCatalog) -> String {
        if let Some(first) = self.extensions.first() {
            return first.clone();
        }
        match &self.type_code {
            Some(code) => codes.lookup(code).unwrap_or(code).to_string(),
            None => DEFAULT_LABEL.to_string(),
        }
    }

    /// Secondary statuses when the event carries exactly one resource detail
    /// that has them, otherwise the descriptor text.
    pub fn description(&self) -> String {
        if let [only] = self.details.as_slice() {
            if only.kind == DetailKind::Resource && !only.secondary_statuses.is_empty() {
                return only.secondary_statuses.join(", ");
            }
        }
        if !self.extensions.is_empty() {
            return self.extensions.join(" ").trim().to_string();
        }
        self.type_code.clone().unwrap_or_else(|| DEFAULT_LABEL.to_string())
    }

    /// Icon for the first detail's kind. Empty when nothing matches.
    pub fn icon_url(&self, icons: &IconCatalog) -> String {
        let (Some(first), Some(code)) = (self.details.first(), &self.type_code) else {
            return String::new();
        };
        icons
            .resolve(ICON_SET, first.kind.icon_group(), code)
            .unwrap_or_else(|| {
                tracing::warn!(type_code = %code, "no icon found");
                String::new()
            })
    }
}

/// `"lat lon [height]"`
pub(crate) fn parse_pos(pos: &str) -> Result<GeoPoint, ContentError> {
    let invalid = || ContentError::InvalidValue { field: "pos", value: pos.to_string() };
    let mut parts = pos.split_whitespace().map(str::parse::<f64>);
    let lat = parts.next().ok_or_else(invalid)?.map_err(|_| invalid())?;
    let lon = parts.next().ok_or_else(invalid)?.map_err(|_| invalid())?;
    Ok(GeoPoint { lat, lon })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_icons;
    use crate::envelope::tests::EMLC_EVENT;

    fn event() -> EmlcEvent {
        EmlcEvent::parse(&EMLC_EVENT.replace("gml:Pos", "gml:pos")).unwrap()
    }

    #[test]
    fn reads_event_fields() {
        let evt = event();
        assert_eq!(evt.event_id.as_deref(), Some("ARDENTMC:TESTMESSAGE:EVENT:SIMPLE"));
        assert_eq!(evt.location, Some(GeoPoint { lat: 30.5, lon: -80.25 }));
        assert_eq!(evt.valid_until.unwrap().to_rfc3339(), "2024-03-02T06:00:00+00:00");
        assert_eq!(evt.details.len(), 1);
        assert_eq!(evt.details[0].kind, DetailKind::Resource);
    }

    #[test]
    fn description_prefers_secondary_status() {
        assert_eq!(event().description(), "Available, Staged");

        let mut evt = event();
        evt.details[0].secondary_statuses.clear();
        assert_eq!(evt.description(), "Ambulance");
    }

    #[test]
    fn mutual_aid_detail_counts_toward_single_detail_check() {
        let xml = EMLC_EVENT
            .replace("gml:Pos", "gml:pos")
            .replace("</emlc:EventDetails>", "<emlc:MutualAidDetail/></emlc:EventDetails>");
        let evt = EmlcEvent::parse(&xml).unwrap();
        assert_eq!(evt.details.len(), 2);
        assert_eq!(evt.details[1].kind, DetailKind::MutualAid);
        assert_eq!(evt.description(), "Ambulance");
    }

    #[test]
    fn friendly_name_falls_back_to_catalog_then_code() {
        let mut evt = event();
        assert_eq!(evt.friendly_name(&TypeCodeCatalog::default()), "Ambulance");

        evt.extensions.clear();
        let codes: TypeCodeCatalog = serde_json::from_str(
            r#"{"ATOM.GRDTRK.EQT.GRDVEH.CVLVEH.EM.EMS.AMBULANCE.ALS":"ALS Ambulance"}"#,
        )
        .unwrap();
        assert_eq!(evt.friendly_name(&codes), "ALS Ambulance");
        assert_eq!(
            evt.friendly_name(&TypeCodeCatalog::default()),
            "ATOM_GRDTRK_EQT_GRDVEH_CVLVEH_EM_EMS_AMBULANCE_ALS"
        );
    }

    #[test]
    fn icon_uses_first_detail_kind() {
        let evt = event();
        assert_eq!(
            evt.icon_url(&sample_icons()),
            "icons/resource/ATOM_GRDTRK_EQT_GRDVEH_CVLVEH_EM_EMS_AMBULANCE.png"
        );
        assert_eq!(evt.icon_url(&IconCatalog::default()), "");
    }

    #[test]
    fn bad_position_is_rejected() {
        assert!(parse_pos("north").is_err());
        assert!(parse_pos("1.5").is_err());
        assert_eq!(parse_pos("1 2 3").unwrap(), GeoPoint { lat: 1.0, lon: 2.0 });
    }
}
