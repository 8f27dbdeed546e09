//! Map entities with stable identity.

use common::{DamageReport, EvacuationPoint, RiskZone};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityCategory {
    Zone,
    EvacuationPoint,
    Report,
}

impl EntityCategory {
    pub const ALL: [EntityCategory; 3] = [
        EntityCategory::Zone,
        EntityCategory::EvacuationPoint,
        EntityCategory::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityCategory::Zone => "zone",
            EntityCategory::EvacuationPoint => "evacuation",
            EntityCategory::Report => "report",
        }
    }
}

/// Identity of a rendered entity. Ids are only unique within a category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub category: EntityCategory,
    pub id: String,
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category.as_str(), self.id)
    }
}

/// Something drawn on the map. `attributes` holds every source field
/// (position included), so any change to the record shows up as a diff.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEntity {
    pub id: String,
    pub category: EntityCategory,
    pub lat: f64,
    pub lng: f64,
    pub attributes: Map<String, Value>,
}

impl MapEntity {
    pub fn new(id: impl Into<String>, category: EntityCategory, lat: f64, lng: f64) -> Self {
        Self {
            id: id.into(),
            category,
            lat,
            lng,
            attributes: Map::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn key(&self) -> EntityKey {
        EntityKey {
            category: self.category,
            id: self.id.clone(),
        }
    }

    /// Same rendered content, ignoring identity.
    pub fn same_content(&self, other: &MapEntity) -> bool {
        self.lat == other.lat && self.lng == other.lng && self.attributes == other.attributes
    }

    pub fn from_zone(zone: &RiskZone) -> Self {
        Self::build(
            natural_id(&zone.city, &zone.name, zone.lat, zone.lng),
            EntityCategory::Zone,
            zone.lat,
            zone.lng,
            zone,
        )
    }

    pub fn from_evacuation_point(point: &EvacuationPoint) -> Self {
        Self::build(
            natural_id(&point.city, &point.name, point.lat, point.lng),
            EntityCategory::EvacuationPoint,
            point.lat,
            point.lng,
            point,
        )
    }

    pub fn from_report(report: &DamageReport) -> Self {
        let id = if report.id.is_empty() {
            format!(
                "{:.5},{:.5}@{}",
                report.lat,
                report.lng,
                report.created_at.as_deref().unwrap_or_default()
            )
        } else {
            report.id.clone()
        };
        Self::build(id, EntityCategory::Report, report.lat, report.lng, report)
    }

    fn build<S: Serialize>(
        id: String,
        category: EntityCategory,
        lat: f64,
        lng: f64,
        source: &S,
    ) -> Self {
        let attributes = match serde_json::to_value(source) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Self {
            id,
            category,
            lat,
            lng,
            attributes,
        }
    }
}

// Zones and evacuation points carry no id; city plus name is unique in practice.
fn natural_id(city: &str, name: &str, lat: f64, lng: f64) -> String {
    if name.is_empty() {
        format!("{}:{:.5},{:.5}", city, lat, lng)
    } else {
        format!("{}:{}", city, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(name: &str, risk: &str) -> RiskZone {
        RiskZone {
            name: name.into(),
            lat: -6.2,
            lng: 106.8,
            radius: 500.0,
            risk: risk.into(),
            city: "jakarta".into(),
            kind: "flood".into(),
            description: String::new(),
        }
    }

    #[test]
    fn test_zone_identity_ignores_risk() {
        let a = MapEntity::from_zone(&zone("Kampung Melayu", "high"));
        let b = MapEntity::from_zone(&zone("Kampung Melayu", "medium"));
        assert_eq!(a.id, "jakarta:Kampung Melayu");
        assert_eq!(a.key(), b.key());
        assert!(!a.same_content(&b));
        assert_eq!(a.attributes["risk"], "high");
    }

    #[test]
    fn test_report_id_fallback() {
        let report = DamageReport {
            id: String::new(),
            lat: -6.9,
            lng: 107.6,
            city: "bandung".into(),
            kind: "flood".into(),
            severity: "high".into(),
            description: String::new(),
            image_url: String::new(),
            reporter_name: "Anonim".into(),
            status: "approved".into(),
            created_at: Some("2024-01-01T10:00:00".into()),
        };
        let entity = MapEntity::from_report(&report);
        assert_eq!(entity.id, "-6.90000,107.60000@2024-01-01T10:00:00");
        assert_eq!(entity.key().to_string(), "report:-6.90000,107.60000@2024-01-01T10:00:00");
    }

    #[test]
    fn test_attribute_order_irrelevant() {
        let a = MapEntity::new("z", EntityCategory::Zone, 0.0, 0.0)
            .with_attr("risk", "high")
            .with_attr("radius", 500);
        let b = MapEntity::new("z", EntityCategory::Zone, 0.0, 0.0)
            .with_attr("radius", 500)
            .with_attr("risk", "high");
        assert!(a.same_content(&b));
    }
}
