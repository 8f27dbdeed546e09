//! Headless map renderer: draws by logging and keeps per-category counts.

use std::collections::HashMap;
use sync_engine::{EntityCategory, LayerRenderer, MapEntity, ViewData, ViewSnapshot};
use tracing::{debug, info};

/// Handle handed back for every drawn entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawnLayer {
    pub seq: u64,
    pub category: EntityCategory,
    pub label: String,
}

#[derive(Debug, Default)]
pub struct LogRenderer {
    next_seq: u64,
    live: HashMap<EntityCategory, usize>,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self, category: EntityCategory) -> usize {
        self.live.get(&category).copied().unwrap_or(0)
    }
}

fn label_of(entity: &MapEntity) -> String {
    let attr = |key: &str| {
        entity
            .attributes
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    match entity.category {
        EntityCategory::Zone => format!(
            "{} (risk {})",
            attr("name").unwrap_or_else(|| entity.id.clone()),
            attr("risk").unwrap_or_else(|| "?".into())
        ),
        EntityCategory::EvacuationPoint => attr("name").unwrap_or_else(|| entity.id.clone()),
        EntityCategory::Report => format!(
            "{} report {}",
            attr("severity").unwrap_or_else(|| "unrated".into()),
            entity.id
        ),
    }
}

impl LayerRenderer for LogRenderer {
    type Handle = DrawnLayer;

    fn on_create(&mut self, entity: &MapEntity) -> DrawnLayer {
        self.next_seq += 1;
        *self.live.entry(entity.category).or_insert(0) += 1;
        let label = label_of(entity);
        info!(
            "map + {} {} at ({:.4}, {:.4})",
            entity.category.as_str(),
            label,
            entity.lat,
            entity.lng
        );
        DrawnLayer {
            seq: self.next_seq,
            category: entity.category,
            label,
        }
    }

    fn on_update(&mut self, handle: &mut DrawnLayer, entity: &MapEntity) {
        handle.label = label_of(entity);
        info!("map ~ {} #{} {}", entity.category.as_str(), handle.seq, handle.label);
    }

    fn on_remove(&mut self, handle: DrawnLayer) {
        if let Some(count) = self.live.get_mut(&handle.category) {
            *count = count.saturating_sub(1);
        }
        debug!("map - {} #{} {}", handle.category.as_str(), handle.seq, handle.label);
    }
}

/// One-line text rendering of a view snapshot.
pub fn summarize(snapshot: &ViewSnapshot) -> String {
    let body = match &snapshot.data {
        ViewData::RiskWeather(v) => {
            let risk = v
                .risk
                .as_ref()
                .map(|r| {
                    format!(
                        "alert={} flood={} landslide={}",
                        r.alert_level, r.flood_risk, r.landslide_risk
                    )
                })
                .unwrap_or_else(|| "risk=n/a".into());
            let weather = v
                .weather
                .as_ref()
                .map(|w| format!("weather={} {}C", w.weather_desc, w.temperature))
                .unwrap_or_else(|| "weather=n/a".into());
            format!("{} {}", risk, weather)
        }
        ViewData::MapLayers(v) => format!(
            "zones={} evacuation={} reports={}",
            v.zones.len(),
            v.evacuation_points.len(),
            v.reports.len()
        ),
        ViewData::Earthquakes(v) => match &v.latest {
            Some(q) => format!(
                "latest M{} {} ({}), felt={}",
                q.magnitude,
                q.location,
                q.datetime,
                v.felt.len()
            ),
            None => format!("latest=n/a felt={}", v.felt.len()),
        },
        ViewData::EarlyWarnings(list) => match list.first() {
            Some(w) => format!("{} warnings, newest: {}", list.len(), w.title),
            None => "no warnings".into(),
        },
        ViewData::AdminReports(Some(a)) => format!(
            "pending={} approved={} rejected={}",
            a.pending_count, a.approved_count, a.rejected_count
        ),
        ViewData::AdminReports(None) => "admin queue unavailable".into(),
        ViewData::Stats(Some(s)) => format!(
            "cities={} zones={} evacuation={} users={} reports={}",
            s.cities, s.risk_zones, s.evacuation_points, s.users, s.reports
        ),
        ViewData::Stats(None) => "stats=n/a".into(),
        ViewData::Cities(list) => format!("{} cities", list.len()),
    };

    let mut line = format!("[{} v{}] {}", snapshot.kind.as_str(), snapshot.version, body);
    if snapshot.any_stale() {
        line.push_str(" (stale)");
    }
    for (resource, err) in snapshot.errors() {
        line.push_str(&format!(" !{}: {}", resource, err));
    }
    line
}
