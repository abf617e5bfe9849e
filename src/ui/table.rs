use tabled::{settings::Style, Table, Tabled};

use crate::record::{GeoRecord, ProximityHit};
use crate::settings::{self, Settings};
use crate::storage::Setting;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Field")]
    pub field: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Tabled)]
struct HitRow {
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "Entity")]
    entity_id: i64,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Type")]
    entity_type: String,
    #[tabled(rename = "Latitude")]
    latitude: String,
    #[tabled(rename = "Longitude")]
    longitude: String,
    #[tabled(rename = "Distance (km)")]
    distance: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            field: label.to_string(),
            value: value.to_string(),
        });
    }

    /// Add a row only when there is a value to show
    pub fn add_optional(&mut self, label: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.add_row(label, value);
        }
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn hits_table(hits: &[ProximityHit]) -> String {
    let rows: Vec<HitRow> = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| HitRow {
            rank: i + 1,
            entity_id: hit.entity_id,
            title: hit.title.clone(),
            entity_type: hit.entity_type.clone(),
            latitude: format!("{:.6}", hit.latitude),
            longitude: format!("{:.6}", hit.longitude),
            distance: hit.distance_km.map(|d| format!("{:.2}", d)).unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    Table::new(&rows).with(Style::rounded()).to_string()
}

pub fn record_table(record: &GeoRecord) -> String {
    let mut builder = TableBuilder::new();
    builder.add_row("Entity", &record.entity_id.to_string());
    builder.add_optional("Latitude", record.latitude.map(|v| v.to_string()).as_deref());
    builder.add_optional("Longitude", record.longitude.map(|v| v.to_string()).as_deref());
    builder.add_optional("Street", record.street.as_deref());
    builder.add_optional("City", record.city.as_deref());
    builder.add_optional("State", record.state.as_deref());
    builder.add_optional("Zip", record.zip.as_deref());
    builder.add_optional("Country", record.country.as_deref());
    builder.add_optional("Website", record.website.as_deref());
    builder.add_optional("Email", record.email.as_deref());
    builder.add_optional("Phone", record.phone.as_deref());
    builder.build()
}

pub fn settings_table(settings: &[Setting]) -> String {
    let mut builder = TableBuilder::new();
    for setting in settings {
        builder.add_row(&setting.name, &setting.value.to_string());
    }
    builder.build()
}

/// Every known setting as the store resolves it, defaults included
pub fn effective_settings_table(s: &Settings) -> String {
    let mut builder = TableBuilder::new();
    builder.add_row(settings::MAP_PROVIDER, s.map_provider.as_str());
    let key = if s.google_maps_api_key.is_empty() { "(unset)" } else { "(set)" };
    builder.add_row(settings::GOOGLE_MAPS_API_KEY, key);
    builder.add_row(settings::DEFAULT_RADIUS, &s.default_radius_km.to_string());
    builder.add_row(settings::DEFAULT_ZOOM, &s.default_zoom.to_string());
    builder.add_row(settings::POPUP_TEMPLATE, &s.popup_template);
    builder.add_row(settings::ENABLED_POST_TYPES, &s.enabled_post_types.join(", "));
    builder.add_row(settings::RATE_LIMIT, &s.rate_limit.to_string());
    builder.add_row(settings::RATE_LIMIT_TIME, &s.rate_limit_secs.to_string());
    builder.build()
}
