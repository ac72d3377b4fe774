use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identity of a vehicle or a missing course: the (line, course) pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteKey {
    pub line: String,
    pub course: String,
}

impl RouteKey {
    pub fn new(line: impl Into<String>, course: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            course: course.into(),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.line, self.course)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshotRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub line: String,
    #[serde(deserialize_with = "string_or_number")]
    pub course: String,
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon")]
    pub longitude: f64,
    #[serde(
        default,
        alias = "direction",
        alias = "bearing",
        deserialize_with = "number_or_zero"
    )]
    pub heading: f64,
    #[serde(
        default,
        alias = "vehicle",
        alias = "vehicleLabel",
        deserialize_with = "non_empty_string"
    )]
    pub vehicle_label: Option<String>,
    #[serde(default, deserialize_with = "non_empty_string")]
    pub headsign: Option<String>,
}

impl VehicleSnapshotRecord {
    pub fn key(&self) -> RouteKey {
        RouteKey::new(self.line.clone(), self.course.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingEntryRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub line: String,
    #[serde(deserialize_with = "string_or_number")]
    pub course: String,
    #[serde(
        default,
        alias = "vehicle",
        alias = "vehicleLabel",
        deserialize_with = "non_empty_string"
    )]
    pub vehicle_label: Option<String>,
    #[serde(default, alias = "nextStop", deserialize_with = "null_as_empty")]
    pub next_stop: String,
    #[serde(default, deserialize_with = "non_empty_string")]
    pub headsign: Option<String>,
}

impl MissingEntryRecord {
    pub fn key(&self) -> RouteKey {
        RouteKey::new(self.line.clone(), self.course.clone())
    }
}

/// Which line list populates the line selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LineCatalog {
    /// Every line the feed currently knows about (`/lines`).
    #[default]
    All,
    /// The configured core tram network only (`/essen_lines`).
    Core,
}

/// Filter parameters of a `/vehicles` request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct VehicleQuery {
    pub line: Option<String>,
    pub course: Option<String>,
}

// the backend emits route ids and trip ids as numbers for some feeds
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(i) => i.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}

fn number_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

fn non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.trim().is_empty()))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vehicle_accepts_backend_field_names() {
        let raw = r#"[{"line":"101","course":"12","lat":51.45,"lon":7.01,"direction":90.0,"timestamp":1700000000}]"#;
        let parsed: Vec<VehicleSnapshotRecord> = serde_json::from_str(raw).unwrap();

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].key(), RouteKey::new("101", "12"));
        assert_eq!(parsed[0].latitude, 51.45);
        assert_eq!(parsed[0].longitude, 7.01);
        assert_eq!(parsed[0].heading, 90.0);
        assert_eq!(parsed[0].vehicle_label, None);
    }

    #[test]
    fn vehicle_accepts_long_names_and_numeric_ids() {
        let raw = r#"{"line":105,"course":7,"latitude":51.4,"longitude":7.0,"heading":null,"vehicleLabel":"1502","headsign":""}"#;
        let parsed: VehicleSnapshotRecord = serde_json::from_str(raw).unwrap();

        assert_eq!(parsed.line, "105");
        assert_eq!(parsed.course, "7");
        assert_eq!(parsed.heading, 0.0);
        assert_eq!(parsed.vehicle_label.as_deref(), Some("1502"));
        assert_eq!(parsed.headsign, None);
    }

    #[test]
    fn missing_entry_tolerates_null_next_stop() {
        let raw = r#"{"line":"106","course":"trip-9","vehicle":"","next_stop":null,"headsign":"Helenenstr."}"#;
        let parsed: MissingEntryRecord = serde_json::from_str(raw).unwrap();

        assert_eq!(parsed.next_stop, "");
        assert_eq!(parsed.vehicle_label, None);
        assert_eq!(parsed.headsign.as_deref(), Some("Helenenstr."));
    }

    #[test]
    fn route_key_display() {
        assert_eq!(RouteKey::new("101", "12").to_string(), "101-12");
    }
}
