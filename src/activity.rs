//! Activity records as returned by the Strava API.
//!
//! Every field is optional on the wire side: a record missing a required
//! field is still decoded and is rejected later by the renderer. A list page
//! is decoded entry by entry with [`decode_page`], so one entry of the wrong
//! shape never fails the whole page.

use std::fmt;

use log::warn;
use serde::{Deserialize, Deserializer, Serialize};

use crate::GpsPoint;

/// Opaque, stable activity identifier. Used as the dedup key.
///
/// The API sends integers; ids are kept as strings so they compare the same
/// way whether they came from JSON or from a link in the journal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawId", into = "String")]
pub struct ActivityId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

impl From<RawId> for ActivityId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Number(n) => Self(n.to_string()),
            RawId::Text(s) => Self(s),
        }
    }
}

impl From<ActivityId> for String {
    fn from(id: ActivityId) -> Self {
        id.0
    }
}

impl From<&str> for ActivityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ActivityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for ActivityId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl ActivityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One recorded workout. Read-only; never persisted directly.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ActivityRecord {
    #[serde(default)]
    pub id: Option<ActivityId>,
    #[serde(rename = "type", default)]
    pub activity_type: Option<String>,
    /// Strict UTC `YYYY-MM-DDTHH:MM:SSZ`.
    #[serde(rename = "start_date", default)]
    pub start_time: Option<String>,
    #[serde(rename = "start_latlng", default, deserialize_with = "deserialize_latlng")]
    pub start_location: Option<GpsPoint>,
    #[serde(rename = "distance", default)]
    pub distance_meters: Option<f64>,
    #[serde(rename = "total_elevation_gain", default)]
    pub elevation_gain_meters: Option<f64>,
    #[serde(rename = "moving_time", default)]
    pub moving_time_seconds: Option<u64>,
    #[serde(rename = "average_heartrate", default)]
    pub average_heart_rate: Option<f64>,
    #[serde(rename = "max_heartrate", default)]
    pub max_heart_rate: Option<f64>,
    /// Only present on the detailed form of a record.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ActivityRecord {
    /// Id as a display string, for log lines about records that may lack one.
    pub fn id_label(&self) -> String {
        self.id
            .as_ref()
            .map_or_else(|| "<no id>".to_string(), ToString::to_string)
    }
}

/// Decode each element of a list page on its own, logging and dropping the
/// ones that do not fit [`ActivityRecord`].
pub fn decode_page(values: Vec<serde_json::Value>) -> Vec<ActivityRecord> {
    let mut records = Vec::with_capacity(values.len());
    for value in values {
        let label = value
            .get("id")
            .map_or_else(|| "<no id>".to_string(), ToString::to_string);
        match ActivityRecord::deserialize(value) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping undecodable activity {}: {}", label, e),
        }
    }
    records
}

/// `start_latlng` is `[lat, lng]`, `[]`, or `null` when the activity has no GPS.
fn deserialize_latlng<'de, D>(deserializer: D) -> Result<Option<GpsPoint>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<f64>> = Option::deserialize(deserializer)?;
    Ok(match raw.as_deref() {
        Some([lat, lng]) => Some(GpsPoint::new(*lat, *lng)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_page_skips_bad_entries() {
        let page: Vec<serde_json::Value> = serde_json::from_str(
            r#"[
                {"id": 1, "type": "Run", "moving_time": 60.5},
                {"id": 2, "type": "RollerSki", "moving_time": 1800, "name": "Good"},
                "not an object",
                {"id": 3, "start_latlng": "north"}
            ]"#,
        )
        .unwrap();

        let records = decode_page(page);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, Some(ActivityId::from("2")));
        assert_eq!(records[0].moving_time_seconds, Some(1800));
    }

    #[test]
    fn test_decode_summary_record() {
        let json = r#"{
            "id": 12345678901,
            "name": "Morning Roll",
            "type": "RollerSki",
            "start_date": "2025-03-04T15:00:00Z",
            "start_latlng": [32.71, -117.16],
            "distance": 16093.4,
            "total_elevation_gain": 120.5,
            "moving_time": 3725,
            "average_heartrate": 141.2,
            "athlete": {"id": 1}
        }"#;
        let record: ActivityRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.id, Some(ActivityId::from("12345678901")));
        assert_eq!(record.activity_type.as_deref(), Some("RollerSki"));
        assert_eq!(record.start_location, Some(GpsPoint::new(32.71, -117.16)));
        assert_eq!(record.moving_time_seconds, Some(3725));
        assert_eq!(record.max_heart_rate, None);
        assert_eq!(record.description, None);
    }

    #[test]
    fn test_empty_latlng_is_absent() {
        let a: ActivityRecord = serde_json::from_str(r#"{"id": 1, "start_latlng": []}"#).unwrap();
        let b: ActivityRecord = serde_json::from_str(r#"{"id": 2, "start_latlng": null}"#).unwrap();
        let c: ActivityRecord = serde_json::from_str(r#"{"id": 3}"#).unwrap();
        assert_eq!(a.start_location, None);
        assert_eq!(b.start_location, None);
        assert_eq!(c.start_location, None);
    }

    #[test]
    fn test_string_and_numeric_ids_compare_equal() {
        let a: ActivityRecord = serde_json::from_str(r#"{"id": 111}"#).unwrap();
        let b: ActivityRecord = serde_json::from_str(r#"{"id": "111"}"#).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(serde_json::to_string(&a.id).unwrap(), "\"111\"");
    }

    #[test]
    fn test_missing_fields_decode() {
        let record: ActivityRecord = serde_json::from_str("{}").unwrap();
        assert_eq!(record, ActivityRecord::default());
        assert_eq!(record.id_label(), "<no id>");
    }
}
