//! Snippet rendering.
//!
//! Maps one [`ActivityRecord`] to one `<article>` fragment. Rendering is pure:
//! the same record always produces byte-identical markup.
//!
//! Each snippet embeds its activity id twice, as `data-activity-id` and as a
//! `<site>/activities/<id>` link, so the merge engine can recover ids from a
//! published page without any side index.

use chrono::NaiveDateTime;
use html5ever::{namespace_url, ns, LocalName, QualName};
use kuchikiki::{Attribute, ExpandedName, NodeRef};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::activity::{ActivityId, ActivityRecord};
use crate::error::RenderError;
use crate::journal::ID_ATTRIBUTE;

/// Meters to statute miles.
pub const METERS_TO_MILES: f64 = 0.000621371;
/// Meters to feet.
pub const METERS_TO_FEET: f64 = 3.28084;

/// Strict UTC timestamp format used by the activity API.
pub const START_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const MISSING: &str = "N/A";
const NO_DESCRIPTION: &str = "No description provided.";

/// Everything but RFC 3986 unreserved characters.
const ID_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// How dates are shown in snippets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateStyle {
    /// `March 04, 2025`
    #[default]
    Long,
    /// `2025-03-04`
    Iso,
}

/// Display fields derived from a record, carried next to the markup so the
/// manifest never has to re-read rendered HTML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: ActivityId,
    pub name: String,
    /// ISO `YYYY-MM-DD`, regardless of [`DateStyle`]
    pub date: String,
    pub distance_miles: String,
    pub elevation_feet: Option<i64>,
    pub moving_time: String,
    pub average_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
    pub url: String,
}

/// A rendered fragment keyed by its activity id.
///
/// The card is built as a DOM subtree; [`markup`](Self::markup) is its
/// serialized form and [`to_node`](Self::to_node) rebuilds the same subtree
/// for insertion without reparsing text.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSnippet {
    pub id: ActivityId,
    pub entry: JournalEntry,
    display_date: String,
    description: String,
    markup: String,
}

impl RenderedSnippet {
    pub fn markup(&self) -> &str {
        &self.markup
    }

    /// A detached `<article>` card for this snippet.
    pub fn to_node(&self) -> NodeRef {
        build_card(&self.entry, &self.display_date, &self.description)
    }
}

/// Renders activity records into journal snippets.
#[derive(Debug, Clone)]
pub struct SnippetRenderer {
    site_base: String,
    date_style: DateStyle,
}

impl SnippetRenderer {
    pub fn new(site_base: &str, date_style: DateStyle) -> Self {
        Self {
            site_base: site_base.trim_end_matches('/').to_string(),
            date_style,
        }
    }

    /// Public link for an activity. The id is percent-encoded as one path
    /// segment.
    pub fn activity_url(&self, id: &ActivityId) -> String {
        format!(
            "{}/activities/{}",
            self.site_base,
            utf8_percent_encode(id.as_str(), ID_SEGMENT)
        )
    }

    /// Render one record.
    ///
    /// Fails when `id`, `name`, `distance`, `moving_time` or `start_date` is
    /// missing or malformed. Optional fields render as placeholders.
    pub fn render(&self, record: &ActivityRecord) -> Result<RenderedSnippet, RenderError> {
        let id = record.id.clone().ok_or_else(|| RenderError::MissingField {
            id: record.id_label(),
            field: "id",
        })?;
        let missing = |field: &'static str| RenderError::MissingField {
            id: id.to_string(),
            field,
        };

        let name = record
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| missing("name"))?;
        let distance = record.distance_meters.ok_or_else(|| missing("distance"))?;
        if !distance.is_finite() || distance < 0.0 {
            return Err(RenderError::InvalidField {
                id: id.to_string(),
                field: "distance",
                details: format!("{} is not a non-negative distance", distance),
            });
        }
        let moving_time = record
            .moving_time_seconds
            .ok_or_else(|| missing("moving_time"))?;
        let start_raw = record
            .start_time
            .as_deref()
            .ok_or_else(|| missing("start_date"))?;
        let start = parse_start_time(start_raw).map_err(|e| RenderError::InvalidField {
            id: id.to_string(),
            field: "start_date",
            details: format!("{:?}: {}", start_raw, e),
        })?;

        let entry = JournalEntry {
            id: id.clone(),
            name: name.to_string(),
            date: format_date(&start, DateStyle::Iso),
            distance_miles: format_miles(distance),
            elevation_feet: record
                .elevation_gain_meters
                .filter(|m| m.is_finite())
                .map(feet_rounded),
            moving_time: format_moving_time(moving_time),
            average_heart_rate: record.average_heart_rate,
            max_heart_rate: record.max_heart_rate,
            url: self.activity_url(&id),
        };
        let display_date = format_date(&start, self.date_style);
        let description = record
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(NO_DESCRIPTION)
            .to_string();

        let markup = build_card(&entry, &display_date, &description).to_string();
        Ok(RenderedSnippet {
            id,
            entry,
            display_date,
            description,
            markup,
        })
    }
}

/// Card layout. Text and attribute values are escaped by the serializer.
fn build_card(entry: &JournalEntry, display_date: &str, description: &str) -> NodeRef {
    let card = html_element(
        "article",
        &[("class", "workout-card"), (ID_ATTRIBUTE, entry.id.as_str())],
    );
    let heading = html_element("h2", &[]);
    heading.append(NodeRef::new_text(entry.name.as_str()));
    card.append(NodeRef::new_text("\n  "));
    card.append(heading);

    let elevation = entry
        .elevation_feet
        .map_or_else(|| MISSING.to_string(), |ft| format!("{} ft", ft));
    let fields = [
        ("Date", display_date.to_string()),
        ("Distance", format!("{} mi", entry.distance_miles)),
        ("Elevation Gain", elevation),
        ("Moving Time", entry.moving_time.clone()),
        ("Avg HR", format_heart_rate(entry.average_heart_rate)),
        ("Max HR", format_heart_rate(entry.max_heart_rate)),
        ("Description", description.to_string()),
    ];
    for (label, value) in fields {
        let label_node = html_element("strong", &[]);
        label_node.append(NodeRef::new_text(format!("{}:", label)));
        let row = html_element("p", &[]);
        row.append(label_node);
        row.append(NodeRef::new_text(format!(" {}", value)));
        card.append(NodeRef::new_text("\n  "));
        card.append(row);
    }

    let link = html_element(
        "a",
        &[
            ("href", entry.url.as_str()),
            ("rel", "noopener"),
            ("target", "_blank"),
        ],
    );
    link.append(NodeRef::new_text("View on Strava"));
    card.append(NodeRef::new_text("\n  "));
    card.append(link);
    card.append(NodeRef::new_text("\n"));
    card
}

/// Detached HTML element with plain (namespace-less) attributes.
pub(crate) fn html_element(tag: &str, attributes: &[(&str, &str)]) -> NodeRef {
    NodeRef::new_element(
        QualName::new(None, ns!(html), LocalName::from(tag)),
        attributes.iter().map(|(name, value)| {
            (
                ExpandedName::new(ns!(), LocalName::from(*name)),
                Attribute {
                    prefix: None,
                    value: (*value).to_string(),
                },
            )
        }),
    )
}

/// Parse a strict `YYYY-MM-DDTHH:MM:SSZ` timestamp.
pub fn parse_start_time(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, START_TIME_FORMAT)
}

pub fn format_date(start: &NaiveDateTime, style: DateStyle) -> String {
    match style {
        DateStyle::Long => start.format("%B %d, %Y").to_string(),
        DateStyle::Iso => start.format("%Y-%m-%d").to_string(),
    }
}

/// Meters as miles with two decimals.
pub fn format_miles(meters: f64) -> String {
    format!("{:.2}", meters * METERS_TO_MILES)
}

/// Meters as whole feet.
pub fn feet_rounded(meters: f64) -> i64 {
    (meters * METERS_TO_FEET).round() as i64
}

/// `H:MM:SS` from one hour up, `M:SS` below.
pub fn format_moving_time(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

fn format_heart_rate(bpm: Option<f64>) -> String {
    match bpm {
        Some(v) if v.is_finite() => format!("{:.1} bpm", v),
        _ => MISSING.to_string(),
    }
}
