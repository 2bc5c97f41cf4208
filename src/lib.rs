//! # Activity Journal
//!
//! Publishes a static HTML journal of outdoor activities pulled from Strava.
//!
//! This library provides:
//! - OAuth refresh-token exchange with an on-disk token cache
//! - Recent-activity fetching with bounded detail fan-out
//! - Activity type + geofence filtering
//! - Snippet rendering (miles, feet, `H:MM:SS`, long-form dates)
//! - An idempotent merge of new snippets into a persisted HTML page
//!
//! ## Features
//!
//! - **`http`** - Enable HTTP clients (token exchange, activity API, publishing)
//! - **`cli`** - Build the `activity-journal` binary
//!
//! ## Quick Start
//!
//! ```rust
//! use activity_journal::{ActivityFilter, GeoBoundingBox, JournalMerger, SnippetRenderer, DateStyle};
//! use activity_journal::activity::{ActivityId, ActivityRecord};
//! use activity_journal::GpsPoint;
//!
//! let bounds = GeoBoundingBox::new(32.5343, 33.1145, -117.292, -116.0856).unwrap();
//! let filter = ActivityFilter::new("RollerSki", bounds);
//!
//! let record = ActivityRecord {
//!     id: Some(ActivityId::from("999")),
//!     activity_type: Some("RollerSki".to_string()),
//!     start_time: Some("2025-03-04T15:00:00Z".to_string()),
//!     start_location: Some(GpsPoint::new(32.71, -117.16)),
//!     distance_meters: Some(16093.4),
//!     moving_time_seconds: Some(3725),
//!     name: Some("Morning Roll".to_string()),
//!     ..Default::default()
//! };
//! assert!(filter.is_relevant(&record));
//!
//! let renderer = SnippetRenderer::new("https://www.strava.com", DateStyle::Long);
//! let snippet = renderer.render(&record).unwrap();
//!
//! let merger = JournalMerger::new("activity-journal");
//! let outcome = merger.merge("", &[snippet]).unwrap();
//! assert_eq!(outcome.inserted.len(), 1);
//! ```

pub mod activity;
pub mod config;
pub mod error;
pub mod filter;
pub mod geo_utils;
pub mod journal;
pub mod manifest;
pub mod render;
pub mod store;

// HTTP-backed collaborators
#[cfg(feature = "http")]
pub mod auth;
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub mod pipeline;
#[cfg(feature = "http")]
pub mod publish;

pub use activity::{ActivityId, ActivityRecord};
pub use config::{ClientCredentials, JournalConfig};
pub use error::{
    AuthError, ConfigError, JournalError, MergeError, PublishError, RenderError, Result,
    SourceError,
};
pub use filter::ActivityFilter;
pub use journal::{DocumentState, JournalMerger, MergeOutcome};
pub use manifest::JournalManifest;
pub use render::{DateStyle, JournalEntry, RenderedSnippet, SnippetRenderer};
pub use store::JournalStore;

#[cfg(feature = "http")]
pub use auth::{AccessCredential, CredentialProvider};
#[cfg(feature = "http")]
pub use http::ActivityClient;
#[cfg(feature = "http")]
pub use pipeline::{run, run_blocking, RunOptions, RunSummary};
#[cfg(feature = "http")]
pub use publish::GitHubPublisher;

use serde::{Deserialize, Serialize};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use activity_journal::GpsPoint;
/// let point = GpsPoint::new(32.7157, -117.1611); // San Diego
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Inclusive rectangular geofence.
///
/// Construct through [`GeoBoundingBox::new`], which enforces
/// `south <= north` and `west <= east`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoBoundingBox {
    south: f64,
    north: f64,
    west: f64,
    east: f64,
}

impl GeoBoundingBox {
    /// Create a bounding box, rejecting inverted or non-finite bounds.
    pub fn new(south: f64, north: f64, west: f64, east: f64) -> std::result::Result<Self, ConfigError> {
        if ![south, north, west, east].iter().all(|v| v.is_finite()) {
            return Err(ConfigError::InvalidBounds {
                details: "bounds must be finite".to_string(),
            });
        }
        if south > north {
            return Err(ConfigError::InvalidBounds {
                details: format!("south {} is above north {}", south, north),
            });
        }
        if west > east {
            return Err(ConfigError::InvalidBounds {
                details: format!("west {} is east of {}", west, east),
            });
        }
        Ok(Self { south, north, west, east })
    }

    /// San Diego County, the region the journal was built for.
    pub fn san_diego() -> Self {
        Self {
            south: 32.5343,
            north: 33.1145,
            west: -117.292,
            east: -116.0856,
        }
    }

    pub fn south(&self) -> f64 {
        self.south
    }

    pub fn north(&self) -> f64 {
        self.north
    }

    pub fn west(&self) -> f64 {
        self.west
    }

    pub fn east(&self) -> f64 {
        self.east
    }

    /// Whether `point` lies inside the box, edges included.
    pub fn contains(&self, point: &GpsPoint) -> bool {
        geo_utils::rect_contains(&geo_utils::to_rect(self), point)
    }
}

impl<'de> Deserialize<'de> for GeoBoundingBox {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            south: f64,
            north: f64,
            west: f64,
            east: f64,
        }

        let raw = Raw::deserialize(deserializer)?;
        Self::new(raw.south, raw.north, raw.west, raw.east).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
