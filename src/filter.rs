//! Activity relevance filter: exact type match plus start-location geofence.

use crate::activity::ActivityRecord;
use crate::geo_utils;
use crate::GeoBoundingBox;

/// Keeps activities of one type that started inside a bounding box.
#[derive(Debug, Clone)]
pub struct ActivityFilter {
    activity_type: String,
    bounds: GeoBoundingBox,
}

impl ActivityFilter {
    pub fn new(activity_type: impl Into<String>, bounds: GeoBoundingBox) -> Self {
        Self {
            activity_type: activity_type.into(),
            bounds,
        }
    }

    pub fn activity_type(&self) -> &str {
        &self.activity_type
    }

    pub fn bounds(&self) -> &GeoBoundingBox {
        &self.bounds
    }

    /// True when the type matches exactly (case-sensitive) and the start
    /// location is present and inside the bounds, edges included.
    pub fn is_relevant(&self, record: &ActivityRecord) -> bool {
        record.activity_type.as_deref() == Some(self.activity_type.as_str())
            && geo_utils::start_in_bounds(&self.bounds, record.start_location.as_ref())
    }

    /// Keep relevant records, preserving their order.
    pub fn retain_relevant(&self, records: Vec<ActivityRecord>) -> Vec<ActivityRecord> {
        records.into_iter().filter(|r| self.is_relevant(r)).collect()
    }
}
