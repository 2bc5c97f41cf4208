//! # Geofence Utilities
//!
//! Point-in-rectangle checks for activity start locations.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`to_rect`] | Convert a [`GeoBoundingBox`] into a `geo::Rect` |
//! | [`rect_contains`] | Inclusive point-in-rectangle test |
//! | [`start_in_bounds`] | Geofence test for an optional start location |
//!
//! ## Coordinate System
//!
//! Inputs are WGS84 latitude/longitude in degrees. `geo` uses `x = longitude`,
//! `y = latitude`, so the conversion swaps the order at the boundary of this
//! module. Boxes crossing the antimeridian are not supported.

use geo::{coord, Intersects, Rect};

use crate::{GeoBoundingBox, GpsPoint};

/// Convert a bounding box into a `geo` rectangle (x = longitude, y = latitude).
#[inline]
pub fn to_rect(bounds: &GeoBoundingBox) -> Rect<f64> {
    Rect::new(
        coord! { x: bounds.west(), y: bounds.south() },
        coord! { x: bounds.east(), y: bounds.north() },
    )
}

/// Check whether `point` lies within `rect`, edges included.
///
/// Invalid points (NaN, out of WGS84 range) are never contained.
#[inline]
pub fn rect_contains(rect: &Rect<f64>, point: &GpsPoint) -> bool {
    if !point.is_valid() {
        return false;
    }
    rect.intersects(&coord! { x: point.longitude, y: point.latitude })
}

/// Geofence test for an optional start location. A missing location is
/// never inside.
pub fn start_in_bounds(bounds: &GeoBoundingBox, start: Option<&GpsPoint>) -> bool {
    match start {
        Some(point) => rect_contains(&to_rect(bounds), point),
        None => false,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
