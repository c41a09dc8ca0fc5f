//! Closed footprint rings for geometry-filtered search.
//!
//! Corners are taken in export order and closed by repeating the first.
//! No winding normalization or topology validation is done; a
//! self-intersecting or antimeridian-crossing footprint passes through.

use serde_json::{json, Value};

use crate::models::{Coordinate, Footprint};

/// A closed ring of exactly five vertices, first == last.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Polygon {
    ring: [Coordinate; 5],
}

impl Polygon {
    /// UL, UR, LR, LL, UL.
    pub fn from_footprint(footprint: &Footprint) -> Self {
        Self {
            ring: [
                footprint.upper_left,
                footprint.upper_right,
                footprint.lower_right,
                footprint.lower_left,
                footprint.upper_left,
            ],
        }
    }

    pub fn vertices(&self) -> &[Coordinate; 5] {
        &self.ring
    }

    /// `(min_lon, min_lat, max_lon, max_lat)` of the ring.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.ring.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(x0, y0, x1, y1), c| {
                (
                    x0.min(c.longitude),
                    y0.min(c.latitude),
                    x1.max(c.longitude),
                    y1.max(c.latitude),
                )
            },
        )
    }

    /// Axis-aligned bounding-box overlap, edges touching counts.
    pub fn bounds_intersect(&self, other: &Polygon) -> bool {
        let (ax0, ay0, ax1, ay1) = self.bounds();
        let (bx0, by0, bx1, by1) = other.bounds();
        ax0 <= bx1 && bx0 <= ax1 && ay0 <= by1 && by0 <= ay1
    }

    /// GeoJSON `Polygon` geometry with `[lon, lat]` positions.
    pub fn to_geojson(&self) -> Value {
        let ring: Vec<[f64; 2]> = self
            .ring
            .iter()
            .map(|c| [c.longitude, c.latitude])
            .collect();
        json!({
            "type": "Polygon",
            "coordinates": [ring],
        })
    }
}
