//! In-memory [`SearchService`] for testing and offline use.
//!
//! Emulates the catalog's server-side filtering: item type membership, an
//! inclusive acquisition window, and footprint intersection. Intersection
//! is approximated by bounding-box overlap. Results come back in insertion
//! order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::CrossoverError;
use crate::footprint::Polygon;
use crate::models::{Coordinate, Footprint, RawCandidate};
use crate::time::parse_catalog_timestamp;

use super::{SearchQuery, SearchService};

struct IndexedItem {
    footprint: Polygon,
    candidate: RawCandidate,
}

pub struct InMemorySearch {
    items: RwLock<Vec<IndexedItem>>,
    calls: AtomicUsize,
}

impl InMemorySearch {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Index an item. Its `properties` must carry `acquired` and
    /// `item_type` to ever match.
    pub fn insert(&self, id: &str, footprint: Footprint, properties: Map<String, Value>) {
        self.items.write().unwrap().push(IndexedItem {
            footprint: Polygon::from_footprint(&footprint),
            candidate: RawCandidate {
                id: id.to_string(),
                properties,
            },
        });
    }

    /// Index an axis-aligned item covering `[min_lon, max_lon] x [min_lat, max_lat]`.
    pub fn insert_box(
        &self,
        id: &str,
        (min_lon, min_lat, max_lon, max_lat): (f64, f64, f64, f64),
        properties: Map<String, Value>,
    ) {
        let c = |longitude, latitude| Coordinate {
            longitude,
            latitude,
        };
        self.insert(
            id,
            Footprint {
                upper_left: c(min_lon, max_lat),
                upper_right: c(max_lon, max_lat),
                lower_right: c(max_lon, min_lat),
                lower_left: c(min_lon, min_lat),
            },
            properties,
        );
    }

    /// Number of `search` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for InMemorySearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchService for InMemorySearch {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawCandidate>, CrossoverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let items = self.items.read().unwrap();
        let hits = items
            .iter()
            .filter(|item| {
                let props = &item.candidate.properties;
                let type_ok = props
                    .get("item_type")
                    .and_then(Value::as_str)
                    .map(|t| query.item_types.iter().any(|q| q == t))
                    .unwrap_or(false);
                let time_ok = props
                    .get("acquired")
                    .and_then(Value::as_str)
                    .and_then(|s| parse_catalog_timestamp(s).ok())
                    .map(|t| query.window.contains(&t))
                    .unwrap_or(false);
                type_ok && time_ok && item.footprint.bounds_intersect(&query.footprint)
            })
            .map(|item| item.candidate.clone())
            .collect();
        Ok(hits)
    }
}
