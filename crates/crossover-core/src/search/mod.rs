//! Search abstraction over the commercial catalog.
//!
//! The [`SearchService`] trait is the seam between crossover matching and
//! whatever answers geometry + time-range queries: the HTTP catalog client
//! in the `crossovers` crate, or [`memory::InMemorySearch`] in tests.
//!
//! Implementations filter server-side: every returned candidate intersects
//! the query footprint and was acquired inside the window, bounds included.

pub mod memory;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::CrossoverError;
use crate::footprint::Polygon;
use crate::models::RawCandidate;
use crate::time::TimeWindow;

/// One geometry + acquisition-window query.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub footprint: Polygon,
    pub window: TimeWindow,
    pub item_types: Vec<String>,
}

impl SearchQuery {
    /// Catalog filter document: a geometry filter AND an inclusive
    /// `acquired` date-range filter.
    pub fn to_request_body(&self) -> Value {
        json!({
            "item_types": self.item_types,
            "filter": {
                "type": "AndFilter",
                "config": [
                    {
                        "type": "GeometryFilter",
                        "field_name": "geometry",
                        "config": self.footprint.to_geojson(),
                    },
                    {
                        "type": "DateRangeFilter",
                        "field_name": "acquired",
                        "config": {
                            "gte": self.window.start_bound(),
                            "lte": self.window.end_bound(),
                        },
                    },
                ],
            },
        })
    }
}

#[async_trait]
pub trait SearchService: Send + Sync {
    /// Run one query and return every matching candidate in service order.
    ///
    /// A failure must be reported as an error; an incomplete result list is
    /// never returned as success.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawCandidate>, CrossoverError>;
}
