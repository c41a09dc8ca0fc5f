//! Crossover matching.
//!
//! For each [`SourceScene`]: build the closed footprint polygon and the
//! acquisition window, run exactly one search, convert every returned
//! candidate into a [`CandidateMatch`] with its acquisition offset, and
//! keep the scene only if at least one candidate survived.
//!
//! Candidates that fail to parse are rejected individually and reported;
//! they never fail the scene. Search errors do fail it.

use std::sync::Arc;

use chrono::TimeDelta;

use crate::error::CrossoverError;
use crate::footprint::Polygon;
use crate::models::{CandidateMatch, CrossoverGroup, SourceScene};
use crate::search::{SearchQuery, SearchService};
use crate::time::{window_width, TimeWindow};

/// Matches for one scene, plus the candidates that had to be rejected.
#[derive(Debug)]
pub struct SceneMatches {
    pub scene_id: String,
    pub matches: Vec<CandidateMatch>,
    pub rejected: Vec<CrossoverError>,
}

impl SceneMatches {
    /// The scene's group, or `None` when nothing matched.
    pub fn into_group(self) -> Option<CrossoverGroup> {
        CrossoverGroup::new(self.scene_id, self.matches)
    }
}

/// Outcome of a whole batch.
#[derive(Debug, Default)]
pub struct FinderReport {
    pub groups: Vec<CrossoverGroup>,
    pub scenes_without_matches: usize,
    pub rejected: Vec<CrossoverError>,
}

pub struct CrossoverFinder {
    search: Arc<dyn SearchService>,
    window: TimeDelta,
    item_types: Vec<String>,
}

impl CrossoverFinder {
    pub fn new(search: Arc<dyn SearchService>, window_hours: f64, item_types: Vec<String>) -> Self {
        Self {
            search,
            window: window_width(window_hours),
            item_types,
        }
    }

    pub fn query_for(&self, scene: &SourceScene) -> SearchQuery {
        SearchQuery {
            footprint: Polygon::from_footprint(&scene.footprint),
            window: TimeWindow::around(scene.acquired, self.window),
            item_types: self.item_types.clone(),
        }
    }

    pub async fn match_scene(&self, scene: &SourceScene) -> Result<SceneMatches, CrossoverError> {
        let query = self.query_for(scene);
        let candidates = self.search.search(&query).await?;

        let mut matches = Vec::with_capacity(candidates.len());
        let mut rejected = Vec::new();
        for raw in candidates {
            match CandidateMatch::from_raw(raw, &scene.acquired) {
                Ok(m) => matches.push(m),
                Err(e) => rejected.push(e),
            }
        }

        Ok(SceneMatches {
            scene_id: scene.id.clone(),
            matches,
            rejected,
        })
    }

    /// Match every scene in order. Stops at the first search error.
    pub async fn find_all(&self, scenes: &[SourceScene]) -> Result<FinderReport, CrossoverError> {
        let mut report = FinderReport::default();
        for scene in scenes {
            let mut outcome = self.match_scene(scene).await?;
            report.rejected.append(&mut outcome.rejected);
            match outcome.into_group() {
                Some(group) => report.groups.push(group),
                None => report.scenes_without_matches += 1,
            }
        }
        Ok(report)
    }
}
