//! Core data models that flow from the legacy catalog export, through
//! crossover matching, into the compositing pipeline.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CrossoverError;
use crate::georef::RasterGeometry;
use crate::time::{parse_catalog_timestamp, parse_legacy_timestamp, AcquisitionOffset};

/// Key of the acquisition timestamp inside a legacy record's `extended` map.
pub const SCENE_START_TIME_FIELD: &str = "Scene Start Time";

/// Ids end up as file and directory names, so they must be a single plain
/// path component.
pub fn check_file_id(record: &str, field: &str, value: &str) -> Result<(), CrossoverError> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(|c: char| matches!(c, '/' | '\\' | ':' | '\0'));
    if bad {
        return Err(CrossoverError::parse(
            record,
            format!("{field} '{value}' is not usable as a file name"),
        ));
    }
    Ok(())
}

/// A longitude/latitude pair as the legacy catalog exports it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
}

/// The four named corners of a scene, in export order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    #[serde(rename = "upperLeftCoordinate")]
    pub upper_left: Coordinate,
    #[serde(rename = "upperRightCoordinate")]
    pub upper_right: Coordinate,
    #[serde(rename = "lowerRightCoordinate")]
    pub lower_right: Coordinate,
    #[serde(rename = "lowerLeftCoordinate")]
    pub lower_left: Coordinate,
}

/// Wire shape of one legacy catalog record.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRecord {
    display_id: String,
    #[serde(flatten)]
    footprint: Footprint,
    #[serde(default)]
    extended: Map<String, Value>,
}

/// A scene from the legacy hyperspectral archive.
#[derive(Debug, Clone)]
pub struct SourceScene {
    pub id: String,
    pub footprint: Footprint,
    /// Acquisition instant, declared UTC at ingestion.
    pub acquired: DateTime<Utc>,
    pub extended: Map<String, Value>,
}

impl SourceScene {
    /// Parse one record of the legacy catalog export.
    ///
    /// `position` names the record in errors when it has no usable id.
    pub fn from_record(record: &Value, position: usize) -> Result<Self, CrossoverError> {
        let label = record
            .get("displayId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{position}"));

        let parsed: LegacyRecord = serde_json::from_value(record.clone())
            .map_err(|e| CrossoverError::parse(&label, e.to_string()))?;

        let raw_time = parsed
            .extended
            .get(SCENE_START_TIME_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CrossoverError::parse(&label, format!("missing extended '{SCENE_START_TIME_FIELD}'"))
            })?;
        let acquired =
            parse_legacy_timestamp(raw_time).map_err(|e| CrossoverError::parse(&label, e))?;
        check_file_id(&label, "displayId", &parsed.display_id)?;

        Ok(Self {
            id: parsed.display_id,
            footprint: parsed.footprint,
            acquired,
            extended: parsed.extended,
        })
    }

    /// Leading part of the display id, used to name on-disk artifacts
    /// (the browse archive names its files this way).
    pub fn file_stem(id: &str) -> &str {
        id.split('_').next().unwrap_or(id)
    }
}

/// A candidate exactly as the search service returned it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCandidate {
    pub id: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A catalog item that crossed over a source scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub id: String,
    pub item_type: String,
    pub acquired: DateTime<Utc>,
    pub acquisition_offset: String,
    /// Passed through untouched for the compositing stage.
    pub properties: Map<String, Value>,
}

impl CandidateMatch {
    pub fn from_raw(raw: RawCandidate, source_time: &DateTime<Utc>) -> Result<Self, CrossoverError> {
        let acquired = raw
            .properties
            .get("acquired")
            .and_then(Value::as_str)
            .ok_or_else(|| CrossoverError::parse(&raw.id, "missing properties.acquired"))
            .and_then(|s| parse_catalog_timestamp(s).map_err(|e| CrossoverError::parse(&raw.id, e)))?;
        let item_type = raw
            .properties
            .get("item_type")
            .and_then(Value::as_str)
            .ok_or_else(|| CrossoverError::parse(&raw.id, "missing properties.item_type"))?
            .to_string();
        check_file_id(&raw.id, "id", &raw.id)?;
        check_file_id(&raw.id, "item_type", &item_type)?;

        Ok(Self {
            acquisition_offset: AcquisitionOffset::between(source_time, &acquired).to_string(),
            id: raw.id,
            item_type,
            acquired,
            properties: raw.properties,
        })
    }

    /// Full-resolution raster geometry carried in the properties.
    pub fn raster_geometry(&self) -> Result<RasterGeometry, CrossoverError> {
        let number = |key: &str| {
            self.properties
                .get(key)
                .and_then(Value::as_f64)
                .ok_or_else(|| CrossoverError::parse(&self.id, format!("missing numeric properties.{key}")))
        };
        let columns = number("columns")?;
        if !(columns >= 1.0 && columns.fract() == 0.0 && columns <= u32::MAX as f64) {
            return Err(CrossoverError::parse(
                &self.id,
                "properties.columns must be a whole number >= 1",
            ));
        }
        let pixel_resolution = number("pixel_resolution")?;
        if !(pixel_resolution > 0.0 && pixel_resolution.is_finite()) {
            return Err(CrossoverError::parse(
                &self.id,
                "properties.pixel_resolution must be a positive number",
            ));
        }
        let (origin_x, origin_y) = (number("origin_x")?, number("origin_y")?);
        if !(origin_x.is_finite() && origin_y.is_finite()) {
            return Err(CrossoverError::parse(&self.id, "properties origin must be finite"));
        }
        Ok(RasterGeometry {
            columns: columns as u32,
            pixel_resolution,
            origin_x,
            origin_y,
        })
    }

    /// File stem of this candidate's rasters: `<item_type>_<id>`.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.item_type, self.id)
    }
}

/// A source scene and every candidate that crossed over it, in the order
/// the search service returned them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossoverGroup {
    pub source_scene_id: String,
    pub crossovers: Vec<CandidateMatch>,
}

impl CrossoverGroup {
    /// Groups only exist for scenes with at least one match. A candidate
    /// listed twice is kept once, at its first position.
    pub fn new(source_scene_id: impl Into<String>, mut crossovers: Vec<CandidateMatch>) -> Option<Self> {
        let mut seen = HashSet::new();
        crossovers.retain(|m| seen.insert((m.item_type.clone(), m.id.clone())));
        if crossovers.is_empty() {
            return None;
        }
        Some(Self {
            source_scene_id: source_scene_id.into(),
            crossovers,
        })
    }

    /// Check a group read back from a document: every id must be usable
    /// as a file name and no candidate may appear twice.
    pub fn validate(&self) -> Result<(), CrossoverError> {
        let record = &self.source_scene_id;
        check_file_id(record, "source_scene_id", record)?;
        let mut seen = HashSet::new();
        for m in &self.crossovers {
            check_file_id(record, "candidate id", &m.id)?;
            check_file_id(record, "candidate item_type", &m.item_type)?;
            if !seen.insert((m.item_type.as_str(), m.id.as_str())) {
                return Err(CrossoverError::parse(
                    record,
                    format!("candidate {} {} is listed twice", m.item_type, m.id),
                ));
            }
        }
        Ok(())
    }
}
