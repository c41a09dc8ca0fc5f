//! Raster backend abstraction: the three verbs the compositing pipeline
//! drives.
//!
//! Every operation takes explicit absolute paths and owns no state between
//! calls, so distinct groups can be processed concurrently.

use std::path::{Path, PathBuf};

use crate::error::CrossoverError;

/// How a layer's background is made transparent before tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransparencyPolicy {
    /// Key out pixels of exactly this RGB colour (within `tolerance` per
    /// channel).
    Matte { rgb: [u8; 3], tolerance: u8 },
    /// Crop to the bounding box of non-background content. Background is
    /// the top-left pixel's colour, or any fully transparent pixel.
    Trim,
}

/// Pixels removed from the leading edges by a transparency step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Crop {
    pub left: u32,
    pub top: u32,
}

pub trait RasterBackend: Send + Sync {
    /// Write a transparency-processed copy of `input` to `output`.
    fn make_transparent(
        &self,
        input: &Path,
        policy: TransparencyPolicy,
        output: &Path,
    ) -> Result<Crop, CrossoverError>;

    /// Write `input` to `output` as a georeferenced raster using the world
    /// file sidecar at `world_file`.
    fn geo_tag(&self, input: &Path, world_file: &Path, output: &Path) -> Result<(), CrossoverError>;

    /// Merge georeferenced `layers` into `output`. Later layers paint over
    /// earlier ones wherever they overlap.
    fn mosaic(&self, layers: &[PathBuf], output: &Path) -> Result<(), CrossoverError>;
}
