//! Raster fetching abstraction.
//!
//! An [`ImageFetcher`] turns a catalog item reference into encoded raster
//! bytes at a requested display width. Fetchers that know where their
//! raster sits on the ground (the legacy browse archive ships a world file)
//! return it alongside the bytes.

use async_trait::async_trait;

use crate::error::CrossoverError;
use crate::georef::GeoReference;

/// Identifies one catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemRef {
    pub item_type: String,
    pub id: String,
}

impl ItemRef {
    pub fn new(item_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            item_type: item_type.into(),
            id: id.into(),
        }
    }
}

/// Encoded raster plus the reference that came with it, if any.
#[derive(Debug, Clone)]
pub struct FetchedRaster {
    pub bytes: Vec<u8>,
    pub georef: Option<GeoReference>,
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetch a browse raster for `item`, `width` pixels wide where the
    /// source supports resampling.
    async fn fetch(&self, item: &ItemRef, width: u32) -> Result<FetchedRaster, CrossoverError>;
}
