//! Legacy hyperspectral archive browse fetcher.
//!
//! The archive serves a GIS-ready zip per scene holding a browse JPEG and
//! its world file. The raster bytes and the parsed world file come back
//! together as one [`FetchedRaster`]; the requested width is ignored.

use std::io::{Cursor, Read};

use anyhow::Result;
use async_trait::async_trait;
use crossover_core::error::CrossoverError;
use crossover_core::fetch::{FetchedRaster, ImageFetcher, ItemRef};
use crossover_core::georef::GeoReference;

use crate::config::Config;
use crate::http::{send_with_retry, CallKind, RetryPolicy};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff"];
const WORLD_FILE_EXTENSIONS: &[&str] = &["wld", "jgw", "jpgw", "pgw", "tfw"];

pub struct LegacyBrowseClient {
    http: reqwest::Client,
    browse_url: String,
    retry: RetryPolicy,
}

impl LegacyBrowseClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.legacy.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            browse_url: config.legacy.browse_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::from_config(&config.catalog),
        })
    }

    pub fn browse_url(&self, id: &str) -> String {
        format!("{}/{}", self.browse_url, id)
    }
}

fn extension(name: &str) -> Option<String> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Pull the browse raster and its world file out of a browse archive.
pub fn unpack_browse_archive(id: &str, bytes: &[u8]) -> Result<FetchedRaster, CrossoverError> {
    let bad = |reason: String| CrossoverError::FetchFailure(format!("{id}: {reason}"));

    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| bad(format!("not a zip archive: {e}")))?;

    let mut image = None;
    let mut world = None;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| bad(format!("corrupt archive entry: {e}")))?;
        if entry.is_dir() {
            continue;
        }
        let Some(ext) = extension(entry.name()) else {
            continue;
        };
        if image.is_none() && IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;
            image = Some(buf);
        } else if world.is_none() && WORLD_FILE_EXTENSIONS.contains(&ext.as_str()) {
            let mut text = String::new();
            entry.read_to_string(&mut text)?;
            world = Some(GeoReference::parse_world_file(&text)?);
        }
    }

    match (image, world) {
        (Some(bytes), Some(georef)) => Ok(FetchedRaster {
            bytes,
            georef: Some(georef),
        }),
        (None, _) => Err(bad("archive holds no browse image".to_string())),
        (_, None) => Err(bad("archive holds no world file".to_string())),
    }
}

#[async_trait]
impl ImageFetcher for LegacyBrowseClient {
    async fn fetch(&self, item: &ItemRef, _width: u32) -> Result<FetchedRaster, CrossoverError> {
        let url = self.browse_url(&item.id);
        let response = send_with_retry(&self.retry, CallKind::Fetch, || self.http.get(&url)).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CrossoverError::FetchFailure(format!("{}: {}", item.id, e.without_url())))?;
        unpack_browse_archive(&item.id, &bytes)
    }
}
