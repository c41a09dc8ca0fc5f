//! Commercial constellation catalog client.
//!
//! Implements [`SearchService`] against the quick-search endpoint
//! (geometry + date-range filter, following `_links._next` pages; a result
//! set longer than `max_pages` pages is an error, never a truncation) and
//! [`ImageFetcher`] against the thumbnail tile endpoint.
//!
//! All session state lives in an explicit [`ClientConfig`] built once from
//! configuration and the environment.

use std::io::Cursor;

use anyhow::{bail, Result};
use async_trait::async_trait;
use crossover_core::error::CrossoverError;
use crossover_core::fetch::{FetchedRaster, ImageFetcher, ItemRef};
use crossover_core::models::RawCandidate;
use crossover_core::search::{SearchQuery, SearchService};
use serde_json::Value;

use crate::config::Config;
use crate::http::{send_with_retry, CallKind, RetryPolicy};

/// Everything a catalog client needs; no module-level session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub search_url: String,
    pub tiles_url: String,
    pub max_pages: usize,
    pub timeout: std::time::Duration,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// Build from config, reading the credential from the environment
    /// variable named by `catalog.api_key_env`.
    pub fn from_env(config: &Config) -> Result<Self> {
        let var = &config.catalog.api_key_env;
        let api_key = match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!("{} environment variable not set", var),
        };
        Ok(Self {
            api_key,
            search_url: config.catalog.search_url.clone(),
            tiles_url: config.catalog.tiles_url.trim_end_matches('/').to_string(),
            max_pages: config.crossover.max_pages,
            timeout: config.catalog.timeout(),
            retry: RetryPolicy::from_config(&config.catalog),
        })
    }
}

pub struct CatalogClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl CatalogClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn thumbnail_url(&self, item: &ItemRef, width: u32) -> String {
        format!(
            "{}/{}/{}/thumb?api_key={}&width={}",
            self.config.tiles_url, item.item_type, item.id, self.config.api_key, width
        )
    }
}

async fn read_page_json(response: reqwest::Response) -> Result<Value, CrossoverError> {
    response
        .json::<Value>()
        .await
        .map_err(|e| CrossoverError::SearchFailure(format!("malformed search response: {}", e.without_url())))
}

/// One page of search results and the link to the next one, if any.
pub fn parse_search_page(json: &Value) -> Result<(Vec<RawCandidate>, Option<String>), CrossoverError> {
    let features = json
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            CrossoverError::SearchFailure("malformed search response: missing features array".to_string())
        })?;

    let candidates = features
        .iter()
        .map(|f| {
            serde_json::from_value::<RawCandidate>(f.clone()).map_err(|e| {
                CrossoverError::SearchFailure(format!("malformed search response feature: {e}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let next = json
        .get("_links")
        .and_then(|links| links.get("_next"))
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(str::to_string);

    Ok((candidates, next))
}

#[async_trait]
impl SearchService for CatalogClient {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawCandidate>, CrossoverError> {
        let body = query.to_request_body();

        let response = send_with_retry(&self.config.retry, CallKind::Search, || {
            self.http
                .post(&self.config.search_url)
                .basic_auth(&self.config.api_key, Some(""))
                .json(&body)
        })
        .await?;
        let (mut candidates, mut next) = parse_search_page(&read_page_json(response).await?)?;

        let mut pages = 1;
        while let Some(url) = next.take() {
            if pages >= self.config.max_pages {
                return Err(CrossoverError::SearchFailure(format!(
                    "more than {} result pages; raise crossover.max_pages to fetch them all",
                    self.config.max_pages
                )));
            }
            let response = send_with_retry(&self.config.retry, CallKind::Search, || {
                self.http
                    .get(&url)
                    .basic_auth(&self.config.api_key, Some(""))
            })
            .await?;
            let (page, following) = parse_search_page(&read_page_json(response).await?)?;
            candidates.extend(page);
            next = following;
            pages += 1;
        }

        Ok(candidates)
    }
}

#[async_trait]
impl ImageFetcher for CatalogClient {
    async fn fetch(&self, item: &ItemRef, width: u32) -> Result<FetchedRaster, CrossoverError> {
        let url = self.thumbnail_url(item, width);
        let response =
            send_with_retry(&self.config.retry, CallKind::Fetch, || self.http.get(&url)).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CrossoverError::FetchFailure(format!("{}: {}", item.id, e.without_url())))?;

        Ok(FetchedRaster {
            bytes: reencode_png(&bytes)
                .map_err(|e| CrossoverError::FetchFailure(format!("{}: {e}", item.id)))?,
            georef: None,
        })
    }
}

/// Thumbnails are stored as PNG whatever the tile service encoded them as.
fn reencode_png(bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    let mut out = Cursor::new(Vec::new());
    decoded.write_to(&mut out, image::ImageFormat::Png)?;
    Ok(out.into_inner())
}
