//! `find-crossovers`: legacy catalog export in, crossover groups out.
//!
//! Records that fail to parse are skipped with a warning and counted; a
//! search that fails after its retries aborts the run before anything is
//! written.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use crossover_core::error::CrossoverError;
use crossover_core::finder::{CrossoverFinder, FinderReport};
use crossover_core::models::SourceScene;
use serde_json::Value;

use crate::catalog::{CatalogClient, ClientConfig};
use crate::config::Config;
use crate::progress::{ProgressEvent, ProgressReporter};

/// Parse the legacy export. Malformed records come back separately.
pub fn read_scenes(text: &str) -> Result<(Vec<SourceScene>, Vec<CrossoverError>)> {
    let doc: Value = serde_json::from_str(text).context("input is not valid JSON")?;
    let Some(records) = doc.as_array() else {
        bail!("input must be a JSON array of scene records");
    };

    let mut scenes = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();
    for (position, record) in records.iter().enumerate() {
        match SourceScene::from_record(record, position) {
            Ok(scene) => scenes.push(scene),
            Err(e) => rejected.push(e),
        }
    }
    Ok((scenes, rejected))
}

/// Match every scene in input order, reporting progress as it goes.
pub async fn find_crossovers(
    finder: &CrossoverFinder,
    scenes: &[SourceScene],
    progress: &dyn ProgressReporter,
) -> Result<FinderReport> {
    let total = scenes.len() as u64;
    let mut report = FinderReport::default();

    for (n, scene) in scenes.iter().enumerate() {
        progress.report(ProgressEvent::Searching {
            scene: scene.id.clone(),
            n: n as u64 + 1,
            total,
        });

        let mut outcome = finder
            .match_scene(scene)
            .await
            .with_context(|| format!("search for scene {} failed", scene.id))?;

        progress.report(ProgressEvent::Matched {
            scene: scene.id.clone(),
            count: outcome.matches.len() as u64,
        });
        for e in &outcome.rejected {
            eprintln!("Warning: skipping candidate of {}: {}", scene.id, e);
        }
        report.rejected.append(&mut outcome.rejected);

        match outcome.into_group() {
            Some(group) => report.groups.push(group),
            None => report.scenes_without_matches += 1,
        }
    }
    Ok(report)
}

pub async fn run_find(
    config: &Config,
    input: &Path,
    output: &Path,
    progress: Arc<dyn ProgressReporter>,
) -> Result<()> {
    let client = CatalogClient::new(ClientConfig::from_env(config)?)?;
    let finder = CrossoverFinder::new(
        Arc::new(client),
        config.crossover.window_hours,
        config.crossover.item_types.clone(),
    );

    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read input: {}", input.display()))?;
    let (scenes, bad_records) = read_scenes(&text)?;
    for e in &bad_records {
        eprintln!("Warning: skipping source record: {}", e);
    }

    let report = find_crossovers(&finder, &scenes, progress.as_ref()).await?;
    write_groups(output, &report)?;

    let matched: usize = report.groups.iter().map(|g| g.crossovers.len()).sum();
    println!("find-crossovers {}", input.display());
    println!("  scenes read: {}", scenes.len());
    println!("  records skipped: {}", bad_records.len());
    println!("  scenes with crossovers: {}", report.groups.len());
    println!("  scenes without crossovers: {}", report.scenes_without_matches);
    println!("  crossovers: {}", matched);
    println!("  candidates skipped: {}", report.rejected.len());
    println!("  output: {}", output.display());
    println!("ok");
    Ok(())
}

fn write_groups(output: &Path, report: &FinderReport) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&report.groups)?;
    std::fs::write(output, json).with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(())
}
