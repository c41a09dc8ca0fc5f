//! `render-crossovers`: crossover groups in, one mosaic per group out.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use crossover_core::models::CrossoverGroup;

use crate::catalog::{CatalogClient, ClientConfig};
use crate::compose::{CompositeBuilder, RenderSettings};
use crate::config::Config;
use crate::legacy::LegacyBrowseClient;
use crate::progress::ProgressReporter;
use crate::raster::NativeRasterBackend;

pub fn read_groups(path: &Path) -> Result<Vec<CrossoverGroup>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} is not a crossover document", path.display()))
}

pub async fn run_render(
    config: &Config,
    input: &Path,
    output_dir: &Path,
    progress: Arc<dyn ProgressReporter>,
) -> Result<()> {
    let catalog = CatalogClient::new(ClientConfig::from_env(config)?)?;
    let legacy = LegacyBrowseClient::new(config)?;
    let groups = read_groups(input)?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let root = std::path::absolute(output_dir)
        .with_context(|| format!("Failed to resolve {}", output_dir.display()))?;

    let builder = CompositeBuilder::new(
        Arc::new(legacy),
        Arc::new(catalog),
        Arc::new(NativeRasterBackend::new(config.render.max_mosaic_pixels)),
        RenderSettings::from_config(config),
    );

    let total = groups.len();
    let summary = builder.render_all(&root, groups, progress).await;

    println!("render-crossovers {}", input.display());
    println!("  groups: {}", total);
    println!("  rendered: {}", summary.rendered.len());
    for output in &summary.rendered {
        println!("    {} ({} layers)", output.mosaic.display(), output.layers.len());
    }
    println!("  failed: {}", summary.failed.len());
    for (scene_id, e) in &summary.failed {
        println!("    {}: {}", scene_id, e);
    }

    if !summary.failed.is_empty() {
        bail!("{} of {} groups failed to render", summary.failed.len(), total);
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_find_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("crossovers.json");
        std::fs::write(
            &path,
            r#"[{"source_scene_id": "E1", "crossovers": [{
                "id": "C1",
                "item_type": "PSScene3Band",
                "acquired": "2017-02-15T09:30:00Z",
                "acquisition_offset": "0 days 0 hours 30 minutes",
                "properties": {"columns": 1000}
            }]}]"#,
        )
        .unwrap();
        let groups = read_groups(&path).unwrap();
        assert_eq!(groups[0].source_scene_id, "E1");
        assert_eq!(groups[0].crossovers[0].properties["columns"], 1000);
    }

    #[test]
    fn rejects_other_documents() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("scenes.json");
        std::fs::write(&path, r#"[{"displayId": "E1"}]"#).unwrap();
        assert!(read_groups(&path).is_err());
    }
}
