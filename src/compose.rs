//! Per-group compositing: fetch, key, tag, merge.
//!
//! Each [`CrossoverGroup`] becomes one directory under the output root:
//!
//! ```text
//! <root>/<scene id>/
//!   <stem>.jpg, <stem>.wld                      base browse raster + world file
//!   <item_type>_<id>.png, <item_type>_<id>.wld  one pair per candidate
//!   work/<layer>_transparent.png                keyed or trimmed layer
//!   work/<layer>_transparent.wld                its (shifted) world file
//!   work/<layer>_geotiff.tif                    georeferenced layer
//!   <stem>_merged.tiff                          the group mosaic
//! ```
//!
//! Layers of one group are prepared concurrently; the merge waits for all
//! of them and always stacks base first, then candidates in group order.
//! Groups are independent and run on a bounded pool.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossover_core::error::CrossoverError;
use crossover_core::fetch::{ImageFetcher, ItemRef};
use crossover_core::georef::GeoReference;
use crossover_core::models::{CandidateMatch, CrossoverGroup, SourceScene};
use crossover_core::raster::{RasterBackend, TransparencyPolicy};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::progress::{ProgressEvent, ProgressReporter};

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub thumbnail_width: u32,
    pub concurrency: usize,
    pub group_attempts: u32,
    pub matte: [u8; 3],
    pub matte_tolerance: u8,
    pub overwrite: bool,
    /// Item type of the base scenes in the legacy archive.
    pub base_item_type: String,
}

impl RenderSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            thumbnail_width: config.render.thumbnail_width,
            concurrency: config.render.concurrency.max(1),
            group_attempts: config.render.group_attempts.max(1),
            matte: config.render.matte,
            matte_tolerance: config.render.matte_tolerance,
            overwrite: config.render.overwrite,
            base_item_type: config.legacy.item_type.clone(),
        }
    }
}

/// One rendered group.
#[derive(Debug, Clone)]
pub struct GroupOutput {
    pub scene_id: String,
    pub mosaic: PathBuf,
    /// Georeferenced layers in merge order.
    pub layers: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub struct RenderSummary {
    pub rendered: Vec<GroupOutput>,
    pub failed: Vec<(String, CrossoverError)>,
}

#[derive(Debug, Clone)]
enum Layer {
    Base { scene_id: String },
    Candidate(CandidateMatch),
}

impl Layer {
    fn name(&self) -> String {
        match self {
            Layer::Base { scene_id } => SourceScene::file_stem(scene_id).to_string(),
            Layer::Candidate(m) => m.file_stem(),
        }
    }

    /// Base rasters carry a known matte border; candidate previews are
    /// trimmed to their content.
    fn policy(&self, settings: &RenderSettings) -> TransparencyPolicy {
        match self {
            Layer::Base { .. } => TransparencyPolicy::Matte {
                rgb: settings.matte,
                tolerance: settings.matte_tolerance,
            },
            Layer::Candidate(_) => TransparencyPolicy::Trim,
        }
    }
}

#[derive(Debug, Clone)]
struct GroupLayout {
    dir: PathBuf,
    work: PathBuf,
    stem: String,
}

impl GroupLayout {
    fn new(root: &Path, scene_id: &str) -> Self {
        let dir = root.join(scene_id);
        Self {
            work: dir.join("work"),
            stem: SourceScene::file_stem(scene_id).to_string(),
            dir,
        }
    }

    /// Fetched raster and its world file.
    fn source(&self, layer: &Layer) -> (PathBuf, PathBuf) {
        let name = layer.name();
        let ext = match layer {
            Layer::Base { .. } => "jpg",
            Layer::Candidate(_) => "png",
        };
        (
            self.dir.join(format!("{name}.{ext}")),
            self.dir.join(format!("{name}.wld")),
        )
    }

    fn transparent(&self, layer: &Layer) -> (PathBuf, PathBuf) {
        let name = layer.name();
        (
            self.work.join(format!("{name}_transparent.png")),
            self.work.join(format!("{name}_transparent.wld")),
        )
    }

    fn geotiff(&self, layer: &Layer) -> PathBuf {
        self.work.join(format!("{}_geotiff.tif", layer.name()))
    }

    fn mosaic(&self) -> PathBuf {
        self.dir.join(format!("{}_merged.tiff", self.stem))
    }
}

fn join_failure(e: tokio::task::JoinError) -> CrossoverError {
    CrossoverError::RasterBackendFailure(format!("raster task did not complete: {e}"))
}

#[derive(Clone)]
pub struct CompositeBuilder {
    base: Arc<dyn ImageFetcher>,
    candidates: Arc<dyn ImageFetcher>,
    backend: Arc<dyn RasterBackend>,
    settings: RenderSettings,
}

impl CompositeBuilder {
    pub fn new(
        base: Arc<dyn ImageFetcher>,
        candidates: Arc<dyn ImageFetcher>,
        backend: Arc<dyn RasterBackend>,
        settings: RenderSettings,
    ) -> Self {
        Self {
            base,
            candidates,
            backend,
            settings,
        }
    }

    /// Fetch (or reuse) one layer's raster and world file.
    async fn source_layer(
        &self,
        layout: &GroupLayout,
        layer: &Layer,
    ) -> Result<(PathBuf, GeoReference), CrossoverError> {
        let (image_path, world_path) = layout.source(layer);

        if !self.settings.overwrite && image_path.exists() && world_path.exists() {
            let text = tokio::fs::read_to_string(&world_path).await?;
            return Ok((image_path, GeoReference::parse_world_file(&text)?));
        }

        let width = self.settings.thumbnail_width;
        let (fetched, georef) = match layer {
            Layer::Base { scene_id } => {
                let item = ItemRef::new(&self.settings.base_item_type, scene_id);
                let fetched = self.base.fetch(&item, width).await?;
                let georef = fetched.georef.ok_or_else(|| {
                    CrossoverError::FetchFailure(format!("{scene_id}: browse raster has no world file"))
                })?;
                (fetched, georef)
            }
            Layer::Candidate(m) => {
                let geometry = m.raster_geometry()?;
                let fetched = self.candidates.fetch(&ItemRef::new(&m.item_type, &m.id), width).await?;
                let (fetched_width, _) = image::ImageReader::new(Cursor::new(&fetched.bytes))
                    .with_guessed_format()
                    .map_err(CrossoverError::Io)?
                    .into_dimensions()
                    .map_err(|e| CrossoverError::FetchFailure(format!("{}: undecodable raster: {e}", m.id)))?;
                (fetched, geometry.preview_reference(fetched_width))
            }
        };

        tokio::fs::write(&image_path, &fetched.bytes).await?;
        tokio::fs::write(&world_path, georef.to_world_file()).await?;
        Ok((image_path, georef))
    }

    /// Fetch, key and tag one layer. Returns the georeferenced raster.
    async fn prepare_layer(&self, layout: &GroupLayout, layer: &Layer) -> Result<PathBuf, CrossoverError> {
        let (image_path, georef) = self.source_layer(layout, layer).await?;
        let (keyed, keyed_world) = layout.transparent(layer);
        let tagged = layout.geotiff(layer);
        let policy = layer.policy(&self.settings);
        let backend = Arc::clone(&self.backend);

        let output = tagged.clone();
        tokio::task::spawn_blocking(move || -> Result<(), CrossoverError> {
            let crop = backend.make_transparent(&image_path, policy, &keyed)?;
            let registered = georef.shifted(crop.left, crop.top);
            std::fs::write(&keyed_world, registered.to_world_file())?;
            backend.geo_tag(&keyed, &keyed_world, &output)
        })
        .await
        .map_err(join_failure)??;

        Ok(tagged)
    }

    /// Run the whole pipeline for one group, once.
    pub async fn render_group(&self, root: &Path, group: &CrossoverGroup) -> Result<GroupOutput, CrossoverError> {
        group.validate()?;
        let layout = GroupLayout::new(root, &group.source_scene_id);
        tokio::fs::create_dir_all(&layout.work).await?;

        let mut layers = vec![Layer::Base {
            scene_id: group.source_scene_id.clone(),
        }];
        layers.extend(group.crossovers.iter().cloned().map(Layer::Candidate));

        let mut tasks = JoinSet::new();
        for (index, layer) in layers.iter().cloned().enumerate() {
            let builder = self.clone();
            let layout = layout.clone();
            tasks.spawn(async move {
                let result = builder.prepare_layer(&layout, &layer).await;
                (index, result)
            });
        }

        let mut tagged: Vec<Option<PathBuf>> = vec![None; layers.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(join_failure)?;
            tagged[index] = Some(result?);
        }
        let ordered: Vec<PathBuf> = tagged.into_iter().flatten().collect();
        if ordered.len() != layers.len() {
            return Err(CrossoverError::raster("not every layer finished before the merge"));
        }

        let mosaic = layout.mosaic();
        let backend = Arc::clone(&self.backend);
        let (merge_layers, merge_output) = (ordered.clone(), mosaic.clone());
        tokio::task::spawn_blocking(move || backend.mosaic(&merge_layers, &merge_output))
            .await
            .map_err(join_failure)??;

        Ok(GroupOutput {
            scene_id: group.source_scene_id.clone(),
            mosaic,
            layers: ordered,
        })
    }

    /// [`render_group`](Self::render_group) with whole-group retries. A
    /// malformed group fails on the first attempt.
    pub async fn render_with_retry(
        &self,
        root: &Path,
        group: &CrossoverGroup,
    ) -> Result<GroupOutput, CrossoverError> {
        let attempts = self.settings.group_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.render_group(root, group).await {
                Ok(output) => return Ok(output),
                Err(e) if attempt < attempts && !e.is_record_local() => {
                    eprintln!(
                        "Warning: group {} failed (attempt {}/{}): {}",
                        group.source_scene_id, attempt, attempts, e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Render every group on a pool of `concurrency` workers. A failing
    /// group never stops its siblings.
    pub async fn render_all(
        &self,
        root: &Path,
        groups: Vec<CrossoverGroup>,
        progress: Arc<dyn ProgressReporter>,
    ) -> RenderSummary {
        let pool = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let total = groups.len() as u64;

        let mut tasks = JoinSet::new();
        for (n, group) in groups.into_iter().enumerate() {
            let builder = self.clone();
            let root = root.to_path_buf();
            let pool = Arc::clone(&pool);
            let progress = Arc::clone(&progress);
            tasks.spawn(async move {
                let _permit = pool.acquire_owned().await.ok();
                progress.report(ProgressEvent::Rendering {
                    group: group.source_scene_id.clone(),
                    n: n as u64 + 1,
                    total,
                });
                let result = builder.render_with_retry(&root, &group).await;
                match &result {
                    Ok(output) => progress.report(ProgressEvent::Rendered {
                        group: output.scene_id.clone(),
                        layers: output.layers.len() as u64,
                    }),
                    Err(e) => progress.report(ProgressEvent::GroupFailed {
                        group: group.source_scene_id.clone(),
                        error: e.to_string(),
                    }),
                }
                (group.source_scene_id, result)
            });
        }

        let mut summary = RenderSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(output))) => summary.rendered.push(output),
                Ok((scene_id, Err(e))) => summary.failed.push((scene_id, e)),
                Err(e) => summary.failed.push(("<unknown>".to_string(), join_failure(e))),
            }
        }
        summary.rendered.sort_by(|a, b| a.scene_id.cmp(&b.scene_id));
        summary.failed.sort_by(|a, b| a.0.cmp(&b.0));
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::raster::NativeRasterBackend;
    use async_trait::async_trait;
    use crossover_core::fetch::FetchedRaster;
    use crossover_core::raster::Crop;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn png(width: u32, height: u32, paint: impl Fn(u32, u32) -> [u8; 3]) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, y| image::Rgb(paint(x, y)));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    /// Serves generated rasters, optionally slowed down per item id.
    struct FakeFetcher {
        bytes: Vec<u8>,
        georef: Option<GeoReference>,
        delays_ms: HashMap<String, u64>,
        calls: AtomicUsize,
    }

    impl FakeFetcher {
        fn new(bytes: Vec<u8>, georef: Option<GeoReference>) -> Self {
            Self {
                bytes,
                georef,
                delays_ms: HashMap::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn delay(mut self, id: &str, ms: u64) -> Self {
            self.delays_ms.insert(id.to_string(), ms);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageFetcher for FakeFetcher {
        async fn fetch(&self, item: &ItemRef, _width: u32) -> Result<FetchedRaster, CrossoverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(ms) = self.delays_ms.get(&item.id) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            Ok(FetchedRaster {
                bytes: self.bytes.clone(),
                georef: self.georef,
            })
        }
    }

    /// Copies files through and remembers what it was asked to do.
    #[derive(Default)]
    struct RecordingBackend {
        policies: Mutex<Vec<(String, TransparencyPolicy)>>,
        merges: Mutex<Vec<Vec<PathBuf>>>,
        fail_merges_under: Option<String>,
        trim_crop: Crop,
    }

    impl RasterBackend for RecordingBackend {
        fn make_transparent(
            &self,
            input: &Path,
            policy: TransparencyPolicy,
            output: &Path,
        ) -> Result<Crop, CrossoverError> {
            std::fs::copy(input, output)?;
            let name = input.file_name().unwrap().to_string_lossy().to_string();
            self.policies.lock().unwrap().push((name, policy));
            Ok(match policy {
                TransparencyPolicy::Trim => self.trim_crop,
                TransparencyPolicy::Matte { .. } => Crop::default(),
            })
        }

        fn geo_tag(&self, input: &Path, world_file: &Path, output: &Path) -> Result<(), CrossoverError> {
            assert!(world_file.exists(), "world file must exist before tagging");
            std::fs::copy(input, output)?;
            Ok(())
        }

        fn mosaic(&self, layers: &[PathBuf], output: &Path) -> Result<(), CrossoverError> {
            self.merges.lock().unwrap().push(layers.to_vec());
            if let Some(marker) = &self.fail_merges_under {
                if output.to_string_lossy().contains(marker.as_str()) {
                    return Err(CrossoverError::raster("merge exploded"));
                }
            }
            std::fs::write(output, b"mosaic")?;
            Ok(())
        }
    }

    fn candidate(id: &str) -> CandidateMatch {
        let properties = json!({
            "item_type": "PSScene3Band",
            "acquired": "2017-02-15T09:30:00Z",
            "columns": 1000,
            "pixel_resolution": 3.0,
            "origin_x": 500000.0,
            "origin_y": 4200000.0
        });
        CandidateMatch {
            id: id.to_string(),
            item_type: "PSScene3Band".to_string(),
            acquired: "2017-02-15T09:30:00Z".parse().unwrap(),
            acquisition_offset: "0 days 0 hours 30 minutes".to_string(),
            properties: properties.as_object().unwrap().clone(),
        }
    }

    fn group(scene_id: &str, ids: &[&str]) -> CrossoverGroup {
        CrossoverGroup::new(scene_id, ids.iter().map(|id| candidate(id)).collect()).unwrap()
    }

    fn settings() -> RenderSettings {
        RenderSettings {
            thumbnail_width: 500,
            concurrency: 2,
            group_attempts: 2,
            matte: [0, 0, 0],
            matte_tolerance: 0,
            overwrite: false,
            base_item_type: "EO1_HYP_PUB".to_string(),
        }
    }

    fn base_fetcher() -> FakeFetcher {
        FakeFetcher::new(
            png(8, 8, |_, _| [40, 40, 40]),
            Some(GeoReference::north_up(30.0, 499000.0, 4201000.0)),
        )
    }

    fn candidate_fetcher() -> FakeFetcher {
        FakeFetcher::new(png(500, 300, |_, _| [200, 10, 10]), None)
    }

    fn builder(
        base: Arc<FakeFetcher>,
        candidates: Arc<FakeFetcher>,
        backend: Arc<RecordingBackend>,
        settings: RenderSettings,
    ) -> CompositeBuilder {
        CompositeBuilder::new(base, candidates, backend, settings)
    }

    fn file_names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[tokio::test]
    async fn merge_stacks_base_then_candidates_in_group_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = Arc::new(RecordingBackend::default());
        // Base and C1 finish last; order must not follow completion.
        let b = builder(
            Arc::new(base_fetcher().delay("E12345", 60)),
            Arc::new(candidate_fetcher().delay("C1", 40)),
            backend.clone(),
            settings(),
        );

        let output = b.render_group(tmp.path(), &group("E12345", &["C1", "C2"])).await.unwrap();

        let expected = vec![
            "E12345_geotiff.tif",
            "PSScene3Band_C1_geotiff.tif",
            "PSScene3Band_C2_geotiff.tif",
        ];
        assert_eq!(file_names(&output.layers), expected);
        let merges = backend.merges.lock().unwrap();
        assert_eq!(merges.len(), 1);
        assert_eq!(file_names(&merges[0]), expected);
        assert_eq!(output.mosaic, tmp.path().join("E12345").join("E12345_merged.tiff"));
        assert!(output.mosaic.exists());
    }

    #[tokio::test]
    async fn base_is_matted_and_candidates_are_trimmed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = Arc::new(RecordingBackend::default());
        let b = builder(
            Arc::new(base_fetcher()),
            Arc::new(candidate_fetcher()),
            backend.clone(),
            settings(),
        );
        b.render_group(tmp.path(), &group("E12345_L1T", &["C1"])).await.unwrap();

        let mut policies = backend.policies.lock().unwrap().clone();
        policies.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            policies,
            vec![
                (
                    "E12345.jpg".to_string(),
                    TransparencyPolicy::Matte {
                        rgb: [0, 0, 0],
                        tolerance: 0
                    }
                ),
                ("PSScene3Band_C1.png".to_string(), TransparencyPolicy::Trim),
            ]
        );
    }

    #[tokio::test]
    async fn candidate_world_file_uses_derived_resolution_and_trim_offset() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = Arc::new(RecordingBackend {
            trim_crop: Crop { left: 2, top: 1 },
            ..Default::default()
        });
        let b = builder(
            Arc::new(base_fetcher()),
            Arc::new(candidate_fetcher()),
            backend,
            settings(),
        );
        b.render_group(tmp.path(), &group("E12345", &["C1"])).await.unwrap();

        let dir = tmp.path().join("E12345");
        let read = |p: PathBuf| GeoReference::parse_world_file(&std::fs::read_to_string(p).unwrap()).unwrap();

        // 1000 columns at 3 m fetched 500 wide: 6 m pixels.
        let fetched = read(dir.join("PSScene3Band_C1.wld"));
        assert_eq!(fetched, GeoReference::north_up(6.0, 500000.0, 4200000.0));

        let keyed = read(dir.join("work").join("PSScene3Band_C1_transparent.wld"));
        assert_eq!(keyed.origin_x, 500012.0);
        assert_eq!(keyed.origin_y, 4199994.0);
        assert_eq!(keyed.pixel_size_y, -6.0);

        let base = read(dir.join("E12345.wld"));
        assert_eq!(base, GeoReference::north_up(30.0, 499000.0, 4201000.0));
    }

    #[tokio::test]
    async fn existing_rasters_skip_the_fetch_unless_overwriting() {
        let tmp = tempfile::TempDir::new().unwrap();
        let base = Arc::new(base_fetcher());
        let candidates = Arc::new(candidate_fetcher());
        let g = group("E12345", &["C1", "C2"]);

        let cached = builder(
            base.clone(),
            candidates.clone(),
            Arc::new(RecordingBackend::default()),
            settings(),
        );
        cached.render_group(tmp.path(), &g).await.unwrap();
        assert_eq!((base.calls(), candidates.calls()), (1, 2));

        cached.render_group(tmp.path(), &g).await.unwrap();
        assert_eq!((base.calls(), candidates.calls()), (1, 2));

        let fresh = builder(
            base.clone(),
            candidates.clone(),
            Arc::new(RecordingBackend::default()),
            RenderSettings {
                overwrite: true,
                ..settings()
            },
        );
        fresh.render_group(tmp.path(), &g).await.unwrap();
        assert_eq!((base.calls(), candidates.calls()), (2, 4));
    }

    #[tokio::test]
    async fn base_without_world_file_fails_the_group() {
        let tmp = tempfile::TempDir::new().unwrap();
        let b = builder(
            Arc::new(FakeFetcher::new(png(4, 4, |_, _| [1, 2, 3]), None)),
            Arc::new(candidate_fetcher()),
            Arc::new(RecordingBackend::default()),
            settings(),
        );
        let err = b.render_group(tmp.path(), &group("E9", &["C1"])).await.unwrap_err();
        assert!(matches!(err, CrossoverError::FetchFailure(_)));
        assert!(err.to_string().contains("world file"));
    }

    #[tokio::test]
    async fn failing_group_is_retried_and_isolated() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = Arc::new(RecordingBackend {
            fail_merges_under: Some("E_BAD".to_string()),
            ..Default::default()
        });
        let b = builder(
            Arc::new(base_fetcher()),
            Arc::new(candidate_fetcher()),
            backend.clone(),
            settings(),
        );

        let summary = b
            .render_all(
                tmp.path(),
                vec![group("E_BAD", &["C1"]), group("E_GOOD", &["C2"])],
                Arc::new(NoProgress),
            )
            .await;

        assert_eq!(summary.rendered.len(), 1);
        assert_eq!(summary.rendered[0].scene_id, "E_GOOD");
        assert!(summary.rendered[0].mosaic.exists());
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "E_BAD");
        assert!(matches!(summary.failed[0].1, CrossoverError::RasterBackendFailure(_)));

        let merges = backend.merges.lock().unwrap();
        let bad_attempts = merges
            .iter()
            .filter(|layers| layers[0].to_string_lossy().contains("E_BAD"))
            .count();
        assert_eq!(bad_attempts, 2);
        assert!(!tmp.path().join("E_BAD").join("E_BAD_merged.tiff").exists());
    }

    #[tokio::test]
    async fn native_backend_renders_a_geotiff_mosaic() {
        let tmp = tempfile::TempDir::new().unwrap();
        // 20x20 base at 10 m with a black matte border.
        let base = FakeFetcher::new(
            png(20, 20, |x, y| {
                if x < 2 || y < 2 {
                    [0, 0, 0]
                } else {
                    [90, 90, 90]
                }
            }),
            Some(GeoReference::north_up(10.0, 500000.0, 4200200.0)),
        );
        // 500 wide preview of a 500 column asset: 3 m pixels, red block on
        // a white background.
        let candidates = FakeFetcher::new(
            png(500, 40, |x, y| {
                if (100..200).contains(&x) && (10..30).contains(&y) {
                    [220, 20, 20]
                } else {
                    [255, 255, 255]
                }
            }),
            None,
        );
        let mut c1 = candidate("C1");
        c1.properties.insert("columns".to_string(), json!(500));
        let b = CompositeBuilder::new(
            Arc::new(base),
            Arc::new(candidates),
            Arc::new(NativeRasterBackend::new(100_000_000)),
            settings(),
        );

        let g = CrossoverGroup::new("E777", vec![c1]).unwrap();
        let output = b.render_group(tmp.path(), &g).await.unwrap();

        assert!(output.layers.iter().all(|p| p.exists()));
        let (w, h) = image::image_dimensions(&output.mosaic).unwrap();
        assert!(w >= 20 && h >= 20);
    }

    #[tokio::test]
    async fn ids_cannot_escape_the_output_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().join("out");
        let base = Arc::new(base_fetcher());
        let candidates = Arc::new(candidate_fetcher());
        let b = builder(
            base.clone(),
            candidates.clone(),
            Arc::new(RecordingBackend::default()),
            settings(),
        );

        let escaping_scene = CrossoverGroup {
            source_scene_id: "../escaped".to_string(),
            crossovers: vec![candidate("C1")],
        };
        let mut pwned = candidate("C1");
        pwned.id = "../../pwned".to_string();
        let escaping_candidate = CrossoverGroup {
            source_scene_id: "E1".to_string(),
            crossovers: vec![pwned],
        };

        let summary = b
            .render_all(&root, vec![escaping_scene, escaping_candidate], Arc::new(NoProgress))
            .await;
        assert!(summary.rendered.is_empty());
        assert_eq!(summary.failed.len(), 2);
        assert!(summary.failed.iter().all(|(_, e)| e.is_record_local()));

        let beside_root: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert!(beside_root.is_empty(), "nothing may be written next to the output root");
        // Malformed groups are not retried or fetched.
        assert_eq!((base.calls(), candidates.calls()), (0, 0));
    }

    #[tokio::test]
    async fn repeated_candidate_in_a_document_fails_its_group() {
        let tmp = tempfile::TempDir::new().unwrap();
        let b = builder(
            Arc::new(base_fetcher()),
            Arc::new(candidate_fetcher()),
            Arc::new(RecordingBackend::default()),
            settings(),
        );
        let group = CrossoverGroup {
            source_scene_id: "E1".to_string(),
            crossovers: vec![candidate("C1"), candidate("C1")],
        };
        let err = b.render_group(tmp.path(), &group).await.unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }
}
