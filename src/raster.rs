//! Native [`RasterBackend`]: transparency keying and mosaicking with the
//! `image` crate, GeoTIFF tagging with the `tiff` crate. No external
//! processes or GDAL.
//!
//! Tagged rasters are RGBA8 GeoTIFFs carrying `ModelPixelScale` and
//! `ModelTiepoint`. World files reference the upper-left pixel *centre*;
//! tiepoints here reference the upper-left pixel *corner* (PixelIsArea).

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crossover_core::error::CrossoverError;
use crossover_core::georef::GeoReference;
use crossover_core::raster::{Crop, RasterBackend, TransparencyPolicy};
use image::{ImageFormat, Rgba, RgbaImage};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::RGBA8;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tiff::ColorType;

// GeoTIFF tag IDs (not in the standard tiff crate)
const GEOTIFF_MODELPIXELSCALE: u16 = 33550;
const GEOTIFF_MODELTIEPOINT: u16 = 33922;
const GEOTIFF_GEOKEYDIRECTORY: u16 = 34735;

const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const RASTER_PIXEL_IS_AREA: u16 = 1;

fn backend_err(context: &str, path: &Path, e: impl std::fmt::Display) -> CrossoverError {
    CrossoverError::raster(format!("{context} {}: {e}", path.display()))
}

/// Placement of a north-up raster: upper-left corner and pixel size.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Placement {
    left: f64,
    top: f64,
    scale_x: f64,
    scale_y: f64,
}

impl Placement {
    fn from_world(g: &GeoReference) -> Self {
        Self {
            left: g.origin_x - g.pixel_size_x / 2.0,
            top: g.origin_y - g.pixel_size_y / 2.0,
            scale_x: g.pixel_size_x.abs(),
            scale_y: g.pixel_size_y.abs(),
        }
    }
}

struct GeoLayer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    placement: Placement,
}

impl GeoLayer {
    fn right(&self) -> f64 {
        self.placement.left + self.width as f64 * self.placement.scale_x
    }

    fn bottom(&self) -> f64 {
        self.placement.top - self.height as f64 * self.placement.scale_y
    }
}

fn write_geotiff(
    path: &Path,
    width: u32,
    height: u32,
    pixels: &[u8],
    placement: Placement,
) -> Result<(), CrossoverError> {
    let writer = BufWriter::new(File::create(path)?);
    let encode = |e: tiff::TiffError| backend_err("encoding", path, e);

    let mut encoder = TiffEncoder::new(writer).map_err(encode)?;
    let mut image = encoder.new_image::<RGBA8>(width, height).map_err(encode)?;

    let pixel_scale = [placement.scale_x, placement.scale_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(GEOTIFF_MODELPIXELSCALE), pixel_scale.as_slice())
        .map_err(encode)?;

    // Ties pixel (0, 0) to the upper-left corner
    let tiepoint = [0.0, 0.0, 0.0, placement.left, placement.top, 0.0];
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(GEOTIFF_MODELTIEPOINT), tiepoint.as_slice())
        .map_err(encode)?;

    let geokeys: [u16; 8] = [1, 1, 0, 1, GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA];
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(GEOTIFF_GEOKEYDIRECTORY), geokeys.as_slice())
        .map_err(encode)?;

    image.write_data(pixels).map_err(encode)?;
    Ok(())
}

fn read_geotiff(path: &Path) -> Result<GeoLayer, CrossoverError> {
    let decode = |e: tiff::TiffError| backend_err("decoding", path, e);

    let mut decoder = Decoder::new(BufReader::new(File::open(path)?)).map_err(decode)?;
    let (width, height) = decoder.dimensions().map_err(decode)?;
    if decoder.colortype().map_err(decode)? != ColorType::RGBA(8) {
        return Err(backend_err("decoding", path, "expected an RGBA8 layer"));
    }
    let scale = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(GEOTIFF_MODELPIXELSCALE))
        .map_err(decode)?;
    let tie = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(GEOTIFF_MODELTIEPOINT))
        .map_err(decode)?;
    if scale.len() < 2 || tie.len() < 6 {
        return Err(backend_err("decoding", path, "incomplete georeference tags"));
    }
    let pixels = match decoder.read_image().map_err(decode)? {
        DecodingResult::U8(buf) => buf,
        _ => return Err(backend_err("decoding", path, "expected 8-bit samples")),
    };

    Ok(GeoLayer {
        width,
        height,
        pixels,
        placement: Placement {
            left: tie[3] - tie[0] * scale[0],
            top: tie[4] + tie[1] * scale[1],
            scale_x: scale[0],
            scale_y: scale[1],
        },
    })
}

/// Decode by content, not by file extension.
fn open_rgba(path: &Path) -> Result<RgbaImage, CrossoverError> {
    let reader = image::ImageReader::open(path)?
        .with_guessed_format()
        .map_err(|e| backend_err("reading", path, e))?;
    Ok(reader
        .decode()
        .map_err(|e| backend_err("reading", path, e))?
        .to_rgba8())
}

fn within_tolerance(p: &Rgba<u8>, rgb: [u8; 3], tolerance: u8) -> bool {
    p.0[..3]
        .iter()
        .zip(rgb.iter())
        .all(|(a, b)| a.abs_diff(*b) <= tolerance)
}

/// Bounding box of non-background content as `(left, top, width, height)`.
fn content_bounds(img: &RgbaImage) -> Option<(u32, u32, u32, u32)> {
    let background = *img.get_pixel(0, 0);
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in img.enumerate_pixels() {
        if p.0[3] == 0 || *p == background {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds.map(|(x0, y0, x1, y1)| (x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

pub struct NativeRasterBackend {
    max_mosaic_pixels: u64,
}

impl NativeRasterBackend {
    pub fn new(max_mosaic_pixels: u64) -> Self {
        Self { max_mosaic_pixels }
    }
}

impl RasterBackend for NativeRasterBackend {
    fn make_transparent(
        &self,
        input: &Path,
        policy: TransparencyPolicy,
        output: &Path,
    ) -> Result<Crop, CrossoverError> {
        let mut img = open_rgba(input)?;

        let crop = match policy {
            TransparencyPolicy::Matte { rgb, tolerance } => {
                for p in img.pixels_mut() {
                    if within_tolerance(p, rgb, tolerance) {
                        p.0[3] = 0;
                    }
                }
                Crop::default()
            }
            TransparencyPolicy::Trim => match content_bounds(&img) {
                Some((left, top, w, h)) => {
                    img = image::imageops::crop_imm(&img, left, top, w, h).to_image();
                    Crop { left, top }
                }
                // Nothing but background: keep the raster as is.
                None => Crop::default(),
            },
        };

        img.save_with_format(output, ImageFormat::Png)
            .map_err(|e| backend_err("writing", output, e))?;
        Ok(crop)
    }

    fn geo_tag(&self, input: &Path, world_file: &Path, output: &Path) -> Result<(), CrossoverError> {
        let georef = GeoReference::parse_world_file(&std::fs::read_to_string(world_file)?)?;
        let img = open_rgba(input)?;
        write_geotiff(
            output,
            img.width(),
            img.height(),
            img.as_raw(),
            Placement::from_world(&georef),
        )
    }

    fn mosaic(&self, layers: &[PathBuf], output: &Path) -> Result<(), CrossoverError> {
        let layers = layers
            .iter()
            .map(|p| read_geotiff(p))
            .collect::<Result<Vec<_>, _>>()?;
        let first = layers
            .first()
            .ok_or_else(|| CrossoverError::raster("mosaic needs at least one layer"))?;

        let usable = |p: &Placement| {
            p.scale_x > 0.0 && p.scale_y > 0.0 && p.scale_x.is_finite() && p.scale_y.is_finite()
        };
        if !layers.iter().all(|l| usable(&l.placement)) {
            return Err(CrossoverError::raster("layer has a non-positive pixel size"));
        }
        let (scale_x, scale_y) = (first.placement.scale_x, first.placement.scale_y);

        let min_x = layers.iter().map(|l| l.placement.left).fold(f64::INFINITY, f64::min);
        let max_x = layers.iter().map(GeoLayer::right).fold(f64::NEG_INFINITY, f64::max);
        let max_y = layers.iter().map(|l| l.placement.top).fold(f64::NEG_INFINITY, f64::max);
        let min_y = layers.iter().map(GeoLayer::bottom).fold(f64::INFINITY, f64::min);

        let width = ((max_x - min_x) / scale_x).ceil();
        let height = ((max_y - min_y) / scale_y).ceil();
        if !(width >= 1.0 && height >= 1.0) || width * height > self.max_mosaic_pixels as f64 {
            return Err(CrossoverError::raster(format!(
                "mosaic extent of {width} x {height} pixels is out of range"
            )));
        }
        let (width, height) = (width as u32, height as u32);
        let mut canvas = vec![0u8; width as usize * height as usize * 4];

        for layer in &layers {
            let p = layer.placement;
            let col_start = (((p.left - min_x) / scale_x).floor().max(0.0)) as u32;
            let col_end = (((layer.right() - min_x) / scale_x).ceil() as u32).min(width);
            let row_start = (((max_y - p.top) / scale_y).floor().max(0.0)) as u32;
            let row_end = (((max_y - layer.bottom()) / scale_y).ceil() as u32).min(height);

            for row in row_start..row_end {
                let y = max_y - (row as f64 + 0.5) * scale_y;
                let src_row = ((p.top - y) / p.scale_y).floor();
                if src_row < 0.0 || src_row >= layer.height as f64 {
                    continue;
                }
                for col in col_start..col_end {
                    let x = min_x + (col as f64 + 0.5) * scale_x;
                    let src_col = ((x - p.left) / p.scale_x).floor();
                    if src_col < 0.0 || src_col >= layer.width as f64 {
                        continue;
                    }
                    let src = (src_row as usize * layer.width as usize + src_col as usize) * 4;
                    if layer.pixels[src + 3] == 0 {
                        continue;
                    }
                    let dst = (row as usize * width as usize + col as usize) * 4;
                    canvas[dst..dst + 4].copy_from_slice(&layer.pixels[src..src + 4]);
                }
            }
        }

        write_geotiff(
            output,
            width,
            height,
            &canvas,
            Placement {
                left: min_x,
                top: max_y,
                scale_x,
                scale_y,
            },
        )
    }
}
