//! Ground resolution and world-file georeferencing.
//!
//! A [`GeoReference`] is the six-parameter affine transform of a world
//! file, restricted to north-up rasters: both rotation terms are zero.
//!
//! World file layout, one value per line:
//!
//! ```text
//! pixel X size
//! rotation about the Y axis (0)
//! rotation about the X axis (0)
//! negative pixel Y size
//! X of the upper-left pixel centre
//! Y of the upper-left pixel centre
//! ```

use crate::error::CrossoverError;

/// Full-resolution geometry of a catalog asset, from its properties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterGeometry {
    pub columns: u32,
    pub pixel_resolution: f64,
    pub origin_x: f64,
    pub origin_y: f64,
}

impl RasterGeometry {
    /// Georeference for a preview of this asset that is `preview_width` wide.
    pub fn preview_reference(&self, preview_width: u32) -> GeoReference {
        let resolution = derive_resolution(preview_width, self.columns, self.pixel_resolution);
        GeoReference::north_up(resolution, self.origin_x, self.origin_y)
    }
}

/// Ground resolution of a resampled raster.
///
/// `new_width == old_width` returns `old_resolution` unchanged.
pub fn derive_resolution(new_width: u32, old_width: u32, old_resolution: f64) -> f64 {
    old_resolution * (old_width as f64 / new_width as f64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoReference {
    pub pixel_size_x: f64,
    pub rotation_y: f64,
    pub rotation_x: f64,
    pub pixel_size_y: f64,
    pub origin_x: f64,
    pub origin_y: f64,
}

impl GeoReference {
    pub fn north_up(resolution: f64, x: f64, y: f64) -> Self {
        Self {
            pixel_size_x: resolution,
            rotation_y: 0.0,
            rotation_x: 0.0,
            pixel_size_y: -resolution,
            origin_x: x,
            origin_y: y,
        }
    }

    pub fn to_array(&self) -> [f64; 6] {
        [
            self.pixel_size_x,
            self.rotation_y,
            self.rotation_x,
            self.pixel_size_y,
            self.origin_x,
            self.origin_y,
        ]
    }

    /// Reference for the same raster after dropping `cols` leading columns
    /// and `rows` leading rows.
    pub fn shifted(&self, cols: u32, rows: u32) -> Self {
        Self {
            origin_x: self.origin_x + cols as f64 * self.pixel_size_x,
            origin_y: self.origin_y + rows as f64 * self.pixel_size_y,
            ..*self
        }
    }

    pub fn to_world_file(&self) -> String {
        let lines: Vec<String> = self.to_array().iter().map(|v| format!("{v:?}")).collect();
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }

    pub fn parse_world_file(text: &str) -> Result<Self, CrossoverError> {
        let values = text
            .split_whitespace()
            .map(|token| {
                token
                    .parse::<f64>()
                    .map_err(|e| CrossoverError::parse("world file", format!("'{token}': {e}")))
            })
            .collect::<Result<Vec<f64>, _>>()?;
        let [a, d, b, e, c, f] = <[f64; 6]>::try_from(values.as_slice()).map_err(|_| {
            CrossoverError::parse("world file", format!("expected 6 values, found {}", values.len()))
        })?;
        if d != 0.0 || b != 0.0 {
            return Err(CrossoverError::parse(
                "world file",
                "rotated rasters are not supported",
            ));
        }
        Ok(Self {
            pixel_size_x: a,
            rotation_y: d,
            rotation_x: b,
            pixel_size_y: e,
            origin_x: c,
            origin_y: f,
        })
    }
}
