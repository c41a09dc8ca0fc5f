//! # Crossovers
//!
//! Correlates scenes from two independently operated earth-observation
//! catalogs, a legacy hyperspectral archive and a commercial constellation,
//! and renders composites of the images that cross over.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   ┌─────────────────┐   ┌─────────────────┐
//! │ Legacy export │──▶│ CrossoverFinder │──▶│ crossovers.json │
//! │ (scenes)      │   │ + CatalogClient │   │ (groups)        │
//! └───────────────┘   └─────────────────┘   └────────┬────────┘
//!                                                    ▼
//!                       ┌───────────────────────────────────┐
//!                       │ CompositeBuilder                  │
//!                       │ fetch ─▶ key ─▶ tag (per layer)   │
//!                       │ mosaic (base, then candidates)    │
//!                       └───────────────────────────────────┘
//! ```
//!
//! Pure matching logic, the data model and the collaborator traits live in
//! the `crossover-core` crate; this crate wires them to HTTP, the
//! filesystem and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`http`] | Timeouts and retry with backoff |
//! | [`catalog`] | Commercial catalog search and thumbnails |
//! | [`legacy`] | Legacy browse archive fetcher |
//! | [`raster`] | Native raster backend (keying, GeoTIFF, mosaic) |
//! | [`compose`] | Per-group compositing pipeline |
//! | [`find`] | `find-crossovers` command |
//! | [`render`] | `render-crossovers` command |
//! | [`progress`] | Progress reporting on stderr |

pub mod catalog;
pub mod compose;
pub mod config;
pub mod find;
pub mod http;
pub mod legacy;
pub mod progress;
pub mod raster;
pub mod render;
