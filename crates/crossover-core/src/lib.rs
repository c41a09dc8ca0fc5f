//! # Crossover Core
//!
//! Shared, I/O-free logic for crossovers: scene models, footprint
//! polygons, acquisition time windows, offset rendering, ground
//! resolution and georeferencing, the collaborator traits, and the
//! crossover finder.
//!
//! This crate contains no tokio, reqwest, filesystem access, or other
//! native-only dependencies. Network clients, the raster backend, and
//! the compositing pipeline live in the `crossovers` crate.
//!
//! ```text
//! SourceScene ──▶ Polygon + TimeWindow ──▶ SearchService
//!                                              │
//!                                              ▼
//!                    CrossoverGroup ◀── CandidateMatch (+ offset)
//! ```

pub mod error;
pub mod fetch;
pub mod finder;
pub mod footprint;
pub mod georef;
pub mod models;
pub mod raster;
pub mod search;
pub mod time;
