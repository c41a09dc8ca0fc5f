//! # Crossovers CLI (`crossovers`)
//!
//! Finds crossovers between the legacy hyperspectral archive and the
//! commercial constellation catalog, then renders a georeferenced mosaic
//! per source scene for visual inspection.
//!
//! ## Usage
//!
//! ```bash
//! crossovers --config ./config/crossovers.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `crossovers find-crossovers <input> <output>` | Search the catalog for every scene in a legacy export |
//! | `crossovers render-crossovers <input> <output_dir>` | Fetch, key, tag and merge each crossover group |
//! | `crossovers world-file <resolution> <x> <y>` | Print a north-up world file |
//!
//! ## Examples
//!
//! ```bash
//! export PLANET_API_KEY=...
//! crossovers find-crossovers eo1_scenes.json crossovers.json
//! crossovers render-crossovers crossovers.json ./composites --progress human
//! ```

mod catalog;
mod compose;
mod config;
mod find;
mod http;
mod legacy;
mod progress;
mod raster;
mod render;

use clap::{Parser, Subcommand};
use crossover_core::georef::GeoReference;
use std::path::PathBuf;

use progress::ProgressMode;

/// Crossover finder and composite renderer.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/crossovers.example.toml` for every key.
#[derive(Parser)]
#[command(
    name = "crossovers",
    about = "Find catalog crossovers of legacy hyperspectral scenes and render georeferenced composites",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/crossovers.toml`. A missing file means all
    /// defaults.
    #[arg(long, global = true, default_value = "./config/crossovers.toml")]
    config: PathBuf,

    /// Progress on stderr: auto (human when stderr is a terminal), human,
    /// json, or off.
    #[arg(long, global = true, value_enum, default_value = "auto")]
    progress: ProgressMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for crossovers of every scene in a legacy catalog export.
    ///
    /// Writes a JSON array of `{source_scene_id, crossovers}` groups.
    /// Scenes without crossovers are left out.
    FindCrossovers {
        /// Legacy catalog export (JSON array of scene records).
        input: PathBuf,
        /// Where to write the crossover document.
        output: PathBuf,
    },

    /// Render one georeferenced mosaic per crossover group.
    ///
    /// Exits non-zero if any group fails; the others are still written.
    RenderCrossovers {
        /// Crossover document written by `find-crossovers`.
        input: PathBuf,
        /// Root directory; each group gets a subdirectory named by scene id.
        output_dir: PathBuf,
    },

    /// Print the world file for a north-up raster.
    WorldFile {
        /// Ground units per pixel.
        resolution: f64,
        /// X of the upper-left pixel.
        #[arg(allow_hyphen_values = true)]
        x: f64,
        /// Y of the upper-left pixel.
        #[arg(allow_hyphen_values = true)]
        y: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::FindCrossovers { input, output } => {
            let cfg = config::load_or_default(&cli.config)?;
            find::run_find(&cfg, &input, &output, cli.progress.reporter()).await?;
        }
        Commands::RenderCrossovers { input, output_dir } => {
            let cfg = config::load_or_default(&cli.config)?;
            render::run_render(&cfg, &input, &output_dir, cli.progress.reporter()).await?;
        }
        Commands::WorldFile { resolution, x, y } => {
            if !(resolution > 0.0 && resolution.is_finite()) {
                anyhow::bail!("resolution must be a positive number");
            }
            print!("{}", GeoReference::north_up(resolution, x, y).to_world_file());
        }
    }

    Ok(())
}
