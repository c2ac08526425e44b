mod artifacts;
mod config;
mod map_export;
mod pipeline;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ProjectConfig;
use crate::pipeline::{MapStatus, compile_map};

#[derive(Parser)]
#[command(author, version, about = "Compile tile maps into GBA tile atlases and hardware tilemaps")]
struct Arguments {
    /// Project file listing the maps to compile.
    #[arg(long, short = 'p', value_parser, default_value = "tilemaps.toml")]
    project: PathBuf,
    /// Output directory, overriding the project file.
    #[arg(long, short = 'o', value_parser)]
    output: Option<PathBuf>,
    /// Rebuild even when artifacts are up to date.
    #[arg(long)]
    force: bool,
    /// Deduplicate the full tileset images instead of only the used tiles.
    #[arg(long)]
    no_minimization: bool,
    /// Run deduplication passes on the rayon thread pool.
    #[arg(long)]
    parallel: bool,
    /// Only compile the named maps.
    #[arg(long = "map", value_name = "NAME")]
    maps: Vec<String>,
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> Result<()> {
    let arguments = Arguments::parse();
    init_tracing(arguments.verbose);

    let mut project = ProjectConfig::load(&arguments.project)?;
    if let Some(output) = arguments.output {
        project.output_dir = output;
    }
    project.options.force |= arguments.force;
    project.options.parallel_dedup |= arguments.parallel;
    if arguments.no_minimization {
        project.options.minimize = false;
    }

    for name in &arguments.maps {
        if !project.maps.iter().any(|map| &map.name == name) {
            warn!(map = %name, "map not listed in project file");
        }
    }

    let mut compiled = 0;
    let mut skipped = 0;
    for entry in &project.maps {
        if !arguments.maps.is_empty() && !arguments.maps.contains(&entry.name) {
            continue;
        }
        let status = compile_map(entry, &project.options, &project.output_dir)
            .with_context(|| format!("compile map {}", entry.name))?;
        match status {
            MapStatus::UpToDate => skipped += 1,
            MapStatus::Compiled { .. } => compiled += 1,
        }
    }
    info!(
        compiled,
        skipped,
        output = %project.output_dir.display(),
        "build finished"
    );
    Ok(())
}
