//! Headless batch entry point: parse a project folder, resolve every
//! annotation to its tile and neighborhood, and write the CSV batches that
//! the stitching stage consumes.

use std::path::PathBuf;

use clap::Parser;

use sitestitch::batch::save_batches;
use sitestitch::constants::{DEFAULT_BATCH_SIZE, DEFAULT_HIGHMAG_LAYER, DEFAULT_STITCH_RADIUS};
use sitestitch::{ParserOptions, SiteError, TilePositionSource, resolve_project};

#[derive(Parser)]
#[command(
    name = "sitestitch",
    version,
    about = "Resolve annotated sites of interest to mosaic tiles and stitch neighborhoods"
)]
struct Cli {
    /// Project folder containing the project descriptor
    project_folder: PathBuf,

    /// Name of the acquisition group carrying the annotated tiles
    #[arg(long, default_value = DEFAULT_HIGHMAG_LAYER)]
    highmag_layer: String,

    /// Tile-steps in each direction around a matched tile to stitch
    #[arg(long, default_value_t = DEFAULT_STITCH_RADIUS)]
    stitch_radius: u32,

    /// Read the acquisition tool's calculated tile positions instead of the
    /// as-acquired ones
    #[arg(long)]
    calculated_positions: bool,

    /// Tolerate a project without annotations (e.g. classifier-driven runs)
    #[arg(long)]
    allow_missing_annotations: bool,

    /// Annotations per CSV batch file; 0 writes a single file
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Folder under the project folder receiving the CSV batches
    #[arg(long, default_value = "annotation_csv")]
    csv_folder: String,
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("sitestitch=info"),
    )
    .init();

    let cli = Cli::parse();
    if let Err(error) = run(&cli) {
        log::error!("{error}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), SiteError> {
    log::info!("Processing project {:?}", cli.project_folder);

    let position_source = if cli.calculated_positions {
        TilePositionSource::AsCalculated
    } else {
        TilePositionSource::AsAcquired
    };
    let options = ParserOptions::new()
        .highmag_layer(&cli.highmag_layer)
        .position_source(position_source)
        .stitch_radius(cli.stitch_radius)
        .require_annotations(!cli.allow_missing_annotations);

    let resolved = resolve_project(&cli.project_folder, &options)?;

    let csv_dir = cli.project_folder.join(&cli.csv_folder);
    std::fs::create_dir_all(&csv_dir)?;
    let project_name = cli
        .project_folder
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("project");
    let csv_path = csv_dir.join(format!("{project_name}_annotations.csv"));

    let files = save_batches(
        &resolved.annotation_tiles,
        &[],
        &csv_path,
        cli.batch_size,
    )?;

    log::info!(
        "Resolved {}/{} annotations ({} warnings), wrote {} batch files to {csv_dir:?}",
        resolved.annotation_tiles.len(),
        resolved.annotations.len(),
        resolved.warnings.len(),
        files.len()
    );
    Ok(())
}
