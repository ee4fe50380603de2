use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Local;
use clap::{ArgAction, Parser};
use env_logger::Builder;
use log::LevelFilter;
use thiserror::Error;

use pcd_classifier::{
    external::{CommandDetector, CommandSegmenter},
    ClassificationError, ClassificationOrchestrator, ClassificationParams, FilePointCloudStore,
    ModelError, StoreError,
};
use pcd_raster::Raster;

#[derive(Parser, Debug)]
#[command(
    name = "Forest Classify",
    about = "Labels the tree points of a colored LiDAR point cloud",
    author = "MIERUNE Inc.",
    version = "0.0.1"
)]
struct Cli {
    /// Input point cloud (.las, .laz, .csv or .txt)
    #[arg(long, required = true, value_name = "FILE")]
    path: PathBuf,

    /// Raster cell size in meters
    #[arg(long, default_value_t = 0.4)]
    resolution: f64,

    /// Detector window side in meters
    #[arg(long = "window_size", alias = "window-size", default_value_t = 60.0)]
    window_size: f64,

    #[arg(long = "patch_overlap", alias = "patch-overlap", default_value_t = 0.25)]
    patch_overlap: f64,

    /// Write the labelled point cloud
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    save: bool,

    #[arg(
        long = "save_path",
        alias = "save-path",
        default_value = "tree_cloud.las",
        value_name = "FILE"
    )]
    save_path: PathBuf,

    /// Tree detection program
    #[arg(long, required = true, value_name = "PROGRAM")]
    detector: String,

    #[arg(long = "detector-arg", value_name = "ARG", allow_hyphen_values = true)]
    detector_args: Vec<String>,

    /// Box-prompted segmentation program
    #[arg(long, required = true, value_name = "PROGRAM")]
    segmenter: String,

    #[arg(long = "segmenter-arg", value_name = "ARG", allow_hyphen_values = true)]
    segmenter_args: Vec<String>,

    /// Also write the projected color raster as PNG
    #[arg(long = "raster_path", alias = "raster-path", value_name = "PNG")]
    raster_path: Option<PathBuf>,

    /// Also write the composite tree mask as PNG
    #[arg(long = "mask_path", alias = "mask-path", value_name = "PNG")]
    mask_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum AppError {
    #[error("failed to set up models: {0}")]
    Model(#[from] ModelError),

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error("save stage failed: {0}")]
    Save(#[from] StoreError),
}

fn write_debug_image(image: &Raster, path: &Path, what: &str) {
    match image.save(path) {
        Ok(()) => log::info!("{} written to {}", what, path.display()),
        Err(e) => log::warn!("could not write {} to {}: {}", what, path.display(), e),
    }
}

fn run(args: Cli) -> Result<(), AppError> {
    let params = ClassificationParams {
        resolution: args.resolution,
        window_size: args.window_size,
        patch_overlap: args.patch_overlap,
    };

    let detector = CommandDetector::new(args.detector, args.detector_args)?;
    let segmenter = CommandSegmenter::new(args.segmenter, args.segmenter_args)?;
    let mut orchestrator = ClassificationOrchestrator::new(
        Box::new(FilePointCloudStore),
        Box::new(detector),
        Box::new(segmenter),
    );

    let output = orchestrator.classify(&args.path, &params)?;

    if let Some(path) = &args.raster_path {
        write_debug_image(&output.raster, path, "raster");
    }
    if let Some(path) = &args.mask_path {
        write_debug_image(&output.mask, path, "mask");
    }

    if args.save {
        log::info!("saving {}", args.save_path.display());
        orchestrator.save(&output.cloud, &args.save_path)?;
    } else {
        log::info!("--save false, nothing written");
    }
    Ok(())
}

fn main() {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Cli::parse();

    log::info!("input file: {}", args.path.display());
    log::info!("resolution: {} m", args.resolution);
    log::info!("window size: {} m", args.window_size);
    log::info!("patch overlap: {}", args.patch_overlap);

    let start = std::time::Instant::now();
    if let Err(e) = run(args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
    log::info!("Elapsed: {:?}", start.elapsed());
}
