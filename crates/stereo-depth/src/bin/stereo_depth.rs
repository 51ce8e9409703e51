use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use log::{info, LevelFilter};
use stereo_depth::bm::{compute_disparity, BlockMatchParameters};
use stereo_depth::calib::{CalibrationOptions, CalibrationResult};
use stereo_depth::core::{init_from_env, load_json, ChessboardGeometry, ImageSize, LOG_ENV_VAR};
use stereo_depth::images;
use stereo_depth::rectify::Rectifier;
use stereo_depth::tuning::{load_parameters, save_parameters};
use stereo_depth::DepthPipeline;

/// Stereo calibration, rectification and block-matching depth.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Log level: error, warn, info, debug or trace. `RUST_LOG` refines it;
    /// setting `STEREO_DEPTH_LOG` switches to the compact stage logger.
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    /// Emit `tracing` spans instead of plain log lines.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    tracing: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Calibrate a stereo rig from a folder of `left_*.png` / `right_*.png` pairs.
    Calibrate(CalibrateArgs),
    /// Rectify one image pair with a calibration bundle.
    Rectify(RectifyArgs),
    /// Compute a disparity map for one image pair.
    Disparity(DisparityArgs),
    /// Write the default block-matching parameter file.
    Params {
        /// Destination JSON file.
        #[arg(long, default_value = "3dmap_set.txt")]
        out: PathBuf,
    },
}

#[derive(Debug, Args)]
struct CalibrateArgs {
    /// Folder holding the image pairs.
    #[arg(long)]
    images: PathBuf,
    /// Output bundle folder.
    #[arg(long, default_value = "calibration")]
    out: PathBuf,
    #[arg(long, default_value_t = 7)]
    rows: usize,
    #[arg(long, default_value_t = 7)]
    cols: usize,
    /// Square edge length; the baseline is reported in the same unit.
    #[arg(long, default_value_t = 34.5)]
    square: f64,
    #[arg(long, default_value_t = 640)]
    width: usize,
    #[arg(long, default_value_t = 480)]
    height: usize,
    /// Optional JSON `CalibrationOptions`.
    #[arg(long)]
    options: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct PairArgs {
    #[arg(long)]
    left: PathBuf,
    #[arg(long)]
    right: PathBuf,
    /// Output folder.
    #[arg(long, default_value = "out")]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct RectifyArgs {
    /// Calibration bundle folder.
    #[arg(long)]
    calibration: PathBuf,
    #[command(flatten)]
    pair: PairArgs,
}

#[derive(Debug, Args)]
struct DisparityArgs {
    /// Calibration bundle folder. Without it the pair is taken as already rectified.
    #[arg(long)]
    calibration: Option<PathBuf>,
    /// Parameter file; defaults are used if omitted.
    #[arg(long)]
    params: Option<PathBuf>,
    #[command(flatten)]
    pair: PairArgs,
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(&cli);
    match cli.command {
        Command::Calibrate(args) => calibrate(&args),
        Command::Rectify(args) => rectify(&args),
        Command::Disparity(args) => disparity(&args),
        Command::Params { out } => {
            save_parameters(&BlockMatchParameters::default(), &out)?;
            println!("wrote default parameters to {}", out.display());
            Ok(())
        }
    }
}

fn init_logging(cli: &Cli) {
    #[cfg(feature = "tracing")]
    {
        if cli.tracing {
            let _ = tracing_log::LogTracer::init();
            stereo_depth::core::init_tracing(false);
            return;
        }
    }
    // The compact stage logger takes over when its variable is set.
    if std::env::var_os(LOG_ENV_VAR).is_some() {
        let _ = init_from_env();
        return;
    }
    let _ = env_logger::Builder::new()
        .filter_level(cli.log_level)
        .parse_default_env()
        .try_init();
}

fn calibrate(args: &CalibrateArgs) -> Result<(), Box<dyn Error>> {
    let board = ChessboardGeometry::new(args.rows, args.cols, args.square);
    let options = match &args.options {
        Some(path) => load_json::<CalibrationOptions>(path)?,
        None => CalibrationOptions::default(),
    };
    let size = ImageSize::new(args.width, args.height);
    let (result, report) = images::calibrate_directory(&args.images, board, size, options)?;
    result.export(&args.out)?;
    println!(
        "calibrated from {} pairs ({} skipped): baseline {:.3}, rms {:.4}px",
        report.accepted,
        report.skipped(),
        result.baseline(),
        result.rms.stereo
    );
    println!(
        "focal lengths: left {:.2}, right {:.2}",
        result.left.intrinsics.fx, result.right.intrinsics.fx
    );
    Ok(())
}

fn write_pair(
    dir: &Path,
    left: &stereo_depth::core::GrayImage,
    right: &stereo_depth::core::GrayImage,
) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(dir)?;
    images::save_gray(left, dir.join("rectified_left.png"))?;
    images::save_gray(right, dir.join("rectified_right.png"))?;
    Ok(())
}

fn rectify(args: &RectifyArgs) -> Result<(), Box<dyn Error>> {
    let calibration = CalibrationResult::import(&args.calibration)?;
    let left = images::load_gray(&args.pair.left)?;
    let right = images::load_gray(&args.pair.right)?;
    let mut rectifier = Rectifier::new();
    rectifier.initialize(&calibration, left.size())?;
    let (left, right) = rectifier.rectify(&left.view(), &right.view())?;
    write_pair(&args.pair.out, &left, &right)?;
    println!("wrote rectified pair to {}", args.pair.out.display());
    Ok(())
}

fn disparity(args: &DisparityArgs) -> Result<(), Box<dyn Error>> {
    let params = match &args.params {
        Some(path) => load_parameters(path)?,
        None => BlockMatchParameters::default(),
    };
    let left = images::load_gray(&args.pair.left)?;
    let right = images::load_gray(&args.pair.right)?;

    let map = match &args.calibration {
        Some(dir) => {
            let pipeline = DepthPipeline::from_bundle(dir, Some(left.size()), params)?;
            let frame = pipeline.process(&left.view(), &right.view())?;
            write_pair(&args.pair.out, &frame.left, &frame.right)?;
            frame.disparity
        }
        None => compute_disparity(&left.view(), &right.view(), &params)?,
    };
    info!("{} of {} pixels valid", map.valid_count(), map.size().area());
    let (gray, jet) = images::save_disparity(&map, &args.pair.out, "disparity")?;
    println!("wrote {} and {}", gray.display(), jet.display());
    Ok(())
}
