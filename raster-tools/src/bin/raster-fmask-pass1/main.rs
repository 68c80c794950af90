use clap::*;

use raster_tools::cli::args::optional;
use raster_tools::{utils::*, *, Result, Tracker};
use rastercalc::fmask::{run_pass1, Pass1Config, ThermalThresholds, PASS1_BAND_NAMES};
use rastercalc::prelude::*;
use serde_derive::Serialize;
use tracing::info;

// Main function
raster_tools::sync_main!(run());

#[derive(Serialize)]
struct Summary {
    valid_pixels: usize,
    potential_cloud_pixels: usize,
    potential_cloud_ratio: f64,
    thresholds: ThermalThresholds,
}

fn run() -> Result<()> {
    // Parse command line
    let args = parse_cmd_line();
    let _tracker = Tracker::install("fmask pass 1", 3)?;

    let image = read_raster(&args.image)?;
    let saturation = read_raster(&args.saturation)?;

    let driver = GdalDriver;
    let names: Vec<String> = PASS1_BAND_NAMES.iter().map(|n| n.to_string()).collect();
    let pass1_out = args
        .pass1
        .raster(&driver, PixelType::Float32)
        .with_band_names(&names);
    let valid_out = args.valid.raster(&driver, PixelType::Byte);

    let mut export = ColumnFile::create(&args.export, 2)?;
    let output = run_pass1(
        &calc_engine(args.block_height),
        &image,
        &saturation,
        args.config,
        &pass1_out,
        &valid_out,
        &mut export,
    )?;
    export.flush()?;
    info!("clear-sky temperatures written to {}", args.export.display());

    let thresholds = ThermalThresholds::from_samples(&export)?;
    print_json(&Summary {
        valid_pixels: output.valid_count,
        potential_cloud_pixels: output.pcp_count,
        potential_cloud_ratio: output.pcp_ratio(),
        thresholds,
    })
}

use std::path::PathBuf;
/// Program arguments
pub struct Args {
    /// Reflectance and thermal stack
    image: PathBuf,
    /// Per-band saturation flags
    saturation: PathBuf,
    pass1: OutputArgs,
    valid: OutputArgs,
    /// Clear-sky temperature samples
    export: PathBuf,
    config: Pass1Config,
    block_height: Option<usize>,
}

fn parse_cmd_line() -> Args {
    let matches = args_parser!("raster-fmask-pass1")
        .about("Run the first Fmask pass and derive the clear-sky temperature thresholds.")
        .arg(arg!("image").required(true).help("Input image stack"))
        .arg(
            arg!("saturation")
                .required(true)
                .help("Saturation flags, one band per image band"),
        )
        .arg(arg!("pass1").required(true).help("Pass 1 output path"))
        .arg(arg!("valid").required(true).help("Valid mask output path"))
        .arg(
            arg!("export")
                .required(true)
                .help("Clear-sky temperature export path"),
        )
        .arg(
            opt!("scale factor")
                .short("s")
                .help("Divisor giving reflectance (default: 10000)"),
        )
        .arg(
            opt!("whiteness")
                .short("w")
                .help("Whiteness test threshold (default: 0.7)"),
        )
        .arg(
            opt!("block height")
                .short("b")
                .help("Rows processed per block"),
        )
        .arg(
            opt!("driver")
                .short("d")
                .help("Output driver (default: GTIFF)"),
        )
        .get_matches();

    let image = value_t!(matches, "image", PathBuf).unwrap_or_else(|e| e.exit());
    let saturation = value_t!(matches, "saturation", PathBuf).unwrap_or_else(|e| e.exit());
    let pass1 = value_t!(matches, "pass1", PathBuf).unwrap_or_else(|e| e.exit());
    let valid = value_t!(matches, "valid", PathBuf).unwrap_or_else(|e| e.exit());
    let export = value_t!(matches, "export", PathBuf).unwrap_or_else(|e| e.exit());
    let driver = matches.value_of("driver").unwrap_or(DEFAULT_DRIVER);

    let mut config = Pass1Config::default();
    if let Some(scale) = optional(&matches, "scale factor") {
        config = config.with_scale_factor(scale);
    }
    if let Some(threshold) = optional(&matches, "whiteness") {
        config = config.with_whiteness_threshold(threshold);
    }
    let block_height = optional(&matches, "block height");

    Args {
        image,
        saturation,
        pass1: OutputArgs::new(pass1, driver),
        valid: OutputArgs::new(valid, driver),
        export,
        config,
        block_height,
    }
}
