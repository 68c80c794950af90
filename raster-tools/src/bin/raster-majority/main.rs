use clap::*;

use raster_tools::cli::args::optional;
use raster_tools::{utils::*, *, Result, Tracker};
use rastercalc::fmask::MajorityFilter;
use rastercalc::prelude::*;
use tracing::info;

// Main function
raster_tools::sync_main!(run());

fn run() -> Result<()> {
    // Parse command line
    let args = parse_cmd_line();
    let _tracker = Tracker::install("majority filter", 1)?;

    let input = read_raster(&args.input)?;
    let driver = GdalDriver;
    info!(
        "filtering {} with a {}x{} window",
        args.input.display(),
        args.window_size,
        args.window_size
    );
    let calc = ImageCalc::new();
    if args.existing {
        let mut output = edit_raster(&args.output.path)?;
        calc.calc_window_into_existing(&[&input], args.window_size, &mut MajorityFilter::new(), &mut output)?;
    } else {
        calc.calc_window_to_new(
            &[&input],
            args.window_size,
            &mut MajorityFilter::new(),
            &args.output.raster(&driver, PixelType::Byte),
        )?;
    }
    Ok(())
}

use std::path::PathBuf;
/// Program arguments
pub struct Args {
    /// Cloud mask
    input: PathBuf,
    /// Filtered mask
    output: OutputArgs,
    /// Side of the square window
    window_size: i64,
    /// Write into an existing output
    existing: bool,
}

fn parse_cmd_line() -> Args {
    let matches = args_parser!("raster-majority")
        .about("Grow a cloud mask with a majority filter.")
        .arg(
            arg!("input")
                .required(true)
                .help("Input cloud mask (1 = cloud)"),
        )
        .arg(arg!("output").required(true).help("Output path"))
        .arg(
            opt!("window size")
                .short("w")
                .help("Window side, odd and at least 3 (default: 3)"),
        )
        .arg(
            opt!("driver")
                .short("d")
                .help("Output driver (default: GTIFF)"),
        )
        .arg(
            Arg::with_name("existing")
                .long("existing")
                .short("e")
                .help("Write into an existing output raster of matching size"),
        )
        .get_matches();

    let input = value_t!(matches, "input", PathBuf).unwrap_or_else(|e| e.exit());
    let output = value_t!(matches, "output", PathBuf).unwrap_or_else(|e| e.exit());
    let driver = matches.value_of("driver").unwrap_or(DEFAULT_DRIVER);
    let window_size = optional(&matches, "window size").unwrap_or(3);

    Args {
        input,
        output: OutputArgs::new(output, driver),
        window_size,
        existing: matches.is_present("existing"),
    }
}
