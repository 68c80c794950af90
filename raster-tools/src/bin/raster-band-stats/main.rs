use clap::*;

use raster_tools::cli::args::optional;
use raster_tools::{utils::*, *, Result, Tracker};
use rastercalc::prelude::*;

// Main function
raster_tools::sync_main!(run());

fn run() -> Result<()> {
    // Parse command line
    let args = parse_cmd_line();
    let _tracker = Tracker::install("band stats", 1)?;

    let input = read_raster(&args.input)?;
    let mut stats = BandStats::new();
    if let Some(no_data) = args.no_data {
        stats = stats.with_no_data(no_data);
    }

    calc_engine(args.block_height).calc_no_output(&[&input], &mut stats)?;
    print_json(&stats.summaries())?;
    Ok(())
}

use std::path::PathBuf;
/// Program arguments
pub struct Args {
    /// Input raster
    input: PathBuf,
    /// Value to skip
    no_data: Option<f64>,
    /// Rows per block
    block_height: Option<usize>,
}

fn parse_cmd_line() -> Args {
    let matches = args_parser!("raster-band-stats")
        .about("Compute min, max, mean and standard deviation of every band.")
        .arg(
            arg!("input")
                .required(true)
                .help("Input path (raster dataset)"),
        )
        .arg(opt!("no data").short("n").help("Value to ignore (NaN is always ignored)"))
        .arg(
            opt!("block height")
                .short("b")
                .help("Rows read per block (default: native block height)"),
        )
        .get_matches();

    let input = value_t!(matches, "input", PathBuf).unwrap_or_else(|e| e.exit());
    let no_data = optional(&matches, "no data");
    let block_height = optional(&matches, "block height");

    Args {
        input,
        no_data,
        block_height,
    }
}
