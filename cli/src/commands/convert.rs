use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::Args;
use humantime::format_duration;
use pipagg_core::codec::{KeyedRecordWriter, QuakeRecord};

use crate::input::csv::CsvReader;

use super::CsvArgs;

/// Convert a CSV file with events into binary quake records keyed by the
/// value of the first column
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// The CSV file to convert
    pub input: PathBuf,

    /// The file to write the records to
    pub output: PathBuf,

    #[command(flatten)]
    pub csv: CsvArgs,
}

/// Run the `convert` command
pub fn run_convert(args: ConvertArgs) -> Result<()> {
    let start = Instant::now();

    let input = File::open(&args.input)
        .with_context(|| format!("Unable to open input file `{}'", args.input.display()))?;
    let output = File::create(&args.output)
        .with_context(|| format!("Unable to create output file `{}'", args.output.display()))?;

    let mut writer = KeyedRecordWriter::new(BufWriter::new(output));
    for e in CsvReader::new(BufReader::new(input), (&args.csv).into()) {
        let e = e?;
        writer.write(&e.key, &QuakeRecord::from(e.event))?;
    }
    let written = writer.written();
    writer.finish()?;

    eprintln!(
        "Converted {} events in {}",
        written,
        format_duration(Duration::from_millis(start.elapsed().as_millis() as u64))
    );

    Ok(())
}
