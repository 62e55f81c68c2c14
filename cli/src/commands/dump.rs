use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Args;
use pipagg_core::codec::KeyedRecordReader;

/// Print the contents of a keyed record file
#[derive(Args, Debug)]
pub struct DumpArgs {
    /// The file with keyed binary quake records
    pub input: PathBuf,
}

/// Writes every record as its key, its location in WKT, and its magnitude
/// separated by tabs. Returns the number of records.
fn dump<R: BufRead, W: Write>(reader: R, mut writer: W) -> Result<u64> {
    let mut n = 0;
    for record in KeyedRecordReader::new(reader) {
        let (key, record) =
            record.with_context(|| format!("Unable to decode record {}", n + 1))?;
        writeln!(writer, "{}\t{}\t{}", key, record.location, record.magnitude)?;
        n += 1;
    }
    writer.flush()?;
    Ok(n)
}

/// Run the `dump` command
pub fn run_dump(args: DumpArgs) -> Result<()> {
    let file = File::open(&args.input)
        .with_context(|| format!("Unable to open input file `{}'", args.input.display()))?;
    let n = dump(BufReader::new(file), BufWriter::new(io::stdout().lock()))?;
    eprintln!("Dumped {n} records");
    Ok(())
}
