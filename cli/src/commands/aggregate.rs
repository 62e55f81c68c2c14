use std::{
    ffi::OsString,
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use humantime::format_duration;
use log::info;
use pipagg_core::{
    aggregate::{
        pipeline::{run, PipelineOptions},
        CombineMode, Counts,
    },
    codec::KeyedRecordReader,
    event::PointEvent,
    index::{FeatureIndex, IndexOptions},
};

use crate::input::{csv::CsvReader, features::read_features};

use super::CsvArgs;

/// The format of the events to aggregate
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputFormat {
    /// CSV with a header line
    Csv,

    /// Keyed binary quake records as written by the `convert` command
    Records,
}

/// Count events per feature
#[derive(Args, Debug)]
pub struct AggregateArgs {
    /// GeoJSON file with the features (polygons) to count events in
    pub features: PathBuf,

    /// The file with the events
    pub input: PathBuf,

    /// Write the counts to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// The format of the input file
    #[arg(long, value_enum, default_value_t = InputFormat::Csv)]
    pub input_format: InputFormat,

    /// The feature property holding the label
    #[arg(long, default_value = "NAME")]
    pub label_attribute: String,

    #[command(flatten)]
    pub csv: CsvArgs,

    /// Number of worker threads (defaults to the number of CPUs)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Number of events sent to a worker at once
    #[arg(long, default_value_t = 1024)]
    pub batch_size: usize,

    /// Maximum depth of the quadtree (at most 16). Memory use can double with
    /// every additional level if many features overlap.
    #[arg(long, default_value_t = 8)]
    pub max_depth: u8,

    /// Number of features a quadtree node may hold before it is subdivided
    #[arg(long, default_value_t = 4)]
    pub leaf_capacity: usize,

    /// Do not combine counts in the workers before reducing them
    #[arg(long)]
    pub no_combine: bool,

    /// Fail if the feature file does not contain any polygons
    #[arg(long)]
    pub require_features: bool,
}

/// Writes counts as tab-separated lines sorted by label
fn write_counts<W: Write>(mut writer: W, counts: Counts) -> io::Result<()> {
    for (label, count) in counts.into_sorted_vec() {
        writeln!(writer, "{label}\t{count}")?;
    }
    writer.flush()
}

/// Writes into a temporary file next to `path` and renames it to `path` only
/// if `write` succeeds. On failure, the temporary file is removed and an
/// existing file at `path` stays untouched.
fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let file_name = path
        .file_name()
        .with_context(|| format!("Output path `{}' has no file name", path.display()))?;
    let mut tmp_name = OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let result = File::create(&tmp)
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            write(&mut writer)?;
            writer.into_inner().map_err(|e| e.into_error())?.sync_all()
        })
        .and_then(|()| fs::rename(&tmp, path));

    if let Err(err) = result {
        // the temporary file may not exist if creating it failed
        let _ = fs::remove_file(&tmp);
        return Err(err)
            .with_context(|| format!("Unable to write output file `{}'", path.display()));
    }
    Ok(())
}

/// Run the `aggregate` command
pub fn run_aggregate(args: AggregateArgs) -> Result<()> {
    let start = Instant::now();

    let features = read_features(&args.features, &args.label_attribute)?;
    let index = FeatureIndex::build(
        features,
        IndexOptions {
            max_depth: args.max_depth,
            leaf_capacity: args.leaf_capacity,
            require_features: args.require_features,
            ..Default::default()
        },
    )?;
    info!("Indexed {} features: {:?}", index.len(), index.stats());
    let index = Arc::new(index);

    let mut options = PipelineOptions {
        batch_size: args.batch_size,
        combine: if args.no_combine {
            CombineMode::PassThrough
        } else {
            CombineMode::Combine
        },
        ..Default::default()
    };
    if let Some(workers) = args.workers {
        options.workers = workers;
    }

    let file = File::open(&args.input)
        .with_context(|| format!("Unable to open input file `{}'", args.input.display()))?;
    let reader = BufReader::new(file);
    let counts = match args.input_format {
        InputFormat::Csv => {
            let events = CsvReader::new(reader, (&args.csv).into()).map(|r| r.map(|e| e.event));
            run(index, events, options)?
        }
        InputFormat::Records => {
            let events = KeyedRecordReader::new(reader)
                .map(|r| r.and_then(|(_, record)| PointEvent::try_from(record)));
            run(index, events, options)?
        }
    };

    let total = counts.total();
    let keys = counts.len();
    match &args.output {
        Some(path) => write_atomically(path, |w| write_counts(w, counts))?,
        None => write_counts(BufWriter::new(io::stdout().lock()), counts)?,
    }

    eprintln!(
        "Aggregated {} events into {} keys in {}",
        total,
        keys,
        format_duration(Duration::from_millis(start.elapsed().as_millis() as u64))
    );

    Ok(())
}
