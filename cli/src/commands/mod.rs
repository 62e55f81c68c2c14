use clap::Args;

use crate::input::csv::CsvOptions;

pub mod aggregate;
pub mod convert;
pub mod dump;

/// Columns of a CSV event file
#[derive(Args, Debug, Clone)]
pub struct CsvArgs {
    /// Index of the column holding the latitude
    #[arg(long, default_value_t = 1)]
    pub lat_column: usize,

    /// Index of the column holding the longitude
    #[arg(long, default_value_t = 2)]
    pub lon_column: usize,

    /// Index of the column holding the magnitude
    #[arg(long, default_value_t = 3)]
    pub magnitude_column: usize,
}

impl From<&CsvArgs> for CsvOptions {
    fn from(value: &CsvArgs) -> Self {
        CsvOptions {
            lat_column: value.lat_column,
            lon_column: value.lon_column,
            magnitude_column: value.magnitude_column,
        }
    }
}
