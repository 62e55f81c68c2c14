use std::{
    io::{self, BufRead, Lines},
    ops::Range,
};

use pipagg_core::event::PointEvent;
use thiserror::Error;
use yansi::{Condition, Paint};

/// Describes which columns of a CSV file hold the event's attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    pub lat_column: usize,
    pub lon_column: usize,

    /// Column holding the magnitude. Missing or unparsable values become 0.
    pub magnitude_column: usize,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            lat_column: 1,
            lon_column: 2,
            magnitude_column: 3,
        }
    }
}

/// An event read from a CSV file
#[derive(Debug, Clone, PartialEq)]
pub struct CsvEvent {
    /// The value of the first column (e.g. the date of a quake)
    pub key: String,
    pub event: PointEvent,
}

/// An error that happened while reading a CSV file
#[derive(Error, Debug)]
pub enum CsvError {
    #[error("{0}")]
    Parse(String),

    #[error("Unable to read line {line}")]
    Io {
        line: usize,

        #[source]
        source: io::Error,
    },
}

impl CsvError {
    /// Renders the offending line and highlights `span`
    fn parse(line_number: usize, line: &str, span: Range<usize>, msg: &str) -> Self {
        let span_len = span.end - span.start;
        let center_prefix = ((span_len + 1) / 2).saturating_sub(1);
        let center_suffix = span_len / 2;
        CsvError::Parse(
            format!(
                "Unable to parse line {}\n\n{}{}{}\n{}{}{}{}\n{}{}{}",
                line_number,
                &line[..span.start],
                &line[span.start..span.end].red(),
                &line[span.end..],
                " ".repeat(span.start),
                "─".repeat(center_prefix).red(),
                (if span.end > span.start { "┬" } else { "│" }).red(),
                "─".repeat(center_suffix).red(),
                " ".repeat(span.start + center_prefix),
                "╰── ".red(),
                msg.red().bold()
            )
            .whenever(Condition::from(|| {
                Condition::stderr_is_tty() && Condition::clicolor() && Condition::no_color()
            }))
            .to_string(),
        )
    }
}

/// Splits a line into fields and records the byte range of each of them
fn fields(line: &str) -> Vec<(&str, Range<usize>)> {
    let mut result = Vec::new();
    let mut start = 0;
    for f in line.split(',') {
        result.push((f, start..start + f.len()));
        start += f.len() + 1;
    }
    result
}

/// Parses a single data line. `line_number` is 1-based and only used for
/// error messages.
pub fn parse_line(
    line_number: usize,
    line: &str,
    options: &CsvOptions,
) -> Result<CsvEvent, CsvError> {
    let fields = fields(line);

    let coordinate = |column: usize, name: &str| -> Result<f64, CsvError> {
        let Some((value, span)) = fields.get(column) else {
            return Err(CsvError::parse(
                line_number,
                line,
                line.len()..line.len(),
                &format!("Missing {name} in column {column}."),
            ));
        };
        value.trim().parse::<f64>().map_err(|_| {
            CsvError::parse(
                line_number,
                line,
                span.clone(),
                &format!("Invalid {name}."),
            )
        })
    };

    let lat = coordinate(options.lat_column, "latitude")?;
    let lon = coordinate(options.lon_column, "longitude")?;
    let magnitude = fields
        .get(options.magnitude_column)
        .and_then(|(m, _)| m.trim().parse::<f64>().ok())
        .unwrap_or(0.0);
    let key = fields
        .first()
        .map(|(k, _)| k.trim().to_string())
        .unwrap_or_default();

    Ok(CsvEvent {
        key,
        event: PointEvent::new(lon, lat, magnitude),
    })
}

/// Reads events from a CSV file. The first line is a header and is skipped,
/// as are blank lines.
pub struct CsvReader<R> {
    lines: Lines<R>,
    line_number: usize,
    options: CsvOptions,
}

impl<R> CsvReader<R>
where
    R: BufRead,
{
    pub fn new(reader: R, options: CsvOptions) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
            options,
        }
    }
}

impl<R> Iterator for CsvReader<R>
where
    R: BufRead,
{
    type Item = Result<CsvEvent, CsvError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_number += 1;
            let line = match line {
                Ok(line) => line,
                Err(source) => {
                    return Some(Err(CsvError::Io {
                        line: self.line_number,
                        source,
                    }))
                }
            };
            if self.line_number == 1 || line.trim().is_empty() {
                continue;
            }
            return Some(parse_line(self.line_number, &line, &self.options));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pipagg_core::event::PointEvent;
    use pretty_assertions::assert_eq;

    use super::{parse_line, CsvError, CsvEvent, CsvOptions, CsvReader};

    const QUAKES: &str = "\
DATE,LATITUDE,LONGITUDE,MAGNITUDE
1898-06-29,52,172,7.6
1898-09-20,51.5,-176.5,

1899-09-04,60,-142,8.3
";

    #[test]
    fn read() {
        let events = CsvReader::new(Cursor::new(QUAKES), CsvOptions::default())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(
            events,
            vec![
                CsvEvent {
                    key: "1898-06-29".to_string(),
                    event: PointEvent::new(172.0, 52.0, 7.6),
                },
                CsvEvent {
                    key: "1898-09-20".to_string(),
                    event: PointEvent::new(-176.5, 51.5, 0.0),
                },
                CsvEvent {
                    key: "1899-09-04".to_string(),
                    event: PointEvent::new(-142.0, 60.0, 8.3),
                },
            ]
        );
    }

    #[test]
    fn header_only() {
        let mut reader = CsvReader::new(Cursor::new("a,b,c\n"), CsvOptions::default());
        assert!(reader.next().is_none());
    }

    #[test]
    fn custom_columns() {
        let options = CsvOptions {
            lat_column: 2,
            lon_column: 1,
            magnitude_column: 9,
        };
        let e = parse_line(2, "x, 10.5 ,-3,4", &options).unwrap();
        assert_eq!(e.key, "x");
        assert_eq!(e.event, PointEvent::new(10.5, -3.0, 0.0));
    }

    #[test]
    fn invalid_number() {
        let reader = CsvReader::new(
            Cursor::new("h\n2000-01-01,1,2,3\n2000-01-02,north,2,3\n"),
            CsvOptions::default(),
        );
        let results = reader.collect::<Vec<_>>();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(CsvError::Parse(msg)) => {
                assert!(msg.contains("line 3"));
                assert!(msg.contains("Invalid latitude."));
                assert!(msg.contains("2000-01-02,"));
            }
            r => panic!("unexpected result {r:?}"),
        }
    }

    #[test]
    fn missing_column() {
        let err = parse_line(7, "2000-01-01,1", &CsvOptions::default()).unwrap_err();
        match err {
            CsvError::Parse(msg) => {
                assert!(msg.contains("line 7"));
                assert!(msg.contains("Missing longitude in column 2."));
            }
            e => panic!("unexpected error {e:?}"),
        }
    }
}
