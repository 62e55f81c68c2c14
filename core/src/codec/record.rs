use std::io::{self, BufRead, Read, Write};

use bincode::config;

use crate::{event::PointEvent, geometry::Geometry};

use super::{check_declared_len, decode_body, DecodeError};

const MAGNITUDE_LEN: usize = std::mem::size_of::<f64>();

/// The maximum size of the key of a keyed record in bytes
pub const MAX_KEY_BYTES: usize = 64 * 1024;

/// A quake location together with its magnitude. This is the payload that is
/// transferred between processes.
#[derive(Debug, Clone, PartialEq)]
pub struct QuakeRecord {
    pub location: Geometry,
    pub magnitude: f64,
}

impl QuakeRecord {
    pub fn new(location: Geometry, magnitude: f64) -> Self {
        Self {
            location,
            magnitude,
        }
    }

    /// Encodes the record: the length-prefixed location followed by the
    /// magnitude as an 8-byte little-endian double
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.location.encode();
        buf.extend_from_slice(&self.magnitude.to_le_bytes());
        buf
    }

    /// Decodes a record from the beginning of `bytes` and returns it together
    /// with the number of bytes consumed
    pub fn decode_prefix(bytes: &[u8]) -> Result<(QuakeRecord, usize), DecodeError> {
        let (location, geometry_len) = Geometry::decode_prefix(bytes)?;
        let rest = &bytes[geometry_len..];
        let magnitude: [u8; MAGNITUDE_LEN] = rest
            .get(..MAGNITUDE_LEN)
            .and_then(|m| m.try_into().ok())
            .ok_or_else(|| DecodeError::Truncated {
                additional: MAGNITUDE_LEN - rest.len(),
            })?;
        Ok((
            QuakeRecord::new(location, f64::from_le_bytes(magnitude)),
            geometry_len + MAGNITUDE_LEN,
        ))
    }

    /// Decodes a record that spans exactly the given bytes
    pub fn decode(bytes: &[u8]) -> Result<QuakeRecord, DecodeError> {
        let (record, used) = Self::decode_prefix(bytes)?;
        if used != bytes.len() {
            return Err(DecodeError::TrailingBytes(bytes.len() - used));
        }
        Ok(record)
    }
}

impl From<PointEvent> for QuakeRecord {
    fn from(value: PointEvent) -> Self {
        QuakeRecord::new(Geometry::point(value.x, value.y), value.magnitude)
    }
}

impl TryFrom<QuakeRecord> for PointEvent {
    type Error = DecodeError;

    fn try_from(value: QuakeRecord) -> Result<Self, Self::Error> {
        let p = value.location.as_point().ok_or(DecodeError::NotAPoint)?;
        Ok(PointEvent::new(p.x(), p.y(), value.magnitude))
    }
}

/// Writes a stream of concatenated records
pub struct RecordWriter<W>
where
    W: Write,
{
    writer: W,
    written: u64,
}

impl<W> RecordWriter<W>
where
    W: Write,
{
    /// Create a new record writer that writes into the given writer
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Appends a record to the stream
    pub fn write(&mut self, record: &QuakeRecord) -> std::io::Result<()> {
        self.writer.write_all(&record.encode())?;
        self.written += 1;
        Ok(())
    }

    /// The number of records written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flushes the underlying writer and returns it
    pub fn finish(mut self) -> std::io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Reads a stream of concatenated records. The iterator ends cleanly only if
/// the input ends exactly at a record boundary. It stops after the first
/// error.
pub struct RecordReader<R> {
    reader: R,
    failed: bool,
}

impl<R> RecordReader<R>
where
    R: BufRead,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            failed: false,
        }
    }

    /// Reads exactly `len` bytes or fails with [`DecodeError::Truncated`]
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, DecodeError> {
        let mut buf = Vec::with_capacity(len);
        (&mut self.reader).take(len as u64).read_to_end(&mut buf)?;
        if buf.len() < len {
            return Err(DecodeError::Truncated {
                additional: len - buf.len(),
            });
        }
        Ok(buf)
    }

    fn read_record(&mut self) -> Result<Option<QuakeRecord>, DecodeError> {
        if self.reader.fill_buf()?.is_empty() {
            return Ok(None);
        }

        let declared: u64 = bincode::decode_from_std_read(&mut self.reader, config::standard())?;
        let len = check_declared_len(declared)?;
        let location = decode_body(&self.read_bytes(len)?)?;

        let magnitude = self.read_bytes(MAGNITUDE_LEN)?;
        let mut m = [0u8; MAGNITUDE_LEN];
        m.copy_from_slice(&magnitude);

        Ok(Some(QuakeRecord::new(location, f64::from_le_bytes(m))))
    }
}

impl<R> Iterator for RecordReader<R>
where
    R: BufRead,
{
    type Item = Result<QuakeRecord, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_record() {
            Ok(r) => r.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Writes a stream of records that are each preceded by a key (e.g. the date
/// of a quake). The key is a UTF-8 string in bincode's standard encoding:
///
/// ```text
/// keyed := varint(len) utf8[len] record
/// ```
pub struct KeyedRecordWriter<W>
where
    W: Write,
{
    records: RecordWriter<W>,
}

impl<W> KeyedRecordWriter<W>
where
    W: Write,
{
    pub fn new(writer: W) -> Self {
        Self {
            records: RecordWriter::new(writer),
        }
    }

    /// Appends a key and its record to the stream. Fails with
    /// [`io::ErrorKind::InvalidInput`] if the key is longer than
    /// [`MAX_KEY_BYTES`].
    pub fn write(&mut self, key: &str, record: &QuakeRecord) -> io::Result<()> {
        if key.len() > MAX_KEY_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("key must not be longer than {MAX_KEY_BYTES} bytes"),
            ));
        }
        let key = bincode::encode_to_vec(key, config::standard())
            .expect("encoding into a Vec without a limit cannot fail");
        self.records.writer.write_all(&key)?;
        self.records.write(record)
    }

    /// The number of records written so far
    pub fn written(&self) -> u64 {
        self.records.written()
    }

    /// Flushes the underlying writer and returns it
    pub fn finish(self) -> io::Result<W> {
        self.records.finish()
    }
}

/// Reads a stream written by [`KeyedRecordWriter`]. Yields `(key, record)`
/// pairs and stops after the first error.
pub struct KeyedRecordReader<R> {
    records: RecordReader<R>,
}

impl<R> KeyedRecordReader<R>
where
    R: BufRead,
{
    pub fn new(reader: R) -> Self {
        Self {
            records: RecordReader::new(reader),
        }
    }

    fn read_keyed(&mut self) -> Result<Option<(String, QuakeRecord)>, DecodeError> {
        let reader = &mut self.records.reader;
        if reader.fill_buf()?.is_empty() {
            return Ok(None);
        }

        let key: String = bincode::decode_from_std_read(
            reader,
            config::standard().with_limit::<MAX_KEY_BYTES>(),
        )?;
        match self.records.read_record()? {
            Some(record) => Ok(Some((key, record))),
            // a key must always be followed by a record
            None => Err(DecodeError::Truncated { additional: 1 }),
        }
    }
}

impl<R> Iterator for KeyedRecordReader<R>
where
    R: BufRead,
{
    type Item = Result<(String, QuakeRecord), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.records.failed {
            return None;
        }
        match self.read_keyed() {
            Ok(r) => r.map(Ok),
            Err(e) => {
                self.records.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use geo::{LineString, Polygon};

    use crate::{codec::DecodeError, event::PointEvent, geometry::Geometry};

    use super::{
        KeyedRecordReader, KeyedRecordWriter, QuakeRecord, RecordReader, RecordWriter,
        MAX_KEY_BYTES,
    };

    fn records() -> Vec<QuakeRecord> {
        vec![
            QuakeRecord::new(Geometry::point(-117.25, 34.5), 4.2),
            QuakeRecord::new(Geometry::point(142.37, 38.3), 9.1),
            QuakeRecord::new(
                Geometry::Polygon(Polygon::new(
                    LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]),
                    vec![],
                )),
                0.0,
            ),
        ]
    }

    #[test]
    fn round_trip() {
        for r in records() {
            let bytes = r.encode();
            assert_eq!(QuakeRecord::decode(&bytes).unwrap(), r);
        }
    }

    #[test]
    fn magnitude_is_fixed_width_suffix() {
        let r = QuakeRecord::new(Geometry::point(1.0, 2.0), 6.5);
        let bytes = r.encode();
        let geometry_len = Geometry::point(1.0, 2.0).encode().len();
        assert_eq!(bytes.len(), geometry_len + 8);
        assert_eq!(&bytes[geometry_len..], &6.5f64.to_le_bytes());
    }

    #[test]
    fn truncated_magnitude() {
        let bytes = QuakeRecord::new(Geometry::point(1.0, 2.0), 6.5).encode();
        assert!(matches!(
            QuakeRecord::decode(&bytes[..bytes.len() - 3]),
            Err(DecodeError::Truncated { additional: 3 })
        ));
    }

    #[test]
    fn trailing_bytes() {
        let mut bytes = QuakeRecord::new(Geometry::point(1.0, 2.0), 6.5).encode();
        bytes.push(0);
        assert!(matches!(
            QuakeRecord::decode(&bytes),
            Err(DecodeError::TrailingBytes(1))
        ));
    }

    #[test]
    fn point_event_conversion() {
        let e = PointEvent::new(10.0, 20.0, 3.5);
        let r = QuakeRecord::from(e);
        assert_eq!(PointEvent::try_from(r).unwrap(), e);

        let polygon = records().pop().unwrap();
        assert!(matches!(
            PointEvent::try_from(polygon),
            Err(DecodeError::NotAPoint)
        ));
    }

    #[test]
    fn stream() {
        let mut writer = RecordWriter::new(Vec::new());
        for r in records() {
            writer.write(&r).unwrap();
        }
        assert_eq!(writer.written(), 3);
        let buf = writer.finish().unwrap();

        let read = RecordReader::new(Cursor::new(buf))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(read, records());
    }

    #[test]
    fn empty_stream() {
        let mut reader = RecordReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(reader.next().is_none());
    }

    #[test]
    fn stream_truncated_mid_record() {
        let mut writer = RecordWriter::new(Vec::new());
        for r in records() {
            writer.write(&r).unwrap();
        }
        let mut buf = writer.finish().unwrap();
        buf.truncate(buf.len() - 4);

        let results = RecordReader::new(Cursor::new(buf)).collect::<Vec<_>>();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(matches!(
            results[2],
            Err(DecodeError::Truncated { additional: 4 })
        ));
    }

    fn keyed_stream(keys: &[&str]) -> Vec<u8> {
        let mut writer = KeyedRecordWriter::new(Vec::new());
        for (key, r) in keys.iter().zip(records()) {
            writer.write(key, &r).unwrap();
        }
        assert_eq!(writer.written(), keys.len() as u64);
        writer.finish().unwrap()
    }

    #[test]
    fn keyed_stream_round_trip() {
        let keys = ["1898-06-29", "", "1899-09-04 Ümlaut"];
        let buf = keyed_stream(&keys);

        let read = KeyedRecordReader::new(Cursor::new(buf))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(
            read,
            keys.iter()
                .map(|k| k.to_string())
                .zip(records())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn keyed_stream_layout() {
        let buf = keyed_stream(&["abc"]);
        assert_eq!(&buf[..4], &[3, b'a', b'b', b'c']);
        assert_eq!(
            QuakeRecord::decode(&buf[4..]).unwrap(),
            records().remove(0)
        );
    }

    #[test]
    fn keyed_stream_ends_after_key() {
        let mut buf = keyed_stream(&["a", "b"]);
        let first_len = 2 + records()[0].encode().len();
        buf.truncate(first_len + 2);

        let results = KeyedRecordReader::new(Cursor::new(buf)).collect::<Vec<_>>();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn key_too_long() {
        let mut writer = KeyedRecordWriter::new(Vec::new());
        let key = "x".repeat(MAX_KEY_BYTES + 1);
        let err = writer.write(&key, &records()[0]).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        assert_eq!(writer.written(), 0);
        assert!(writer.finish().unwrap().is_empty());
    }
}
