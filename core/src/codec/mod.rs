//! Binary encoding of geometries and quake records.
//!
//! A geometry is written as a variable-length integer holding the size of the
//! geometry body, followed by the body itself. The body is the
//! [bincode](https://docs.rs/bincode) standard encoding of a tagged enum
//! (tag `0` = point, tag `1` = polygon). This makes every geometry
//! self-delimiting, so records can simply be concatenated:
//!
//! ```text
//! geometry := varint(len) body[len]
//! record   := geometry magnitude:f64-le
//! ```
//!
//! The layout is the transport contract between pipeline stages and must not
//! change.

use bincode::{config, Decode, Encode};
use geo::{LineString, Point, Polygon};
use thiserror::Error;

use crate::geometry::Geometry;

pub mod record;

pub use self::record::{
    KeyedRecordReader, KeyedRecordWriter, QuakeRecord, RecordReader, RecordWriter, MAX_KEY_BYTES,
};

/// The maximum size of a single geometry body. Larger declared lengths are
/// rejected before any memory is allocated.
pub const MAX_GEOMETRY_BYTES: usize = 64 * 1024 * 1024;

/// Errors that can occur while decoding geometries and records
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unexpected end of input ({additional} more bytes required)")]
    Truncated { additional: usize },

    #[error("declared geometry length {declared} exceeds the maximum of {max} bytes")]
    TooLarge { declared: u64, max: usize },

    #[error("declared geometry length {declared} does not match the length of its content ({actual} bytes)")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("unsupported geometry tag {0}")]
    UnsupportedTag(u32),

    #[error("polygon has no exterior ring")]
    MissingExterior,

    #[error("ring {ring} of polygon is malformed: {reason}")]
    MalformedRing { ring: usize, reason: &'static str },

    #[error("found {0} trailing bytes after the end of the value")]
    TrailingBytes(usize),

    #[error("expected a point geometry")]
    NotAPoint,

    #[error("malformed binary data")]
    Malformed(#[source] bincode::error::DecodeError),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl From<bincode::error::DecodeError> for DecodeError {
    fn from(err: bincode::error::DecodeError) -> Self {
        use bincode::error::DecodeError as E;
        match err {
            E::UnexpectedEnd { additional } => DecodeError::Truncated { additional },
            E::UnexpectedVariant { found, .. } => DecodeError::UnsupportedTag(found),
            E::Io { inner, additional } => {
                if inner.kind() == std::io::ErrorKind::UnexpectedEof {
                    DecodeError::Truncated { additional }
                } else {
                    DecodeError::Io(inner)
                }
            }
            err => DecodeError::Malformed(err),
        }
    }
}

/// The geometry body as it appears on the wire
#[derive(Encode, Decode)]
enum WireGeometry {
    Point { x: f64, y: f64 },
    Polygon { rings: Vec<Vec<[f64; 2]>> },
}

impl From<&Geometry> for WireGeometry {
    fn from(value: &Geometry) -> Self {
        match value {
            Geometry::Point(p) => WireGeometry::Point { x: p.x(), y: p.y() },
            Geometry::Polygon(p) => WireGeometry::Polygon {
                rings: std::iter::once(p.exterior())
                    .chain(p.interiors())
                    .map(|r| r.coords().map(|c| [c.x, c.y]).collect())
                    .collect(),
            },
        }
    }
}

fn check_ring(ring: &[[f64; 2]], index: usize) -> Result<(), DecodeError> {
    if ring.len() < 4 {
        return Err(DecodeError::MalformedRing {
            ring: index,
            reason: "a ring needs at least 4 coordinates",
        });
    }
    if ring.first() != ring.last() {
        return Err(DecodeError::MalformedRing {
            ring: index,
            reason: "ring is not closed",
        });
    }
    Ok(())
}

impl TryFrom<WireGeometry> for Geometry {
    type Error = DecodeError;

    fn try_from(value: WireGeometry) -> Result<Self, Self::Error> {
        match value {
            WireGeometry::Point { x, y } => Ok(Geometry::Point(Point::new(x, y))),
            WireGeometry::Polygon { rings } => {
                let mut rings = rings.into_iter();
                let exterior = rings.next().ok_or(DecodeError::MissingExterior)?;
                let interiors = rings.collect::<Vec<_>>();

                // an empty polygon is represented by a single empty ring
                if !(exterior.is_empty() && interiors.is_empty()) {
                    check_ring(&exterior, 0)?;
                    for (i, r) in interiors.iter().enumerate() {
                        check_ring(r, i + 1)?;
                    }
                }

                let to_line_string = |r: Vec<[f64; 2]>| {
                    LineString::from(r.into_iter().map(|[x, y]| (x, y)).collect::<Vec<_>>())
                };
                Ok(Geometry::Polygon(Polygon::new(
                    to_line_string(exterior),
                    interiors.into_iter().map(to_line_string).collect(),
                )))
            }
        }
    }
}

/// Checks a length prefix read from the wire and converts it to `usize`
fn check_declared_len(declared: u64) -> Result<usize, DecodeError> {
    match usize::try_from(declared) {
        Ok(len) if len <= MAX_GEOMETRY_BYTES => Ok(len),
        _ => Err(DecodeError::TooLarge {
            declared,
            max: MAX_GEOMETRY_BYTES,
        }),
    }
}

/// Decodes a complete geometry body whose length was declared by the prefix
fn decode_body(body: &[u8]) -> Result<Geometry, DecodeError> {
    let config = config::standard().with_limit::<MAX_GEOMETRY_BYTES>();
    let (wire, used) = match bincode::decode_from_slice::<WireGeometry, _>(body, config) {
        Ok(r) => r,
        Err(bincode::error::DecodeError::UnexpectedEnd { additional }) => {
            // the body is shorter than its own content claims
            return Err(DecodeError::LengthMismatch {
                declared: body.len(),
                actual: body.len() + additional,
            });
        }
        Err(e) => return Err(e.into()),
    };
    if used != body.len() {
        return Err(DecodeError::LengthMismatch {
            declared: body.len(),
            actual: used,
        });
    }
    wire.try_into()
}

impl Geometry {
    /// Encodes the geometry into its canonical, length-prefixed binary form.
    ///
    /// Only valid geometries can be decoded again: every ring of a polygon
    /// must be closed and have at least 4 coordinates, or the polygon must
    /// consist of a single empty exterior. [`Polygon::new`] accepts more than
    /// that (e.g. an empty hole or a ring of two points, which it closes into
    /// three coordinates). Such polygons are still encoded as they are, but
    /// [`Geometry::decode`] rejects them with [`DecodeError::MalformedRing`].
    pub fn encode(&self) -> Vec<u8> {
        let body = bincode::encode_to_vec(WireGeometry::from(self), config::standard())
            .expect("encoding into a Vec without a limit cannot fail");

        // a `Vec<u8>` is written as varint(len) followed by its bytes
        bincode::encode_to_vec(body, config::standard())
            .expect("encoding into a Vec without a limit cannot fail")
    }

    /// Decodes a geometry from the beginning of `bytes` and returns it
    /// together with the number of bytes consumed
    pub fn decode_prefix(bytes: &[u8]) -> Result<(Geometry, usize), DecodeError> {
        let (declared, header_len) =
            bincode::decode_from_slice::<u64, _>(bytes, config::standard())?;
        let len = check_declared_len(declared)?;

        let available = bytes.len() - header_len;
        if len > available {
            return Err(DecodeError::Truncated {
                additional: len - available,
            });
        }

        let geometry = decode_body(&bytes[header_len..header_len + len])?;
        Ok((geometry, header_len + len))
    }

    /// Decodes a geometry that spans exactly the given bytes
    pub fn decode(bytes: &[u8]) -> Result<Geometry, DecodeError> {
        let (geometry, used) = Self::decode_prefix(bytes)?;
        if used != bytes.len() {
            return Err(DecodeError::TrailingBytes(bytes.len() - used));
        }
        Ok(geometry)
    }
}

#[cfg(test)]
mod tests {
    use bincode::config;
    use geo::{LineString, Polygon};

    use crate::geometry::{rect_polygon, Geometry};

    use super::{DecodeError, WireGeometry, MAX_GEOMETRY_BYTES};

    fn donut() -> Geometry {
        Geometry::Polygon(Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]),
            vec![LineString::from(vec![
                (4.0, 4.0),
                (6.0, 4.0),
                (6.0, 6.0),
                (4.0, 6.0),
            ])],
        ))
    }

    /// Frame a raw wire geometry like `Geometry::encode` does
    fn frame(wire: &WireGeometry) -> Vec<u8> {
        let body = bincode::encode_to_vec(wire, config::standard()).unwrap();
        bincode::encode_to_vec(body, config::standard()).unwrap()
    }

    #[test]
    fn round_trip() {
        let geometries = vec![
            Geometry::point(-117.25, 34.5),
            Geometry::point(0.0, -0.0),
            Geometry::Polygon(rect_polygon(-180.0, -90.0, 180.0, 90.0)),
            donut(),
            Geometry::Polygon(Polygon::new(LineString::new(vec![]), vec![])),
        ];
        for g in geometries {
            let bytes = g.encode();
            assert_eq!(Geometry::decode(&bytes).unwrap(), g);
        }
    }

    #[test]
    fn encoding_is_canonical() {
        assert_eq!(donut().encode(), donut().encode());
        assert_ne!(donut().encode(), Geometry::point(0.0, 0.0).encode());
    }

    #[test]
    fn point_layout() {
        let bytes = Geometry::point(1.0, 2.0).encode();
        // length prefix, tag, two doubles
        assert_eq!(bytes.len(), 1 + 1 + 16);
        assert_eq!(bytes[0], 17);
        assert_eq!(bytes[1], 0);
        assert_eq!(&bytes[2..10], &1.0f64.to_le_bytes());
    }

    #[test]
    fn prefix_reports_consumed_bytes() {
        let mut bytes = donut().encode();
        let len = bytes.len();
        bytes.extend_from_slice(&[1, 2, 3]);
        let (g, used) = Geometry::decode_prefix(&bytes).unwrap();
        assert_eq!(g, donut());
        assert_eq!(used, len);
        assert!(matches!(
            Geometry::decode(&bytes),
            Err(DecodeError::TrailingBytes(3))
        ));
    }

    #[test]
    fn empty_input() {
        assert!(matches!(
            Geometry::decode(&[]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn truncated() {
        let bytes = donut().encode();
        for cut in 1..bytes.len() {
            assert!(
                matches!(
                    Geometry::decode(&bytes[..cut]),
                    Err(DecodeError::Truncated { .. })
                ),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn declared_length_exceeds_input() {
        let mut bytes = Geometry::point(1.0, 2.0).encode();
        bytes[0] = 100;
        assert!(matches!(
            Geometry::decode(&bytes),
            Err(DecodeError::Truncated { additional: 83 })
        ));
    }

    #[test]
    fn declared_length_too_large() {
        let bytes = bincode::encode_to_vec(u64::MAX, config::standard()).unwrap();
        assert!(matches!(
            Geometry::decode(&bytes),
            Err(DecodeError::TooLarge { max: MAX_GEOMETRY_BYTES, .. })
        ));
    }

    #[test]
    fn body_shorter_than_content() {
        // a point body needs 17 bytes but we only declare 9
        let mut bytes = vec![9u8];
        bytes.extend_from_slice(&Geometry::point(1.0, 2.0).encode()[1..10]);
        assert!(matches!(
            Geometry::decode(&bytes),
            Err(DecodeError::LengthMismatch { declared: 9, .. })
        ));
    }

    #[test]
    fn unsupported_tag() {
        let mut bytes = Geometry::point(1.0, 2.0).encode();
        bytes[1] = 7;
        assert!(matches!(
            Geometry::decode(&bytes),
            Err(DecodeError::UnsupportedTag(7))
        ));
    }

    #[test]
    fn degenerate_polygons_do_not_round_trip() {
        let exterior = LineString::from(vec![(0.0, 0.0), (9.0, 0.0), (9.0, 9.0), (0.0, 0.0)]);

        let empty_hole = Geometry::Polygon(Polygon::new(
            exterior.clone(),
            vec![LineString::new(vec![])],
        ));
        assert!(matches!(
            Geometry::decode(&empty_hole.encode()),
            Err(DecodeError::MalformedRing { ring: 1, .. })
        ));

        let two_points = Polygon::new(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]), vec![]);
        assert_eq!(two_points.exterior().0.len(), 3);
        let two_points = Geometry::Polygon(two_points);
        assert!(matches!(
            Geometry::decode(&two_points.encode()),
            Err(DecodeError::MalformedRing { ring: 0, .. })
        ));

        let valid = Geometry::Polygon(Polygon::new(exterior, vec![]));
        assert_eq!(Geometry::decode(&valid.encode()).unwrap(), valid);
    }

    #[test]
    fn malformed_rings() {
        let open = frame(&WireGeometry::Polygon {
            rings: vec![vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]],
        });
        assert!(matches!(
            Geometry::decode(&open),
            Err(DecodeError::MalformedRing { ring: 0, .. })
        ));

        let short_hole = frame(&WireGeometry::Polygon {
            rings: vec![
                vec![[0.0, 0.0], [9.0, 0.0], [9.0, 9.0], [0.0, 0.0]],
                vec![[1.0, 1.0], [2.0, 1.0], [1.0, 1.0]],
            ],
        });
        assert!(matches!(
            Geometry::decode(&short_hole),
            Err(DecodeError::MalformedRing { ring: 1, .. })
        ));

        let no_rings = frame(&WireGeometry::Polygon { rings: vec![] });
        assert!(matches!(
            Geometry::decode(&no_rings),
            Err(DecodeError::MissingExterior)
        ));
    }
}
