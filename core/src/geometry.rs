use std::fmt::{Display, Formatter};

use geo::{
    coord,
    coordinate_position::{CoordPos, CoordinatePosition},
    BoundingRect, LineString, Point, Polygon, Rect,
};
use itertools::Itertools;

/// An immutable two-dimensional geometry. Coordinates are longitude (`x`) and
/// latitude (`y`) in a geographic reference system but are treated as planar
/// Cartesian coordinates by all operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point),
    Polygon(Polygon),
}

impl Geometry {
    /// Creates a point geometry
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point(Point::new(x, y))
    }

    /// Returns the point if this geometry is one
    pub fn as_point(&self) -> Option<Point> {
        match self {
            Geometry::Point(p) => Some(*p),
            Geometry::Polygon(_) => None,
        }
    }

    /// Calculates the axis-aligned bounding box. Returns [`None`] for an empty
    /// polygon.
    pub fn bounding_rect(&self) -> Option<Rect> {
        match self {
            Geometry::Point(p) => Some(Rect::new(p.0, p.0)),
            Geometry::Polygon(p) => p.bounding_rect(),
        }
    }
}

impl From<Point> for Geometry {
    fn from(value: Point) -> Self {
        Geometry::Point(value)
    }
}

impl From<Polygon> for Geometry {
    fn from(value: Polygon) -> Self {
        Geometry::Polygon(value)
    }
}

/// Checks if `polygon` contains `point`. The test is planar and inclusive:
/// a point exactly on the exterior ring or on the ring of a hole is contained,
/// a point strictly inside a hole is not.
///
/// ```rust
/// use geo::{polygon, Point};
/// use pipagg_core::geometry::contains;
///
/// let square = polygon![
///     (x: 0.0, y: 0.0),
///     (x: 10.0, y: 0.0),
///     (x: 10.0, y: 10.0),
///     (x: 0.0, y: 10.0),
/// ];
/// assert!(contains(&square, &Point::new(5.0, 5.0)));
/// assert!(contains(&square, &Point::new(10.0, 5.0)));
/// assert!(!contains(&square, &Point::new(10.1, 5.0)));
/// ```
pub fn contains(polygon: &Polygon, point: &Point) -> bool {
    polygon.coordinate_position(&point.0) != CoordPos::Outside
}

/// Creates a rectangular polygon spanning the given corners
pub fn rect_polygon(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Polygon {
    Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y }).to_polygon()
}

fn fmt_ring(ring: &LineString) -> String {
    ring.coords().map(|c| format!("{} {}", c.x, c.y)).join(", ")
}

/// Renders the geometry as WKT
impl Display for Geometry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Geometry::Point(p) => write!(f, "POINT ({} {})", p.x(), p.y()),
            Geometry::Polygon(p) => {
                if p.exterior().0.is_empty() {
                    return write!(f, "POLYGON EMPTY");
                }
                let rings = std::iter::once(p.exterior())
                    .chain(p.interiors())
                    .map(|r| format!("({})", fmt_ring(r)))
                    .join(", ");
                write!(f, "POLYGON ({})", rings)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use geo::{coord, polygon, LineString, Point, Polygon, Rect};

    use super::{contains, rect_polygon, Geometry};

    #[test]
    fn rect_polygon_covers_its_corners() {
        let p = rect_polygon(0.0, 0.0, 1.0, 2.0);
        assert!(contains(&p, &Point::new(0.0, 0.0)));
        assert!(contains(&p, &Point::new(1.0, 2.0)));
        assert!(contains(&p, &Point::new(0.5, 1.0)));
        assert!(!contains(&p, &Point::new(1.5, 1.0)));
    }

    fn donut() -> Polygon {
        Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]),
            vec![LineString::from(vec![
                (4.0, 4.0),
                (6.0, 4.0),
                (6.0, 6.0),
                (4.0, 6.0),
            ])],
        )
    }

    #[test]
    fn contains_interior_and_boundary() {
        let p = donut();
        assert!(contains(&p, &Point::new(1.0, 1.0)));
        assert!(contains(&p, &Point::new(0.0, 0.0)));
        assert!(contains(&p, &Point::new(0.0, 5.0)));
        assert!(!contains(&p, &Point::new(-0.5, 5.0)));
    }

    #[test]
    fn holes_are_excluded_but_their_boundary_is_not() {
        let p = donut();
        assert!(!contains(&p, &Point::new(5.0, 5.0)));
        assert!(contains(&p, &Point::new(4.0, 5.0)));
    }

    #[test]
    fn empty_polygon_contains_nothing() {
        let p = Polygon::new(LineString::new(vec![]), vec![]);
        assert!(!contains(&p, &Point::new(0.0, 0.0)));
        assert_eq!(Geometry::from(p).bounding_rect(), None);
    }

    #[test]
    fn bounding_rect() {
        let g = Geometry::from(polygon![
            (x: -3.0, y: 1.0),
            (x: 7.0, y: 2.0),
            (x: 1.0, y: 9.0),
        ]);
        assert_eq!(
            g.bounding_rect(),
            Some(Rect::new(
                coord! { x: -3.0, y: 1.0 },
                coord! { x: 7.0, y: 9.0 }
            ))
        );

        let p = Geometry::point(2.0, 3.0);
        let bb = p.bounding_rect().unwrap();
        assert_eq!(bb.min(), bb.max());
    }

    #[test]
    fn wkt() {
        assert_eq!(Geometry::point(-117.5, 34.25).to_string(), "POINT (-117.5 34.25)");
        assert_eq!(
            Geometry::from(Polygon::new(LineString::new(vec![]), vec![])).to_string(),
            "POLYGON EMPTY"
        );
        assert_eq!(
            Geometry::from(donut()).to_string(),
            "POLYGON ((0 0, 10 0, 10 10, 0 10, 0 0), (4 4, 6 4, 6 6, 4 6, 4 4))"
        );
    }
}
