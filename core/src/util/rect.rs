use geo::{coord, Coord, Rect};

/// Helpers for axis-aligned rectangles. All predicates treat rectangles as
/// closed sets, i.e. a rectangle contains its own edges.
///
/// # Examples
///
/// ```rust
/// use geo::{coord, Rect};
/// use pipagg_core::util::rect::RectExt;
///
/// let mut bb1 = Rect::new(
///     coord! { x: 1.0, y: 2.0 },
///     coord! { x: 4.0, y: 5.0 }
/// );
/// let bb2 = Rect::new(
///     coord! { x: 40.0, y: 50.0 },
///     coord! { x: 70.0, y: 80.0 }
/// );
/// assert!(!bb1.intersects_closed(&bb2));
///
/// bb1.extend_rect(&bb2);
/// assert_eq!(bb1.min(), coord! { x: 1.0, y: 2.0 });
/// assert_eq!(bb1.max(), coord! { x: 70.0, y: 80.0 });
/// assert!(bb1.covers_rect(&bb2));
/// assert!(bb1.covers_coord(coord! { x: 70.0, y: 2.0 }));
/// ```
///
/// ```rust
/// use geo::{coord, Rect};
/// use pipagg_core::util::rect::RectExt;
///
/// let r = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 });
/// let [sw, se, nw, ne] = r.quadrants();
/// assert_eq!(sw.max(), coord! { x: 5.0, y: 5.0 });
/// assert_eq!(se.min(), coord! { x: 5.0, y: 0.0 });
/// assert_eq!(nw.min(), coord! { x: 0.0, y: 5.0 });
/// assert_eq!(ne.max(), coord! { x: 10.0, y: 10.0 });
/// ```
pub trait RectExt {
    /// Extends the rectangle so it overlaps the given other rectangle
    fn extend_rect(&mut self, other: &Rect);

    /// Checks if the given coordinate lies inside or on the edge of the
    /// rectangle
    fn covers_coord(&self, c: Coord) -> bool;

    /// Checks if the other rectangle lies completely inside this one
    fn covers_rect(&self, other: &Rect) -> bool;

    /// Checks if the two rectangles share at least one point (touching edges
    /// count)
    fn intersects_closed(&self, other: &Rect) -> bool;

    /// Splits the rectangle at its center into four quadrants in the order
    /// south-west, south-east, north-west, north-east
    fn quadrants(&self) -> [Rect; 4];
}

impl RectExt for Rect {
    fn extend_rect(&mut self, other: &Rect) {
        let min = self.min();
        let other_min = other.min();
        self.set_min((min.x.min(other_min.x), min.y.min(other_min.y)));
        let max = self.max();
        let other_max = other.max();
        self.set_max((max.x.max(other_max.x), max.y.max(other_max.y)));
    }

    fn covers_coord(&self, c: Coord) -> bool {
        let min = self.min();
        let max = self.max();
        c.x >= min.x && c.x <= max.x && c.y >= min.y && c.y <= max.y
    }

    fn covers_rect(&self, other: &Rect) -> bool {
        self.covers_coord(other.min()) && self.covers_coord(other.max())
    }

    fn intersects_closed(&self, other: &Rect) -> bool {
        let min = self.min();
        let max = self.max();
        let other_min = other.min();
        let other_max = other.max();
        min.x <= other_max.x && other_min.x <= max.x && min.y <= other_max.y && other_min.y <= max.y
    }

    fn quadrants(&self) -> [Rect; 4] {
        let min = self.min();
        let max = self.max();
        let c = self.center();
        [
            Rect::new(min, c),
            Rect::new(coord! { x: c.x, y: min.y }, coord! { x: max.x, y: c.y }),
            Rect::new(coord! { x: min.x, y: c.y }, coord! { x: c.x, y: max.y }),
            Rect::new(c, max),
        ]
    }
}
