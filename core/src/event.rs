use geo::Point;

/// A single observation to aggregate, e.g. an earthquake
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointEvent {
    /// The longitude
    pub x: f64,

    /// The latitude
    pub y: f64,

    /// The event's magnitude (0 if the source did not provide one)
    pub magnitude: f64,
}

impl PointEvent {
    pub fn new(x: f64, y: f64, magnitude: f64) -> Self {
        Self { x, y, magnitude }
    }

    /// The event's location
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}
