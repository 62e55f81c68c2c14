use geo::{coord, BoundingRect, Point, Polygon, Rect};
use thiserror::Error;

pub use self::quadtree::{FeatureIndex, IndexStats, MAX_DEPTH_LIMIT};

pub mod quadtree;

/// The label of a feature that does not have one
pub const UNKNOWN_LABEL: &str = "???";

/// Errors that can occur while building an index
#[derive(Error, Debug, PartialEq)]
pub enum IndexError {
    #[error("the feature set is empty")]
    EmptyFeatureSet,

    #[error("invalid index options: {0}")]
    InvalidOptions(String),
}

/// Refers to a feature by its position in the feature list an index was
/// built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureHandle(pub usize);

impl FeatureHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A labeled polygon, e.g. a county
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    label: Option<String>,
    geometry: Polygon,
    bbox: Option<Rect>,
}

impl Feature {
    /// Creates a feature and calculates its bounding box
    pub fn new(label: Option<String>, geometry: Polygon) -> Self {
        let bbox = geometry.bounding_rect();
        Self {
            label,
            geometry,
            bbox,
        }
    }

    /// The feature's label if it has one
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The feature's label or [`UNKNOWN_LABEL`]
    pub fn display_label(&self) -> &str {
        self.label().unwrap_or(UNKNOWN_LABEL)
    }

    pub fn geometry(&self) -> &Polygon {
        &self.geometry
    }

    /// The feature's bounding box. [`None`] if the polygon is empty.
    pub fn bbox(&self) -> Option<Rect> {
        self.bbox
    }
}

/// Options for building a [`FeatureIndex`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexOptions {
    /// The coordinate domain covered by the root node. It will be extended to
    /// include the bounding box of every feature.
    pub extent: Rect,

    /// The maximum depth of the tree. The root has depth 0. Must not exceed
    /// [`MAX_DEPTH_LIMIT`]. Each additional level can double the number of
    /// nodes along the edges of overlapping features.
    pub max_depth: u8,

    /// A node holding at most this many features will not be subdivided
    pub leaf_capacity: usize,

    /// Fail with [`IndexError::EmptyFeatureSet`] if there are no features
    pub require_features: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            extent: Rect::new(
                coord! { x: -180.0, y: -90.0 },
                coord! { x: 180.0, y: 90.0 },
            ),
            max_depth: 8,
            leaf_capacity: 4,
            require_features: false,
        }
    }
}

/// An index that narrows down the features that might contain a point
pub trait SpatialIndex {
    /// All features in the order they were given when the index was built
    fn features(&self) -> &[Feature];

    /// Returns the handles of all features that might contain the given
    /// point. Must never miss a feature that actually contains it. Handles
    /// are returned in ascending order.
    fn query_candidates(&self, point: &Point) -> &[FeatureHandle];

    /// Looks up a feature by its handle
    fn feature(&self, handle: FeatureHandle) -> &Feature {
        &self.features()[handle.index()]
    }
}
