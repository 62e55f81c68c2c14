//! A bounded-depth quadtree over the bounding boxes of a fixed list of
//! features.
//!
//! The tree is built once and never modified afterwards. Nodes live in an
//! arena and refer to their children by position. Every leaf stores the
//! handles of all features whose bounding box intersects the leaf's extent,
//! so a feature spanning multiple quadrants is registered in each of them.
//! Extents and bounding boxes are closed, which means a point on a split line
//! can be looked up in either adjacent quadrant.

use geo::{Coord, Point, Rect};
use log::{debug, warn};

use crate::util::rect::RectExt;

use super::{Feature, FeatureHandle, IndexError, IndexOptions, SpatialIndex};

/// The largest accepted [`IndexOptions::max_depth`]. More than `leaf_capacity`
/// overlapping bounding boxes make every node along their edges split until
/// the depth bound, so the node count grows with `2^max_depth`.
pub const MAX_DEPTH_LIMIT: u8 = 16;

type NodeId = usize;

#[derive(Debug)]
enum NodeKind {
    /// Children in the order south-west, south-east, north-west, north-east
    Branch([NodeId; 4]),
    Leaf(Vec<FeatureHandle>),
}

#[derive(Debug)]
struct Node {
    extent: Rect,
    kind: NodeKind,
}

/// Statistics about the shape of a [`FeatureIndex`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexStats {
    /// The total number of nodes
    pub nodes: usize,

    /// The number of leaf nodes
    pub leaves: usize,

    /// The number of feature handles stored in all leaves
    pub entries: usize,

    /// The depth of the deepest leaf
    pub depth: u8,

    /// The number of features that have a bounding box and could be indexed
    pub indexed_features: usize,
}

/// A read-only quadtree over a list of polygon features
#[derive(Debug)]
pub struct FeatureIndex {
    features: Vec<Feature>,
    nodes: Vec<Node>,
    stats: IndexStats,
}

fn validate(options: &IndexOptions) -> Result<(), IndexError> {
    let min = options.extent.min();
    let max = options.extent.max();
    if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
        return Err(IndexError::InvalidOptions(
            "extent must have finite coordinates".to_string(),
        ));
    }
    if options.extent.width() <= 0.0 || options.extent.height() <= 0.0 {
        return Err(IndexError::InvalidOptions(
            "extent must not be degenerate".to_string(),
        ));
    }
    if options.leaf_capacity == 0 {
        return Err(IndexError::InvalidOptions(
            "leaf capacity must be at least 1".to_string(),
        ));
    }
    if options.max_depth > MAX_DEPTH_LIMIT {
        return Err(IndexError::InvalidOptions(format!(
            "maximum depth must not exceed {MAX_DEPTH_LIMIT}"
        )));
    }
    Ok(())
}

fn is_finite_rect(r: &Rect) -> bool {
    let (min, max) = (r.min(), r.max());
    min.x.is_finite() && min.y.is_finite() && max.x.is_finite() && max.y.is_finite()
}

/// A feature handle together with the feature's bounding box
type Entry = (FeatureHandle, Rect);

struct Builder {
    options: IndexOptions,
    nodes: Vec<Node>,
    stats: IndexStats,
}

impl Builder {
    /// Splitting does not help if every feature covers the whole node, it
    /// would just copy all handles into each quadrant
    fn should_split(&self, extent: &Rect, depth: u8, entries: &[Entry]) -> bool {
        depth < self.options.max_depth
            && entries.len() > self.options.leaf_capacity
            && !entries.iter().all(|(_, bbox)| bbox.covers_rect(extent))
    }

    fn build_node(&mut self, extent: Rect, depth: u8, entries: Vec<Entry>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            extent,
            kind: NodeKind::Leaf(Vec::new()),
        });

        if self.should_split(&extent, depth, &entries) {
            let mut children = [0; 4];
            for (child, quadrant) in children.iter_mut().zip(extent.quadrants()) {
                let sub = entries
                    .iter()
                    .filter(|(_, bbox)| bbox.intersects_closed(&quadrant))
                    .copied()
                    .collect();
                *child = self.build_node(quadrant, depth + 1, sub);
            }
            self.nodes[id].kind = NodeKind::Branch(children);
        } else {
            self.stats.leaves += 1;
            self.stats.entries += entries.len();
            self.stats.depth = self.stats.depth.max(depth);
            self.nodes[id].kind = NodeKind::Leaf(entries.into_iter().map(|(h, _)| h).collect());
        }

        id
    }
}

impl FeatureIndex {
    /// Builds an index over the given features. The features' order is
    /// preserved and determines the order of query results.
    pub fn build(features: Vec<Feature>, options: IndexOptions) -> Result<Self, IndexError> {
        validate(&options)?;
        if features.is_empty() && options.require_features {
            return Err(IndexError::EmptyFeatureSet);
        }

        let mut root_extent = options.extent;
        let mut entries = Vec::with_capacity(features.len());
        for (i, f) in features.iter().enumerate() {
            match f.bbox().filter(is_finite_rect) {
                Some(bbox) => {
                    root_extent.extend_rect(&bbox);
                    entries.push((FeatureHandle(i), bbox));
                }
                None => warn!(
                    "Feature {} (`{}') has an empty or non-finite geometry and will never match",
                    i,
                    f.display_label()
                ),
            }
        }

        let mut builder = Builder {
            options,
            nodes: Vec::new(),
            stats: IndexStats {
                indexed_features: entries.len(),
                ..Default::default()
            },
        };
        builder.build_node(root_extent, 0, entries);

        let mut stats = builder.stats;
        stats.nodes = builder.nodes.len();
        debug!(
            "Built feature index over {} features: {} nodes, {} leaves, {} entries, depth {}",
            features.len(),
            stats.nodes,
            stats.leaves,
            stats.entries,
            stats.depth
        );

        Ok(Self {
            features,
            nodes: builder.nodes,
            stats,
        })
    }

    /// The extent of the root node
    pub fn root_extent(&self) -> Rect {
        self.nodes[0].extent
    }

    pub fn stats(&self) -> IndexStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    fn find_leaf(&self, c: Coord) -> &[FeatureHandle] {
        let mut id = 0;
        loop {
            let node = &self.nodes[id];
            match &node.kind {
                NodeKind::Leaf(handles) => return handles,
                NodeKind::Branch(children) => {
                    // points on a split line go east/north, see module docs
                    let center = node.extent.center();
                    let east = c.x >= center.x;
                    let north = c.y >= center.y;
                    id = children[usize::from(north) * 2 + usize::from(east)];
                }
            }
        }
    }
}

impl SpatialIndex for FeatureIndex {
    fn features(&self) -> &[Feature] {
        &self.features
    }

    fn query_candidates(&self, point: &Point) -> &[FeatureHandle] {
        let c = point.0;
        if !c.x.is_finite() || !c.y.is_finite() {
            warn!("Rejecting point query with non-finite coordinates");
            return &[];
        }
        if !self.root_extent().covers_coord(c) {
            return &[];
        }
        self.find_leaf(c)
    }
}
