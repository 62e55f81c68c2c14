use geo::Point;

use crate::{
    geometry::contains,
    index::{FeatureHandle, SpatialIndex},
};

/// The outcome of resolving a point against a feature set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// The point lies in a feature with the given label. Features without a
    /// label are reported as [`UNKNOWN_LABEL`](crate::index::UNKNOWN_LABEL).
    Matched(&'a str),

    /// No feature contains the point
    NoMatch,
}

/// Finds the feature containing the given point. Candidates from the index
/// are tested in the order returned by the index (ascending feature order),
/// so if features overlap, the one listed first wins.
pub fn resolve<I>(index: &I, point: &Point) -> Option<FeatureHandle>
where
    I: SpatialIndex + ?Sized,
{
    index
        .query_candidates(point)
        .iter()
        .copied()
        .find(|h| contains(index.feature(*h).geometry(), point))
}

/// Like [`resolve()`] but returns the label of the matching feature
pub fn resolve_label<'a, I>(index: &'a I, point: &Point) -> Resolution<'a>
where
    I: SpatialIndex + ?Sized,
{
    match resolve(index, point) {
        Some(h) => Resolution::Matched(index.feature(h).display_label()),
        None => Resolution::NoMatch,
    }
}
