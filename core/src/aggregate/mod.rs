//! Two-phase associative aggregation of point events per feature.
//!
//! * **Map**: [`PointMapper`] resolves each event to a feature label and emits
//!   a [`Contribution`] with a count of 1.
//! * **Combine**: an [`Accumulator`] owned by one worker sums contributions
//!   with the same label before they leave the worker. It is finished into an
//!   immutable [`Partial`].
//! * **Reduce**: [`reduce()`] sums all partials key by key into the final
//!   [`Counts`].
//!
//! Summing counts is associative and commutative, so the way events are
//! partitioned across workers and whether or not the combine step runs never
//! changes the result.

use std::collections::hash_map;

use rustc_hash::FxHashMap;

use crate::{
    event::PointEvent,
    index::SpatialIndex,
    resolve::{resolve_label, Resolution},
};

pub mod pipeline;

/// The key under which events that are not in any feature are counted
pub const OUTSIDE_LABEL: &str = "*Outside Feature Set";

/// The output of the map stage for a single event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contribution<'a> {
    pub label: &'a str,
    pub count: u64,
}

/// Maps point events to contributions
pub struct PointMapper<'a, I: ?Sized> {
    index: &'a I,
}

impl<'a, I> PointMapper<'a, I>
where
    I: SpatialIndex + ?Sized,
{
    pub fn new(index: &'a I) -> Self {
        Self { index }
    }

    /// Resolves the event's label and emits a count of 1 for it
    pub fn map(&self, event: &PointEvent) -> Contribution<'a> {
        let label = match resolve_label(self.index, &event.point()) {
            Resolution::Matched(label) => label,
            Resolution::NoMatch => OUTSIDE_LABEL,
        };
        Contribution { label, count: 1 }
    }
}

/// A mapping from label to count
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counts {
    counts: FxHashMap<String, u64>,
}

impl Counts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `count` to the given label
    pub fn add(&mut self, label: &str, count: u64) {
        match self.counts.get_mut(label) {
            Some(c) => *c += count,
            None => {
                self.counts.insert(label.to_string(), count);
            }
        }
    }

    /// Adds all counts of `other` to this mapping
    pub fn merge(&mut self, other: Counts) {
        self.extend(other);
    }

    /// Returns the count for the given label (0 if there is none)
    pub fn get(&self, label: &str) -> u64 {
        self.counts.get(label).copied().unwrap_or(0)
    }

    /// The number of distinct labels
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// The sum of all counts
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Converts the mapping to a list sorted by label
    pub fn into_sorted_vec(self) -> Vec<(String, u64)> {
        let mut v = self.counts.into_iter().collect::<Vec<_>>();
        v.sort_unstable();
        v
    }
}

impl Extend<(String, u64)> for Counts {
    fn extend<T: IntoIterator<Item = (String, u64)>>(&mut self, iter: T) {
        for (label, count) in iter {
            *self.counts.entry(label).or_default() += count;
        }
    }
}

impl FromIterator<(String, u64)> for Counts {
    fn from_iter<T: IntoIterator<Item = (String, u64)>>(iter: T) -> Self {
        let mut c = Counts::new();
        c.extend(iter);
        c
    }
}

impl IntoIterator for Counts {
    type Item = (String, u64);
    type IntoIter = hash_map::IntoIter<String, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.counts.into_iter()
    }
}

/// Whether an [`Accumulator`] sums contributions locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CombineMode {
    /// Sum contributions with the same label before handing them off
    #[default]
    Combine,

    /// Forward every contribution as it is
    PassThrough,
}

/// The state of an [`Accumulator`]. A finished accumulator becomes a
/// [`Partial`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    Empty,
    Accumulating,
}

/// Collects the contributions of one worker
#[derive(Debug)]
pub struct Accumulator {
    mode: CombineMode,
    combined: Counts,
    raw: Vec<(String, u64)>,
    contributions: u64,
}

impl Accumulator {
    pub fn new(mode: CombineMode) -> Self {
        Self {
            mode,
            combined: Counts::new(),
            raw: Vec::new(),
            contributions: 0,
        }
    }

    pub fn add(&mut self, contribution: Contribution<'_>) {
        match self.mode {
            CombineMode::Combine => self.combined.add(contribution.label, contribution.count),
            CombineMode::PassThrough => self
                .raw
                .push((contribution.label.to_string(), contribution.count)),
        }
        self.contributions += 1;
    }

    pub fn state(&self) -> AccumulatorState {
        if self.contributions == 0 {
            AccumulatorState::Empty
        } else {
            AccumulatorState::Accumulating
        }
    }

    /// The number of contributions added so far
    pub fn contributions(&self) -> u64 {
        self.contributions
    }

    /// Finalizes the accumulator
    pub fn finish(self) -> Partial {
        let entries = match self.mode {
            CombineMode::Combine => self.combined.into_iter().collect(),
            CombineMode::PassThrough => self.raw,
        };
        Partial { entries }
    }
}

/// The finalized, immutable output of one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partial {
    entries: Vec<(String, u64)>,
}

impl Partial {
    /// The (label, count) pairs of this partial. Labels are unique if the
    /// accumulator combined its contributions.
    pub fn entries(&self) -> &[(String, u64)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The sum of all counts
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, c)| c).sum()
    }
}

/// Maps and combines all events of one partition
pub fn map_partition<'e, I, E>(index: &I, events: E, mode: CombineMode) -> Partial
where
    I: SpatialIndex + ?Sized,
    E: IntoIterator<Item = &'e PointEvent>,
{
    let mapper = PointMapper::new(index);
    let mut acc = Accumulator::new(mode);
    for e in events {
        acc.add(mapper.map(e));
    }
    acc.finish()
}

/// Merges partials into the final counts
pub fn reduce<P>(partials: P) -> Counts
where
    P: IntoIterator<Item = Partial>,
{
    let mut counts = Counts::new();
    for p in partials {
        counts.extend(p.entries);
    }
    counts
}
