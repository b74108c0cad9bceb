//! Inclusive line ranges and the interval arithmetic shared by extraction
//! and coverage validation.
//!
//! Every operation here is total: there are no error cases, empty input
//! yields empty output, and reversed bounds are normalized on construction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive `[start, end]` range of 1-based line numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    /// Create a range, swapping the bounds if they are given in reverse.
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// A range covering a single line.
    pub fn line(line: usize) -> Self {
        Self {
            start: line,
            end: line,
        }
    }

    /// Number of lines in the range.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Always false; an inclusive range holds at least one line.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, line: usize) -> bool {
        self.start <= line && line <= self.end
    }

    pub fn contains_range(&self, other: &LineRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &LineRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Overlapping or directly adjacent (`10-20` and `21-30`).
    pub fn touches(&self, other: &LineRange) -> bool {
        self.start <= other.end.saturating_add(1) && other.start <= self.end.saturating_add(1)
    }

    pub fn intersection(&self, other: &LineRange) -> Option<LineRange> {
        if self.overlaps(other) {
            Some(LineRange {
                start: self.start.max(other.start),
                end: self.end.min(other.end),
            })
        } else {
            None
        }
    }

    /// Remove `other` from `self`, leaving zero, one or two disjoint pieces.
    pub fn subtract(&self, other: &LineRange) -> Vec<LineRange> {
        if !self.overlaps(other) {
            return vec![*self];
        }

        let mut pieces = Vec::with_capacity(2);
        if self.start < other.start {
            pieces.push(LineRange {
                start: self.start,
                end: other.start - 1,
            });
        }
        if other.end < self.end {
            pieces.push(LineRange {
                start: other.end + 1,
                end: self.end,
            });
        }
        pieces
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Merge ranges into the minimal sorted set of disjoint ranges.
///
/// Adjacent ranges are merged as well as overlapping ones, so the output
/// never contains two ranges that could be expressed as one.
pub fn union<I>(ranges: I) -> Vec<LineRange>
where
    I: IntoIterator<Item = LineRange>,
{
    let mut sorted: Vec<LineRange> = ranges.into_iter().collect();
    sorted.sort_unstable();

    let mut merged: Vec<LineRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if last.touches(&range) => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Lines of `ranges` not covered by any range in `cover`.
///
/// Output is the minimal sorted disjoint set.
pub fn subtract_all<I, J>(ranges: I, cover: J) -> Vec<LineRange>
where
    I: IntoIterator<Item = LineRange>,
    J: IntoIterator<Item = LineRange>,
{
    let cover = union(cover);
    let mut remaining = union(ranges);

    for claimed in &cover {
        remaining = remaining
            .iter()
            .flat_map(|range| range.subtract(claimed))
            .collect();
    }
    remaining
}

/// Total number of lines in a set of ranges, counting overlaps once.
pub fn line_count<I>(ranges: I) -> usize
where
    I: IntoIterator<Item = LineRange>,
{
    union(ranges).iter().map(LineRange::len).sum()
}
