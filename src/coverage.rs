//! Coverage of changed lines by known projections.
//!
//! A [`ChangeSet`] records which lines changed; [`KnownProjections`] records
//! which lines are already claimed by a projection (or ignored). The
//! difference is reported per file in a [`CoverageReport`].

use crate::range::{self, LineRange};
use crate::resolve::ResolvedRange;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Drop `.` components so `./src/a.cpp` and `src/a.cpp` are the same key.
pub fn normalize_key(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

/// Changed lines per file, kept as a minimal sorted disjoint set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    files: BTreeMap<PathBuf, Vec<LineRange>>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a changed range, merging it with overlapping or adjacent ones.
    pub fn add(&mut self, path: impl AsRef<Path>, range: LineRange) {
        self.extend(path, std::iter::once(range));
    }

    pub fn extend<I>(&mut self, path: impl AsRef<Path>, ranges: I)
    where
        I: IntoIterator<Item = LineRange>,
    {
        let entry = self.files.entry(normalize_key(path.as_ref())).or_default();
        let merged = range::union(entry.drain(..).chain(ranges));
        *entry = merged;
    }

    /// Changed ranges for one file (empty if unchanged).
    pub fn ranges(&self, path: &Path) -> &[LineRange] {
        self.files
            .get(&normalize_key(path))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn files(&self) -> impl Iterator<Item = (&Path, &[LineRange])> {
        self.files
            .iter()
            .map(|(path, ranges)| (path.as_path(), ranges.as_slice()))
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn line_count(&self) -> usize {
        self.files
            .values()
            .map(|ranges| ranges.iter().map(LineRange::len).sum::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Lines claimed in one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Claim {
    WholeFile,
    Lines(Vec<LineRange>),
}

/// Lines already represented by projections or explicitly ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KnownProjections {
    files: BTreeMap<PathBuf, Claim>,
}

impl KnownProjections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, path: impl AsRef<Path>, range: LineRange) {
        let entry = self
            .files
            .entry(normalize_key(path.as_ref()))
            .or_insert_with(|| Claim::Lines(Vec::new()));
        if let Claim::Lines(ranges) = entry {
            let merged = range::union(ranges.drain(..).chain(std::iter::once(range)));
            *ranges = merged;
        }
    }

    /// Claim every line of a file.
    pub fn claim_file(&mut self, path: impl AsRef<Path>) {
        self.files
            .insert(normalize_key(path.as_ref()), Claim::WholeFile);
    }

    /// Claim the lines of a resolved projection, keyed by `path`.
    ///
    /// `path` is passed separately so callers can key by the repository-relative
    /// path rather than the path the file was read from.
    pub fn claim_resolved(&mut self, path: impl AsRef<Path>, resolved: &ResolvedRange) {
        self.claim(path, resolved.lines);
    }

    pub fn claimed(&self, path: &Path) -> Option<&Claim> {
        self.files.get(&normalize_key(path))
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// Changed lines not covered by any known projection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    /// Uncovered ranges per file; fully covered files are omitted.
    pub uncovered: BTreeMap<PathBuf, Vec<LineRange>>,
    pub files_changed: usize,
    pub lines_changed: usize,
    pub lines_uncovered: usize,
    pub regions_uncovered: usize,
}

impl CoverageReport {
    pub fn is_complete(&self) -> bool {
        self.uncovered.is_empty()
    }

    /// Percentage of changed lines that are covered; 100 when nothing changed.
    pub fn covered_percent(&self) -> f64 {
        if self.lines_changed == 0 {
            return 100.0;
        }
        let covered = self.lines_changed - self.lines_uncovered;
        covered as f64 * 100.0 / self.lines_changed as f64
    }
}

/// Subtract every file's claimed lines from its changed lines.
pub fn validate(changes: &ChangeSet, known: &KnownProjections) -> CoverageReport {
    let mut report = CoverageReport::default();

    for (path, changed) in changes.files() {
        report.files_changed += 1;
        report.lines_changed += changed.iter().map(LineRange::len).sum::<usize>();

        let uncovered = match known.claimed(path) {
            Some(Claim::WholeFile) => Vec::new(),
            Some(Claim::Lines(claimed)) => {
                range::subtract_all(changed.iter().copied(), claimed.iter().copied())
            }
            None => changed.to_vec(),
        };

        if uncovered.is_empty() {
            continue;
        }
        report.lines_uncovered += uncovered.iter().map(LineRange::len).sum::<usize>();
        report.regions_uncovered += uncovered.len();
        report.uncovered.insert(path.to_path_buf(), uncovered);
    }

    report
}
