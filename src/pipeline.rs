//! Manifest-wide resolution.
//!
//! Projections are grouped by file so each file is read and parsed once.
//! Groups run on rayon workers with thread-local parsers; results come back
//! in manifest order regardless of completion order.

use crate::config::Manifest;
use crate::coverage::KnownProjections;
use crate::query::Query;
use crate::range::LineRange;
use crate::resolve::{resolve, ResolveError, ResolvedRange};
use crate::ts::{Grammar, SourceFile};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Result of one `[[projections]]` entry.
#[derive(Debug)]
pub struct Outcome {
    pub id: String,
    /// Path as written in the manifest, relative to the root.
    pub file: PathBuf,
    pub result: Result<ResolvedRange, ResolveError>,
}

/// Result of one `[[ignore]]` entry. `Ok(None)` claims the whole file.
#[derive(Debug)]
pub struct IgnoreOutcome {
    pub file: PathBuf,
    pub result: Result<Option<LineRange>, ResolveError>,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<Outcome>,
    pub ignores: Vec<IgnoreOutcome>,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|outcome| outcome.result.is_err())
    }

    pub fn ignore_failures(&self) -> impl Iterator<Item = &IgnoreOutcome> {
        self.ignores.iter().filter(|ignore| ignore.result.is_err())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none() && self.ignore_failures().next().is_none()
    }

    /// Lines claimed by resolved projections and ignore entries, keyed by
    /// manifest-relative path.
    pub fn known_projections(&self) -> KnownProjections {
        let mut known = KnownProjections::new();
        for outcome in &self.outcomes {
            if let Ok(resolved) = &outcome.result {
                known.claim_resolved(&outcome.file, resolved);
            }
        }
        for ignore in &self.ignores {
            match &ignore.result {
                Ok(None) => known.claim_file(&ignore.file),
                Ok(Some(lines)) => known.claim(&ignore.file, *lines),
                Err(_) => {}
            }
        }
        known
    }
}

struct Request {
    index: usize,
    file: PathBuf,
    grammar: Option<Grammar>,
    query: Query,
}

/// Resolve every projection and ignore entry of `manifest` against `root`.
pub fn run(manifest: &Manifest, root: &Path) -> RunReport {
    let requests = manifest
        .projections
        .iter()
        .enumerate()
        .filter_map(|(index, projection)| {
            Some(Request {
                index,
                file: PathBuf::from(&projection.file),
                grammar: projection.grammar,
                query: projection.to_query()?,
            })
        })
        .collect();
    let mut resolved = resolve_grouped(root, requests);

    let outcomes = manifest
        .projections
        .iter()
        .enumerate()
        .map(|(index, projection)| Outcome {
            id: projection.id.clone(),
            file: PathBuf::from(&projection.file),
            result: resolved
                .remove(&index)
                .unwrap_or_else(|| Err(missing_query(projection.id.as_str()))),
        })
        .collect();

    let ignore_requests = manifest
        .ignore
        .iter()
        .enumerate()
        .filter_map(|(index, ignore)| {
            Some(Request {
                index,
                file: PathBuf::from(&ignore.file),
                grammar: ignore.grammar,
                query: ignore.to_query()?,
            })
        })
        .collect();
    let mut ignored = resolve_grouped(root, ignore_requests);

    let ignores = manifest
        .ignore
        .iter()
        .enumerate()
        .map(|(index, ignore)| IgnoreOutcome {
            file: PathBuf::from(&ignore.file),
            result: match ignored.remove(&index) {
                Some(result) => result.map(|range| Some(range.lines)),
                None => Ok(None),
            },
        })
        .collect();

    RunReport { outcomes, ignores }
}

fn missing_query(id: &str) -> ResolveError {
    ResolveError::NotFound {
        target: format!("query for projection '{id}'"),
        suggestions: Vec::new(),
    }
}

/// Read and parse each distinct file once, resolving all of its requests.
fn resolve_grouped(
    root: &Path,
    requests: Vec<Request>,
) -> HashMap<usize, Result<ResolvedRange, ResolveError>> {
    let mut groups: HashMap<(PathBuf, Option<Grammar>), Vec<Request>> = HashMap::new();
    for request in requests {
        groups
            .entry((request.file.clone(), request.grammar))
            .or_default()
            .push(request);
    }
    debug!(files = groups.len(), "resolving projections");

    let groups: Vec<_> = groups.into_iter().collect();
    groups
        .into_par_iter()
        .map(|((file, grammar), requests)| {
            let path = root.join(&file);
            match SourceFile::read(&path, grammar) {
                Ok(source) => requests
                    .into_iter()
                    .map(|request| (request.index, resolve(&source, &request.query)))
                    .collect::<Vec<_>>(),
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "failed to load source");
                    requests
                        .into_iter()
                        .map(|request| (request.index, Err(ResolveError::Parse(err.clone()))))
                        .collect()
                }
            }
        })
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_from_str;
    use crate::coverage::{validate, ChangeSet};
    use std::fs;

    #[test]
    fn resolves_in_manifest_order_and_builds_claims() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(
            dir.path().join("src/a.cpp"),
            "int one() { return 1; }\n\nint two() {\n  return 2;\n}\n",
        )
        .unwrap();
        fs::write(dir.path().join("src/b.c"), "//@@start body\nint x;\n//@@end body\n").unwrap();

        let manifest = load_from_str(
            r#"
[[projections]]
id = "two"
file = "src/a.cpp"
query = { type = "function", name = "two" }

[[projections]]
id = "body"
file = "src/b.c"
marker = "body"

[[projections]]
id = "one"
file = "src/a.cpp"
query = { type = "function", name = "one" }

[[projections]]
id = "missing"
file = "src/nope.cpp"
query = { type = "function", name = "one" }

[[ignore]]
file = "CMakeLists.txt"
"#,
        )
        .unwrap();

        let report = run(&manifest, dir.path());
        let ids: Vec<_> = report.outcomes.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["two", "body", "one", "missing"]);
        assert_eq!(
            report.outcomes[0].result.as_ref().unwrap().lines,
            LineRange::new(3, 5)
        );
        assert_eq!(
            report.outcomes[1].result.as_ref().unwrap().lines,
            LineRange::line(2)
        );
        assert!(matches!(
            report.outcomes[3].result,
            Err(ResolveError::Parse(_))
        ));
        assert_eq!(report.failures().count(), 1);
        assert!(!report.is_success());

        let mut changes = ChangeSet::new();
        changes.add("src/a.cpp", LineRange::new(1, 5));
        changes.add("CMakeLists.txt", LineRange::new(3, 4));
        let coverage = validate(&changes, &report.known_projections());
        assert_eq!(
            coverage.uncovered.get(Path::new("src/a.cpp")),
            Some(&vec![LineRange::line(2)])
        );
        assert_eq!(coverage.uncovered.len(), 1);
    }
}
