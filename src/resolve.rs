//! Query resolution for a single parsed file.
//!
//! Every successful resolution yields a [`ResolvedRange`]: the inclusive
//! lines, the exact text slice and an xxh3 fingerprint of that slice. The
//! same file content and query always produce the same output.

use crate::marker::{self, MarkerError};
use crate::query::{Query, QueryError, Target};
use crate::range::LineRange;
use crate::ts::locator::{self, Candidate};
use crate::ts::{Grammar, NodeKind, ParseError, SourceFile};
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{target} not found{}", suggestion_suffix(.suggestions))]
    NotFound {
        target: String,
        suggestions: Vec<String>,
    },

    #[error("{target} is ambiguous: {} candidates ({})", .candidates.len(), describe_all(.candidates))]
    Ambiguous {
        target: String,
        candidates: Vec<Candidate>,
    },

    #[error("{target} only matches code containing syntax errors (lines {lines})")]
    SyntaxError { target: String, lines: LineRange },

    #[error("lines {start}-{end} are outside {} ({line_count} lines)", .path.display())]
    LinesOutOfRange {
        path: PathBuf,
        start: usize,
        end: usize,
        line_count: usize,
    },

    #[error("marker '{tag}' at line {line} has no lines between its directives")]
    EmptyMarker { tag: String, line: usize },

    #[error(transparent)]
    Marker(#[from] MarkerError),

    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryError),
}

fn suggestion_suffix(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!("; did you mean: {}?", suggestions.join(", "))
    }
}

fn describe_all(candidates: &[Candidate]) -> String {
    candidates
        .iter()
        .map(Candidate::describe)
        .collect::<Vec<_>>()
        .join("; ")
}

/// How a unique result was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Confidence {
    /// Exactly one node matched the name.
    Exact,
    /// Several matched and a signature hint or marker picked one.
    Heuristic,
}

/// What a resolved range was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", rename_all = "kebab-case")]
pub enum Origin {
    Symbol {
        kind: NodeKind,
        qualified_name: String,
    },
    Marker {
        tag: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        within: Option<String>,
    },
    Lines,
}

/// A resolved query: where it is and exactly what it contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRange {
    pub path: PathBuf,
    pub lines: LineRange,
    #[serde(flatten)]
    pub origin: Origin,
    pub confidence: Confidence,
    pub text: String,
    #[serde(serialize_with = "hex_fingerprint")]
    pub fingerprint: u64,
}

fn hex_fingerprint<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{value:016x}"))
}

impl ResolvedRange {
    fn new(file: &SourceFile, lines: LineRange, origin: Origin, confidence: Confidence) -> Self {
        let text = file.slice_lines(lines).to_string();
        let fingerprint = xxh3_64(text.as_bytes());
        Self {
            path: file.path().to_path_buf(),
            lines,
            origin,
            confidence,
            text,
            fingerprint,
        }
    }
}

/// Resolve `query` against an already parsed file.
pub fn resolve(file: &SourceFile, query: &Query) -> Result<ResolvedRange, ResolveError> {
    query.validate()?;
    debug!(path = %file.path().display(), query = %query, "resolving");

    let resolved = match (&query.target, &query.marker) {
        (Target::Marker { tag }, _) => {
            let lines = find_marker(file, tag, None)?;
            let origin = Origin::Marker {
                tag: tag.clone(),
                within: None,
            };
            ResolvedRange::new(file, lines, origin, Confidence::Exact)
        }
        (Target::Lines { start, end }, None) => {
            let lines = explicit_lines(file, *start, *end)?;
            ResolvedRange::new(file, lines, Origin::Lines, Confidence::Exact)
        }
        (Target::Lines { start, end }, Some(tag)) => {
            let outer = explicit_lines(file, *start, *end)?;
            let lines = find_marker(file, tag, Some(outer))?;
            let origin = Origin::Marker {
                tag: tag.clone(),
                within: Some(format!("lines {outer}")),
            };
            ResolvedRange::new(file, lines, origin, Confidence::Exact)
        }
        (target, None) => {
            let name = symbol_name(query)?;
            let (found, confidence) = locator::locate(file.tree(), target, &name)?;
            let origin = Origin::Symbol {
                kind: found.kind,
                qualified_name: found.qualified_name,
            };
            ResolvedRange::new(file, found.lines, origin, confidence)
        }
        (target, Some(tag)) => marker_in_symbol(file, query, target, tag)?,
    };

    debug!(lines = %resolved.lines, confidence = ?resolved.confidence, "resolved");
    Ok(resolved)
}

/// Read, parse and resolve in one step. The grammar defaults to the file extension.
pub fn resolve_path(
    path: &Path,
    grammar: Option<Grammar>,
    query: &Query,
) -> Result<ResolvedRange, ResolveError> {
    let file = SourceFile::read(path, grammar)?;
    resolve(&file, query)
}

fn symbol_name(query: &Query) -> Result<crate::query::QualifiedName, ResolveError> {
    query
        .qualified_name()?
        .ok_or(ResolveError::InvalidQuery(QueryError::EmptyName))
}

fn explicit_lines(file: &SourceFile, start: usize, end: usize) -> Result<LineRange, ResolveError> {
    let line_count = file.line_count();
    if start > line_count {
        return Err(ResolveError::LinesOutOfRange {
            path: file.path().to_path_buf(),
            start,
            end,
            line_count,
        });
    }
    if end > line_count {
        warn!(
            path = %file.path().display(),
            end,
            line_count,
            "clamping line range to end of file"
        );
    }
    Ok(LineRange::new(start, end.min(line_count)))
}

/// The content lines of the single marker `tag` inside `within`.
fn find_marker(
    file: &SourceFile,
    tag: &str,
    within: Option<LineRange>,
) -> Result<LineRange, ResolveError> {
    let found: Vec<_> = marker::markers(file, within)?
        .into_iter()
        .filter(|marker| marker.tag == tag)
        .collect();

    let target = match within {
        Some(range) => format!("marker `{tag}` within lines {range}"),
        None => format!("marker `{tag}`"),
    };

    match found.as_slice() {
        [] => {
            let suggestions = marker::directives(file, within)
                .into_iter()
                .map(|directive| directive.tag)
                .filter(|other| strsim::levenshtein(other, tag) <= 2)
                .fold(Vec::new(), |mut acc, other| {
                    if !acc.contains(&other) {
                        acc.push(other);
                    }
                    acc
                });
            Err(ResolveError::NotFound {
                target,
                suggestions: suggestions.into_iter().take(3).collect(),
            })
        }
        [only] => only.content().ok_or_else(|| ResolveError::EmptyMarker {
            tag: tag.to_string(),
            line: only.start_directive,
        }),
        many => Err(ResolveError::Ambiguous {
            target,
            candidates: many
                .iter()
                .map(|marker| Candidate {
                    kind: NodeKind::Comment,
                    qualified_name: marker.tag.clone(),
                    lines: marker.span(),
                    byte_range: 0..0,
                    signature: None,
                    signature_key: None,
                    arity: None,
                    arguments: Vec::new(),
                    touches_error: false,
                })
                .collect(),
        }),
    }
}

/// Resolve a marker inside a located symbol.
///
/// An ambiguous symbol is accepted when exactly one of its candidates
/// contains the marker.
fn marker_in_symbol(
    file: &SourceFile,
    query: &Query,
    target: &Target,
    tag: &str,
) -> Result<ResolvedRange, ResolveError> {
    let name = symbol_name(query)?;
    let narrowed = locator::narrow(file.tree(), target, &name)?;
    let several = narrowed.candidates.len() > 1;

    let mut hits = Vec::new();
    for candidate in narrowed.candidates {
        match find_marker(file, tag, Some(candidate.lines)) {
            Ok(lines) => hits.push((candidate, lines)),
            Err(ResolveError::NotFound { .. }) if several => continue,
            Err(err) => return Err(err),
        }
    }

    match hits.len() {
        0 => Err(ResolveError::NotFound {
            target: format!("marker `{tag}` within {target}"),
            suggestions: Vec::new(),
        }),
        1 => {
            let (candidate, lines) = hits.remove(0);
            let confidence = if several {
                Confidence::Heuristic
            } else {
                narrowed.confidence
            };
            let origin = Origin::Marker {
                tag: tag.to_string(),
                within: Some(candidate.qualified_name),
            };
            Ok(ResolvedRange::new(file, lines, origin, confidence))
        }
        _ => Err(ResolveError::Ambiguous {
            target: format!("marker `{tag}` within {target}"),
            candidates: hits.into_iter().map(|(candidate, _)| candidate).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> SourceFile {
        SourceFile::parse("r.cpp", source, Grammar::Cpp).unwrap()
    }

    const SOURCE: &str = r#"#include <cstdio>

void helper() {}

void run(int mode) {
    //@@start setup
    int a = mode;
    int b = a * 2;
    //@@end setup
    helper();
}

void run(const char* name) {
    //@@start setup
    std::puts(name);
    //@@end setup
}

void stop() {
    //@@start cleanup
    //@@end cleanup
}
"#;

    #[test]
    fn explicit_lines_are_clamped_at_end() {
        let file = parse(SOURCE);
        let resolved = resolve(&file, &Query::lines(20, 99)).unwrap();
        assert_eq!(resolved.lines, LineRange::new(20, 22));
        assert!(matches!(
            resolve(&file, &Query::lines(40, 50)),
            Err(ResolveError::LinesOutOfRange { line_count: 22, .. })
        ));
        assert!(matches!(
            resolve(&file, &Query::lines(0, 3)),
            Err(ResolveError::InvalidQuery(QueryError::InvalidLines { .. }))
        ));
    }

    #[test]
    fn marker_within_ambiguous_symbol_needs_unique_container() {
        let file = parse(SOURCE);
        let err = resolve(&file, &Query::function("run").with_marker("setup")).unwrap_err();
        match err {
            ResolveError::Ambiguous { candidates, .. } => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguity, got {other:?}"),
        }

        let query = Query::new(Target::Function {
            name: "run".into(),
            signature: Some("const char*".into()),
            arity: None,
        })
        .with_marker("setup");
        let resolved = resolve(&file, &query).unwrap();
        assert_eq!(resolved.lines, LineRange::line(15));
        assert_eq!(resolved.text, "    std::puts(name);");
    }

    #[test]
    fn marker_in_one_overload_only() {
        let source = "void f(int) {\n  //@@start x\n  go();\n  //@@end x\n}\nvoid f(char) {}\n";
        let file = parse(source);
        let resolved = resolve(&file, &Query::function("f").with_marker("x")).unwrap();
        assert_eq!(resolved.lines, LineRange::line(3));
        assert_eq!(resolved.confidence, Confidence::Heuristic);
    }

    #[test]
    fn duplicate_tags_at_file_scope_are_ambiguous() {
        let file = parse(SOURCE);
        assert!(matches!(
            resolve(&file, &Query::marker_tag("setup")),
            Err(ResolveError::Ambiguous { .. })
        ));
    }

    #[test]
    fn empty_marker_is_an_error() {
        let file = parse(SOURCE);
        assert!(matches!(
            resolve(&file, &Query::marker_tag("cleanup")),
            Err(ResolveError::EmptyMarker { line: 20, .. })
        ));
    }

    #[test]
    fn missing_marker_suggests_tags() {
        let file = parse(SOURCE);
        match resolve(&file, &Query::marker_tag("cleanp")).unwrap_err() {
            ResolveError::NotFound { suggestions, .. } => {
                assert_eq!(suggestions, vec!["cleanup".to_string()])
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn symbol_resolution_carries_text_and_fingerprint() {
        let file = parse(SOURCE);
        let resolved = resolve(&file, &Query::function("helper")).unwrap();
        assert_eq!(resolved.lines, LineRange::line(3));
        assert_eq!(resolved.text, "void helper() {}");
        assert_eq!(resolved.fingerprint, xxh3_64(b"void helper() {}"));
        assert_eq!(
            resolved.origin,
            Origin::Symbol {
                kind: NodeKind::FunctionDefinition,
                qualified_name: "helper".into()
            }
        );
    }

    #[test]
    fn resolution_is_idempotent() {
        let first = resolve(&parse(SOURCE), &Query::function("stop")).unwrap();
        let second = resolve(&parse(SOURCE), &Query::function("stop")).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn unclosed_marker_fails_resolution() {
        let file = parse("int a;\n//@@start open\nint b;\n");
        assert!(matches!(
            resolve(&file, &Query::marker_tag("open")),
            Err(ResolveError::Marker(MarkerError::UnclosedMarker { line: 2, .. }))
        ));
    }

    #[test]
    fn serializes_flat_json() {
        let file = parse(SOURCE);
        let resolved = resolve(&file, &Query::function("helper")).unwrap();
        let json = serde_json::to_value(&resolved).unwrap();
        assert_eq!(json["origin"], "symbol");
        assert_eq!(json["kind"], "function-definition");
        assert_eq!(json["lines"]["start"], 3);
        assert_eq!(json["fingerprint"].as_str().unwrap().len(), 16);
    }
}
