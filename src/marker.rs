//! Paired `//@@start <tag>` / `//@@end <tag>` comment markers.
//!
//! Directives are read from comment nodes of the syntax tree, so text that
//! merely looks like a directive inside a string literal is never a marker.
//! Pairing is a single pass over the directives with an explicit stack of
//! open tags.

use crate::query::is_valid_tag;
use crate::range::LineRange;
use crate::ts::{NodeId, SourceFile};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveKind {
    Start,
    End,
}

impl DirectiveKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DirectiveKind::Start => "start",
            DirectiveKind::End => "end",
        }
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One `@@start`/`@@end` directive found in a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub tag: String,
    pub line: usize,
}

/// A matched start/end pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Marker {
    pub tag: String,
    pub start_directive: usize,
    pub end_directive: usize,
}

impl Marker {
    /// Lines strictly between the two directives, or `None` if there are none.
    pub fn content(&self) -> Option<LineRange> {
        (self.end_directive > self.start_directive + 1)
            .then(|| LineRange::new(self.start_directive + 1, self.end_directive - 1))
    }

    /// Both directive lines and everything between them.
    pub fn span(&self) -> LineRange {
        LineRange::new(self.start_directive, self.end_directive)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarkerError {
    #[error("unbalanced marker '{tag}' at line {line}")]
    UnbalancedMarker { tag: String, line: usize },

    #[error("marker '{tag}' opened at line {line} is never closed")]
    UnclosedMarker { tag: String, line: usize },
}

/// Parse a directive out of one line of comment text.
///
/// Accepts `//@@start tag`, `// @@end tag`, `/* @@start tag */` and block
/// comment continuation lines (`* @@end tag`). Doc comment openers
/// (`///`, `//!`, `/**`, `/*!`) work the same way.
pub fn parse_directive(line: &str) -> Option<(DirectiveKind, &str)> {
    let trimmed = line.trim_start();
    let body = ["//", "/*", "*"]
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))?;
    let body = doc_opener_tail(body).trim_start();

    let (kind, rest) = if let Some(rest) = body.strip_prefix("@@start") {
        (DirectiveKind::Start, rest)
    } else if let Some(rest) = body.strip_prefix("@@end") {
        (DirectiveKind::End, rest)
    } else {
        return None;
    };

    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start();
    let tag_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(rest.len());
    let tag = &rest[..tag_len];
    is_valid_tag(tag).then_some((kind, tag))
}

/// A directive that is the only thing on its line (`  //@@end tag`).
pub fn standalone_directive(line: &str) -> Option<(DirectiveKind, &str)> {
    let body = doc_opener_tail(line.trim().strip_prefix("//")?).strip_prefix("@@")?;
    let (kind, rest) = if let Some(rest) = body.strip_prefix("start") {
        (DirectiveKind::Start, rest)
    } else {
        (DirectiveKind::End, body.strip_prefix("end")?)
    };
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let tag = rest.trim();
    is_valid_tag(tag).then_some((kind, tag))
}

/// Skip the third character of a doc comment opener.
fn doc_opener_tail(body: &str) -> &str {
    body.strip_prefix(['/', '!', '*']).unwrap_or(body)
}

/// Directives in comment nodes, in line order, optionally limited to `within`.
pub fn directives(file: &SourceFile, within: Option<LineRange>) -> Vec<Directive> {
    let tree = file.tree();
    let mut found = Vec::new();
    for id in tree.comments(within) {
        collect_from_comment(file, id, &mut found);
    }
    found
}

fn collect_from_comment(file: &SourceFile, id: NodeId, out: &mut Vec<Directive>) {
    let node = file.tree().node(id);
    let text = &file.text()[node.byte_range.clone()];
    for (offset, line) in text.lines().enumerate() {
        if let Some((kind, tag)) = parse_directive(line) {
            out.push(Directive {
                kind,
                tag: tag.to_string(),
                line: node.lines.start + offset,
            });
        }
    }
}

/// Pair directives into markers.
///
/// Markers may nest with distinct tags. Ends must close the innermost open
/// tag. Markers are returned ordered by start line.
pub fn scan(directives: &[Directive]) -> Result<Vec<Marker>, MarkerError> {
    let mut open: Vec<(&str, usize)> = Vec::new();
    let mut markers = Vec::new();

    for directive in directives {
        match directive.kind {
            DirectiveKind::Start => {
                if open.iter().any(|(tag, _)| *tag == directive.tag) {
                    return Err(MarkerError::UnbalancedMarker {
                        tag: directive.tag.clone(),
                        line: directive.line,
                    });
                }
                open.push((directive.tag.as_str(), directive.line));
            }
            DirectiveKind::End => match open.last() {
                Some((tag, start)) if *tag == directive.tag => {
                    markers.push(Marker {
                        tag: directive.tag.clone(),
                        start_directive: *start,
                        end_directive: directive.line,
                    });
                    open.pop();
                }
                _ => {
                    return Err(MarkerError::UnbalancedMarker {
                        tag: directive.tag.clone(),
                        line: directive.line,
                    });
                }
            },
        }
    }

    if let Some((tag, line)) = open.pop() {
        return Err(MarkerError::UnclosedMarker {
            tag: tag.to_string(),
            line,
        });
    }

    markers.sort_by_key(|marker| marker.start_directive);
    Ok(markers)
}

/// Scan a file (or part of it) for markers.
pub fn markers(file: &SourceFile, within: Option<LineRange>) -> Result<Vec<Marker>, MarkerError> {
    scan(&directives(file, within))
}
