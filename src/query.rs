//! Declarative queries naming what to extract from a file.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// What to locate in a file.
///
/// Deserializes from the manifest's inline `query = { type = "...", ... }` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Target {
    /// A function or method, optionally narrowed by parameter text or count.
    Function {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arity: Option<usize>,
    },
    /// A class, struct, union or enum with a body.
    Type { name: String },
    Variable { name: String },
    /// A macro-shaped invocation, optionally filtered by positional arguments.
    Macro {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<ArgFilter>,
    },
    /// A `#define`.
    MacroDefinition { name: String },
    Marker { tag: String },
    /// Explicit 1-based inclusive line bounds.
    Lines { start: usize, end: usize },
}

impl Target {
    pub fn kind(&self) -> &'static str {
        match self {
            Target::Function { .. } => "function",
            Target::Type { .. } => "type",
            Target::Variable { .. } => "variable",
            Target::Macro { .. } => "macro",
            Target::MacroDefinition { .. } => "macro-definition",
            Target::Marker { .. } => "marker",
            Target::Lines { .. } => "lines",
        }
    }

    /// The symbol name for name-based targets.
    pub fn name(&self) -> Option<&str> {
        match self {
            Target::Function { name, .. }
            | Target::Type { name }
            | Target::Variable { name }
            | Target::Macro { name, .. }
            | Target::MacroDefinition { name } => Some(name),
            Target::Marker { .. } | Target::Lines { .. } => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Function {
                name, signature, ..
            } => match signature {
                Some(signature) => write!(f, "function `{name}` ({signature})"),
                None => write!(f, "function `{name}`"),
            },
            Target::Macro { name, args } if !args.is_empty() => {
                let filters: Vec<String> = args
                    .iter()
                    .map(|arg| format!("arg{}={}", arg.index, arg.value))
                    .collect();
                write!(f, "macro `{name}` [{}]", filters.join(", "))
            }
            Target::Marker { tag } => write!(f, "marker `{tag}`"),
            Target::Lines { start, end } => write!(f, "lines {start}-{end}"),
            other => write!(f, "{} `{}`", other.kind(), other.name().unwrap_or_default()),
        }
    }
}

/// Require the macro argument at `index` (0-based) to equal `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgFilter {
    pub index: usize,
    pub value: String,
}

/// A target plus optional enclosing scope and marker tag.
///
/// With a marker, the target is resolved first and the marker is then
/// searched for inside the target's lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub target: Target,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
}

impl Query {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            scope: None,
            marker: None,
        }
    }

    pub fn function(name: impl Into<String>) -> Self {
        Self::new(Target::Function {
            name: name.into(),
            signature: None,
            arity: None,
        })
    }

    pub fn marker_tag(tag: impl Into<String>) -> Self {
        Self::new(Target::Marker { tag: tag.into() })
    }

    pub fn lines(start: usize, end: usize) -> Self {
        Self::new(Target::Lines { start, end })
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    #[must_use]
    pub fn with_marker(mut self, tag: impl Into<String>) -> Self {
        self.marker = Some(tag.into());
        self
    }

    /// Check the query is well formed before any file is touched.
    pub fn validate(&self) -> Result<(), QueryError> {
        match &self.target {
            Target::Function {
                name, signature, ..
            } => {
                QualifiedName::parse(name)?;
                if signature.as_deref().is_some_and(|s| s.trim().is_empty()) {
                    return Err(QueryError::EmptySignature);
                }
            }
            Target::Type { name } | Target::Variable { name } => {
                QualifiedName::parse(name)?;
            }
            Target::Macro { name, .. } | Target::MacroDefinition { name } => {
                let parsed = QualifiedName::parse(name)?;
                if parsed.anchored || parsed.components.len() > 1 {
                    return Err(QueryError::QualifiedMacro { name: name.clone() });
                }
            }
            Target::Marker { tag } => {
                validate_tag(tag)?;
                if self.marker.is_some() {
                    return Err(QueryError::MarkerOnMarker);
                }
            }
            Target::Lines { start, end } => {
                if *start == 0 || start > end {
                    return Err(QueryError::InvalidLines {
                        start: *start,
                        end: *end,
                    });
                }
            }
        }

        if let Some(scope) = &self.scope {
            if matches!(
                self.target,
                Target::Marker { .. } | Target::Lines { .. } | Target::MacroDefinition { .. }
            ) {
                return Err(QueryError::ScopeNotAllowed {
                    kind: self.target.kind(),
                });
            }
            QualifiedName::parse(scope)?;
        }

        if let Some(tag) = &self.marker {
            validate_tag(tag)?;
        }

        Ok(())
    }

    /// Name of the target with the scope filter prepended.
    pub fn qualified_name(&self) -> Result<Option<QualifiedName>, QueryError> {
        let Some(name) = self.target.name() else {
            return Ok(None);
        };
        let name = QualifiedName::parse(name)?;
        match &self.scope {
            Some(scope) => Ok(Some(name.within(&QualifiedName::parse(scope)?))),
            None => Ok(Some(name)),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scope) = &self.scope {
            write!(f, "{scope}::")?;
        }
        write!(f, "{}", self.target)?;
        if let Some(tag) = &self.marker {
            write!(f, " / marker `{tag}`")?;
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("empty name")]
    EmptyName,

    #[error("empty component in qualified name '{name}'")]
    EmptyComponent { name: String },

    #[error("invalid line bounds {start}-{end} (lines are 1-based and start <= end)")]
    InvalidLines { start: usize, end: usize },

    #[error("invalid marker tag '{tag}' (expected [A-Za-z0-9_-]+)")]
    InvalidTag { tag: String },

    #[error("a scope cannot be applied to a {kind} target")]
    ScopeNotAllowed { kind: &'static str },

    #[error("a marker target cannot carry a second marker")]
    MarkerOnMarker,

    #[error("macro name '{name}' cannot be qualified")]
    QualifiedMacro { name: String },

    #[error("signature hint is empty")]
    EmptySignature,
}

/// Marker tags are `[A-Za-z0-9_-]+`.
pub fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn validate_tag(tag: &str) -> Result<(), QueryError> {
    if is_valid_tag(tag) {
        Ok(())
    } else {
        Err(QueryError::InvalidTag {
            tag: tag.to_string(),
        })
    }
}

/// A `::`-separated name such as `ns::Widget::draw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    /// Written with a leading `::`; the scope path must match in full.
    pub anchored: bool,
    pub components: Vec<String>,
}

impl QualifiedName {
    pub fn parse(name: &str) -> Result<Self, QueryError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(QueryError::EmptyName);
        }
        let (anchored, rest) = match trimmed.strip_prefix("::") {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let components = split_qualified(rest);
        if components.iter().any(|component| component.is_empty()) {
            return Err(QueryError::EmptyComponent {
                name: name.to_string(),
            });
        }

        Ok(Self {
            anchored,
            components,
        })
    }

    /// The unqualified name.
    pub fn leaf(&self) -> &str {
        self.components.last().map(String::as_str).unwrap_or_default()
    }

    /// Every component except the leaf.
    pub fn qualifiers(&self) -> &[String] {
        &self.components[..self.components.len().saturating_sub(1)]
    }

    /// This name nested inside `scope`; anchoring follows the scope.
    #[must_use]
    pub fn within(&self, scope: &QualifiedName) -> QualifiedName {
        let mut components = scope.components.clone();
        components.extend(self.components.iter().cloned());
        QualifiedName {
            anchored: scope.anchored,
            components,
        }
    }

    /// Check a candidate's scope path and name against this name.
    ///
    /// Qualifiers match the innermost scopes of `scope` (all of them when
    /// anchored). Template arguments are ignored unless the query spells them.
    pub fn matches(&self, scope: &[String], name: &str) -> bool {
        if !component_matches(name, self.leaf()) {
            return false;
        }
        let qualifiers = self.qualifiers();
        if qualifiers.len() > scope.len() || (self.anchored && qualifiers.len() != scope.len()) {
            return false;
        }
        let innermost = &scope[scope.len() - qualifiers.len()..];
        innermost
            .iter()
            .zip(qualifiers)
            .all(|(found, wanted)| component_matches(found, wanted))
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.anchored {
            f.write_str("::")?;
        }
        f.write_str(&self.components.join("::"))
    }
}

/// Split on `::` outside template brackets.
pub fn split_qualified(name: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    let mut chars = name.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ':' if depth == 0 && chars.peek() == Some(&':') => {
                chars.next();
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current.trim().to_string());
    parts
}

/// Component name with any template argument list removed.
pub fn base_name(component: &str) -> &str {
    if component.starts_with("operator") {
        return component;
    }
    match component.find('<') {
        Some(index) => component[..index].trim_end(),
        None => component,
    }
}

fn component_matches(found: &str, wanted: &str) -> bool {
    if wanted.contains('<') && !wanted.starts_with("operator") {
        let squash = |s: &str| s.split_whitespace().collect::<String>();
        squash(found) == squash(wanted)
    } else {
        base_name(found) == wanted
    }
}
