use crate::query::{Query, QueryError, Target};
use crate::ts::Grammar;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Manifest {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub projections: Vec<ProjectionDefinition>,
    #[serde(default)]
    pub ignore: Vec<IgnoreDefinition>,
}

impl Manifest {
    /// Repository root: `meta.root` relative to the manifest's directory.
    pub fn root_dir(&self, manifest_path: &Path) -> PathBuf {
        let base = manifest_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        match &self.meta.root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => base.join(root),
            None => base.to_path_buf(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.projections.is_empty() {
            issues.push(ValidationIssue::EmptyProjectionList);
        }

        let mut seen = HashSet::new();
        for projection in &self.projections {
            let id = (!projection.id.trim().is_empty()).then(|| projection.id.clone());
            match &id {
                None => issues.push(ValidationIssue::MissingField {
                    projection_id: None,
                    field: "id",
                }),
                Some(id) if !seen.insert(id.clone()) => {
                    issues.push(ValidationIssue::DuplicateId { id: id.clone() })
                }
                Some(_) => {}
            }

            if projection.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    projection_id: id.clone(),
                    field: "file",
                });
            }

            match projection.to_query() {
                Some(query) => {
                    if let Err(source) = query.validate() {
                        issues.push(ValidationIssue::InvalidQuery {
                            projection_id: id.clone(),
                            source,
                        });
                    }
                }
                None => issues.push(ValidationIssue::MissingField {
                    projection_id: id.clone(),
                    field: "query",
                }),
            }
        }

        for ignore in &self.ignore {
            if ignore.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    projection_id: None,
                    field: "ignore.file",
                });
            }
            if let Some(Err(source)) = ignore.to_query().map(|query| query.validate()) {
                issues.push(ValidationIssue::InvalidQuery {
                    projection_id: None,
                    source,
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// One `[[projections]]` entry.
#[derive(Debug, Deserialize, Clone)]
pub struct ProjectionDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub grammar: Option<Grammar>,
    #[serde(default)]
    pub scope: Option<String>,
    /// Alone, a marker target; with `query`, a marker inside the query's match.
    #[serde(default)]
    pub marker: Option<String>,
    #[serde(default)]
    pub query: Option<Target>,
}

impl ProjectionDefinition {
    pub fn to_query(&self) -> Option<Query> {
        build_query(self.query.as_ref(), self.scope.as_ref(), self.marker.as_ref())
    }
}

/// One `[[ignore]]` entry; without a query the whole file is ignored.
#[derive(Debug, Deserialize, Clone)]
pub struct IgnoreDefinition {
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub grammar: Option<Grammar>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub marker: Option<String>,
    #[serde(default)]
    pub query: Option<Target>,
}

impl IgnoreDefinition {
    /// `None` means the whole file.
    pub fn to_query(&self) -> Option<Query> {
        build_query(self.query.as_ref(), self.scope.as_ref(), self.marker.as_ref())
    }
}

fn build_query(
    target: Option<&Target>,
    scope: Option<&String>,
    marker: Option<&String>,
) -> Option<Query> {
    let mut query = match (target, marker) {
        (Some(target), marker) => Query {
            target: target.clone(),
            scope: None,
            marker: marker.cloned(),
        },
        (None, Some(tag)) => Query::marker_tag(tag.clone()),
        (None, None) => return None,
    };
    query.scope = scope.cloned();
    Some(query)
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyProjectionList,
    MissingField {
        projection_id: Option<String>,
        field: &'static str,
    },
    DuplicateId {
        id: String,
    },
    InvalidQuery {
        projection_id: Option<String>,
        source: QueryError,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyProjectionList => {
                write!(f, "manifest contains no projections")
            }
            ValidationIssue::MissingField {
                projection_id,
                field,
            } => match projection_id {
                Some(id) => write!(f, "projection '{id}' missing required field '{field}'"),
                None => write!(f, "entry missing required field '{field}'"),
            },
            ValidationIssue::DuplicateId { id } => {
                write!(f, "projection id '{id}' is used more than once")
            }
            ValidationIssue::InvalidQuery {
                projection_id,
                source,
            } => match projection_id {
                Some(id) => write!(f, "projection '{id}' has an invalid query: {source}"),
                None => write!(f, "ignore entry has an invalid query: {source}"),
            },
        }
    }
}
