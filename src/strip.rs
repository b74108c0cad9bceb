//! Removal of stand-alone marker directive lines.
//!
//! A strip is planned from a snapshot of the file and applied only if the
//! file still hashes to that snapshot. Writes are atomic.

use crate::marker::{standalone_directive, Directive};
use crate::ts::Grammar;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Error, Debug)]
pub enum StripError {
    #[error("{} changed since it was scanned", .path.display())]
    ContentChanged { path: PathBuf },

    #[error("failed to walk {}: {source}", .root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Directive lines to drop from one file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "StripPlan does nothing until apply() is called"]
pub struct StripPlan {
    pub path: PathBuf,
    pub directives: Vec<Directive>,
    expected_hash: u64,
    stripped: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "StripResult should be checked"]
pub enum StripResult {
    Stripped { path: PathBuf, lines_removed: usize },
    Unchanged { path: PathBuf },
}

impl StripPlan {
    /// Scan `content` for directive lines.
    pub fn from_content(path: impl Into<PathBuf>, content: &str) -> Self {
        let mut directives = Vec::new();
        let mut stripped = String::with_capacity(content.len());

        for (index, line) in content.split_inclusive('\n').enumerate() {
            match standalone_directive(line) {
                Some((kind, tag)) => directives.push(Directive {
                    kind,
                    tag: tag.to_string(),
                    line: index + 1,
                }),
                None => stripped.push_str(line),
            }
        }

        Self {
            path: path.into(),
            directives,
            expected_hash: xxh3_64(content.as_bytes()),
            stripped,
        }
    }

    /// Read and scan a file.
    pub fn for_file(path: &Path) -> Result<Self, StripError> {
        let content = fs::read_to_string(path)?;
        Ok(Self::from_content(path, &content))
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// The file content with directive lines removed.
    pub fn stripped(&self) -> &str {
        &self.stripped
    }

    /// Write the stripped content if the file is unchanged since planning.
    pub fn apply(&self) -> Result<StripResult, StripError> {
        if self.is_empty() {
            return Ok(StripResult::Unchanged {
                path: self.path.clone(),
            });
        }

        let current = fs::read(&self.path)?;
        if xxh3_64(&current) != self.expected_hash {
            return Err(StripError::ContentChanged {
                path: self.path.clone(),
            });
        }

        atomic_write(&self.path, self.stripped.as_bytes())?;
        Ok(StripResult::Stripped {
            path: self.path.clone(),
            lines_removed: self.directives.len(),
        })
    }
}

/// Source files under `root` with a known grammar, sorted. A file path is
/// returned as-is.
pub fn source_files(root: &Path) -> Result<Vec<PathBuf>, StripError> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|source| StripError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && Grammar::from_path(entry.path()).is_ok() {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Atomic file write: tempfile + fsync + rename.
fn atomic_write(path: &Path, content: &[u8]) -> Result<(), StripError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::DirectiveKind;

    const SOURCE: &str = "int a;\n  //@@start keep\nint b;\nfoo(); //@@end keep\n//@@end keep\n";

    #[test]
    fn plans_only_standalone_lines() {
        let plan = StripPlan::from_content("a.cpp", SOURCE);
        assert_eq!(plan.directives.len(), 2);
        assert_eq!(plan.directives[0].kind, DirectiveKind::Start);
        assert_eq!(plan.directives[0].line, 2);
        assert_eq!(plan.directives[1].line, 5);
        assert_eq!(plan.stripped(), "int a;\nint b;\nfoo(); //@@end keep\n");
    }

    #[test]
    fn apply_writes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.cpp");
        fs::write(&path, SOURCE).unwrap();

        let plan = StripPlan::for_file(&path).unwrap();
        let result = plan.apply().unwrap();
        assert_eq!(
            result,
            StripResult::Stripped {
                path: path.clone(),
                lines_removed: 2
            }
        );
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "int a;\nint b;\nfoo(); //@@end keep\n"
        );

        let again = StripPlan::for_file(&path).unwrap();
        assert!(again.is_empty());
        assert!(matches!(again.apply().unwrap(), StripResult::Unchanged { .. }));
    }

    #[test]
    fn refuses_when_file_changed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.cpp");
        fs::write(&path, SOURCE).unwrap();

        let plan = StripPlan::for_file(&path).unwrap();
        fs::write(&path, "int changed;\n").unwrap();
        assert!(matches!(
            plan.apply(),
            Err(StripError::ContentChanged { .. })
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "int changed;\n");
    }

    #[test]
    fn finds_sources_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.cpp"), "").unwrap();
        fs::write(dir.path().join("sub/b.h"), "").unwrap();
        fs::write(dir.path().join("notes.md"), "").unwrap();

        let files = source_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().unwrap() != "md"));
    }
}
