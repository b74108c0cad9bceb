//! Unified diff text to [`ChangeSet`].

use crate::coverage::ChangeSet;
use crate::range::LineRange;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// Count context lines of each hunk as changed too.
    pub include_context: bool,
}

/// `@@ -a,b +c,d @@` → `(b, c, d)`; omitted counts default to 1.
fn parse_hunk_header(line: &str) -> Option<(usize, usize, usize)> {
    let rest = line.strip_prefix("@@ ")?;
    let end = rest.find(" @@")?;
    let mut parts = rest[..end].split_whitespace();
    let old = parts.next()?.strip_prefix('-')?;
    let new = parts.next()?.strip_prefix('+')?;

    let count = |part: &str| -> Option<(usize, usize)> {
        match part.split_once(',') {
            Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
            None => Some((part.parse().ok()?, 1)),
        }
    };
    let (_, old_len) = count(old)?;
    let (new_start, new_len) = count(new)?;
    Some((old_len, new_start, new_len))
}

/// Path from a `+++` header: strips the `b/` prefix and any trailing timestamp.
fn parse_target_path(rest: &str) -> Option<&str> {
    let path = rest.split('\t').next().unwrap_or(rest).trim_end();
    if path == "/dev/null" {
        return None;
    }
    Some(path.strip_prefix("b/").unwrap_or(path))
}

impl ChangeSet {
    /// Build a change set from `git diff`-style unified diff text.
    ///
    /// Added lines are changed lines. Deleted files (`+++ /dev/null`) are
    /// skipped. Malformed hunk headers are logged and their hunk ignored.
    pub fn from_unified_diff(text: &str, options: DiffOptions) -> ChangeSet {
        let mut changes = ChangeSet::new();
        let mut path: Option<String> = None;
        let mut old_left = 0usize;
        let mut new_left = 0usize;
        let mut new_line = 0usize;

        for line in text.lines() {
            let in_hunk = old_left > 0 || new_left > 0;

            if !in_hunk {
                if let Some(rest) = line.strip_prefix("+++ ") {
                    path = parse_target_path(rest).map(str::to_string);
                } else if line.starts_with("@@ ") {
                    match parse_hunk_header(line) {
                        Some((old_len, start, new_len)) => {
                            old_left = old_len;
                            new_left = new_len;
                            new_line = start;
                        }
                        None => warn!(header = line, "skipping malformed hunk header"),
                    }
                } else if line.starts_with("diff ") {
                    path = None;
                }
                continue;
            }

            match line.as_bytes().first() {
                Some(b'+') => {
                    if let Some(path) = &path {
                        changes.add(path, LineRange::line(new_line));
                    }
                    new_line += 1;
                    new_left = new_left.saturating_sub(1);
                }
                Some(b'-') => old_left = old_left.saturating_sub(1),
                Some(b'\\') => {}
                _ => {
                    if options.include_context {
                        if let Some(path) = &path {
                            changes.add(path, LineRange::line(new_line));
                        }
                    }
                    new_line += 1;
                    old_left = old_left.saturating_sub(1);
                    new_left = new_left.saturating_sub(1);
                }
            }
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const DIFF: &str = "diff --git a/src/a.cpp b/src/a.cpp
index 1111111..2222222 100644
--- a/src/a.cpp
+++ b/src/a.cpp
@@ -10,3 +10,4 @@ void f() {
 int a;
-int b;
+int b = 1;
+++ counter;
 int d;
@@ -40 +41 @@
-old
+new
diff --git a/gone.cpp b/gone.cpp
deleted file mode 100644
--- a/gone.cpp
+++ /dev/null
@@ -1,2 +0,0 @@
-x
-y
";

    #[test]
    fn added_lines_become_changes() {
        let changes = ChangeSet::from_unified_diff(DIFF, DiffOptions::default());
        assert_eq!(
            changes.ranges(Path::new("src/a.cpp")),
            &[LineRange::new(11, 12), LineRange::line(41)]
        );
        assert_eq!(changes.file_count(), 1);
    }

    #[test]
    fn context_lines_on_request() {
        let options = DiffOptions {
            include_context: true,
        };
        let changes = ChangeSet::from_unified_diff(DIFF, options);
        assert_eq!(
            changes.ranges(Path::new("src/a.cpp")),
            &[LineRange::new(10, 13), LineRange::line(41)]
        );
    }

    #[test]
    fn hunk_headers() {
        assert_eq!(parse_hunk_header("@@ -1,3 +1,4 @@"), Some((3, 1, 4)));
        assert_eq!(parse_hunk_header("@@ -5 +7 @@ ctx"), Some((1, 7, 1)));
        assert_eq!(parse_hunk_header("@@ garbage @@"), None);
    }

    #[test]
    fn empty_diff() {
        assert!(ChangeSet::from_unified_diff("", DiffOptions::default()).is_empty());
    }
}
