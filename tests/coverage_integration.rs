//! Integration tests for diff coverage: manifest + diff + validation

use projected_source::coverage::{validate, ChangeSet, KnownProjections};
use projected_source::pipeline;
use projected_source::{load_from_path, DiffOptions, LineRange};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn r(start: usize, end: usize) -> LineRange {
    LineRange::new(start, end)
}

/// A small repository with one source file, one manifest and a docs dir.
fn setup_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::create_dir_all(dir.path().join("docs")).unwrap();

    fs::copy(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/line_mapping_with_markers.cpp"),
        dir.path().join("src/demo.cpp"),
    )
    .unwrap();

    fs::write(
        dir.path().join("docs/projected-source.toml"),
        r#"
[meta]
name = "demo-docs"
root = ".."

[[projections]]
id = "func-one"
file = "src/demo.cpp"
marker = "func-one"

[[projections]]
id = "setup"
file = "src/demo.cpp"
query = { type = "function", name = "funcTwo" }
marker = "setup"

[[ignore]]
file = "README.md"
"#,
    )
    .unwrap();

    dir
}

const DIFF: &str = "\
diff --git a/src/demo.cpp b/src/demo.cpp
index 3b18e51..a4c2f07 100644
--- a/src/demo.cpp
+++ b/src/demo.cpp
@@ -1,2 +1,3 @@
+#include <cstdio>
 
 namespace demo {
@@ -4,6 +5,6 @@ namespace demo {
 // Prints a greeting.
 //@@start func-one
 void funcOne() {
-    std::puts(\"uno\");
+    std::puts(\"one\");
 }
 //@@end func-one
@@ -11,6 +12,6 @@ void funcOne() {
 int funcTwo(int value) {
     //@@start setup
-    int doubled = value + value;
+    int doubled = value * 2;
     //@@end setup
     return doubled + 1;
 }
diff --git a/README.md b/README.md
--- a/README.md
+++ b/README.md
@@ -1,1 +1,2 @@
 # Demo
+More words.
";

#[test]
fn scenario_partial_projection_splits_changed_range() {
    let mut changes = ChangeSet::new();
    changes.add("src/peer.cpp", r(100, 150));
    let mut known = KnownProjections::new();
    known.claim("src/peer.cpp", r(120, 130));

    let report = validate(&changes, &known);
    assert_eq!(
        report.uncovered.get(Path::new("src/peer.cpp")),
        Some(&vec![r(100, 119), r(131, 150)])
    );
    assert_eq!(report.lines_uncovered, 40);
    assert_eq!(report.regions_uncovered, 2);
}

#[test]
fn diff_against_manifest_reports_only_unclaimed_lines() {
    let repo = setup_repo();
    let manifest_path = repo.path().join("docs/projected-source.toml");
    let manifest = load_from_path(&manifest_path).unwrap();
    let root = manifest.root_dir(&manifest_path);

    let run = pipeline::run(&manifest, &root);
    assert!(run.is_success(), "{:?}", run.failures().collect::<Vec<_>>());

    let changes = ChangeSet::from_unified_diff(DIFF, DiffOptions::default());
    assert_eq!(
        changes.ranges(Path::new("src/demo.cpp")),
        &[r(1, 1), r(8, 8), r(14, 14)]
    );

    let report = validate(&changes, &run.known_projections());
    assert_eq!(report.files_changed, 2);
    assert_eq!(report.lines_changed, 4);
    assert_eq!(report.uncovered.len(), 1);
    assert_eq!(
        report.uncovered.get(Path::new("src/demo.cpp")),
        Some(&vec![r(1, 1)])
    );
    assert!(!report.is_complete());
}

#[test]
fn context_lines_widen_the_change_set() {
    let changes = ChangeSet::from_unified_diff(DIFF, DiffOptions { include_context: true });
    let ranges = changes.ranges(Path::new("src/demo.cpp"));
    assert_eq!(ranges, &[r(1, 3), r(5, 10), r(12, 17)]);
    assert_eq!(changes.ranges(Path::new("README.md")), &[r(1, 2)]);
}

#[test]
fn whole_file_claim_covers_everything() {
    let mut changes = ChangeSet::new();
    changes.add("CMakeLists.txt", r(1, 400));
    let mut known = KnownProjections::new();
    known.claim_file("./CMakeLists.txt");

    let report = validate(&changes, &known);
    assert!(report.is_complete());
    assert_eq!(report.covered_percent(), 100.0);
}
