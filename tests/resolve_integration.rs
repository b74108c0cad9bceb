//! Integration tests for query resolution against the C++ fixtures

use projected_source::query::ArgFilter;
use projected_source::resolve::resolve_path;
use projected_source::ts::NodeKind;
use projected_source::{
    resolve, Confidence, Grammar, LineRange, MarkerError, Origin, Query, ResolveError, SourceFile,
    Target,
};
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn load(name: &str) -> SourceFile {
    SourceFile::read(&fixture(name), None).unwrap()
}

fn function_with_signature(name: &str, signature: &str) -> Query {
    Query::new(Target::Function {
        name: name.to_string(),
        signature: Some(signature.to_string()),
        arity: None,
    })
}

#[test]
fn marker_around_function_excludes_directive_lines() {
    let file = load("line_mapping_with_markers.cpp");
    let resolved = resolve(&file, &Query::marker_tag("func-one")).unwrap();

    assert_eq!(resolved.lines, LineRange::new(7, 9));
    assert_eq!(
        resolved.text,
        "void funcOne() {\n    std::puts(\"one\");\n}"
    );
    assert!(!resolved.text.contains("@@"));
    assert_eq!(
        resolved.origin,
        Origin::Marker {
            tag: "func-one".into(),
            within: None
        }
    );
}

#[test]
fn function_query_matches_marker_lines() {
    let file = load("line_mapping_with_markers.cpp");
    let by_name = resolve(&file, &Query::function("demo::funcOne")).unwrap();
    let by_marker = resolve(&file, &Query::marker_tag("func-one")).unwrap();

    assert_eq!(by_name.lines, by_marker.lines);
    assert_eq!(by_name.fingerprint, by_marker.fingerprint);
    assert_eq!(by_name.confidence, Confidence::Exact);
}

#[test]
fn marker_inside_function() {
    let file = load("line_mapping_with_markers.cpp");
    let resolved = resolve(&file, &Query::function("funcTwo").with_marker("setup")).unwrap();

    assert_eq!(resolved.lines, LineRange::line(14));
    assert_eq!(resolved.text.trim(), "int doubled = value * 2;");
}

#[test]
fn overloads_without_hint_are_ambiguous() {
    let file = load("overloads.cpp");
    let err = resolve(&file, &Query::function("io::write")).unwrap_err();

    let candidates = match err {
        ResolveError::Ambiguous { candidates, .. } => candidates,
        other => panic!("expected Ambiguous, got {other:?}"),
    };
    assert_eq!(candidates.len(), 4);
    for (i, a) in candidates.iter().enumerate() {
        for b in &candidates[i + 1..] {
            assert!(!a.lines.overlaps(&b.lines), "{a:?} overlaps {b:?}");
        }
    }
}

#[test]
fn signature_hint_selects_one_overload() {
    let file = load("overloads.cpp");
    let resolved = resolve(&file, &function_with_signature("write", "double")).unwrap();

    assert_eq!(resolved.lines, LineRange::new(9, 11));
    assert_eq!(resolved.confidence, Confidence::Heuristic);

    let resolved = resolve(&file, &function_with_signature("write", "float")).unwrap_err();
    assert!(matches!(resolved, ResolveError::NotFound { ref suggestions, .. } if suggestions.len() == 3));

    let resolved = resolve(&file, &function_with_signature("write", "const std::string&")).unwrap();
    assert_eq!(resolved.lines, LineRange::new(13, 15));
}

#[test]
fn qualified_name_requires_exact_enclosing_scopes() {
    let file = load("scoped_methods.h");

    let err = resolve(&file, &Query::function("Peer::onMessage")).unwrap_err();
    assert!(matches!(err, ResolveError::Ambiguous { ref candidates, .. } if candidates.len() == 2));

    let net = resolve(&file, &Query::function("net::Peer::onMessage")).unwrap();
    assert_eq!(net.lines, LineRange::new(14, 21));

    let other = resolve(&file, &Query::function("other::Peer::onMessage")).unwrap();
    assert_eq!(other.lines, LineRange::new(29, 31));

    let err = resolve(&file, &Query::function("missing::Peer::onMessage")).unwrap_err();
    assert!(matches!(err, ResolveError::NotFound { .. }));
}

#[test]
fn scope_filter_narrows_like_a_qualifier() {
    let file = load("scoped_methods.h");
    let scoped = resolve(&file, &Query::function("Peer::onMessage").with_scope("other")).unwrap();
    let qualified = resolve(&file, &Query::function("other::Peer::onMessage")).unwrap();
    assert_eq!(scoped, qualified);
}

#[test]
fn marker_in_qualified_method() {
    let file = load("scoped_methods.h");
    let resolved = resolve(
        &file,
        &Query::function("net::Peer::onMessage").with_marker("dispatch"),
    )
    .unwrap();
    assert_eq!(resolved.lines, LineRange::new(16, 19));
    assert!(resolved.text.starts_with("    switch (type) {"));
}

#[test]
fn type_query_spans_class_body() {
    let file = load("scoped_methods.h");
    let resolved = resolve(
        &file,
        &Query::new(Target::Type {
            name: "net::Peer".into(),
        }),
    )
    .unwrap();
    assert_eq!(resolved.lines, LineRange::new(5, 12));
}

#[test]
fn macro_invocation_filtered_by_argument() {
    let file = load("macro_example.cpp");
    let err = resolve(
        &file,
        &Query::new(Target::Macro {
            name: "REGISTER_HANDLER".into(),
            args: Vec::new(),
        }),
    )
    .unwrap_err();
    assert!(matches!(err, ResolveError::Ambiguous { ref candidates, .. } if candidates.len() == 2));

    let resolved = resolve(
        &file,
        &Query::new(Target::Macro {
            name: "REGISTER_HANDLER".into(),
            args: vec![ArgFilter {
                index: 0,
                value: "\"pong\"".into(),
            }],
        }),
    )
    .unwrap();
    assert_eq!(resolved.lines, LineRange::line(9));
}

#[test]
fn macro_definition_query() {
    let file = load("macro_example.cpp");
    let resolved = resolve(
        &file,
        &Query::new(Target::MacroDefinition {
            name: "MAX_PEERS".into(),
        }),
    )
    .unwrap();
    assert_eq!(resolved.lines, LineRange::line(3));
    assert_eq!(resolved.text, "#define MAX_PEERS 64");
}

#[test]
fn unclosed_marker_names_tag_and_start_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("open.cpp");
    std::fs::write(
        &path,
        "int a;\n//@@start done\nint b;\n//@@end done\n\n//@@start open\nint c;\n",
    )
    .unwrap();

    let err = resolve_path(&path, None, &Query::marker_tag("done")).unwrap_err();
    assert!(matches!(
        err,
        ResolveError::Marker(MarkerError::UnclosedMarker { ref tag, line: 6 }) if tag == "open"
    ));
}

#[test]
fn unknown_name_suggests_close_matches() {
    let file = load("line_mapping_with_markers.cpp");
    let err = resolve(&file, &Query::function("funcOen")).unwrap_err();
    let suggestions = match err {
        ResolveError::NotFound { suggestions, .. } => suggestions,
        other => panic!("expected NotFound, got {other:?}"),
    };
    assert!(suggestions.iter().any(|s| s.contains("funcOne")));
}

#[test]
fn resolution_is_idempotent() {
    let first = load("scoped_methods.h");
    let second = load("scoped_methods.h");
    let query = Query::function("net::Peer::onMessage");

    let a = resolve(&first, &query).unwrap();
    let b = resolve(&second, &query).unwrap();
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[test]
fn header_overloads_are_ambiguous_until_hinted() {
    let file = load("class_methods.h");
    let err = resolve(&file, &Query::function("ShuffleService::computeCombinedEntropy")).unwrap_err();
    let candidates = match err {
        ResolveError::Ambiguous { candidates, .. } => candidates,
        other => panic!("expected Ambiguous, got {other:?}"),
    };
    let lines: Vec<_> = candidates.iter().map(|c| c.lines).collect();
    assert_eq!(lines, vec![LineRange::new(50, 51), LineRange::new(53, 56)]);

    let resolved = resolve(
        &file,
        &function_with_signature("ripple::ShuffleService::computeCombinedEntropy", "Digest"),
    )
    .unwrap();
    assert_eq!(resolved.lines, LineRange::new(50, 51));
    assert_eq!(resolved.confidence, Confidence::Heuristic);
}

#[test]
fn multi_line_declaration_ends_at_semicolon() {
    let file = load("class_methods.h");
    let resolved = resolve(&file, &Query::function("addProposal")).unwrap();

    assert_eq!(resolved.lines, LineRange::new(29, 34));
    assert!(resolved.text.trim_end().ends_with("PublicKey const& masterPubKey);"));
    assert_eq!(
        resolved.origin,
        Origin::Symbol {
            kind: NodeKind::FunctionDeclaration,
            qualified_name: "ripple::ShuffleService::addProposal".into(),
        }
    );
    assert_eq!(resolved.confidence, Confidence::Exact);
}

#[test]
fn header_templates_report_template_ranges() {
    let file = load("class_methods.h");

    let err = resolve(&file, &Query::function("inUNLReport")).unwrap_err();
    assert!(matches!(err, ResolveError::Ambiguous { ref candidates, .. } if candidates.len() == 2));

    let resolved = resolve(&file, &Query::function("ripple::processData")).unwrap();
    assert_eq!(resolved.lines, LineRange::new(80, 84));
}

#[test]
fn declared_overloads_stay_beside_a_defined_one() {
    let source = "class C {\n    void f(int a);\n    void f(double d);\n    void f(char c) {}\n};\n";
    let file = SourceFile::parse("mixed.h", source, Grammar::Cpp).unwrap();

    let err = resolve(&file, &Query::function("C::f")).unwrap_err();
    let candidates = match err {
        ResolveError::Ambiguous { candidates, .. } => candidates,
        other => panic!("expected Ambiguous, got {other:?}"),
    };
    assert_eq!(candidates.len(), 3);
    assert_eq!(candidates[2].kind, NodeKind::FunctionDefinition);

    let resolved = resolve(&file, &function_with_signature("C::f", "double")).unwrap();
    assert_eq!(resolved.lines, LineRange::line(3));
}
