//! Index arena over a tree-sitter parse tree.
//!
//! The arena is built once per file in document order (pre-order), so a
//! [`NodeId`] comparison is also a source-order comparison. Parent links are
//! plain indices; nothing in the arena borrows from the tree-sitter `Tree`,
//! which is dropped as soon as the arena is built.

use crate::range::LineRange;
use serde::Serialize;
use std::ops::Range;
use tree_sitter::{Node, Tree};

/// Index of a node inside a [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Grammar-independent classification of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Root,
    FunctionDefinition,
    /// A function prototype or in-class method declaration without a body.
    FunctionDeclaration,
    Class,
    Struct,
    Union,
    Enum,
    Namespace,
    Template,
    Variable,
    /// An upper-case identifier used like a function: `FOO(a, b)` or a
    /// function-defining macro `DEFINE_FOO(a, b) { ... }`.
    MacroInvocation,
    MacroDefinition,
    Comment,
    Error,
    Other,
}

impl NodeKind {
    pub fn is_function(self) -> bool {
        matches!(self, NodeKind::FunctionDefinition | NodeKind::FunctionDeclaration)
    }

    pub fn is_type(self) -> bool {
        matches!(
            self,
            NodeKind::Class | NodeKind::Struct | NodeKind::Union | NodeKind::Enum
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::FunctionDefinition => "function-definition",
            NodeKind::FunctionDeclaration => "function-declaration",
            NodeKind::Class => "class",
            NodeKind::Struct => "struct",
            NodeKind::Union => "union",
            NodeKind::Enum => "enum",
            NodeKind::Namespace => "namespace",
            NodeKind::Template => "template",
            NodeKind::Variable => "variable",
            NodeKind::MacroInvocation => "macro-invocation",
            NodeKind::MacroDefinition => "macro-definition",
            NodeKind::Comment => "comment",
            NodeKind::Error => "error",
            NodeKind::Other => "other",
        }
    }
}

/// Parameter list of a function-like node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Parameter list text with whitespace runs collapsed, parentheses included.
    pub text: String,
    /// Parameter types only, names and defaults removed: `(int,conststd::string&)`.
    /// Equal keys mean a prototype and a definition declare the same overload.
    pub key: String,
    pub arity: usize,
}

#[derive(Debug, Clone)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    /// Raw grammar node type, e.g. `function_definition`.
    pub grammar_kind: &'static str,
    /// Unqualified name, if the construct declares one.
    pub name: Option<String>,
    /// Qualifiers written in the declarator itself (`A::B` for `void A::B::f()`).
    pub declared_scope: Vec<String>,
    pub signature: Option<Signature>,
    /// Positional arguments of a macro invocation.
    pub arguments: Vec<String>,
    pub byte_range: Range<usize>,
    pub lines: LineRange,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// The subtree contains an ERROR or MISSING node.
    pub has_error: bool,
}

/// Arena of named syntax nodes for one file.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    nodes: Vec<SyntaxNode>,
}

impl SyntaxTree {
    /// Build the arena from a tree-sitter tree and the text it was parsed from.
    pub fn build(tree: &Tree, source: &str) -> Self {
        let mut nodes: Vec<SyntaxNode> = Vec::new();
        let mut stack: Vec<(Node<'_>, Option<NodeId>)> = vec![(tree.root_node(), None)];

        while let Some((node, parent)) = stack.pop() {
            let id = NodeId(nodes.len() as u32);
            let mut entry = describe(node, source);
            entry.parent = parent;
            if parent.is_none() {
                entry.kind = NodeKind::Root;
            }
            nodes.push(entry);

            if let Some(parent) = parent {
                nodes[parent.index()].children.push(id);
            }

            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node
                .children(&mut cursor)
                .filter(|child| child.is_named() || child.is_error() || child.is_missing())
                .collect();
            for child in children.into_iter().rev() {
                stack.push((child, Some(id)));
            }
        }

        Self { nodes }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in document order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SyntaxNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeId(index as u32), node))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Strict ancestors of `id`, innermost first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    /// True if the node's subtree contains an error, or it sits inside one.
    pub fn touches_error(&self, id: NodeId) -> bool {
        self.node(id).has_error
            || self
                .ancestors(id)
                .any(|ancestor| self.node(ancestor).kind == NodeKind::Error)
    }

    /// Comment nodes in document order, optionally limited to those that
    /// lie entirely within `within`.
    pub fn comments(&self, within: Option<LineRange>) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, node)| node.kind == NodeKind::Comment)
            .filter(|(_, node)| within.map_or(true, |range| range.contains_range(&node.lines)))
            .map(|(id, _)| id)
            .collect()
    }

    /// ERROR and MISSING nodes in document order.
    pub fn error_nodes(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, node)| node.kind == NodeKind::Error)
            .map(|(id, _)| id)
            .collect()
    }
}

fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    &source[node.byte_range()]
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn line_range(node: Node<'_>) -> LineRange {
    let start = node.start_position();
    let end = node.end_position();
    // A node ending at column 0 stops before that row's first character.
    let end_row = if end.column == 0 && end.row > start.row {
        end.row - 1
    } else {
        end.row
    };
    LineRange::new(start.row + 1, end_row + 1)
}

fn describe(node: Node<'_>, source: &str) -> SyntaxNode {
    let mut entry = SyntaxNode {
        kind: NodeKind::Other,
        grammar_kind: node.kind(),
        name: None,
        declared_scope: Vec::new(),
        signature: None,
        arguments: Vec::new(),
        byte_range: node.byte_range(),
        lines: line_range(node),
        parent: None,
        children: Vec::new(),
        has_error: node.has_error(),
    };

    if node.is_error() || node.is_missing() {
        entry.kind = NodeKind::Error;
        return entry;
    }

    match node.kind() {
        "comment" => entry.kind = NodeKind::Comment,
        "namespace_definition" => {
            entry.kind = NodeKind::Namespace;
            entry.name = node
                .child_by_field_name("name")
                .map(|name| collapse_whitespace(text(name, source)).replace(' ', ""));
        }
        "class_specifier" | "struct_specifier" | "union_specifier" | "enum_specifier" => {
            // Without a body this is a forward declaration or a type reference.
            if node.child_by_field_name("body").is_some() {
                entry.kind = match node.kind() {
                    "class_specifier" => NodeKind::Class,
                    "struct_specifier" => NodeKind::Struct,
                    "union_specifier" => NodeKind::Union,
                    _ => NodeKind::Enum,
                };
                if let Some(name) = node.child_by_field_name("name") {
                    if let Some((scope, leaf)) = declarator_name(name, source) {
                        entry.declared_scope = scope;
                        entry.name = Some(leaf);
                    }
                }
            }
        }
        "template_declaration" => entry.kind = NodeKind::Template,
        "function_definition" => describe_function_definition(node, source, &mut entry),
        "declaration" | "field_declaration" => describe_declaration(node, source, &mut entry),
        "preproc_def" | "preproc_function_def" => {
            entry.kind = NodeKind::MacroDefinition;
            entry.name = node
                .child_by_field_name("name")
                .map(|name| text(name, source).to_string());
            if let Some(params) = node.child_by_field_name("parameters") {
                let mut cursor = params.walk();
                let arity = params.named_children(&mut cursor).count();
                let text = collapse_whitespace(text(params, source));
                entry.signature = Some(Signature {
                    key: text.replace(' ', ""),
                    text,
                    arity,
                });
            }
        }
        "call_expression" => {
            let callee = node
                .child_by_field_name("function")
                .filter(|callee| callee.kind() == "identifier")
                .map(|callee| text(callee, source));
            if let Some(callee) = callee.filter(|name| is_macro_name(name)) {
                entry.kind = NodeKind::MacroInvocation;
                entry.name = Some(callee.to_string());
                if let Some(args) = node.child_by_field_name("arguments") {
                    let mut cursor = args.walk();
                    entry.arguments = args
                        .named_children(&mut cursor)
                        .filter(|arg| arg.kind() != "comment")
                        .map(|arg| collapse_whitespace(text(arg, source)))
                        .collect();
                }
            }
        }
        _ => {}
    }

    entry
}

fn describe_function_definition(node: Node<'_>, source: &str, entry: &mut SyntaxNode) {
    entry.kind = NodeKind::FunctionDefinition;

    let Some(declarator) = node
        .child_by_field_name("declarator")
        .and_then(function_declarator)
    else {
        return;
    };

    let name_node = declarator.child_by_field_name("declarator");
    if let Some((scope, leaf)) = name_node.and_then(|name| declarator_name(name, source)) {
        entry.declared_scope = scope;
        entry.name = Some(leaf);
    }
    let params = declarator.child_by_field_name("parameters");
    entry.signature = params.map(|params| signature(params, source));

    // `DEFINE_HOOK(name, ctx) { ... }` parses as a constructor-like definition
    // with no return type and a bare upper-case identifier as its name.
    let bare_identifier = name_node.is_some_and(|name| name.kind() == "identifier");
    let untyped = node.child_by_field_name("type").is_none();
    if bare_identifier
        && untyped
        && entry.declared_scope.is_empty()
        && entry.name.as_deref().is_some_and(is_macro_name)
    {
        entry.kind = NodeKind::MacroInvocation;
        if let Some(params) = params {
            let mut cursor = params.walk();
            entry.arguments = params
                .named_children(&mut cursor)
                .filter(|param| param.kind() != "comment")
                .filter_map(|param| {
                    text(param, source)
                        .split_whitespace()
                        .last()
                        .map(str::to_string)
                })
                .collect();
        }
    }
}

fn describe_declaration(node: Node<'_>, source: &str, entry: &mut SyntaxNode) {
    let Some(declarator) = node.child_by_field_name("declarator") else {
        return;
    };

    if let Some(function) = function_declarator(declarator) {
        let Some((scope, leaf)) = function
            .child_by_field_name("declarator")
            .and_then(|name| declarator_name(name, source))
        else {
            return;
        };
        entry.kind = NodeKind::FunctionDeclaration;
        entry.declared_scope = scope;
        entry.name = Some(leaf);
        entry.signature = function
            .child_by_field_name("parameters")
            .map(|params| signature(params, source));
        return;
    }

    if let Some((scope, leaf)) = declarator_name(declarator, source) {
        entry.kind = NodeKind::Variable;
        entry.declared_scope = scope;
        entry.name = Some(leaf);
    }
}

/// Walk through pointer/reference wrappers down to a `function_declarator`.
///
/// A parenthesized declarator means a function pointer, not a function.
fn function_declarator(node: Node<'_>) -> Option<Node<'_>> {
    let mut current = node;
    loop {
        match current.kind() {
            "function_declarator" => return Some(current),
            "pointer_declarator" | "reference_declarator" | "attributed_declarator" => {
                current = inner_declarator(current)?;
            }
            _ => return None,
        }
    }
}

fn inner_declarator(node: Node<'_>) -> Option<Node<'_>> {
    if let Some(inner) = node.child_by_field_name("declarator") {
        return Some(inner);
    }
    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .find(|child| child.kind().ends_with("declarator") || child.kind().ends_with("identifier"));
    found
}

/// Split a (possibly qualified) declarator name into scope components and
/// the leaf name.
fn declarator_name(node: Node<'_>, source: &str) -> Option<(Vec<String>, String)> {
    let mut scope = Vec::new();
    let mut current = node;

    loop {
        match current.kind() {
            "qualified_identifier" | "nested_namespace_specifier" => {
                if let Some(part) = current.child_by_field_name("scope") {
                    scope.push(collapse_whitespace(text(part, source)));
                }
                current = current.child_by_field_name("name")?;
            }
            "identifier" | "field_identifier" | "type_identifier" | "namespace_identifier"
            | "destructor_name" | "template_function" | "template_type" => {
                return Some((scope, collapse_whitespace(text(current, source))));
            }
            "operator_name" => {
                return Some((scope, operator_name(text(current, source))));
            }
            "pointer_declarator" | "reference_declarator" | "array_declarator"
            | "init_declarator" | "attributed_declarator" => {
                current = inner_declarator(current)?;
            }
            _ => return None,
        }
    }
}

/// `operator ==` → `operator==`, `operator  new` → `operator new`.
fn operator_name(raw: &str) -> String {
    let rest = raw.trim_start_matches("operator").trim();
    if rest.starts_with(|c: char| c.is_ascii_alphabetic()) {
        format!("operator {}", collapse_whitespace(rest))
    } else {
        format!("operator{}", rest.split_whitespace().collect::<String>())
    }
}

fn signature(params: Node<'_>, source: &str) -> Signature {
    let mut cursor = params.walk();
    let parameters: Vec<Node<'_>> = params
        .named_children(&mut cursor)
        .filter(|param| param.kind() != "comment")
        .collect();

    let only_void = parameters.len() == 1 && text(parameters[0], source).trim() == "void";
    let types: Vec<String> = if only_void {
        Vec::new()
    } else {
        parameters
            .iter()
            .map(|param| parameter_type(*param, source))
            .collect()
    };
    Signature {
        text: collapse_whitespace(text(params, source)),
        key: format!("({})", types.join(",")),
        arity: types.len(),
    }
}

/// A parameter's text without its name or default value, whitespace removed.
fn parameter_type(param: Node<'_>, source: &str) -> String {
    let start = param.start_byte();
    let mut end = param.end_byte();
    if let Some(default) = param.child_by_field_name("default_value") {
        end = default.start_byte();
    }

    let mut name = param.child_by_field_name("declarator");
    while let Some(node) = name {
        if node.kind() == "identifier" {
            break;
        }
        name = inner_declarator(node);
    }

    let mut written = String::new();
    match name.filter(|node| node.end_byte() <= end) {
        Some(name) => {
            written.push_str(&source[start..name.start_byte()]);
            written.push_str(&source[name.end_byte()..end]);
        }
        None => written.push_str(&source[start..end]),
    }
    written
        .trim_end()
        .trim_end_matches('=')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Upper-snake-case identifiers are treated as macros: `FOO`, `DEFINE_JS_FN2`.
pub fn is_macro_name(name: &str) -> bool {
    let mut chars = name.chars();
    let leads_ok = chars
        .next()
        .is_some_and(|first| first.is_ascii_uppercase() || first == '_');
    leads_ok
        && name.chars().any(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts::parser::{Grammar, SourceParser};

    fn build(source: &str) -> SyntaxTree {
        let mut parser = SourceParser::new(Grammar::Cpp).unwrap();
        let tree = parser.parse(source).unwrap();
        SyntaxTree::build(&tree, source)
    }

    fn find<'a>(tree: &'a SyntaxTree, kind: NodeKind, name: &str) -> &'a SyntaxNode {
        tree.iter()
            .map(|(_, node)| node)
            .find(|node| node.kind == kind && node.name.as_deref() == Some(name))
            .unwrap_or_else(|| panic!("no {kind:?} named {name}"))
    }

    #[test]
    fn classifies_common_constructs() {
        let tree = build(
            r#"namespace ns {
struct Point { int x; };
class Widget {
public:
    void draw(int scale) const;
    int size() { return 1; }
};
}
void ns::Widget::draw(int scale) const {}
#define LIMIT 42
int counter = 0;
"#,
        );

        assert_eq!(tree.node(tree.root()).kind, NodeKind::Root);
        assert_eq!(find(&tree, NodeKind::Namespace, "ns").lines, LineRange::new(1, 8));
        assert_eq!(find(&tree, NodeKind::Struct, "Point").lines, LineRange::line(2));
        assert_eq!(find(&tree, NodeKind::Class, "Widget").lines, LineRange::new(3, 7));

        let decl = find(&tree, NodeKind::FunctionDeclaration, "draw");
        assert_eq!(decl.lines, LineRange::line(5));
        assert_eq!(decl.signature.as_ref().unwrap().arity, 1);

        let def = find(&tree, NodeKind::FunctionDefinition, "draw");
        assert_eq!(def.declared_scope, vec!["ns".to_string(), "Widget".to_string()]);
        assert_eq!(def.signature.as_ref().unwrap().text, "(int scale)");

        find(&tree, NodeKind::FunctionDefinition, "size");
        find(&tree, NodeKind::MacroDefinition, "LIMIT");
        find(&tree, NodeKind::Variable, "counter");
    }

    #[test]
    fn signature_key_ignores_names_and_defaults() {
        let tree = build(
            "int pack(const char *name, int flags = 0, void (*done)(int));\nint none(void);\n",
        );
        let pack = find(&tree, NodeKind::FunctionDeclaration, "pack");
        let signature = pack.signature.as_ref().unwrap();
        assert_eq!(signature.key, "(constchar*,int,void(*)(int))");
        assert_eq!(signature.arity, 3);

        let none = find(&tree, NodeKind::FunctionDeclaration, "none");
        assert_eq!(none.signature.as_ref().unwrap().key, "()");
        assert_eq!(none.signature.as_ref().unwrap().arity, 0);
    }

    #[test]
    fn arena_is_in_document_order_with_parent_links() {
        let tree = build("int a() { return 1; }\nint b() { return 2; }\n");
        let functions: Vec<_> = tree
            .iter()
            .filter(|(_, node)| node.kind == NodeKind::FunctionDefinition)
            .collect();
        assert_eq!(functions.len(), 2);
        assert!(functions[0].0 < functions[1].0);
        assert_eq!(functions[0].1.name.as_deref(), Some("a"));

        for (id, node) in tree.iter() {
            for child in &node.children {
                assert_eq!(tree.parent(*child), Some(id));
                let child = tree.node(*child);
                assert!(node.byte_range.start <= child.byte_range.start);
                assert!(child.byte_range.end <= node.byte_range.end);
            }
            for pair in node.children.windows(2) {
                assert!(tree.node(pair[0]).byte_range.end <= tree.node(pair[1]).byte_range.start);
            }
        }
    }

    #[test]
    fn function_defining_macro_is_an_invocation() {
        let tree = build("DEFINE_JS_FUNCTION(example, ctx, data) {\n    return 0;\n}\n");
        let node = find(&tree, NodeKind::MacroInvocation, "DEFINE_JS_FUNCTION");
        assert_eq!(node.arguments, vec!["example", "ctx", "data"]);
        assert_eq!(node.lines, LineRange::new(1, 3));
    }

    #[test]
    fn call_style_macro_arguments() {
        let tree = build("void f() {\n    REGISTER_HANDLER(alpha, 2);\n    helper(1);\n}\n");
        let node = find(&tree, NodeKind::MacroInvocation, "REGISTER_HANDLER");
        assert_eq!(node.arguments, vec!["alpha", "2"]);
        assert!(tree
            .iter()
            .all(|(_, node)| node.name.as_deref() != Some("helper")
                || node.kind != NodeKind::MacroInvocation));
    }

    #[test]
    fn errors_are_flagged_not_fatal() {
        let tree = build("void broken( { }\nvoid fine() {}\n");
        assert!(!tree.error_nodes().is_empty());
        assert!(tree.node(tree.root()).has_error);
    }

    #[test]
    fn comments_are_collected_in_order() {
        let tree = build("// one\nint x;\n// two\n");
        let comments = tree.comments(None);
        assert_eq!(comments.len(), 2);
        assert_eq!(tree.node(comments[0]).lines, LineRange::line(1));
        assert_eq!(tree.comments(Some(LineRange::new(2, 3))).len(), 1);
    }

    #[test]
    fn macro_name_heuristic() {
        assert!(is_macro_name("DEFINE_JS_FUNCTION"));
        assert!(is_macro_name("_ASSERT2"));
        assert!(!is_macro_name("helper"));
        assert!(!is_macro_name("Widget"));
        assert!(!is_macro_name("___"));
        assert!(!is_macro_name("2FAST"));
    }

    #[test]
    fn operator_names_are_normalized() {
        assert_eq!(operator_name("operator =="), "operator==");
        assert_eq!(operator_name("operator[]"), "operator[]");
        assert_eq!(operator_name("operator  new"), "operator new");
    }
}
