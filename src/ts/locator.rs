use crate::query::{split_qualified, QualifiedName, Target};
use crate::range::LineRange;
use crate::resolve::{Confidence, ResolveError};
use crate::ts::tree::{NodeId, NodeKind, SyntaxTree};
use serde::Serialize;
use std::collections::HashSet;
use std::ops::Range;
use tracing::{debug, warn};

/// Enclosing namespace/type names, outermost first.
pub type ScopePath = Vec<String>;

/// Most suggestions attached to a `NotFound`.
const MAX_SUGGESTIONS: usize = 3;

/// A node whose kind and qualified name match a target, copied out of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub kind: NodeKind,
    pub qualified_name: String,
    /// Reported lines; for templated entities this is the template declaration.
    pub lines: LineRange,
    #[serde(skip)]
    pub byte_range: Range<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Parameter types without names; pairs a prototype with its definition.
    #[serde(skip)]
    pub signature_key: Option<String>,
    #[serde(skip)]
    pub arity: Option<usize>,
    #[serde(skip)]
    pub arguments: Vec<String>,
    #[serde(skip)]
    pub touches_error: bool,
}

impl Candidate {
    /// `name(sig) @ 12-20` style summary for messages.
    pub fn describe(&self) -> String {
        match &self.signature {
            Some(signature) => format!("{}{} @ {}", self.qualified_name, signature, self.lines),
            None => format!("{} @ {}", self.qualified_name, self.lines),
        }
    }
}

/// Candidates left after filtering, with the confidence of a unique pick.
#[derive(Debug, Clone)]
pub struct Narrowed {
    pub candidates: Vec<Candidate>,
    pub confidence: Confidence,
}

/// Every node matching the target's kind and `name`, in document order.
///
/// No filtering beyond kind and name happens here; error-touching nodes are
/// included and flagged.
pub fn locate_all(tree: &SyntaxTree, target: &Target, name: &QualifiedName) -> Vec<Candidate> {
    let mut found = Vec::new();

    for (id, scope) in scoped_nodes(tree) {
        let node = tree.node(id);
        if !kind_matches(target, node.kind) {
            continue;
        }
        let Some(leaf) = node.name.as_deref() else {
            continue;
        };

        let mut full = scope;
        full.extend(node.declared_scope.iter().cloned());
        if !name.matches(&full, leaf) {
            continue;
        }

        found.push(candidate(tree, id, &full, leaf));
    }

    found
}

/// Filter name matches down by error refusal, declaration dropping and the
/// target's hints.
///
/// Returns a non-empty list; more than one entry means the target is ambiguous.
pub fn narrow(
    tree: &SyntaxTree,
    target: &Target,
    name: &QualifiedName,
) -> Result<Narrowed, ResolveError> {
    let matches = locate_all(tree, target, name);
    if matches.is_empty() {
        return Err(ResolveError::NotFound {
            target: target.to_string(),
            suggestions: suggestions(tree, target, name),
        });
    }

    let (refused, mut usable): (Vec<_>, Vec<_>) =
        matches.into_iter().partition(|c| c.touches_error);
    for candidate in &refused {
        warn!(
            candidate = %candidate.describe(),
            "refusing match that touches a syntax error"
        );
    }
    if usable.is_empty() {
        let lines = refused.first().map(|c| c.lines).unwrap_or(LineRange::line(1));
        return Err(ResolveError::SyntaxError {
            target: target.to_string(),
            lines,
        });
    }

    drop_defined_declarations(&mut usable);

    if let Target::Macro { args, .. } = target {
        usable.retain(|c| {
            args.iter().all(|filter| {
                c.arguments
                    .get(filter.index)
                    .is_some_and(|arg| arg.trim() == filter.value.trim())
            })
        });
        if usable.is_empty() {
            return Err(ResolveError::NotFound {
                target: target.to_string(),
                suggestions: Vec::new(),
            });
        }
    }

    let before_hints = usable.len();
    if let Target::Function {
        signature, arity, ..
    } = target
    {
        let all = usable.clone();
        if let Some(hint) = signature {
            let hint = collapse(hint);
            usable.retain(|c| c.signature.as_deref().is_some_and(|s| s.contains(&hint)));
        }
        if let Some(arity) = arity {
            usable.retain(|c| c.arity == Some(*arity));
        }
        if usable.is_empty() {
            return Err(ResolveError::NotFound {
                target: target.to_string(),
                suggestions: all
                    .iter()
                    .take(MAX_SUGGESTIONS)
                    .map(Candidate::describe)
                    .collect(),
            });
        }
    }

    let confidence = if before_hints == 1 {
        Confidence::Exact
    } else {
        Confidence::Heuristic
    };
    debug!(
        target = %target,
        matched = before_hints,
        remaining = usable.len(),
        "narrowed candidates"
    );

    Ok(Narrowed {
        candidates: usable,
        confidence,
    })
}

/// Remove prototypes whose overload also has a body among the candidates.
///
/// Declarations without a matching definition stay: they are distinct overloads.
fn drop_defined_declarations(candidates: &mut Vec<Candidate>) {
    let defined: HashSet<(String, String)> = candidates
        .iter()
        .filter(|c| c.kind == NodeKind::FunctionDefinition)
        .filter_map(|c| Some((c.qualified_name.clone(), c.signature_key.clone()?)))
        .collect();
    if defined.is_empty() {
        return;
    }

    candidates.retain(|c| {
        c.kind != NodeKind::FunctionDeclaration
            || !c
                .signature_key
                .as_ref()
                .is_some_and(|key| defined.contains(&(c.qualified_name.clone(), key.clone())))
    });
}

/// Locate exactly one node for a name-based target.
pub fn locate(
    tree: &SyntaxTree,
    target: &Target,
    name: &QualifiedName,
) -> Result<(Candidate, Confidence), ResolveError> {
    let mut narrowed = narrow(tree, target, name)?;
    match narrowed.candidates.len() {
        1 => Ok((narrowed.candidates.remove(0), narrowed.confidence)),
        _ => Err(ResolveError::Ambiguous {
            target: target.to_string(),
            candidates: narrowed.candidates,
        }),
    }
}

/// Pre-order walk yielding each node with its enclosing scope path.
fn scoped_nodes(tree: &SyntaxTree) -> Vec<(NodeId, ScopePath)> {
    let mut out = Vec::with_capacity(tree.len());
    let mut stack: Vec<(NodeId, ScopePath)> = vec![(tree.root(), Vec::new())];

    while let Some((id, scope)) = stack.pop() {
        let node = tree.node(id);
        let inner = match node.kind {
            NodeKind::Namespace => {
                let mut inner = scope.clone();
                if let Some(name) = &node.name {
                    inner.extend(split_qualified(name));
                }
                inner
            }
            kind if kind.is_type() => {
                let mut inner = scope.clone();
                inner.extend(node.declared_scope.iter().cloned());
                if let Some(name) = &node.name {
                    inner.push(name.clone());
                }
                inner
            }
            _ => scope.clone(),
        };

        for child in node.children.iter().rev() {
            stack.push((*child, inner.clone()));
        }
        out.push((id, scope));
    }

    out
}

fn kind_matches(target: &Target, kind: NodeKind) -> bool {
    match target {
        Target::Function { .. } => kind.is_function(),
        Target::Type { .. } => kind.is_type(),
        Target::Variable { .. } => kind == NodeKind::Variable,
        Target::Macro { .. } => kind == NodeKind::MacroInvocation,
        Target::MacroDefinition { .. } => kind == NodeKind::MacroDefinition,
        Target::Marker { .. } | Target::Lines { .. } => false,
    }
}

fn candidate(tree: &SyntaxTree, id: NodeId, scope: &[String], leaf: &str) -> Candidate {
    let node = tree.node(id);

    // Report the outermost enclosing template declaration, if any.
    let mut reported = id;
    if node.kind.is_function() || node.kind.is_type() {
        for ancestor in tree.ancestors(id) {
            if tree.node(ancestor).kind == NodeKind::Template {
                reported = ancestor;
            } else {
                break;
            }
        }
    }
    let span = tree.node(reported);

    let mut qualified_name = scope.join("::");
    if !qualified_name.is_empty() {
        qualified_name.push_str("::");
    }
    qualified_name.push_str(leaf);

    Candidate {
        kind: node.kind,
        qualified_name,
        lines: span.lines,
        byte_range: span.byte_range.clone(),
        signature: node.signature.as_ref().map(|s| s.text.clone()),
        signature_key: node.signature.as_ref().map(|s| s.key.clone()),
        arity: node.signature.as_ref().map(|s| s.arity),
        arguments: node.arguments.clone(),
        touches_error: tree.touches_error(id),
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Names of the same kind close to the wanted leaf name.
fn suggestions(tree: &SyntaxTree, target: &Target, name: &QualifiedName) -> Vec<String> {
    let wanted = name.leaf();
    let threshold = (wanted.len() / 3).max(2);

    let mut scored: Vec<(usize, String)> = scoped_nodes(tree)
        .into_iter()
        .filter(|(id, _)| kind_matches(target, tree.node(*id).kind))
        .filter_map(|(id, mut scope)| {
            let node = tree.node(id);
            let leaf = node.name.as_deref()?;
            scope.extend(node.declared_scope.iter().cloned());
            scope.push(leaf.to_string());
            let distance = strsim::levenshtein(wanted, leaf);
            (distance <= threshold).then(|| (distance, scope.join("::")))
        })
        .collect();

    scored.sort();
    scored.dedup_by(|a, b| a.1 == b.1);
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, name)| name)
        .collect()
}
