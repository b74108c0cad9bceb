//! Tree-sitter integration for C and C++ sources.
//!
//! Files are parsed once into an index arena ([`SyntaxTree`]) that carries
//! kind, name, qualifiers and line ranges for each named node. The
//! [`locator`] searches that arena for query targets.

pub mod errors;
pub mod locator;
pub mod parser;
pub mod tree;

pub use errors::ParseError;
pub use locator::{locate, locate_all, narrow, Candidate, Narrowed, ScopePath};
pub use parser::{Grammar, SourceFile, SourceParser};
pub use tree::{is_macro_name, NodeId, NodeKind, Signature, SyntaxNode, SyntaxTree};
