//! Projected Source: syntax-aware extraction of live C/C++ snippets
//!
//! Documentation embeds fragments of a codebase by naming them symbolically
//! (a function, a type, a `//@@start tag` marker, explicit lines, or a marker
//! inside a named scope). This crate resolves such queries to exact line
//! ranges and text, and checks which lines of a diff are not represented by
//! any known projection.
//!
//! # Architecture
//!
//! Each file is parsed once with tree-sitter into an index arena
//! ([`ts::SyntaxTree`]). The [`ts::locator`] and [`marker`] modules turn a
//! [`Query`] into line ranges over that arena, [`resolve`] combines them into a
//! [`ResolvedRange`], and [`coverage`] subtracts claimed ranges from a
//! [`ChangeSet`] using the interval arithmetic in [`range`].
//!
//! # Guarantees
//!
//! - Malformed source never aborts parsing; matches touching syntax errors are refused
//! - Ambiguous queries report every candidate instead of picking one
//! - Identical content and query give byte-identical results
//!
//! # Example
//!
//! ```no_run
//! use projected_source::{resolve, Query, SourceFile};
//! use projected_source::ts::Grammar;
//!
//! let file = SourceFile::read("src/peer.cpp".as_ref(), Some(Grammar::Cpp))?;
//! let query = Query::function("PeerImp::onMessage").with_marker("setup");
//! let resolved = resolve(&file, &query)?;
//! println!("{}:{}\n{}", resolved.path.display(), resolved.lines, resolved.text);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod coverage;
pub mod diff;
pub mod marker;
pub mod pipeline;
pub mod pool;
pub mod query;
pub mod range;
pub mod resolve;
pub mod strip;
pub mod ts;

// Re-exports
pub use config::{load_from_path, load_from_str, ConfigError, Manifest};
pub use coverage::{validate, ChangeSet, CoverageReport, KnownProjections};
pub use diff::DiffOptions;
pub use marker::{Marker, MarkerError};
pub use query::{Query, QueryError, Target};
pub use range::LineRange;
pub use resolve::{resolve, Confidence, Origin, ResolveError, ResolvedRange};
pub use strip::{StripError, StripPlan, StripResult};
pub use ts::{Grammar, ParseError, SourceFile};
