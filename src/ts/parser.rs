use crate::pool::with_parser;
use crate::range::LineRange;
use crate::ts::errors::ParseError;
use crate::ts::tree::SyntaxTree;
use ast_grep_language::{LanguageExt, SupportLang};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tree_sitter::{Parser, Tree};

/// Extensions parsed with the C++ grammar.
const CPP_EXTENSIONS: &[&str] = &["cpp", "cc", "cxx", "c++", "hpp", "h", "hxx", "h++", "ipp"];

/// Language grammar used to parse a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grammar {
    #[default]
    Cpp,
    C,
}

impl Grammar {
    /// Parse a grammar identifier as written in a manifest or on the command line.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cpp" | "c++" | "cxx" => Some(Grammar::Cpp),
            "c" => Some(Grammar::C),
            _ => None,
        }
    }

    /// Pick a grammar from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, ParseError> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("c") => Ok(Grammar::C),
            Some(ext) if CPP_EXTENSIONS.contains(&ext) => Ok(Grammar::Cpp),
            _ => Err(ParseError::UnsupportedLanguage {
                path: path.to_path_buf(),
                supported: supported_extensions(),
            }),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Grammar::Cpp => "cpp",
            Grammar::C => "c",
        }
    }

    fn support_lang(self) -> SupportLang {
        match self {
            Grammar::Cpp => SupportLang::Cpp,
            Grammar::C => SupportLang::C,
        }
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Grammar {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Grammar::parse(s).ok_or_else(|| ParseError::UnknownGrammar {
            name: s.to_string(),
        })
    }
}

fn supported_extensions() -> String {
    CPP_EXTENSIONS
        .iter()
        .chain(std::iter::once(&"c"))
        .map(|ext| format!(".{ext}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tree-sitter parser wrapper for one grammar.
pub struct SourceParser {
    parser: Parser,
    grammar: Grammar,
}

impl SourceParser {
    pub fn new(grammar: Grammar) -> Result<Self, ParseError> {
        let mut parser = Parser::new();
        let ts_lang = grammar.support_lang().get_ts_language();
        parser
            .set_language(&ts_lang)
            .map_err(|_| ParseError::LanguageSet {
                grammar: grammar.name(),
            })?;

        Ok(Self { parser, grammar })
    }

    pub fn grammar(&self) -> Grammar {
        self.grammar
    }

    /// Parse source text into a raw tree-sitter tree.
    ///
    /// Malformed input still yields a tree; `None` only when the parser
    /// gives up entirely.
    pub fn parse(&mut self, source: &str) -> Option<Tree> {
        self.parser.parse(source, None)
    }

    /// Parse source text into a [`SourceFile`].
    pub fn parse_file(
        &mut self,
        path: impl Into<PathBuf>,
        text: String,
    ) -> Result<SourceFile, ParseError> {
        let path = path.into();
        let tree = self
            .parse(&text)
            .ok_or_else(|| ParseError::ParseFailed { path: path.clone() })?;
        let syntax = SyntaxTree::build(&tree, &text);
        Ok(SourceFile::new(path, self.grammar, text, syntax))
    }
}

/// Immutable snapshot of a file's text together with its syntax tree.
#[derive(Debug, Clone)]
pub struct SourceFile {
    path: PathBuf,
    grammar: Grammar,
    text: String,
    line_starts: Vec<usize>,
    tree: SyntaxTree,
}

impl SourceFile {
    fn new(path: PathBuf, grammar: Grammar, text: String, tree: SyntaxTree) -> Self {
        let line_starts = line_starts(&text);
        Self {
            path,
            grammar,
            text,
            line_starts,
            tree,
        }
    }

    /// Parse `text` with a pooled parser for `grammar`.
    pub fn parse(
        path: impl Into<PathBuf>,
        text: impl Into<String>,
        grammar: Grammar,
    ) -> Result<Self, ParseError> {
        let path = path.into();
        let text = text.into();
        with_parser(grammar, move |parser| parser.parse_file(path, text))?
    }

    /// Read and parse a file. Without an explicit grammar it is picked by extension.
    pub fn read(path: &Path, grammar: Option<Grammar>) -> Result<Self, ParseError> {
        let grammar = match grammar {
            Some(grammar) => grammar,
            None => Grammar::from_path(path)?,
        };
        let text = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, text, grammar)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn grammar(&self) -> Grammar {
        self.grammar
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tree(&self) -> &SyntaxTree {
        &self.tree
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Text of the given lines, without the final line terminator.
    ///
    /// Lines past the end of the file are ignored.
    pub fn slice_lines(&self, range: LineRange) -> &str {
        let count = self.line_count();
        if range.start == 0 || range.start > count {
            return "";
        }
        let end = range.end.min(count);
        let from = self.line_starts[range.start - 1];
        let to = if end < count {
            self.line_starts[end]
        } else {
            self.text.len()
        };

        let slice = &self.text[from..to];
        let slice = slice.strip_suffix('\n').unwrap_or(slice);
        slice.strip_suffix('\r').unwrap_or(slice)
    }

    /// Text of a single line, without its terminator.
    pub fn line(&self, line: usize) -> &str {
        self.slice_lines(LineRange::line(line))
    }

    pub fn has_errors(&self) -> bool {
        self.tree.node(self.tree.root()).has_error
    }
}

/// Byte offset of the first character of every line.
fn line_starts(text: &str) -> Vec<usize> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut starts = vec![0];
    starts.extend(
        text.bytes()
            .enumerate()
            .filter(|(index, byte)| *byte == b'\n' && index + 1 < text.len())
            .map(|(index, _)| index + 1),
    );
    starts
}
