use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to set {grammar} grammar for parser")]
    LanguageSet { grammar: &'static str },

    #[error("tree-sitter returned no tree for {path}")]
    ParseFailed { path: PathBuf },

    #[error("no grammar for {path}; supported extensions: {supported}")]
    UnsupportedLanguage { path: PathBuf, supported: String },

    #[error("unknown grammar identifier '{name}' (expected 'cpp' or 'c')")]
    UnknownGrammar { name: String },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Clone for ParseError {
    fn clone(&self) -> Self {
        match self {
            ParseError::LanguageSet { grammar } => ParseError::LanguageSet { grammar: *grammar },
            ParseError::ParseFailed { path } => ParseError::ParseFailed { path: path.clone() },
            ParseError::UnsupportedLanguage { path, supported } => {
                ParseError::UnsupportedLanguage {
                    path: path.clone(),
                    supported: supported.clone(),
                }
            }
            ParseError::UnknownGrammar { name } => ParseError::UnknownGrammar { name: name.clone() },
            // io::Error is not Clone; keep its kind and message.
            ParseError::Io { path, source } => ParseError::Io {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
        }
    }
}
