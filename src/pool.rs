//! Thread-local parser pooling.
//!
//! Each worker thread keeps one parser per grammar. A parser is created on
//! first use and reused for every later file parsed on that thread.

use crate::ts::{Grammar, ParseError, SourceParser};
use std::cell::RefCell;
use std::collections::HashMap;

thread_local! {
    static PARSERS: RefCell<HashMap<Grammar, SourceParser>> = RefCell::new(HashMap::new());
}

/// Execute `f` with this thread's pooled parser for `grammar`.
///
/// # Example
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use projected_source::pool::with_parser;
/// use projected_source::ts::Grammar;
///
/// let tree = with_parser(Grammar::Cpp, |parser| parser.parse("int x;"))?;
/// assert!(tree.is_some());
/// # Ok(())
/// # }
/// ```
pub fn with_parser<F, R>(grammar: Grammar, f: F) -> Result<R, ParseError>
where
    F: FnOnce(&mut SourceParser) -> R,
{
    PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        let parser = match parsers.entry(grammar) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(SourceParser::new(grammar)?)
            }
        };
        Ok(f(parser))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooled_parsers_are_per_grammar() {
        let cpp = with_parser(Grammar::Cpp, |parser| parser.grammar()).unwrap();
        let c = with_parser(Grammar::C, |parser| parser.grammar()).unwrap();
        assert_eq!(cpp, Grammar::Cpp);
        assert_eq!(c, Grammar::C);
    }
}
