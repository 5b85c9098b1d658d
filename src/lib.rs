//! nex: a lexer generator with structural regular expressions.
//!
//! Nex consumes a source file describing nested regular expressions with
//! attached action code and emits a self-contained Rust program that
//! tokenises a rune stream at runtime. A rule may carry a nested scope of
//! sub-rules that re-scan only the text it matched (structural regular
//! expressions in Rob Pike's sense).
//!
//! The pipeline: `parser` reads the rule tree, `regex` parses each
//! pattern, `graph` builds one NFA and one DFA per scope, and `writer`
//! splices the compiled tables and the `lexer` runtime into the generated
//! program. `exec` ties the stages to files and flags for the `nex`
//! binary.

pub mod exec;
pub mod graph;
pub mod lexer;
pub mod parser;
pub mod regex;
pub mod writer;


use thiserror::Error;

pub use exec::{execute_with_params, Params};
pub use parser::{parse_nex, NexProgram};
pub use regex::RegexError;
pub use writer::LexerBuilder;

/// Nex source grammar errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unmatched '{{'")]
    UnmatchedLBrace,
    #[error("unmatched '}}'")]
    UnmatchedRBrace,
    #[error("unmatched '<'")]
    UnmatchedLAngle,
    #[error("unmatched regex delimiter")]
    UnmatchedDelimiter,
    #[error("unexpected EOF")]
    UnexpectedEof,
    #[error("unexpected newline")]
    UnexpectedNewline,
}

/// Errors that can occur while generating a lexer. The first error in a
/// pipeline stage aborts it; later stages do not run. Every source-level
/// error carries the line:column it was found at.
#[derive(Debug, Error)]
pub enum NexError {
    #[error("{line}:{col}: {kind}")]
    Parse {
        line: usize,
        col: usize,
        kind: ParseErrorKind,
    },
    #[error("{line}:{col}: {}", .source.message)]
    Regex {
        line: usize,
        col: usize,
        source: RegexError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
