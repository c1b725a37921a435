//! Error types for every stage of the compiler.
//!
//! Reading and lowering report structural problems with the production
//! input, the type checker reports exactly one [`SemanticError`], and code
//! generation can only fail on an internal defect.

use thiserror::Error;

/// A structural problem with the production-line input.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("malformed production input: {0}")]
    Syntax(String),

    #[error("unexpected end of input: '{lhs}' on line {line} needs more productions")]
    UnexpectedEof { lhs: String, line: usize },

    #[error("empty input: expected a derivation tree")]
    Empty,

    #[error("trailing production on line {line} after the end of the tree")]
    TrailingInput { line: usize },

    #[error("terminal '{kind}' on line {line} must carry exactly one lexeme")]
    BadTerminal { kind: String, line: usize },

    #[error("line {line}: expected a production for '{expected}', found '{found}'")]
    UnexpectedProduction {
        expected: String,
        found: String,
        line: usize,
    },

    #[error("line {line}: numeric literal out of range: {text}")]
    BadNumber { text: String, line: usize },
}

/// What went wrong during type checking.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticErrorKind {
    #[error("duplicate procedure")]
    DuplicateProcedure,
    #[error("duplicate symbol")]
    DuplicateSymbol,
    #[error("undeclared symbol")]
    UndeclaredSymbol,
    #[error("call to an undeclared procedure or a variable")]
    UndeclaredOrMisusedCall,
    #[error("wrong number of arguments")]
    ArityMismatch,
    #[error("argument type mismatch")]
    ArgumentTypeMismatch,
    #[error("type mismatch")]
    TypeMismatch,
    #[error("second parameter of wain must be int")]
    EntrySecondParamNotInt,
}

/// The single diagnostic produced when a program fails type checking.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {context}")]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub context: String,
}

impl SemanticError {
    pub fn new(kind: SemanticErrorKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
        }
    }
}

/// Raised when code generation meets state the checker should have ruled out.
#[derive(Error, Debug)]
#[error("internal compiler error: {0}")]
pub struct InternalError(pub String);

/// Umbrella error for a whole compilation.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Semantic(#[from] SemanticError),

    #[error(transparent)]
    Internal(#[from] InternalError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CompileResult<T> = Result<T, CompileError>;
