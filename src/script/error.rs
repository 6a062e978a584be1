use thiserror::Error;

use crate::script::token::Span;

/// Compile-stage failures. Every variant carries the source position of the
/// offending token or statement so callers can point back at the script.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("{line}:{col}: {message}")]
    Lex {
        message: String,
        line: usize,
        col: usize,
    },

    #[error("{line}:{col}: {message}")]
    Parse {
        message: String,
        line: usize,
        col: usize,
    },

    #[error("{line}:{col}: the {kind} '{name}' has already been defined")]
    DuplicateSymbol {
        name: String,
        kind: SymbolKind,
        line: usize,
        col: usize,
    },

    #[error("{line}:{col}: '{name}' is not a defined label or subroutine")]
    UnresolvedSymbol {
        name: String,
        line: usize,
        col: usize,
    },

    #[error("{line}:{col}: {message}")]
    StackImbalance {
        message: String,
        line: usize,
        col: usize,
    },

    #[error("program is {len} bytes but the device script memory holds {capacity}")]
    ProgramTooLarge { len: usize, capacity: usize },

    #[error("{line}:{col}: too many literals ({count} > {limit}) in a row: this would overflow the stack")]
    TooManyLiterals {
        count: usize,
        limit: usize,
        line: usize,
        col: usize,
    },

    #[error("too many subroutines: the limit for this device is {limit}")]
    TooManySubroutines { limit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Label,
    Subroutine,
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolKind::Label => write!(f, "label"),
            SymbolKind::Subroutine => write!(f, "subroutine"),
        }
    }
}

impl CompileError {
    pub fn lex(message: impl Into<String>, span: Span) -> Self {
        CompileError::Lex {
            message: message.into(),
            line: span.line,
            col: span.col,
        }
    }

    pub fn parse(message: impl Into<String>, span: Span) -> Self {
        CompileError::Parse {
            message: message.into(),
            line: span.line,
            col: span.col,
        }
    }

    /// Line number the error points at, if it carries one.
    pub fn line(&self) -> Option<usize> {
        match self {
            CompileError::Lex { line, .. }
            | CompileError::Parse { line, .. }
            | CompileError::DuplicateSymbol { line, .. }
            | CompileError::UnresolvedSymbol { line, .. }
            | CompileError::StackImbalance { line, .. }
            | CompileError::TooManyLiterals { line, .. } => Some(*line),
            CompileError::ProgramTooLarge { .. } | CompileError::TooManySubroutines { .. } => None,
        }
    }
}
