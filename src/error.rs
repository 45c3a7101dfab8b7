//! Centralised error hierarchy for the **Rox interpreter**.
//!
//! All phases (scanner, parser, resolver, runtime) convert their failure modes
//! into one of the variants defined here. Static phases never stop at the first
//! problem: they push each [`LoxError`] into an [`ErrorSink`] and keep walking.
//! Non-fatal findings travel through the same sink as a [`Warning`].
//!
//! The module **does not** print diagnostics itself.

use std::fmt;
use std::io;
use thiserror::Error;

use log::info;

use crate::token::{Token, TokenType};

/// Canonical error type used throughout the interpreter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoxError {
    /// Lexical (scanner) error with source line information.
    #[error("[line {line}] Error: {message}")]
    Lex {
        /// Human‑readable description.
        message: String,

        /// 1‑based line where the error occurred.
        line: usize,
    },

    /// Syntactic (parser) error. `location` is either empty, ` at end` or
    /// ` at 'lexeme'`.
    #[error("[line {line}] Error{location}: {message}")]
    Parse {
        message: String,
        location: String,
        line: usize,
    },

    /// Static‑analysis failure (scope rules, misplaced `return`/`break`, …).
    #[error("[line {line}] Error{location}: {message}")]
    Resolve {
        message: String,
        location: String,
        line: usize,
    },

    /// Runtime evaluation error, reported with the offending token's line.
    #[error("{message}\n[line {line}]")]
    Runtime { message: String, line: usize },

    /// Wrapper around `std::io::Error` (transparent).  Enables `?` on I/O ops.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Renders the ` at 'x'` / ` at end` suffix for a token.
fn location_of(token: &Token) -> String {
    if token.token_type == TokenType::EOF {
        " at end".to_string()
    } else {
        format!(" at '{}'", token.lexeme)
    }
}

impl LoxError {
    /// Helper constructor for the **scanner**.
    pub fn lex<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Lex error: line={}, msg={}", line, message);

        LoxError::Lex { message, line }
    }

    /// Helper constructor for the **parser**.
    pub fn parse<S: Into<String>>(token: &Token, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Parse error: line={}, msg={}", token.line, message);

        LoxError::Parse {
            message,
            location: location_of(token),
            line: token.line,
        }
    }

    /// Helper constructor for the **resolver**.
    pub fn resolve<S: Into<String>>(token: &Token, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Resolve error: line={}, msg={}", token.line, message);

        LoxError::Resolve {
            message,
            location: location_of(token),
            line: token.line,
        }
    }

    /// Helper constructor for the **interpreter**.
    pub fn runtime<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Runtime error: line={}, msg={}", line, message);

        LoxError::Runtime { message, line }
    }

    /// Source line the error points at, when it has one.
    pub fn line(&self) -> Option<usize> {
        match self {
            LoxError::Lex { line, .. }
            | LoxError::Parse { line, .. }
            | LoxError::Resolve { line, .. }
            | LoxError::Runtime { line, .. } => Some(*line),
            LoxError::Io(_) => None,
        }
    }

    /// `true` for errors produced before interpretation starts.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            LoxError::Lex { .. } | LoxError::Parse { .. } | LoxError::Resolve { .. }
        )
    }
}

/// Crate‑wide `Result` alias.
pub type Result<T> = std::result::Result<T, LoxError>;

/// Non-fatal diagnostic (e.g. an unused local). Never blocks interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub message: String,
    pub line: usize,
}

impl Warning {
    pub fn new<S: Into<String>>(line: usize, msg: S) -> Self {
        Self {
            message: msg.into(),
            line,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Warning: {}", self.line, self.message)
    }
}

/// Receiver for diagnostics. Owned by whoever hosts the pipeline; every phase
/// reports into it without halting its own traversal.
pub trait ErrorSink {
    fn error(&mut self, error: LoxError);

    fn warning(&mut self, warning: Warning);
}

/// Collecting [`ErrorSink`] that keeps diagnostics in arrival order.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<LoxError>,
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> &[LoxError] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Number of errors recorded so far; lets a driver tell whether a given
    /// phase added any.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Drops everything collected so far (REPL lines start clean).
    pub fn clear(&mut self) {
        self.errors.clear();
        self.warnings.clear();
    }
}

impl ErrorSink for Diagnostics {
    fn error(&mut self, error: LoxError) {
        self.errors.push(error);
    }

    fn warning(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }
}
