//! One entry point for the whole pipeline.
//!
//! A [`Session`] carries everything that must survive between runs: the
//! interpreter (globals, accumulated bindings, I/O streams) and the node-id
//! allocator. The CLI's `run` subcommand uses one run; the REPL reuses the
//! same session for every line.

use std::io::{BufRead, Write};

use log::{debug, info};

use crate::ast::NodeIds;
use crate::error::{ErrorSink, LoxError, Warning};
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::scanner::scan;

/// Outcome of [`Session::run`]. Details are in the error sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Ok,
    /// Scanning, parsing or resolving reported an error; nothing ran.
    StaticError,
    /// Execution started and stopped on a runtime error.
    RuntimeError,
}

pub struct Session {
    interpreter: Interpreter,
    ids: NodeIds,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::from_interpreter(Interpreter::new())
    }

    pub fn with_io(output: Box<dyn Write>, input: Box<dyn BufRead>) -> Self {
        Self::from_interpreter(Interpreter::with_io(output, input))
    }

    fn from_interpreter(interpreter: Interpreter) -> Self {
        Self {
            interpreter,
            ids: NodeIds::new(),
        }
    }

    pub fn interpreter(&mut self) -> &mut Interpreter {
        &mut self.interpreter
    }

    /// Scan, parse, resolve and interpret `source`. Each static phase runs
    /// only if the ones before it reported no errors. Runtime errors are
    /// pushed into `sink` as well.
    pub fn run(&mut self, source: &str, sink: &mut dyn ErrorSink) -> RunStatus {
        let mut sink = CountingSink::new(sink);

        let tokens = scan(source, &mut sink);
        debug!("Scanned {} token(s)", tokens.len());

        let mut parser = Parser::with_ids(tokens, std::mem::take(&mut self.ids));
        let statements = parser.parse(&mut sink);
        self.ids = parser.into_ids();

        if sink.errors > 0 {
            info!("Static errors before resolution: {}", sink.errors);
            return RunStatus::StaticError;
        }

        let bindings = Resolver::new(&mut sink).resolve(&statements);

        if sink.errors > 0 {
            info!("Resolver reported {} error(s)", sink.errors);
            return RunStatus::StaticError;
        }

        match self.interpreter.interpret(&statements, bindings) {
            Ok(()) => RunStatus::Ok,
            Err(error) => {
                sink.error(error);
                RunStatus::RuntimeError
            }
        }
    }
}

/// Forwards to another sink while counting errors, so the driver can tell
/// whether a phase failed without knowing the sink's concrete type.
struct CountingSink<'a> {
    inner: &'a mut dyn ErrorSink,
    errors: usize,
}

impl<'a> CountingSink<'a> {
    fn new(inner: &'a mut dyn ErrorSink) -> Self {
        Self { inner, errors: 0 }
    }
}

impl ErrorSink for CountingSink<'_> {
    fn error(&mut self, error: LoxError) {
        self.errors += 1;
        self.inner.error(error);
    }

    fn warning(&mut self, warning: Warning) {
        self.inner.warning(warning);
    }
}
