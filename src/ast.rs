//! Syntax tree shared by the parser, resolver and interpreter.
//!
//! Node families live in [`crate::expr`] and [`crate::stmt`]; this module adds
//! node identity. The resolver's binding table is keyed by [`ExprId`], never by
//! node content, so two textually identical `x` references stay distinct.

use serde::Serialize;

pub use crate::expr::{Expr, LiteralValue};
pub use crate::stmt::{FunctionDecl, Stmt};

/// Stable identity of a bindable expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExprId(pub usize);

/// Monotonic allocator for [`ExprId`]s.
///
/// A session keeps one of these across runs so ids minted for a REPL line never
/// collide with ids still referenced by closures from earlier lines.
#[derive(Debug, Default, Clone)]
pub struct NodeIds {
    next: usize,
}

impl NodeIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> ExprId {
        let id = ExprId(self.next);
        self.next += 1;
        id
    }
}
