//! Escape Analysis
//!
//! A variable escapes when it is referenced from a lexical scope nested
//! strictly inside the scope that declares it. Function declarations,
//! `for` loops and `let` blocks each open a new scope level; formals and
//! loop indices belong to the level their construct opens.
//!
//! Escape status is sticky: once a cross-scope reference is seen, later
//! same-scope references do not clear it. Locked declarations (loop indices)
//! never take the same-scope shortcut; their status is driven only by
//! cross-scope references.
//!
//! The result is an explicit [`EscapeMap`] rather than a flag on the
//! declaration node.

use crate::ast::{Ast, ExpId, ExpKind, FunDecId, VarDecId, VarId, VarKind};
use crate::visitor::{
    walk_exp, walk_function_dec, walk_var, walk_var_dec, Visitor, VisitorContext, VisitorError,
    VisitorResult,
};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Escape analysis errors
///
/// These are precondition violations of the typed AST, never user errors.
#[derive(Debug, Clone, PartialEq)]
pub enum EscapeError {
    /// A simple variable refers to a declaration that was never visited
    UnboundReference { name: String, dec: VarDecId },
    /// Any other traversal failure
    Traversal(VisitorError),
}

impl fmt::Display for EscapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscapeError::UnboundReference { name, dec } => {
                write!(f, "variable `{}` ({}) referenced outside any visible declaration", name, dec)
            }
            EscapeError::Traversal(err) => write!(f, "escape analysis failed: {}", err),
        }
    }
}

impl std::error::Error for EscapeError {}

impl From<VisitorError> for EscapeError {
    fn from(err: VisitorError) -> Self {
        match err {
            VisitorError::UnboundReference { name, dec } => EscapeError::UnboundReference { name, dec },
            other => EscapeError::Traversal(other),
        }
    }
}

/// Escape status of every variable declaration reachable from the root
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscapeMap {
    entries: BTreeMap<VarDecId, bool>,
}

impl EscapeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a declaration as not escaping, keeping any existing status
    pub fn declare(&mut self, dec: VarDecId) {
        self.entries.entry(dec).or_insert(false);
    }

    pub fn mark_escaped(&mut self, dec: VarDecId) {
        self.entries.insert(dec, true);
    }

    /// `None` when the declaration was never analyzed
    pub fn get(&self, dec: VarDecId) -> Option<bool> {
        self.entries.get(&dec).copied()
    }

    pub fn is_escaped(&self, dec: VarDecId) -> bool {
        self.get(dec).unwrap_or(false)
    }

    pub fn contains(&self, dec: VarDecId) -> bool {
        self.entries.contains_key(&dec)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Escaped declarations in handle order
    pub fn escaped(&self) -> impl Iterator<Item = VarDecId> + '_ {
        self.entries
            .iter()
            .filter(|(_, escaped)| **escaped)
            .map(|(dec, _)| *dec)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Compute the escape map of a compilation unit
pub fn analyze(ast: &Ast) -> Result<EscapeMap, EscapeError> {
    let mut analyzer = EscapeAnalyzer::new();
    analyzer.visit_chunks(ast, &ast.root)?;
    debug!(
        "escape analysis: {} declarations, {} escaped",
        analyzer.escapes.len(),
        analyzer.escapes.escaped().count()
    );
    Ok(analyzer.escapes)
}

/// Single-pass escape analyzer
pub struct EscapeAnalyzer {
    context: VisitorContext,
    /// Scope depth at which each declaration was seen
    declared_at: HashMap<VarDecId, usize>,
    escapes: EscapeMap,
}

impl EscapeAnalyzer {
    pub fn new() -> Self {
        Self {
            context: VisitorContext::new(),
            declared_at: HashMap::new(),
            escapes: EscapeMap::new(),
        }
    }

    fn scoped<F>(&mut self, f: F) -> VisitorResult<()>
    where
        F: FnOnce(&mut Self) -> VisitorResult<()>,
    {
        self.context.enter_scope();
        let result = f(self);
        self.context.exit_scope();
        result
    }

    fn reference(&mut self, ast: &Ast, name: &str, def: VarDecId) -> VisitorResult<()> {
        let declared_at = match self.declared_at.get(&def) {
            Some(depth) => *depth,
            None => {
                return Err(VisitorError::UnboundReference {
                    name: name.to_string(),
                    dec: def,
                })
            }
        };
        let depth = self.context.scope_depth;
        if declared_at == depth {
            trace!(
                "`{}` used in its own scope (depth {}, locked: {})",
                name,
                depth,
                ast.var_dec(def).locked
            );
        } else if !self.escapes.is_escaped(def) {
            debug!(
                "`{}` escapes: declared at depth {}, used at depth {}",
                name, declared_at, depth
            );
            self.escapes.mark_escaped(def);
        }
        Ok(())
    }
}

impl Default for EscapeAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Visitor for EscapeAnalyzer {
    fn visit_function_dec(&mut self, ast: &Ast, id: FunDecId) -> VisitorResult<()> {
        self.scoped(|this| walk_function_dec(this, ast, id))
    }

    fn visit_var_dec(&mut self, ast: &Ast, id: VarDecId) -> VisitorResult<()> {
        self.declared_at.insert(id, self.context.scope_depth);
        self.escapes.declare(id);
        walk_var_dec(self, ast, id)
    }

    fn visit_exp(&mut self, ast: &Ast, id: ExpId) -> VisitorResult<()> {
        match ast.exp(id).kind {
            ExpKind::For { .. } | ExpKind::Let { .. } => self.scoped(|this| walk_exp(this, ast, id)),
            _ => walk_exp(self, ast, id),
        }
    }

    fn visit_var(&mut self, ast: &Ast, id: VarId) -> VisitorResult<()> {
        match &ast.var(id).kind {
            VarKind::Simple { name, def } => self.reference(ast, name, *def),
            _ => walk_var(self, ast, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstBuilder, Chunk, Oper};

    #[test]
    fn test_same_scope_reference_does_not_escape() {
        let mut b = AstBuilder::new();
        let int = b.int_ty();
        let a = b.formal("a", int);
        let bb = b.formal("b", int);
        let left = b.read(a);
        let right = b.read(bb);
        let sum = b.op(left, Oper::Add, right);
        let f = b.function("add", vec![a, bb], Some(int));
        b.define(f, sum);
        let ast = b.finish(vec![Chunk::Functions(vec![f])]);

        let escapes = analyze(&ast).unwrap();
        assert_eq!(escapes.get(a), Some(false));
        assert_eq!(escapes.get(bb), Some(false));
    }

    #[test]
    fn test_escaped_is_sticky() {
        let mut b = AstBuilder::new();
        let zero = b.int(0);
        let x = b.var_dec("x", None, zero);
        // Nested use first, then a same-scope use.
        let inner_read = b.read(x);
        let inner = b.let_exp(Vec::new(), inner_read);
        let outer_read = b.read(x);
        let body = b.seq(vec![inner, outer_read]);
        let exp = b.let_exp(vec![Chunk::Var(x)], body);
        let f = b.function("_main", vec![], None);
        b.define(f, exp);
        let ast = b.finish(vec![Chunk::Functions(vec![f])]);

        let escapes = analyze(&ast).unwrap();
        assert!(escapes.is_escaped(x));
    }

    #[test]
    fn test_unbound_reference_is_reported() {
        let mut b = AstBuilder::new();
        let zero = b.int(0);
        let x = b.var_dec("x", None, zero);
        let read = b.read(x);
        let f = b.function("_main", vec![], None);
        b.define(f, read);
        // `x` is never declared in a visited chunk.
        let ast = b.finish(vec![Chunk::Functions(vec![f])]);

        match analyze(&ast) {
            Err(EscapeError::UnboundReference { name, dec }) => {
                assert_eq!(name, "x");
                assert_eq!(dec, x);
            }
            other => panic!("expected an unbound reference, got {:?}", other),
        }
    }

    #[test]
    fn test_escape_map_serializes() {
        let mut escapes = EscapeMap::new();
        escapes.declare(VarDecId(0));
        escapes.mark_escaped(VarDecId(1));
        let json = escapes.to_json().unwrap();
        let back: EscapeMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, escapes);
        assert_eq!(back.escaped().collect::<Vec<_>>(), vec![VarDecId(1)]);
    }
}
