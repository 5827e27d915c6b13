//! AST Visitor Infrastructure
//!
//! Every pass over the typed AST implements [`Visitor`] and overrides the
//! node kinds it cares about. The default method for each node family calls
//! the matching `walk_*` function, which visits the node's semantic children
//! in a fixed order:
//!
//! - field access: base variable; subscript: base variable, index
//! - call: arguments left to right; binary op: left, right
//! - record: type name, then each field initializer in listed order
//! - sequence: each expression; assignment: target variable, value
//! - if: test, then-branch, else-branch; while: test, body
//! - for: index declaration, upper bound, body
//! - let: chunk list, body; array: type name, size, initializer
//! - cast: expression, target type
//! - function declaration: formals, result type, body
//! - variable declaration: declared type, initializer
//! - type declaration: its type; record type: each field type; array type: element
//!
//! An override that wants the structural recursion for some variants matches
//! on the node and falls back to `walk_*` for the rest.

use crate::ast::*;
use std::collections::BTreeSet;
use std::fmt;

/// Result type for visitor operations that can fail
pub type VisitorResult<T> = Result<T, VisitorError>;

/// Errors that can occur during AST traversal
#[derive(Debug, Clone, PartialEq)]
pub enum VisitorError {
    /// A simple variable refers to a declaration that was never visited
    UnboundReference { name: String, dec: VarDecId },
}

impl fmt::Display for VisitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitorError::UnboundReference { name, dec } => {
                write!(f, "reference to `{}` ({}) before its declaration", name, dec)
            }
        }
    }
}

impl std::error::Error for VisitorError {}

/// Context for AST traversal, tracking lexical scope depth
#[derive(Debug, Clone, Default)]
pub struct VisitorContext {
    /// Current scope depth
    pub scope_depth: usize,
}

impl VisitorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_scope(&mut self) {
        self.scope_depth += 1;
    }

    pub fn exit_scope(&mut self) {
        self.scope_depth = self.scope_depth.saturating_sub(1);
    }
}

/// Read-only traversal over a typed AST
pub trait Visitor {
    fn visit_chunks(&mut self, ast: &Ast, chunks: &[Chunk]) -> VisitorResult<()> {
        walk_chunks(self, ast, chunks)
    }

    fn visit_chunk(&mut self, ast: &Ast, chunk: &Chunk) -> VisitorResult<()> {
        walk_chunk(self, ast, chunk)
    }

    fn visit_function_dec(&mut self, ast: &Ast, id: FunDecId) -> VisitorResult<()> {
        walk_function_dec(self, ast, id)
    }

    fn visit_var_dec(&mut self, ast: &Ast, id: VarDecId) -> VisitorResult<()> {
        walk_var_dec(self, ast, id)
    }

    fn visit_type_dec(&mut self, ast: &Ast, id: TypeDecId) -> VisitorResult<()> {
        walk_type_dec(self, ast, id)
    }

    fn visit_exp(&mut self, ast: &Ast, id: ExpId) -> VisitorResult<()> {
        walk_exp(self, ast, id)
    }

    fn visit_var(&mut self, ast: &Ast, id: VarId) -> VisitorResult<()> {
        walk_var(self, ast, id)
    }

    fn visit_ty(&mut self, ast: &Ast, id: TyId) -> VisitorResult<()> {
        walk_ty(self, ast, id)
    }
}

pub fn walk_chunks<V: Visitor + ?Sized>(
    visitor: &mut V,
    ast: &Ast,
    chunks: &[Chunk],
) -> VisitorResult<()> {
    for chunk in chunks {
        visitor.visit_chunk(ast, chunk)?;
    }
    Ok(())
}

pub fn walk_chunk<V: Visitor + ?Sized>(visitor: &mut V, ast: &Ast, chunk: &Chunk) -> VisitorResult<()> {
    match chunk {
        Chunk::Functions(decs) => {
            for dec in decs {
                visitor.visit_function_dec(ast, *dec)?;
            }
        }
        Chunk::Types(decs) => {
            for dec in decs {
                visitor.visit_type_dec(ast, *dec)?;
            }
        }
        Chunk::Var(dec) => visitor.visit_var_dec(ast, *dec)?,
    }
    Ok(())
}

pub fn walk_function_dec<V: Visitor + ?Sized>(
    visitor: &mut V,
    ast: &Ast,
    id: FunDecId,
) -> VisitorResult<()> {
    let dec = ast.fun_dec(id);
    for formal in &dec.formals {
        visitor.visit_var_dec(ast, *formal)?;
    }
    if let Some(result) = dec.result {
        visitor.visit_ty(ast, result)?;
    }
    if let Some(body) = dec.body {
        visitor.visit_exp(ast, body)?;
    }
    Ok(())
}

pub fn walk_var_dec<V: Visitor + ?Sized>(visitor: &mut V, ast: &Ast, id: VarDecId) -> VisitorResult<()> {
    let dec = ast.var_dec(id);
    if let Some(type_name) = dec.type_name {
        visitor.visit_ty(ast, type_name)?;
    }
    if let Some(init) = dec.init {
        visitor.visit_exp(ast, init)?;
    }
    Ok(())
}

pub fn walk_type_dec<V: Visitor + ?Sized>(visitor: &mut V, ast: &Ast, id: TypeDecId) -> VisitorResult<()> {
    visitor.visit_ty(ast, ast.type_dec(id).ty_node)
}

pub fn walk_exp<V: Visitor + ?Sized>(visitor: &mut V, ast: &Ast, id: ExpId) -> VisitorResult<()> {
    match &ast.exp(id).kind {
        ExpKind::Nil | ExpKind::Int(_) | ExpKind::Str(_) | ExpKind::Break { .. } => Ok(()),
        ExpKind::Var(var) => visitor.visit_var(ast, *var),
        ExpKind::Call { args, .. } => {
            for arg in args {
                visitor.visit_exp(ast, *arg)?;
            }
            Ok(())
        }
        ExpKind::Op { left, right, .. } => {
            visitor.visit_exp(ast, *left)?;
            visitor.visit_exp(ast, *right)
        }
        ExpKind::Record { type_name, fields } => {
            visitor.visit_ty(ast, *type_name)?;
            for field in fields {
                visitor.visit_exp(ast, field.init)?;
            }
            Ok(())
        }
        ExpKind::Seq(exps) => {
            for exp in exps {
                visitor.visit_exp(ast, *exp)?;
            }
            Ok(())
        }
        ExpKind::Assign { var, exp } => {
            visitor.visit_var(ast, *var)?;
            visitor.visit_exp(ast, *exp)
        }
        ExpKind::If {
            test,
            then_clause,
            else_clause,
        } => {
            visitor.visit_exp(ast, *test)?;
            visitor.visit_exp(ast, *then_clause)?;
            visitor.visit_exp(ast, *else_clause)
        }
        ExpKind::While { test, body } => {
            visitor.visit_exp(ast, *test)?;
            visitor.visit_exp(ast, *body)
        }
        ExpKind::For { index, hi, body } => {
            visitor.visit_var_dec(ast, *index)?;
            visitor.visit_exp(ast, *hi)?;
            visitor.visit_exp(ast, *body)
        }
        ExpKind::Let { chunks, body } => {
            visitor.visit_chunks(ast, chunks)?;
            visitor.visit_exp(ast, *body)
        }
        ExpKind::Array {
            type_name,
            size,
            init,
        } => {
            visitor.visit_ty(ast, *type_name)?;
            visitor.visit_exp(ast, *size)?;
            visitor.visit_exp(ast, *init)
        }
        ExpKind::Cast { exp, target } => {
            visitor.visit_exp(ast, *exp)?;
            visitor.visit_ty(ast, *target)
        }
    }
}

pub fn walk_var<V: Visitor + ?Sized>(visitor: &mut V, ast: &Ast, id: VarId) -> VisitorResult<()> {
    match &ast.var(id).kind {
        VarKind::Simple { .. } => Ok(()),
        VarKind::Field { base, .. } => visitor.visit_var(ast, *base),
        VarKind::Subscript { base, index } => {
            visitor.visit_var(ast, *base)?;
            visitor.visit_exp(ast, *index)
        }
    }
}

pub fn walk_ty<V: Visitor + ?Sized>(visitor: &mut V, ast: &Ast, id: TyId) -> VisitorResult<()> {
    match &ast.ty(id).kind {
        TyKind::Name(_) => Ok(()),
        TyKind::Record(fields) => {
            for field in fields {
                visitor.visit_ty(ast, field.type_name)?;
            }
            Ok(())
        }
        TyKind::Array(element) => visitor.visit_ty(ast, *element),
    }
}

/// Utility visitors
pub mod utils {
    use super::*;

    /// Counts nodes by family
    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct NodeCounter {
        pub exps: usize,
        pub vars: usize,
        pub var_decs: usize,
        pub function_decs: usize,
        pub type_decs: usize,
    }

    impl NodeCounter {
        pub fn count(ast: &Ast) -> Self {
            let mut counter = Self::default();
            // Counting cannot fail.
            let _ = counter.visit_chunks(ast, &ast.root);
            counter
        }
    }

    impl Visitor for NodeCounter {
        fn visit_function_dec(&mut self, ast: &Ast, id: FunDecId) -> VisitorResult<()> {
            self.function_decs += 1;
            walk_function_dec(self, ast, id)
        }

        fn visit_var_dec(&mut self, ast: &Ast, id: VarDecId) -> VisitorResult<()> {
            self.var_decs += 1;
            walk_var_dec(self, ast, id)
        }

        fn visit_type_dec(&mut self, ast: &Ast, id: TypeDecId) -> VisitorResult<()> {
            self.type_decs += 1;
            walk_type_dec(self, ast, id)
        }

        fn visit_exp(&mut self, ast: &Ast, id: ExpId) -> VisitorResult<()> {
            self.exps += 1;
            walk_exp(self, ast, id)
        }

        fn visit_var(&mut self, ast: &Ast, id: VarId) -> VisitorResult<()> {
            self.vars += 1;
            walk_var(self, ast, id)
        }
    }

    /// Every variable declaration inside a function: formals, let
    /// variables, loop indices, and those of nested functions
    #[derive(Debug, Default)]
    pub struct DeclarationCollector {
        pub declared: BTreeSet<VarDecId>,
    }

    impl DeclarationCollector {
        pub fn collect(ast: &Ast, function: FunDecId) -> BTreeSet<VarDecId> {
            let mut collector = Self::default();
            let _ = walk_function_dec(&mut collector, ast, function);
            collector.declared
        }
    }

    impl Visitor for DeclarationCollector {
        fn visit_var_dec(&mut self, ast: &Ast, id: VarDecId) -> VisitorResult<()> {
            self.declared.insert(id);
            walk_var_dec(self, ast, id)
        }
    }
}
