//! Typed Abstract Syntax Tree
//!
//! Nodes live in per-kind arenas owned by [`Ast`] and are referred to by
//! small integer handles. Handles are stable for the lifetime of the tree,
//! so passes key their side tables (escape map, capture lists, loop exits,
//! local storage) by handle instead of by node address.
//!
//! Every expression, variable, declaration and syntactic type carries an
//! optional resolved [`TypeId`]. It is written exactly once by the type
//! checker; the passes in this crate only read it.

use crate::types::{Field, Type, TypeId, TypeTable};
use crate::visitor::{walk_exp, Visitor, VisitorResult};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! node_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

node_id!(
    /// Handle to an expression node
    ExpId, "e"
);
node_id!(
    /// Handle to an lvalue node
    VarId, "v"
);
node_id!(
    /// Handle to a variable declaration (locals, formals, loop indices)
    VarDecId, "vd"
);
node_id!(
    /// Handle to a function declaration
    FunDecId, "fd"
);
node_id!(
    /// Handle to a type declaration
    TypeDecId, "td"
);
node_id!(
    /// Handle to a syntactic type
    TyId, "ty"
);

/// Binary operators; every operand and result is an `int`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Oper {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Oper {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Oper::Eq | Oper::Ne | Oper::Lt | Oper::Le | Oper::Gt | Oper::Ge
        )
    }
}

/// `name = init` inside a record construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInit {
    pub name: String,
    pub init: ExpId,
}

/// Expression variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExpKind {
    Nil,
    Int(i32),
    Str(String),
    /// Read of an lvalue
    Var(VarId),
    /// Call of a resolved function declaration
    Call { callee: FunDecId, args: Vec<ExpId> },
    Op { left: ExpId, oper: Oper, right: ExpId },
    Record { type_name: TyId, fields: Vec<FieldInit> },
    Seq(Vec<ExpId>),
    Assign { var: VarId, exp: ExpId },
    /// The else branch is mandatory; a missing one is normalized to `()`
    If { test: ExpId, then_clause: ExpId, else_clause: ExpId },
    While { test: ExpId, body: ExpId },
    /// The index declaration holds the lower bound as its initializer
    For { index: VarDecId, hi: ExpId, body: ExpId },
    /// `target` is the enclosing `While`/`For`, filled in by the binder
    Break { target: Option<ExpId> },
    Let { chunks: ChunkList, body: ExpId },
    Array { type_name: TyId, size: ExpId, init: ExpId },
    Cast { exp: ExpId, target: TyId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exp {
    pub kind: ExpKind,
    pub ty: Option<TypeId>,
}

/// Lvalue variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VarKind {
    Simple { name: String, def: VarDecId },
    Field { base: VarId, name: String },
    Subscript { base: VarId, index: ExpId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Var {
    pub kind: VarKind,
    pub ty: Option<TypeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDec {
    pub name: String,
    /// Declared type, absent when inferred from the initializer
    pub type_name: Option<TyId>,
    /// Absent for formal parameters
    pub init: Option<ExpId>,
    /// Set on loop indices: a same-scope reference never clears escape status
    pub locked: bool,
    pub ty: Option<TypeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDec {
    pub name: String,
    pub formals: Vec<VarDecId>,
    pub result: Option<TyId>,
    /// Absent for primitives provided by the runtime
    pub body: Option<ExpId>,
    /// Always a `Type::Function` once typed
    pub ty: Option<TypeId>,
}

impl FunctionDec {
    pub fn is_primitive(&self) -> bool {
        self.body.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDec {
    pub name: String,
    pub ty_node: TyId,
    pub ty: Option<TypeId>,
}

/// `name : type_name` inside a record type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TyField {
    pub name: String,
    pub type_name: TyId,
}

/// Syntactic type variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TyKind {
    Name(String),
    Record(Vec<TyField>),
    Array(TyId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ty {
    pub kind: TyKind,
    pub ty: Option<TypeId>,
}

/// Maximal run of mutually recursive declarations of one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Chunk {
    Functions(Vec<FunDecId>),
    Types(Vec<TypeDecId>),
    /// Variable chunks are always singletons
    Var(VarDecId),
}

/// Ordered chunks forming one lexical block
pub type ChunkList = Vec<Chunk>;

/// A typed compilation unit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ast {
    exps: Vec<Exp>,
    vars: Vec<Var>,
    var_decs: Vec<VarDec>,
    fun_decs: Vec<FunctionDec>,
    type_decs: Vec<TypeDec>,
    tys: Vec<Ty>,
    pub types: TypeTable,
    pub root: ChunkList,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exp(&self, id: ExpId) -> &Exp {
        &self.exps[id.index()]
    }

    pub fn var(&self, id: VarId) -> &Var {
        &self.vars[id.index()]
    }

    pub fn var_dec(&self, id: VarDecId) -> &VarDec {
        &self.var_decs[id.index()]
    }

    pub fn fun_dec(&self, id: FunDecId) -> &FunctionDec {
        &self.fun_decs[id.index()]
    }

    pub fn type_dec(&self, id: TypeDecId) -> &TypeDec {
        &self.type_decs[id.index()]
    }

    pub fn ty(&self, id: TyId) -> &Ty {
        &self.tys[id.index()]
    }

    pub fn fun_dec_count(&self) -> usize {
        self.fun_decs.len()
    }

    // Allocation. Used by the builder and by collaborators building trees.

    pub fn alloc_exp(&mut self, kind: ExpKind) -> ExpId {
        let id = ExpId(self.exps.len() as u32);
        self.exps.push(Exp { kind, ty: None });
        id
    }

    pub fn alloc_var(&mut self, kind: VarKind) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(Var { kind, ty: None });
        id
    }

    pub fn alloc_var_dec(&mut self, dec: VarDec) -> VarDecId {
        let id = VarDecId(self.var_decs.len() as u32);
        self.var_decs.push(dec);
        id
    }

    pub fn alloc_fun_dec(&mut self, dec: FunctionDec) -> FunDecId {
        let id = FunDecId(self.fun_decs.len() as u32);
        self.fun_decs.push(dec);
        id
    }

    pub fn alloc_type_dec(&mut self, dec: TypeDec) -> TypeDecId {
        let id = TypeDecId(self.type_decs.len() as u32);
        self.type_decs.push(dec);
        id
    }

    pub fn alloc_ty(&mut self, kind: TyKind) -> TyId {
        let id = TyId(self.tys.len() as u32);
        self.tys.push(Ty { kind, ty: None });
        id
    }

    // Write-once type annotation. A second write is a type checker bug.

    pub fn set_exp_type(&mut self, id: ExpId, ty: TypeId) {
        set_once(&mut self.exps[id.index()].ty, ty, id);
    }

    pub fn set_var_type(&mut self, id: VarId, ty: TypeId) {
        set_once(&mut self.vars[id.index()].ty, ty, id);
    }

    pub fn set_var_dec_type(&mut self, id: VarDecId, ty: TypeId) {
        set_once(&mut self.var_decs[id.index()].ty, ty, id);
    }

    pub fn set_fun_dec_type(&mut self, id: FunDecId, ty: TypeId) {
        set_once(&mut self.fun_decs[id.index()].ty, ty, id);
    }

    pub fn set_type_dec_type(&mut self, id: TypeDecId, ty: TypeId) {
        set_once(&mut self.type_decs[id.index()].ty, ty, id);
    }

    pub fn set_ty_type(&mut self, id: TyId, ty: TypeId) {
        set_once(&mut self.tys[id.index()].ty, ty, id);
    }

    /// Attach a body to a function declared without one
    pub fn set_function_body(&mut self, id: FunDecId, body: ExpId) {
        let dec = &mut self.fun_decs[id.index()];
        assert!(dec.body.is_none(), "function `{}` already has a body", dec.name);
        dec.body = Some(body);
    }

    /// Bind a `break` to the loop it exits
    pub fn bind_break(&mut self, brk: ExpId, target: ExpId) {
        match &mut self.exps[brk.index()].kind {
            ExpKind::Break { target: slot } => {
                assert!(slot.is_none(), "break {} bound twice", brk);
                *slot = Some(target);
            }
            other => panic!("{} is not a break: {:?}", brk, other),
        }
    }
}

fn set_once<I: fmt::Display>(slot: &mut Option<TypeId>, ty: TypeId, id: I) {
    assert!(slot.is_none(), "type of {} set twice", id);
    *slot = Some(ty);
}

/// Assembles a typed [`Ast`]
///
/// This is the hand-off surface for the type checker: each constructor
/// allocates a node and records its resolved type, deriving it from the
/// children where the typing rule is mechanical (an `if` has the type of its
/// then-branch, a call has the result type of its callee, and so on).
/// Loops bind the still-unbound `break`s of their body when they are built.
pub struct AstBuilder {
    ast: Ast,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self { ast: Ast::new() }
    }

    pub fn types(&mut self) -> &mut TypeTable {
        &mut self.ast.types
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    fn typed_exp(&mut self, kind: ExpKind, ty: TypeId) -> ExpId {
        let id = self.ast.alloc_exp(kind);
        self.ast.set_exp_type(id, ty);
        id
    }

    fn exp_type(&self, id: ExpId) -> TypeId {
        self.ast.exp(id).ty.unwrap_or(TypeTable::VOID)
    }

    // Syntactic types

    /// Reference to an already resolved type by name
    pub fn name_ty(&mut self, name: &str, resolved: TypeId) -> TyId {
        let id = self.ast.alloc_ty(TyKind::Name(name.to_string()));
        self.ast.set_ty_type(id, resolved);
        id
    }

    pub fn int_ty(&mut self) -> TyId {
        self.name_ty("int", TypeTable::INT)
    }

    pub fn string_ty(&mut self) -> TyId {
        self.name_ty("string", TypeTable::STRING)
    }

    /// `{ name : ty, ... }`, creating the structural record type
    pub fn record_ty(&mut self, fields: Vec<(&str, TyId)>) -> TyId {
        let typed = fields
            .iter()
            .map(|(name, ty)| Field::new(*name, self.ty_type(*ty)))
            .collect();
        let record = self.ast.types.record(typed);
        let fields = fields
            .into_iter()
            .map(|(name, type_name)| TyField {
                name: name.to_string(),
                type_name,
            })
            .collect();
        let id = self.ast.alloc_ty(TyKind::Record(fields));
        self.ast.set_ty_type(id, record);
        id
    }

    pub fn array_ty(&mut self, element: TyId) -> TyId {
        let array = self.ast.types.array(self.ty_type(element));
        let id = self.ast.alloc_ty(TyKind::Array(element));
        self.ast.set_ty_type(id, array);
        id
    }

    fn ty_type(&self, id: TyId) -> TypeId {
        self.ast.ty(id).ty.unwrap_or(TypeTable::VOID)
    }

    /// `type name = ty`, where `alias` was created with [`TypeTable::named`]
    pub fn type_dec(&mut self, alias: TypeId, ty_node: TyId) -> TypeDecId {
        let name = match self.ast.types.get(alias) {
            Type::Named { name, .. } => name.clone(),
            _ => format!("{}", alias),
        };
        let target = self.ty_type(ty_node);
        self.ast.types.resolve_named(alias, target);
        let id = self.ast.alloc_type_dec(TypeDec {
            name,
            ty_node,
            ty: None,
        });
        self.ast.set_type_dec_type(id, alias);
        id
    }

    // Declarations

    /// `var name : type_name := init`
    pub fn var_dec(&mut self, name: &str, type_name: Option<TyId>, init: ExpId) -> VarDecId {
        let ty = match type_name {
            Some(ty) => self.ty_type(ty),
            None => self.exp_type(init),
        };
        let id = self.ast.alloc_var_dec(VarDec {
            name: name.to_string(),
            type_name,
            init: Some(init),
            locked: false,
            ty: None,
        });
        self.ast.set_var_dec_type(id, ty);
        id
    }

    /// Formal parameter of a function
    pub fn formal(&mut self, name: &str, type_name: TyId) -> VarDecId {
        let ty = self.ty_type(type_name);
        let id = self.ast.alloc_var_dec(VarDec {
            name: name.to_string(),
            type_name: Some(type_name),
            init: None,
            locked: false,
            ty: None,
        });
        self.ast.set_var_dec_type(id, ty);
        id
    }

    /// Index of a `for` loop, initialized with the lower bound
    pub fn loop_index(&mut self, name: &str, lo: ExpId) -> VarDecId {
        let id = self.ast.alloc_var_dec(VarDec {
            name: name.to_string(),
            type_name: None,
            init: Some(lo),
            locked: true,
            ty: None,
        });
        self.ast.set_var_dec_type(id, TypeTable::INT);
        id
    }

    /// Declare a function header; the body is attached with [`AstBuilder::define`]
    pub fn function(&mut self, name: &str, formals: Vec<VarDecId>, result: Option<TyId>) -> FunDecId {
        let fields = formals
            .iter()
            .map(|formal| {
                let dec = self.ast.var_dec(*formal);
                Field::new(dec.name.clone(), dec.ty.unwrap_or(TypeTable::VOID))
            })
            .collect();
        let result_ty = match result {
            Some(ty) => self.ty_type(ty),
            None => TypeTable::VOID,
        };
        let function_ty = self.ast.types.function(fields, result_ty);
        let id = self.ast.alloc_fun_dec(FunctionDec {
            name: name.to_string(),
            formals,
            result,
            body: None,
            ty: None,
        });
        self.ast.set_fun_dec_type(id, function_ty);
        id
    }

    pub fn define(&mut self, function: FunDecId, body: ExpId) {
        self.ast.set_function_body(function, body);
    }

    // Lvalues

    pub fn simple_var(&mut self, def: VarDecId) -> VarId {
        let dec = self.ast.var_dec(def);
        let (name, ty) = (dec.name.clone(), dec.ty.unwrap_or(TypeTable::VOID));
        let id = self.ast.alloc_var(VarKind::Simple { name, def });
        self.ast.set_var_type(id, ty);
        id
    }

    pub fn field_var(&mut self, base: VarId, name: &str) -> VarId {
        let base_ty = self.ast.var(base).ty.unwrap_or(TypeTable::VOID);
        let ty = self
            .ast
            .types
            .record_fields(base_ty)
            .and_then(|fields| fields.iter().find(|field| field.name == name))
            .map(|field| field.ty)
            .unwrap_or(TypeTable::VOID);
        let id = self.ast.alloc_var(VarKind::Field {
            base,
            name: name.to_string(),
        });
        self.ast.set_var_type(id, ty);
        id
    }

    pub fn subscript_var(&mut self, base: VarId, index: ExpId) -> VarId {
        let base_ty = self.ast.var(base).ty.unwrap_or(TypeTable::VOID);
        let ty = self
            .ast
            .types
            .array_element(base_ty)
            .unwrap_or(TypeTable::VOID);
        let id = self.ast.alloc_var(VarKind::Subscript { base, index });
        self.ast.set_var_type(id, ty);
        id
    }

    // Expressions

    pub fn nil(&mut self, record: TypeId) -> ExpId {
        let nil = self.ast.types.nil(Some(record));
        self.typed_exp(ExpKind::Nil, nil)
    }

    pub fn int(&mut self, value: i32) -> ExpId {
        self.typed_exp(ExpKind::Int(value), TypeTable::INT)
    }

    pub fn string(&mut self, value: &str) -> ExpId {
        self.typed_exp(ExpKind::Str(value.to_string()), TypeTable::STRING)
    }

    pub fn var_exp(&mut self, var: VarId) -> ExpId {
        let ty = self.ast.var(var).ty.unwrap_or(TypeTable::VOID);
        self.typed_exp(ExpKind::Var(var), ty)
    }

    /// Read a simple variable
    pub fn read(&mut self, def: VarDecId) -> ExpId {
        let var = self.simple_var(def);
        self.var_exp(var)
    }

    pub fn call(&mut self, callee: FunDecId, args: Vec<ExpId>) -> ExpId {
        let ty = self
            .ast
            .fun_dec(callee)
            .ty
            .and_then(|ty| self.ast.types.function_signature(ty))
            .map(|(_, result)| result)
            .unwrap_or(TypeTable::VOID);
        self.typed_exp(ExpKind::Call { callee, args }, ty)
    }

    pub fn op(&mut self, left: ExpId, oper: Oper, right: ExpId) -> ExpId {
        self.typed_exp(ExpKind::Op { left, oper, right }, TypeTable::INT)
    }

    pub fn record(&mut self, type_name: TyId, fields: Vec<(&str, ExpId)>) -> ExpId {
        let ty = self.ty_type(type_name);
        let fields = fields
            .into_iter()
            .map(|(name, init)| FieldInit {
                name: name.to_string(),
                init,
            })
            .collect();
        self.typed_exp(ExpKind::Record { type_name, fields }, ty)
    }

    pub fn seq(&mut self, exps: Vec<ExpId>) -> ExpId {
        let ty = exps
            .last()
            .map(|last| self.exp_type(*last))
            .unwrap_or(TypeTable::VOID);
        self.typed_exp(ExpKind::Seq(exps), ty)
    }

    /// `()`
    pub fn unit(&mut self) -> ExpId {
        self.seq(Vec::new())
    }

    pub fn assign(&mut self, var: VarId, exp: ExpId) -> ExpId {
        self.typed_exp(ExpKind::Assign { var, exp }, TypeTable::VOID)
    }

    pub fn if_exp(&mut self, test: ExpId, then_clause: ExpId, else_clause: ExpId) -> ExpId {
        let ty = self.exp_type(then_clause);
        self.typed_exp(
            ExpKind::If {
                test,
                then_clause,
                else_clause,
            },
            ty,
        )
    }

    /// `if test then body` with the else branch normalized to `()`
    pub fn if_then(&mut self, test: ExpId, then_clause: ExpId) -> ExpId {
        let unit = self.unit();
        self.typed_exp(
            ExpKind::If {
                test,
                then_clause,
                else_clause: unit,
            },
            TypeTable::VOID,
        )
    }

    pub fn while_exp(&mut self, test: ExpId, body: ExpId) -> ExpId {
        let id = self.typed_exp(ExpKind::While { test, body }, TypeTable::VOID);
        self.bind_breaks(body, id);
        id
    }

    pub fn for_exp(&mut self, index: VarDecId, hi: ExpId, body: ExpId) -> ExpId {
        let id = self.typed_exp(ExpKind::For { index, hi, body }, TypeTable::VOID);
        self.bind_breaks(body, id);
        id
    }

    /// A `break` bound later by the innermost enclosing loop
    pub fn break_exp(&mut self) -> ExpId {
        self.typed_exp(ExpKind::Break { target: None }, TypeTable::VOID)
    }

    pub fn let_exp(&mut self, chunks: ChunkList, body: ExpId) -> ExpId {
        let ty = self.exp_type(body);
        self.typed_exp(ExpKind::Let { chunks, body }, ty)
    }

    pub fn array(&mut self, type_name: TyId, size: ExpId, init: ExpId) -> ExpId {
        let ty = self.ty_type(type_name);
        self.typed_exp(ExpKind::Array { type_name, size, init }, ty)
    }

    pub fn cast(&mut self, exp: ExpId, target: TyId) -> ExpId {
        let ty = self.ty_type(target);
        self.typed_exp(ExpKind::Cast { exp, target }, ty)
    }

    fn bind_breaks(&mut self, body: ExpId, target: ExpId) {
        let mut collector = UnboundBreaks::default();
        // The collector never fails.
        let _ = collector.visit_exp(&self.ast, body);
        for brk in collector.breaks {
            self.ast.bind_break(brk, target);
        }
    }

    /// Finish the unit with its top-level chunk list
    pub fn finish(mut self, root: ChunkList) -> Ast {
        self.ast.root = root;
        self.ast
    }
}

impl Default for AstBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Breaks not yet bound, skipping nested loops (already bound) and functions
#[derive(Default)]
struct UnboundBreaks {
    breaks: Vec<ExpId>,
}

impl Visitor for UnboundBreaks {
    fn visit_exp(&mut self, ast: &Ast, id: ExpId) -> VisitorResult<()> {
        match &ast.exp(id).kind {
            ExpKind::Break { target: None } => {
                self.breaks.push(id);
                Ok(())
            }
            ExpKind::While { .. } | ExpKind::For { .. } => Ok(()),
            _ => walk_exp(self, ast, id),
        }
    }

    fn visit_function_dec(&mut self, _ast: &Ast, _id: FunDecId) -> VisitorResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_derives_types() {
        let mut b = AstBuilder::new();
        let one = b.int(1);
        let two = b.int(2);
        let sum = b.op(one, Oper::Add, two);
        let text = b.string("hi");
        let seq = b.seq(vec![sum, text]);
        let ast = b.finish(Vec::new());

        assert_eq!(ast.exp(sum).ty, Some(TypeTable::INT));
        assert_eq!(ast.exp(seq).ty, Some(TypeTable::STRING));
    }

    #[test]
    fn test_loops_bind_their_own_breaks() {
        let mut b = AstBuilder::new();
        let inner_break = b.break_exp();
        let one = b.int(1);
        let inner = b.while_exp(one, inner_break);

        let outer_break = b.break_exp();
        let cond = b.int(1);
        let then = b.if_then(cond, outer_break);
        let body = b.seq(vec![inner, then]);
        let test = b.int(1);
        let outer = b.while_exp(test, body);
        let ast = b.finish(Vec::new());

        assert_eq!(
            ast.exp(inner_break).kind,
            ExpKind::Break {
                target: Some(inner)
            }
        );
        assert_eq!(
            ast.exp(outer_break).kind,
            ExpKind::Break {
                target: Some(outer)
            }
        );
    }

    #[test]
    #[should_panic(expected = "set twice")]
    fn test_type_annotation_is_write_once() {
        let mut b = AstBuilder::new();
        let one = b.int(1);
        let mut ast = b.finish(Vec::new());
        ast.set_exp_type(one, TypeTable::STRING);
    }

    #[test]
    fn test_function_type_from_formals() {
        let mut b = AstBuilder::new();
        let int = b.int_ty();
        let a = b.formal("a", int);
        let f = b.function("f", vec![a], Some(int));
        let ast = b.finish(Vec::new());

        let ty = ast.fun_dec(f).ty.unwrap();
        let (formals, result) = ast.types.function_signature(ty).unwrap();
        assert_eq!(formals.len(), 1);
        assert_eq!(formals[0].name, "a");
        assert_eq!(result, TypeTable::INT);
    }
}
