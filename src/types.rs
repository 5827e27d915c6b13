//! Source-level type descriptors
//!
//! Types are interned in a [`TypeTable`] arena and referred to by [`TypeId`].
//! The type checker (an external collaborator) fills the table and annotates
//! every AST node with a `TypeId`; the passes in this crate only read it.
//!
//! `Void`, `Int` and `String` are singletons allocated when the table is
//! created. Named types are aliases whose target is set once the enclosing
//! type chunk has been resolved; [`TypeTable::actual`] unwraps them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to a type in a [`TypeTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A named, typed slot of a record (or of a function's formal list)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: TypeId,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        Self { name: name.into(), ty }
    }
}

/// Structural type descriptors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    /// The type of `nil`, carrying the record type it was resolved against
    Nil { record: Option<TypeId> },
    Void,
    Int,
    String,
    /// A type alias introduced by a type declaration
    Named { name: String, actual: Option<TypeId> },
    Array { element: TypeId },
    Record { fields: Vec<Field> },
    /// `formals` always points at a `Record`
    Function { formals: TypeId, result: TypeId },
}

/// Arena of every type known to a compilation unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeTable {
    types: Vec<Type>,
}

impl TypeTable {
    pub const VOID: TypeId = TypeId(0);
    pub const INT: TypeId = TypeId(1);
    pub const STRING: TypeId = TypeId(2);

    pub fn new() -> Self {
        Self {
            types: vec![Type::Void, Type::Int, Type::String],
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    fn push(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    pub fn nil(&mut self, record: Option<TypeId>) -> TypeId {
        self.push(Type::Nil { record })
    }

    pub fn array(&mut self, element: TypeId) -> TypeId {
        self.push(Type::Array { element })
    }

    pub fn record(&mut self, fields: Vec<Field>) -> TypeId {
        self.push(Type::Record { fields })
    }

    pub fn function(&mut self, formals: Vec<Field>, result: TypeId) -> TypeId {
        let formals = self.record(formals);
        self.push(Type::Function { formals, result })
    }

    /// Declare an alias whose target is not known yet (mutually recursive types)
    pub fn named(&mut self, name: impl Into<String>) -> TypeId {
        self.push(Type::Named {
            name: name.into(),
            actual: None,
        })
    }

    /// Resolve an alias created by [`TypeTable::named`]
    ///
    /// Resolving an alias twice, or resolving something that is not an alias,
    /// is a collaborator bug.
    pub fn resolve_named(&mut self, alias: TypeId, target: TypeId) {
        match &mut self.types[alias.index()] {
            Type::Named { actual, name } => {
                assert!(actual.is_none(), "named type `{}` resolved twice", name);
                *actual = Some(target);
            }
            other => panic!("cannot resolve non-alias type {:?}", other),
        }
    }

    /// Unwrap named aliases down to the underlying structural type
    ///
    /// An unresolved alias is returned as-is.
    pub fn actual(&self, mut id: TypeId) -> TypeId {
        // Alias chains are acyclic once the type checker accepted the program;
        // the bound guards against a malformed table.
        for _ in 0..=self.types.len() {
            match self.get(id) {
                Type::Named { actual: Some(next), .. } => id = *next,
                _ => return id,
            }
        }
        id
    }

    pub fn actual_type(&self, id: TypeId) -> &Type {
        self.get(self.actual(id))
    }

    pub fn is_void(&self, id: TypeId) -> bool {
        matches!(self.actual_type(id), Type::Void)
    }

    /// Fields of a record type, after alias resolution
    pub fn record_fields(&self, id: TypeId) -> Option<&[Field]> {
        match self.actual_type(id) {
            Type::Record { fields } => Some(fields),
            _ => None,
        }
    }

    /// Ordinal of `name` within a record's declared field order
    pub fn field_index(&self, record: TypeId, name: &str) -> Option<usize> {
        self.record_fields(record)?
            .iter()
            .position(|field| field.name == name)
    }

    pub fn array_element(&self, id: TypeId) -> Option<TypeId> {
        match self.actual_type(id) {
            Type::Array { element } => Some(*element),
            _ => None,
        }
    }

    /// Formal parameter types and result of a function type
    pub fn function_signature(&self, id: TypeId) -> Option<(&[Field], TypeId)> {
        match self.actual_type(id) {
            Type::Function { formals, result } => {
                let formals = self.record_fields(*formals)?;
                Some((formals, *result))
            }
            _ => None,
        }
    }

    /// Whether a value of type `b` may be used where `a` is expected
    pub fn compatible_with(&self, a: TypeId, b: TypeId) -> bool {
        let (a, b) = (self.actual(a), self.actual(b));
        if a == b {
            return true;
        }
        match (self.get(a), self.get(b)) {
            (Type::Void, Type::Void) | (Type::Int, Type::Int) | (Type::String, Type::String) => {
                true
            }
            (Type::Nil { .. }, Type::Record { .. }) | (Type::Record { .. }, Type::Nil { .. }) => {
                true
            }
            (Type::Nil { .. }, Type::Nil { .. }) => true,
            (Type::Function { result, .. }, _) => self.compatible_with(*result, b),
            _ => false,
        }
    }

    /// Render a type for diagnostics
    pub fn display(&self, id: TypeId) -> TypeDisplay<'_> {
        TypeDisplay { table: self, id, depth: 0 }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Pretty-printer for a type, obtained from [`TypeTable::display`]
pub struct TypeDisplay<'a> {
    table: &'a TypeTable,
    id: TypeId,
    depth: usize,
}

impl TypeDisplay<'_> {
    fn nested(&self, id: TypeId) -> Self {
        TypeDisplay {
            table: self.table,
            id,
            depth: self.depth + 1,
        }
    }
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.table.get(self.id) {
            Type::Nil { record: Some(record) } => write!(f, "nil = {}", self.nested(*record)),
            Type::Nil { record: None } => write!(f, "nil = (null)"),
            Type::Void => write!(f, "void"),
            Type::Int => write!(f, "int"),
            Type::String => write!(f, "string"),
            // Recursive records would print forever; stop at the alias name.
            Type::Named { name, .. } if self.depth > 0 => write!(f, "{}", name),
            Type::Named { name, actual: Some(actual) } => {
                write!(f, "{} : {}", name, self.nested(*actual))
            }
            Type::Named { name, actual: None } => write!(f, "{} : (unresolved)", name),
            Type::Array { element } => write!(f, "array of {}", self.nested(*element)),
            Type::Record { fields } => {
                write!(f, "record {{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} : {}", field.name, self.nested(field.ty))?;
                }
                write!(f, "}}")
            }
            Type::Function { formals, result } => {
                write!(f, "function ( {} ) : {}", self.nested(*formals), self.nested(*result))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singletons() {
        let table = TypeTable::new();
        assert_eq!(table.get(TypeTable::INT), &Type::Int);
        assert_eq!(table.get(TypeTable::VOID), &Type::Void);
        assert_eq!(table.get(TypeTable::STRING), &Type::String);
    }

    #[test]
    fn test_actual_unwraps_alias_chains() {
        let mut table = TypeTable::new();
        let record = table.record(vec![Field::new("x", TypeTable::INT)]);
        let inner = table.named("point");
        let outer = table.named("pt");
        table.resolve_named(inner, record);
        table.resolve_named(outer, inner);

        assert_eq!(table.actual(outer), record);
        assert_eq!(table.field_index(outer, "x"), Some(0));
        assert_eq!(table.field_index(outer, "y"), None);
    }

    #[test]
    #[should_panic(expected = "resolved twice")]
    fn test_alias_is_write_once() {
        let mut table = TypeTable::new();
        let alias = table.named("t");
        table.resolve_named(alias, TypeTable::INT);
        table.resolve_named(alias, TypeTable::STRING);
    }

    #[test]
    fn test_nil_is_compatible_with_records() {
        let mut table = TypeTable::new();
        let record = table.record(vec![]);
        let nil = table.nil(Some(record));
        assert!(table.compatible_with(record, nil));
        assert!(table.compatible_with(nil, record));
        assert!(!table.compatible_with(nil, TypeTable::INT));
    }

    #[test]
    fn test_pretty_printing() {
        let mut table = TypeTable::new();
        let list = table.named("list");
        let record = table.record(vec![
            Field::new("head", TypeTable::INT),
            Field::new("tail", list),
        ]);
        table.resolve_named(list, record);
        let array = table.array(TypeTable::STRING);
        let function = table.function(vec![Field::new("n", TypeTable::INT)], TypeTable::VOID);

        assert_eq!(
            table.display(list).to_string(),
            "list : record {head : int, tail : list}"
        );
        assert_eq!(table.display(array).to_string(), "array of string");
        assert_eq!(
            table.display(function).to_string(),
            "function ( record {n : int} ) : void"
        );
    }
}
