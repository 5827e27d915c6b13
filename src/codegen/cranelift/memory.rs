//! Memory layout of source types
//!
//! Every value is either an `i32` scalar (`int`, comparison results, the
//! placeholder of `void`) or a pointer (`string`, records, arrays, `nil`).
//! Records are heap blocks whose fields sit at naturally aligned offsets in
//! declaration order; arrays are heap blocks of equally sized elements.

use crate::codegen::{CodegenError, CodegenResult};
use crate::types::{Type as SourceType, TypeId, TypeTable};
use cranelift_codegen::ir::{types, Type};
use std::collections::HashMap;

/// IR type of a value of source type `ty`; `None` for `void`
pub fn lower_type(table: &TypeTable, ty: TypeId, pointer: Type) -> CodegenResult<Option<Type>> {
    match table.actual_type(ty) {
        SourceType::Void => Ok(None),
        SourceType::Int => Ok(Some(types::I32)),
        SourceType::String
        | SourceType::Nil { .. }
        | SourceType::Array { .. }
        | SourceType::Record { .. } => Ok(Some(pointer)),
        SourceType::Named { name, .. } => Err(CodegenError::UnexpectedType(format!(
            "named type `{}` was never resolved",
            name
        ))),
        SourceType::Function { .. } => Err(CodegenError::UnexpectedType(format!(
            "function type {} has no value representation",
            table.display(ty)
        ))),
    }
}

/// IR type of storage for `ty`; `void` gets an `i32` placeholder
pub fn slot_type(table: &TypeTable, ty: TypeId, pointer: Type) -> CodegenResult<Type> {
    Ok(lower_type(table, ty, pointer)?.unwrap_or(types::I32))
}

/// A field at a fixed byte offset within a record
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSlot {
    pub name: String,
    pub ty: Type,
    pub offset: u32,
}

/// Layout of a record type
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLayout {
    pub record: TypeId,
    pub fields: Vec<FieldSlot>,
    pub size: u32,
    pub align: u32,
}

impl RecordLayout {
    pub fn compute(table: &TypeTable, record: TypeId, pointer: Type) -> CodegenResult<Self> {
        let fields = table.record_fields(record).ok_or_else(|| {
            CodegenError::UnexpectedType(format!(
                "expected a record type, found {}",
                table.display(record)
            ))
        })?;

        let mut offset = 0u32;
        let mut align = 1u32;
        let mut slots = Vec::with_capacity(fields.len());
        for field in fields {
            let ty = slot_type(table, field.ty, pointer)?;
            let field_align = ty.bytes();
            offset = align_to(offset, field_align);
            slots.push(FieldSlot {
                name: field.name.clone(),
                ty,
                offset,
            });
            offset += ty.bytes();
            align = align.max(field_align);
        }

        Ok(Self {
            record: table.actual(record),
            fields: slots,
            size: align_to(offset, align),
            align,
        })
    }

    /// Ordinal and slot of the first field called `name`
    pub fn field(&self, name: &str) -> Option<(usize, &FieldSlot)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, slot)| slot.name == name)
    }

    /// Bytes to request from the allocator; never zero
    pub fn allocation_size(&self) -> u32 {
        self.size.max(1)
    }
}

fn align_to(offset: u32, align: u32) -> u32 {
    (offset + align - 1) / align * align
}

/// Record layouts, computed once per structural record type
#[derive(Debug, Clone)]
pub struct LayoutTable {
    pointer: Type,
    layouts: HashMap<TypeId, RecordLayout>,
}

impl LayoutTable {
    pub fn new(pointer: Type) -> Self {
        Self {
            pointer,
            layouts: HashMap::new(),
        }
    }

    pub fn pointer_type(&self) -> Type {
        self.pointer
    }

    /// Layout of `record`, registering it on first request
    pub fn record(&mut self, table: &TypeTable, record: TypeId) -> CodegenResult<&RecordLayout> {
        let key = table.actual(record);
        if !self.layouts.contains_key(&key) {
            let layout = RecordLayout::compute(table, key, self.pointer)?;
            self.layouts.insert(key, layout);
        }
        self.layouts
            .get(&key)
            .ok_or_else(|| CodegenError::InternalError(format!("layout of {} vanished", key)))
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Byte size of one element of an array of type `array`
    pub fn element_size(&self, table: &TypeTable, array: TypeId) -> CodegenResult<u32> {
        let element = table.array_element(array).ok_or_else(|| {
            CodegenError::UnexpectedType(format!(
                "expected an array type, found {}",
                table.display(array)
            ))
        })?;
        Ok(slot_type(table, element, self.pointer)?.bytes())
    }
}
