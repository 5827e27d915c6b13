//! Cranelift Compilation Context
//!
//! State shared by every function of a compilation unit: the backend module,
//! the function registry, record layouts and the runtime helpers. Per-function
//! state (local storage, loop exits) lives in the function translator.

use super::memory::LayoutTable;
use super::FunctionInfo;
use crate::ast::{Ast, FunDecId, VarDecId};
use crate::codegen::captures::CaptureLists;
use crate::codegen::config::CodegenConfig;
use crate::codegen::runtime::RuntimeFunctions;
use crate::codegen::{CodegenError, CodegenResult};
use cranelift_codegen::ir::{StackSlot, Type, Value};
use std::collections::{BTreeMap, HashSet};

/// Where a variable lives within the current function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// A slot in this function's frame
    Slot(StackSlot),
    /// An incoming pointer to a slot in an enclosing frame
    Pointer(Value),
}

/// Cranelift compilation context
pub struct CraneliftContext<'m> {
    pub module: &'m mut dyn cranelift_module::Module,
    pub ast: &'m Ast,
    pub config: &'m CodegenConfig,
    pub captures: CaptureLists,
    pub layouts: LayoutTable,
    pub runtime: RuntimeFunctions,
    pub pointer_type: Type,
    /// Declared functions, by declaration
    functions: BTreeMap<FunDecId, FunctionInfo>,
    /// Symbols already taken in the module
    symbols: HashSet<String>,
}

impl<'m> CraneliftContext<'m> {
    pub fn new(
        module: &'m mut dyn cranelift_module::Module,
        ast: &'m Ast,
        config: &'m CodegenConfig,
        captures: CaptureLists,
        pointer_type: Type,
    ) -> CodegenResult<Self> {
        let runtime = RuntimeFunctions::declare(module, pointer_type)?;
        let mut symbols = HashSet::new();
        symbols.insert(crate::codegen::runtime::MALLOC.to_string());
        symbols.insert(crate::codegen::runtime::INIT_ARRAY.to_string());
        Ok(Self {
            module,
            ast,
            config,
            captures,
            layouts: LayoutTable::new(pointer_type),
            runtime,
            pointer_type,
            functions: BTreeMap::new(),
            symbols,
        })
    }

    /// Register a declared function
    pub fn register_function(&mut self, info: FunctionInfo) {
        self.symbols.insert(info.symbol.clone());
        self.functions.insert(info.dec, info);
    }

    /// A declared function
    pub fn function(&self, dec: FunDecId) -> CodegenResult<&FunctionInfo> {
        self.functions.get(&dec).ok_or_else(|| {
            CodegenError::InternalError(format!(
                "function `{}` ({}) used before its header was declared",
                self.ast.fun_dec(dec).name,
                dec
            ))
        })
    }

    pub fn function_mut(&mut self, dec: FunDecId) -> CodegenResult<&mut FunctionInfo> {
        let ast = self.ast;
        let name = &ast.fun_dec(dec).name;
        self.functions.get_mut(&dec).ok_or_else(|| {
            CodegenError::InternalError(format!("function `{}` ({}) was never declared", name, dec))
        })
    }

    pub fn is_symbol_taken(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    pub fn capture_list(&self, dec: FunDecId) -> Vec<VarDecId> {
        self.captures.get(dec)
    }

    /// Declared functions in declaration order, and the layouts used
    pub fn finish(self) -> (Vec<FunctionInfo>, LayoutTable) {
        (self.functions.into_values().collect(), self.layouts)
    }
}
