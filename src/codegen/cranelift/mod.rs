//! Cranelift Native Code Generation Backend
//!
//! The generator is generic over [`cranelift_module::Module`], so the same
//! lowering produces a relocatable object ([`ObjectModule`]) or code loaded
//! into the running process ([`JITModule`]).
//!
//! Architecture:
//! - `context`: state shared by every function of the unit
//! - `functions`: function headers (signatures, symbols) and bodies
//! - `expressions`: expression and lvalue lowering
//! - `memory`: record layouts and source type lowering

use super::captures::CaptureLists;
use super::config::CodegenConfig;
use super::runtime;
use super::{CodegenError, CodegenResult};
use crate::ast::{Ast, Chunk, FunDecId, VarDecId};
use crate::semantic::EscapeMap;
use crate::types::{TypeId, TypeTable};

use cranelift::prelude::Type;
use cranelift_codegen::isa::{self, OwnedTargetIsa};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module};
use cranelift_object::{ObjectBuilder, ObjectModule};
use log::{debug, info};
use std::str::FromStr;
use target_lexicon::Triple;

pub mod context;
pub mod expressions;
pub mod functions;
pub mod memory;

pub use context::CraneliftContext;
pub use memory::{FieldSlot, LayoutTable, RecordLayout};

/// Build the target ISA described by `config`
pub fn build_isa(config: &CodegenConfig) -> CodegenResult<OwnedTargetIsa> {
    let target_triple = match &config.target_triple {
        Some(triple) => Triple::from_str(triple).map_err(|e| {
            CodegenError::Configuration(format!("invalid target triple `{}`: {}", triple, e))
        })?,
        None => Triple::host(),
    };

    let mut flag_builder = settings::builder();
    let flags = [
        ("use_colocated_libcalls", "false"),
        ("is_pic", if config.is_pic { "true" } else { "false" }),
        ("opt_level", config.opt_level.as_setting()),
        ("enable_verifier", if config.verifier { "true" } else { "false" }),
    ];
    for (name, value) in flags {
        flag_builder.set(name, value).map_err(|e| {
            CodegenError::Configuration(format!("failed to set compiler flag {}: {}", name, e))
        })?;
    }

    let isa_builder = isa::lookup(target_triple.clone()).map_err(|e| {
        CodegenError::Configuration(format!("unsupported target {}: {}", target_triple, e))
    })?;
    isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(|e| CodegenError::Configuration(format!("failed to finalize ISA: {}", e)))
}

/// An object module for `config`'s target
pub fn object_module(config: &CodegenConfig) -> CodegenResult<ObjectModule> {
    let isa = build_isa(config)?;
    let builder = ObjectBuilder::new(
        isa,
        config.module_name.as_str(),
        cranelift_module::default_libcall_names(),
    )
    .map_err(|e| CodegenError::Module(format!("failed to create object builder: {}", e)))?;
    Ok(ObjectModule::new(builder))
}

/// An in-process module for the host, with the runtime helpers and
/// `symbols` registered
pub fn jit_module(config: &CodegenConfig, symbols: &[(&str, *const u8)]) -> CodegenResult<JITModule> {
    if config.target_triple.is_some() {
        return Err(CodegenError::Configuration(
            "in-process code generation always targets the host".to_string(),
        ));
    }
    let host = CodegenConfig {
        is_pic: false,
        ..config.clone()
    };
    let isa = build_isa(&host)?;
    let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
    for (name, ptr) in runtime::jit_symbols() {
        builder.symbol(name, ptr);
    }
    for (name, ptr) in symbols {
        builder.symbol(*name, *ptr);
    }
    Ok(JITModule::new(builder))
}

/// What was generated for one source function
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub dec: FunDecId,
    /// Source name
    pub name: String,
    /// Emitted symbol
    pub symbol: String,
    pub id: FuncId,
    pub linkage: Linkage,
    /// Captured variables, passed first and in this order
    pub captures: Vec<VarDecId>,
    /// IR parameter types: one pointer per capture, then the formals
    pub params: Vec<Type>,
    /// Parameter names, captures named after the variable they point to
    pub param_names: Vec<String>,
    pub returns: Option<Type>,
    /// Textual IR, when retained
    pub ir: Option<String>,
}

impl FunctionInfo {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn is_primitive(&self) -> bool {
        self.linkage == Linkage::Import
    }
}

/// Cranelift code generator for one compilation unit
pub struct CodeGenerator<M: Module> {
    module: M,
    config: CodegenConfig,
}

impl<M: Module> CodeGenerator<M> {
    pub fn new(module: M, config: CodegenConfig) -> Self {
        Self { module, config }
    }

    /// Lower every function of `ast`
    ///
    /// The first failure aborts the unit; nothing generated so far is kept.
    pub fn generate(mut self, ast: &Ast, escapes: EscapeMap) -> CodegenResult<Program<M>> {
        let captures = CaptureLists::compute(ast, &escapes)?;
        let pointer_type = self.module.target_config().pointer_type();
        info!(
            "generating {} functions for {} (pointer type {})",
            ast.fun_dec_count(),
            self.module.isa().triple(),
            pointer_type
        );

        let (functions, layouts) = {
            let mut context =
                CraneliftContext::new(&mut self.module, ast, &self.config, captures, pointer_type)?;
            for chunk in &ast.root {
                match chunk {
                    Chunk::Functions(decs) => functions::compile_chunk(&mut context, decs)?,
                    Chunk::Types(_) => {}
                    Chunk::Var(dec) => {
                        return Err(CodegenError::InternalError(format!(
                            "variable `{}` declared outside any function",
                            ast.var_dec(*dec).name
                        )))
                    }
                }
            }
            context.finish()
        };
        debug!("generated {} functions", functions.len());

        Ok(Program {
            module: self.module,
            functions,
            layouts,
            types: ast.types.clone(),
            escapes,
        })
    }
}

/// A generated unit: the backend module plus what was put in it
pub struct Program<M: Module> {
    pub module: M,
    functions: Vec<FunctionInfo>,
    layouts: LayoutTable,
    types: TypeTable,
    escapes: EscapeMap,
}

impl<M: Module> Program<M> {
    /// Every declared function, primitives included, by declaration
    pub fn functions(&self) -> &[FunctionInfo] {
        &self.functions
    }

    pub fn function(&self, dec: FunDecId) -> Option<&FunctionInfo> {
        self.functions.iter().find(|info| info.dec == dec)
    }

    /// First function with source name `name`
    pub fn function_named(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.iter().find(|info| info.name == name)
    }

    pub fn escapes(&self) -> &EscapeMap {
        &self.escapes
    }

    /// IR type of values of source type `ty`; `None` for `void`
    pub fn lowered_type(&self, ty: TypeId) -> CodegenResult<Option<Type>> {
        memory::lower_type(&self.types, ty, self.layouts.pointer_type())
    }

    /// Layout of a record type, computing it if no code used it
    pub fn record_layout(&mut self, record: TypeId) -> CodegenResult<RecordLayout> {
        self.layouts.record(&self.types, record).cloned()
    }
}

impl Program<ObjectModule> {
    /// Emit the relocatable object file
    pub fn emit(self) -> CodegenResult<Vec<u8>> {
        self.module
            .finish()
            .emit()
            .map_err(|e| CodegenError::Module(format!("failed to emit object: {}", e)))
    }
}

impl Program<JITModule> {
    /// Resolve relocations and make the code executable
    pub fn finalize(mut self) -> CodegenResult<JitProgram> {
        self.module
            .finalize_definitions()
            .map_err(|e| CodegenError::Module(format!("failed to finalize: {}", e)))?;
        Ok(JitProgram {
            module: self.module,
            functions: self.functions,
        })
    }
}

/// Code loaded into the running process
pub struct JitProgram {
    module: JITModule,
    functions: Vec<FunctionInfo>,
}

impl JitProgram {
    pub fn functions(&self) -> &[FunctionInfo] {
        &self.functions
    }

    /// Entry address of the first defined function called `name`
    ///
    /// Callers transmute it to an `extern "C" fn` matching
    /// [`FunctionInfo::params`] and [`FunctionInfo::returns`].
    pub fn function_ptr(&self, name: &str) -> Option<*const u8> {
        self.functions
            .iter()
            .find(|info| info.name == name && !info.is_primitive())
            .map(|info| self.module.get_finalized_function(info.id))
    }
}
