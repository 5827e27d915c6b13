//! Code Generation Module
//!
//! Lowers a typed AST plus its escape map to Cranelift IR, one IR function
//! per source function, with nested functions lambda-lifted: every escaped
//! variable a function needs from an enclosing frame is passed to it as a
//! pointer ahead of its formals.
//!
//! Architecture:
//! - `config`: CodegenConfig and its builder
//! - `captures`: per-function capture lists
//! - `runtime`: helper functions called by generated code
//! - `cranelift`: target setup, function headers and bodies, expression lowering

pub mod captures;
pub mod config;
pub mod cranelift;
pub mod runtime;

pub use self::cranelift::{CodeGenerator, FunctionInfo, JitProgram, Program};
pub use captures::CaptureLists;
pub use config::{CodegenConfig, CodegenConfigBuilder, OptLevel};

use crate::ast::Ast;
use crate::semantic::{analyze, EscapeError};
use log::debug;

/// Result type for code generation operations
pub type CodegenResult<T> = Result<T, CodegenError>;

/// Errors that can occur during code generation
///
/// Every variant is fatal for the compilation unit: the typed AST was
/// expected to be well formed, and nothing generated so far is returned.
#[derive(Debug, Clone, PartialEq)]
pub enum CodegenError {
    /// A node the lowering needs a type for carries none
    MissingType(String),
    /// A node's type is not the variant its lowering rule requires
    UnexpectedType(String),
    /// Internal compiler error
    InternalError(String),
    /// The backend module rejected a declaration or definition
    Module(String),
    /// Invalid configuration or target
    Configuration(String),
}

impl std::fmt::Display for CodegenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodegenError::MissingType(msg) => write!(f, "Missing type: {}", msg),
            CodegenError::UnexpectedType(msg) => write!(f, "Unexpected type: {}", msg),
            CodegenError::InternalError(msg) => write!(f, "Internal compiler error: {}", msg),
            CodegenError::Module(msg) => write!(f, "Module error: {}", msg),
            CodegenError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for CodegenError {}

impl From<EscapeError> for CodegenError {
    fn from(err: EscapeError) -> Self {
        CodegenError::InternalError(err.to_string())
    }
}

/// Analyze, generate and emit a relocatable object file
pub fn compile_object(ast: &Ast, config: &CodegenConfig) -> CodegenResult<Vec<u8>> {
    let escapes = analyze(ast)?;
    let module = self::cranelift::object_module(config)?;
    let program = CodeGenerator::new(module, config.clone()).generate(ast, escapes)?;
    let bytes = program.emit()?;
    debug!("emitted {} bytes of object code", bytes.len());
    Ok(bytes)
}

/// Analyze, generate and load the unit into the current process
///
/// `symbols` provides the primitives the program calls, by emitted symbol
/// (`tc_<name>`); the array helper is registered automatically.
pub fn compile_jit(
    ast: &Ast,
    config: &CodegenConfig,
    symbols: &[(&str, *const u8)],
) -> CodegenResult<JitProgram> {
    let escapes = analyze(ast)?;
    let module = self::cranelift::jit_module(config, symbols)?;
    CodeGenerator::new(module, config.clone())
        .generate(ast, escapes)?
        .finalize()
}
