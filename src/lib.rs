pub mod ast;
pub mod codegen;
pub mod semantic;
pub mod types;
pub mod visitor;

pub use ast::{Ast, AstBuilder, Chunk, ChunkList, ExpId, FunDecId, Oper, VarDecId, VarId};
pub use codegen::{
    compile_jit, compile_object, CaptureLists, CodeGenerator, CodegenConfig, CodegenError,
    CodegenResult, JitProgram, Program,
};
pub use semantic::{analyze, CallGraph, EscapeError, EscapeMap};
pub use types::{Type, TypeId, TypeTable};
pub use visitor::{Visitor, VisitorContext, VisitorError, VisitorResult};
