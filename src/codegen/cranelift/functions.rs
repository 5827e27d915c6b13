//! Function compilation for Cranelift
//!
//! A chunk of mutually recursive functions is compiled in two phases: every
//! header is declared first so bodies can call any member of the chunk, then
//! each body with a definition is lowered.

use super::context::{CraneliftContext, Storage};
use super::expressions::FunctionTranslator;
use super::memory::{lower_type, slot_type};
use super::FunctionInfo;
use crate::ast::{ExpId, FunDecId};
use crate::codegen::runtime::{MAIN_SYMBOL, PRIMITIVE_PREFIX};
use crate::codegen::{CodegenError, CodegenResult};
use cranelift::prelude::{AbiParam, InstBuilder, Signature, Type};
use cranelift_codegen::ir::UserFuncName;
use cranelift_codegen::print_errors::pretty_verifier_error;
use cranelift_codegen::verify_function;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::Linkage;
use log::{debug, trace};

/// Compile one chunk of function declarations
pub fn compile_chunk(cx: &mut CraneliftContext<'_>, decs: &[FunDecId]) -> CodegenResult<()> {
    for dec in decs {
        declare_function(cx, *dec)?;
    }
    for dec in decs {
        if let Some(body) = cx.ast.fun_dec(*dec).body {
            define_function(cx, *dec, body)?;
        }
    }
    Ok(())
}

/// Symbol and linkage of a function
///
/// `_main` is the exported entry point and primitives are imported from the
/// runtime under a prefixed name. Every other function is local, renamed
/// when its name is already taken in the module.
fn symbol_for(cx: &CraneliftContext<'_>, dec: FunDecId) -> (String, Linkage) {
    let name = &cx.ast.fun_dec(dec).name;
    if name == "_main" {
        return (MAIN_SYMBOL.to_string(), Linkage::Export);
    }
    if cx.ast.fun_dec(dec).is_primitive() {
        return (format!("{}{}", PRIMITIVE_PREFIX, name), Linkage::Import);
    }

    let mut symbol = name.clone();
    if cx.is_symbol_taken(&symbol) || symbol.starts_with(PRIMITIVE_PREFIX) {
        symbol = format!("{}_{}", name, dec.index());
        while cx.is_symbol_taken(&symbol) {
            symbol.push('_');
        }
    }
    (symbol, Linkage::Local)
}

fn signature(cx: &CraneliftContext<'_>, params: &[Type], returns: Option<Type>) -> Signature {
    let mut sig = cx.module.make_signature();
    sig.params.extend(params.iter().map(|ty| AbiParam::new(*ty)));
    if let Some(ty) = returns {
        sig.returns.push(AbiParam::new(ty));
    }
    sig
}

/// Declare a function's header and register it
pub fn declare_function(cx: &mut CraneliftContext<'_>, dec_id: FunDecId) -> CodegenResult<()> {
    let ast = cx.ast;
    let dec = ast.fun_dec(dec_id);
    let fn_ty = dec
        .ty
        .ok_or_else(|| CodegenError::MissingType(format!("function `{}`", dec.name)))?;
    let (_, result) = ast.types.function_signature(fn_ty).ok_or_else(|| {
        CodegenError::UnexpectedType(format!(
            "function `{}` has type {}",
            dec.name,
            ast.types.display(fn_ty)
        ))
    })?;

    let captures = cx.capture_list(dec_id);
    let mut params = vec![cx.pointer_type; captures.len()];
    let mut param_names: Vec<String> = captures
        .iter()
        .map(|capture| ast.var_dec(*capture).name.clone())
        .collect();
    for formal in &dec.formals {
        let formal_dec = ast.var_dec(*formal);
        param_names.push(formal_dec.name.clone());
        let ty = formal_dec.ty.ok_or_else(|| {
            CodegenError::MissingType(format!(
                "formal `{}` of `{}`",
                formal_dec.name, dec.name
            ))
        })?;
        params.push(slot_type(&ast.types, ty, cx.pointer_type)?);
    }
    let returns = lower_type(&ast.types, result, cx.pointer_type)?;

    let (symbol, linkage) = symbol_for(cx, dec_id);
    let sig = signature(cx, &params, returns);
    let id = cx
        .module
        .declare_function(&symbol, linkage, &sig)
        .map_err(|e| CodegenError::Module(format!("failed to declare `{}`: {}", symbol, e)))?;
    let info = FunctionInfo {
        dec: dec_id,
        name: dec.name.clone(),
        symbol,
        id,
        linkage,
        captures,
        params,
        param_names,
        returns,
        ir: None,
    };

    debug!(
        "declared `{}` as {} ({:?}, {} captures, {} formals)",
        info.name,
        info.symbol,
        linkage,
        info.captures.len(),
        dec.formals.len()
    );
    cx.register_function(info);
    Ok(())
}

/// Lower a function's body and define it in the module
pub fn define_function(
    cx: &mut CraneliftContext<'_>,
    dec_id: FunDecId,
    body: ExpId,
) -> CodegenResult<()> {
    let ast = cx.ast;
    let info = cx.function(dec_id)?.clone();

    let mut ctx = cx.module.make_context();
    ctx.func.signature = signature(cx, &info.params, info.returns);
    ctx.func.name = UserFuncName::user(0, info.id.as_u32());

    let mut builder_context = FunctionBuilderContext::new();
    {
        let mut builder = FunctionBuilder::new(&mut ctx.func, &mut builder_context);
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        builder.seal_block(entry);
        let params = builder.block_params(entry).to_vec();

        let mut translator = FunctionTranslator::new(cx, builder);
        let (capture_params, formal_params) = params.split_at(info.captures.len());
        for (dec, param) in info.captures.iter().zip(capture_params) {
            translator.bind(*dec, Storage::Pointer(*param));
        }
        for (formal, param) in ast.fun_dec(dec_id).formals.iter().zip(formal_params) {
            let slot = translator.declare_slot(*formal)?;
            translator.builder.ins().stack_store(*param, slot, 0);
        }

        let value = translator.translate_exp(body)?;
        match info.returns {
            Some(_) => translator.builder.ins().return_(&[value]),
            None => translator.builder.ins().return_(&[]),
        };
        translator.finish();
    }

    if cx.config.verifier {
        verify_function(&ctx.func, cx.module.isa()).map_err(|errors| {
            CodegenError::Module(format!(
                "`{}` failed verification:\n{}",
                info.symbol,
                pretty_verifier_error(&ctx.func, None, errors)
            ))
        })?;
    }
    let ir = cx.config.retain_ir.then(|| ctx.func.display().to_string());
    trace!("{}", ctx.func.display());

    cx.module
        .define_function(info.id, &mut ctx)
        .map_err(|e| CodegenError::Module(format!("failed to define `{}`: {}", info.symbol, e)))?;
    cx.module.clear_context(&mut ctx);

    cx.function_mut(dec_id)?.ir = ir;
    debug!("defined `{}`", info.symbol);
    Ok(())
}
