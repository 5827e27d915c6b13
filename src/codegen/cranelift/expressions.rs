//! Expression compilation for Cranelift
//!
//! Every expression lowers to exactly one value. Expressions of type `void`
//! produce an `i32` zero so the lowering stays total; `break` does too, after
//! terminating its block.

use super::context::{CraneliftContext, Storage};
use super::functions;
use super::memory::{lower_type, slot_type};
use crate::ast::{Ast, Chunk, ExpId, ExpKind, FieldInit, FunDecId, Oper, VarDecId, VarId, VarKind};
use crate::codegen::{CodegenError, CodegenResult};
use crate::types::{Type as SourceType, TypeId};
use cranelift::prelude::{
    types, Block, InstBuilder, IntCC, MemFlags, StackSlotData, StackSlotKind, Type, Value,
};
use cranelift_codegen::ir::StackSlot;
use cranelift_frontend::FunctionBuilder;
use cranelift_module::{DataDescription, FuncId};
use log::trace;
use std::collections::HashMap;

/// Address of an lvalue
#[derive(Debug, Clone, Copy)]
pub enum Address {
    Slot(StackSlot),
    Pointer(Value),
}

/// Lowers the body of one function
pub struct FunctionTranslator<'a, 'm> {
    pub(super) cx: &'a mut CraneliftContext<'m>,
    pub(super) ast: &'m Ast,
    pub(super) builder: FunctionBuilder<'a>,
    pointer: Type,
    /// Storage of every variable visible in this function
    locals: HashMap<VarDecId, Storage>,
    /// Exit block of each loop, for `break`
    loop_exits: HashMap<ExpId, Block>,
}

impl<'a, 'm> FunctionTranslator<'a, 'm> {
    pub fn new(cx: &'a mut CraneliftContext<'m>, builder: FunctionBuilder<'a>) -> Self {
        let ast = cx.ast;
        let pointer = cx.pointer_type;
        Self {
            cx,
            ast,
            builder,
            pointer,
            locals: HashMap::new(),
            loop_exits: HashMap::new(),
        }
    }

    /// Seal every block and hand the function back to its context
    pub fn finish(mut self) {
        self.builder.seal_all_blocks();
        self.builder.finalize();
    }

    pub fn bind(&mut self, dec: VarDecId, storage: Storage) {
        self.locals.insert(dec, storage);
    }

    /// Allocate and bind a frame slot for a declaration
    pub fn declare_slot(&mut self, dec: VarDecId) -> CodegenResult<StackSlot> {
        let ty = self.var_dec_type(dec)?;
        let ir_ty = slot_type(&self.ast.types, ty, self.pointer)?;
        let slot = self.builder.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            ir_ty.bytes(),
        ));
        trace!("slot {} for `{}` ({})", slot, self.ast.var_dec(dec).name, ir_ty);
        self.bind(dec, Storage::Slot(slot));
        Ok(slot)
    }

    /// Address to pass for a captured variable
    fn storage_address(&mut self, dec: VarDecId) -> CodegenResult<Value> {
        match self.locals.get(&dec).copied() {
            Some(Storage::Slot(slot)) => Ok(self.builder.ins().stack_addr(self.pointer, slot, 0)),
            Some(Storage::Pointer(ptr)) => Ok(ptr),
            None => Err(CodegenError::InternalError(format!(
                "captured variable `{}` has no storage in the caller",
                self.ast.var_dec(dec).name
            ))),
        }
    }

    fn exp_type(&self, id: ExpId) -> CodegenResult<TypeId> {
        self.ast
            .exp(id)
            .ty
            .ok_or_else(|| CodegenError::MissingType(format!("expression {}", id)))
    }

    fn var_type(&self, id: VarId) -> CodegenResult<TypeId> {
        self.ast
            .var(id)
            .ty
            .ok_or_else(|| CodegenError::MissingType(format!("variable {}", id)))
    }

    fn var_dec_type(&self, id: VarDecId) -> CodegenResult<TypeId> {
        let dec = self.ast.var_dec(id);
        dec.ty
            .ok_or_else(|| CodegenError::MissingType(format!("declaration of `{}`", dec.name)))
    }

    fn lower(&self, ty: TypeId) -> CodegenResult<Option<Type>> {
        lower_type(&self.ast.types, ty, self.pointer)
    }

    fn zero(&mut self) -> Value {
        self.builder.ins().iconst(types::I32, 0)
    }

    fn load(&mut self, ty: Type, address: Address) -> Value {
        match address {
            Address::Slot(slot) => self.builder.ins().stack_load(ty, slot, 0),
            Address::Pointer(ptr) => self.builder.ins().load(ty, MemFlags::new(), ptr, 0),
        }
    }

    fn store(&mut self, value: Value, address: Address) {
        match address {
            Address::Slot(slot) => {
                self.builder.ins().stack_store(value, slot, 0);
            }
            Address::Pointer(ptr) => {
                self.builder.ins().store(MemFlags::new(), value, ptr, 0);
            }
        }
    }

    fn call_function(&mut self, func: FuncId, args: &[Value]) -> Option<Value> {
        let func_ref = self.cx.module.declare_func_in_func(func, self.builder.func);
        let call = self.builder.ins().call(func_ref, args);
        self.builder.inst_results(call).first().copied()
    }

    fn call_helper(&mut self, func: FuncId, args: &[Value]) -> CodegenResult<Value> {
        self.call_function(func, args)
            .ok_or_else(|| CodegenError::InternalError("runtime helper returned no value".to_string()))
    }

    /// Lower an expression to its value
    pub fn translate_exp(&mut self, id: ExpId) -> CodegenResult<Value> {
        let ast = self.ast;
        match &ast.exp(id).kind {
            ExpKind::Nil => self.translate_nil(id),
            ExpKind::Int(value) => Ok(self.builder.ins().iconst(types::I32, i64::from(*value))),
            ExpKind::Str(text) => self.translate_string(text),
            ExpKind::Var(var) => self.translate_read(*var),
            ExpKind::Call { callee, args } => self.translate_call(*callee, args),
            ExpKind::Op { left, oper, right } => self.translate_op(*left, *oper, *right),
            ExpKind::Record { fields, .. } => self.translate_record(id, fields),
            ExpKind::Seq(exps) => {
                let mut value = None;
                for exp in exps {
                    value = Some(self.translate_exp(*exp)?);
                }
                Ok(match value {
                    Some(value) => value,
                    None => self.zero(),
                })
            }
            ExpKind::Assign { var, exp } => {
                let value = self.translate_exp(*exp)?;
                let address = self.access_var(*var)?;
                self.store(value, address);
                Ok(self.zero())
            }
            ExpKind::If {
                test,
                then_clause,
                else_clause,
            } => self.translate_if(id, *test, *then_clause, *else_clause),
            ExpKind::While { test, body } => self.translate_while(id, *test, *body),
            ExpKind::For { index, hi, body } => self.translate_for(id, *index, *hi, *body),
            ExpKind::Break { target } => self.translate_break(id, *target),
            ExpKind::Let { chunks, body } => {
                for chunk in chunks {
                    match chunk {
                        Chunk::Functions(decs) => functions::compile_chunk(self.cx, decs)?,
                        Chunk::Types(_) => {}
                        Chunk::Var(dec) => self.translate_var_dec(*dec)?,
                    }
                }
                self.translate_exp(*body)
            }
            ExpKind::Array { size, init, .. } => self.translate_array(id, *size, *init),
            ExpKind::Cast { exp, .. } => self.translate_cast(id, *exp),
        }
    }

    fn translate_nil(&mut self, id: ExpId) -> CodegenResult<Value> {
        let ty = self.exp_type(id)?;
        let table = &self.ast.types;
        match table.actual_type(ty) {
            SourceType::Nil {
                record: Some(record),
            } => {
                self.cx.layouts.record(table, *record)?;
                Ok(self.builder.ins().iconst(self.pointer, 0))
            }
            _ => Err(CodegenError::UnexpectedType(format!(
                "nil literal {} has type {}",
                id,
                table.display(ty)
            ))),
        }
    }

    /// NUL-terminated constant, addressed by pointer
    fn translate_string(&mut self, text: &str) -> CodegenResult<Value> {
        let mut data = DataDescription::new();
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        data.define(bytes.into_boxed_slice());

        let data_id = self
            .cx
            .module
            .declare_anonymous_data(false, false)
            .map_err(|e| CodegenError::Module(format!("failed to declare string data: {}", e)))?;
        self.cx
            .module
            .define_data(data_id, &data)
            .map_err(|e| CodegenError::Module(format!("failed to define string data: {}", e)))?;

        let global = self.cx.module.declare_data_in_func(data_id, self.builder.func);
        Ok(self.builder.ins().global_value(self.pointer, global))
    }

    fn translate_read(&mut self, var: VarId) -> CodegenResult<Value> {
        let ty = self.var_type(var)?;
        match self.lower(ty)? {
            // `void` variables have no real storage.
            None => Ok(self.zero()),
            Some(ir_ty) => {
                let address = self.access_var(var)?;
                Ok(self.load(ir_ty, address))
            }
        }
    }

    /// Address of an lvalue
    pub fn access_var(&mut self, var: VarId) -> CodegenResult<Address> {
        let ast = self.ast;
        let pointer = self.pointer;
        match &ast.var(var).kind {
            VarKind::Simple { name, def } => match self.locals.get(def) {
                Some(Storage::Slot(slot)) => Ok(Address::Slot(*slot)),
                Some(Storage::Pointer(ptr)) => Ok(Address::Pointer(*ptr)),
                None => Err(CodegenError::InternalError(format!(
                    "`{}` has no storage in this function",
                    name
                ))),
            },
            VarKind::Subscript { base, index } => {
                let array_ty = self.var_type(*base)?;
                let element_size = self.cx.layouts.element_size(&ast.types, array_ty)?;
                let base_address = self.access_var(*base)?;
                let array = self.load(pointer, base_address);
                let index = self.translate_exp(*index)?;
                let index = if pointer == types::I32 {
                    index
                } else {
                    self.builder.ins().sextend(pointer, index)
                };
                let offset = self.builder.ins().imul_imm(index, i64::from(element_size));
                Ok(Address::Pointer(self.builder.ins().iadd(array, offset)))
            }
            VarKind::Field { base, name } => {
                let record_ty = self.var_type(*base)?;
                let offset = {
                    let layout = self.cx.layouts.record(&ast.types, record_ty)?;
                    let (_, slot) = layout.field(name).ok_or_else(|| {
                        CodegenError::UnexpectedType(format!(
                            "record {} has no field `{}`",
                            ast.types.display(record_ty),
                            name
                        ))
                    })?;
                    slot.offset
                };
                let base_address = self.access_var(*base)?;
                let record = self.load(pointer, base_address);
                Ok(Address::Pointer(
                    self.builder.ins().iadd_imm(record, i64::from(offset)),
                ))
            }
        }
    }

    fn translate_call(&mut self, callee: FunDecId, args: &[ExpId]) -> CodegenResult<Value> {
        let (func, captures, symbol) = {
            let info = self.cx.function(callee)?;
            (info.id, info.captures.clone(), info.symbol.clone())
        };

        let mut values = Vec::with_capacity(captures.len() + args.len());
        for dec in captures {
            values.push(self.storage_address(dec)?);
        }
        for arg in args {
            values.push(self.translate_exp(*arg)?);
        }
        trace!("call {} with {} arguments", symbol, values.len());

        Ok(match self.call_function(func, &values) {
            Some(result) => result,
            None => self.zero(),
        })
    }

    fn translate_op(&mut self, left: ExpId, oper: Oper, right: ExpId) -> CodegenResult<Value> {
        let lhs = self.translate_exp(left)?;
        let rhs = self.translate_exp(right)?;
        let cc = match oper {
            Oper::Add => return Ok(self.builder.ins().iadd(lhs, rhs)),
            Oper::Sub => return Ok(self.builder.ins().isub(lhs, rhs)),
            Oper::Mul => return Ok(self.builder.ins().imul(lhs, rhs)),
            Oper::Div => return Ok(self.builder.ins().sdiv(lhs, rhs)),
            Oper::Eq => IntCC::Equal,
            Oper::Ne => IntCC::NotEqual,
            Oper::Lt => IntCC::SignedLessThan,
            Oper::Le => IntCC::SignedLessThanOrEqual,
            Oper::Gt => IntCC::SignedGreaterThan,
            Oper::Ge => IntCC::SignedGreaterThanOrEqual,
        };
        let flag = self.builder.ins().icmp(cc, lhs, rhs);
        Ok(self.builder.ins().uextend(types::I32, flag))
    }

    fn translate_record(&mut self, id: ExpId, inits: &[FieldInit]) -> CodegenResult<Value> {
        let ty = self.exp_type(id)?;
        let layout = self.cx.layouts.record(&self.ast.types, ty)?.clone();

        let size = self
            .builder
            .ins()
            .iconst(self.pointer, i64::from(layout.allocation_size()));
        let malloc = self.cx.runtime.malloc;
        let record = self.call_helper(malloc, &[size])?;

        for slot in &layout.fields {
            let init = inits
                .iter()
                .find(|init| init.name == slot.name)
                .ok_or_else(|| {
                    CodegenError::InternalError(format!(
                        "record construction {} does not initialize `{}`",
                        id, slot.name
                    ))
                })?;
            let value = self.translate_exp(init.init)?;
            self.builder
                .ins()
                .store(MemFlags::new(), value, record, slot.offset as i32);
        }
        Ok(record)
    }

    fn translate_if(
        &mut self,
        id: ExpId,
        test: ExpId,
        then_clause: ExpId,
        else_clause: ExpId,
    ) -> CodegenResult<Value> {
        let ty = self.exp_type(id)?;
        let merge_ty = if self.ast.types.is_void(ty) {
            None
        } else {
            let then_ty = self.exp_type(then_clause)?;
            self.lower(then_ty)?
        };

        let cond = self.translate_exp(test)?;
        let then_block = self.builder.create_block();
        let else_block = self.builder.create_block();
        let merge_block = self.builder.create_block();
        let merged = merge_ty.map(|ty| self.builder.append_block_param(merge_block, ty));
        self.builder
            .ins()
            .brif(cond, then_block, &[], else_block, &[]);

        self.builder.switch_to_block(then_block);
        self.builder.seal_block(then_block);
        let then_value = self.translate_exp(then_clause)?;
        self.jump_to_merge(merge_block, merge_ty, then_value);

        self.builder.switch_to_block(else_block);
        self.builder.seal_block(else_block);
        let else_value = self.translate_exp(else_clause)?;
        self.jump_to_merge(merge_block, merge_ty, else_value);

        self.builder.switch_to_block(merge_block);
        self.builder.seal_block(merge_block);
        Ok(match merged {
            Some(value) => value,
            None => self.zero(),
        })
    }

    fn jump_to_merge(&mut self, merge: Block, merge_ty: Option<Type>, value: Value) {
        match merge_ty {
            Some(_) => self.builder.ins().jump(merge, &[value]),
            None => self.builder.ins().jump(merge, &[]),
        };
    }

    fn translate_while(&mut self, id: ExpId, test: ExpId, body: ExpId) -> CodegenResult<Value> {
        let test_block = self.builder.create_block();
        let body_block = self.builder.create_block();
        let exit_block = self.builder.create_block();
        self.loop_exits.insert(id, exit_block);

        self.builder.ins().jump(test_block, &[]);
        self.builder.switch_to_block(test_block);
        let cond = self.translate_exp(test)?;
        self.builder
            .ins()
            .brif(cond, body_block, &[], exit_block, &[]);

        self.builder.switch_to_block(body_block);
        self.builder.seal_block(body_block);
        self.translate_exp(body)?;
        self.builder.ins().jump(test_block, &[]);
        self.builder.seal_block(test_block);

        self.builder.switch_to_block(exit_block);
        self.builder.seal_block(exit_block);
        Ok(self.zero())
    }

    /// `for index := lo to hi do body`
    ///
    /// `hi` is evaluated once. The index is compared with `hi` before it is
    /// incremented, so a bound of `i32::MAX` terminates.
    fn translate_for(
        &mut self,
        id: ExpId,
        index: VarDecId,
        hi: ExpId,
        body: ExpId,
    ) -> CodegenResult<Value> {
        let slot = self.declare_slot(index)?;
        let lo = self.ast.var_dec(index).init.ok_or_else(|| {
            CodegenError::InternalError(format!("loop index of {} has no lower bound", id))
        })?;
        let lo = self.translate_exp(lo)?;
        self.builder.ins().stack_store(lo, slot, 0);
        let hi = self.translate_exp(hi)?;

        let body_block = self.builder.create_block();
        let step_block = self.builder.create_block();
        let exit_block = self.builder.create_block();
        self.loop_exits.insert(id, exit_block);

        let enter = self
            .builder
            .ins()
            .icmp(IntCC::SignedLessThanOrEqual, lo, hi);
        self.builder
            .ins()
            .brif(enter, body_block, &[], exit_block, &[]);

        self.builder.switch_to_block(body_block);
        self.translate_exp(body)?;
        let current = self.builder.ins().stack_load(types::I32, slot, 0);
        let done = self.builder.ins().icmp(IntCC::Equal, current, hi);
        self.builder
            .ins()
            .brif(done, exit_block, &[], step_block, &[]);

        self.builder.switch_to_block(step_block);
        self.builder.seal_block(step_block);
        let next = self.builder.ins().iadd_imm(current, 1);
        self.builder.ins().stack_store(next, slot, 0);
        self.builder.ins().jump(body_block, &[]);
        self.builder.seal_block(body_block);

        self.builder.switch_to_block(exit_block);
        self.builder.seal_block(exit_block);
        Ok(self.zero())
    }

    fn translate_break(&mut self, id: ExpId, target: Option<ExpId>) -> CodegenResult<Value> {
        let exit = target
            .and_then(|target| self.loop_exits.get(&target).copied())
            .ok_or_else(|| {
                CodegenError::InternalError(format!("break {} has no enclosing loop", id))
            })?;
        self.builder.ins().jump(exit, &[]);

        // Code after the break is unreachable but must still be lowered.
        let dead = self.builder.create_block();
        self.builder.switch_to_block(dead);
        self.builder.seal_block(dead);
        Ok(self.zero())
    }

    fn translate_var_dec(&mut self, dec: VarDecId) -> CodegenResult<()> {
        let slot = self.declare_slot(dec)?;
        let init = self.ast.var_dec(dec).init.ok_or_else(|| {
            CodegenError::InternalError(format!(
                "local `{}` has no initializer",
                self.ast.var_dec(dec).name
            ))
        })?;
        let value = self.translate_exp(init)?;
        self.builder.ins().stack_store(value, slot, 0);
        Ok(())
    }

    fn translate_array(&mut self, id: ExpId, size: ExpId, init: ExpId) -> CodegenResult<Value> {
        let ty = self.exp_type(id)?;
        let table = &self.ast.types;
        let element_size = self.cx.layouts.element_size(table, ty)?;
        let scalar = match table.array_element(ty) {
            Some(element) => matches!(table.actual_type(element), SourceType::Int | SourceType::Void),
            None => true,
        };

        let count = self.translate_exp(size)?;
        let init = self.translate_exp(init)?;
        let init_ty = self.builder.func.dfg.value_type(init);
        let init = if init_ty == types::I64 {
            init
        } else if scalar {
            self.builder.ins().sextend(types::I64, init)
        } else {
            self.builder.ins().uextend(types::I64, init)
        };
        let element_size = self.builder.ins().iconst(types::I32, i64::from(element_size));

        let init_array = self.cx.runtime.init_array;
        self.call_helper(init_array, &[count, init, element_size])
    }

    /// Reinterpret a value as the cast's target representation
    fn translate_cast(&mut self, id: ExpId, exp: ExpId) -> CodegenResult<Value> {
        let value = self.translate_exp(exp)?;
        let target = match self.lower(self.exp_type(id)?)? {
            Some(target) => target,
            None => return Ok(self.zero()),
        };
        let current = self.builder.func.dfg.value_type(value);
        Ok(if current == target {
            value
        } else if current.bits() > target.bits() {
            self.builder.ins().ireduce(target, value)
        } else {
            self.builder.ins().uextend(target, value)
        })
    }
}
