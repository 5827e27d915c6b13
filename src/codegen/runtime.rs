//! Runtime support for generated code
//!
//! Generated code calls two helpers besides the program's own primitives:
//!
//! - `malloc(size) -> ptr` allocates record storage
//! - `tc_init_array(count: i32, init: i64, elem_size: i32) -> ptr` allocates
//!   an array and fills every element with `init`, truncated to `elem_size`
//!
//! An object file links them against the C library and the language
//! runtime. For in-process execution, [`tc_init_array`] below is registered
//! with the JIT and `malloc` resolves to the host C library.

use super::{CodegenError, CodegenResult};
use cranelift_codegen::ir::{types, AbiParam, Type};
use cranelift_module::{FuncId, Linkage, Module};
use std::alloc::{alloc, Layout};

pub const MALLOC: &str = "malloc";
pub const INIT_ARRAY: &str = "tc_init_array";

/// Prefix of primitives provided by the runtime
pub const PRIMITIVE_PREFIX: &str = "tc_";
/// Exported symbol of the program entry point `_main`
pub const MAIN_SYMBOL: &str = "tc_main";

/// Helper functions declared in a module
#[derive(Debug, Clone, Copy)]
pub struct RuntimeFunctions {
    pub malloc: FuncId,
    pub init_array: FuncId,
}

impl RuntimeFunctions {
    /// Declare the helpers as imports of `module`
    pub fn declare(module: &mut dyn Module, pointer: Type) -> CodegenResult<Self> {
        let mut malloc_sig = module.make_signature();
        malloc_sig.params.push(AbiParam::new(pointer));
        malloc_sig.returns.push(AbiParam::new(pointer));
        let malloc = module
            .declare_function(MALLOC, Linkage::Import, &malloc_sig)
            .map_err(|e| CodegenError::Module(format!("failed to declare {}: {}", MALLOC, e)))?;

        let mut init_sig = module.make_signature();
        init_sig.params.push(AbiParam::new(types::I32));
        init_sig.params.push(AbiParam::new(types::I64));
        init_sig.params.push(AbiParam::new(types::I32));
        init_sig.returns.push(AbiParam::new(pointer));
        let init_array = module
            .declare_function(INIT_ARRAY, Linkage::Import, &init_sig)
            .map_err(|e| CodegenError::Module(format!("failed to declare {}: {}", INIT_ARRAY, e)))?;

        Ok(Self { malloc, init_array })
    }
}

/// Allocate `count` elements of `elem_size` bytes, each holding `init`
///
/// Storage is never reclaimed. A non-positive count yields a valid pointer
/// to a one-element block.
pub extern "C" fn tc_init_array(count: i32, init: i64, elem_size: i32) -> *mut u8 {
    let count = count.max(0) as usize;
    let elem_size = match elem_size {
        8 => 8usize,
        _ => 4usize,
    };
    let bytes = count.max(1) * elem_size;
    let layout = match Layout::from_size_align(bytes, 8) {
        Ok(layout) => layout,
        Err(_) => return std::ptr::null_mut(),
    };
    // SAFETY: `layout` has a non-zero size.
    let base = unsafe { alloc(layout) };
    if base.is_null() {
        return base;
    }
    for i in 0..count {
        // SAFETY: element `i` lies within the `count * elem_size` bytes just
        // allocated, and the block is 8-aligned so every element is aligned.
        unsafe {
            let slot = base.add(i * elem_size);
            if elem_size == 8 {
                (slot as *mut i64).write(init);
            } else {
                (slot as *mut i32).write(init as i32);
            }
        }
    }
    base
}

/// Helper symbols to register with an in-process module
pub fn jit_symbols() -> Vec<(&'static str, *const u8)> {
    vec![(INIT_ARRAY, tc_init_array as *const u8)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_array_fills_scalars() {
        let base = tc_init_array(3, -7, 4) as *const i32;
        let values: Vec<i32> = (0..3).map(|i| unsafe { *base.add(i) }).collect();
        assert_eq!(values, vec![-7, -7, -7]);
    }

    #[test]
    fn test_init_array_fills_pointers() {
        let marker = 0x1234_5678_9abc_i64;
        let base = tc_init_array(2, marker, 8) as *const i64;
        assert_eq!(unsafe { *base.add(1) }, marker);
    }

    #[test]
    fn test_empty_array_is_not_null() {
        assert!(!tc_init_array(0, 0, 4).is_null());
    }
}
