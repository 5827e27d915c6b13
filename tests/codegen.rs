//! Code generation integration tests
//!
//! Programs are lowered through the JIT backend and executed in-process.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::sync::atomic::{AtomicI32, Ordering};

use tiger_lift::ast::{Ast, AstBuilder, Chunk, ExpKind, FunctionDec, Oper};
use tiger_lift::codegen::{compile_jit, CodegenConfig, CodegenError, JitProgram};
use tiger_lift::types::TypeTable;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn run(ast: &Ast, symbols: &[(&str, *const u8)]) -> JitProgram {
    init_logger();
    let config = CodegenConfig::builder().retain_ir(true).build();
    match compile_jit(ast, &config, symbols) {
        Ok(program) => program,
        Err(err) => panic!("code generation failed: {}", err),
    }
}

fn entry(program: &JitProgram, name: &str) -> *const u8 {
    program
        .function_ptr(name)
        .unwrap_or_else(|| panic!("no function `{}`", name))
}

fn ir<'p>(program: &'p JitProgram, name: &str) -> &'p str {
    program
        .functions()
        .iter()
        .find(|info| info.name == name)
        .and_then(|info| info.ir.as_deref())
        .unwrap_or_else(|| panic!("no IR retained for `{}`", name))
}

static PRINTED: AtomicI32 = AtomicI32::new(0);

extern "C" fn tc_print_int(value: i32) {
    PRINTED.store(value, Ordering::SeqCst);
}

extern "C" fn tc_size(text: *const c_char) -> i32 {
    // SAFETY: generated code passes NUL-terminated string constants.
    unsafe { CStr::from_ptr(text) }.to_bytes().len() as i32
}

/// `function add(a: int, b: int): int = a + b`
#[test]
fn test_straight_line_function() {
    let mut b = AstBuilder::new();
    let int = b.int_ty();
    let a = b.formal("a", int);
    let bb = b.formal("b", int);
    let left = b.read(a);
    let right = b.read(bb);
    let sum = b.op(left, Oper::Add, right);
    let add = b.function("add", vec![a, bb], Some(int));
    b.define(add, sum);
    let ast = b.finish(vec![Chunk::Functions(vec![add])]);

    let program = run(&ast, &[]);
    let info = program.functions().iter().find(|info| info.name == "add").unwrap();
    assert_eq!(info.arity(), 2);
    assert!(info.captures.is_empty());
    assert_eq!(ir(&program, "add").matches(" = iadd ").count(), 1);

    let add: extern "C" fn(i32, i32) -> i32 = unsafe { std::mem::transmute(entry(&program, "add")) };
    assert_eq!(add(2, 3), 5);
    assert_eq!(add(-7, 4), -3);
}

/// ```text
/// function outer(n: int): int =
///   let var x := n
///       function inner(k: int): int = x + k
///   in inner(1) + inner(2) end
/// ```
#[test]
fn test_nested_function_reads_captured_variable() {
    let mut b = AstBuilder::new();
    let int = b.int_ty();
    let n = b.formal("n", int);
    let read_n = b.read(n);
    let x = b.var_dec("x", None, read_n);

    let k = b.formal("k", int);
    let read_x = b.read(x);
    let read_k = b.read(k);
    let inner_sum = b.op(read_x, Oper::Add, read_k);
    let inner = b.function("inner", vec![k], Some(int));
    b.define(inner, inner_sum);

    let one = b.int(1);
    let two = b.int(2);
    let first = b.call(inner, vec![one]);
    let second = b.call(inner, vec![two]);
    let total = b.op(first, Oper::Add, second);
    let body = b.let_exp(vec![Chunk::Var(x), Chunk::Functions(vec![inner])], total);
    let outer = b.function("outer", vec![n], Some(int));
    b.define(outer, body);
    let ast = b.finish(vec![Chunk::Functions(vec![outer])]);

    let program = run(&ast, &[]);
    let info = program.functions().iter().find(|info| info.name == "inner").unwrap();
    assert_eq!(info.captures, vec![x]);
    assert_eq!(info.arity(), 2);
    assert_eq!(info.param_names, vec!["x".to_string(), "k".to_string()]);
    assert!(ir(&program, "outer").contains("stack_addr"));

    let outer: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(entry(&program, "outer")) };
    assert_eq!(outer(10), 23);
}

/// Writes through a capture land in the owner's frame
#[test]
fn test_nested_function_writes_captured_variable() {
    let mut b = AstBuilder::new();
    let int = b.int_ty();
    let zero = b.int(0);
    let x = b.var_dec("x", None, zero);

    let read_x = b.read(x);
    let one = b.int(1);
    let incremented = b.op(read_x, Oper::Add, one);
    let target = b.simple_var(x);
    let bump_body = b.assign(target, incremented);
    let bump = b.function("bump", vec![], None);
    b.define(bump, bump_body);

    let calls: Vec<_> = (0..3).map(|_| b.call(bump, vec![])).collect();
    let result = b.read(x);
    let mut steps = calls;
    steps.push(result);
    let seq = b.seq(steps);
    let body = b.let_exp(vec![Chunk::Var(x), Chunk::Functions(vec![bump])], seq);
    let counter = b.function("counter", vec![], Some(int));
    b.define(counter, body);
    let ast = b.finish(vec![Chunk::Functions(vec![counter])]);

    let program = run(&ast, &[]);
    let counter: extern "C" fn() -> i32 = unsafe { std::mem::transmute(entry(&program, "counter")) };
    assert_eq!(counter(), 3);
}

/// Captures reach a function through nesting and through sibling calls
#[test]
fn test_transitive_captures() {
    // outer(n) = let var x := n
    //                function middle(): int = let function leaf(): int = x * 2 in leaf() + 1 end
    //                function sibling(): int = middle()
    //            in sibling() end
    let mut b = AstBuilder::new();
    let int = b.int_ty();
    let n = b.formal("n", int);
    let read_n = b.read(n);
    let x = b.var_dec("x", None, read_n);

    let read_x = b.read(x);
    let two = b.int(2);
    let doubled = b.op(read_x, Oper::Mul, two);
    let leaf = b.function("leaf", vec![], Some(int));
    b.define(leaf, doubled);
    let call_leaf = b.call(leaf, vec![]);
    let one = b.int(1);
    let plus_one = b.op(call_leaf, Oper::Add, one);
    let middle_body = b.let_exp(vec![Chunk::Functions(vec![leaf])], plus_one);
    let middle = b.function("middle", vec![], Some(int));
    b.define(middle, middle_body);

    let call_middle = b.call(middle, vec![]);
    let sibling = b.function("sibling", vec![], Some(int));
    b.define(sibling, call_middle);

    let call_sibling = b.call(sibling, vec![]);
    let body = b.let_exp(
        vec![Chunk::Var(x), Chunk::Functions(vec![middle, sibling])],
        call_sibling,
    );
    let outer = b.function("outer", vec![n], Some(int));
    b.define(outer, body);
    let ast = b.finish(vec![Chunk::Functions(vec![outer])]);

    let program = run(&ast, &[]);
    for name in ["leaf", "middle", "sibling"] {
        let info = program.functions().iter().find(|info| info.name == name).unwrap();
        assert_eq!(info.captures, vec![x], "captures of {}", name);
    }

    let outer: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(entry(&program, "outer")) };
    assert_eq!(outer(4), 9);
}

/// `for i := 1 to n do s := s + i`
#[test]
fn test_for_loop() {
    let mut b = AstBuilder::new();
    let int = b.int_ty();
    let n = b.formal("n", int);
    let zero = b.int(0);
    let s = b.var_dec("s", None, zero);

    let lo = b.int(1);
    let i = b.loop_index("i", lo);
    let hi = b.read(n);
    let read_s = b.read(s);
    let read_i = b.read(i);
    let sum = b.op(read_s, Oper::Add, read_i);
    let target = b.simple_var(s);
    let step = b.assign(target, sum);
    let for_exp = b.for_exp(i, hi, step);
    let result = b.read(s);
    let seq = b.seq(vec![for_exp, result]);
    let body = b.let_exp(vec![Chunk::Var(s)], seq);
    let total = b.function("total", vec![n], Some(int));
    b.define(total, body);
    let ast = b.finish(vec![Chunk::Functions(vec![total])]);

    let program = run(&ast, &[]);
    let total: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(entry(&program, "total")) };
    assert_eq!(total(10), 55);
    assert_eq!(total(1), 1);
    assert_eq!(total(0), 0);
    assert_eq!(total(-5), 0);
}

/// A loop up to the largest int stops instead of wrapping around
#[test]
fn test_for_loop_up_to_max_int() {
    let mut b = AstBuilder::new();
    let int = b.int_ty();
    let zero = b.int(0);
    let count = b.var_dec("count", None, zero);

    let lo = b.int(i32::MAX - 2);
    let i = b.loop_index("i", lo);
    let hi = b.int(i32::MAX);
    let read_count = b.read(count);
    let one = b.int(1);
    let next = b.op(read_count, Oper::Add, one);
    let target = b.simple_var(count);
    let step = b.assign(target, next);
    let for_exp = b.for_exp(i, hi, step);
    let result = b.read(count);
    let seq = b.seq(vec![for_exp, result]);
    let body = b.let_exp(vec![Chunk::Var(count)], seq);
    let iterations = b.function("iterations", vec![], Some(int));
    b.define(iterations, body);
    let ast = b.finish(vec![Chunk::Functions(vec![iterations])]);

    let program = run(&ast, &[]);
    let iterations: extern "C" fn() -> i32 =
        unsafe { std::mem::transmute(entry(&program, "iterations")) };
    assert_eq!(iterations(), 3);
}

/// A break nested in conditionals leaves only the innermost loop
#[test]
fn test_break_targets_innermost_loop() {
    // let var outer := 0 var inner := 0 in
    //   while outer < n do
    //     (outer := outer + 1;
    //      while 1 do
    //        (inner := inner + 1;
    //         if 1 then if inner = outer * 2 then break));
    //   inner
    // end
    let mut b = AstBuilder::new();
    let int = b.int_ty();
    let n = b.formal("n", int);
    let zero = b.int(0);
    let outer_count = b.var_dec("outer_count", None, zero);
    let zero = b.int(0);
    let inner_count = b.var_dec("inner_count", None, zero);

    let read_inner = b.read(inner_count);
    let one = b.int(1);
    let inner_next = b.op(read_inner, Oper::Add, one);
    let inner_target = b.simple_var(inner_count);
    let inner_step = b.assign(inner_target, inner_next);
    let read_inner = b.read(inner_count);
    let read_outer = b.read(outer_count);
    let two = b.int(2);
    let limit = b.op(read_outer, Oper::Mul, two);
    let reached = b.op(read_inner, Oper::Eq, limit);
    let brk = b.break_exp();
    let guarded = b.if_then(reached, brk);
    let always = b.int(1);
    let nested = b.if_then(always, guarded);
    let inner_body = b.seq(vec![inner_step, nested]);
    let forever = b.int(1);
    let inner_loop = b.while_exp(forever, inner_body);

    let read_outer = b.read(outer_count);
    let one = b.int(1);
    let outer_next = b.op(read_outer, Oper::Add, one);
    let outer_target = b.simple_var(outer_count);
    let outer_step = b.assign(outer_target, outer_next);
    let outer_body = b.seq(vec![outer_step, inner_loop]);
    let read_outer = b.read(outer_count);
    let read_n = b.read(n);
    let test = b.op(read_outer, Oper::Lt, read_n);
    let outer_loop = b.while_exp(test, outer_body);

    let result = b.read(inner_count);
    let seq = b.seq(vec![outer_loop, result]);
    let body = b.let_exp(vec![Chunk::Var(outer_count), Chunk::Var(inner_count)], seq);
    let loops = b.function("loops", vec![n], Some(int));
    b.define(loops, body);
    let ast = b.finish(vec![Chunk::Functions(vec![loops])]);

    assert!(matches!(
        ast.exp(brk).kind,
        ExpKind::Break { target: Some(target) } if target == inner_loop
    ));

    let program = run(&ast, &[]);
    let loops: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(entry(&program, "loops")) };
    assert_eq!(loops(3), 6);
    assert_eq!(loops(0), 0);
}

/// Conditionals with and without a value
#[test]
fn test_if_expressions() {
    let mut b = AstBuilder::new();
    let int = b.int_ty();

    // pick(c) = if c then 10 else 20
    let c = b.formal("c", int);
    let test = b.read(c);
    let ten = b.int(10);
    let twenty = b.int(20);
    let choice = b.if_exp(test, ten, twenty);
    let pick = b.function("pick", vec![c], Some(int));
    b.define(pick, choice);

    // store(c) = let var y := 0 in (if c then y := 1 else y := 2; y) end
    let c = b.formal("c", int);
    let zero = b.int(0);
    let y = b.var_dec("y", None, zero);
    let test = b.read(c);
    let one = b.int(1);
    let two = b.int(2);
    let then_target = b.simple_var(y);
    let then_clause = b.assign(then_target, one);
    let else_target = b.simple_var(y);
    let else_clause = b.assign(else_target, two);
    let statement = b.if_exp(test, then_clause, else_clause);
    let result = b.read(y);
    let seq = b.seq(vec![statement, result]);
    let body = b.let_exp(vec![Chunk::Var(y)], seq);
    let store = b.function("store", vec![c], Some(int));
    b.define(store, body);

    let ast = b.finish(vec![Chunk::Functions(vec![pick, store])]);
    assert!(ast.types.is_void(ast.exp(statement).ty.unwrap()));

    let program = run(&ast, &[]);
    let pick: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(entry(&program, "pick")) };
    assert_eq!(pick(1), 10);
    assert_eq!(pick(0), 20);
    let store: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(entry(&program, "store")) };
    assert_eq!(store(7), 1);
    assert_eq!(store(0), 2);
}

/// A void conditional consumed as a value contributes zero
#[test]
fn test_void_if_used_as_value() {
    // settle(c) = let var y := 0 in (if c then y := 1 else y := 2) + 3 end
    let mut b = AstBuilder::new();
    let int = b.int_ty();
    let c = b.formal("c", int);
    let zero = b.int(0);
    let y = b.var_dec("y", None, zero);
    let test = b.read(c);
    let one = b.int(1);
    let two = b.int(2);
    let then_target = b.simple_var(y);
    let then_clause = b.assign(then_target, one);
    let else_target = b.simple_var(y);
    let else_clause = b.assign(else_target, two);
    let statement = b.if_exp(test, then_clause, else_clause);
    let three = b.int(3);
    let sum = b.op(statement, Oper::Add, three);
    let body = b.let_exp(vec![Chunk::Var(y)], sum);
    let settle = b.function("settle", vec![c], Some(int));
    b.define(settle, body);
    let ast = b.finish(vec![Chunk::Functions(vec![settle])]);
    assert!(ast.types.is_void(ast.exp(statement).ty.unwrap()));

    let program = run(&ast, &[]);
    let settle: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(entry(&program, "settle")) };
    assert_eq!(settle(1), 3);
    assert_eq!(settle(0), 3);
}

/// A break inside a counted loop leaves it before `hi`
#[test]
fn test_break_out_of_for_loop() {
    // partial(stop) = let var s := 0 in
    //   (for i := 1 to 100 do (s := s + i; if i = stop then break); s)
    // end
    let mut b = AstBuilder::new();
    let int = b.int_ty();
    let stop = b.formal("stop", int);
    let zero = b.int(0);
    let s = b.var_dec("s", None, zero);

    let lo = b.int(1);
    let i = b.loop_index("i", lo);
    let hi = b.int(100);
    let read_s = b.read(s);
    let read_i = b.read(i);
    let next = b.op(read_s, Oper::Add, read_i);
    let target = b.simple_var(s);
    let step = b.assign(target, next);
    let read_i = b.read(i);
    let read_stop = b.read(stop);
    let reached = b.op(read_i, Oper::Eq, read_stop);
    let brk = b.break_exp();
    let guarded = b.if_then(reached, brk);
    let loop_body = b.seq(vec![step, guarded]);
    let for_exp = b.for_exp(i, hi, loop_body);
    let result = b.read(s);
    let seq = b.seq(vec![for_exp, result]);
    let body = b.let_exp(vec![Chunk::Var(s)], seq);
    let partial = b.function("partial", vec![stop], Some(int));
    b.define(partial, body);
    let ast = b.finish(vec![Chunk::Functions(vec![partial])]);

    assert!(matches!(
        ast.exp(brk).kind,
        ExpKind::Break { target: Some(target) } if target == for_exp
    ));

    let program = run(&ast, &[]);
    let partial: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(entry(&program, "partial")) };
    assert_eq!(partial(4), 10);
    assert_eq!(partial(1), 1);
    // `stop` outside 1..=100 lets the loop run to completion.
    assert_eq!(partial(0), 5050);
}

/// Casts keep record pointers intact and resize scalars to the target width
#[test]
fn test_casts() {
    // type point = {x: int}
    // through_alias(a) = let var p := point {x = a} var q: point := (p : point) in q.x end
    // same_record(p: point): point = (p : point)
    // resize(n) = ((n : string) : int)
    let mut b = AstBuilder::new();
    let int = b.int_ty();
    let string = b.string_ty();
    let alias = b.types().named("point");
    let shape = b.record_ty(vec![("x", int)]);
    let point_dec = b.type_dec(alias, shape);
    let point = b.name_ty("point", alias);

    let a = b.formal("a", int);
    let read_a = b.read(a);
    let construction = b.record(point, vec![("x", read_a)]);
    let p = b.var_dec("p", None, construction);
    let read_p = b.read(p);
    let cast = b.cast(read_p, point);
    let q = b.var_dec("q", Some(point), cast);
    let base = b.simple_var(q);
    let field = b.field_var(base, "x");
    let read_x = b.var_exp(field);
    let body = b.let_exp(vec![Chunk::Var(p), Chunk::Var(q)], read_x);
    let through_alias = b.function("through_alias", vec![a], Some(int));
    b.define(through_alias, body);

    let record = b.formal("p", point);
    let read_record = b.read(record);
    let same = b.cast(read_record, point);
    let same_record = b.function("same_record", vec![record], Some(point));
    b.define(same_record, same);

    let n = b.formal("n", int);
    let read_n = b.read(n);
    let widened = b.cast(read_n, string);
    let narrowed = b.cast(widened, int);
    let resize = b.function("resize", vec![n], Some(int));
    b.define(resize, narrowed);

    let ast = b.finish(vec![
        Chunk::Types(vec![point_dec]),
        Chunk::Functions(vec![through_alias, same_record, resize]),
    ]);

    let program = run(&ast, &[]);
    let through_alias: extern "C" fn(i32) -> i32 =
        unsafe { std::mem::transmute(entry(&program, "through_alias")) };
    assert_eq!(through_alias(7), 7);

    let same_record: extern "C" fn(*const u8) -> *const u8 =
        unsafe { std::mem::transmute(entry(&program, "same_record")) };
    let pointer = 0x1000usize as *const u8;
    assert_eq!(same_record(pointer), pointer);
    assert!(!ir(&program, "same_record").contains("reduce"));

    let resize_ir = ir(&program, "resize");
    assert!(resize_ir.contains("uextend"));
    assert!(resize_ir.contains("ireduce"));
    let resize: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(entry(&program, "resize")) };
    assert_eq!(resize(41), 41);
}

#[test]
fn test_recursion() {
    // fib(n) = if n < 2 then n else fib(n - 1) + fib(n - 2)
    let mut b = AstBuilder::new();
    let int = b.int_ty();
    let n = b.formal("n", int);
    let fib = b.function("fib", vec![n], Some(int));

    let read_n = b.read(n);
    let two = b.int(2);
    let small = b.op(read_n, Oper::Lt, two);
    let base = b.read(n);
    let read_n = b.read(n);
    let one = b.int(1);
    let minus_one = b.op(read_n, Oper::Sub, one);
    let left = b.call(fib, vec![minus_one]);
    let read_n = b.read(n);
    let two = b.int(2);
    let minus_two = b.op(read_n, Oper::Sub, two);
    let right = b.call(fib, vec![minus_two]);
    let sum = b.op(left, Oper::Add, right);
    let body = b.if_exp(small, base, sum);
    b.define(fib, body);
    let ast = b.finish(vec![Chunk::Functions(vec![fib])]);

    let program = run(&ast, &[]);
    let fib: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(entry(&program, "fib")) };
    assert_eq!(fib(10), 55);
}

#[test]
fn test_mutual_recursion_within_a_chunk() {
    let mut b = AstBuilder::new();
    let int = b.int_ty();
    let n_even = b.formal("n", int);
    let even = b.function("even", vec![n_even], Some(int));
    let n_odd = b.formal("n", int);
    let odd = b.function("odd", vec![n_odd], Some(int));

    for (function, n, other, base) in [(even, n_even, odd, 1), (odd, n_odd, even, 0)] {
        let read_n = b.read(n);
        let zero = b.int(0);
        let done = b.op(read_n, Oper::Eq, zero);
        let base = b.int(base);
        let read_n = b.read(n);
        let one = b.int(1);
        let smaller = b.op(read_n, Oper::Sub, one);
        let recurse = b.call(other, vec![smaller]);
        let body = b.if_exp(done, base, recurse);
        b.define(function, body);
    }
    let ast = b.finish(vec![Chunk::Functions(vec![even, odd])]);

    let program = run(&ast, &[]);
    let even: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(entry(&program, "even")) };
    assert_eq!(even(10), 1);
    assert_eq!(even(7), 0);
}

/// Records are heap blocks; fields are stored by name whatever the listed order
#[test]
fn test_records() {
    // type point = {x: int, y: int}
    // points(a) = let var p: point := point {y = a, x = 1} in (p.y := p.y + 5; p.x + p.y) end
    // is_nil() = let var q: point := nil in if q = nil then 1 else 0 end
    let mut b = AstBuilder::new();
    let int = b.int_ty();
    let alias = b.types().named("point");
    let shape = b.record_ty(vec![("x", int), ("y", int)]);
    let point_dec = b.type_dec(alias, shape);
    let point = b.name_ty("point", alias);

    let a = b.formal("a", int);
    let read_a = b.read(a);
    let one = b.int(1);
    let construction = b.record(point, vec![("y", read_a), ("x", one)]);
    let p = b.var_dec("p", Some(point), construction);

    let base = b.simple_var(p);
    let field = b.field_var(base, "y");
    let read_y = b.var_exp(field);
    let five = b.int(5);
    let next = b.op(read_y, Oper::Add, five);
    let base = b.simple_var(p);
    let target = b.field_var(base, "y");
    let update = b.assign(target, next);

    let base = b.simple_var(p);
    let field = b.field_var(base, "x");
    let read_x = b.var_exp(field);
    let base = b.simple_var(p);
    let field = b.field_var(base, "y");
    let read_y = b.var_exp(field);
    let sum = b.op(read_x, Oper::Add, read_y);
    let seq = b.seq(vec![update, sum]);
    let body = b.let_exp(vec![Chunk::Types(vec![point_dec]), Chunk::Var(p)], seq);
    let points = b.function("points", vec![a], Some(int));
    b.define(points, body);

    let nil = b.nil(alias);
    let q = b.var_dec("q", Some(point), nil);
    let read_q = b.read(q);
    let nil = b.nil(alias);
    let is_nil = b.op(read_q, Oper::Eq, nil);
    let yes = b.int(1);
    let no = b.int(0);
    let answer = b.if_exp(is_nil, yes, no);
    let body = b.let_exp(vec![Chunk::Var(q)], answer);
    let check = b.function("is_nil", vec![], Some(int));
    b.define(check, body);

    let ast = b.finish(vec![Chunk::Functions(vec![points, check])]);

    let program = run(&ast, &[]);
    let points: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(entry(&program, "points")) };
    assert_eq!(points(2), 8);
    let check: extern "C" fn() -> i32 = unsafe { std::mem::transmute(entry(&program, "is_nil")) };
    assert_eq!(check(), 1);
}

#[test]
fn test_arrays() {
    // type ints = array of int
    // arrays(n) = let var a := ints [n] of 7 in (a[2] := 3; a[0] + a[2] + a[n - 1]) end
    let mut b = AstBuilder::new();
    let int = b.int_ty();
    let alias = b.types().named("ints");
    let shape = b.array_ty(int);
    let ints_dec = b.type_dec(alias, shape);
    let ints = b.name_ty("ints", alias);

    let n = b.formal("n", int);
    let size = b.read(n);
    let seven = b.int(7);
    let creation = b.array(ints, size, seven);
    let a = b.var_dec("a", Some(ints), creation);

    let base = b.simple_var(a);
    let two = b.int(2);
    let target = b.subscript_var(base, two);
    let three = b.int(3);
    let update = b.assign(target, three);

    let base = b.simple_var(a);
    let zero = b.int(0);
    let first = b.subscript_var(base, zero);
    let first = b.var_exp(first);
    let base = b.simple_var(a);
    let two = b.int(2);
    let third = b.subscript_var(base, two);
    let third = b.var_exp(third);
    let base = b.simple_var(a);
    let read_n = b.read(n);
    let one = b.int(1);
    let last_index = b.op(read_n, Oper::Sub, one);
    let last = b.subscript_var(base, last_index);
    let last = b.var_exp(last);
    let partial = b.op(first, Oper::Add, third);
    let sum = b.op(partial, Oper::Add, last);
    let seq = b.seq(vec![update, sum]);
    let body = b.let_exp(vec![Chunk::Types(vec![ints_dec]), Chunk::Var(a)], seq);
    let arrays = b.function("arrays", vec![n], Some(int));
    b.define(arrays, body);

    // same_string() = let var s := strings [3] of "hi" in if s[0] = s[2] then 1 else 0 end
    let string = b.string_ty();
    let strings = b.array_ty(string);
    let three = b.int(3);
    let hi = b.string("hi");
    let creation = b.array(strings, three, hi);
    let s = b.var_dec("s", Some(strings), creation);
    let base = b.simple_var(s);
    let zero = b.int(0);
    let first = b.subscript_var(base, zero);
    let first = b.var_exp(first);
    let base = b.simple_var(s);
    let two = b.int(2);
    let third = b.subscript_var(base, two);
    let third = b.var_exp(third);
    let same = b.op(first, Oper::Eq, third);
    let yes = b.int(1);
    let no = b.int(0);
    let answer = b.if_exp(same, yes, no);
    let body = b.let_exp(vec![Chunk::Var(s)], answer);
    let same_string = b.function("same_string", vec![], Some(int));
    b.define(same_string, body);

    let ast = b.finish(vec![Chunk::Functions(vec![arrays, same_string])]);

    let program = run(&ast, &[]);
    let arrays: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(entry(&program, "arrays")) };
    assert_eq!(arrays(5), 17);
    let same_string: extern "C" fn() -> i32 =
        unsafe { std::mem::transmute(entry(&program, "same_string")) };
    assert_eq!(same_string(), 1);
}

/// Primitives are imported as `tc_<name>` and `_main` is exported as `tc_main`
#[test]
fn test_primitives_and_entry_point() {
    let mut b = AstBuilder::new();
    let int = b.int_ty();
    let string = b.string_ty();

    let value = b.formal("value", int);
    let print_int = b.function("print_int", vec![value], None);
    let text = b.formal("text", string);
    let size = b.function("size", vec![text], Some(int));

    let hello = b.string("hello");
    let length = b.call(size, vec![hello]);
    let thirty_seven = b.int(37);
    let total = b.op(length, Oper::Add, thirty_seven);
    let print = b.call(print_int, vec![total]);
    let main = b.function("_main", vec![], None);
    b.define(main, print);
    let ast = b.finish(vec![
        Chunk::Functions(vec![print_int, size]),
        Chunk::Functions(vec![main]),
    ]);

    let program = run(
        &ast,
        &[
            ("tc_print_int", tc_print_int as *const u8),
            ("tc_size", tc_size as *const u8),
        ],
    );
    let symbols: Vec<(&str, &str, bool)> = program
        .functions()
        .iter()
        .map(|info| (info.name.as_str(), info.symbol.as_str(), info.is_primitive()))
        .collect();
    assert!(symbols.contains(&("print_int", "tc_print_int", true)));
    assert!(symbols.contains(&("size", "tc_size", true)));
    assert!(symbols.contains(&("_main", "tc_main", false)));
    assert!(program.function_ptr("print_int").is_none());

    let main: extern "C" fn() = unsafe { std::mem::transmute(entry(&program, "_main")) };
    main();
    assert_eq!(PRINTED.load(Ordering::SeqCst), 42);
}

#[test]
fn test_untyped_expression_is_rejected() {
    let mut ast = Ast::new();
    let body = ast.alloc_exp(ExpKind::Nil);
    let fn_ty = ast.types.function(Vec::new(), TypeTable::INT);
    let broken = ast.alloc_fun_dec(FunctionDec {
        name: "broken".to_string(),
        formals: Vec::new(),
        result: None,
        body: Some(body),
        ty: None,
    });
    ast.set_fun_dec_type(broken, fn_ty);
    ast.root = vec![Chunk::Functions(vec![broken])];

    init_logger();
    let result = compile_jit(&ast, &CodegenConfig::default(), &[]);
    assert!(matches!(result.err(), Some(CodegenError::MissingType(_))));
}

#[test]
fn test_nil_without_record_is_rejected() {
    let mut ast = Ast::new();
    let body = ast.alloc_exp(ExpKind::Nil);
    let nil = ast.types.nil(None);
    ast.set_exp_type(body, nil);
    let fn_ty = ast.types.function(Vec::new(), TypeTable::INT);
    let broken = ast.alloc_fun_dec(FunctionDec {
        name: "broken".to_string(),
        formals: Vec::new(),
        result: None,
        body: Some(body),
        ty: None,
    });
    ast.set_fun_dec_type(broken, fn_ty);
    ast.root = vec![Chunk::Functions(vec![broken])];

    init_logger();
    let result = compile_jit(&ast, &CodegenConfig::default(), &[]);
    assert!(matches!(result.err(), Some(CodegenError::UnexpectedType(_))));
}
