//! End-to-end lowering tests: source text in, C substrings out.

use carv_compiler::compile_source;

fn compile(source: &str) -> String {
    compile_source(source).expect("program should compile")
}

fn assert_contains(haystack: &str, needle: &str) {
    assert!(
        haystack.contains(needle),
        "expected generated C to contain `{needle}`\n---- generated ----\n{haystack}"
    );
}

// ============================================================================
// Runtime prologue
// ============================================================================

#[test]
fn test_prologue_present_for_any_program() {
    let c = compile("let x = 1;");
    assert_contains(&c, "#include <stdio.h>");
    assert_contains(&c, "typedef long long carv_int;");
    assert_contains(&c, "typedef double carv_float;");
    assert_contains(&c, "typedef bool carv_bool;");
    assert_contains(&c, "int main(void) {");
    assert_contains(&c, "return 0;");
    assert_contains(&c, "carv_arena_free_all();");
}

#[test]
fn test_string_runtime_for_string_programs() {
    let c = compile("let s = \"hi\";");
    assert_contains(&c, "const char* data;");
    assert_contains(&c, "carv_int length;");
    assert_contains(&c, "bool owned;");
    assert_contains(&c, "carv_string_lit");
    assert_contains(&c, "carv_string_clone");
    assert_contains(&c, "carv_string_drop");
}

#[test]
fn test_event_loop_only_for_async_programs() {
    let plain = compile("let x = 1;");
    assert!(!plain.contains("carv_event_loop"));

    let with_async = compile("async fn main() { let x = 1; }");
    assert_contains(&with_async, "carv_loop_run");
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[test]
fn test_let_int() {
    let c = compile("let x = 42;");
    assert_contains(&c, "carv_int x = 42;");
}

#[test]
fn test_string_binding_and_drop() {
    let c = compile("let s = \"hello\";");
    assert_contains(&c, "carv_string s = carv_string_lit(\"hello\");");
    assert_contains(&c, "carv_string_drop(&s);");
}

#[test]
fn test_function_single_exit() {
    let c = compile("fn add(a: int, b: int) -> int { return a + b; }");
    assert_contains(&c, "carv_int add(carv_int a, carv_int b) {");
    assert_contains(&c, "__carv_retval = (a + b);");
    assert_contains(&c, "goto __carv_exit;");
    assert_contains(&c, "__carv_exit:;");
    assert_eq!(c.matches("return __carv_retval;").count(), 1);
}

#[test]
fn test_class_with_method() {
    let c = compile(
        "class Counter { value: int = 0  fn increment() { self.value = self.value + 1; } }",
    );
    assert_contains(&c, "typedef struct Counter Counter;");
    assert_contains(&c, "struct Counter {");
    assert_contains(&c, "Counter* Counter_new(void)");
    assert_contains(&c, "void Counter_increment(Counter* self)");
    assert_contains(&c, "carv_arena_alloc(sizeof(Counter))");
    assert_contains(&c, "self->value = 0;");
    assert_contains(&c, "self->value = (self->value + 1);");
}

#[test]
fn test_interface_impl_and_cast() {
    let c = compile(
        "interface Printable { fn to_string(&self) -> string; }\n\
         class Person { name: string }\n\
         impl Printable for Person { fn to_string(&self) -> string { return self.name; } }\n\
         let p = new Person;\n\
         let item = &p as &Printable;",
    );
    assert_contains(&c, "} Printable_vtable;");
    assert_contains(&c, "} Printable_ref;");
    assert_contains(&c, "} Printable_mut_ref;");
    assert_contains(&c, "carv_string (*to_string)(const void* self);");
    assert_contains(&c, "static carv_string Printable__Person__to_string(const void* self)");
    assert_contains(&c, "const Person* p = (const Person*)self;");
    assert_contains(&c, "static const Printable_vtable Printable__Person__VT");
    assert_contains(&c, ".to_string = Printable__Person__to_string");
    assert_contains(&c, ".vt = &Printable__Person__VT");
    assert_contains(&c, "Printable_ref item =");
}

#[test]
fn test_closure_capturing_int() {
    let c = compile(
        "let x = 10;\n\
         let f = fn(y: int) -> int { return x + y; };\n\
         let r = f(5);",
    );
    assert_contains(&c, "} __closure_0_env;");
    assert_contains(&c, "    carv_int x;");
    assert_contains(
        &c,
        "static carv_int __closure_0_fn(__closure_0_env* __env, carv_int y)",
    );
    assert_contains(&c, "__env->x");
    assert_contains(
        &c,
        "__closure_0_env* __env_0 = (__closure_0_env*)carv_arena_alloc(sizeof(__closure_0_env));",
    );
    assert_contains(&c, "__env_0->x = x;");
    assert_contains(&c, "__closure_0 __cl_0 = { __env_0, __closure_0_fn };");
    assert_contains(&c, "__cl_0.fn_ptr(__cl_0.env, 5)");
}

#[test]
fn test_match_arm_binding_does_not_block_later_capture() {
    // The `ok(x)` arm binding shadows only its own body; the `return x;`
    // after the match still refers to (and must capture) the outer `x`.
    let c = compile(
        "fn f() -> result { return ok(1); }\n\
         let x = 5;\n\
         let g = fn() -> int {\n\
             match f() { ok(x) => x, err(_) => 0 }\n\
             return x;\n\
         };",
    );
    assert_contains(&c, "    carv_int x;\n} __closure_0_env;");
    assert_contains(&c, "__env_0->x = x;");
    assert_contains(&c, "__carv_retval = __env->x;");
    assert_contains(&c, "carv_int x = __match_0.ok_union.i;");
}

// ============================================================================
// Single-exit and ownership discipline
// ============================================================================

#[test]
fn test_every_source_return_goes_through_exit() {
    let c = compile(
        "fn pick(a: int) -> int {\n\
             if a > 0 { return 1; }\n\
             return 2;\n\
         }",
    );
    assert_eq!(c.matches("goto __carv_exit;").count(), 2);
    assert_eq!(c.matches("return __carv_retval;").count(), 1);
}

#[test]
fn test_owned_string_dropped_in_inner_scope() {
    let c = compile(
        "fn work() {\n\
             {\n\
                 let tmp = \"inner\";\n\
             }\n\
         }",
    );
    assert_contains(&c, "carv_string tmp = carv_string_lit(\"inner\");");
    assert_contains(&c, "carv_string_drop(&tmp);");
}

#[test]
fn test_returned_string_moves_not_drops() {
    let c = compile(
        "fn name() -> string {\n\
             let s = \"carv\";\n\
             return s;\n\
         }",
    );
    assert_contains(&c, "__carv_retval = carv_string_move(&s);");
}

#[test]
fn test_break_drops_loop_scope() {
    let c = compile(
        "while true {\n\
             let s = \"tmp\";\n\
             break;\n\
         }",
    );
    let break_at = c.find("break;").unwrap();
    let drop_at = c.find("carv_string_drop(&s);").unwrap();
    assert!(drop_at < break_at, "drop must run before break");
}

// ============================================================================
// Results: ok/err payloads, try, match
// ============================================================================

#[test]
fn test_result_payload_from_first_ok_return() {
    let c = compile(
        "fn parse() -> result {\n\
             return ok(42);\n\
         }\n\
         fn use_it() -> result {\n\
             let v = try parse();\n\
             return ok(v);\n\
         }",
    );
    assert_contains(&c, "carv_result __try_0 = parse();");
    assert_contains(&c, "if (!__try_0.ok_flag) {");
    assert_contains(&c, "__carv_retval = __try_0;");
    assert_contains(&c, "carv_int v = __try_0.ok_union.i;");
    assert_contains(&c, "carv_ok_int(v)");
}

#[test]
fn test_string_payload_uses_string_arm() {
    let c = compile(
        "fn fetch() -> result {\n\
             return ok(\"body\");\n\
         }\n\
         fn use_it() -> result {\n\
             let body = try fetch();\n\
             return ok(body);\n\
         }",
    );
    assert_contains(&c, "carv_string body = __try_0.ok_union.s;");
    assert_contains(&c, "carv_ok_str(");
}

#[test]
fn test_match_over_result() {
    let c = compile(
        "fn parse() -> result {\n\
             return ok(7);\n\
         }\n\
         let r = parse();\n\
         let v = match r { ok(n) => n, err(e) => 0 };",
    );
    assert_contains(&c, "carv_result __match_0 = r;");
    assert_contains(&c, "carv_int __match_res_0;");
    assert_contains(&c, "if (__match_0.ok_flag) {");
    assert_contains(&c, "carv_int n = __match_0.ok_union.i;");
    assert_contains(&c, "__match_res_0 = n;");
    assert_contains(&c, "} else if (!__match_0.ok_flag) {");
    assert_contains(&c, "carv_int v = __match_res_0;");
}

#[test]
fn test_toplevel_try_exits_process() {
    let c = compile(
        "fn parse() -> result { return ok(1); }\n\
         let v = try parse();",
    );
    assert_contains(&c, "carv_arena_free_all();\n        return 1;");
}

// ============================================================================
// Control flow and expressions
// ============================================================================

#[test]
fn test_for_loop_header_binding() {
    let c = compile("for (let i = 0; i < 10; i += 1) { println(i); }");
    assert_contains(&c, "for (carv_int i = 0; (i < 10); i += 1) {");
    assert_contains(&c, "carv_println_int(i);");
}

#[test]
fn test_for_in_lowers_to_indexed_loop() {
    let c = compile("let xs = [1, 2, 3];\nfor x in xs { println(x); }");
    assert_contains(&c, "carv_int_array __arr_0 = carv_new_int_array(3);");
    assert_contains(&c, "__arr_0.data[0] = 1;");
    assert_contains(&c, "carv_int_array xs = __arr_0;");
    assert_contains(&c, "for (carv_int __idx_0 = 0; __idx_0 < xs.length; __idx_0++) {");
    assert_contains(&c, "carv_int x = xs.data[__idx_0];");
}

#[test]
fn test_if_as_value_uses_temp() {
    let c = compile("let a = 1;\nlet v = if a > 0 { 10 } else { 20 };");
    assert_contains(&c, "carv_int __if_0;");
    assert_contains(&c, "if ((a > 0)) {");
    assert_contains(&c, "__if_0 = 10;");
    assert_contains(&c, "__if_0 = 20;");
    assert_contains(&c, "carv_int v = __if_0;");
}

#[test]
fn test_interpolated_string_folds_concat() {
    let c = compile("let x = 2;\nlet msg = \"v=${x}!\";");
    assert_contains(
        &c,
        "carv_string_concat(carv_string_concat(carv_string_lit(\"v=\"), carv_int_to_string(x)), carv_string_lit(\"!\"))",
    );
}

#[test]
fn test_string_concat_plus() {
    let c = compile("let a = \"x\";\nlet b = \"y\";\nlet joined = a + b;");
    assert_contains(&c, "carv_string joined = carv_string_concat(a, b);");
}

#[test]
fn test_pipe_to_println_dispatches_on_type() {
    let c = compile("let x = 1.5;\nx |> println;");
    assert_contains(&c, "carv_println_float(x);");
}

#[test]
fn test_pipe_prepends_argument() {
    let c = compile("fn clamp(v: int, lo: int, hi: int) -> int { return v; }\nlet r = 5 |> clamp(0, 9);");
    assert_contains(&c, "carv_int r = clamp(5, 0, 9);");
}

#[test]
fn test_method_call_on_class_pointer() {
    let c = compile(
        "class Greeter { fn greet(&self) -> int { return 1; } }\n\
         let g = new Greeter;\n\
         let n = g.greet();",
    );
    assert_contains(&c, "carv_int Greeter_greet(const Greeter* self)");
    assert_contains(&c, "carv_int n = Greeter_greet(g);");
}

#[test]
fn test_interface_dispatch_through_fat_pointer() {
    let c = compile(
        "interface Shape { fn area(&self) -> int; }\n\
         class Square { side: int = 2  }\n\
         impl Shape for Square { fn area(&self) -> int { return self.side * self.side; } }\n\
         fn measure(s: &Shape) -> int { return s.area(); }",
    );
    assert_contains(&c, "s.vt->area(s.data)");
}

// ============================================================================
// Async
// ============================================================================

#[test]
fn test_async_frame_poll_and_constructor() {
    let c = compile(
        "async fn tick() -> int { return 1; }\n\
         async fn main() { let v = await tick(); println(v); }",
    );
    assert_contains(&c, "typedef struct tick_frame {");
    assert_contains(&c, "bool tick_poll(void* __raw, carv_event_loop* loop)");
    assert_contains(&c, "switch (frame->state) {");
    assert_contains(&c, "case 0:;");
    assert_contains(&c, "frame->result = 1;");
    assert_contains(&c, "tick_frame* tick(void) {");
    assert_contains(&c, "frame->state = 0;");
}

#[test]
fn test_await_suspends_and_resumes() {
    let c = compile(
        "async fn tick() -> int { return 1; }\n\
         async fn main() { let v = await tick(); }",
    );
    assert_contains(&c, "frame->sub_future = tick();");
    assert_contains(&c, "frame->state = 1;");
    assert_contains(&c, "return false;");
    assert_contains(&c, "case 1:;");
    assert_contains(&c, "if (!tick_poll(frame->sub_future, loop)) { return false; }");
    assert_contains(&c, "frame->v = ((tick_frame*)frame->sub_future)->result;");
}

#[test]
fn test_async_main_drives_event_loop() {
    let c = compile("async fn main() { let x = 1; }");
    assert_contains(&c, "typedef struct carv_main_frame {");
    assert_contains(&c, "bool carv_main_poll(");
    assert_contains(&c, "carv_main_frame* __root = carv_main();");
    assert_contains(&c, "carv_loop_push(&carv_global_loop, __root_task);");
    assert_contains(&c, "carv_loop_run(&carv_global_loop);");
}

#[test]
fn test_spawn_pushes_task() {
    let c = compile(
        "async fn worker() { let x = 1; }\n\
         async fn main() { spawn worker(); }",
    );
    assert_contains(&c, "worker_frame* __task_0 = worker();");
    assert_contains(
        &c,
        "carv_loop_push(&carv_global_loop, (carv_task){ worker_poll, NULL, __task_0, false });",
    );
}

// ============================================================================
// Name safety and built-ins
// ============================================================================

#[test]
fn test_keyword_identifiers_are_prefixed() {
    let c = compile("let switch = 1;\nprintln(switch);");
    assert_contains(&c, "carv_int carv_switch = 1;");
    assert_contains(&c, "carv_println_int(carv_switch);");
    assert!(!c.contains("carv_int switch ="));
}

#[test]
fn test_plain_identifiers_stay_verbatim() {
    let c = compile("let counter = 1;");
    assert_contains(&c, "carv_int counter = 1;");
}

#[test]
fn test_main_function_renamed() {
    let c = compile("fn main() { let x = 1; }");
    assert_contains(&c, "void carv_main(void)");
    assert_contains(&c, "carv_main();");
    assert_contains(&c, "int main(void) {");
}

#[test]
fn test_len_builtin_on_string_and_array() {
    let c = compile("let s = \"abc\";\nlet n = len(s);\nlet xs = [1];\nlet m = len(xs);");
    assert_contains(&c, "carv_int n = s.length;");
    assert_contains(&c, "carv_int m = xs.length;");
}

#[test]
fn test_builtin_module_alias() {
    let c = compile("require \"fs\" as fs;\nlet content = fs.read_file(\"notes.txt\");");
    assert_contains(&c, "carv_string content = carv_read_file(carv_string_lit(\"notes.txt\"));");
}

#[test]
fn test_tcp_builtins_pull_posix_headers() {
    let c = compile("let fd = tcp_listen(8080);");
    assert_contains(&c, "#include <sys/socket.h>");
    assert_contains(&c, "carv_int fd = carv_tcp_listen(8080);");
}

#[test]
fn test_clone_builtin() {
    let c = compile("let s = \"x\";\nlet t = clone(s);");
    assert_contains(&c, "carv_string t = carv_string_clone(s);");
}
