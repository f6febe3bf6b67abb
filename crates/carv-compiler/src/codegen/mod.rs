//! AST to C99 code generation.
//!
//! The [`CodeGenerator`] walks a parsed (optionally checked) program and
//! produces one complete C translation unit as a string. All generator
//! state lives on the context struct: the scope chain with ownership
//! flags, the function return-type table, interface/impl/async tables,
//! the closure counter with its deferred definitions, and the preamble
//! buffer used to expand expression-level constructs into statements.

mod closure;
mod ctype;
mod decls;
mod expr;
mod future;
mod iface;
mod runtime;
mod scope;
mod stmt;

pub use ctype::{ArrayKind, CType};
pub use runtime::RuntimeFlags;
pub use scope::safe_name;

use carv_parser::ast::{self, Expression, Program, ReceiverKind, Statement};
use carv_parser::checker::TypeMap;
use rustc_hash::{FxHashMap, FxHashSet};
use scope::ScopeStack;

/// Signature of a method or interface method.
#[derive(Debug, Clone)]
pub(crate) struct SigInfo {
    pub name: String,
    pub receiver: ReceiverKind,
    pub params: Vec<(String, CType)>,
    pub ret: CType,
}

/// Field of a user class.
#[derive(Debug, Clone)]
pub(crate) struct FieldInfo {
    pub name: String,
    pub ctype: CType,
    pub default: Option<Expression>,
}

/// Frame layout of an async function.
#[derive(Debug, Clone)]
pub(crate) struct AsyncInfo {
    pub params: Vec<(String, CType)>,
    pub locals: Vec<(String, CType)>,
    pub ret: CType,
}

/// The code generator context. One instance lowers one program.
pub struct CodeGenerator<'a> {
    /// Checker-supplied expression types, consulted before syntactic
    /// inference.
    types: Option<&'a TypeMap>,

    // Tables populated by the declaration passes.
    pub(crate) class_fields: FxHashMap<String, Vec<FieldInfo>>,
    pub(crate) methods: FxHashMap<(String, String), SigInfo>,
    pub(crate) interface_order: Vec<String>,
    pub(crate) interfaces: FxHashMap<String, Vec<SigInfo>>,
    pub(crate) impls: Vec<(String, String)>,
    pub(crate) fn_returns: FxHashMap<String, CType>,
    pub(crate) asyncs: FxHashMap<String, AsyncInfo>,
    pub(crate) async_order: Vec<String>,
    pub(crate) builtin_aliases: FxHashSet<String>,

    // Lowering state.
    pub(crate) scopes: ScopeStack,
    pub(crate) array_lengths: FxHashMap<String, usize>,
    pub(crate) closure_defs: String,
    pub(crate) closure_count: usize,
    pub(crate) closure_rets: FxHashMap<usize, CType>,
    pub(crate) in_function: bool,
    pub(crate) current_return: CType,
    pub(crate) fn_scope_depth: usize,
    pub(crate) loop_depths: Vec<usize>,
    pub(crate) current_async: Option<String>,
    pub(crate) state_counter: u32,
    pub(crate) preamble: Vec<String>,
    pub(crate) indent: usize,

    // Temporary counters, one per prefix.
    next_arr: usize,
    next_try: usize,
    next_match: usize,
    next_if: usize,
    next_idx: usize,
    next_task: usize,

    pub(crate) flags: RuntimeFlags,
}

/// Lower a program to a C translation unit, with optional checker types.
pub fn generate(program: &Program, types: Option<&TypeMap>) -> String {
    CodeGenerator::new(types).generate(program)
}

impl<'a> CodeGenerator<'a> {
    pub fn new(types: Option<&'a TypeMap>) -> Self {
        Self {
            types,
            class_fields: FxHashMap::default(),
            methods: FxHashMap::default(),
            interface_order: Vec::new(),
            interfaces: FxHashMap::default(),
            impls: Vec::new(),
            fn_returns: FxHashMap::default(),
            asyncs: FxHashMap::default(),
            async_order: Vec::new(),
            builtin_aliases: FxHashSet::default(),
            scopes: ScopeStack::new(),
            array_lengths: FxHashMap::default(),
            closure_defs: String::new(),
            closure_count: 0,
            closure_rets: FxHashMap::default(),
            in_function: false,
            current_return: CType::Void,
            fn_scope_depth: 1,
            loop_depths: Vec::new(),
            current_async: None,
            state_counter: 0,
            preamble: Vec::new(),
            indent: 0,
            next_arr: 0,
            next_try: 0,
            next_match: 0,
            next_if: 0,
            next_idx: 0,
            next_task: 0,
            flags: RuntimeFlags::default(),
        }
    }

    /// Register a built-in module alias reported by the module loader.
    /// Method calls through the alias lower to the runtime helpers.
    pub fn register_builtin_alias(&mut self, alias: &str) {
        self.builtin_aliases.insert(alias.to_string());
        if alias == "net" {
            self.flags.uses_tcp = true;
        }
    }

    /// Generate the complete translation unit.
    pub fn generate(&mut self, program: &Program) -> String {
        self.scan_features(program);
        self.collect_declarations(program);

        let mut out = String::new();
        runtime::emit_runtime(&mut out, self.flags);

        self.emit_class_forward_typedefs(&mut out, program);
        self.emit_interface_typedefs(&mut out);
        self.emit_class_structs(&mut out, program);
        self.emit_frame_structs(&mut out);
        self.emit_prototypes(&mut out, program);

        // Bodies buffer: classes first, then impls (vtables before the
        // functions that cast to them), then free functions, then async
        // machinery.
        let mut defs = String::new();
        for stmt in &program.statements {
            if let Statement::Class(decl) = stmt {
                self.emit_class_defs(decl, &mut defs);
            }
        }
        for stmt in &program.statements {
            if let Statement::Impl(decl) = stmt {
                self.emit_impl_defs(decl, &mut defs);
            }
        }
        for stmt in &program.statements {
            if let Statement::Function(decl) = stmt {
                if !decl.is_async {
                    self.emit_function(decl, &mut defs);
                }
            }
        }
        for stmt in &program.statements {
            if let Statement::Function(decl) = stmt {
                if decl.is_async {
                    self.emit_async_defs(decl, &mut defs);
                }
            }
        }

        let main_body = self.emit_main_body(program);

        // Deferred closure definitions land after the prototypes and before
        // every body that can reference them.
        out.push_str(&self.closure_defs);
        out.push_str(&defs);
        out.push_str("int main(void) {\n");
        out.push_str(&main_body);
        out.push_str("}\n");
        out
    }

    // ========================================================================
    // Feature scan
    // ========================================================================

    /// Decide which conditional runtime sections the program needs.
    fn scan_features(&mut self, program: &Program) {
        let (uses_async, uses_tcp) = decls::scan_feature_usage(program);
        self.flags.uses_async |= uses_async;
        self.flags.uses_tcp |= uses_tcp;
    }

    // ========================================================================
    // Emission helpers
    // ========================================================================

    pub(crate) fn pad(&self) -> String {
        "    ".repeat(self.indent)
    }

    /// Write one indented line.
    pub(crate) fn line(&self, out: &mut String, text: &str) {
        out.push_str(&self.pad());
        out.push_str(text);
        out.push('\n');
    }

    /// Queue one indented line into the preamble buffer.
    pub(crate) fn pre_line(&mut self, text: &str) {
        let line = format!("{}{}", self.pad(), text);
        self.preamble.push(line);
    }

    /// Queue a line one level deeper than the current indent.
    pub(crate) fn pre_line_indented(&mut self, text: &str) {
        let line = format!("{}    {}", self.pad(), text);
        self.preamble.push(line);
    }

    /// Flush queued preamble lines ahead of the current statement.
    pub(crate) fn flush_preamble(&mut self, out: &mut String) {
        for line in self.preamble.drain(..) {
            out.push_str(&line);
            out.push('\n');
        }
    }

    /// Move a fully rendered buffer into the preamble, line by line.
    pub(crate) fn buffer_to_preamble(&mut self, buffer: String) {
        for line in buffer.lines() {
            self.preamble.push(line.to_string());
        }
    }

    pub(crate) fn fresh_arr(&mut self) -> String {
        let n = self.next_arr;
        self.next_arr += 1;
        format!("__arr_{n}")
    }

    pub(crate) fn fresh_try(&mut self) -> String {
        let n = self.next_try;
        self.next_try += 1;
        format!("__try_{n}")
    }

    pub(crate) fn fresh_match(&mut self) -> usize {
        let n = self.next_match;
        self.next_match += 1;
        n
    }

    pub(crate) fn fresh_if(&mut self) -> String {
        let n = self.next_if;
        self.next_if += 1;
        format!("__if_{n}")
    }

    pub(crate) fn fresh_idx(&mut self) -> String {
        let n = self.next_idx;
        self.next_idx += 1;
        format!("__idx_{n}")
    }

    pub(crate) fn fresh_task(&mut self) -> String {
        let n = self.next_task;
        self.next_task += 1;
        format!("__task_{n}")
    }

    /// The C spelling of a reference to `name`, honoring capture and frame
    /// rewrites recorded in the scope chain, falling back to the safe name.
    pub(crate) fn identifier_ref(&self, name: &str) -> String {
        match self.scopes.lookup(name) {
            Some(info) => info.c_name.clone(),
            None => safe_name(name),
        }
    }

    pub(crate) fn is_interface(&self, name: &str) -> bool {
        self.interfaces.contains_key(name)
    }

    /// Find the impl providing `interface` for `class`.
    pub(crate) fn impl_exists(&self, interface: &str, class: &str) -> bool {
        self.impls
            .iter()
            .any(|(i, c)| i == interface && c == class)
    }

    // ========================================================================
    // Type resolution: checker map first, syntactic fallback
    // ========================================================================

    /// Resolve the C type of an expression.
    pub(crate) fn resolve_expression(&self, expr: &Expression) -> CType {
        if let Some(types) = self.types {
            if let Some(ty) = types.get(expr.span()) {
                if let Some(ctype) = CType::from_checker(ty) {
                    return ctype;
                }
            }
        }
        self.infer_syntactic(expr)
    }

    /// Syntactic fallback inference. Unknown constructs resolve to int.
    fn infer_syntactic(&self, expr: &Expression) -> CType {
        match expr {
            Expression::IntLiteral(_) | Expression::CharLiteral(_) => CType::Int,
            Expression::FloatLiteral(_) => CType::Float,
            Expression::BoolLiteral(_) => CType::Bool,
            Expression::StringLiteral(_) | Expression::InterpolatedString(_) => CType::Str,
            Expression::NilLiteral(_) => CType::Opaque,
            Expression::Identifier(id) => self
                .scopes
                .lookup(&id.name)
                .map(|info| info.ctype.clone())
                .unwrap_or(CType::Int),
            Expression::Array(array) => {
                let element = array
                    .elements
                    .first()
                    .map(|e| self.resolve_expression(e))
                    .unwrap_or(CType::Int);
                CType::Array(ArrayKind::from_element(&element))
            }
            Expression::Prefix(prefix) => match prefix.operator {
                ast::PrefixOperator::Not => CType::Bool,
                ast::PrefixOperator::Minus => self.resolve_expression(&prefix.operand),
            },
            Expression::Infix(infix) => {
                if infix.operator.is_comparison() {
                    return CType::Bool;
                }
                let left = self.resolve_expression(&infix.left);
                let right = self.resolve_expression(&infix.right);
                if left == CType::Str && infix.operator == ast::InfixOperator::Add {
                    CType::Str
                } else if left == CType::Float || right == CType::Float {
                    CType::Float
                } else {
                    left
                }
            }
            Expression::Pipe(pipe) => self.resolve_pipe(pipe),
            Expression::Assign(assign) => self.resolve_expression(&assign.target),
            Expression::Call(call) => self.resolve_call(call),
            Expression::If(ifexpr) => self.resolve_block_value(&ifexpr.consequence),
            Expression::Index(index) => match self.resolve_expression(&index.object) {
                CType::Array(kind) => kind.element(),
                _ => CType::Int,
            },
            Expression::Member(member) => self.resolve_member(member),
            Expression::New(new) => CType::ClassPtr(new.class_name.name.clone()),
            Expression::Ok_(_) | Expression::Err_(_) => CType::Result,
            Expression::Try(t) => self.result_payload(&t.value, true),
            Expression::Match(m) => self.resolve_match_value(m),
            Expression::Borrow(borrow) => {
                let inner = self.resolve_expression(&borrow.operand);
                match inner {
                    CType::ClassPtr(_) | CType::IfaceRef { .. } => inner,
                    other => CType::Ptr {
                        inner: Box::new(other),
                        konst: !borrow.mutable,
                    },
                }
            }
            Expression::Deref(deref) => match self.resolve_expression(&deref.operand) {
                CType::Ptr { inner, .. } => *inner,
                other => other,
            },
            Expression::Cast(cast) => {
                CType::from_annotation(&cast.target, |n| self.is_interface(n))
            }
            Expression::FunctionLiteral(_) | Expression::Spawn(_) => CType::Opaque,
            // The return-type table is complete before any lowering or
            // frame collection, so awaits resolve through it even when the
            // callee is declared later in the file.
            Expression::Await(awaited) => match awaited.value.as_ref() {
                Expression::Call(call) => match call.callee.as_identifier() {
                    Some(name) => self.fn_returns.get(name).cloned().unwrap_or(CType::Int),
                    _ => CType::Int,
                },
                _ => CType::Int,
            },
        }
    }

    fn resolve_pipe(&self, pipe: &ast::PipeExpression) -> CType {
        match pipe.target.as_ref() {
            Expression::Identifier(id) => self.resolve_callee_name(&id.name),
            Expression::Call(call) => match call.callee.as_identifier() {
                Some(name) => self.resolve_callee_name(name),
                None => CType::Int,
            },
            _ => CType::Int,
        }
    }

    fn resolve_call(&self, call: &ast::CallExpression) -> CType {
        match call.callee.as_ref() {
            Expression::Identifier(id) => {
                if self.asyncs.contains_key(&id.name) {
                    // A bare call of an async function yields its frame.
                    return CType::Opaque;
                }
                self.resolve_callee_name(&id.name)
            }
            Expression::Member(member) => {
                if let Some(alias) = member.object.as_identifier() {
                    if self.builtin_aliases.contains(alias) {
                        return self.resolve_callee_name(&member.property.name);
                    }
                }
                let object = self.resolve_expression(&member.object);
                match object {
                    CType::ClassPtr(class) => self
                        .methods
                        .get(&(class, member.property.name.clone()))
                        .map(|sig| sig.ret.clone())
                        .unwrap_or(CType::Int),
                    CType::IfaceRef { name, .. } => self
                        .interfaces
                        .get(&name)
                        .and_then(|sigs| {
                            sigs.iter().find(|s| s.name == member.property.name)
                        })
                        .map(|sig| sig.ret.clone())
                        .unwrap_or(CType::Int),
                    _ => CType::Int,
                }
            }
            _ => CType::Int,
        }
    }

    fn resolve_callee_name(&self, name: &str) -> CType {
        if let Some(info) = self.scopes.lookup(name) {
            if let CType::Closure(n) = info.ctype {
                return self.closure_rets.get(&n).cloned().unwrap_or(CType::Void);
            }
        }
        if let Some(ret) = self.fn_returns.get(name) {
            return ret.clone();
        }
        match name {
            "len" | "tcp_listen" | "tcp_accept" => CType::Int,
            "clone" | "trim" | "substr" | "join" | "read_file" | "tcp_read" => CType::Str,
            "split" => CType::Array(ArrayKind::Str),
            "write_file" | "file_exists" | "tcp_write" => CType::Bool,
            "print" | "println" | "tcp_close" => CType::Void,
            _ => CType::Int,
        }
    }

    fn resolve_member(&self, member: &ast::MemberExpression) -> CType {
        let object = self.resolve_expression(&member.object);
        match object {
            CType::ClassPtr(class) => self
                .class_fields
                .get(&class)
                .and_then(|fields| {
                    fields
                        .iter()
                        .find(|f| f.name == member.property.name)
                        .map(|f| f.ctype.clone())
                })
                .unwrap_or(CType::Int),
            CType::Str | CType::Array(_) if member.property.name == "length" => CType::Int,
            _ => CType::Int,
        }
    }

    /// Value type of a block in expression position: its trailing
    /// expression statement.
    pub(crate) fn resolve_block_value(&self, block: &ast::BlockStatement) -> CType {
        match block.statements.last() {
            Some(Statement::Expression(s)) => self.resolve_expression(&s.expression),
            _ => CType::Int,
        }
    }

    fn resolve_match_value(&self, m: &ast::MatchExpression) -> CType {
        let arm = match m.arms.first() {
            Some(arm) => arm,
            None => return CType::Int,
        };
        // `ok(v) => v` yields the payload directly; anything else resolves
        // syntactically (the binding is unknown to the outer scope, which
        // is fine for the fallback).
        if let ast::MatchPattern::Ok_(Some(binding)) = &arm.pattern {
            if arm.body.as_identifier() == Some(binding.name.as_str()) {
                return self.result_payload(&m.scrutinee, true);
            }
        }
        self.resolve_expression(&arm.body)
    }

    /// The ok (or err) payload C type of a result-producing expression.
    ///
    /// Consults the `<fn>_result_ok`/`<fn>_result_err` entries recorded by
    /// the declaration pass for calls, the `<var>_result_ok` pseudo-binding
    /// for identifiers, and the literal payload for inline ok/err.
    pub(crate) fn result_payload(&self, expr: &Expression, ok: bool) -> CType {
        let suffix = if ok { "_result_ok" } else { "_result_err" };
        match expr {
            Expression::Call(call) => {
                if let Some(name) = call.callee.as_identifier() {
                    if let Some(payload) = self.fn_returns.get(&format!("{name}{suffix}")) {
                        return payload.clone();
                    }
                }
                CType::Int
            }
            Expression::Identifier(id) => self
                .scopes
                .lookup(&format!("{}{suffix}", id.name))
                .map(|info| info.ctype.clone())
                .unwrap_or(CType::Int),
            Expression::Ok_(inner) if ok => self.resolve_expression(&inner.value),
            Expression::Err_(inner) if !ok => self.resolve_expression(&inner.value),
            Expression::Await(awaited) => self.result_payload(&awaited.value, ok),
            _ => CType::Int,
        }
    }

    // ========================================================================
    // Main assembly
    // ========================================================================

    /// Lower the program entry: either the async-main driver or the
    /// top-level statements, then the arena release and `return 0;`.
    fn emit_main_body(&mut self, program: &Program) -> String {
        let mut body = String::new();
        self.indent = 1;

        if self.asyncs.contains_key("main") {
            let base = safe_name("main");
            self.line(&mut body, &format!("{base}_frame* __root = {base}();"));
            self.line(
                &mut body,
                &format!("carv_task __root_task = {{ {base}_poll, NULL, __root, false }};"),
            );
            self.line(&mut body, "carv_loop_push(&carv_global_loop, __root_task);");
            self.line(&mut body, "carv_loop_run(&carv_global_loop);");
        } else {
            self.scopes.push();
            let top_level: Vec<&Statement> = program
                .statements
                .iter()
                .filter(|s| !s.is_declaration() && !matches!(s, Statement::Require(_)))
                .collect();

            if top_level.is_empty() && self.fn_returns.contains_key("main") {
                self.line(&mut body, &format!("{}();", safe_name("main")));
            }
            for stmt in top_level {
                self.lower_statement(stmt, &mut body);
            }
            if self.flags.uses_async {
                // Top-level spawns still need their tasks driven.
                self.line(&mut body, "carv_loop_run(&carv_global_loop);");
            }

            for drop in self.scopes.drops_for_innermost() {
                self.line(&mut body, &drop);
            }
            self.scopes.pop();
        }

        self.line(&mut body, "carv_arena_free_all();");
        self.line(&mut body, "return 0;");
        self.indent = 0;
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carv_parser::Parser;

    fn parse(source: &str) -> Program {
        Parser::new(source).unwrap().parse().unwrap()
    }

    #[test]
    fn test_generate_minimal_program() {
        let program = parse("let x = 1;");
        let c = generate(&program, None);
        assert!(c.contains("int main(void) {"));
        assert!(c.contains("carv_int x = 1;"));
        assert!(c.contains("return 0;"));
    }

    #[test]
    fn test_return_type_collection_infers_result() {
        let program = parse("fn f() { return ok(1); }");
        let mut generator = CodeGenerator::new(None);
        generator.collect_declarations(&program);
        assert_eq!(generator.fn_returns.get("f"), Some(&CType::Result));
        assert_eq!(generator.fn_returns.get("f_result_ok"), Some(&CType::Int));
    }

    #[test]
    fn test_explicit_return_type_wins() {
        let program = parse("fn f() -> float { return 1; }");
        let mut generator = CodeGenerator::new(None);
        generator.collect_declarations(&program);
        assert_eq!(generator.fn_returns.get("f"), Some(&CType::Float));
    }

    #[test]
    fn test_feature_scan_detects_async_and_tcp() {
        let program = parse("async fn main() { let x = 1; }");
        let (uses_async, uses_tcp) = decls::scan_feature_usage(&program);
        assert!(uses_async);
        assert!(!uses_tcp);

        let program = parse("let fd = tcp_listen(80);");
        let (uses_async, uses_tcp) = decls::scan_feature_usage(&program);
        assert!(!uses_async);
        assert!(uses_tcp);
    }

    #[test]
    fn test_async_frame_collects_nested_locals() {
        let program = parse("async fn job() { let a = 1; while true { let b = \"x\"; } }");
        let mut generator = CodeGenerator::new(None);
        generator.collect_declarations(&program);
        let info = generator.asyncs.get("job").unwrap();
        assert_eq!(
            info.locals,
            vec![("a".to_string(), CType::Int), ("b".to_string(), CType::Str)]
        );
    }

    #[test]
    fn test_identifier_ref_prefers_scope_spelling() {
        let mut generator = CodeGenerator::new(None);
        generator
            .scopes
            .declare_as("f", CType::Closure(0), false, false, "__cl_0".to_string());
        assert_eq!(generator.identifier_ref("f"), "__cl_0");
        assert_eq!(generator.identifier_ref("while"), "carv_while");
        assert_eq!(generator.identifier_ref("plain"), "plain");
    }
}
