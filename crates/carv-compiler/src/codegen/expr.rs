//! Expression lowering.
//!
//! Each expression kind lowers to a C expression string. Constructs with
//! statement-shaped expansions (try, if-as-value, match, array literals,
//! closures, spawn, await) push their prelude into the preamble buffer,
//! which the statement lowerer flushes ahead of the current statement.

use super::ctype::{ArrayKind, CType};
use super::scope::safe_name;
use super::CodeGenerator;
use carv_parser::ast::*;

/// Escape a string for a C string literal.
pub(crate) fn c_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out
}

impl<'a> CodeGenerator<'a> {
    /// Lower an expression, returning its C spelling.
    pub(crate) fn lower_expression(&mut self, expr: &Expression) -> String {
        match expr {
            Expression::IntLiteral(lit) => lit.value.to_string(),
            Expression::FloatLiteral(lit) => format!("{:?}", lit.value),
            Expression::CharLiteral(lit) => lower_char(lit.value),
            Expression::BoolLiteral(lit) => lit.value.to_string(),
            Expression::NilLiteral(_) => "NULL".to_string(),
            Expression::StringLiteral(lit) => {
                format!("carv_string_lit(\"{}\")", c_escape(&lit.value))
            }
            Expression::InterpolatedString(lit) => self.lower_interpolated(lit),
            Expression::Identifier(id) => self.identifier_ref(&id.name),
            Expression::Array(array) => self.lower_array_literal(array),
            Expression::Prefix(prefix) => {
                let operand = self.lower_expression(&prefix.operand);
                format!("({}{})", prefix.operator.as_str(), operand)
            }
            Expression::Infix(infix) => self.lower_infix(infix),
            Expression::Pipe(pipe) => self.lower_pipe(pipe),
            Expression::Assign(assign) => self.lower_assign(assign),
            Expression::Call(call) => self.lower_call(call),
            Expression::If(ifexpr) => self.lower_if_value(ifexpr),
            Expression::Index(index) => self.lower_index(index),
            Expression::Member(member) => self.lower_member(member),
            Expression::New(new) => format!("{}_new()", new.class_name.name),
            Expression::Ok_(inner) => self.lower_ok(&inner.value),
            Expression::Err_(inner) => self.lower_err(&inner.value),
            Expression::Try(t) => self.lower_try(t),
            Expression::Match(m) => self.lower_match_value(m),
            Expression::Borrow(borrow) => self.lower_borrow(borrow),
            Expression::Deref(deref) => {
                let operand = self.lower_expression(&deref.operand);
                format!("(*{operand})")
            }
            Expression::Cast(cast) => self.lower_cast(cast),
            Expression::FunctionLiteral(lit) => self.emit_closure(lit).0,
            Expression::Spawn(spawn) => self.lower_spawn(spawn),
            Expression::Await(awaited) => self.lower_await(awaited),
        }
    }

    // ========================================================================
    // Strings
    // ========================================================================

    /// Interpolated strings fold left over concat, converting each
    /// non-string segment through the matching to_string helper.
    fn lower_interpolated(&mut self, lit: &InterpolatedString) -> String {
        let mut acc: Option<String> = None;
        for part in &lit.parts {
            let piece = match part {
                StringPart::Literal(text) => {
                    format!("carv_string_lit(\"{}\")", c_escape(text))
                }
                StringPart::Expression(inner) => {
                    let value = self.lower_expression(inner);
                    // Segment spans are segment-relative and must not be
                    // looked up in the checker map.
                    match self.infer_syntactic(inner) {
                        CType::Str => value,
                        CType::Int => format!("carv_int_to_string({value})"),
                        CType::Float => format!("carv_float_to_string({value})"),
                        CType::Bool => format!("carv_bool_to_string({value})"),
                        _ => format!("carv_int_to_string((carv_int)({value}))"),
                    }
                }
            };
            acc = Some(match acc {
                None => piece,
                Some(prev) => format!("carv_string_concat({prev}, {piece})"),
            });
        }
        acc.unwrap_or_else(|| "carv_string_lit(\"\")".to_string())
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn lower_infix(&mut self, infix: &InfixExpression) -> String {
        let left = self.lower_expression(&infix.left);
        let right = self.lower_expression(&infix.right);
        if infix.operator == InfixOperator::Add
            && self.resolve_expression(&infix.left) == CType::Str
            && self.resolve_expression(&infix.right) == CType::Str
        {
            return format!("carv_string_concat({left}, {right})");
        }
        format!("({left} {} {right})", infix.operator.as_str())
    }

    fn lower_assign(&mut self, assign: &AssignExpression) -> String {
        let target = self.lower_expression(&assign.target);
        let value = self.lower_expression(&assign.value);
        format!("{target} {} {value}", assign.operator.as_str())
    }

    fn lower_borrow(&mut self, borrow: &BorrowExpression) -> String {
        let operand = self.lower_expression(&borrow.operand);
        // Class instances are already pointers; borrowing one is the
        // pointer itself. Other values borrow by address.
        match self.resolve_expression(&borrow.operand) {
            CType::ClassPtr(_) | CType::IfaceRef { .. } => operand,
            _ => format!("(&{operand})"),
        }
    }

    // ========================================================================
    // Pipes and calls
    // ========================================================================

    fn lower_pipe(&mut self, pipe: &PipeExpression) -> String {
        match pipe.target.as_ref() {
            Expression::Identifier(id) => {
                let args = [(*pipe.value).clone()];
                self.lower_named_call(&id.name, &args)
            }
            Expression::Call(call) => match call.callee.as_identifier() {
                Some(name) => {
                    let mut args = vec![(*pipe.value).clone()];
                    args.extend(call.arguments.iter().cloned());
                    self.lower_named_call(name, &args)
                }
                None => {
                    let value = self.lower_expression(&pipe.value);
                    let callee = self.lower_expression(&call.callee);
                    let mut rendered = vec![value];
                    for arg in &call.arguments {
                        rendered.push(self.lower_expression(arg));
                    }
                    format!("{callee}({})", rendered.join(", "))
                }
            },
            other => {
                let value = self.lower_expression(&pipe.value);
                let target = self.lower_expression(other);
                format!("{target}({value})")
            }
        }
    }

    fn lower_call(&mut self, call: &CallExpression) -> String {
        match call.callee.as_ref() {
            Expression::Member(member) => self.lower_method_call(member, &call.arguments),
            Expression::Identifier(id) => self.lower_named_call(&id.name, &call.arguments),
            other => {
                let callee = self.lower_expression(other);
                let args = self.lower_args(&call.arguments);
                format!("{callee}({args})")
            }
        }
    }

    fn lower_args(&mut self, args: &[Expression]) -> String {
        args.iter()
            .map(|a| self.lower_expression(a))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Dispatch a call through a bare name: recognized built-ins first
    /// (name and arity must both match), then closure variables, then
    /// plain functions.
    fn lower_named_call(&mut self, name: &str, args: &[Expression]) -> String {
        if let Some(lowered) = self.lower_builtin(name, args) {
            return lowered;
        }
        if let Some(info) = self.scopes.lookup(name) {
            if matches!(info.ctype, CType::Closure(_)) {
                let closure = info.c_name.clone();
                let rendered = self.lower_args(args);
                return if rendered.is_empty() {
                    format!("{closure}.fn_ptr({closure}.env)")
                } else {
                    format!("{closure}.fn_ptr({closure}.env, {rendered})")
                };
            }
        }
        let rendered = self.lower_args(args);
        format!("{}({rendered})", safe_name(name))
    }

    fn lower_method_call(&mut self, member: &MemberExpression, args: &[Expression]) -> String {
        // Method calls through a built-in module alias lower to the
        // runtime helpers directly.
        if let Some(alias) = member.object.as_identifier() {
            if self.builtin_aliases.contains(alias) {
                if let Some(lowered) = self.lower_builtin(&member.property.name, args) {
                    return lowered;
                }
                let rendered = self.lower_args(args);
                return format!("carv_{}({rendered})", member.property.name);
            }
        }

        let object = self.lower_expression(&member.object);
        let method = &member.property.name;
        match self.resolve_expression(&member.object) {
            CType::IfaceRef { .. } => {
                let rendered = self.lower_args(args);
                if rendered.is_empty() {
                    format!("{object}.vt->{method}({object}.data)")
                } else {
                    format!("{object}.vt->{method}({object}.data, {rendered})")
                }
            }
            CType::ClassPtr(class) => {
                let rendered = self.lower_args(args);
                if rendered.is_empty() {
                    format!("{class}_{method}({object})")
                } else {
                    format!("{class}_{method}({object}, {rendered})")
                }
            }
            _ => {
                // Unresolvable receivers name the Unknown sentinel, which
                // fails C compilation rather than miscompiling.
                let rendered = self.lower_args(args);
                if rendered.is_empty() {
                    format!("Unknown_{method}({object})")
                } else {
                    format!("Unknown_{method}({object}, {rendered})")
                }
            }
        }
    }

    /// Built-in call lowering. Returns `None` when the name or arity does
    /// not match a built-in, letting user functions shadow nothing.
    fn lower_builtin(&mut self, name: &str, args: &[Expression]) -> Option<String> {
        match (name, args.len()) {
            ("print", 1) => Some(self.lower_print(&args[0], false)),
            ("println", 1) => Some(self.lower_print(&args[0], true)),
            ("len", 1) => {
                let value = self.lower_expression(&args[0]);
                Some(format!("{value}.length"))
            }
            ("clone", 1) => {
                let value = self.lower_expression(&args[0]);
                match self.resolve_expression(&args[0]) {
                    CType::Str => Some(format!("carv_string_clone({value})")),
                    _ => Some(value),
                }
            }
            ("read_file", 1) | ("file_exists", 1) | ("trim", 1) | ("tcp_listen", 1)
            | ("tcp_accept", 1) | ("tcp_read", 1) | ("tcp_close", 1) => {
                let value = self.lower_expression(&args[0]);
                Some(format!("carv_{name}({value})"))
            }
            ("write_file", 2) | ("split", 2) | ("join", 2) | ("tcp_write", 2) => {
                let a = self.lower_expression(&args[0]);
                let b = self.lower_expression(&args[1]);
                Some(format!("carv_{name}({a}, {b})"))
            }
            ("substr", 3) => {
                let a = self.lower_expression(&args[0]);
                let b = self.lower_expression(&args[1]);
                let c = self.lower_expression(&args[2]);
                Some(format!("carv_substr({a}, {b}, {c})"))
            }
            _ => None,
        }
    }

    /// Print dispatch on the value's resolved type.
    fn lower_print(&mut self, arg: &Expression, newline: bool) -> String {
        let value = self.lower_expression(arg);
        let base = if newline { "carv_println" } else { "carv_print" };
        match self.resolve_expression(arg) {
            CType::Int => format!("{base}_int({value})"),
            CType::Float => format!("{base}_float({value})"),
            CType::Bool => format!("{base}_bool({value})"),
            CType::Str => format!("{base}_string({value})"),
            CType::Array(kind) => format!("{base}_{}_array({value})", kind.kind_name()),
            _ => {
                // Unresolved identifiers that were bound to an array
                // literal still dispatch through the array printer.
                if let Some(name) = arg.as_identifier() {
                    if self.array_lengths.contains_key(name) {
                        return format!("{base}_int_array({value})");
                    }
                }
                format!("{base}_int((carv_int)({value}))")
            }
        }
    }

    // ========================================================================
    // Members, indexing
    // ========================================================================

    fn lower_member(&mut self, member: &MemberExpression) -> String {
        let object = self.lower_expression(&member.object);
        let property = safe_name(&member.property.name);
        match self.resolve_expression(&member.object) {
            CType::ClassPtr(_) => format!("{object}->{property}"),
            CType::Str | CType::Array(_) if member.property.name == "length" => {
                format!("{object}.length")
            }
            _ => format!("{object}.{property}"),
        }
    }

    fn lower_index(&mut self, index: &IndexExpression) -> String {
        let object = self.lower_expression(&index.object);
        let idx = self.lower_expression(&index.index);
        match self.resolve_expression(&index.object) {
            CType::Array(_) | CType::Str => format!("{object}.data[{idx}]"),
            _ => format!("{object}[{idx}]"),
        }
    }

    // ========================================================================
    // Arrays
    // ========================================================================

    /// Array literals build through an arena-backed `__arr_<n>` temporary
    /// in the preamble; the element kind comes from the first element.
    fn lower_array_literal(&mut self, array: &ArrayLiteral) -> String {
        let element = array
            .elements
            .first()
            .map(|e| self.resolve_expression(e))
            .unwrap_or(CType::Int);
        let kind = ArrayKind::from_element(&element);
        let tmp = self.fresh_arr();
        let count = array.elements.len();
        self.pre_line(&format!(
            "{} {tmp} = {}({count});",
            kind.array_name(),
            kind.new_fn()
        ));
        for (i, element) in array.elements.iter().enumerate() {
            let value = self.lower_expression(element);
            self.pre_line(&format!("{tmp}.data[{i}] = {value};"));
        }
        tmp
    }

    // ========================================================================
    // Results: ok, err, try
    // ========================================================================

    fn lower_ok(&mut self, value: &Expression) -> String {
        let rendered = self.lower_expression(value);
        match self.resolve_expression(value) {
            CType::Float => format!("carv_ok_float({rendered})"),
            CType::Bool => format!("carv_ok_bool({rendered})"),
            CType::Str => format!("carv_ok_str({rendered})"),
            _ => format!("carv_ok_int({rendered})"),
        }
    }

    fn lower_err(&mut self, value: &Expression) -> String {
        let rendered = self.lower_expression(value);
        match self.resolve_expression(value) {
            CType::Str => format!("carv_err_str({rendered})"),
            _ => format!("carv_err_code({rendered})"),
        }
    }

    /// `try e` evaluates once into a `__try_<n>` temporary; the err path
    /// escapes through the single-exit label (or propagates the frame
    /// result inside async functions, or exits the process at top level).
    fn lower_try(&mut self, t: &TryExpression) -> String {
        let value = self.lower_expression(&t.value);
        let tmp = self.fresh_try();
        self.pre_line(&format!("carv_result {tmp} = {value};"));
        self.pre_line(&format!("if (!{tmp}.ok_flag) {{"));
        if self.current_async.is_some() {
            self.pre_line_indented(&format!("frame->result = {tmp};"));
            self.pre_line_indented("return true;");
        } else if self.in_function {
            self.pre_line_indented(&format!("__carv_retval = {tmp};"));
            self.pre_line_indented("goto __carv_exit;");
        } else {
            self.pre_line_indented("carv_arena_free_all();");
            self.pre_line_indented("return 1;");
        }
        self.pre_line("}");
        let payload = self.result_payload(&t.value, true);
        format!("{tmp}.ok_union.{}", payload.result_arm())
    }

    // ========================================================================
    // If and match in value position
    // ========================================================================

    fn lower_if_value(&mut self, ifexpr: &IfExpression) -> String {
        let ctype = self.resolve_expression(&Expression::If(ifexpr.clone()));
        let tmp = self.fresh_if();
        self.pre_line(&format!("{} {tmp};", ctype.c_name()));
        let mut buffer = String::new();
        self.lower_if_into(ifexpr, Some(&tmp), &mut buffer);
        self.buffer_to_preamble(buffer);
        tmp
    }

    fn lower_match_value(&mut self, m: &MatchExpression) -> String {
        let ctype = self.resolve_expression(&Expression::Match(m.clone()));
        let n = self.fresh_match();
        let result_tmp = format!("__match_res_{n}");
        self.pre_line(&format!("{} {result_tmp};", ctype.c_name()));
        let mut buffer = String::new();
        self.lower_match_into(m, n, Some(&result_tmp), &mut buffer);
        self.buffer_to_preamble(buffer);
        result_tmp
    }

    // ========================================================================
    // Casts
    // ========================================================================

    /// Interface casts build the fat pointer inline, naming the impl's
    /// vtable instance; anything else is a plain C cast.
    fn lower_cast(&mut self, cast: &CastExpression) -> String {
        let target = CType::from_annotation(&cast.target, |n| self.is_interface(n));
        if let CType::IfaceRef { name, .. } = &target {
            // Borrows of class instances are the instance pointer itself.
            let source: &Expression = match cast.value.as_ref() {
                Expression::Borrow(borrow) => borrow.operand.as_ref(),
                other => other,
            };
            let value = self.lower_expression(source);
            // A missing impl (or an unresolvable source class) names the
            // Unknown sentinel, failing C compilation deterministically.
            let class = match self.resolve_expression(source) {
                CType::ClassPtr(class) if self.impl_exists(name, &class) => class,
                _ => "Unknown".to_string(),
            };
            return format!(
                "({}){{ .data = {value}, .vt = &{name}__{class}__VT }}",
                target.c_name()
            );
        }
        let value = self.lower_expression(&cast.value);
        format!("(({})({value}))", target.c_name())
    }

    // ========================================================================
    // Spawn and await
    // ========================================================================

    /// `spawn f(args)` builds the child frame, wraps it in a task, and
    /// pushes it onto the global loop without awaiting.
    fn lower_spawn(&mut self, spawn: &SpawnExpression) -> String {
        if let Expression::Call(call) = spawn.call.as_ref() {
            if let Some(name) = call.callee.as_identifier() {
                if self.asyncs.contains_key(name) {
                    let base = safe_name(name);
                    let args = self.lower_args(&call.arguments);
                    let tmp = self.fresh_task();
                    self.pre_line(&format!("{base}_frame* {tmp} = {base}({args});"));
                    self.pre_line(&format!(
                        "carv_loop_push(&carv_global_loop, (carv_task){{ {base}_poll, NULL, {tmp}, false }});"
                    ));
                    return tmp;
                }
            }
        }
        // Not a direct async call: evaluate for effect.
        self.lower_expression(&spawn.call)
    }

    /// `await f(args)` stores the child frame in `sub_future`, suspends at
    /// a fresh state, and on resume re-polls the child until it is done;
    /// the awaited value is the child frame's result slot.
    fn lower_await(&mut self, awaited: &AwaitExpression) -> String {
        if self.current_async.is_none() {
            // Await outside an async body degrades to its operand.
            return self.lower_expression(&awaited.value);
        }
        if let Expression::Call(call) = awaited.value.as_ref() {
            if let Some(name) = call.callee.as_identifier() {
                if self.asyncs.contains_key(name) {
                    let base = safe_name(name);
                    let args = self.lower_args(&call.arguments);
                    self.state_counter += 1;
                    let state = self.state_counter;
                    self.pre_line(&format!("frame->sub_future = {base}({args});"));
                    self.pre_line(&format!("frame->state = {state};"));
                    self.pre_line("return false;");
                    self.pre_line(&format!("case {state}:;"));
                    self.pre_line(&format!(
                        "if (!{base}_poll(frame->sub_future, loop)) {{ return false; }}"
                    ));
                    let ret = self
                        .fn_returns
                        .get(name)
                        .cloned()
                        .unwrap_or(CType::Void);
                    if ret == CType::Void {
                        return "0".to_string();
                    }
                    return format!("(({base}_frame*)frame->sub_future)->result");
                }
            }
        }
        self.lower_expression(&awaited.value)
    }
}

fn lower_char(c: char) -> String {
    match c {
        '\n' => "'\\n'".to_string(),
        '\r' => "'\\r'".to_string(),
        '\t' => "'\\t'".to_string(),
        '\0' => "'\\0'".to_string(),
        '\'' => "'\\''".to_string(),
        '\\' => "'\\\\'".to_string(),
        c => format!("'{c}'"),
    }
}
