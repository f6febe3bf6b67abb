//! Statement lowering and function emission.
//!
//! Functions are lowered in single-exit form: every source-level return
//! funnels through `__carv_exit` so scoped cleanup runs on every path.
//! Class constructors and methods are emitted here; interfaces and async
//! machinery live in their own modules.

use super::ctype::{ArrayKind, CType};
use super::scope::safe_name;
use super::CodeGenerator;
use carv_parser::ast::*;

/// Render a C parameter list from (name, type) pairs.
pub(crate) fn render_params(params: &[(String, CType)]) -> String {
    if params.is_empty() {
        return "void".to_string();
    }
    params
        .iter()
        .map(|(name, ctype)| format!("{} {}", ctype.c_name(), safe_name(name)))
        .collect::<Vec<_>>()
        .join(", ")
}

impl<'a> CodeGenerator<'a> {
    // ========================================================================
    // Statements
    // ========================================================================

    pub(crate) fn lower_statement(&mut self, stmt: &Statement, out: &mut String) {
        match stmt {
            Statement::Let(s) => {
                self.lower_let(&s.name.name, s.mutable, &s.type_annotation, &s.value, false, out)
            }
            Statement::Const(s) => {
                self.lower_let(&s.name.name, false, &s.type_annotation, &s.value, true, out)
            }
            Statement::Return(s) => self.lower_return(&s.value, out),
            Statement::Expression(s) => self.lower_expression_statement(&s.expression, out),
            Statement::For(s) => self.lower_for(s, out),
            Statement::ForIn(s) => self.lower_for_in(s, out),
            Statement::While(s) => self.lower_while(s, out),
            Statement::Loop(s) => self.lower_loop(s, out),
            Statement::Break(_) => self.lower_loop_exit("break;", out),
            Statement::Continue(_) => self.lower_loop_exit("continue;", out),
            Statement::Block(s) => {
                self.line(out, "{");
                self.indent += 1;
                self.scopes.push();
                for inner in &s.statements {
                    self.lower_statement(inner, out);
                }
                self.emit_scope_drops(out);
                self.scopes.pop();
                self.indent -= 1;
                self.line(out, "}");
            }
            // Declarations are emitted by the dedicated passes; unknown
            // placements produce no output.
            Statement::Function(_)
            | Statement::Class(_)
            | Statement::Interface(_)
            | Statement::Impl(_)
            | Statement::Require(_) => {}
        }
    }

    fn is_frame_var(&self, name: &str) -> bool {
        let Some(current) = &self.current_async else {
            return false;
        };
        self.asyncs
            .get(current)
            .map(|info| {
                info.params.iter().any(|(n, _)| n == name)
                    || info.locals.iter().any(|(n, _)| n == name)
            })
            .unwrap_or(false)
    }

    fn lower_let(
        &mut self,
        name: &str,
        mutable: bool,
        annotation: &Option<TypeAnnotation>,
        value: &Expression,
        is_const: bool,
        out: &mut String,
    ) {
        // A function-literal initializer binds the name straight to the
        // closure value; the construction happens in the preamble.
        if let Expression::FunctionLiteral(lit) = value {
            let (rendered, site) = self.emit_closure(lit);
            self.flush_preamble(out);
            self.scopes
                .declare_as(name, CType::Closure(site), mutable, false, rendered);
            return;
        }

        let ctype = match annotation {
            Some(ann) => CType::from_annotation(ann, |n| self.is_interface(n)),
            None => self.resolve_expression(value),
        };
        if let Expression::Array(array) = value {
            self.array_lengths
                .insert(name.to_string(), array.elements.len());
        }

        let rendered = self.lower_expression(value);
        self.flush_preamble(out);
        let owned = ctype.is_owned();

        if self.is_frame_var(name) {
            let c_name = format!("frame->{}", safe_name(name));
            self.line(out, &format!("{c_name} = {rendered};"));
            self.scopes
                .declare_as(name, ctype.clone(), mutable, false, c_name);
        } else {
            let c_name = safe_name(name);
            let qualifier = if is_const { "const " } else { "" };
            self.line(
                out,
                &format!("{qualifier}{} {c_name} = {rendered};", ctype.c_name()),
            );
            self.scopes.declare(name, ctype.clone(), mutable, owned);
        }

        // Result-typed bindings remember their payload types so later
        // try/match on the name can pick the right union arm.
        if ctype == CType::Result {
            let ok_payload = self.result_payload(value, true);
            let err_payload = self.result_payload(value, false);
            self.scopes
                .declare(&format!("{name}_result_ok"), ok_payload, false, false);
            self.scopes
                .declare(&format!("{name}_result_err"), err_payload, false, false);
        }
    }

    fn lower_return(&mut self, value: &Option<Expression>, out: &mut String) {
        // Async bodies assign the frame result and report done.
        if self.current_async.is_some() {
            if let Some(expr) = value {
                let rendered = self.lower_expression(expr);
                self.flush_preamble(out);
                if self.current_return != CType::Void {
                    self.line(out, &format!("frame->result = {rendered};"));
                } else {
                    self.line(out, &format!("{rendered};"));
                }
            }
            self.line(out, "return true;");
            return;
        }

        if self.in_function {
            if let Some(expr) = value {
                let rendered = self.lower_return_value(expr);
                self.flush_preamble(out);
                if self.current_return != CType::Void {
                    self.line(out, &format!("__carv_retval = {rendered};"));
                } else {
                    self.line(out, &format!("{rendered};"));
                }
            } else {
                self.flush_preamble(out);
            }
            for drop in self.scopes.drops_down_to(self.fn_scope_depth) {
                self.line(out, &drop);
            }
            self.line(out, "goto __carv_exit;");
            return;
        }

        // Top level: plain C return.
        match value {
            Some(expr) => {
                let rendered = self.lower_expression(expr);
                self.flush_preamble(out);
                self.line(out, &format!("return {rendered};"));
            }
            None => {
                self.flush_preamble(out);
                self.line(out, "return 0;");
            }
        }
    }

    /// Returning a bare owned string moves it out of the scope so the
    /// exit-path drop sees a cleared value.
    fn lower_return_value(&mut self, expr: &Expression) -> String {
        if let Expression::Identifier(id) = expr {
            if let Some(info) = self.scopes.lookup(&id.name) {
                if info.owned && info.ctype == CType::Str {
                    let c_name = info.c_name.clone();
                    self.scopes.mark_moved(&id.name);
                    return format!("carv_string_move(&{c_name})");
                }
            }
        }
        self.lower_expression(expr)
    }

    fn lower_expression_statement(&mut self, expr: &Expression, out: &mut String) {
        match expr {
            Expression::If(ifexpr) => self.lower_if_into(ifexpr, None, out),
            Expression::Match(m) => {
                let n = self.fresh_match();
                self.lower_match_into(m, n, None, out);
            }
            Expression::Spawn(_) | Expression::Await(_) => {
                // The preamble carries the effect; the value is unused.
                let _ = self.lower_expression(expr);
                self.flush_preamble(out);
            }
            other => {
                let rendered = self.lower_expression(other);
                self.flush_preamble(out);
                if !rendered.is_empty() {
                    self.line(out, &format!("{rendered};"));
                }
            }
        }
    }

    // ========================================================================
    // Loops
    // ========================================================================

    fn lower_for(&mut self, stmt: &ForStatement, out: &mut String) {
        self.scopes.push();
        self.loop_depths.push(self.scopes.depth());

        let hoist = self.current_async.is_some();
        let mut header_init = String::new();

        match &stmt.init {
            Some(init) => match init.as_ref() {
                Statement::Let(let_stmt) if !hoist => {
                    let ctype = let_stmt
                        .type_annotation
                        .as_ref()
                        .map(|a| CType::from_annotation(a, |n| self.is_interface(n)))
                        .unwrap_or_else(|| self.resolve_expression(&let_stmt.value));
                    let rendered = self.lower_expression(&let_stmt.value);
                    self.flush_preamble(out);
                    let c_name = safe_name(&let_stmt.name.name);
                    header_init = format!("{} {c_name} = {rendered}", ctype.c_name());
                    // Header locals are never dropped per iteration.
                    self.scopes
                        .declare(&let_stmt.name.name, ctype, let_stmt.mutable, false);
                }
                other => {
                    // Hoisted (async bodies) or expression initializers run
                    // as plain statements ahead of the loop.
                    self.lower_statement(other, out);
                }
            },
            None => {}
        }

        let condition = match &stmt.condition {
            Some(cond) => self.lower_expression(cond),
            None => String::new(),
        };
        let post = match &stmt.post {
            Some(post) => self.lower_expression(post),
            None => String::new(),
        };
        self.flush_preamble(out);

        self.line(out, &format!("for ({header_init}; {condition}; {post}) {{"));
        self.indent += 1;
        for inner in &stmt.body.statements {
            self.lower_statement(inner, out);
        }
        self.emit_scope_drops(out);
        self.indent -= 1;
        self.line(out, "}");

        self.loop_depths.pop();
        self.scopes.pop();
    }

    fn lower_for_in(&mut self, stmt: &ForInStatement, out: &mut String) {
        let iterable_type = self.resolve_expression(&stmt.iterable);
        let kind = match &iterable_type {
            CType::Array(kind) => *kind,
            _ => ArrayKind::Int,
        };

        // Re-evaluating a complex iterable three times would duplicate
        // effects; anything but an identifier goes through a temporary.
        let array = match stmt.iterable.as_identifier() {
            Some(_) => self.lower_expression(&stmt.iterable),
            None => {
                let rendered = self.lower_expression(&stmt.iterable);
                let tmp = self.fresh_arr();
                self.pre_line(&format!("{} {tmp} = {rendered};", kind.array_name()));
                tmp
            }
        };
        self.flush_preamble(out);

        self.scopes.push();
        self.loop_depths.push(self.scopes.depth());

        let idx = self.fresh_idx();
        self.line(
            out,
            &format!("for (carv_int {idx} = 0; {idx} < {array}.length; {idx}++) {{"),
        );
        self.indent += 1;

        let element = kind.element();
        let binding = safe_name(&stmt.binding.name);
        if self.is_frame_var(&stmt.binding.name) {
            self.line(out, &format!("frame->{binding} = {array}.data[{idx}];"));
            self.scopes.declare_as(
                &stmt.binding.name,
                element,
                false,
                false,
                format!("frame->{binding}"),
            );
        } else {
            self.line(
                out,
                &format!("{} {binding} = {array}.data[{idx}];", element.c_name()),
            );
            self.scopes.declare(&stmt.binding.name, element, false, false);
        }

        for inner in &stmt.body.statements {
            self.lower_statement(inner, out);
        }
        self.emit_scope_drops(out);
        self.indent -= 1;
        self.line(out, "}");

        self.loop_depths.pop();
        self.scopes.pop();
    }

    fn lower_while(&mut self, stmt: &WhileStatement, out: &mut String) {
        let condition = self.lower_expression(&stmt.condition);
        self.flush_preamble(out);
        self.scopes.push();
        self.loop_depths.push(self.scopes.depth());
        self.line(out, &format!("while ({condition}) {{"));
        self.indent += 1;
        for inner in &stmt.body.statements {
            self.lower_statement(inner, out);
        }
        self.emit_scope_drops(out);
        self.indent -= 1;
        self.line(out, "}");
        self.loop_depths.pop();
        self.scopes.pop();
    }

    fn lower_loop(&mut self, stmt: &LoopStatement, out: &mut String) {
        self.scopes.push();
        self.loop_depths.push(self.scopes.depth());
        self.line(out, "for (;;) {");
        self.indent += 1;
        for inner in &stmt.body.statements {
            self.lower_statement(inner, out);
        }
        self.emit_scope_drops(out);
        self.indent -= 1;
        self.line(out, "}");
        self.loop_depths.pop();
        self.scopes.pop();
    }

    /// `break`/`continue` drop every scope between here and the loop.
    fn lower_loop_exit(&mut self, keyword: &str, out: &mut String) {
        if let Some(&loop_depth) = self.loop_depths.last() {
            for drop in self.scopes.drops_down_to(loop_depth - 1) {
                self.line(out, &drop);
            }
        }
        self.line(out, keyword);
    }

    /// Drops for the innermost scope, emitted just before it closes.
    pub(crate) fn emit_scope_drops(&mut self, out: &mut String) {
        for drop in self.scopes.drops_for_innermost() {
            self.line(out, &drop);
        }
    }

    // ========================================================================
    // If and match, statement-shaped
    // ========================================================================

    /// Emit an if/else chain. With a `target`, each branch's trailing
    /// expression is assigned into it (the if-as-value expansion).
    pub(crate) fn lower_if_into(
        &mut self,
        ifexpr: &IfExpression,
        target: Option<&str>,
        out: &mut String,
    ) {
        let condition = self.lower_expression(&ifexpr.condition);
        self.flush_preamble(out);
        self.line(out, &format!("if ({condition}) {{"));
        self.lower_branch(&ifexpr.consequence, target, out);
        match &ifexpr.alternative {
            None => self.line(out, "}"),
            Some(ElseBranch::Block(block)) => {
                self.line(out, "} else {");
                self.lower_branch(block, target, out);
                self.line(out, "}");
            }
            Some(ElseBranch::If(nested)) => {
                self.line(out, "} else {");
                self.indent += 1;
                self.lower_if_into(nested, target, out);
                self.indent -= 1;
                self.line(out, "}");
            }
        }
    }

    fn lower_branch(&mut self, block: &BlockStatement, target: Option<&str>, out: &mut String) {
        self.indent += 1;
        self.scopes.push();
        let last = block.statements.len().saturating_sub(1);
        for (i, inner) in block.statements.iter().enumerate() {
            if i == last && target.is_some() {
                if let Statement::Expression(s) = inner {
                    let rendered = self.lower_expression(&s.expression);
                    self.flush_preamble(out);
                    self.line(out, &format!("{} = {rendered};", target.unwrap()));
                    continue;
                }
            }
            self.lower_statement(inner, out);
        }
        self.emit_scope_drops(out);
        self.scopes.pop();
        self.indent -= 1;
    }

    /// Emit a match over a result as an if/else-if chain on the ok flag.
    /// Arm `n` names the temporaries `__match_<n>` / `__match_res_<n>`.
    pub(crate) fn lower_match_into(
        &mut self,
        m: &MatchExpression,
        n: usize,
        target: Option<&str>,
        out: &mut String,
    ) {
        let scrutinee = self.lower_expression(&m.scrutinee);
        self.flush_preamble(out);
        let match_tmp = format!("__match_{n}");
        self.line(out, &format!("carv_result {match_tmp} = {scrutinee};"));

        let mut first = true;
        for arm in &m.arms {
            let condition = match &arm.pattern {
                MatchPattern::Ok_(_) => Some(format!("{match_tmp}.ok_flag")),
                MatchPattern::Err_(_) => Some(format!("!{match_tmp}.ok_flag")),
                MatchPattern::Wildcard => None,
            };
            let header = match (first, condition) {
                (true, Some(c)) => format!("if ({c}) {{"),
                (true, None) => "{".to_string(),
                (false, Some(c)) => format!("}} else if ({c}) {{"),
                (false, None) => "} else {".to_string(),
            };
            self.line(out, &header);
            self.indent += 1;
            self.scopes.push();

            match &arm.pattern {
                MatchPattern::Ok_(Some(binding)) => {
                    let payload = self.result_payload(&m.scrutinee, true);
                    let c_name = safe_name(&binding.name);
                    self.line(
                        out,
                        &format!(
                            "{} {c_name} = {match_tmp}.ok_union.{};",
                            payload.c_name(),
                            payload.result_arm()
                        ),
                    );
                    self.scopes.declare(&binding.name, payload, false, false);
                }
                MatchPattern::Err_(Some(binding)) => {
                    let payload = self.result_payload(&m.scrutinee, false);
                    let c_name = safe_name(&binding.name);
                    self.line(
                        out,
                        &format!(
                            "{} {c_name} = {match_tmp}.err_union.{};",
                            payload.c_name(),
                            payload.result_arm()
                        ),
                    );
                    self.scopes.declare(&binding.name, payload, false, false);
                }
                _ => {}
            }

            let rendered = self.lower_expression(&arm.body);
            self.flush_preamble(out);
            match target {
                Some(t) => self.line(out, &format!("{t} = {rendered};")),
                None => {
                    if !rendered.is_empty() {
                        self.line(out, &format!("{rendered};"));
                    }
                }
            }

            self.emit_scope_drops(out);
            self.scopes.pop();
            self.indent -= 1;
            first = false;
        }
        if !m.arms.is_empty() {
            self.line(out, "}");
        }
    }

    // ========================================================================
    // Functions and methods
    // ========================================================================

    /// Emit a user function in single-exit form.
    pub(crate) fn emit_function(&mut self, decl: &FunctionDecl, out: &mut String) {
        let name = safe_name(&decl.name.name);
        let ret = self
            .fn_returns
            .get(&decl.name.name)
            .cloned()
            .unwrap_or(CType::Void);
        let params = self.param_ctypes(&decl.params);

        self.line(
            out,
            &format!("{} {name}({}) {{", ret.c_name(), render_params(&params)),
        );
        self.indent += 1;
        self.scopes.push();
        for (param, ctype) in &params {
            self.scopes.declare(param, ctype.clone(), true, false);
        }

        let saved_in_function = self.in_function;
        let saved_return = self.current_return.clone();
        let saved_depth = self.fn_scope_depth;
        self.in_function = true;
        self.current_return = ret.clone();
        self.fn_scope_depth = self.scopes.depth();

        if ret != CType::Void {
            self.line(out, &format!("{} __carv_retval;", ret.c_name()));
        }
        for stmt in &decl.body.statements {
            self.lower_statement(stmt, out);
        }
        self.line(out, "__carv_exit:;");
        self.emit_scope_drops(out);
        if ret != CType::Void {
            self.line(out, "return __carv_retval;");
        }

        self.in_function = saved_in_function;
        self.current_return = saved_return;
        self.fn_scope_depth = saved_depth;
        self.scopes.pop();
        self.indent -= 1;
        self.line(out, "}");
        out.push('\n');
    }

    /// Emit a class method `<Class>_<method>` with its receiver pointer.
    pub(crate) fn emit_method(&mut self, class: &str, method: &MethodDecl, out: &mut String) {
        let sig = self
            .methods
            .get(&(class.to_string(), method.name.name.clone()))
            .cloned();
        let Some(sig) = sig else { return };

        let receiver = if sig.receiver.is_const() {
            format!("const {class}* self")
        } else {
            format!("{class}* self")
        };
        let mut params = format!("{receiver}");
        if !sig.params.is_empty() {
            params.push_str(", ");
            params.push_str(&render_params(&sig.params));
        }

        self.line(
            out,
            &format!("{} {class}_{}({params}) {{", sig.ret.c_name(), sig.name),
        );
        self.indent += 1;
        self.scopes.push();
        self.scopes
            .declare("self", CType::ClassPtr(class.to_string()), true, false);
        for (param, ctype) in &sig.params {
            self.scopes.declare(param, ctype.clone(), true, false);
        }

        let saved_in_function = self.in_function;
        let saved_return = self.current_return.clone();
        let saved_depth = self.fn_scope_depth;
        self.in_function = true;
        self.current_return = sig.ret.clone();
        self.fn_scope_depth = self.scopes.depth();

        if sig.ret != CType::Void {
            self.line(out, &format!("{} __carv_retval;", sig.ret.c_name()));
        }
        for stmt in &method.body.statements {
            self.lower_statement(stmt, out);
        }
        self.line(out, "__carv_exit:;");
        self.emit_scope_drops(out);
        if sig.ret != CType::Void {
            self.line(out, "return __carv_retval;");
        }

        self.in_function = saved_in_function;
        self.current_return = saved_return;
        self.fn_scope_depth = saved_depth;
        self.scopes.pop();
        self.indent -= 1;
        self.line(out, "}");
        out.push('\n');
    }

    // ========================================================================
    // Classes
    // ========================================================================

    pub(crate) fn emit_class_forward_typedefs(&mut self, out: &mut String, program: &Program) {
        let mut any = false;
        for stmt in &program.statements {
            if let Statement::Class(decl) = stmt {
                out.push_str(&format!(
                    "typedef struct {0} {0};\n",
                    decl.name.name
                ));
                any = true;
            }
        }
        if any {
            out.push('\n');
        }
    }

    pub(crate) fn emit_class_structs(&mut self, out: &mut String, program: &Program) {
        for stmt in &program.statements {
            let Statement::Class(decl) = stmt else { continue };
            let class = &decl.name.name;
            out.push_str(&format!("struct {class} {{\n"));
            let fields = self.class_fields.get(class).cloned().unwrap_or_default();
            if fields.is_empty() {
                // C requires at least one member.
                out.push_str("    char __pad;\n");
            }
            for field in &fields {
                out.push_str(&format!(
                    "    {} {};\n",
                    field.ctype.c_name(),
                    safe_name(&field.name)
                ));
            }
            out.push_str("};\n\n");
        }
    }

    /// Constructor plus method definitions for one class. The constructor
    /// arena-allocates the instance and applies field defaults (explicit
    /// where provided, zero for the field kind otherwise).
    pub(crate) fn emit_class_defs(&mut self, decl: &ClassDecl, out: &mut String) {
        let class = decl.name.name.clone();
        self.line(out, &format!("{class}* {class}_new(void) {{"));
        self.indent += 1;
        self.line(
            out,
            &format!("{class}* self = ({class}*)carv_arena_alloc(sizeof({class}));"),
        );
        let fields = self.class_fields.get(&class).cloned().unwrap_or_default();
        for field in &fields {
            let value = match &field.default {
                Some(default) => {
                    let rendered = self.lower_expression(default);
                    self.flush_preamble(out);
                    rendered
                }
                None => field.ctype.zero_value(),
            };
            self.line(out, &format!("self->{} = {value};", safe_name(&field.name)));
        }
        self.line(out, "return self;");
        self.indent -= 1;
        self.line(out, "}");
        out.push('\n');

        for method in &decl.methods {
            self.emit_method(&class, method, out);
        }
    }

    // ========================================================================
    // Prototypes
    // ========================================================================

    /// Forward declarations for everything a body might reference:
    /// constructors, methods, wrappers, vtable instances, user functions,
    /// polls and async constructors.
    pub(crate) fn emit_prototypes(&mut self, out: &mut String, program: &Program) {
        for stmt in &program.statements {
            match stmt {
                Statement::Class(decl) => {
                    let class = &decl.name.name;
                    out.push_str(&format!("{class}* {class}_new(void);\n"));
                    for method in &decl.methods {
                        self.emit_method_prototype(class, &method.name.name, out);
                    }
                }
                Statement::Impl(decl) => {
                    let class = &decl.target.name;
                    let interface = &decl.interface.name;
                    for method in &decl.methods {
                        self.emit_method_prototype(class, &method.name.name, out);
                    }
                    let sigs = self.interfaces.get(interface).cloned().unwrap_or_default();
                    for sig in &sigs {
                        let self_param = if sig.receiver.is_const() {
                            "const void* self"
                        } else {
                            "void* self"
                        };
                        let mut params = self_param.to_string();
                        if !sig.params.is_empty() {
                            params.push_str(", ");
                            params.push_str(&render_params(&sig.params));
                        }
                        out.push_str(&format!(
                            "static {} {interface}__{class}__{}({params});\n",
                            sig.ret.c_name(),
                            sig.name
                        ));
                    }
                    out.push_str(&format!(
                        "static const {interface}_vtable {interface}__{class}__VT;\n"
                    ));
                }
                Statement::Function(decl) if !decl.is_async => {
                    let name = safe_name(&decl.name.name);
                    let ret = self
                        .fn_returns
                        .get(&decl.name.name)
                        .cloned()
                        .unwrap_or(CType::Void);
                    let params = self.param_ctypes(&decl.params);
                    out.push_str(&format!(
                        "{} {name}({});\n",
                        ret.c_name(),
                        render_params(&params)
                    ));
                }
                Statement::Function(decl) => {
                    let base = safe_name(&decl.name.name);
                    let params = self.param_ctypes(&decl.params);
                    out.push_str(&format!(
                        "bool {base}_poll(void* __raw, carv_event_loop* loop);\n"
                    ));
                    out.push_str(&format!(
                        "{base}_frame* {base}({});\n",
                        render_params(&params)
                    ));
                }
                _ => {}
            }
        }
        out.push('\n');
    }

    fn emit_method_prototype(&self, class: &str, method: &str, out: &mut String) {
        let Some(sig) = self.methods.get(&(class.to_string(), method.to_string())) else {
            return;
        };
        let receiver = if sig.receiver.is_const() {
            format!("const {class}* self")
        } else {
            format!("{class}* self")
        };
        let mut params = receiver;
        if !sig.params.is_empty() {
            params.push_str(", ");
            params.push_str(&render_params(&sig.params));
        }
        out.push_str(&format!(
            "{} {class}_{}({params});\n",
            sig.ret.c_name(),
            sig.name
        ));
    }
}
