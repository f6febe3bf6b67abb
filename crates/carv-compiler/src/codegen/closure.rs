//! Closure lowering (lambda lifting).
//!
//! Every function literal becomes three deferred definitions (an
//! environment struct, a lifted static function, and a fat-pointer value
//! type) plus use-site code that arena-allocates and populates the
//! environment. The free-variable walk visits the whole body but never
//! descends into nested function literals; those lift themselves when
//! their own body is lowered.

use super::ctype::CType;
use super::scope::safe_name;
use super::CodeGenerator;
use carv_parser::ast::*;
use rustc_hash::FxHashSet;

impl<'a> CodeGenerator<'a> {
    /// Lift one function literal. Returns the use-site value (`__cl_<n>`)
    /// and the site index.
    pub(crate) fn emit_closure(&mut self, lit: &FunctionLiteral) -> (String, usize) {
        let site = self.closure_count;
        self.closure_count += 1;

        let params = self.param_ctypes(&lit.params);
        let captures = self.collect_captures(lit);

        let ret = match &lit.return_type {
            Some(ann) => CType::from_annotation(ann, |n| self.is_interface(n)),
            None => self.infer_literal_return(lit, &params, &captures),
        };
        self.closure_rets.insert(site, ret.clone());

        // Environment struct and the closure value type.
        let mut defs = String::new();
        defs.push_str("typedef struct {\n");
        for (name, info) in &captures {
            defs.push_str(&format!(
                "    {} {};\n",
                info.ctype.c_name(),
                safe_name(name)
            ));
        }
        if captures.is_empty() {
            defs.push_str("    char __pad;\n");
        }
        defs.push_str(&format!("}} __closure_{site}_env;\n\n"));

        let mut fn_ptr_params = format!("__closure_{site}_env*");
        for (_, ctype) in &params {
            fn_ptr_params.push_str(", ");
            fn_ptr_params.push_str(&ctype.c_name());
        }
        defs.push_str("typedef struct {\n");
        defs.push_str(&format!("    __closure_{site}_env* env;\n"));
        defs.push_str(&format!(
            "    {} (*fn_ptr)({fn_ptr_params});\n",
            ret.c_name()
        ));
        defs.push_str(&format!("}} __closure_{site};\n\n"));

        // The lifted function, single-exit like every other function.
        let mut lifted = String::new();
        let mut sig_params = format!("__closure_{site}_env* __env");
        for (name, ctype) in &params {
            sig_params.push_str(", ");
            sig_params.push_str(&format!("{} {}", ctype.c_name(), safe_name(name)));
        }
        lifted.push_str(&format!(
            "static {} __closure_{site}_fn({sig_params}) {{\n",
            ret.c_name()
        ));

        let saved_indent = self.indent;
        let saved_in_function = self.in_function;
        let saved_return = self.current_return.clone();
        let saved_depth = self.fn_scope_depth;
        let saved_async = self.current_async.take();

        self.indent = 1;
        self.scopes.push();
        for (name, info) in &captures {
            self.scopes.declare_as(
                name,
                info.ctype.clone(),
                info.mutable,
                false,
                format!("__env->{}", safe_name(name)),
            );
        }
        for (name, ctype) in &params {
            self.scopes.declare(name, ctype.clone(), true, false);
        }
        self.in_function = true;
        self.current_return = ret.clone();
        self.fn_scope_depth = self.scopes.depth();

        if ret != CType::Void {
            self.line(&mut lifted, &format!("{} __carv_retval;", ret.c_name()));
        }
        for stmt in &lit.body.statements {
            self.lower_statement(stmt, &mut lifted);
        }
        self.line(&mut lifted, "__carv_exit:;");
        self.emit_scope_drops(&mut lifted);
        if ret != CType::Void {
            self.line(&mut lifted, "return __carv_retval;");
        }
        lifted.push_str("}\n\n");

        self.scopes.pop();
        self.indent = saved_indent;
        self.in_function = saved_in_function;
        self.current_return = saved_return;
        self.fn_scope_depth = saved_depth;
        self.current_async = saved_async;

        // Nested closures appended their definitions while the body was
        // lowering; ours follow so uses see complete types.
        self.closure_defs.push_str(&defs);
        self.closure_defs.push_str(&lifted);

        // Use site: allocate the environment, populate it (moving owned
        // strings in), build the fat-pointer value.
        self.pre_line(&format!(
            "__closure_{site}_env* __env_{site} = (__closure_{site}_env*)carv_arena_alloc(sizeof(__closure_{site}_env));"
        ));
        for (name, info) in &captures {
            let value = if info.owned && info.ctype == CType::Str {
                self.scopes.mark_moved(name);
                format!("carv_string_move(&{})", info.c_name)
            } else {
                info.c_name.clone()
            };
            self.pre_line(&format!(
                "__env_{site}->{} = {value};",
                safe_name(name)
            ));
        }
        self.pre_line(&format!(
            "__closure_{site} __cl_{site} = {{ __env_{site}, __closure_{site}_fn }};"
        ));

        (format!("__cl_{site}"), site)
    }

    /// Free variables of the literal that resolve in the enclosing scope
    /// chain, in first-use order, with their scope records.
    fn collect_captures(&self, lit: &FunctionLiteral) -> Vec<(String, super::scope::VarInfo)> {
        let mut bound: FxHashSet<String> =
            lit.params.iter().map(|p| p.name.name.clone()).collect();
        let mut order: Vec<String> = Vec::new();
        collect_block(&lit.body, &mut bound, &mut order);

        order
            .into_iter()
            .filter_map(|name| {
                self.scopes
                    .lookup(&name)
                    .map(|info| (name, info.clone()))
            })
            .collect()
    }

    /// Best-effort return type for unannotated literals: the first return
    /// expression resolved against a scope holding params and captures.
    fn infer_literal_return(
        &mut self,
        lit: &FunctionLiteral,
        params: &[(String, CType)],
        captures: &[(String, super::scope::VarInfo)],
    ) -> CType {
        let returns = super::decls::collect_returns(&lit.body);
        let Some(Some(expr)) = returns.iter().find(|r| r.is_some()) else {
            return CType::Void;
        };
        self.scopes.push();
        for (name, info) in captures {
            self.scopes
                .declare(name, info.ctype.clone(), info.mutable, false);
        }
        for (name, ctype) in params {
            self.scopes.declare(name, ctype.clone(), true, false);
        }
        let ret = self.resolve_expression(expr);
        self.scopes.pop();
        ret
    }
}

// ============================================================================
// Free-variable walk
// ============================================================================

fn record(name: &str, bound: &FxHashSet<String>, order: &mut Vec<String>) {
    if name == "self" {
        return;
    }
    if !bound.contains(name) && !order.iter().any(|n| n == name) {
        order.push(name.to_string());
    }
}

fn collect_block(block: &BlockStatement, bound: &mut FxHashSet<String>, order: &mut Vec<String>) {
    for stmt in &block.statements {
        collect_stmt(stmt, bound, order);
    }
}

fn collect_stmt(stmt: &Statement, bound: &mut FxHashSet<String>, order: &mut Vec<String>) {
    match stmt {
        Statement::Let(s) => {
            collect_expr(&s.value, bound, order);
            bound.insert(s.name.name.clone());
        }
        Statement::Const(s) => {
            collect_expr(&s.value, bound, order);
            bound.insert(s.name.name.clone());
        }
        Statement::Return(s) => {
            if let Some(value) = &s.value {
                collect_expr(value, bound, order);
            }
        }
        Statement::Expression(s) => collect_expr(&s.expression, bound, order),
        Statement::For(s) => {
            if let Some(init) = &s.init {
                collect_stmt(init, bound, order);
            }
            if let Some(cond) = &s.condition {
                collect_expr(cond, bound, order);
            }
            if let Some(post) = &s.post {
                collect_expr(post, bound, order);
            }
            collect_block(&s.body, bound, order);
        }
        Statement::ForIn(s) => {
            collect_expr(&s.iterable, bound, order);
            // The element binding is scoped to the loop body.
            let mut body_bound = bound.clone();
            body_bound.insert(s.binding.name.clone());
            collect_block(&s.body, &mut body_bound, order);
        }
        Statement::While(s) => {
            collect_expr(&s.condition, bound, order);
            collect_block(&s.body, bound, order);
        }
        Statement::Loop(s) => collect_block(&s.body, bound, order),
        Statement::Block(s) => collect_block(s, bound, order),
        _ => {}
    }
}

fn collect_expr(expr: &Expression, bound: &mut FxHashSet<String>, order: &mut Vec<String>) {
    match expr {
        Expression::Identifier(id) => record(&id.name, bound, order),
        Expression::Array(array) => {
            for element in &array.elements {
                collect_expr(element, bound, order);
            }
        }
        Expression::Prefix(prefix) => collect_expr(&prefix.operand, bound, order),
        Expression::Infix(infix) => {
            collect_expr(&infix.left, bound, order);
            collect_expr(&infix.right, bound, order);
        }
        Expression::Pipe(pipe) => {
            collect_expr(&pipe.value, bound, order);
            collect_expr(&pipe.target, bound, order);
        }
        Expression::Assign(assign) => {
            collect_expr(&assign.target, bound, order);
            collect_expr(&assign.value, bound, order);
        }
        Expression::Call(call) => {
            collect_expr(&call.callee, bound, order);
            for arg in &call.arguments {
                collect_expr(arg, bound, order);
            }
        }
        Expression::If(ifexpr) => {
            collect_expr(&ifexpr.condition, bound, order);
            collect_block(&ifexpr.consequence, bound, order);
            match &ifexpr.alternative {
                Some(ElseBranch::Block(block)) => collect_block(block, bound, order),
                Some(ElseBranch::If(nested)) => {
                    collect_expr(&Expression::If((**nested).clone()), bound, order)
                }
                None => {}
            }
        }
        Expression::Index(index) => {
            collect_expr(&index.object, bound, order);
            collect_expr(&index.index, bound, order);
        }
        Expression::Member(member) => collect_expr(&member.object, bound, order),
        Expression::Ok_(inner) => collect_expr(&inner.value, bound, order),
        Expression::Err_(inner) => collect_expr(&inner.value, bound, order),
        Expression::Try(inner) => collect_expr(&inner.value, bound, order),
        Expression::Match(m) => {
            collect_expr(&m.scrutinee, bound, order);
            for arm in &m.arms {
                // Arm bindings shadow only inside their own body; a cloned
                // set keeps them from suppressing captures of same-named
                // outer variables used after the match.
                let mut arm_bound = bound.clone();
                match &arm.pattern {
                    MatchPattern::Ok_(Some(binding)) | MatchPattern::Err_(Some(binding)) => {
                        arm_bound.insert(binding.name.clone());
                    }
                    _ => {}
                }
                collect_expr(&arm.body, &mut arm_bound, order);
            }
        }
        Expression::Borrow(borrow) => collect_expr(&borrow.operand, bound, order),
        Expression::Deref(deref) => collect_expr(&deref.operand, bound, order),
        Expression::Cast(cast) => collect_expr(&cast.value, bound, order),
        Expression::Spawn(spawn) => collect_expr(&spawn.call, bound, order),
        Expression::Await(awaited) => collect_expr(&awaited.value, bound, order),
        Expression::InterpolatedString(s) => {
            for part in &s.parts {
                if let StringPart::Expression(inner) = part {
                    collect_expr(inner, bound, order);
                }
            }
        }
        // Nested function literals capture for themselves when lifted.
        Expression::FunctionLiteral(_) => {}
        _ => {}
    }
}
