//! Declaration pre-passes.
//!
//! The generator walks the program before emitting any code, gathering:
//! interface signatures, class layouts and method signatures, impl
//! bindings (in source order), user function return types with result
//! payloads, and async frame layouts. A small generic walker is shared
//! with the feature scan.

use super::ctype::CType;
use super::{AsyncInfo, CodeGenerator, FieldInfo, SigInfo};
use carv_parser::ast::*;

impl<'a> CodeGenerator<'a> {
    pub(crate) fn collect_declarations(&mut self, program: &Program) {
        // Interface names first: annotation resolution needs to classify
        // `&Name` as a fat pointer or a class borrow.
        for stmt in &program.statements {
            if let Statement::Interface(decl) = stmt {
                self.interface_order.push(decl.name.name.clone());
                self.interfaces.insert(decl.name.name.clone(), Vec::new());
            }
        }

        for stmt in &program.statements {
            match stmt {
                Statement::Interface(decl) => self.collect_interface(decl),
                Statement::Class(decl) => self.collect_class(decl),
                Statement::Require(decl) => self.collect_require(decl),
                _ => {}
            }
        }

        // Impls after classes so method registration can target them.
        for stmt in &program.statements {
            if let Statement::Impl(decl) = stmt {
                self.collect_impl(decl);
            }
        }

        // Function return types (and result payloads) before async frames:
        // local collection resolves call initializers through the table.
        for stmt in &program.statements {
            if let Statement::Function(decl) = stmt {
                self.collect_function(decl);
            }
        }

        for stmt in &program.statements {
            if let Statement::Function(decl) = stmt {
                if decl.is_async {
                    self.collect_async(decl);
                }
            }
        }
    }

    fn annotation_ctype(&self, ann: &TypeAnnotation) -> CType {
        CType::from_annotation(ann, |n| self.interfaces.contains_key(n))
    }

    pub(crate) fn param_ctypes(&self, params: &[Parameter]) -> Vec<(String, CType)> {
        params
            .iter()
            .map(|p| {
                let ctype = p
                    .type_annotation
                    .as_ref()
                    .map(|t| self.annotation_ctype(t))
                    .unwrap_or(CType::Int);
                (p.name.name.clone(), ctype)
            })
            .collect()
    }

    fn collect_interface(&mut self, decl: &InterfaceDecl) {
        let sigs: Vec<SigInfo> = decl
            .methods
            .iter()
            .map(|sig| SigInfo {
                name: sig.name.name.clone(),
                receiver: sig.receiver,
                params: self.param_ctypes(&sig.params),
                ret: sig
                    .return_type
                    .as_ref()
                    .map(|t| self.annotation_ctype(t))
                    .unwrap_or(CType::Void),
            })
            .collect();
        self.interfaces.insert(decl.name.name.clone(), sigs);
    }

    fn collect_class(&mut self, decl: &ClassDecl) {
        let name = decl.name.name.clone();

        let fields: Vec<FieldInfo> = decl
            .fields
            .iter()
            .map(|f| FieldInfo {
                name: f.name.name.clone(),
                ctype: self.annotation_ctype(&f.type_annotation),
                default: f.default.clone(),
            })
            .collect();
        self.class_fields.insert(name.clone(), fields);

        for method in &decl.methods {
            self.register_method(&name, method);
        }
    }

    fn collect_impl(&mut self, decl: &ImplDecl) {
        self.impls
            .push((decl.interface.name.clone(), decl.target.name.clone()));
        for method in &decl.methods {
            self.register_method(&decl.target.name, method);
        }
    }

    fn register_method(&mut self, class: &str, method: &MethodDecl) {
        let sig = SigInfo {
            name: method.name.name.clone(),
            receiver: method.receiver,
            params: self.param_ctypes(&method.params),
            ret: method
                .return_type
                .as_ref()
                .map(|t| self.annotation_ctype(t))
                .unwrap_or(CType::Void),
        };
        self.methods
            .insert((class.to_string(), method.name.name.clone()), sig);
    }

    fn collect_require(&mut self, decl: &RequireDecl) {
        // The loader reports built-in targets by leaving the module name
        // as-is; anything path-like was already spliced into the program.
        if matches!(decl.module.as_str(), "net" | "fs") {
            let alias = decl
                .alias
                .as_ref()
                .map(|a| a.name.clone())
                .unwrap_or_else(|| decl.module.clone());
            self.builtin_aliases.insert(alias);
            if decl.module == "net" {
                self.flags.uses_tcp = true;
            }
        }
    }

    /// Return-type collection, in order: explicit annotation;
    /// else result when any return carries ok/err (the first of each fixes
    /// the payload type); else the first return expression's resolved type;
    /// else void.
    fn collect_function(&mut self, decl: &FunctionDecl) {
        let name = decl.name.name.clone();
        let returns = collect_returns(&decl.body);

        let mut ok_payload = None;
        let mut err_payload = None;
        for ret in &returns {
            match ret {
                Some(Expression::Ok_(inner)) if ok_payload.is_none() => {
                    ok_payload = Some(self.resolve_expression(&inner.value));
                }
                Some(Expression::Err_(inner)) if err_payload.is_none() => {
                    err_payload = Some(self.resolve_expression(&inner.value));
                }
                _ => {}
            }
        }

        let ret = if let Some(ann) = &decl.return_type {
            self.annotation_ctype(ann)
        } else if ok_payload.is_some() || err_payload.is_some() {
            CType::Result
        } else if let Some(Some(expr)) = returns.iter().find(|r| r.is_some()) {
            self.resolve_expression(expr)
        } else {
            CType::Void
        };

        if ret == CType::Result {
            self.fn_returns.insert(
                format!("{name}_result_ok"),
                ok_payload.unwrap_or(CType::Int),
            );
            self.fn_returns.insert(
                format!("{name}_result_err"),
                err_payload.unwrap_or(CType::Int),
            );
        }
        self.fn_returns.insert(name, ret);
    }

    /// Async frame collection: parameters in declaration order, then the
    /// locals of the body found by a block walk (let bindings, loop inits,
    /// for-in bindings), de-duplicated by name.
    fn collect_async(&mut self, decl: &FunctionDecl) {
        let params = self.param_ctypes(&decl.params);
        let ret = self
            .fn_returns
            .get(&decl.name.name)
            .cloned()
            .unwrap_or(CType::Void);

        // Walk with a live scope so later initializers can resolve
        // identifiers bound by earlier ones.
        self.scopes.push();
        for (name, ctype) in &params {
            self.scopes.declare(name, ctype.clone(), true, false);
        }
        let mut locals: Vec<(String, CType)> = Vec::new();
        self.collect_locals_block(&decl.body, &mut locals);
        self.scopes.pop();

        self.async_order.push(decl.name.name.clone());
        self.asyncs
            .insert(decl.name.name.clone(), AsyncInfo { params, locals, ret });
    }

    fn collect_locals_block(&mut self, block: &BlockStatement, locals: &mut Vec<(String, CType)>) {
        for stmt in &block.statements {
            self.collect_locals_stmt(stmt, locals);
        }
    }

    fn collect_locals_stmt(&mut self, stmt: &Statement, locals: &mut Vec<(String, CType)>) {
        match stmt {
            Statement::Let(s) => {
                let ctype = s
                    .type_annotation
                    .as_ref()
                    .map(|t| self.annotation_ctype(t))
                    .unwrap_or_else(|| self.resolve_local_init(&s.value));
                self.record_local(&s.name.name, ctype, locals);
            }
            Statement::Const(s) => {
                let ctype = s
                    .type_annotation
                    .as_ref()
                    .map(|t| self.annotation_ctype(t))
                    .unwrap_or_else(|| self.resolve_local_init(&s.value));
                self.record_local(&s.name.name, ctype, locals);
            }
            Statement::For(s) => {
                if let Some(init) = &s.init {
                    self.collect_locals_stmt(init, locals);
                }
                self.collect_locals_block(&s.body, locals);
            }
            Statement::ForIn(s) => {
                let element = match self.resolve_expression(&s.iterable) {
                    CType::Array(kind) => kind.element(),
                    _ => CType::Int,
                };
                self.record_local(&s.binding.name, element, locals);
                self.collect_locals_block(&s.body, locals);
            }
            Statement::While(s) => self.collect_locals_block(&s.body, locals),
            Statement::Loop(s) => self.collect_locals_block(&s.body, locals),
            Statement::Block(s) => self.collect_locals_block(s, locals),
            Statement::Expression(s) => {
                if let Expression::If(ifexpr) = &s.expression {
                    self.collect_locals_if(ifexpr, locals);
                }
            }
            _ => {}
        }
    }

    fn collect_locals_if(&mut self, ifexpr: &IfExpression, locals: &mut Vec<(String, CType)>) {
        self.collect_locals_block(&ifexpr.consequence, locals);
        match &ifexpr.alternative {
            Some(ElseBranch::Block(block)) => self.collect_locals_block(block, locals),
            Some(ElseBranch::If(nested)) => self.collect_locals_if(nested, locals),
            None => {}
        }
    }

    /// Resolve an async local initializer. Awaits resolve through the
    /// callee's recorded return type; everything else through the normal
    /// resolver against the collection scope.
    fn resolve_local_init(&self, value: &Expression) -> CType {
        self.resolve_expression(value)
    }

    fn record_local(&mut self, name: &str, ctype: CType, locals: &mut Vec<(String, CType)>) {
        self.scopes.declare(name, ctype.clone(), true, false);
        if !locals.iter().any(|(n, _)| n == name) {
            locals.push((name.to_string(), ctype));
        }
    }
}

/// All return statements in a body, nested blocks included, in source
/// order. `None` entries are bare `return;`.
pub(crate) fn collect_returns(block: &BlockStatement) -> Vec<Option<Expression>> {
    let mut out = Vec::new();
    collect_returns_block(block, &mut out);
    out
}

fn collect_returns_block(block: &BlockStatement, out: &mut Vec<Option<Expression>>) {
    for stmt in &block.statements {
        collect_returns_stmt(stmt, out);
    }
}

fn collect_returns_stmt(stmt: &Statement, out: &mut Vec<Option<Expression>>) {
    match stmt {
        Statement::Return(ret) => out.push(ret.value.clone()),
        Statement::For(s) => collect_returns_block(&s.body, out),
        Statement::ForIn(s) => collect_returns_block(&s.body, out),
        Statement::While(s) => collect_returns_block(&s.body, out),
        Statement::Loop(s) => collect_returns_block(&s.body, out),
        Statement::Block(s) => collect_returns_block(s, out),
        Statement::Expression(s) => {
            if let Expression::If(ifexpr) = &s.expression {
                collect_returns_if(ifexpr, out);
            }
        }
        _ => {}
    }
}

fn collect_returns_if(ifexpr: &IfExpression, out: &mut Vec<Option<Expression>>) {
    collect_returns_block(&ifexpr.consequence, out);
    match &ifexpr.alternative {
        Some(ElseBranch::Block(block)) => collect_returns_block(block, out),
        Some(ElseBranch::If(nested)) => collect_returns_if(nested, out),
        None => {}
    }
}

// ============================================================================
// Feature scan
// ============================================================================

/// Whether the program uses async machinery or TCP helpers anywhere.
/// Drives the conditional runtime sections.
pub(crate) fn scan_feature_usage(program: &Program) -> (bool, bool) {
    let mut uses_async = false;
    let mut uses_tcp = false;
    for stmt in &program.statements {
        scan_stmt(stmt, &mut uses_async, &mut uses_tcp);
    }
    (uses_async, uses_tcp)
}

fn scan_block(block: &BlockStatement, uses_async: &mut bool, uses_tcp: &mut bool) {
    for stmt in &block.statements {
        scan_stmt(stmt, uses_async, uses_tcp);
    }
}

fn scan_stmt(stmt: &Statement, uses_async: &mut bool, uses_tcp: &mut bool) {
    match stmt {
        Statement::Let(s) => scan_expr(&s.value, uses_async, uses_tcp),
        Statement::Const(s) => scan_expr(&s.value, uses_async, uses_tcp),
        Statement::Return(s) => {
            if let Some(value) = &s.value {
                scan_expr(value, uses_async, uses_tcp);
            }
        }
        Statement::Expression(s) => scan_expr(&s.expression, uses_async, uses_tcp),
        Statement::For(s) => {
            if let Some(init) = &s.init {
                scan_stmt(init, uses_async, uses_tcp);
            }
            if let Some(cond) = &s.condition {
                scan_expr(cond, uses_async, uses_tcp);
            }
            if let Some(post) = &s.post {
                scan_expr(post, uses_async, uses_tcp);
            }
            scan_block(&s.body, uses_async, uses_tcp);
        }
        Statement::ForIn(s) => {
            scan_expr(&s.iterable, uses_async, uses_tcp);
            scan_block(&s.body, uses_async, uses_tcp);
        }
        Statement::While(s) => {
            scan_expr(&s.condition, uses_async, uses_tcp);
            scan_block(&s.body, uses_async, uses_tcp);
        }
        Statement::Loop(s) => scan_block(&s.body, uses_async, uses_tcp),
        Statement::Block(s) => scan_block(s, uses_async, uses_tcp),
        Statement::Function(decl) => {
            if decl.is_async {
                *uses_async = true;
            }
            scan_block(&decl.body, uses_async, uses_tcp);
        }
        Statement::Class(decl) => {
            for method in &decl.methods {
                scan_block(&method.body, uses_async, uses_tcp);
            }
        }
        Statement::Impl(decl) => {
            for method in &decl.methods {
                scan_block(&method.body, uses_async, uses_tcp);
            }
        }
        Statement::Require(decl) => {
            if decl.module == "net" {
                *uses_tcp = true;
            }
        }
        Statement::Interface(_) | Statement::Break(_) | Statement::Continue(_) => {}
    }
}

fn scan_expr(expr: &Expression, uses_async: &mut bool, uses_tcp: &mut bool) {
    match expr {
        Expression::Spawn(s) => {
            *uses_async = true;
            scan_expr(&s.call, uses_async, uses_tcp);
        }
        Expression::Await(a) => {
            *uses_async = true;
            scan_expr(&a.value, uses_async, uses_tcp);
        }
        Expression::Call(call) => {
            if let Some(name) = call.callee.as_identifier() {
                if name.starts_with("tcp_") {
                    *uses_tcp = true;
                }
            }
            scan_expr(&call.callee, uses_async, uses_tcp);
            for arg in &call.arguments {
                scan_expr(arg, uses_async, uses_tcp);
            }
        }
        Expression::Pipe(pipe) => {
            scan_expr(&pipe.value, uses_async, uses_tcp);
            scan_expr(&pipe.target, uses_async, uses_tcp);
        }
        Expression::Infix(infix) => {
            scan_expr(&infix.left, uses_async, uses_tcp);
            scan_expr(&infix.right, uses_async, uses_tcp);
        }
        Expression::Prefix(prefix) => scan_expr(&prefix.operand, uses_async, uses_tcp),
        Expression::Assign(assign) => {
            scan_expr(&assign.target, uses_async, uses_tcp);
            scan_expr(&assign.value, uses_async, uses_tcp);
        }
        Expression::If(ifexpr) => {
            scan_expr(&ifexpr.condition, uses_async, uses_tcp);
            scan_block(&ifexpr.consequence, uses_async, uses_tcp);
            match &ifexpr.alternative {
                Some(ElseBranch::Block(block)) => scan_block(block, uses_async, uses_tcp),
                Some(ElseBranch::If(nested)) => {
                    scan_expr(&Expression::If((**nested).clone()), uses_async, uses_tcp)
                }
                None => {}
            }
        }
        Expression::Index(index) => {
            scan_expr(&index.object, uses_async, uses_tcp);
            scan_expr(&index.index, uses_async, uses_tcp);
        }
        Expression::Member(member) => scan_expr(&member.object, uses_async, uses_tcp),
        Expression::Ok_(inner) => scan_expr(&inner.value, uses_async, uses_tcp),
        Expression::Err_(inner) => scan_expr(&inner.value, uses_async, uses_tcp),
        Expression::Try(inner) => scan_expr(&inner.value, uses_async, uses_tcp),
        Expression::Match(m) => {
            scan_expr(&m.scrutinee, uses_async, uses_tcp);
            for arm in &m.arms {
                scan_expr(&arm.body, uses_async, uses_tcp);
            }
        }
        Expression::Borrow(borrow) => scan_expr(&borrow.operand, uses_async, uses_tcp),
        Expression::Deref(deref) => scan_expr(&deref.operand, uses_async, uses_tcp),
        Expression::Cast(cast) => scan_expr(&cast.value, uses_async, uses_tcp),
        Expression::Array(array) => {
            for element in &array.elements {
                scan_expr(element, uses_async, uses_tcp);
            }
        }
        Expression::InterpolatedString(s) => {
            for part in &s.parts {
                if let StringPart::Expression(inner) = part {
                    scan_expr(inner, uses_async, uses_tcp);
                }
            }
        }
        Expression::FunctionLiteral(lit) => scan_block(&lit.body, uses_async, uses_tcp),
        _ => {}
    }
}
