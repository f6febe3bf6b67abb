//! Async lowering.
//!
//! Each async function becomes a heap frame struct (state, parameters,
//! collected locals, result slot, sub-future pointer), a poll function
//! switching on the state with one fresh state per await, and a
//! constructor carrying the function's normal name that arena-allocates
//! the frame. Await emission itself lives in the expression lowerer; the
//! state counter and frame bindings are set up here.

use super::ctype::CType;
use super::scope::safe_name;
use super::stmt::render_params;
use super::CodeGenerator;
use carv_parser::ast::*;

impl<'a> CodeGenerator<'a> {
    /// Frame struct typedefs for every async function, emitted with the
    /// other type definitions so constructors and polls can be prototyped.
    pub(crate) fn emit_frame_structs(&mut self, out: &mut String) {
        for name in self.async_order.clone() {
            let Some(info) = self.asyncs.get(&name).cloned() else {
                continue;
            };
            let base = safe_name(&name);
            out.push_str(&format!("typedef struct {base}_frame {{\n"));
            out.push_str("    carv_int state;\n");
            for (param, ctype) in &info.params {
                out.push_str(&format!("    {} {};\n", ctype.c_name(), safe_name(param)));
            }
            for (local, ctype) in &info.locals {
                out.push_str(&format!("    {} {};\n", ctype.c_name(), safe_name(local)));
            }
            if info.ret != CType::Void {
                out.push_str(&format!("    {} result;\n", info.ret.c_name()));
            }
            out.push_str("    void* sub_future;\n");
            out.push_str(&format!("}} {base}_frame;\n\n"));
        }
    }

    /// Poll function and frame constructor for one async function.
    pub(crate) fn emit_async_defs(&mut self, decl: &FunctionDecl, out: &mut String) {
        let name = decl.name.name.clone();
        let Some(info) = self.asyncs.get(&name).cloned() else {
            return;
        };
        let base = safe_name(&name);

        // ---- poll ----
        self.line(
            out,
            &format!("bool {base}_poll(void* __raw, carv_event_loop* loop) {{"),
        );
        self.indent += 1;
        self.line(out, &format!("{base}_frame* frame = ({base}_frame*)__raw;"));
        self.line(out, "(void)loop;");
        self.line(out, "switch (frame->state) {");
        self.line(out, "case 0:;");

        self.scopes.push();
        for (param, ctype) in &info.params {
            self.scopes.declare_as(
                param,
                ctype.clone(),
                true,
                false,
                format!("frame->{}", safe_name(param)),
            );
        }
        for (local, ctype) in &info.locals {
            self.scopes.declare_as(
                local,
                ctype.clone(),
                true,
                false,
                format!("frame->{}", safe_name(local)),
            );
        }

        let saved_in_function = self.in_function;
        let saved_return = self.current_return.clone();
        let saved_depth = self.fn_scope_depth;
        self.in_function = true;
        self.current_return = info.ret.clone();
        self.fn_scope_depth = self.scopes.depth();
        self.current_async = Some(name.clone());
        self.state_counter = 0;

        for stmt in &decl.body.statements {
            self.lower_statement(stmt, out);
        }

        self.current_async = None;
        self.in_function = saved_in_function;
        self.current_return = saved_return;
        self.fn_scope_depth = saved_depth;
        self.scopes.pop();

        self.line(out, "}");
        self.line(out, "return true;");
        self.indent -= 1;
        self.line(out, "}");
        out.push('\n');

        // ---- constructor ----
        self.line(
            out,
            &format!("{base}_frame* {base}({}) {{", render_params(&info.params)),
        );
        self.indent += 1;
        self.line(
            out,
            &format!("{base}_frame* frame = ({base}_frame*)carv_arena_alloc(sizeof({base}_frame));"),
        );
        self.line(out, "frame->state = 0;");
        self.line(out, "frame->sub_future = NULL;");
        for (param, _) in &info.params {
            let safe = safe_name(param);
            self.line(out, &format!("frame->{safe} = {safe};"));
        }
        self.line(out, "return frame;");
        self.indent -= 1;
        self.line(out, "}");
        out.push('\n');
    }
}
