//! Interface and impl lowering.
//!
//! Interfaces become vtable structs plus shared and mutable fat-pointer
//! typedefs. Each impl contributes concrete method definitions, one
//! wrapper per interface method that recovers the concrete receiver type,
//! and a single const vtable instance referenced by cast sites.

use super::ctype::CType;
use super::stmt::render_params;
use super::CodeGenerator;
use carv_parser::ast::*;

impl<'a> CodeGenerator<'a> {
    /// Vtable struct and fat-pointer typedefs for every interface, in
    /// source order.
    pub(crate) fn emit_interface_typedefs(&mut self, out: &mut String) {
        for name in self.interface_order.clone() {
            let sigs = self.interfaces.get(&name).cloned().unwrap_or_default();

            out.push_str("typedef struct {\n");
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
                    "    {} (*{})({params});\n",
                    sig.ret.c_name(),
                    sig.name
                ));
            }
            out.push_str(&format!("}} {name}_vtable;\n\n"));

            out.push_str(&format!(
                "typedef struct {{ const void* data; const {name}_vtable* vt; }} {name}_ref;\n"
            ));
            out.push_str(&format!(
                "typedef struct {{ void* data; const {name}_vtable* vt; }} {name}_mut_ref;\n\n"
            ));
        }
    }

    /// Concrete methods, wrappers, and the vtable instance for one impl.
    pub(crate) fn emit_impl_defs(&mut self, decl: &ImplDecl, out: &mut String) {
        let interface = decl.interface.name.clone();
        let class = decl.target.name.clone();

        for method in &decl.methods {
            self.emit_method(&class, method, out);
        }

        let sigs = self.interfaces.get(&interface).cloned().unwrap_or_default();
        for sig in &sigs {
            let (self_param, concrete_cast) = if sig.receiver.is_const() {
                ("const void* self", format!("const {class}*"))
            } else {
                ("void* self", format!("{class}*"))
            };
            let mut params = self_param.to_string();
            if !sig.params.is_empty() {
                params.push_str(", ");
                params.push_str(&render_params(&sig.params));
            }

            self.line(
                out,
                &format!(
                    "static {} {interface}__{class}__{}({params}) {{",
                    sig.ret.c_name(),
                    sig.name
                ),
            );
            self.indent += 1;
            self.line(
                out,
                &format!("{concrete_cast} p = ({concrete_cast})self;"),
            );
            let mut forward_args = "p".to_string();
            for (param, _) in &sig.params {
                forward_args.push_str(", ");
                forward_args.push_str(&super::scope::safe_name(param));
            }
            if sig.ret == CType::Void {
                self.line(out, &format!("{class}_{}({forward_args});", sig.name));
            } else {
                self.line(
                    out,
                    &format!("return {class}_{}({forward_args});", sig.name),
                );
            }
            self.indent -= 1;
            self.line(out, "}");
            out.push('\n');
        }

        // One const vtable instance per impl, wrappers in signature order.
        let entries = sigs
            .iter()
            .map(|sig| format!(".{} = {interface}__{class}__{}", sig.name, sig.name))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(
            "static const {interface}_vtable {interface}__{class}__VT = {{ {entries} }};\n\n"
        ));
    }
}
