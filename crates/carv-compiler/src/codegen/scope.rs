//! Scope, ownership, and name-safety bookkeeping.
//!
//! Each lexical scope maps source identifiers to their C type, mutability,
//! ownership flag, and spelled C name. Lookup walks parent links. Scope
//! drops are emitted from here so that every owned value is released on
//! every exit path.

use super::ctype::CType;
use once_cell::sync::Lazy;
use rustc_hash::{FxHashMap, FxHashSet};

/// C99 reserved words. Source identifiers colliding with these (or with
/// `main`) are renamed with the `carv_` prefix in the emitted unit.
static C_KEYWORDS: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
    [
        "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
        "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
        "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
        "union", "unsigned", "void", "volatile", "while", "_Bool", "_Complex", "_Imaginary",
    ]
    .into_iter()
    .collect()
});

/// Spell a source identifier safely for C.
pub fn safe_name(name: &str) -> String {
    if name == "main" || C_KEYWORDS.contains(name) {
        format!("carv_{name}")
    } else {
        name.to_string()
    }
}

/// What a scope knows about one binding.
#[derive(Debug, Clone)]
pub struct VarInfo {
    pub ctype: CType,
    pub mutable: bool,
    /// Owned values are dropped when their scope exits.
    pub owned: bool,
    /// The name the binding has in the emitted C (safe-renamed, or a
    /// generated temporary for closure values).
    pub c_name: String,
}

/// One lexical scope. Declaration order is kept so drops are deterministic.
#[derive(Debug, Default)]
struct Scope {
    vars: FxHashMap<String, VarInfo>,
    order: Vec<String>,
}

/// The scope chain. The bottom scope holds top-level bindings.
#[derive(Debug)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Current nesting depth (1 = top level).
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Declare a binding in the innermost scope with the safe C spelling.
    pub fn declare(&mut self, name: &str, ctype: CType, mutable: bool, owned: bool) {
        let c_name = safe_name(name);
        self.declare_as(name, ctype, mutable, owned, c_name);
    }

    /// Declare a binding with an explicit C name (closure values bind their
    /// source name directly to the `__cl_<n>` temporary).
    pub fn declare_as(
        &mut self,
        name: &str,
        ctype: CType,
        mutable: bool,
        owned: bool,
        c_name: String,
    ) {
        let scope = self.scopes.last_mut().expect("scope stack never empty");
        if !scope.vars.contains_key(name) {
            scope.order.push(name.to_string());
        }
        scope.vars.insert(
            name.to_string(),
            VarInfo {
                ctype,
                mutable,
                owned,
                c_name,
            },
        );
    }

    /// Look a name up through the scope chain, innermost first.
    pub fn lookup(&self, name: &str) -> Option<&VarInfo> {
        self.scopes.iter().rev().find_map(|s| s.vars.get(name))
    }

    /// Mark a binding as moved so it is skipped at drop time.
    pub fn mark_moved(&mut self, name: &str) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(info) = scope.vars.get_mut(name) {
                info.owned = false;
                return;
            }
        }
    }

    /// The drop calls for the innermost scope, in declaration order.
    pub fn drops_for_innermost(&self) -> Vec<String> {
        let scope = self.scopes.last().expect("scope stack never empty");
        Self::drops_of(scope)
    }

    /// The drop calls for every scope deeper than `depth`, innermost first.
    /// Used for early exits (`return`, `break`, `continue`) that leave
    /// several scopes at once.
    pub fn drops_down_to(&self, depth: usize) -> Vec<String> {
        let mut out = Vec::new();
        for scope in self.scopes.iter().skip(depth).rev() {
            out.extend(Self::drops_of(scope));
        }
        out
    }

    fn drops_of(scope: &Scope) -> Vec<String> {
        let mut out = Vec::new();
        for name in &scope.order {
            let info = &scope.vars[name];
            if !info.owned {
                continue;
            }
            // Arrays and class instances are arena-backed: no per-value
            // drop yet. The hook stays so eager drops can be added per type.
            if info.ctype == CType::Str {
                out.push(format!("carv_string_drop(&{});", info.c_name));
            }
        }
        out
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_name_keywords() {
        assert_eq!(safe_name("switch"), "carv_switch");
        assert_eq!(safe_name("main"), "carv_main");
        assert_eq!(safe_name("counter"), "counter");
    }

    #[test]
    fn test_lookup_walks_parents() {
        let mut scopes = ScopeStack::new();
        scopes.declare("x", CType::Int, false, false);
        scopes.push();
        scopes.declare("y", CType::Str, false, true);
        assert!(scopes.lookup("x").is_some());
        assert!(scopes.lookup("y").is_some());
        scopes.pop();
        assert!(scopes.lookup("y").is_none());
    }

    #[test]
    fn test_shadowing_prefers_innermost() {
        let mut scopes = ScopeStack::new();
        scopes.declare("x", CType::Int, false, false);
        scopes.push();
        scopes.declare("x", CType::Str, false, true);
        assert_eq!(scopes.lookup("x").unwrap().ctype, CType::Str);
    }

    #[test]
    fn test_drops_only_owned_strings() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.declare("s", CType::Str, false, true);
        scopes.declare("n", CType::Int, false, false);
        scopes.declare("p", CType::ClassPtr("P".into()), false, true);
        let drops = scopes.drops_for_innermost();
        assert_eq!(drops, vec!["carv_string_drop(&s);".to_string()]);
    }

    #[test]
    fn test_moved_binding_not_dropped() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.declare("s", CType::Str, false, true);
        scopes.mark_moved("s");
        assert!(scopes.drops_for_innermost().is_empty());
    }

    #[test]
    fn test_drops_down_to_collects_outer_scopes() {
        let mut scopes = ScopeStack::new();
        scopes.push(); // function scope, depth 2
        scopes.declare("a", CType::Str, false, true);
        scopes.push(); // block scope, depth 3
        scopes.declare("b", CType::Str, false, true);
        let drops = scopes.drops_down_to(2);
        assert_eq!(drops, vec!["carv_string_drop(&b);".to_string()]);
        let drops = scopes.drops_down_to(1);
        assert_eq!(
            drops,
            vec![
                "carv_string_drop(&b);".to_string(),
                "carv_string_drop(&a);".to_string()
            ]
        );
    }
}
