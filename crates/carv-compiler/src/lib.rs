//! Carv Compiler - AST to C99 Code Generation
//!
//! This crate lowers a parsed (and optionally type-checked) Carv program
//! into a single portable C99 translation unit that links against the
//! bundled runtime emitted at the top of every unit.

pub mod codegen;
pub mod error;

pub use codegen::{generate, CodeGenerator, RuntimeFlags};
pub use error::{CompileError, CompileResult};

use carv_parser::ast::Program;
use carv_parser::checker::TypeMap;
use carv_parser::Parser;

/// Main compiler entry point.
pub struct Compiler<'a> {
    types: Option<&'a TypeMap>,
    builtin_aliases: Vec<String>,
}

impl<'a> Compiler<'a> {
    pub fn new() -> Self {
        Self {
            types: None,
            builtin_aliases: Vec::new(),
        }
    }

    /// Attach a checker-produced expression type map.
    pub fn with_types(mut self, types: &'a TypeMap) -> Self {
        self.types = Some(types);
        self
    }

    /// Register a built-in module alias reported by the module loader.
    pub fn with_builtin_alias(mut self, alias: &str) -> Self {
        self.builtin_aliases.push(alias.to_string());
        self
    }

    /// Lower a program into a C translation unit.
    pub fn compile(&self, program: &Program) -> CompileResult<String> {
        let mut generator = CodeGenerator::new(self.types);
        for alias in &self.builtin_aliases {
            generator.register_builtin_alias(alias);
        }
        Ok(generator.generate(program))
    }
}

impl<'a> Default for Compiler<'a> {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse, check, and lower source text in one call. The checker's type map
/// tightens lowering; its diagnostics are advisory here.
pub fn compile_source(source: &str) -> CompileResult<String> {
    let parser = Parser::new(source).map_err(|errors| CompileError::Lex {
        message: errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown lex error".to_string()),
    })?;
    let program = parser.parse().map_err(|errors| CompileError::Parse {
        message: errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown parse error".to_string()),
    })?;
    let (types, _diagnostics) = carv_parser::check(&program);
    Compiler::new().with_types(&types).compile(&program)
}
