//! Compilation errors

use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

/// Errors surfaced at the compiler entry points.
///
/// The lowering engine itself is total over well-formed ASTs: unknown
/// constructs degrade to conservative emissions instead of erroring. These
/// variants cover the contract boundary around it.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Lex error: {message}")]
    Lex { message: String },

    #[error("Module not found: {name}")]
    ModuleNotFound { name: String },

    #[error("Cyclic module require: {name}")]
    CyclicRequire { name: String },

    #[error("Internal compiler error: {message}")]
    InternalError { message: String },
}
