//! Carv Language Parser
//!
//! Lexer, AST, parser, and type checker for the Carv programming language.
//! The parser produces a [`Program`](ast::Program); the checker optionally
//! annotates it with a [`TypeMap`](checker::TypeMap) consumed by the code
//! generator in `carv-compiler`.

pub mod ast;
pub mod checker;
pub mod lexer;
pub mod parser;
pub mod token;

pub use checker::{check, CheckDiagnostic, Type, TypeMap};
pub use lexer::{LexError, Lexer};
pub use parser::{ParseError, Parser};
pub use token::{Span, Token};
