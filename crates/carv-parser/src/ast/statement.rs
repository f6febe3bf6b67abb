//! Statement AST nodes
//!
//! This module defines all statement types in the Carv language, including:
//! - Bindings (let, let mut, const)
//! - Control flow (for, for-in, while, loop, break, continue, return)
//! - Declarations (fn, class, interface, impl)
//! - Module imports (require)

use super::*;
use crate::token::Span;

/// Top-level or block-level statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// let x = e; / let mut x = e;
    Let(LetStatement),

    /// const x = e;
    Const(ConstStatement),

    /// return; / return e;
    Return(ReturnStatement),

    /// Expression statement (calls, assignments, statement-position if)
    Expression(ExpressionStatement),

    /// for (init; cond; post) { }
    For(ForStatement),

    /// for x in xs { }
    ForIn(ForInStatement),

    /// while cond { }
    While(WhileStatement),

    /// loop { }
    Loop(LoopStatement),

    /// break;
    Break(Span),

    /// continue;
    Continue(Span),

    /// fn name(params) -> T { }
    Function(FunctionDecl),

    /// class Name { fields methods }
    Class(ClassDecl),

    /// interface Name { signatures }
    Interface(InterfaceDecl),

    /// impl Iface for Class { methods }
    Impl(ImplDecl),

    /// require "module"; / require "module" as alias;
    Require(RequireDecl),

    /// A bare block
    Block(BlockStatement),
}

impl Statement {
    /// Get the span of this statement
    pub fn span(&self) -> &Span {
        match self {
            Statement::Let(s) => &s.span,
            Statement::Const(s) => &s.span,
            Statement::Return(s) => &s.span,
            Statement::Expression(s) => &s.span,
            Statement::For(s) => &s.span,
            Statement::ForIn(s) => &s.span,
            Statement::While(s) => &s.span,
            Statement::Loop(s) => &s.span,
            Statement::Break(span) => span,
            Statement::Continue(span) => span,
            Statement::Function(s) => &s.span,
            Statement::Class(s) => &s.span,
            Statement::Interface(s) => &s.span,
            Statement::Impl(s) => &s.span,
            Statement::Require(s) => &s.span,
            Statement::Block(s) => &s.span,
        }
    }

    /// Check if this statement is a top-level declaration
    pub fn is_declaration(&self) -> bool {
        matches!(
            self,
            Statement::Function(_)
                | Statement::Class(_)
                | Statement::Interface(_)
                | Statement::Impl(_)
        )
    }
}

// ============================================================================
// Bindings
// ============================================================================

/// let x = e; or let mut x: T = e;
#[derive(Debug, Clone, PartialEq)]
pub struct LetStatement {
    pub mutable: bool,
    pub name: Identifier,
    pub type_annotation: Option<TypeAnnotation>,
    pub value: Expression,
    pub span: Span,
}

/// const x = e;
#[derive(Debug, Clone, PartialEq)]
pub struct ConstStatement {
    pub name: Identifier,
    pub type_annotation: Option<TypeAnnotation>,
    pub value: Expression,
    pub span: Span,
}

/// return; or return e;
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStatement {
    pub value: Option<Expression>,
    pub span: Span,
}

/// Expression statement
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionStatement {
    pub expression: Expression,
    pub span: Span,
}

// ============================================================================
// Control Flow
// ============================================================================

/// for (init; cond; post) { }
#[derive(Debug, Clone, PartialEq)]
pub struct ForStatement {
    pub init: Option<Box<Statement>>,
    pub condition: Option<Expression>,
    pub post: Option<Expression>,
    pub body: BlockStatement,
    pub span: Span,
}

/// for x in xs { }
#[derive(Debug, Clone, PartialEq)]
pub struct ForInStatement {
    pub binding: Identifier,
    pub iterable: Expression,
    pub body: BlockStatement,
    pub span: Span,
}

/// while cond { }
#[derive(Debug, Clone, PartialEq)]
pub struct WhileStatement {
    pub condition: Expression,
    pub body: BlockStatement,
    pub span: Span,
}

/// loop { }
#[derive(Debug, Clone, PartialEq)]
pub struct LoopStatement {
    pub body: BlockStatement,
    pub span: Span,
}

/// A sequence of statements wrapped in { }. Used for function bodies,
/// control-flow bodies, and bare blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStatement {
    pub statements: Vec<Statement>,
    pub span: Span,
}

// ============================================================================
// Declarations
// ============================================================================

/// Function declaration
///
/// # Example
/// ```text
/// pub async fn fetch(url: string) -> result {
///     ...
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Identifier,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeAnnotation>,
    pub body: BlockStatement,
    pub is_async: bool,
    pub is_public: bool,
    pub span: Span,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: Identifier,
    pub type_annotation: Option<TypeAnnotation>,
    pub span: Span,
}

/// Class declaration
///
/// # Example
/// ```text
/// class Counter {
///     value: int = 0
///
///     fn increment() {
///         self.value = self.value + 1;
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Identifier,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub span: Span,
}

/// Field declaration with optional default
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: Identifier,
    pub type_annotation: TypeAnnotation,
    pub default: Option<Expression>,
    pub span: Span,
}

/// Method declaration (inside class or impl)
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: Identifier,
    pub receiver: ReceiverKind,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeAnnotation>,
    pub body: BlockStatement,
    pub span: Span,
}

/// Interface declaration: method signatures only
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDecl {
    pub name: Identifier,
    pub methods: Vec<MethodSig>,
    pub span: Span,
}

/// One interface method signature
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSig {
    pub name: Identifier,
    pub receiver: ReceiverKind,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeAnnotation>,
    pub span: Span,
}

/// impl Iface for Class { methods }
#[derive(Debug, Clone, PartialEq)]
pub struct ImplDecl {
    pub interface: Identifier,
    pub target: Identifier,
    pub methods: Vec<MethodDecl>,
    pub span: Span,
}

/// require "module"; or require "module" as alias;
#[derive(Debug, Clone, PartialEq)]
pub struct RequireDecl {
    pub module: String,
    pub alias: Option<Identifier>,
    pub span: Span,
}
