//! Statement parsing.
//!
//! Recursive descent over the statement grammar; expressions are delegated
//! to the Pratt climber in [`expr`](super::expr).

use super::expr::parse_expression;
use super::{ParseError, Parser};
use crate::ast::*;
use crate::token::Token;

/// Parse one statement at the current position.
pub fn parse_statement(parser: &mut Parser) -> Result<Statement, ParseError> {
    match parser.current() {
        Token::Let => parse_let(parser),
        Token::Const => parse_const(parser),
        Token::Return => parse_return(parser),
        Token::For => parse_for(parser),
        Token::While => parse_while(parser),
        Token::Loop => parse_loop(parser),
        Token::Break => {
            let span = parser.current_span();
            parser.advance();
            parser.expect(Token::Semicolon)?;
            Ok(Statement::Break(span))
        }
        Token::Continue => {
            let span = parser.current_span();
            parser.advance();
            parser.expect(Token::Semicolon)?;
            Ok(Statement::Continue(span))
        }
        Token::Fn => parse_function(parser, false, false),
        Token::Pub => {
            parser.advance();
            let is_async = parser.eat(&Token::Async);
            parse_function(parser, true, is_async)
        }
        Token::Async => {
            parser.advance();
            parse_function(parser, false, true)
        }
        Token::Class => parse_class(parser),
        Token::Interface => parse_interface(parser),
        Token::Impl => parse_impl(parser),
        Token::Require => parse_require(parser),
        Token::LeftBrace => Ok(Statement::Block(parse_block(parser)?)),
        _ => parse_expression_statement(parser),
    }
}

/// Parse a brace-delimited block.
pub fn parse_block(parser: &mut Parser) -> Result<BlockStatement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::LeftBrace)?;

    let mut statements = Vec::new();
    while !parser.check(&Token::RightBrace) && !parser.at_eof() {
        statements.push(parser.parse_statement()?);
    }

    let end = parser.current_span();
    parser.expect(Token::RightBrace)?;

    Ok(BlockStatement {
        statements,
        span: start.to(&end),
    })
}

// ============================================================================
// Bindings
// ============================================================================

fn parse_let(parser: &mut Parser) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Let)?;
    let mutable = parser.eat(&Token::Mut);
    let name = parser.expect_identifier()?;

    let type_annotation = if parser.eat(&Token::Colon) {
        Some(parse_type_annotation(parser)?)
    } else {
        None
    };

    parser.expect(Token::Equal)?;
    let value = parse_expression(parser)?;
    let end = parser.current_span();
    parser.expect(Token::Semicolon)?;

    Ok(Statement::Let(LetStatement {
        mutable,
        name,
        type_annotation,
        value,
        span: start.to(&end),
    }))
}

fn parse_const(parser: &mut Parser) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Const)?;
    let name = parser.expect_identifier()?;

    let type_annotation = if parser.eat(&Token::Colon) {
        Some(parse_type_annotation(parser)?)
    } else {
        None
    };

    parser.expect(Token::Equal)?;
    let value = parse_expression(parser)?;
    let end = parser.current_span();
    parser.expect(Token::Semicolon)?;

    Ok(Statement::Const(ConstStatement {
        name,
        type_annotation,
        value,
        span: start.to(&end),
    }))
}

fn parse_return(parser: &mut Parser) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Return)?;

    let value = if parser.check(&Token::Semicolon) {
        None
    } else {
        Some(parse_expression(parser)?)
    };

    let end = parser.current_span();
    parser.expect(Token::Semicolon)?;

    Ok(Statement::Return(ReturnStatement {
        value,
        span: start.to(&end),
    }))
}

// ============================================================================
// Control Flow
// ============================================================================

fn parse_for(parser: &mut Parser) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::For)?;

    // for x in xs { }
    if matches!(parser.current(), Token::Identifier(_)) && matches!(parser.peek(), Some(Token::In))
    {
        let binding = parser.expect_identifier()?;
        parser.expect(Token::In)?;
        let iterable = parse_expression(parser)?;
        let body = parse_block(parser)?;
        let span = start.to(&body.span);
        return Ok(Statement::ForIn(ForInStatement {
            binding,
            iterable,
            body,
            span,
        }));
    }

    // for (init; cond; post) { }
    parser.expect(Token::LeftParen)?;

    let init = if parser.eat(&Token::Semicolon) {
        None
    } else if parser.check(&Token::Let) {
        // parse_let consumes the separating semicolon
        Some(Box::new(parse_let(parser)?))
    } else {
        let expression = parse_expression(parser)?;
        let span = *expression.span();
        parser.expect(Token::Semicolon)?;
        Some(Box::new(Statement::Expression(ExpressionStatement {
            expression,
            span,
        })))
    };

    let condition = if parser.check(&Token::Semicolon) {
        None
    } else {
        Some(parse_expression(parser)?)
    };
    parser.expect(Token::Semicolon)?;

    let post = if parser.check(&Token::RightParen) {
        None
    } else {
        Some(parse_expression(parser)?)
    };
    parser.expect(Token::RightParen)?;

    let body = parse_block(parser)?;
    let span = start.to(&body.span);

    Ok(Statement::For(ForStatement {
        init,
        condition,
        post,
        body,
        span,
    }))
}

fn parse_while(parser: &mut Parser) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::While)?;
    let condition = parse_expression(parser)?;
    let body = parse_block(parser)?;
    let span = start.to(&body.span);

    Ok(Statement::While(WhileStatement {
        condition,
        body,
        span,
    }))
}

fn parse_loop(parser: &mut Parser) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Loop)?;
    let body = parse_block(parser)?;
    let span = start.to(&body.span);

    Ok(Statement::Loop(LoopStatement { body, span }))
}

fn parse_expression_statement(parser: &mut Parser) -> Result<Statement, ParseError> {
    let expression = parse_expression(parser)?;
    let span = *expression.span();

    // Statement-position if and match read better without a semicolon,
    // and a block's trailing expression (its value) carries none.
    match &expression {
        Expression::If(_) | Expression::Match(_) => {
            parser.eat(&Token::Semicolon);
        }
        _ if parser.check(&Token::RightBrace) => {}
        _ => {
            parser.expect(Token::Semicolon)?;
        }
    }

    Ok(Statement::Expression(ExpressionStatement {
        expression,
        span,
    }))
}

// ============================================================================
// Declarations
// ============================================================================

fn parse_function(
    parser: &mut Parser,
    is_public: bool,
    is_async: bool,
) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Fn)?;
    let name = parser.expect_identifier()?;

    parser.expect(Token::LeftParen)?;
    let params = parse_params(parser)?;
    parser.expect(Token::RightParen)?;

    let return_type = if parser.eat(&Token::Arrow) {
        Some(parse_type_annotation(parser)?)
    } else {
        None
    };

    let body = parse_block(parser)?;
    let span = start.to(&body.span);

    Ok(Statement::Function(FunctionDecl {
        name,
        params,
        return_type,
        body,
        is_async,
        is_public,
        span,
    }))
}

/// Parse a comma-separated parameter list (no receiver), stopping before `)`.
pub fn parse_params(parser: &mut Parser) -> Result<Vec<Parameter>, ParseError> {
    let mut params = Vec::new();

    while !parser.check(&Token::RightParen) && !parser.at_eof() {
        let name = parser.expect_identifier()?;
        let type_annotation = if parser.eat(&Token::Colon) {
            Some(parse_type_annotation(parser)?)
        } else {
            None
        };
        let span = name.span;
        params.push(Parameter {
            name,
            type_annotation,
            span,
        });

        if !parser.eat(&Token::Comma) {
            break;
        }
    }

    Ok(params)
}

/// Parse an optional receiver at the head of a parameter list.
///
/// Recognizes `self`, `&self`, `&mut self` followed by `,` or `)`.
/// Returns `default` when no receiver is spelled.
fn parse_receiver(parser: &mut Parser, default: ReceiverKind) -> Result<ReceiverKind, ParseError> {
    let receiver = if parser.check(&Token::SelfKw) {
        parser.advance();
        ReceiverKind::Value
    } else if parser.check(&Token::Amp) {
        match parser.peek() {
            Some(Token::SelfKw) => {
                parser.advance();
                parser.advance();
                ReceiverKind::Ref
            }
            Some(Token::Mut) => {
                parser.advance();
                parser.advance();
                parser.expect(Token::SelfKw)?;
                ReceiverKind::MutRef
            }
            _ => return Ok(default),
        }
    } else {
        return Ok(default);
    };

    // Separator before the remaining parameters
    if !parser.check(&Token::RightParen) {
        parser.expect(Token::Comma)?;
    }

    Ok(receiver)
}

fn parse_method(parser: &mut Parser) -> Result<MethodDecl, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Fn)?;
    let name = parser.expect_identifier()?;

    parser.expect(Token::LeftParen)?;
    let receiver = parse_receiver(parser, ReceiverKind::MutRef)?;
    let params = parse_params(parser)?;
    parser.expect(Token::RightParen)?;

    let return_type = if parser.eat(&Token::Arrow) {
        Some(parse_type_annotation(parser)?)
    } else {
        None
    };

    let body = parse_block(parser)?;
    let span = start.to(&body.span);

    Ok(MethodDecl {
        name,
        receiver,
        params,
        return_type,
        body,
        span,
    })
}

fn parse_class(parser: &mut Parser) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Class)?;
    let name = parser.expect_identifier()?;
    parser.expect(Token::LeftBrace)?;

    let mut fields = Vec::new();
    let mut methods = Vec::new();

    while !parser.check(&Token::RightBrace) && !parser.at_eof() {
        if parser.check(&Token::Fn) {
            methods.push(parse_method(parser)?);
        } else {
            let field_name = parser.expect_identifier()?;
            parser.expect(Token::Colon)?;
            let type_annotation = parse_type_annotation(parser)?;
            let default = if parser.eat(&Token::Equal) {
                Some(parse_expression(parser)?)
            } else {
                None
            };
            let span = field_name.span;
            fields.push(FieldDecl {
                name: field_name,
                type_annotation,
                default,
                span,
            });
            // Field separators are optional
            while parser.eat(&Token::Semicolon) || parser.eat(&Token::Comma) {}
        }
    }

    let end = parser.current_span();
    parser.expect(Token::RightBrace)?;

    Ok(Statement::Class(ClassDecl {
        name,
        fields,
        methods,
        span: start.to(&end),
    }))
}

fn parse_interface(parser: &mut Parser) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Interface)?;
    let name = parser.expect_identifier()?;
    parser.expect(Token::LeftBrace)?;

    let mut methods = Vec::new();
    while !parser.check(&Token::RightBrace) && !parser.at_eof() {
        let sig_start = parser.current_span();
        parser.expect(Token::Fn)?;
        let method_name = parser.expect_identifier()?;

        parser.expect(Token::LeftParen)?;
        let receiver = parse_receiver(parser, ReceiverKind::Ref)?;
        let params = parse_params(parser)?;
        parser.expect(Token::RightParen)?;

        let return_type = if parser.eat(&Token::Arrow) {
            Some(parse_type_annotation(parser)?)
        } else {
            None
        };

        let sig_end = parser.current_span();
        parser.expect(Token::Semicolon)?;

        methods.push(MethodSig {
            name: method_name,
            receiver,
            params,
            return_type,
            span: sig_start.to(&sig_end),
        });
    }

    let end = parser.current_span();
    parser.expect(Token::RightBrace)?;

    Ok(Statement::Interface(InterfaceDecl {
        name,
        methods,
        span: start.to(&end),
    }))
}

fn parse_impl(parser: &mut Parser) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Impl)?;
    let interface = parser.expect_identifier()?;
    parser.expect(Token::For)?;
    let target = parser.expect_identifier()?;
    parser.expect(Token::LeftBrace)?;

    let mut methods = Vec::new();
    while !parser.check(&Token::RightBrace) && !parser.at_eof() {
        methods.push(parse_method(parser)?);
    }

    let end = parser.current_span();
    parser.expect(Token::RightBrace)?;

    Ok(Statement::Impl(ImplDecl {
        interface,
        target,
        methods,
        span: start.to(&end),
    }))
}

fn parse_require(parser: &mut Parser) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Require)?;

    let module = match parser.current().clone() {
        Token::StringLiteral(s) => {
            parser.advance();
            s
        }
        _ => return Err(parser.unexpected_token(&[Token::StringLiteral(String::new())])),
    };

    let alias = if parser.eat(&Token::As) {
        Some(parser.expect_identifier()?)
    } else {
        None
    };

    let end = parser.current_span();
    parser.expect(Token::Semicolon)?;

    Ok(Statement::Require(RequireDecl {
        module,
        alias,
        span: start.to(&end),
    }))
}

// ============================================================================
// Types
// ============================================================================

/// Parse a type annotation: primitive name, `[T]`, `&Name`, `&mut Name`,
/// or a bare class name.
pub fn parse_type_annotation(parser: &mut Parser) -> Result<TypeAnnotation, ParseError> {
    match parser.current().clone() {
        Token::LeftBracket => {
            parser.advance();
            let element = parse_type_annotation(parser)?;
            parser.expect(Token::RightBracket)?;
            Ok(TypeAnnotation::Array(Box::new(element)))
        }
        Token::Amp => {
            parser.advance();
            let mutable = parser.eat(&Token::Mut);
            let name = parser.expect_identifier()?;
            Ok(TypeAnnotation::Ref {
                mutable,
                name: name.name,
            })
        }
        Token::Identifier(name) => {
            parser.advance();
            Ok(TypeAnnotation::primitive(&name).unwrap_or(TypeAnnotation::Named(name)))
        }
        _ => Err(ParseError::invalid(
            format!("expected a type, found {}", parser.current().describe()),
            parser.current_span(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        Parser::new(source).unwrap().parse().unwrap()
    }

    #[test]
    fn test_parse_let_mut() {
        let program = parse("let mut x: int = 1;");
        match &program.statements[0] {
            Statement::Let(s) => {
                assert!(s.mutable);
                assert_eq!(s.type_annotation, Some(TypeAnnotation::Int));
            }
            other => panic!("expected let, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_function_decl() {
        let program = parse("fn add(a: int, b: int) -> int { return a + b; }");
        match &program.statements[0] {
            Statement::Function(f) => {
                assert_eq!(f.name.name, "add");
                assert_eq!(f.params.len(), 2);
                assert_eq!(f.return_type, Some(TypeAnnotation::Int));
                assert!(!f.is_async);
            }
            other => panic!("expected fn, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_async_function() {
        let program = parse("async fn main() { }");
        match &program.statements[0] {
            Statement::Function(f) => assert!(f.is_async),
            other => panic!("expected fn, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_class_with_field_and_method() {
        let program = parse("class Counter { value: int = 0  fn increment() { self.value = self.value + 1; } }");
        match &program.statements[0] {
            Statement::Class(c) => {
                assert_eq!(c.name.name, "Counter");
                assert_eq!(c.fields.len(), 1);
                assert_eq!(c.methods.len(), 1);
                assert_eq!(c.methods[0].receiver, ReceiverKind::MutRef);
            }
            other => panic!("expected class, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_interface_and_impl() {
        let program = parse(
            "interface Printable { fn to_string(&self) -> string; }\n\
             impl Printable for Person { fn to_string(&self) -> string { return self.name; } }",
        );
        match &program.statements[0] {
            Statement::Interface(i) => {
                assert_eq!(i.methods.len(), 1);
                assert_eq!(i.methods[0].receiver, ReceiverKind::Ref);
            }
            other => panic!("expected interface, got {other:?}"),
        }
        match &program.statements[1] {
            Statement::Impl(i) => {
                assert_eq!(i.interface.name, "Printable");
                assert_eq!(i.target.name, "Person");
            }
            other => panic!("expected impl, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_for_classic() {
        let program = parse("for (let i = 0; i < 10; i += 1) { }");
        assert!(matches!(&program.statements[0], Statement::For(_)));
    }

    #[test]
    fn test_parse_for_in() {
        let program = parse("for item in items { }");
        match &program.statements[0] {
            Statement::ForIn(f) => assert_eq!(f.binding.name, "item"),
            other => panic!("expected for-in, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_require_with_alias() {
        let program = parse("require \"net\" as net;");
        match &program.statements[0] {
            Statement::Require(r) => {
                assert_eq!(r.module, "net");
                assert_eq!(r.alias.as_ref().unwrap().name, "net");
            }
            other => panic!("expected require, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_array_type_annotation() {
        let program = parse("let xs: [string] = [];");
        match &program.statements[0] {
            Statement::Let(s) => assert_eq!(
                s.type_annotation,
                Some(TypeAnnotation::Array(Box::new(TypeAnnotation::Str)))
            ),
            other => panic!("expected let, got {other:?}"),
        }
    }
}
