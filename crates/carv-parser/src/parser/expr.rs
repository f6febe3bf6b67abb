//! Expression parsing.
//!
//! A Pratt precedence climber over the ladder in
//! [`precedence`](super::precedence). Each prefix form has its own small
//! parser; infix/postfix forms are dispatched from the climb loop.

use super::precedence::{get_precedence, is_right_associative, Precedence};
use super::stmt::{parse_block, parse_params, parse_type_annotation};
use super::{ParseError, Parser};
use crate::ast::*;
use crate::token::{RawSegment, Token};

/// Parse a full expression (lowest precedence).
pub fn parse_expression(parser: &mut Parser) -> Result<Expression, ParseError> {
    parse_precedence(parser, Precedence::Assignment)
}

/// Parse an expression, consuming operators that bind at least as tightly
/// as `min`.
pub fn parse_precedence(parser: &mut Parser, min: Precedence) -> Result<Expression, ParseError> {
    let mut left = parse_prefix(parser)?;

    loop {
        let prec = get_precedence(parser.current());
        if prec == Precedence::None || prec < min {
            break;
        }
        left = parse_infix(parser, left, prec)?;
    }

    Ok(left)
}

/// The next-tighter precedence level, used for left-associative operands.
fn next(prec: Precedence) -> Precedence {
    match prec {
        Precedence::None => Precedence::Assignment,
        Precedence::Assignment => Precedence::Pipe,
        Precedence::Pipe => Precedence::LogicalOr,
        Precedence::LogicalOr => Precedence::LogicalAnd,
        Precedence::LogicalAnd => Precedence::Equality,
        Precedence::Equality => Precedence::Relational,
        Precedence::Relational => Precedence::Additive,
        Precedence::Additive => Precedence::Multiplicative,
        Precedence::Multiplicative => Precedence::Cast,
        Precedence::Cast => Precedence::Unary,
        Precedence::Unary => Precedence::Call,
        Precedence::Call => Precedence::Primary,
        Precedence::Primary => Precedence::Primary,
    }
}

// ============================================================================
// Prefix forms
// ============================================================================

fn parse_prefix(parser: &mut Parser) -> Result<Expression, ParseError> {
    let span = parser.current_span();

    match parser.current().clone() {
        Token::IntLiteral(value) => {
            parser.advance();
            Ok(Expression::IntLiteral(IntLiteral { value, span }))
        }
        Token::FloatLiteral(value) => {
            parser.advance();
            Ok(Expression::FloatLiteral(FloatLiteral { value, span }))
        }
        Token::StringLiteral(value) => {
            parser.advance();
            Ok(Expression::StringLiteral(StringLiteral { value, span }))
        }
        Token::InterpolatedString(segments) => {
            parser.advance();
            let parts = build_string_parts(parser, segments);
            Ok(Expression::InterpolatedString(InterpolatedString {
                parts,
                span,
            }))
        }
        Token::CharLiteral(value) => {
            parser.advance();
            Ok(Expression::CharLiteral(CharLiteral { value, span }))
        }
        Token::True => {
            parser.advance();
            Ok(Expression::BoolLiteral(BoolLiteral { value: true, span }))
        }
        Token::False => {
            parser.advance();
            Ok(Expression::BoolLiteral(BoolLiteral { value: false, span }))
        }
        Token::Nil => {
            parser.advance();
            Ok(Expression::NilLiteral(span))
        }
        Token::Identifier(name) => {
            parser.advance();
            Ok(Expression::Identifier(Identifier { name, span }))
        }
        Token::SelfKw => {
            parser.advance();
            Ok(Expression::Identifier(Identifier {
                name: "self".to_string(),
                span,
            }))
        }
        Token::LeftParen => {
            parser.advance();
            let inner = parse_expression(parser)?;
            parser.expect(Token::RightParen)?;
            Ok(inner)
        }
        Token::LeftBracket => {
            parser.advance();
            let mut elements = Vec::new();
            while !parser.check(&Token::RightBracket) && !parser.at_eof() {
                elements.push(parse_expression(parser)?);
                if !parser.eat(&Token::Comma) {
                    break;
                }
            }
            let end = parser.current_span();
            parser.expect(Token::RightBracket)?;
            Ok(Expression::Array(ArrayLiteral {
                elements,
                span: span.to(&end),
            }))
        }
        Token::Minus => {
            parser.advance();
            let operand = parse_precedence(parser, Precedence::Unary)?;
            let span = span.to(operand.span());
            Ok(Expression::Prefix(PrefixExpression {
                operator: PrefixOperator::Minus,
                operand: Box::new(operand),
                span,
            }))
        }
        Token::Bang => {
            parser.advance();
            let operand = parse_precedence(parser, Precedence::Unary)?;
            let span = span.to(operand.span());
            Ok(Expression::Prefix(PrefixExpression {
                operator: PrefixOperator::Not,
                operand: Box::new(operand),
                span,
            }))
        }
        Token::Amp => {
            parser.advance();
            let mutable = parser.eat(&Token::Mut);
            let operand = parse_precedence(parser, Precedence::Unary)?;
            let span = span.to(operand.span());
            Ok(Expression::Borrow(BorrowExpression {
                mutable,
                operand: Box::new(operand),
                span,
            }))
        }
        Token::Star => {
            parser.advance();
            let operand = parse_precedence(parser, Precedence::Unary)?;
            let span = span.to(operand.span());
            Ok(Expression::Deref(DerefExpression {
                operand: Box::new(operand),
                span,
            }))
        }
        Token::Try => {
            parser.advance();
            let value = parse_precedence(parser, Precedence::Unary)?;
            let span = span.to(value.span());
            Ok(Expression::Try(TryExpression {
                value: Box::new(value),
                span,
            }))
        }
        Token::Await => {
            parser.advance();
            let value = parse_precedence(parser, Precedence::Unary)?;
            let span = span.to(value.span());
            Ok(Expression::Await(AwaitExpression {
                value: Box::new(value),
                span,
            }))
        }
        Token::Spawn => {
            parser.advance();
            let call = parse_precedence(parser, Precedence::Unary)?;
            let span = span.to(call.span());
            Ok(Expression::Spawn(SpawnExpression {
                call: Box::new(call),
                span,
            }))
        }
        Token::Ok_ => {
            parser.advance();
            parser.expect(Token::LeftParen)?;
            let value = parse_expression(parser)?;
            let end = parser.current_span();
            parser.expect(Token::RightParen)?;
            Ok(Expression::Ok_(OkExpression {
                value: Box::new(value),
                span: span.to(&end),
            }))
        }
        Token::Err_ => {
            parser.advance();
            parser.expect(Token::LeftParen)?;
            let value = parse_expression(parser)?;
            let end = parser.current_span();
            parser.expect(Token::RightParen)?;
            Ok(Expression::Err_(ErrExpression {
                value: Box::new(value),
                span: span.to(&end),
            }))
        }
        Token::New => {
            parser.advance();
            let class_name = parser.expect_identifier()?;
            // `new Point()` is accepted as a synonym of `new Point`
            if parser.eat(&Token::LeftParen) {
                parser.expect(Token::RightParen)?;
            }
            let span = span.to(&class_name.span);
            Ok(Expression::New(NewExpression { class_name, span }))
        }
        Token::If => parse_if(parser).map(Expression::If),
        Token::Match => parse_match(parser),
        Token::Fn => parse_function_literal(parser),
        _ => Err(parser.unexpected_token(&[Token::Identifier(String::new())])),
    }
}

/// Resolve lexer segments of an interpolated string into AST parts,
/// re-parsing each expression segment with a nested parser.
fn build_string_parts(parser: &mut Parser, segments: Vec<RawSegment>) -> Vec<StringPart> {
    let span = parser.current_span();
    segments
        .into_iter()
        .map(|segment| match segment {
            RawSegment::Text(text) => StringPart::Literal(text),
            RawSegment::Expr(source) => {
                let parsed = Parser::new(&source)
                    .map_err(|_| ())
                    .and_then(|p| p.parse_expression_only().map_err(|_| ()));
                match parsed {
                    Ok(expression) => StringPart::Expression(Box::new(expression)),
                    Err(()) => {
                        parser.record_error(ParseError::invalid(
                            format!("invalid interpolation expression `{source}`"),
                            span,
                        ));
                        StringPart::Literal(source)
                    }
                }
            }
        })
        .collect()
}

fn parse_if(parser: &mut Parser) -> Result<IfExpression, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::If)?;
    let condition = parse_expression(parser)?;
    let consequence = parse_block(parser)?;

    let alternative = if parser.eat(&Token::Else) {
        if parser.check(&Token::If) {
            Some(ElseBranch::If(Box::new(parse_if(parser)?)))
        } else {
            Some(ElseBranch::Block(parse_block(parser)?))
        }
    } else {
        None
    };

    let end = match &alternative {
        Some(ElseBranch::Block(b)) => b.span,
        Some(ElseBranch::If(i)) => i.span,
        None => consequence.span,
    };

    Ok(IfExpression {
        condition: Box::new(condition),
        consequence,
        alternative,
        span: start.to(&end),
    })
}

fn parse_match(parser: &mut Parser) -> Result<Expression, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Match)?;
    let scrutinee = parse_expression(parser)?;
    parser.expect(Token::LeftBrace)?;

    let mut arms = Vec::new();
    while !parser.check(&Token::RightBrace) && !parser.at_eof() {
        let arm_start = parser.current_span();
        let pattern = parse_match_pattern(parser)?;
        parser.expect(Token::FatArrow)?;
        let body = parse_expression(parser)?;
        let span = arm_start.to(body.span());
        arms.push(MatchArm {
            pattern,
            body,
            span,
        });
        if !parser.eat(&Token::Comma) {
            break;
        }
    }

    let end = parser.current_span();
    parser.expect(Token::RightBrace)?;

    Ok(Expression::Match(MatchExpression {
        scrutinee: Box::new(scrutinee),
        arms,
        span: start.to(&end),
    }))
}

fn parse_match_pattern(parser: &mut Parser) -> Result<MatchPattern, ParseError> {
    match parser.current().clone() {
        Token::Ok_ => {
            parser.advance();
            Ok(MatchPattern::Ok_(parse_pattern_binding(parser)?))
        }
        Token::Err_ => {
            parser.advance();
            Ok(MatchPattern::Err_(parse_pattern_binding(parser)?))
        }
        Token::Identifier(name) if name == "_" => {
            parser.advance();
            Ok(MatchPattern::Wildcard)
        }
        _ => Err(ParseError::invalid(
            format!(
                "expected `ok`, `err`, or `_` in match pattern, found {}",
                parser.current().describe()
            ),
            parser.current_span(),
        )),
    }
}

fn parse_pattern_binding(parser: &mut Parser) -> Result<Option<Identifier>, ParseError> {
    parser.expect(Token::LeftParen)?;
    let binding = match parser.current().clone() {
        Token::Identifier(name) if name == "_" => {
            parser.advance();
            None
        }
        Token::Identifier(_) => Some(parser.expect_identifier()?),
        _ => None,
    };
    parser.expect(Token::RightParen)?;
    Ok(binding)
}

fn parse_function_literal(parser: &mut Parser) -> Result<Expression, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Fn)?;
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

    Ok(Expression::FunctionLiteral(FunctionLiteral {
        params,
        return_type,
        body,
        span,
    }))
}

// ============================================================================
// Infix and postfix forms
// ============================================================================

fn parse_infix(
    parser: &mut Parser,
    left: Expression,
    prec: Precedence,
) -> Result<Expression, ParseError> {
    let token = parser.current().clone();

    match token {
        // Assignment (right-associative, target must be a place)
        Token::Equal
        | Token::PlusEqual
        | Token::MinusEqual
        | Token::StarEqual
        | Token::SlashEqual => {
            check_place(&left)?;
            let operator = match token {
                Token::Equal => AssignOperator::Assign,
                Token::PlusEqual => AssignOperator::AddAssign,
                Token::MinusEqual => AssignOperator::SubAssign,
                Token::StarEqual => AssignOperator::MulAssign,
                Token::SlashEqual => AssignOperator::DivAssign,
                _ => unreachable!(),
            };
            parser.advance();
            let rhs_min = if is_right_associative(&token) {
                prec
            } else {
                next(prec)
            };
            let value = parse_precedence(parser, rhs_min)?;
            let span = left.span().to(value.span());
            Ok(Expression::Assign(AssignExpression {
                operator,
                target: Box::new(left),
                value: Box::new(value),
                span,
            }))
        }

        // Pipe: the target is an identifier or a call
        Token::PipeGreater => {
            parser.advance();
            let target = parse_precedence(parser, Precedence::Unary)?;
            let span = left.span().to(target.span());
            Ok(Expression::Pipe(PipeExpression {
                value: Box::new(left),
                target: Box::new(target),
                span,
            }))
        }

        // Cast
        Token::As => {
            parser.advance();
            let target = parse_type_annotation(parser)?;
            // Extend through the annotation so the cast node's span is
            // distinct from its operand's (the type map keys by span).
            let span = left.span().to(&parser.prev_span());
            Ok(Expression::Cast(CastExpression {
                value: Box::new(left),
                target,
                span,
            }))
        }

        // Call
        Token::LeftParen => {
            parser.advance();
            let mut arguments = Vec::new();
            while !parser.check(&Token::RightParen) && !parser.at_eof() {
                arguments.push(parse_expression(parser)?);
                if !parser.eat(&Token::Comma) {
                    break;
                }
            }
            let end = parser.current_span();
            parser.expect(Token::RightParen)?;
            let span = left.span().to(&end);
            Ok(Expression::Call(CallExpression {
                callee: Box::new(left),
                arguments,
                span,
            }))
        }

        // Index
        Token::LeftBracket => {
            parser.advance();
            let index = parse_expression(parser)?;
            let end = parser.current_span();
            parser.expect(Token::RightBracket)?;
            let span = left.span().to(&end);
            Ok(Expression::Index(IndexExpression {
                object: Box::new(left),
                index: Box::new(index),
                span,
            }))
        }

        // Member access
        Token::Dot => {
            parser.advance();
            let property = parser.expect_identifier()?;
            let span = left.span().to(&property.span);
            Ok(Expression::Member(MemberExpression {
                object: Box::new(left),
                property,
                span,
            }))
        }

        // Binary operators
        _ => {
            let operator = match token {
                Token::Plus => InfixOperator::Add,
                Token::Minus => InfixOperator::Subtract,
                Token::Star => InfixOperator::Multiply,
                Token::Slash => InfixOperator::Divide,
                Token::Percent => InfixOperator::Modulo,
                Token::EqualEqual => InfixOperator::Equal,
                Token::BangEqual => InfixOperator::NotEqual,
                Token::Less => InfixOperator::LessThan,
                Token::LessEqual => InfixOperator::LessEqual,
                Token::Greater => InfixOperator::GreaterThan,
                Token::GreaterEqual => InfixOperator::GreaterEqual,
                Token::AmpAmp => InfixOperator::And,
                Token::PipePipe => InfixOperator::Or,
                _ => return Err(parser.unexpected_token(&[Token::Plus])),
            };
            parser.advance();
            let right = parse_precedence(parser, next(prec))?;
            let span = left.span().to(right.span());
            Ok(Expression::Infix(InfixExpression {
                operator,
                left: Box::new(left),
                right: Box::new(right),
                span,
            }))
        }
    }
}

/// Assignment targets must be places: identifiers, members, indexes, derefs.
fn check_place(expr: &Expression) -> Result<(), ParseError> {
    match expr {
        Expression::Identifier(_)
        | Expression::Member(_)
        | Expression::Index(_)
        | Expression::Deref(_) => Ok(()),
        other => Err(ParseError::invalid(
            "invalid assignment target",
            *other.span(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_expr(source: &str) -> Expression {
        Parser::new(source).unwrap().parse_expression_only().unwrap()
    }

    #[test]
    fn test_precedence_arithmetic() {
        let expr = parse_expr("1 + 2 * 3");
        match expr {
            Expression::Infix(infix) => {
                assert_eq!(infix.operator, InfixOperator::Add);
                assert!(matches!(*infix.right, Expression::Infix(_)));
            }
            other => panic!("expected infix, got {other:?}"),
        }
    }

    #[test]
    fn test_pipe_chain() {
        let expr = parse_expr("x |> f |> g");
        match expr {
            Expression::Pipe(pipe) => {
                assert!(matches!(*pipe.value, Expression::Pipe(_)));
                assert_eq!(pipe.target.as_identifier(), Some("g"));
            }
            other => panic!("expected pipe, got {other:?}"),
        }
    }

    #[test]
    fn test_cast_to_interface_ref() {
        let expr = parse_expr("&p as &Printable");
        match expr {
            Expression::Cast(cast) => {
                assert!(matches!(*cast.value, Expression::Borrow(_)));
                assert_eq!(
                    cast.target,
                    TypeAnnotation::Ref {
                        mutable: false,
                        name: "Printable".to_string()
                    }
                );
            }
            other => panic!("expected cast, got {other:?}"),
        }
    }

    #[test]
    fn test_try_call() {
        let expr = parse_expr("try parse(s)");
        match expr {
            Expression::Try(t) => assert!(matches!(*t.value, Expression::Call(_))),
            other => panic!("expected try, got {other:?}"),
        }
    }

    #[test]
    fn test_match_arms() {
        let expr = parse_expr("match r { ok(v) => v, err(e) => 0 }");
        match expr {
            Expression::Match(m) => {
                assert_eq!(m.arms.len(), 2);
                assert!(matches!(m.arms[0].pattern, MatchPattern::Ok_(Some(_))));
                assert!(matches!(m.arms[1].pattern, MatchPattern::Err_(Some(_))));
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn test_function_literal() {
        let expr = parse_expr("fn(y: int) -> int { return x + y; }");
        match expr {
            Expression::FunctionLiteral(f) => {
                assert_eq!(f.params.len(), 1);
                assert_eq!(f.return_type, Some(TypeAnnotation::Int));
            }
            other => panic!("expected function literal, got {other:?}"),
        }
    }

    #[test]
    fn test_member_call() {
        let expr = parse_expr("obj.method(1, 2)");
        match expr {
            Expression::Call(call) => {
                assert!(matches!(*call.callee, Expression::Member(_)));
                assert_eq!(call.arguments.len(), 2);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_assignment_right_associative() {
        let expr = parse_expr("a = b = 1");
        match expr {
            Expression::Assign(a) => {
                assert!(matches!(*a.value, Expression::Assign(_)));
            }
            other => panic!("expected assign, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_assignment_target() {
        let result = Parser::new("1 = 2").unwrap().parse_expression_only();
        assert!(result.is_err());
    }

    #[test]
    fn test_interpolated_string_parts() {
        let expr = parse_expr(r#""a ${x} b""#);
        match expr {
            Expression::InterpolatedString(s) => {
                assert_eq!(s.parts.len(), 3);
                assert!(matches!(s.parts[1], StringPart::Expression(_)));
            }
            other => panic!("expected interpolated string, got {other:?}"),
        }
    }

    #[test]
    fn test_spawn_and_await() {
        assert!(matches!(parse_expr("spawn worker()"), Expression::Spawn(_)));
        assert!(matches!(parse_expr("await fetch()"), Expression::Await(_)));
    }
}
