//! Parser for the Carv language
//!
//! This module implements a recursive descent parser that transforms
//! a token stream from the lexer into an Abstract Syntax Tree (AST).
//! Expressions are parsed with a Pratt precedence climber.

pub mod error;
pub mod expr;
pub mod precedence;
pub mod recovery;
pub mod stmt;

use crate::ast::*;
use crate::lexer::Lexer;
use crate::token::{Span, Token};

pub use error::{ParseError, ParseErrorKind};

/// Parser state for the Carv programming language.
///
/// A recursive descent parser with one-token lookahead. Errors accumulate
/// so that a whole file is diagnosed in one pass; recovery resynchronizes
/// at statement boundaries.
pub struct Parser {
    /// Pre-tokenized input
    tokens: Vec<(Token, Span)>,

    /// Current position in token stream
    pos: usize,

    /// Accumulated parse errors (allows continuing after errors)
    errors: Vec<ParseError>,
}

impl Parser {
    /// Create a new parser from source code.
    pub fn new(source: &str) -> Result<Self, Vec<crate::lexer::LexError>> {
        let lexer = Lexer::new(source);
        let tokens = lexer.tokenize()?;

        Ok(Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
        })
    }

    /// Parse the entire source into a [`Program`].
    ///
    /// Returns the Program on success, or all accumulated errors on failure.
    pub fn parse(mut self) -> Result<Program, Vec<ParseError>> {
        let start_span = self.current_span();
        let mut statements = Vec::new();

        while !self.at_eof() {
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.sync_to_statement_boundary();
                }
            }
        }

        let span = if let Some(last) = statements.last() {
            start_span.to(last.span())
        } else {
            start_span
        };

        if !self.errors.is_empty() {
            return Err(self.errors);
        }

        Ok(Program { statements, span })
    }

    /// Parse the source as a single expression (used for interpolated
    /// string segments and the CLI `eval` path).
    pub fn parse_expression_only(mut self) -> Result<Expression, Vec<ParseError>> {
        match expr::parse_expression(&mut self) {
            Ok(e) if self.errors.is_empty() => Ok(e),
            Ok(_) => Err(self.errors),
            Err(err) => {
                self.errors.push(err);
                Err(self.errors)
            }
        }
    }

    // ========================================================================
    // Token Management
    // ========================================================================

    /// Get the current token.
    #[inline(always)]
    pub fn current(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    /// Get the current token's span.
    #[inline(always)]
    pub fn current_span(&self) -> Span {
        self.tokens[self.pos].1
    }

    /// Peek at the next token (lookahead).
    #[inline(always)]
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|(tok, _)| tok)
    }

    /// Span of the most recently consumed token.
    #[inline]
    pub fn prev_span(&self) -> Span {
        let idx = self.pos.saturating_sub(1);
        self.tokens[idx].1
    }

    /// Advance to the next token, returning the current token.
    #[inline]
    pub fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].0.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    /// Check if the current token matches the given kind.
    #[inline(always)]
    pub fn check(&self, expected: &Token) -> bool {
        std::mem::discriminant(self.current()) == std::mem::discriminant(expected)
    }

    /// Consume the current token if it matches, without erroring.
    #[inline]
    pub fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Check if we've reached EOF.
    #[inline(always)]
    pub fn at_eof(&self) -> bool {
        matches!(self.current(), Token::Eof)
    }

    /// Consume the current token if it matches the expected kind.
    ///
    /// Returns Ok(token) on match, or Err(ParseError) on mismatch.
    #[inline]
    pub fn expect(&mut self, expected: Token) -> Result<Token, ParseError> {
        if self.check(&expected) {
            Ok(self.advance())
        } else {
            Err(self.unexpected_token(&[expected]))
        }
    }

    /// Consume an identifier token, returning it as an AST [`Identifier`].
    pub fn expect_identifier(&mut self) -> Result<Identifier, ParseError> {
        let span = self.current_span();
        match self.current().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(Identifier { name, span })
            }
            _ => Err(self.unexpected_token(&[Token::Identifier(String::new())])),
        }
    }

    // ========================================================================
    // Error Handling
    // ========================================================================

    /// Create an "unexpected token" error at the current position.
    pub fn unexpected_token(&self, expected: &[Token]) -> ParseError {
        let span = self.current_span();
        let expected_list = expected
            .iter()
            .map(|t| t.describe())
            .collect::<Vec<_>>()
            .join(", ");
        if self.at_eof() {
            ParseError {
                kind: ParseErrorKind::UnexpectedEof,
                span,
                message: format!("unexpected end of file, expected {expected_list}"),
            }
        } else {
            ParseError {
                kind: ParseErrorKind::UnexpectedToken,
                span,
                message: format!(
                    "unexpected {}, expected {expected_list}",
                    self.current().describe()
                ),
            }
        }
    }

    /// Record a non-fatal error and continue.
    pub fn record_error(&mut self, err: ParseError) {
        self.errors.push(err);
    }

    // ========================================================================
    // Dispatch into submodules
    // ========================================================================

    pub(crate) fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        stmt::parse_statement(self)
    }

    /// Synchronize to the next statement boundary after an error.
    fn sync_to_statement_boundary(&mut self) {
        recovery::sync_to_statement_boundary(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_new() {
        let parser = Parser::new("let x = 42;").unwrap();
        assert!(matches!(parser.current(), Token::Let));
    }

    #[test]
    fn test_parser_advance() {
        let mut parser = Parser::new("let x").unwrap();
        let tok = parser.advance();
        assert!(matches!(tok, Token::Let));
        assert!(matches!(parser.current(), Token::Identifier(_)));
    }

    #[test]
    fn test_parser_at_eof() {
        let parser = Parser::new("").unwrap();
        assert!(parser.at_eof());
    }

    #[test]
    fn test_parse_program() {
        let program = Parser::new("let x = 1; let y = 2;").unwrap().parse().unwrap();
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn test_parse_error_recovery_reports_all() {
        let result = Parser::new("let = 1; let = 2;").unwrap().parse();
        let errors = result.unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
