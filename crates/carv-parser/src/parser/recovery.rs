//! Error recovery: statement-boundary resynchronization.

use super::Parser;
use crate::token::Token;

/// Skip tokens until the next plausible statement start.
///
/// Consumes up to and including the next semicolon, or stops just before a
/// token that opens a statement, so one syntax error does not cascade into
/// spurious diagnostics for the rest of the file.
pub fn sync_to_statement_boundary(parser: &mut Parser) {
    while !parser.at_eof() {
        if matches!(parser.current(), Token::Semicolon) {
            parser.advance();
            return;
        }

        if starts_statement(parser.current()) {
            return;
        }

        parser.advance();
    }
}

fn starts_statement(token: &Token) -> bool {
    matches!(
        token,
        Token::Let
            | Token::Const
            | Token::Fn
            | Token::Pub
            | Token::Async
            | Token::Class
            | Token::Interface
            | Token::Impl
            | Token::Require
            | Token::Return
            | Token::For
            | Token::While
            | Token::Loop
            | Token::Break
            | Token::Continue
            | Token::If
            | Token::RightBrace
    )
}
