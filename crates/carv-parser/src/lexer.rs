//! Lexer for the Carv programming language.
//!
//! Tokenization is driven by a logos-derived enum which is converted into
//! the public [`Token`] stream with span information. Interpolated strings
//! (`"a ${x} b"`) are split into raw segments here; the parser re-parses the
//! expression segments.

use crate::token::{RawSegment, Span, Token};
use logos::Logos;

/// Logos-based token enum for lexing.
///
/// Used internally for tokenization and converted to the public Token enum
/// after lexing.
#[derive(Logos, Debug, Clone, PartialEq)]
enum LogosToken {
    // Whitespace (skip)
    #[regex(r"[ \t\r\n]+", logos::skip)]
    Whitespace,

    // Comments (skip)
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    #[regex(r"/\*", lex_block_comment)]
    BlockComment,

    // Keywords (must come before identifiers)
    #[token("let")]
    Let,

    #[token("mut")]
    Mut,

    #[token("const")]
    Const,

    #[token("fn")]
    Fn,

    #[token("pub")]
    Pub,

    #[token("async")]
    Async,

    #[token("class")]
    Class,

    #[token("interface")]
    Interface,

    #[token("impl")]
    Impl,

    #[token("require")]
    Require,

    #[token("as")]
    As,

    #[token("return")]
    Return,

    #[token("for")]
    For,

    #[token("in")]
    In,

    #[token("while")]
    While,

    #[token("loop")]
    Loop,

    #[token("break")]
    Break,

    #[token("continue")]
    Continue,

    #[token("if")]
    If,

    #[token("else")]
    Else,

    #[token("match")]
    Match,

    #[token("new")]
    New,

    #[token("ok")]
    Ok_,

    #[token("err")]
    Err_,

    #[token("try")]
    Try,

    #[token("spawn")]
    Spawn,

    #[token("await")]
    Await,

    #[token("true")]
    True,

    #[token("false")]
    False,

    #[token("nil")]
    Nil,

    #[token("self")]
    SelfKw,

    // Literals
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[regex(r"0x[0-9a-fA-F][0-9a-fA-F_]*", parse_hex)]
    #[regex(r"[0-9][0-9_]*", parse_int)]
    IntLiteral(i64),

    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*([eE][+-]?[0-9]+)?", parse_float)]
    FloatLiteral(f64),

    #[regex(r#""([^"\\]|\\.)*""#, parse_string_body)]
    StringLiteral(String),

    #[regex(r"'([^'\\]|\\.)'", parse_char)]
    CharLiteral(char),

    // Multi-character operators
    #[token("==")]
    EqualEqual,

    #[token("!=")]
    BangEqual,

    #[token("<=")]
    LessEqual,

    #[token(">=")]
    GreaterEqual,

    #[token("&&")]
    AmpAmp,

    #[token("||")]
    PipePipe,

    #[token("+=")]
    PlusEqual,

    #[token("-=")]
    MinusEqual,

    #[token("*=")]
    StarEqual,

    #[token("/=")]
    SlashEqual,

    #[token("|>")]
    PipeGreater,

    #[token("->")]
    Arrow,

    #[token("=>")]
    FatArrow,

    // Single-character operators
    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("%")]
    Percent,

    #[token("<")]
    Less,

    #[token(">")]
    Greater,

    #[token("!")]
    Bang,

    #[token("=")]
    Equal,

    #[token("&")]
    Amp,

    // Punctuation
    #[token(".")]
    Dot,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,

    #[token(":")]
    Colon,

    #[token("(")]
    LeftParen,

    #[token(")")]
    RightParen,

    #[token("{")]
    LeftBrace,

    #[token("}")]
    RightBrace,

    #[token("[")]
    LeftBracket,

    #[token("]")]
    RightBracket,
}

// Helper parsing functions
fn lex_block_comment(lex: &mut logos::Lexer<LogosToken>) -> logos::Skip {
    // We've already consumed "/*", now find "*/"
    let remainder = lex.remainder();

    if let Some(end) = remainder.find("*/") {
        lex.bump(end + 2);
    } else {
        // Unterminated comment - consume to end
        lex.bump(remainder.len());
    }

    logos::Skip
}

fn parse_hex(lex: &mut logos::Lexer<LogosToken>) -> Option<i64> {
    let s = lex.slice()[2..].replace('_', "");
    i64::from_str_radix(&s, 16).ok()
}

fn parse_int(lex: &mut logos::Lexer<LogosToken>) -> Option<i64> {
    lex.slice().replace('_', "").parse().ok()
}

fn parse_float(lex: &mut logos::Lexer<LogosToken>) -> Option<f64> {
    lex.slice().replace('_', "").parse().ok()
}

fn parse_string_body(lex: &mut logos::Lexer<LogosToken>) -> Option<String> {
    let s = lex.slice();
    // Keep the raw body; escapes are resolved after interpolation splitting.
    Some(s[1..s.len() - 1].to_string())
}

fn parse_char(lex: &mut logos::Lexer<LogosToken>) -> Option<char> {
    let s = lex.slice();
    let inner = &s[1..s.len() - 1];
    let mut chars = inner.chars();
    match chars.next()? {
        '\\' => Some(match chars.next()? {
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            '0' => '\0',
            c => c,
        }),
        c => Some(c),
    }
}

fn unescape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some('\'') => result.push('\''),
                Some('0') => result.push('\0'),
                Some('$') => result.push('$'),
                Some(c) => result.push(c),
                None => break,
            }
        } else {
            result.push(c);
        }
    }

    result
}

/// Split a raw string body into interpolation segments.
///
/// Returns `None` when the string has no `${…}` parts. Brace nesting inside
/// an expression segment is tracked so `${f({})}` splits correctly.
fn split_interpolation(raw: &str) -> Option<Vec<RawSegment>> {
    if !raw.contains("${") {
        return None;
    }

    let mut segments = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    while i < raw.len() {
        let rest = &raw[i..];
        let c = rest.chars().next().expect("in-bounds char");
        if c == '\\' {
            if let Some(next) = rest.chars().nth(1) {
                text.push(c);
                text.push(next);
                i += c.len_utf8() + next.len_utf8();
                continue;
            }
        }
        if rest.starts_with("${") {
            if !text.is_empty() {
                segments.push(RawSegment::Text(unescape_string(&text)));
                text.clear();
            }
            let mut depth = 1;
            let mut j = i + 2;
            while j < raw.len() && depth > 0 {
                let inner = raw[j..].chars().next().expect("in-bounds char");
                match inner {
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    _ => {}
                }
                j += inner.len_utf8();
            }
            let expr_end = if depth == 0 { j - 1 } else { j };
            segments.push(RawSegment::Expr(raw[i + 2..expr_end].to_string()));
            i = j;
            continue;
        }
        text.push(c);
        i += c.len_utf8();
    }

    if !text.is_empty() {
        segments.push(RawSegment::Text(unescape_string(&text)));
    }

    Some(segments)
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    UnexpectedCharacter { char: char, span: Span },
    UnterminatedString { span: Span },
    InvalidNumber { text: String, span: Span },
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexError::UnexpectedCharacter { char, span } => {
                write!(
                    f,
                    "Unexpected character '{}' at {}:{}",
                    char, span.line, span.column
                )
            }
            LexError::UnterminatedString { span } => {
                write!(f, "Unterminated string at {}:{}", span.line, span.column)
            }
            LexError::InvalidNumber { text, span } => {
                write!(
                    f,
                    "Invalid number '{}' at {}:{}",
                    text, span.line, span.column
                )
            }
        }
    }
}

/// Main lexer structure.
pub struct Lexer<'a> {
    source: &'a str,
    tokens: Vec<(Token, Span)>,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Tokenize the whole input, ending with an [`Token::Eof`] sentinel.
    pub fn tokenize(mut self) -> Result<Vec<(Token, Span)>, Vec<LexError>> {
        let mut logos_lexer = LogosToken::lexer(self.source);
        let mut line = 1u32;
        let mut column = 1u32;
        let mut last_end = 0;

        while let Some(token_result) = logos_lexer.next() {
            let range = logos_lexer.span();

            // Advance line/column over skipped text
            for c in self.source[last_end..range.start].chars() {
                if c == '\n' {
                    line += 1;
                    column = 1;
                } else {
                    column += 1;
                }
            }

            let span = Span::new(range.start, range.end, line, column);

            match token_result {
                Ok(logos_token) => {
                    let token = convert_token(logos_token);
                    self.tokens.push((token, span));
                }
                Err(_) => {
                    let char = self.source[range.start..].chars().next().unwrap_or('\0');
                    self.errors.push(LexError::UnexpectedCharacter { char, span });
                }
            }

            // Advance line/column over the token itself
            for c in self.source[range.start..range.end].chars() {
                if c == '\n' {
                    line += 1;
                    column = 1;
                } else {
                    column += 1;
                }
            }

            last_end = range.end;
        }

        let eof_span = Span::new(self.source.len(), self.source.len(), line, column);
        self.tokens.push((Token::Eof, eof_span));

        if self.errors.is_empty() {
            Ok(self.tokens)
        } else {
            Err(self.errors)
        }
    }
}

fn convert_token(logos_token: LogosToken) -> Token {
    match logos_token {
        LogosToken::Let => Token::Let,
        LogosToken::Mut => Token::Mut,
        LogosToken::Const => Token::Const,
        LogosToken::Fn => Token::Fn,
        LogosToken::Pub => Token::Pub,
        LogosToken::Async => Token::Async,
        LogosToken::Class => Token::Class,
        LogosToken::Interface => Token::Interface,
        LogosToken::Impl => Token::Impl,
        LogosToken::Require => Token::Require,
        LogosToken::As => Token::As,
        LogosToken::Return => Token::Return,
        LogosToken::For => Token::For,
        LogosToken::In => Token::In,
        LogosToken::While => Token::While,
        LogosToken::Loop => Token::Loop,
        LogosToken::Break => Token::Break,
        LogosToken::Continue => Token::Continue,
        LogosToken::If => Token::If,
        LogosToken::Else => Token::Else,
        LogosToken::Match => Token::Match,
        LogosToken::New => Token::New,
        LogosToken::Ok_ => Token::Ok_,
        LogosToken::Err_ => Token::Err_,
        LogosToken::Try => Token::Try,
        LogosToken::Spawn => Token::Spawn,
        LogosToken::Await => Token::Await,
        LogosToken::True => Token::True,
        LogosToken::False => Token::False,
        LogosToken::Nil => Token::Nil,
        LogosToken::SelfKw => Token::SelfKw,
        LogosToken::Identifier(s) => Token::Identifier(s),
        LogosToken::IntLiteral(n) => Token::IntLiteral(n),
        LogosToken::FloatLiteral(n) => Token::FloatLiteral(n),
        LogosToken::StringLiteral(raw) => match split_interpolation(&raw) {
            Some(segments) => Token::InterpolatedString(segments),
            None => Token::StringLiteral(unescape_string(&raw)),
        },
        LogosToken::CharLiteral(c) => Token::CharLiteral(c),
        LogosToken::EqualEqual => Token::EqualEqual,
        LogosToken::BangEqual => Token::BangEqual,
        LogosToken::LessEqual => Token::LessEqual,
        LogosToken::GreaterEqual => Token::GreaterEqual,
        LogosToken::AmpAmp => Token::AmpAmp,
        LogosToken::PipePipe => Token::PipePipe,
        LogosToken::PlusEqual => Token::PlusEqual,
        LogosToken::MinusEqual => Token::MinusEqual,
        LogosToken::StarEqual => Token::StarEqual,
        LogosToken::SlashEqual => Token::SlashEqual,
        LogosToken::PipeGreater => Token::PipeGreater,
        LogosToken::Arrow => Token::Arrow,
        LogosToken::FatArrow => Token::FatArrow,
        LogosToken::Plus => Token::Plus,
        LogosToken::Minus => Token::Minus,
        LogosToken::Star => Token::Star,
        LogosToken::Slash => Token::Slash,
        LogosToken::Percent => Token::Percent,
        LogosToken::Less => Token::Less,
        LogosToken::Greater => Token::Greater,
        LogosToken::Bang => Token::Bang,
        LogosToken::Equal => Token::Equal,
        LogosToken::Amp => Token::Amp,
        LogosToken::Dot => Token::Dot,
        LogosToken::Comma => Token::Comma,
        LogosToken::Semicolon => Token::Semicolon,
        LogosToken::Colon => Token::Colon,
        LogosToken::LeftParen => Token::LeftParen,
        LogosToken::RightParen => Token::RightParen,
        LogosToken::LeftBrace => Token::LeftBrace,
        LogosToken::RightBrace => Token::RightBrace,
        LogosToken::LeftBracket => Token::LeftBracket,
        LogosToken::RightBracket => Token::RightBracket,
        LogosToken::Whitespace | LogosToken::LineComment | LogosToken::BlockComment => {
            unreachable!("Whitespace and comments should be skipped")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    #[test]
    fn test_lex_let_statement() {
        let tokens = lex("let x = 42;");
        assert_eq!(
            tokens,
            vec![
                Token::Let,
                Token::Identifier("x".to_string()),
                Token::Equal,
                Token::IntLiteral(42),
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_operators() {
        let tokens = lex("a |> b -> c => d != e");
        assert!(tokens.contains(&Token::PipeGreater));
        assert!(tokens.contains(&Token::Arrow));
        assert!(tokens.contains(&Token::FatArrow));
        assert!(tokens.contains(&Token::BangEqual));
    }

    #[test]
    fn test_lex_comments_skipped() {
        let tokens = lex("let x = 1; // trailing\n/* block */ let y = 2;");
        let lets = tokens.iter().filter(|t| matches!(t, Token::Let)).count();
        assert_eq!(lets, 2);
    }

    #[test]
    fn test_lex_float_and_int() {
        let tokens = lex("3.14 42 0xFF");
        assert_eq!(tokens[0], Token::FloatLiteral(3.14));
        assert_eq!(tokens[1], Token::IntLiteral(42));
        assert_eq!(tokens[2], Token::IntLiteral(255));
    }

    #[test]
    fn test_lex_plain_string() {
        let tokens = lex(r#""hello\nworld""#);
        assert_eq!(tokens[0], Token::StringLiteral("hello\nworld".to_string()));
    }

    #[test]
    fn test_lex_interpolated_string() {
        let tokens = lex(r#""sum: ${a + b}!""#);
        match &tokens[0] {
            Token::InterpolatedString(segments) => {
                assert_eq!(segments.len(), 3);
                assert_eq!(segments[0], RawSegment::Text("sum: ".to_string()));
                assert_eq!(segments[1], RawSegment::Expr("a + b".to_string()));
                assert_eq!(segments[2], RawSegment::Text("!".to_string()));
            }
            other => panic!("expected interpolated string, got {other:?}"),
        }
    }

    #[test]
    fn test_lex_spans_track_lines() {
        let tokens = Lexer::new("let\nx").tokenize().unwrap();
        assert_eq!(tokens[0].1.line, 1);
        assert_eq!(tokens[1].1.line, 2);
        assert_eq!(tokens[1].1.column, 1);
    }

    #[test]
    fn test_lex_keywords() {
        let tokens = lex("async fn spawn await ok err try match impl");
        assert_eq!(
            tokens,
            vec![
                Token::Async,
                Token::Fn,
                Token::Spawn,
                Token::Await,
                Token::Ok_,
                Token::Err_,
                Token::Try,
                Token::Match,
                Token::Impl,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_unexpected_character() {
        let result = Lexer::new("let @ = 1;").tokenize();
        assert!(result.is_err());
    }
}
