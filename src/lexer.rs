//! Byte-stream lexer for penguin source.
//!
//! Scans a UTF-8 source buffer into a flat, restartable-by-index token
//! sequence. `//`-to-EOL comments and ASCII whitespace are skipped.
//! Unrecognized bytes produce a `lex-error` diagnostic and the lexer
//! resynchronizes by consuming exactly one byte, so a single bad byte
//! never blocks the rest of the file from lexing.

use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // literals
    Decimal,
    Hex,
    Binary,
    String,
    Identifier,

    // keywords
    If,
    Else,
    Loop,
    Procedure,
    Return,
    List,
    Not,
    And,
    Or,
    Xor,
    Int,
    Sprite,
    Tileset,
    Tilemap,

    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Dot,
    Assign,

    // operators
    Plus,
    Minus,
    Star,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    Ne,
    Amp,
    Caret,
    Pipe,
    Tilde,

    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

fn keyword(ident: &str) -> Option<TokenKind> {
    Some(match ident {
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "loop" => TokenKind::Loop,
        "procedure" => TokenKind::Procedure,
        "return" => TokenKind::Return,
        "list" => TokenKind::List,
        "not" => TokenKind::Not,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "xor" => TokenKind::Xor,
        "int" => TokenKind::Int,
        "sprite" => TokenKind::Sprite,
        "tileset" => TokenKind::Tileset,
        "tilemap" => TokenKind::Tilemap,
        _ => return None,
    })
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer { src: src.as_bytes(), pos: 0, line: 1, column: 1 }
    }

    /// Lex the entire buffer into a token sequence, always ending in a
    /// single `Eof` token. Malformed input never prevents this from
    /// returning; failures are recorded in `sink`.
    pub fn tokenize(mut self, sink: &mut DiagnosticSink) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let start_line = self.line;
            let start_col = self.column;
            let start = self.pos as u32;
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    lexeme: String::new(),
                    span: Span::point(start, start_line, start_col),
                });
                break;
            };

            let token = if c.is_ascii_alphabetic() || c == b'_' {
                self.lex_identifier(start, start_line, start_col)
            } else if c.is_ascii_digit() {
                self.lex_number(start, start_line, start_col, sink)
            } else if c == b'"' {
                self.lex_string(start, start_line, start_col, sink)
            } else {
                self.lex_punct(start, start_line, start_col, sink)
            };

            if let Some(token) = token {
                tokens.push(token);
            }
        }
        tokens
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c == b' ' || c == b'\t' || c == b'\r' || c == b'\n' => {
                    self.bump();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while self.peek().is_some() && self.peek() != Some(b'\n') {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_identifier(&mut self, start: u32, line: u32, column: u32) -> Option<Token> {
        let begin = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.bump();
            } else {
                break;
            }
        }
        let lexeme = String::from_utf8_lossy(&self.src[begin..self.pos]).into_owned();
        let kind = keyword(&lexeme).unwrap_or(TokenKind::Identifier);
        Some(Token { kind, lexeme, span: Span::new(start, self.pos as u32, line, column) })
    }

    fn lex_number(&mut self, start: u32, line: u32, column: u32, sink: &mut DiagnosticSink) -> Option<Token> {
        let begin = self.pos;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.bump();
            self.bump();
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.bump();
            }
            if self.pos == digits_start {
                let span = Span::new(start, self.pos as u32, line, column);
                sink.push(Diagnostic::error(DiagnosticKind::LexError, span, "hex literal has no digits after `0x`"));
            }
            let lexeme = String::from_utf8_lossy(&self.src[begin..self.pos]).into_owned();
            return Some(Token { kind: TokenKind::Hex, lexeme, span: Span::new(start, self.pos as u32, line, column) });
        }
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'b') | Some(b'B')) {
            self.bump();
            self.bump();
            let digits_start = self.pos;
            while matches!(self.peek(), Some(b'0') | Some(b'1')) {
                self.bump();
            }
            if self.pos == digits_start {
                let span = Span::new(start, self.pos as u32, line, column);
                sink.push(Diagnostic::error(DiagnosticKind::LexError, span, "binary literal has no digits after `0b`"));
            }
            let lexeme = String::from_utf8_lossy(&self.src[begin..self.pos]).into_owned();
            return Some(Token { kind: TokenKind::Binary, lexeme, span: Span::new(start, self.pos as u32, line, column) });
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        let lexeme = String::from_utf8_lossy(&self.src[begin..self.pos]).into_owned();
        Some(Token { kind: TokenKind::Decimal, lexeme, span: Span::new(start, self.pos as u32, line, column) })
    }

    fn lex_string(&mut self, start: u32, line: u32, column: u32, sink: &mut DiagnosticSink) -> Option<Token> {
        self.bump(); // opening quote
        let begin = self.pos;
        loop {
            match self.peek() {
                Some(b'"') => {
                    let lexeme = String::from_utf8_lossy(&self.src[begin..self.pos]).into_owned();
                    self.bump(); // closing quote
                    return Some(Token { kind: TokenKind::String, lexeme, span: Span::new(start, self.pos as u32, line, column) });
                }
                Some(b'\n') | None => {
                    let span = Span::new(start, self.pos as u32, line, column);
                    sink.push(Diagnostic::error(DiagnosticKind::LexError, span, "unterminated string literal"));
                    let lexeme = String::from_utf8_lossy(&self.src[begin..self.pos]).into_owned();
                    return Some(Token { kind: TokenKind::String, lexeme, span: Span::new(start, self.pos as u32, line, column) });
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn lex_punct(&mut self, start: u32, line: u32, column: u32, sink: &mut DiagnosticSink) -> Option<Token> {
        let c = self.bump().expect("peeked Some above");
        macro_rules! tok {
            ($kind:expr, $lexeme:expr) => {
                Some(Token { kind: $kind, lexeme: $lexeme.to_string(), span: Span::new(start, self.pos as u32, line, column) })
            };
        }
        match c {
            b'(' => tok!(TokenKind::LParen, "("),
            b')' => tok!(TokenKind::RParen, ")"),
            b'{' => tok!(TokenKind::LBrace, "{"),
            b'}' => tok!(TokenKind::RBrace, "}"),
            b'[' => tok!(TokenKind::LBracket, "["),
            b']' => tok!(TokenKind::RBracket, "]"),
            b',' => tok!(TokenKind::Comma, ","),
            b';' => tok!(TokenKind::Semicolon, ";"),
            b'.' => tok!(TokenKind::Dot, "."),
            b'+' => tok!(TokenKind::Plus, "+"),
            b'-' => tok!(TokenKind::Minus, "-"),
            b'*' => tok!(TokenKind::Star, "*"),
            b'~' => tok!(TokenKind::Tilde, "~"),
            b'^' => tok!(TokenKind::Caret, "^"),
            b'&' => tok!(TokenKind::Amp, "&"),
            b'|' => tok!(TokenKind::Pipe, "|"),
            b'<' => {
                if self.peek() == Some(b'<') {
                    self.bump();
                    tok!(TokenKind::Shl, "<<")
                } else if self.peek() == Some(b'=') {
                    self.bump();
                    tok!(TokenKind::Le, "<=")
                } else {
                    tok!(TokenKind::Lt, "<")
                }
            }
            b'>' => {
                if self.peek() == Some(b'>') {
                    self.bump();
                    tok!(TokenKind::Shr, ">>")
                } else if self.peek() == Some(b'=') {
                    self.bump();
                    tok!(TokenKind::Ge, ">=")
                } else {
                    tok!(TokenKind::Gt, ">")
                }
            }
            b'=' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    tok!(TokenKind::EqEq, "==")
                } else {
                    tok!(TokenKind::Assign, "=")
                }
            }
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    tok!(TokenKind::Ne, "!=")
                } else {
                    let span = Span::new(start, self.pos as u32, line, column);
                    sink.push(Diagnostic::error(DiagnosticKind::LexError, span, "unexpected byte `!`"));
                    None
                }
            }
            other => {
                let span = Span::new(start, self.pos as u32, line, column);
                sink.push(Diagnostic::error(
                    DiagnosticKind::LexError,
                    span,
                    format!("unexpected byte {:#04x}", other),
                ));
                None
            }
        }
    }
}

pub fn tokenize(src: &str, sink: &mut DiagnosticSink) -> Vec<Token> {
    Lexer::new(src).tokenize(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut sink = DiagnosticSink::new();
        tokenize(src, &mut sink).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_are_distinguished_from_identifiers() {
        assert_eq!(kinds("if iffy"), vec![TokenKind::If, TokenKind::Identifier, TokenKind::Eof]);
    }

    #[test]
    fn decimal_hex_and_binary_literals() {
        assert_eq!(
            kinds("10 0x1F 0b101"),
            vec![TokenKind::Decimal, TokenKind::Hex, TokenKind::Binary, TokenKind::Eof]
        );
    }

    #[test]
    fn comments_and_whitespace_are_skipped() {
        assert_eq!(kinds("  // a comment\n  42"), vec![TokenKind::Decimal, TokenKind::Eof]);
    }

    #[test]
    fn string_literal_has_no_escapes() {
        let mut sink = DiagnosticSink::new();
        let tokens = tokenize("\"hello world\"", &mut sink);
        assert!(!sink.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].lexeme, "hello world");
    }

    #[test]
    fn unterminated_string_is_a_lex_error() {
        let mut sink = DiagnosticSink::new();
        tokenize("\"oops", &mut sink);
        assert!(sink.has_errors());
    }

    #[test]
    fn unrecognized_byte_resynchronizes_by_one_byte() {
        let mut sink = DiagnosticSink::new();
        let tokens = tokenize("1 @ 2", &mut sink);
        assert!(sink.has_errors());
        assert_eq!(sink.len(), 1);
        let decimal_count = tokens.iter().filter(|t| t.kind == TokenKind::Decimal).count();
        assert_eq!(decimal_count, 2);
    }

    #[test]
    fn two_char_operators_are_not_split() {
        assert_eq!(kinds("<= >= == != << >>"), vec![
            TokenKind::Le, TokenKind::Ge, TokenKind::EqEq, TokenKind::Ne, TokenKind::Shl, TokenKind::Shr, TokenKind::Eof
        ]);
    }
}
