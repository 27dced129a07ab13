//! Lexer producing a full token stream, comments included
//!
//! Comment and long-string tokens keep their exact line spans; the static
//! analyzer relies on them instead of re-scanning the raw text.

use super::token::{Span, Token, TokenKind};
use crate::result::{CovError, CovResult};

/// Tokenize `source`, keeping comment tokens. The stream always ends with `Eof`.
pub fn tokenize(source: &str) -> CovResult<Vec<Token>> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

/// Byte-level scanner tracking the current line
pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    /// Scanner at the start of `input`
    pub fn new(input: &'a str) -> Self {
        Self {
            src: input.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Next token, trivia included; `Eof` once input is exhausted
    pub fn next_token(&mut self) -> CovResult<Token> {
        self.skip_whitespace();

        let start = self.pos;
        let start_line = self.line;

        let Some(c) = self.peek() else {
            return Ok(self.finish(TokenKind::Eof, start, start_line));
        };

        let kind = match c {
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                while let Some(nc) = self.peek() {
                    if nc.is_ascii_alphanumeric() || nc == b'_' {
                        self.advance();
                    } else {
                        break;
                    }
                }
                let ident = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
                TokenKind::keyword(&ident).unwrap_or(TokenKind::Name(ident))
            }
            b'0'..=b'9' => self.lex_number(start_line)?,
            b'.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => {
                self.lex_number(start_line)?
            }
            b'"' | b'\'' => {
                self.advance();
                TokenKind::Str(self.lex_quoted(c, start_line)?)
            }
            b'-' if self.peek_at(1) == Some(b'-') => {
                self.advance();
                self.advance();
                if let Some(level) = self.long_bracket_level() {
                    let _ = self.lex_long_bracket(level, start_line, "comment")?;
                    TokenKind::LongComment
                } else {
                    while let Some(nc) = self.peek() {
                        if nc == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                    TokenKind::Comment
                }
            }
            b'[' => {
                if let Some(level) = self.long_bracket_level() {
                    TokenKind::LongStr(self.lex_long_bracket(level, start_line, "string")?)
                } else {
                    self.advance();
                    TokenKind::LBracket
                }
            }
            _ => {
                self.advance();
                match c {
                    b'+' => TokenKind::Plus,
                    b'-' => TokenKind::Minus,
                    b'*' => TokenKind::Star,
                    b'/' => {
                        if self.eat(b'/') {
                            TokenKind::DoubleSlash
                        } else {
                            TokenKind::Slash
                        }
                    }
                    b'%' => TokenKind::Percent,
                    b'^' => TokenKind::Caret,
                    b'#' => TokenKind::Hash,
                    b'=' => {
                        if self.eat(b'=') {
                            TokenKind::EqEq
                        } else {
                            TokenKind::Assign
                        }
                    }
                    b'~' => {
                        if self.eat(b'=') {
                            TokenKind::NotEq
                        } else {
                            return Err(CovError::parse(start_line, "unexpected symbol '~'"));
                        }
                    }
                    b'<' => {
                        if self.eat(b'=') {
                            TokenKind::Le
                        } else {
                            TokenKind::Lt
                        }
                    }
                    b'>' => {
                        if self.eat(b'=') {
                            TokenKind::Ge
                        } else {
                            TokenKind::Gt
                        }
                    }
                    b'(' => TokenKind::LParen,
                    b')' => TokenKind::RParen,
                    b'{' => TokenKind::LBrace,
                    b'}' => TokenKind::RBrace,
                    b']' => TokenKind::RBracket,
                    b';' => TokenKind::Semi,
                    b':' => TokenKind::Colon,
                    b',' => TokenKind::Comma,
                    b'.' => {
                        if self.eat(b'.') {
                            if self.eat(b'.') {
                                TokenKind::Ellipsis
                            } else {
                                TokenKind::Concat
                            }
                        } else {
                            TokenKind::Dot
                        }
                    }
                    other => {
                        return Err(CovError::parse(
                            start_line,
                            format!("unexpected symbol '{}'", char::from(other)),
                        ))
                    }
                }
            }
        };

        Ok(self.finish(kind, start, start_line))
    }

    fn finish(&self, kind: TokenKind, start: usize, start_line: u32) -> Token {
        Token {
            kind,
            span: Span::new(start, self.pos, start_line, self.line),
        }
    }

    fn lex_number(&mut self, line: u32) -> CovResult<TokenKind> {
        let start = self.pos;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.advance();
            self.advance();
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.advance();
            }
            let digits = std::str::from_utf8(&self.src[digits_start..self.pos]).unwrap_or("");
            return i64::from_str_radix(digits, 16)
                .map(|n| TokenKind::Number(n as f64))
                .map_err(|_| CovError::parse(line, "malformed number"));
        }

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some(b'.') && self.peek_at(1) != Some(b'.') {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.advance();
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.advance();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if self
            .peek()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == b'_')
        {
            return Err(CovError::parse(line, "malformed number"));
        }

        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| CovError::parse(line, format!("malformed number near '{text}'")))
    }

    fn lex_quoted(&mut self, quote: u8, line: u32) -> CovResult<String> {
        let mut buf = Vec::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => return Err(CovError::parse(line, "unfinished string")),
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    let escaped = match self.advance() {
                        Some(b'n') => b'\n',
                        Some(b't') => b'\t',
                        Some(b'r') => b'\r',
                        Some(b'0') => 0,
                        Some(b'\\') => b'\\',
                        Some(b'"') => b'"',
                        Some(b'\'') => b'\'',
                        _ => return Err(CovError::parse(line, "invalid escape sequence")),
                    };
                    buf.push(escaped);
                }
                Some(c) => {
                    self.advance();
                    buf.push(c);
                }
            }
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// If a long bracket `[==[` opens here, its level (number of `=`)
    fn long_bracket_level(&self) -> Option<usize> {
        if self.peek() != Some(b'[') {
            return None;
        }
        let mut level = 0;
        while self.peek_at(1 + level) == Some(b'=') {
            level += 1;
        }
        (self.peek_at(1 + level) == Some(b'[')).then_some(level)
    }

    fn lex_long_bracket(&mut self, level: usize, line: u32, what: &str) -> CovResult<String> {
        for _ in 0..level + 2 {
            self.advance();
        }
        // A newline right after the opening bracket is not part of the content
        if self.peek() == Some(b'\r') {
            self.advance();
        }
        if self.peek() == Some(b'\n') {
            self.advance();
        }

        let content_start = self.pos;
        loop {
            match self.peek() {
                None => return Err(CovError::parse(line, format!("unfinished long {what}"))),
                Some(b']') => {
                    let mut eq = 0;
                    while self.peek_at(1 + eq) == Some(b'=') {
                        eq += 1;
                    }
                    if eq == level && self.peek_at(1 + eq) == Some(b']') {
                        let content =
                            String::from_utf8_lossy(&self.src[content_start..self.pos]).into_owned();
                        for _ in 0..level + 2 {
                            self.advance();
                        }
                        return Ok(content);
                    }
                    self.advance();
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }
}
