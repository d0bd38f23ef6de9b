//! Tokenizer for Go source text
//!
//! Produces just enough token structure for declaration extraction:
//! identifiers (keywords included), literals, operators and semicolons.
//! Semicolons are inserted at line ends following the Go rules, so the
//! parser can treat newline-terminated declarations uniformly.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Int,
    Float,
    Imag,
    Char,
    String,
    RawString,
    Op,
    Semi,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
}

impl Token {
    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Op && self.text == op
    }

    pub fn is_ident(&self, ident: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == ident
    }

    pub fn is_keyword(&self) -> bool {
        self.kind == TokenKind::Ident && KEYWORDS.contains(&self.text.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub line: usize,
    pub message: String,
}

pub use gqlforge_core::naming::GO_KEYWORDS as KEYWORDS;

const OPERATORS: &[&str] = &[
    "<<=", ">>=", "&^=", "...", "&&", "||", "<-", "++", "--", "==", "!=", "<=", ">=", ":=",
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<", ">>", "&^", "+", "-", "*", "/", "%",
    "&", "|", "^", "<", ">", "=", "!", "(", ")", "[", "]", "{", "}", ",", ";", ".", ":", "~",
];

pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        while let Some(c) = self.peek() {
            match c {
                '\n' => {
                    self.newline();
                    self.bump(1);
                }
                ' ' | '\t' | '\r' | '\u{feff}' => self.bump(c.len_utf8()),
                '/' if self.rest().starts_with("//") => {
                    let end = self.rest().find('\n').unwrap_or(self.rest().len());
                    self.bump(end);
                }
                '/' if self.rest().starts_with("/*") => self.block_comment()?,
                '"' => self.interpreted_string()?,
                '`' => self.raw_string()?,
                '\'' => self.char_literal()?,
                c if c.is_ascii_digit() => self.number(),
                '.' if self.rest()[1..].starts_with(|c: char| c.is_ascii_digit()) => self.number(),
                c if c.is_alphabetic() || c == '_' => self.ident(),
                _ => self.operator()?,
            }
        }
        self.newline();
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            text: String::new(),
            line: self.line,
        });
        Ok(self.tokens)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self, len: usize) {
        self.pos += len;
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            line: self.line,
            message: message.into(),
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: usize) {
        self.tokens.push(Token {
            kind,
            text: self.src[start..self.pos].to_string(),
            line,
        });
    }

    /// Go automatic semicolon insertion at a line break
    fn newline(&mut self) {
        let insert = match self.tokens.last() {
            Some(tok) => match tok.kind {
                TokenKind::Ident => {
                    !tok.is_keyword()
                        || matches!(tok.text.as_str(), "break" | "continue" | "fallthrough" | "return")
                }
                TokenKind::Int
                | TokenKind::Float
                | TokenKind::Imag
                | TokenKind::Char
                | TokenKind::String
                | TokenKind::RawString => true,
                TokenKind::Op => matches!(tok.text.as_str(), ")" | "]" | "}" | "++" | "--"),
                TokenKind::Semi | TokenKind::Eof => false,
            },
            None => false,
        };
        if insert {
            self.tokens.push(Token {
                kind: TokenKind::Semi,
                text: "\n".to_string(),
                line: self.line,
            });
        }
        self.line += 1;
    }

    fn block_comment(&mut self) -> Result<(), SyntaxError> {
        let body = &self.rest()[2..];
        let end = body.find("*/").ok_or_else(|| self.error("comment not terminated"))?;
        let newlines = body[..end].matches('\n').count();
        self.bump(end + 4);
        // A comment spanning lines acts like a newline
        if newlines > 0 {
            self.newline();
            self.line += newlines - 1;
        }
        Ok(())
    }

    fn interpreted_string(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        let line = self.line;
        self.bump(1);
        loop {
            match self.peek() {
                None | Some('\n') => return Err(self.error("string literal not terminated")),
                Some('\\') => {
                    self.bump(1);
                    match self.peek() {
                        None | Some('\n') => return Err(self.error("string literal not terminated")),
                        Some(c) => self.bump(c.len_utf8()),
                    }
                }
                Some('"') => {
                    self.bump(1);
                    break;
                }
                Some(c) => self.bump(c.len_utf8()),
            }
        }
        self.push(TokenKind::String, start, line);
        Ok(())
    }

    fn raw_string(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        let line = self.line;
        let body = &self.rest()[1..];
        let end = body
            .find('`')
            .ok_or_else(|| self.error("raw string literal not terminated"))?;
        let newlines = body[..end].matches('\n').count();
        self.bump(end + 2);
        self.push(TokenKind::RawString, start, line);
        self.line += newlines;
        Ok(())
    }

    fn char_literal(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        self.bump(1);
        loop {
            match self.peek() {
                None | Some('\n') => return Err(self.error("rune literal not terminated")),
                Some('\\') => {
                    self.bump(1);
                    if let Some(c) = self.peek() {
                        self.bump(c.len_utf8());
                    }
                }
                Some('\'') => {
                    self.bump(1);
                    break;
                }
                Some(c) => self.bump(c.len_utf8()),
            }
        }
        self.push(TokenKind::Char, start, self.line);
        Ok(())
    }

    fn number(&mut self) {
        let start = self.pos;
        let mut kind = TokenKind::Int;
        let hex = self.rest().starts_with("0x") || self.rest().starts_with("0X");
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                let exponent = if hex { matches!(c, 'p' | 'P') } else { matches!(c, 'e' | 'E') };
                self.bump(1);
                if exponent {
                    kind = TokenKind::Float;
                    if matches!(self.peek(), Some('+') | Some('-')) {
                        self.bump(1);
                    }
                }
            } else if c == '.' && !self.rest().starts_with("..") {
                kind = TokenKind::Float;
                self.bump(1);
            } else {
                break;
            }
        }
        if self.src[start..self.pos].ends_with('i') {
            kind = TokenKind::Imag;
        }
        self.push(kind, start, self.line);
    }

    fn ident(&mut self) {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump(c.len_utf8());
            } else {
                break;
            }
        }
        self.push(TokenKind::Ident, start, self.line);
    }

    fn operator(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        let op = OPERATORS
            .iter()
            .find(|op| self.rest().starts_with(**op))
            .ok_or_else(|| {
                let c = self.peek().unwrap_or('\0');
                self.error(format!("invalid character {:?}", c))
            })?;
        self.bump(op.len());
        let kind = if *op == ";" { TokenKind::Semi } else { TokenKind::Op };
        self.push(kind, start, self.line);
        Ok(())
    }
}
