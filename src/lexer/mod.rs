//! Source text to tokens.
//!
//! Two pieces of context leak into the lexer: whether a `/` starts a regex
//! (it does unless the previous token ends an operand) and whether a name is
//! directly followed by `(`, which makes it a function name.

mod tokens;

pub use tokens::{Token, TokenKind};

use crate::error::{Error, Result, SourceLocation};
use crate::value::numeric_prefix_len;

pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    /// Previous token ended an operand, so `/` means division
    after_operand: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            column: 1,
            after_operand: false,
        }
    }

    /// All tokens up to and including [`TokenKind::Eof`]. Newlines after
    /// `{ && || , ; do else` or another newline are dropped here so the
    /// parser only sees meaningful ones.
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens: Vec<Token> = Vec::with_capacity((self.source.len() / 4 + 1).min(1024));
        loop {
            let token = self.next_token()?;
            if token.kind == TokenKind::Newline
                && tokens.last().is_some_and(|prev| prev.kind.absorbs_newline())
            {
                continue;
            }
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_blanks_and_comments();
        let location = self.location();

        let Some(ch) = self.peek() else {
            return Ok(Token::new(TokenKind::Eof, location));
        };

        let kind = match ch {
            '\n' => {
                self.bump();
                TokenKind::Newline
            }
            '"' => self.scan_string(location)?,
            '/' if !self.after_operand => self.scan_regex(location)?,
            '/' => {
                self.bump();
                if self.eat('=') {
                    TokenKind::SlashAssign
                } else {
                    TokenKind::Slash
                }
            }
            '0'..='9' => self.scan_number(location)?,
            '.' if self.peek_second().is_some_and(|c| c.is_ascii_digit()) => {
                self.scan_number(location)?
            }
            'a'..='z' | 'A'..='Z' | '_' => self.scan_word(),
            _ => match tokens::operator(self.rest()) {
                Some((len, kind)) => {
                    self.bump_bytes(len);
                    kind
                }
                None if ch == '&' => {
                    return Err(error_at("unexpected '&', did you mean '&&'?", location));
                }
                None => {
                    return Err(error_at(format!("unexpected character '{}'", ch), location));
                }
            },
        };

        self.after_operand = kind.ends_operand();
        Ok(Token::new(kind, location))
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    /// Skip `len` bytes of ASCII that contain no newline
    fn bump_bytes(&mut self, len: usize) {
        self.pos += len;
        self.column += len;
    }

    fn eat(&mut self, expected: char) -> bool {
        let matched = self.peek() == Some(expected);
        if matched {
            self.bump();
        }
        matched
    }

    /// Blanks, `#` comments and backslash-newline continuations
    fn skip_blanks_and_comments(&mut self) {
        loop {
            let rest = self.rest();
            if rest.starts_with([' ', '\t', '\r']) {
                self.bump();
            } else if rest.starts_with("\\\n") || rest.starts_with("\\\r\n") {
                while self.bump() != Some('\n') {}
            } else if rest.starts_with('#') {
                let len = rest.find('\n').unwrap_or(rest.len());
                self.pos += len;
            } else {
                return;
            }
        }
    }

    fn scan_string(&mut self, start: SourceLocation) -> Result<TokenKind> {
        self.bump();
        let mut raw = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(TokenKind::String(unescape(&raw))),
                Some('\\') => {
                    let Some(escaped) = self.bump() else { break };
                    raw.push('\\');
                    raw.push(escaped);
                }
                Some('\n') => {
                    return Err(error_at("unterminated string (newline in string)", start));
                }
                Some(ch) => raw.push(ch),
                None => break,
            }
        }
        Err(error_at("unterminated string", start))
    }

    /// `/.../` with `\/` unescaped; a `/` inside a bracket expression does not
    /// end the regex
    fn scan_regex(&mut self, start: SourceLocation) -> Result<TokenKind> {
        self.bump();
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            let Some(ch) = self.bump() else { break };
            match ch {
                '/' if !in_class => return Ok(TokenKind::Regex(pattern)),
                '\\' => match self.bump() {
                    Some('/') => pattern.push('/'),
                    Some(escaped) => {
                        pattern.push('\\');
                        pattern.push(escaped);
                    }
                    None => break,
                },
                '[' if !in_class => {
                    in_class = true;
                    pattern.push('[');
                    if self.eat('^') {
                        pattern.push('^');
                    }
                    // a leading ']' is a member of the class
                    if self.eat(']') {
                        pattern.push(']');
                    }
                }
                ']' if in_class => {
                    in_class = false;
                    pattern.push(']');
                }
                '\n' => return Err(error_at("unterminated regex (newline in regex)", start)),
                _ => pattern.push(ch),
            }
        }
        Err(error_at("unterminated regex", start))
    }

    /// Decimal literal; an exponent only counts when digits follow, so `1e`
    /// lexes as `1` then `e`
    fn scan_number(&mut self, start: SourceLocation) -> Result<TokenKind> {
        let rest = self.rest();
        let text = &rest[..numeric_prefix_len(rest)];
        self.bump_bytes(text.len());
        text.parse()
            .map(TokenKind::Number)
            .map_err(|_| error_at(format!("invalid number '{}'", text), start))
    }

    fn scan_word(&mut self) -> TokenKind {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let word = &rest[..len];
        self.bump_bytes(len);

        match tokens::keyword(word) {
            Some(kind) => kind,
            None if self.peek() == Some('(') => TokenKind::FuncName(word.to_string()),
            None => TokenKind::Identifier(word.to_string()),
        }
    }
}

fn error_at(message: impl Into<String>, location: SourceLocation) -> Error {
    Error::syntax(message, location.line, location.column)
}

fn escape_char(c: char) -> Option<char> {
    Some(match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        'b' => '\x08',
        'f' => '\x0C',
        'a' => '\x07',
        'v' => '\x0B',
        '\\' => '\\',
        '"' => '"',
        '/' => '/',
        _ => return None,
    })
}

/// Decode escape sequences as in a string literal: the usual single-letter
/// escapes, up to three octal digits, and backslash-newline as nothing.
/// Unknown escapes keep their backslash so that `"\."` still reaches the
/// regex engine as an escaped dot. Also applied to `-v` and `-F` values.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\n') => {}
            Some(e) if escape_char(e).is_some() => out.extend(escape_char(e)),
            Some(d @ '0'..='7') => {
                let mut code = d.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    let Some(digit) = chars.peek().and_then(|c| c.to_digit(8)) else {
                        break;
                    };
                    code = code * 8 + digit;
                    chars.next();
                }
                out.extend(char::from_u32(code));
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
