use crate::ast::Builtin;
use crate::error::SourceLocation;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    String(String),
    Regex(String),

    Identifier(String),
    /// Identifier immediately followed by `(`: a call or a function definition
    FuncName(String),
    Builtin(Builtin),

    Begin,
    End,
    If,
    Else,
    While,
    For,
    Do,
    Break,
    Continue,
    Function,
    Return,
    Delete,
    Exit,
    Next,
    NextFile,
    Getline,
    Print,
    Printf,
    In,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    And,
    Or,
    Not,
    Match,
    NotMatch,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    CaretAssign,
    Increment,
    Decrement,
    Dollar,
    Question,
    Colon,
    /// `|` and `>>` are only lexed so that output redirection gets a clear
    /// error
    Pipe,
    Append,

    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Semicolon,
    Comma,
    Newline,

    Eof,
}

pub(crate) const KEYWORDS: &[(&str, TokenKind)] = &[
    ("BEGIN", TokenKind::Begin),
    ("END", TokenKind::End),
    ("if", TokenKind::If),
    ("else", TokenKind::Else),
    ("while", TokenKind::While),
    ("for", TokenKind::For),
    ("do", TokenKind::Do),
    ("break", TokenKind::Break),
    ("continue", TokenKind::Continue),
    ("function", TokenKind::Function),
    ("func", TokenKind::Function),
    ("return", TokenKind::Return),
    ("delete", TokenKind::Delete),
    ("exit", TokenKind::Exit),
    ("next", TokenKind::Next),
    ("nextfile", TokenKind::NextFile),
    ("getline", TokenKind::Getline),
    ("print", TokenKind::Print),
    ("printf", TokenKind::Printf),
    ("in", TokenKind::In),
];

/// Punctuation, matched longest first. `/` and `/=` are absent: whether a
/// slash divides or opens a regex depends on the previous token.
pub(crate) const OPERATORS: &[(&str, TokenKind)] = &[
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("%", TokenKind::Percent),
    ("^", TokenKind::Caret),
    ("**", TokenKind::Caret),
    ("<", TokenKind::Less),
    ("<=", TokenKind::LessEqual),
    (">", TokenKind::Greater),
    (">=", TokenKind::GreaterEqual),
    ("==", TokenKind::Equal),
    ("!=", TokenKind::NotEqual),
    ("&&", TokenKind::And),
    ("||", TokenKind::Or),
    ("!", TokenKind::Not),
    ("~", TokenKind::Match),
    ("!~", TokenKind::NotMatch),
    ("=", TokenKind::Assign),
    ("+=", TokenKind::PlusAssign),
    ("-=", TokenKind::MinusAssign),
    ("*=", TokenKind::StarAssign),
    ("%=", TokenKind::PercentAssign),
    ("^=", TokenKind::CaretAssign),
    ("**=", TokenKind::CaretAssign),
    ("++", TokenKind::Increment),
    ("--", TokenKind::Decrement),
    ("$", TokenKind::Dollar),
    ("?", TokenKind::Question),
    (":", TokenKind::Colon),
    ("|", TokenKind::Pipe),
    (">>", TokenKind::Append),
    ("(", TokenKind::LeftParen),
    (")", TokenKind::RightParen),
    ("{", TokenKind::LeftBrace),
    ("}", TokenKind::RightBrace),
    ("[", TokenKind::LeftBracket),
    ("]", TokenKind::RightBracket),
    (";", TokenKind::Semicolon),
    (",", TokenKind::Comma),
];

/// Keyword or built-in function name
pub(crate) fn keyword(word: &str) -> Option<TokenKind> {
    KEYWORDS
        .iter()
        .find(|(text, _)| *text == word)
        .map(|(_, kind)| kind.clone())
        .or_else(|| Builtin::from_name(word).map(TokenKind::Builtin))
}

/// Longest operator at the start of `rest`, with its length in bytes
pub(crate) fn operator(rest: &str) -> Option<(usize, TokenKind)> {
    OPERATORS
        .iter()
        .filter(|(text, _)| rest.starts_with(text))
        .max_by_key(|(text, _)| text.len())
        .map(|(text, kind)| (text.len(), kind.clone()))
}

impl TokenKind {
    pub fn can_start_expression(&self) -> bool {
        matches!(
            self,
            TokenKind::Number(_)
                | TokenKind::String(_)
                | TokenKind::Regex(_)
                | TokenKind::Identifier(_)
                | TokenKind::FuncName(_)
                | TokenKind::Builtin(_)
                | TokenKind::LeftParen
                | TokenKind::Dollar
                | TokenKind::Not
                | TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Increment
                | TokenKind::Decrement
                | TokenKind::Getline
        )
    }

    /// A `/` after one of these is division, otherwise it opens a regex
    pub fn ends_operand(&self) -> bool {
        matches!(
            self,
            TokenKind::Number(_)
                | TokenKind::String(_)
                | TokenKind::Identifier(_)
                | TokenKind::Builtin(_)
                | TokenKind::RightParen
                | TokenKind::RightBracket
                | TokenKind::Increment
                | TokenKind::Decrement
        )
    }

    /// Newlines directly after these tokens carry no meaning
    pub fn absorbs_newline(&self) -> bool {
        matches!(
            self,
            TokenKind::LeftBrace
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Comma
                | TokenKind::Semicolon
                | TokenKind::Do
                | TokenKind::Else
                | TokenKind::Newline
        )
    }

    /// Short form used in syntax errors
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Number(n) => format!("number {}", n),
            TokenKind::String(s) => format!("string \"{}\"", s),
            TokenKind::Regex(r) => format!("regex /{}/", r),
            TokenKind::Identifier(name) | TokenKind::FuncName(name) => format!("'{}'", name),
            TokenKind::Builtin(b) => format!("'{}'", b.name()),
            TokenKind::Slash => "'/'".to_string(),
            TokenKind::SlashAssign => "'/='".to_string(),
            TokenKind::Newline => "newline".to_string(),
            TokenKind::Eof => "end of input".to_string(),
            other => {
                let text = KEYWORDS
                    .iter()
                    .chain(OPERATORS)
                    .find(|(_, kind)| kind == other)
                    .map_or("?", |(text, _)| *text);
                format!("'{}'", text)
            }
        }
    }
}

/// A token with its location in the source
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
}

impl Token {
    pub fn new(kind: TokenKind, location: SourceLocation) -> Self {
        Self { kind, location }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_operator_wins() {
        assert_eq!(operator("**=2"), Some((3, TokenKind::CaretAssign)));
        assert_eq!(operator("!~ x"), Some((2, TokenKind::NotMatch)));
        assert_eq!(operator(">>"), Some((2, TokenKind::Append)));
        assert_eq!(operator("> 1"), Some((1, TokenKind::Greater)));
        assert_eq!(operator("@"), None);
        assert_eq!(operator("/"), None);
    }

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(keyword("func"), Some(TokenKind::Function));
        assert_eq!(keyword("toupper"), Some(TokenKind::Builtin(Builtin::Toupper)));
        assert_eq!(keyword("Begin"), None);
    }

    #[test]
    fn test_describe() {
        assert_eq!(TokenKind::Caret.describe(), "'^'");
        assert_eq!(TokenKind::CaretAssign.describe(), "'^='");
        assert_eq!(TokenKind::NextFile.describe(), "'nextfile'");
        assert_eq!(TokenKind::RightParen.describe(), "')'");
        assert_eq!(TokenKind::Eof.describe(), "end of input");
    }
}
