//! Tokens and source spans

use std::fmt;

/// Byte range plus the lines it starts and ends on (1-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// Line of the first character
    pub line: u32,
    /// Line of the last character
    pub end_line: u32,
}

impl Span {
    /// Create a span
    #[must_use]
    pub const fn new(start: usize, end: usize, line: u32, end_line: u32) -> Self {
        Self {
            start,
            end,
            line,
            end_line,
        }
    }

    /// Span covering `self` through `other`
    #[must_use]
    pub const fn to(self, other: Self) -> Self {
        Self {
            start: self.start,
            end: other.end,
            line: self.line,
            end_line: other.end_line,
        }
    }

    /// Whether the span crosses a line break
    #[must_use]
    pub const fn is_multiline(&self) -> bool {
        self.end_line > self.line
    }
}

/// Token kinds, trivia included
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords
    /// `and`
    And,
    /// `break`
    Break,
    /// `do`
    Do,
    /// `else`
    Else,
    /// `elseif`
    ElseIf,
    /// `end`
    End,
    /// `false`
    False,
    /// `for`
    For,
    /// `function`
    Function,
    /// `if`
    If,
    /// `in`
    In,
    /// `local`
    Local,
    /// `nil`
    Nil,
    /// `not`
    Not,
    /// `or`
    Or,
    /// `return`
    Return,
    /// `then`
    Then,
    /// `true`
    True,
    /// `while`
    While,

    // Literals
    /// Identifier
    Name(String),
    /// Numeric literal
    Number(f64),
    /// Quoted string, always on one line
    Str(String),
    /// Long bracket string, may span lines
    LongStr(String),

    // Operators and punctuation
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `//`
    DoubleSlash,
    /// `%`
    Percent,
    /// `^`
    Caret,
    /// `#`
    Hash,
    /// `==`
    EqEq,
    /// `~=`
    NotEq,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `=`
    Assign,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `;`
    Semi,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `..`
    Concat,
    /// `...`
    Ellipsis,

    // Trivia
    /// `--` comment to end of line
    Comment,
    /// `--[[ ]]` comment, may span lines
    LongComment,

    /// End of input
    Eof,
}

impl TokenKind {
    /// Map an identifier to its keyword, if it is one
    #[must_use]
    pub fn keyword(ident: &str) -> Option<Self> {
        let kw = match ident {
            "and" => Self::And,
            "break" => Self::Break,
            "do" => Self::Do,
            "else" => Self::Else,
            "elseif" => Self::ElseIf,
            "end" => Self::End,
            "false" => Self::False,
            "for" => Self::For,
            "function" => Self::Function,
            "if" => Self::If,
            "in" => Self::In,
            "local" => Self::Local,
            "nil" => Self::Nil,
            "not" => Self::Not,
            "or" => Self::Or,
            "return" => Self::Return,
            "then" => Self::Then,
            "true" => Self::True,
            "while" => Self::While,
            _ => return None,
        };
        Some(kw)
    }

    /// Comments are skipped by the parser but kept in the stream
    #[must_use]
    pub const fn is_trivia(&self) -> bool {
        matches!(self, Self::Comment | Self::LongComment)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::And => "and",
            Self::Break => "break",
            Self::Do => "do",
            Self::Else => "else",
            Self::ElseIf => "elseif",
            Self::End => "end",
            Self::False => "false",
            Self::For => "for",
            Self::Function => "function",
            Self::If => "if",
            Self::In => "in",
            Self::Local => "local",
            Self::Nil => "nil",
            Self::Not => "not",
            Self::Or => "or",
            Self::Return => "return",
            Self::Then => "then",
            Self::True => "true",
            Self::While => "while",
            Self::Name(name) => return write!(f, "'{name}'"),
            Self::Number(n) => return write!(f, "{n}"),
            Self::Str(_) | Self::LongStr(_) => "string",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::DoubleSlash => "//",
            Self::Percent => "%",
            Self::Caret => "^",
            Self::Hash => "#",
            Self::EqEq => "==",
            Self::NotEq => "~=",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Assign => "=",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Semi => ";",
            Self::Colon => ":",
            Self::Comma => ",",
            Self::Dot => ".",
            Self::Concat => "..",
            Self::Ellipsis => "...",
            Self::Comment | Self::LongComment => "comment",
            Self::Eof => "<eof>",
        };
        f.write_str(text)
    }
}

/// A token and where it sits in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token kind and payload
    pub kind: TokenKind,
    /// Source range
    pub span: Span,
}
