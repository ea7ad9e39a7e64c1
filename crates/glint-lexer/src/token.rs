/// A position in source text, tracking line and column for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// A span covering `self` through `other`, keeping `self`'s line and column.
    pub fn to(self, other: Span) -> Self {
        Self {
            start: self.start,
            end: other.end.max(self.end),
            line: self.line,
            column: self.column,
        }
    }
}

/// Directive keywords recognized inside `{{ ... }}` regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    If,
    Else,
    End,
    For,
    In,
    Switch,
    Case,
    Default,
    Set,
    Raw,
    Include,
    Widget,
    /// Legacy spelling of `widget`.
    Component,
    Content,
    Fragment,
    Slot,
    Block,
    Stack,
    Push,
}

impl Keyword {
    pub fn from_word(word: &str) -> Option<Keyword> {
        let keyword = match word {
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "end" => Keyword::End,
            "for" => Keyword::For,
            "in" => Keyword::In,
            "switch" => Keyword::Switch,
            "case" => Keyword::Case,
            "default" => Keyword::Default,
            "set" => Keyword::Set,
            "raw" => Keyword::Raw,
            "include" => Keyword::Include,
            "widget" => Keyword::Widget,
            "component" => Keyword::Component,
            "content" => Keyword::Content,
            "fragment" => Keyword::Fragment,
            "slot" => Keyword::Slot,
            "block" => Keyword::Block,
            "stack" => Keyword::Stack,
            "push" => Keyword::Push,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::End => "end",
            Keyword::For => "for",
            Keyword::In => "in",
            Keyword::Switch => "switch",
            Keyword::Case => "case",
            Keyword::Default => "default",
            Keyword::Set => "set",
            Keyword::Raw => "raw",
            Keyword::Include => "include",
            Keyword::Widget => "widget",
            Keyword::Component => "component",
            Keyword::Content => "content",
            Keyword::Fragment => "fragment",
            Keyword::Slot => "slot",
            Keyword::Block => "block",
            Keyword::Stack => "stack",
            Keyword::Push => "push",
        }
    }
}

/// Token classification for Glint source.
///
/// Data-carrying variants embed their value directly; the raw source text is
/// kept separately in [`Token::lexeme`].
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Outside the template body
    /// One `@...` declaration line, opaque to the compiler.
    Header(String),

    // Template body
    /// Literal text between regions (after comment removal and trimming).
    Text(String),
    /// `{{` or, with `trim`, `{{-`.
    Open { trim: bool },
    /// `}}` or, with `trim`, `-}}`.
    Close { trim: bool },

    // Inside a region
    Keyword(Keyword),
    Identifier(String),
    String(String),
    /// Number literal, raw text as written.
    Number(String),
    Boolean(bool),

    // Operators
    Question,         // ?
    QuestionDot,      // ?.
    QuestionQuestion, // ??
    Colon,            // :
    OrOr,             // ||
    AndAnd,           // &&
    EqEq,             // ==
    NotEq,            // !=
    Lt,               // <
    Gt,               // >
    LtEq,             // <=
    GtEq,             // >=
    Plus,             // +
    Minus,            // -
    Star,             // *
    Slash,            // /
    Percent,          // %
    Tilde,            // ~
    Bang,             // !
    Pipe,             // |
    Dot,              // .
    Equals,           // =

    // Punctuation
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,

    // End of input
    Eof,
}

impl TokenKind {
    /// Short human-readable description used in syntax errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Header(_) => "header declaration".into(),
            TokenKind::Text(_) => "template text".into(),
            TokenKind::Open { .. } => "'{{'".into(),
            TokenKind::Close { .. } => "'}}'".into(),
            TokenKind::Keyword(k) => format!("keyword '{}'", k.as_str()),
            TokenKind::Identifier(name) => format!("identifier '{name}'"),
            TokenKind::String(s) => format!("string \"{s}\""),
            TokenKind::Number(raw) => format!("number {raw}"),
            TokenKind::Boolean(b) => format!("'{b}'"),
            TokenKind::Eof => "end of input".into(),
            op => format!("'{}'", op.symbol().unwrap_or("?")),
        }
    }

    /// Source spelling of operator and punctuation tokens.
    pub fn symbol(&self) -> Option<&'static str> {
        let symbol = match self {
            TokenKind::Question => "?",
            TokenKind::QuestionDot => "?.",
            TokenKind::QuestionQuestion => "??",
            TokenKind::Colon => ":",
            TokenKind::OrOr => "||",
            TokenKind::AndAnd => "&&",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::LtEq => "<=",
            TokenKind::GtEq => ">=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Tilde => "~",
            TokenKind::Bang => "!",
            TokenKind::Pipe => "|",
            TokenKind::Dot => ".",
            TokenKind::Equals => "=",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Comma => ",",
            _ => return None,
        };
        Some(symbol)
    }
}

/// A token produced by the Glint lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// The source text the token was scanned from.
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            span,
        }
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }
}
