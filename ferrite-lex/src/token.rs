#![forbid(unsafe_code)]

use ferrite_ast::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// A line break separates this token from the previous one.
    pub newline_before: bool,
}

/// One piece of a template literal.
#[derive(Clone, Debug, PartialEq)]
pub enum TemplatePart {
    Str(String),
    /// Source text of a `${...}` substitution; `start` is its byte offset
    /// relative to the start of the template token.
    Expr { src: String, start: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Keywords
    KwInterface,
    KwClass,
    KwFunction,
    KwExport,
    KwAsync,
    KwAwait,
    KwReturn,
    KwIf,
    KwElse,
    KwWhile,
    KwLet,
    KwConst,
    KwVar,
    KwNew,
    KwThis,
    KwTrue,
    KwFalse,
    KwNull,
    KwUndefined,
    KwExtends,
    KwImplements,
    KwImport,

    // Operators / punctuation
    FatArrow,
    EqEqEq,
    NotEqEq,
    EqEq,
    Neq,
    Le,
    Ge,
    Lt,
    Gt,
    PlusPlus,
    MinusMinus,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    AndAnd,
    OrOr,
    Bang,
    Pipe,
    Question,
    Eq,
    Dot,
    Comma,
    Colon,
    Semi,
    At,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Eof,

    // Literals / identifiers
    Ident(String),
    Number(f64),
    String(String),
    Template(Vec<TemplatePart>),
}

impl TokenKind {
    /// Short human-readable description used in parse errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(s) => format!("identifier `{s}`"),
            TokenKind::Number(n) => format!("number `{n}`"),
            TokenKind::String(_) => "string literal".to_string(),
            TokenKind::Template(_) => "template literal".to_string(),
            TokenKind::Eof => "end of file".to_string(),
            other => format!("`{}`", other.text()),
        }
    }

    /// Keyword spelling, for positions where keywords act as plain names
    /// (`axios.delete`, `{ new: 1 }`).
    pub fn keyword_text(&self) -> Option<&'static str> {
        let text = self.text();
        let is_word = text.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
        is_word.then_some(text)
    }

    fn text(&self) -> &'static str {
        match self {
            TokenKind::KwInterface => "interface",
            TokenKind::KwClass => "class",
            TokenKind::KwFunction => "function",
            TokenKind::KwExport => "export",
            TokenKind::KwAsync => "async",
            TokenKind::KwAwait => "await",
            TokenKind::KwReturn => "return",
            TokenKind::KwIf => "if",
            TokenKind::KwElse => "else",
            TokenKind::KwWhile => "while",
            TokenKind::KwLet => "let",
            TokenKind::KwConst => "const",
            TokenKind::KwVar => "var",
            TokenKind::KwNew => "new",
            TokenKind::KwThis => "this",
            TokenKind::KwTrue => "true",
            TokenKind::KwFalse => "false",
            TokenKind::KwNull => "null",
            TokenKind::KwUndefined => "undefined",
            TokenKind::KwExtends => "extends",
            TokenKind::KwImplements => "implements",
            TokenKind::KwImport => "import",
            TokenKind::FatArrow => "=>",
            TokenKind::EqEqEq => "===",
            TokenKind::NotEqEq => "!==",
            TokenKind::EqEq => "==",
            TokenKind::Neq => "!=",
            TokenKind::Le => "<=",
            TokenKind::Ge => ">=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::StarEq => "*=",
            TokenKind::SlashEq => "/=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Bang => "!",
            TokenKind::Pipe => "|",
            TokenKind::Question => "?",
            TokenKind::Eq => "=",
            TokenKind::Dot => ".",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Semi => ";",
            TokenKind::At => "@",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Eof
            | TokenKind::Ident(_)
            | TokenKind::Number(_)
            | TokenKind::String(_)
            | TokenKind::Template(_) => "",
        }
    }
}
