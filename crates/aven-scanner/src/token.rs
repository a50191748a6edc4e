use aven_common::Span;

/// Kind of a scanned token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Literals and identifiers
    Ident,
    IntLit,
    FloatLit,
    StringLit,

    // Keywords
    Let,
    Var,
    Fun,
    Struct,
    Union,
    Interface,
    Extension,
    Mutating,
    If,
    Else,
    While,
    Return,
    As,
    /// `as!`, the forced cast.
    AsBang,
    Is,
    True,
    False,
    Null,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    ColonColon,
    Semicolon,
    Dot,
    At,
    Arrow,

    // Binding operators
    CopyBind,
    RefBind,
    MoveBind,

    // Operators
    Eq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    BangEq,
    EqEqEq,
    BangEqEq,
    AmpAmp,
    PipePipe,
    Bang,

    Eof,
    Unknown,
}

impl TokenKind {
    pub fn keyword(text: &str) -> Option<TokenKind> {
        Some(match text {
            "let" => TokenKind::Let,
            "var" => TokenKind::Var,
            "fun" => TokenKind::Fun,
            "struct" => TokenKind::Struct,
            "union" => TokenKind::Union,
            "interface" => TokenKind::Interface,
            "extension" => TokenKind::Extension,
            "mutating" => TokenKind::Mutating,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "return" => TokenKind::Return,
            "as" => TokenKind::As,
            "is" => TokenKind::Is,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            _ => return None,
        })
    }

    /// Operator tokens that can appear as function names (`fun + (...)`) and
    /// as infix/prefix operator identifiers.
    pub fn operator_name(self) -> Option<&'static str> {
        Some(match self {
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::EqEq => "==",
            TokenKind::BangEq => "!=",
            TokenKind::EqEqEq => "===",
            TokenKind::BangEqEq => "!==",
            TokenKind::AmpAmp => "&&",
            TokenKind::PipePipe => "||",
            TokenKind::Bang => "!",
            _ => return None,
        })
    }

    /// Human-readable description used in parser diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Ident => "identifier",
            TokenKind::IntLit => "integer literal",
            TokenKind::FloatLit => "float literal",
            TokenKind::StringLit => "string literal",
            TokenKind::Let => "'let'",
            TokenKind::Var => "'var'",
            TokenKind::Fun => "'fun'",
            TokenKind::Struct => "'struct'",
            TokenKind::Union => "'union'",
            TokenKind::Interface => "'interface'",
            TokenKind::Extension => "'extension'",
            TokenKind::Mutating => "'mutating'",
            TokenKind::If => "'if'",
            TokenKind::Else => "'else'",
            TokenKind::While => "'while'",
            TokenKind::Return => "'return'",
            TokenKind::As => "'as'",
            TokenKind::AsBang => "'as!'",
            TokenKind::Is => "'is'",
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::Null => "'null'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::ColonColon => "'::'",
            TokenKind::Semicolon => "';'",
            TokenKind::Dot => "'.'",
            TokenKind::At => "'@'",
            TokenKind::Arrow => "'->'",
            TokenKind::CopyBind => "':='",
            TokenKind::RefBind => "'&-'",
            TokenKind::MoveBind => "'<-'",
            TokenKind::Eq => "'='",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::Lt => "'<'",
            TokenKind::Le => "'<='",
            TokenKind::Gt => "'>'",
            TokenKind::Ge => "'>='",
            TokenKind::EqEq => "'=='",
            TokenKind::BangEq => "'!='",
            TokenKind::EqEqEq => "'==='",
            TokenKind::BangEqEq => "'!=='",
            TokenKind::AmpAmp => "'&&'",
            TokenKind::PipePipe => "'||'",
            TokenKind::Bang => "'!'",
            TokenKind::Eof => "end of file",
            TokenKind::Unknown => "unknown token",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }

    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        self.span.text(source)
    }
}
