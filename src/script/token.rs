#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Decimal or `0x` hex literal, always in `0..=65535`.
    Number(u16),

    /// Instruction mnemonic or subroutine name.
    Ident(String),

    /// `name:`, a label definition.
    Label(String),

    // Directives
    Sub,
    Goto,

    // Block keywords
    Begin,
    While,
    Repeat,
    If,
    Else,
    Endif,

    Newline,
    Eof,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {}", n),
            Token::Ident(name) => write!(f, "'{}'", name),
            Token::Label(name) => write!(f, "label '{}:'", name),
            Token::Sub => write!(f, "'sub'"),
            Token::Goto => write!(f, "'goto'"),
            Token::Begin => write!(f, "'begin'"),
            Token::While => write!(f, "'while'"),
            Token::Repeat => write!(f, "'repeat'"),
            Token::If => write!(f, "'if'"),
            Token::Else => write!(f, "'else'"),
            Token::Endif => write!(f, "'endif'"),
            Token::Newline => write!(f, "end of line"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}
