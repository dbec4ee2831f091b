//! # SQL Tokens
//!
//! Token definitions produced by the lexer. String-carrying tokens borrow
//! from the statement text; the parser copies what it keeps into the owned
//! AST.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    All,
    And,
    As,
    Asc,
    Begin,
    Between,
    By,
    Case,
    Cast,
    Commit,
    Create,
    Cross,
    Current,
    Default,
    Delete,
    Desc,
    Distinct,
    Drop,
    Else,
    End,
    Exists,
    Explain,
    False,
    First,
    Following,
    From,
    Group,
    Having,
    If,
    In,
    Index,
    Inner,
    Insert,
    Into,
    Is,
    Join,
    Key,
    Last,
    Left,
    Like,
    Limit,
    Not,
    Null,
    Nulls,
    Offset,
    On,
    Or,
    Order,
    Outer,
    Over,
    Partition,
    Pragma,
    Preceding,
    Primary,
    Rollback,
    Row,
    Rows,
    Select,
    Set,
    Show,
    Start,
    Table,
    Tables,
    Then,
    Transaction,
    True,
    Unbounded,
    Union,
    Unique,
    Update,
    Using,
    Values,
    When,
    Where,
    With,
    Work,
}

impl Keyword {
    /// Keywords that may also be used as table, column or alias names.
    pub fn is_unreserved(&self) -> bool {
        matches!(
            self,
            Keyword::Begin
                | Keyword::Commit
                | Keyword::Current
                | Keyword::First
                | Keyword::Following
                | Keyword::Key
                | Keyword::Last
                | Keyword::Nulls
                | Keyword::Over
                | Keyword::Partition
                | Keyword::Pragma
                | Keyword::Preceding
                | Keyword::Rollback
                | Keyword::Row
                | Keyword::Rows
                | Keyword::Show
                | Keyword::Start
                | Keyword::Tables
                | Keyword::Transaction
                | Keyword::Unbounded
                | Keyword::Work
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::All => "ALL",
            Keyword::And => "AND",
            Keyword::As => "AS",
            Keyword::Asc => "ASC",
            Keyword::Begin => "BEGIN",
            Keyword::Between => "BETWEEN",
            Keyword::By => "BY",
            Keyword::Case => "CASE",
            Keyword::Cast => "CAST",
            Keyword::Commit => "COMMIT",
            Keyword::Create => "CREATE",
            Keyword::Cross => "CROSS",
            Keyword::Current => "CURRENT",
            Keyword::Default => "DEFAULT",
            Keyword::Delete => "DELETE",
            Keyword::Desc => "DESC",
            Keyword::Distinct => "DISTINCT",
            Keyword::Drop => "DROP",
            Keyword::Else => "ELSE",
            Keyword::End => "END",
            Keyword::Exists => "EXISTS",
            Keyword::Explain => "EXPLAIN",
            Keyword::False => "FALSE",
            Keyword::First => "FIRST",
            Keyword::Following => "FOLLOWING",
            Keyword::From => "FROM",
            Keyword::Group => "GROUP",
            Keyword::Having => "HAVING",
            Keyword::If => "IF",
            Keyword::In => "IN",
            Keyword::Index => "INDEX",
            Keyword::Inner => "INNER",
            Keyword::Insert => "INSERT",
            Keyword::Into => "INTO",
            Keyword::Is => "IS",
            Keyword::Join => "JOIN",
            Keyword::Key => "KEY",
            Keyword::Last => "LAST",
            Keyword::Left => "LEFT",
            Keyword::Like => "LIKE",
            Keyword::Limit => "LIMIT",
            Keyword::Not => "NOT",
            Keyword::Null => "NULL",
            Keyword::Nulls => "NULLS",
            Keyword::Offset => "OFFSET",
            Keyword::On => "ON",
            Keyword::Or => "OR",
            Keyword::Order => "ORDER",
            Keyword::Outer => "OUTER",
            Keyword::Over => "OVER",
            Keyword::Partition => "PARTITION",
            Keyword::Pragma => "PRAGMA",
            Keyword::Preceding => "PRECEDING",
            Keyword::Primary => "PRIMARY",
            Keyword::Rollback => "ROLLBACK",
            Keyword::Row => "ROW",
            Keyword::Rows => "ROWS",
            Keyword::Select => "SELECT",
            Keyword::Set => "SET",
            Keyword::Show => "SHOW",
            Keyword::Start => "START",
            Keyword::Table => "TABLE",
            Keyword::Tables => "TABLES",
            Keyword::Then => "THEN",
            Keyword::Transaction => "TRANSACTION",
            Keyword::True => "TRUE",
            Keyword::Unbounded => "UNBOUNDED",
            Keyword::Union => "UNION",
            Keyword::Unique => "UNIQUE",
            Keyword::Update => "UPDATE",
            Keyword::Using => "USING",
            Keyword::Values => "VALUES",
            Keyword::When => "WHEN",
            Keyword::Where => "WHERE",
            Keyword::With => "WITH",
            Keyword::Work => "WORK",
        }
    }
}

/// A bind marker as written in the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter<'a> {
    /// `$n`
    Positional(u32),
    /// `:name` or `@name`; `sigil` is the leading character.
    Named { sigil: char, name: &'a str },
    /// `?`
    Anonymous,
}

/// Byte range of a token in the statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

impl Span {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'a> {
    Keyword(Keyword),
    Ident(&'a str),
    QuotedIdent(&'a str),
    Integer(&'a str),
    Float(&'a str),
    HexNumber(&'a str),
    /// Body of a single-quoted string, with `''` escapes still doubled.
    String(&'a str),
    Parameter(Parameter<'a>),

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    DoublePipe,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Dot,
    DoubleColon,

    Eof,
    Error(&'static str),
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Keyword(k) => write!(f, "{}", k.as_str()),
            Token::Ident(s) => write!(f, "{}", s),
            Token::QuotedIdent(s) => write!(f, "\"{}\"", s),
            Token::Integer(s) | Token::Float(s) => write!(f, "{}", s),
            Token::HexNumber(s) => write!(f, "0x{}", s),
            Token::String(s) => write!(f, "'{}'", s),
            Token::Parameter(Parameter::Positional(n)) => write!(f, "${}", n),
            Token::Parameter(Parameter::Named { sigil, name }) => write!(f, "{}{}", sigil, name),
            Token::Parameter(Parameter::Anonymous) => write!(f, "?"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::DoublePipe => write!(f, "||"),
            Token::Eq => write!(f, "="),
            Token::NotEq => write!(f, "<>"),
            Token::Lt => write!(f, "<"),
            Token::LtEq => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::GtEq => write!(f, ">="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::Dot => write!(f, "."),
            Token::DoubleColon => write!(f, "::"),
            Token::Eof => write!(f, "end of input"),
            Token::Error(msg) => write!(f, "{}", msg),
        }
    }
}
