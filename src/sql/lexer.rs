//! # SQL Lexer
//!
//! Single-pass tokenizer over the statement text. Identifiers, numbers and
//! string bodies are borrowed slices of the input; nothing is allocated
//! except the uppercase copy used for keyword lookup.
//!
//! ## Keyword Lookup
//!
//! Keywords are matched through a compile-time perfect hash map (`phf`).
//! Anything not in the map is an identifier, which is how type names such
//! as `INTEGER` or `VECTOR` and function names reach the parser.
//!
//! ## Recognized Input
//!
//! | Input | Token |
//! |-------|-------|
//! | `name`, `"Name"`, `` `name` `` | identifier (quoted forms keep case) |
//! | `42`, `3.14`, `.5`, `1e-3`, `0xFF` | number |
//! | `'it''s'` | string (escapes resolved by the parser) |
//! | `$1`, `:name`, `@name`, `?` | bind markers |
//! | `-- ...`, `/* ... */` | skipped (block comments nest) |
//! | `\|\|`, `<>`, `!=`, `<=`, `>=`, `::` | operators |
//!
//! ## Positions
//!
//! Line and column are 1-based and refer to the first character of the
//! last token returned, which is what parse errors report.
//!
//! Invalid input produces `Token::Error`; the parser turns it into a
//! `DbError::Parse` carrying the position.

use super::token::{Keyword, Parameter, Span, Token};
use phf::phf_map;

static KEYWORDS: phf::Map<&'static str, Keyword> = phf_map! {
    "ALL" => Keyword::All,
    "AND" => Keyword::And,
    "AS" => Keyword::As,
    "ASC" => Keyword::Asc,
    "BEGIN" => Keyword::Begin,
    "BETWEEN" => Keyword::Between,
    "BY" => Keyword::By,
    "CASE" => Keyword::Case,
    "CAST" => Keyword::Cast,
    "COMMIT" => Keyword::Commit,
    "CREATE" => Keyword::Create,
    "CROSS" => Keyword::Cross,
    "CURRENT" => Keyword::Current,
    "DEFAULT" => Keyword::Default,
    "DELETE" => Keyword::Delete,
    "DESC" => Keyword::Desc,
    "DISTINCT" => Keyword::Distinct,
    "DROP" => Keyword::Drop,
    "ELSE" => Keyword::Else,
    "END" => Keyword::End,
    "EXISTS" => Keyword::Exists,
    "EXPLAIN" => Keyword::Explain,
    "FALSE" => Keyword::False,
    "FIRST" => Keyword::First,
    "FOLLOWING" => Keyword::Following,
    "FROM" => Keyword::From,
    "GROUP" => Keyword::Group,
    "HAVING" => Keyword::Having,
    "IF" => Keyword::If,
    "IN" => Keyword::In,
    "INDEX" => Keyword::Index,
    "INNER" => Keyword::Inner,
    "INSERT" => Keyword::Insert,
    "INTO" => Keyword::Into,
    "IS" => Keyword::Is,
    "JOIN" => Keyword::Join,
    "KEY" => Keyword::Key,
    "LAST" => Keyword::Last,
    "LEFT" => Keyword::Left,
    "LIKE" => Keyword::Like,
    "LIMIT" => Keyword::Limit,
    "NOT" => Keyword::Not,
    "NULL" => Keyword::Null,
    "NULLS" => Keyword::Nulls,
    "OFFSET" => Keyword::Offset,
    "ON" => Keyword::On,
    "OR" => Keyword::Or,
    "ORDER" => Keyword::Order,
    "OUTER" => Keyword::Outer,
    "OVER" => Keyword::Over,
    "PARTITION" => Keyword::Partition,
    "PRAGMA" => Keyword::Pragma,
    "PRECEDING" => Keyword::Preceding,
    "PRIMARY" => Keyword::Primary,
    "ROLLBACK" => Keyword::Rollback,
    "ROW" => Keyword::Row,
    "ROWS" => Keyword::Rows,
    "SELECT" => Keyword::Select,
    "SET" => Keyword::Set,
    "SHOW" => Keyword::Show,
    "START" => Keyword::Start,
    "TABLE" => Keyword::Table,
    "TABLES" => Keyword::Tables,
    "THEN" => Keyword::Then,
    "TRANSACTION" => Keyword::Transaction,
    "TRUE" => Keyword::True,
    "UNBOUNDED" => Keyword::Unbounded,
    "UNION" => Keyword::Union,
    "UNIQUE" => Keyword::Unique,
    "UPDATE" => Keyword::Update,
    "USING" => Keyword::Using,
    "VALUES" => Keyword::Values,
    "WHEN" => Keyword::When,
    "WHERE" => Keyword::Where,
    "WITH" => Keyword::With,
    "WORK" => Keyword::Work,
};

pub struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    token_start: usize,
    token_line: u32,
    token_column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            token_start: 0,
            token_line: 1,
            token_column: 1,
        }
    }

    /// Line of the last token returned.
    pub fn line(&self) -> u32 {
        self.token_line
    }

    /// Column of the last token returned.
    pub fn column(&self) -> u32 {
        self.token_column
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn span(&self) -> Span {
        Span::new(self.token_start, self.pos - self.token_start)
    }

    pub fn next_token(&mut self) -> Token<'a> {
        self.skip_whitespace();
        self.token_start = self.pos;
        self.token_line = self.line;
        self.token_column = self.column;

        if self.is_eof() {
            return Token::Eof;
        }

        let ch = self.current();

        if ch.is_ascii_alphabetic() || ch == b'_' {
            return self.scan_identifier_or_keyword();
        }

        if ch.is_ascii_digit() {
            return self.scan_number();
        }

        match ch {
            b'\'' => self.scan_string(),
            b'"' => self.scan_quoted_identifier(b'"'),
            b'`' => self.scan_quoted_identifier(b'`'),
            b'$' => self.scan_dollar_param(),
            b':' => self.scan_colon_or_param(),
            b'@' => self.scan_at_param(),
            b'?' => {
                self.advance();
                Token::Parameter(Parameter::Anonymous)
            }
            b'-' => self.scan_minus(),
            b'/' => self.scan_slash(),
            b'+' => self.single(Token::Plus),
            b'*' => self.single(Token::Star),
            b'%' => self.single(Token::Percent),
            b'|' => self.scan_pipe(),
            b'=' => {
                self.advance();
                if !self.is_eof() && self.current() == b'=' {
                    self.advance();
                }
                Token::Eq
            }
            b'<' => self.scan_less_than(),
            b'>' => self.scan_greater_than(),
            b'!' => self.scan_exclamation(),
            b'(' => self.single(Token::LParen),
            b')' => self.single(Token::RParen),
            b'[' => self.single(Token::LBracket),
            b']' => self.single(Token::RBracket),
            b',' => self.single(Token::Comma),
            b';' => self.single(Token::Semicolon),
            b'.' => self.scan_dot(),
            _ => {
                self.advance_char();
                Token::Error("unexpected character")
            }
        }
    }

    pub fn peek(&mut self) -> Token<'a> {
        self.peek_nth(0)
    }

    pub fn peek_nth(&mut self, n: usize) -> Token<'a> {
        let saved = (
            self.pos,
            self.line,
            self.column,
            self.token_start,
            self.token_line,
            self.token_column,
        );

        let mut token = Token::Eof;
        for _ in 0..=n {
            token = self.next_token();
            if matches!(token, Token::Eof) {
                break;
            }
        }

        (
            self.pos,
            self.line,
            self.column,
            self.token_start,
            self.token_line,
            self.token_column,
        ) = saved;

        token
    }

    fn single(&mut self, token: Token<'a>) -> Token<'a> {
        self.advance();
        token
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn current(&self) -> u8 {
        self.bytes[self.pos]
    }

    fn peek_char(&self) -> Option<u8> {
        self.bytes.get(self.pos + 1).copied()
    }

    fn advance(&mut self) {
        if !self.is_eof() {
            if self.current() == b'\n' {
                self.line += 1;
                self.column = 1;
            } else if self.current() & 0xC0 != 0x80 {
                self.column += 1;
            }
            self.pos += 1;
        }
    }

    /// Skips one whole UTF-8 character.
    fn advance_char(&mut self) {
        self.advance();
        while !self.is_eof() && self.current() & 0xC0 == 0x80 {
            self.pos += 1;
        }
    }

    fn skip_whitespace(&mut self) {
        while !self.is_eof() {
            match self.current() {
                b' ' | b'\t' | b'\r' | b'\n' => self.advance(),
                _ => break,
            }
        }
    }

    fn scan_word(&mut self) -> &'a str {
        let start = self.pos;
        while !self.is_eof() && (self.current().is_ascii_alphanumeric() || self.current() == b'_') {
            self.advance();
        }
        &self.input[start..self.pos]
    }

    fn scan_identifier_or_keyword(&mut self) -> Token<'a> {
        let ident = self.scan_word();
        let upper = ident.to_ascii_uppercase();

        match KEYWORDS.get(upper.as_str()) {
            Some(&keyword) => Token::Keyword(keyword),
            None => Token::Ident(ident),
        }
    }

    fn scan_number(&mut self) -> Token<'a> {
        let start = self.pos;

        if self.current() == b'0' && matches!(self.peek_char(), Some(b'x' | b'X')) {
            self.advance();
            self.advance();
            let digits = self.pos;
            while !self.is_eof() && self.current().is_ascii_hexdigit() {
                self.advance();
            }
            if self.pos == digits {
                return Token::Error("invalid hex number");
            }
            return Token::HexNumber(&self.input[digits..self.pos]);
        }

        while !self.is_eof() && self.current().is_ascii_digit() {
            self.advance();
        }

        let mut is_float = false;

        if !self.is_eof() && self.current() == b'.' {
            is_float = true;
            self.advance();
            while !self.is_eof() && self.current().is_ascii_digit() {
                self.advance();
            }
        }

        if !self.is_eof() && (self.current() == b'e' || self.current() == b'E') {
            let exponent_follows = match self.peek_char() {
                Some(c) if c.is_ascii_digit() => true,
                Some(b'+' | b'-') => self
                    .bytes
                    .get(self.pos + 2)
                    .is_some_and(|c| c.is_ascii_digit()),
                _ => false,
            };
            if exponent_follows {
                is_float = true;
                self.advance();
                if self.current() == b'+' || self.current() == b'-' {
                    self.advance();
                }
                while !self.is_eof() && self.current().is_ascii_digit() {
                    self.advance();
                }
            }
        }

        if !self.is_eof() && (self.current().is_ascii_alphabetic() || self.current() == b'_') {
            self.scan_word();
            return Token::Error("invalid number");
        }

        let text = &self.input[start..self.pos];
        if is_float {
            Token::Float(text)
        } else {
            Token::Integer(text)
        }
    }

    fn scan_string(&mut self) -> Token<'a> {
        self.advance();
        let start = self.pos;

        loop {
            if self.is_eof() {
                return Token::Error("unterminated string");
            }

            if self.current() == b'\'' {
                if self.peek_char() == Some(b'\'') {
                    self.advance();
                    self.advance();
                } else {
                    let end = self.pos;
                    self.advance();
                    return Token::String(&self.input[start..end]);
                }
            } else {
                self.advance();
            }
        }
    }

    fn scan_quoted_identifier(&mut self, quote: u8) -> Token<'a> {
        self.advance();
        let start = self.pos;

        loop {
            if self.is_eof() {
                return Token::Error("unterminated quoted identifier");
            }

            if self.current() == quote {
                let end = self.pos;
                self.advance();
                if end == start {
                    return Token::Error("empty quoted identifier");
                }
                return Token::QuotedIdent(&self.input[start..end]);
            }
            self.advance();
        }
    }

    fn scan_dollar_param(&mut self) -> Token<'a> {
        self.advance();

        if self.is_eof() || !self.current().is_ascii_digit() {
            return Token::Error("expected parameter number after '$'");
        }

        let start = self.pos;
        while !self.is_eof() && self.current().is_ascii_digit() {
            self.advance();
        }
        match self.input[start..self.pos].parse::<u32>() {
            Ok(n) if n > 0 => Token::Parameter(Parameter::Positional(n)),
            _ => Token::Error("invalid positional parameter"),
        }
    }

    fn scan_colon_or_param(&mut self) -> Token<'a> {
        self.advance();

        if self.is_eof() {
            return Token::Error("unexpected ':'");
        }

        match self.current() {
            b':' => {
                self.advance();
                Token::DoubleColon
            }
            c if c.is_ascii_alphabetic() || c == b'_' => Token::Parameter(Parameter::Named {
                sigil: ':',
                name: self.scan_word(),
            }),
            _ => Token::Error("unexpected ':'"),
        }
    }

    fn scan_at_param(&mut self) -> Token<'a> {
        self.advance();

        if !self.is_eof() && (self.current().is_ascii_alphabetic() || self.current() == b'_') {
            Token::Parameter(Parameter::Named {
                sigil: '@',
                name: self.scan_word(),
            })
        } else {
            Token::Error("invalid @ parameter")
        }
    }

    fn scan_minus(&mut self) -> Token<'a> {
        self.advance();

        if !self.is_eof() && self.current() == b'-' {
            while !self.is_eof() && self.current() != b'\n' {
                self.advance();
            }
            return self.next_token();
        }
        Token::Minus
    }

    fn scan_slash(&mut self) -> Token<'a> {
        self.advance();

        if !self.is_eof() && self.current() == b'*' {
            self.advance();
            self.scan_block_comment()
        } else {
            Token::Slash
        }
    }

    fn scan_block_comment(&mut self) -> Token<'a> {
        let mut depth = 1;

        while !self.is_eof() && depth > 0 {
            if self.current() == b'/' && self.peek_char() == Some(b'*') {
                self.advance();
                self.advance();
                depth += 1;
            } else if self.current() == b'*' && self.peek_char() == Some(b'/') {
                self.advance();
                self.advance();
                depth -= 1;
            } else {
                self.advance();
            }
        }

        if depth > 0 {
            return Token::Error("unterminated block comment");
        }

        self.next_token()
    }

    fn scan_pipe(&mut self) -> Token<'a> {
        self.advance();

        if !self.is_eof() && self.current() == b'|' {
            self.advance();
            Token::DoublePipe
        } else {
            Token::Error("expected '||'")
        }
    }

    fn scan_less_than(&mut self) -> Token<'a> {
        self.advance();

        if self.is_eof() {
            return Token::Lt;
        }

        match self.current() {
            b'=' => {
                self.advance();
                Token::LtEq
            }
            b'>' => {
                self.advance();
                Token::NotEq
            }
            _ => Token::Lt,
        }
    }

    fn scan_greater_than(&mut self) -> Token<'a> {
        self.advance();

        if !self.is_eof() && self.current() == b'=' {
            self.advance();
            Token::GtEq
        } else {
            Token::Gt
        }
    }

    fn scan_exclamation(&mut self) -> Token<'a> {
        self.advance();

        if !self.is_eof() && self.current() == b'=' {
            self.advance();
            Token::NotEq
        } else {
            Token::Error("expected '=' after '!'")
        }
    }

    fn scan_dot(&mut self) -> Token<'a> {
        self.advance();

        if !self.is_eof() && self.current().is_ascii_digit() {
            let start = self.pos - 1;
            while !self.is_eof() && self.current().is_ascii_digit() {
                self.advance();
            }
            if !self.is_eof()
                && (self.current() == b'e' || self.current() == b'E')
                && self.peek_char().is_some_and(|c| c.is_ascii_digit() || c == b'-' || c == b'+')
            {
                self.advance();
                if self.current() == b'+' || self.current() == b'-' {
                    self.advance();
                }
                while !self.is_eof() && self.current().is_ascii_digit() {
                    self.advance();
                }
            }
            Token::Float(&self.input[start..self.pos])
        } else {
            Token::Dot
        }
    }
}
