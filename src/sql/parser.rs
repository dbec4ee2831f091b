//! # SQL Parser
//!
//! Recursive descent for statements, Pratt parsing for expressions. The
//! parser keeps one token of lookahead in `current` and asks the lexer for
//! more when it needs to tell `t.*` from `t.col` or a function call from a
//! column reference.
//!
//! ## Expression Parsing
//!
//! `parse_expr(min_bp)` parses a prefix expression, then repeatedly folds
//! infix operators whose left binding power is at least `min_bp`:
//!
//! ```text
//! OR 1/2   AND 3/4   NOT (prefix) 5   comparisons, IS, IN, LIKE, BETWEEN 6/7
//! || 8/9   + - 10/11   * / % 12/13   unary - 14   :: 18
//! ```
//!
//! `NOT` in infix position is only accepted directly before `IN`, `LIKE` or
//! `BETWEEN`, and only after the binding power check, so `a AND NOT b`
//! parses as `a AND (NOT b)`.
//!
//! ## Errors
//!
//! Every error is a `DbError::Parse` carrying the line and column of the
//! offending token.

use super::ast::*;
use super::lexer::Lexer;
use super::token::{Keyword, Parameter, Token};
use crate::error::DbError;
use crate::types::DataType;
use eyre::Result;

/// Parses exactly one statement. A trailing semicolon is allowed.
pub fn parse_statement(sql: &str) -> Result<Statement> {
    let mut parser = Parser::new(sql);
    let statement = parser.parse_statement()?;
    parser.consume_token(&Token::Semicolon);
    if !parser.is_at_end() {
        return Err(parser.error(format!(
            "unexpected {} after end of statement",
            parser.peek()
        )));
    }
    Ok(statement)
}

pub struct Parser<'a> {
    input: &'a str,
    lexer: Lexer<'a>,
    current: Token<'a>,
    prev_end: usize,
    anonymous_params: u32,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        Self {
            input,
            lexer,
            current,
            prev_end: 0,
            anonymous_params: 0,
        }
    }

    pub fn is_at_end(&self) -> bool {
        matches!(self.current, Token::Eof)
    }

    pub fn peek(&self) -> &Token<'a> {
        &self.current
    }

    pub fn advance(&mut self) -> Token<'a> {
        self.prev_end = self.lexer.span().end();
        std::mem::replace(&mut self.current, self.lexer.next_token())
    }

    pub fn check_keyword(&self, keyword: Keyword) -> bool {
        matches!(&self.current, Token::Keyword(k) if *k == keyword)
    }

    pub fn consume_keyword(&mut self, keyword: Keyword) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        if self.consume_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword.as_str()))
        }
    }

    pub fn check_token(&self, expected: &Token<'_>) -> bool {
        std::mem::discriminant(&self.current) == std::mem::discriminant(expected)
    }

    pub fn consume_token(&mut self, expected: &Token<'_>) -> bool {
        if self.check_token(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn expect_token(&mut self, expected: &Token<'_>) -> Result<()> {
        if self.consume_token(expected) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", expected)))
        }
    }

    fn error(&self, message: impl Into<String>) -> eyre::Report {
        DbError::parse(message, self.lexer.line(), self.lexer.column())
    }

    fn unexpected(&self, expected: &str) -> eyre::Report {
        match self.current {
            Token::Error(message) => self.error(message),
            Token::Eof => self.error(format!("expected {}, found end of input", expected)),
            other => self.error(format!("expected {}, found '{}'", expected, other)),
        }
    }

    pub fn parse_statement(&mut self) -> Result<Statement> {
        match self.current {
            Token::Keyword(Keyword::Select) | Token::Keyword(Keyword::With) | Token::LParen => {
                Ok(Statement::Select(Box::new(self.parse_query()?)))
            }
            Token::Keyword(Keyword::Insert) => self.parse_insert(),
            Token::Keyword(Keyword::Update) => self.parse_update(),
            Token::Keyword(Keyword::Delete) => self.parse_delete(),
            Token::Keyword(Keyword::Create) => self.parse_create(),
            Token::Keyword(Keyword::Drop) => self.parse_drop(),
            Token::Keyword(Keyword::Show) => {
                self.advance();
                self.expect_keyword(Keyword::Tables)?;
                Ok(Statement::ShowTables)
            }
            Token::Keyword(Keyword::Explain) => {
                self.advance();
                Ok(Statement::Explain(Box::new(self.parse_statement()?)))
            }
            Token::Keyword(Keyword::Pragma) => self.parse_pragma(),
            Token::Keyword(Keyword::Begin) => {
                self.advance();
                self.consume_transaction_noise();
                Ok(Statement::Begin)
            }
            Token::Keyword(Keyword::Start) => {
                self.advance();
                self.expect_keyword(Keyword::Transaction)?;
                Ok(Statement::Begin)
            }
            Token::Keyword(Keyword::Commit) | Token::Keyword(Keyword::End) => {
                self.advance();
                self.consume_transaction_noise();
                Ok(Statement::Commit)
            }
            Token::Keyword(Keyword::Rollback) => {
                self.advance();
                self.consume_transaction_noise();
                Ok(Statement::Rollback)
            }
            _ => Err(self.unexpected("a statement")),
        }
    }

    fn consume_transaction_noise(&mut self) {
        if !self.consume_keyword(Keyword::Transaction) {
            self.consume_keyword(Keyword::Work);
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn parse_query(&mut self) -> Result<Query> {
        let mut ctes = Vec::new();
        if self.consume_keyword(Keyword::With) {
            loop {
                let name = self.parse_identifier()?;
                let mut columns = Vec::new();
                if self.consume_token(&Token::LParen) {
                    columns = self.parse_identifier_list()?;
                    self.expect_token(&Token::RParen)?;
                }
                self.expect_keyword(Keyword::As)?;
                self.expect_token(&Token::LParen)?;
                let query = self.parse_query()?;
                self.expect_token(&Token::RParen)?;
                ctes.push(Cte {
                    name,
                    columns,
                    query: Box::new(query),
                });
                if !self.consume_token(&Token::Comma) {
                    break;
                }
            }
        }

        let body = self.parse_set_expr()?;

        let mut order_by = Vec::new();
        if self.consume_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            order_by = self.parse_order_by_list()?;
        }

        let mut limit = None;
        let mut offset = None;
        if self.consume_keyword(Keyword::Limit) {
            limit = Some(self.parse_expr(0)?);
            if self.consume_token(&Token::Comma) {
                offset = limit.take();
                limit = Some(self.parse_expr(0)?);
            }
        }
        if self.consume_keyword(Keyword::Offset) {
            offset = Some(self.parse_expr(0)?);
        }

        Ok(Query {
            ctes,
            body,
            order_by,
            limit,
            offset,
        })
    }

    fn parse_set_expr(&mut self) -> Result<SetExpr> {
        let mut left = self.parse_set_operand()?;
        while self.consume_keyword(Keyword::Union) {
            let all = self.consume_keyword(Keyword::All);
            if !all {
                self.consume_keyword(Keyword::Distinct);
            }
            let right = self.parse_set_operand()?;
            left = SetExpr::Union {
                left: Box::new(left),
                right: Box::new(right),
                all,
            };
        }
        Ok(left)
    }

    fn parse_set_operand(&mut self) -> Result<SetExpr> {
        if self.consume_token(&Token::LParen) {
            let query = self.parse_query()?;
            self.expect_token(&Token::RParen)?;
            return Ok(SetExpr::Query(Box::new(query)));
        }
        Ok(SetExpr::Select(Box::new(self.parse_select()?)))
    }

    fn parse_select(&mut self) -> Result<Select> {
        self.expect_keyword(Keyword::Select)?;
        let distinct = self.consume_keyword(Keyword::Distinct);
        if !distinct {
            self.consume_keyword(Keyword::All);
        }

        let mut projection = Vec::new();
        loop {
            projection.push(self.parse_select_item()?);
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }

        let from = if self.consume_keyword(Keyword::From) {
            Some(self.parse_from()?)
        } else {
            None
        };

        let selection = if self.consume_keyword(Keyword::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };

        let mut group_by = Vec::new();
        if self.consume_keyword(Keyword::Group) {
            self.expect_keyword(Keyword::By)?;
            group_by = self.parse_expr_list()?;
        }

        let having = if self.consume_keyword(Keyword::Having) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };

        Ok(Select {
            distinct,
            projection,
            from,
            selection,
            group_by,
            having,
        })
    }

    fn parse_select_item(&mut self) -> Result<SelectItem> {
        if self.consume_token(&Token::Star) {
            return Ok(SelectItem::Wildcard);
        }

        if self.is_identifier() && self.lexer.peek() == Token::Dot && self.lexer.peek_nth(1) == Token::Star {
            let qualifier = self.parse_identifier()?;
            self.advance();
            self.advance();
            return Ok(SelectItem::QualifiedWildcard(qualifier));
        }

        let start = self.lexer.span().start;
        let expr = self.parse_expr(0)?;
        let text = self.input[start..self.prev_end].trim().to_string();
        let alias = self.parse_optional_alias()?;
        Ok(SelectItem::Expr { expr, alias, text })
    }

    fn parse_optional_alias(&mut self) -> Result<Option<String>> {
        if self.consume_keyword(Keyword::As) {
            return Ok(Some(self.parse_identifier()?));
        }
        if self.is_identifier() {
            return Ok(Some(self.parse_identifier()?));
        }
        Ok(None)
    }

    fn parse_from(&mut self) -> Result<TableRef> {
        let mut left = self.parse_table_factor()?;

        loop {
            let kind = if self.consume_token(&Token::Comma) {
                left = TableRef::Join {
                    left: Box::new(left),
                    right: Box::new(self.parse_table_factor()?),
                    kind: JoinKind::Cross,
                    on: None,
                };
                continue;
            } else if self.consume_keyword(Keyword::Cross) {
                self.expect_keyword(Keyword::Join)?;
                JoinKind::Cross
            } else if self.consume_keyword(Keyword::Left) {
                self.consume_keyword(Keyword::Outer);
                self.expect_keyword(Keyword::Join)?;
                JoinKind::Left
            } else if self.consume_keyword(Keyword::Inner) {
                self.expect_keyword(Keyword::Join)?;
                JoinKind::Inner
            } else if self.consume_keyword(Keyword::Join) {
                JoinKind::Inner
            } else {
                break;
            };

            let right = self.parse_table_factor()?;
            let on = match kind {
                JoinKind::Cross => None,
                _ => {
                    self.expect_keyword(Keyword::On)?;
                    Some(self.parse_expr(0)?)
                }
            };
            left = TableRef::Join {
                left: Box::new(left),
                right: Box::new(right),
                kind,
                on,
            };
        }

        Ok(left)
    }

    fn parse_table_factor(&mut self) -> Result<TableRef> {
        if self.consume_token(&Token::LParen) {
            if self.check_keyword(Keyword::Select) || self.check_keyword(Keyword::With) {
                let query = self.parse_query()?;
                self.expect_token(&Token::RParen)?;
                let alias = match self.parse_optional_alias()? {
                    Some(alias) => alias,
                    None => return Err(self.error("subquery in FROM must have an alias")),
                };
                return Ok(TableRef::Derived {
                    query: Box::new(query),
                    alias,
                });
            }
            let inner = self.parse_from()?;
            self.expect_token(&Token::RParen)?;
            return Ok(inner);
        }

        let name = self.parse_identifier()?;
        let alias = self.parse_optional_alias()?;
        Ok(TableRef::Table { name, alias })
    }

    fn parse_order_by_list(&mut self) -> Result<Vec<OrderByItem>> {
        let mut items = Vec::new();
        loop {
            let expr = self.parse_expr(0)?;
            let desc = if self.consume_keyword(Keyword::Desc) {
                true
            } else {
                self.consume_keyword(Keyword::Asc);
                false
            };
            let nulls_first = if self.consume_keyword(Keyword::Nulls) {
                if self.consume_keyword(Keyword::First) {
                    Some(true)
                } else {
                    self.expect_keyword(Keyword::Last)?;
                    Some(false)
                }
            } else {
                None
            };
            items.push(OrderByItem {
                expr,
                desc,
                nulls_first,
            });
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }
        Ok(items)
    }

    // ---------------------------------------------------------------------
    // DML
    // ---------------------------------------------------------------------

    fn parse_insert(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Insert)?;
        self.expect_keyword(Keyword::Into)?;
        let table = self.parse_identifier()?;

        let mut columns = Vec::new();
        if self.check_token(&Token::LParen)
            && !matches!(self.lexer.peek(), Token::Keyword(Keyword::Select | Keyword::With))
        {
            self.advance();
            columns = self.parse_identifier_list()?;
            self.expect_token(&Token::RParen)?;
        }

        let source = if self.consume_keyword(Keyword::Values) {
            let mut rows = Vec::new();
            loop {
                self.expect_token(&Token::LParen)?;
                rows.push(self.parse_expr_list()?);
                self.expect_token(&Token::RParen)?;
                if !self.consume_token(&Token::Comma) {
                    break;
                }
            }
            InsertSource::Values(rows)
        } else if self.check_keyword(Keyword::Select)
            || self.check_keyword(Keyword::With)
            || self.check_token(&Token::LParen)
        {
            InsertSource::Query(Box::new(self.parse_query()?))
        } else {
            return Err(self.unexpected("VALUES or SELECT"));
        };

        Ok(Statement::Insert(Insert {
            table,
            columns,
            source,
        }))
    }

    fn parse_update(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Update)?;
        let table = self.parse_identifier()?;
        let alias = if self.check_keyword(Keyword::Set) {
            None
        } else {
            self.parse_optional_alias()?
        };
        self.expect_keyword(Keyword::Set)?;

        let mut assignments = Vec::new();
        loop {
            let mut column = self.parse_identifier()?;
            if self.consume_token(&Token::Dot) {
                column = self.parse_identifier()?;
            }
            self.expect_token(&Token::Eq)?;
            let value = self.parse_expr(0)?;
            assignments.push((column, value));
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }

        let selection = if self.consume_keyword(Keyword::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };

        Ok(Statement::Update(Update {
            table,
            alias,
            assignments,
            selection,
        }))
    }

    fn parse_delete(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Delete)?;
        self.expect_keyword(Keyword::From)?;
        let table = self.parse_identifier()?;
        let alias = if self.check_keyword(Keyword::Where) {
            None
        } else {
            self.parse_optional_alias()?
        };
        let selection = if self.consume_keyword(Keyword::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        Ok(Statement::Delete(Delete {
            table,
            alias,
            selection,
        }))
    }

    // ---------------------------------------------------------------------
    // DDL
    // ---------------------------------------------------------------------

    fn parse_create(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Create)?;
        if self.consume_keyword(Keyword::Table) {
            return self.parse_create_table();
        }
        let unique = self.consume_keyword(Keyword::Unique);
        if self.consume_keyword(Keyword::Index) {
            return self.parse_create_index(unique);
        }
        Err(self.unexpected("TABLE or INDEX"))
    }

    fn parse_if_not_exists(&mut self) -> Result<bool> {
        if self.consume_keyword(Keyword::If) {
            self.expect_keyword(Keyword::Not)?;
            self.expect_keyword(Keyword::Exists)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn parse_create_table(&mut self) -> Result<Statement> {
        let if_not_exists = self.parse_if_not_exists()?;
        let name = self.parse_identifier()?;
        self.expect_token(&Token::LParen)?;

        let mut columns = Vec::new();
        let mut primary_key = Vec::new();
        let mut unique = Vec::new();
        loop {
            if self.consume_keyword(Keyword::Primary) {
                self.expect_keyword(Keyword::Key)?;
                self.expect_token(&Token::LParen)?;
                primary_key = self.parse_identifier_list()?;
                self.expect_token(&Token::RParen)?;
            } else if self.consume_keyword(Keyword::Unique) {
                self.expect_token(&Token::LParen)?;
                unique.push(self.parse_identifier_list()?);
                self.expect_token(&Token::RParen)?;
            } else {
                columns.push(self.parse_column_spec()?);
            }
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }
        self.expect_token(&Token::RParen)?;

        Ok(Statement::CreateTable(CreateTable {
            name,
            if_not_exists,
            columns,
            primary_key,
            unique,
        }))
    }

    fn parse_column_spec(&mut self) -> Result<ColumnSpec> {
        let name = self.parse_identifier()?;
        let data_type = self.parse_data_type()?;
        let mut decl = ColumnSpec {
            name,
            data_type,
            not_null: false,
            primary_key: false,
            unique: false,
            default: None,
        };

        loop {
            if self.consume_keyword(Keyword::Primary) {
                self.expect_keyword(Keyword::Key)?;
                decl.primary_key = true;
            } else if self.consume_keyword(Keyword::Not) {
                self.expect_keyword(Keyword::Null)?;
                decl.not_null = true;
            } else if self.consume_keyword(Keyword::Null) {
                decl.not_null = false;
            } else if self.consume_keyword(Keyword::Unique) {
                decl.unique = true;
            } else if self.consume_keyword(Keyword::Default) {
                decl.default = Some(self.parse_expr(8)?);
            } else {
                break;
            }
        }
        Ok(decl)
    }

    fn parse_create_index(&mut self, unique: bool) -> Result<Statement> {
        let if_not_exists = self.parse_if_not_exists()?;
        let name = self.parse_identifier()?;
        self.expect_keyword(Keyword::On)?;
        let table = self.parse_identifier()?;

        let mut method = None;
        if self.consume_keyword(Keyword::Using) {
            method = Some(self.parse_identifier()?.to_ascii_lowercase());
        }

        self.expect_token(&Token::LParen)?;
        let columns = self.parse_identifier_list()?;
        self.expect_token(&Token::RParen)?;

        if method.is_none() && self.consume_keyword(Keyword::Using) {
            method = Some(self.parse_identifier()?.to_ascii_lowercase());
        }

        let mut options = Vec::new();
        if self.consume_keyword(Keyword::With) {
            self.expect_token(&Token::LParen)?;
            loop {
                let key = self.parse_identifier()?.to_ascii_lowercase();
                self.expect_token(&Token::Eq)?;
                let value = self.parse_option_value()?;
                options.push((key, value));
                if !self.consume_token(&Token::Comma) {
                    break;
                }
            }
            self.expect_token(&Token::RParen)?;
        }

        Ok(Statement::CreateIndex(CreateIndex {
            name,
            table,
            columns,
            unique,
            if_not_exists,
            method,
            options,
        }))
    }

    fn parse_option_value(&mut self) -> Result<String> {
        let value = match self.current {
            Token::String(s) => unescape(s),
            Token::Integer(s) | Token::Float(s) | Token::Ident(s) | Token::QuotedIdent(s) => s.to_string(),
            Token::Keyword(k) => k.as_str().to_string(),
            _ => return Err(self.unexpected("an option value")),
        };
        self.advance();
        Ok(value)
    }

    fn parse_drop(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Drop)?;
        let is_table = if self.consume_keyword(Keyword::Table) {
            true
        } else if self.consume_keyword(Keyword::Index) {
            false
        } else {
            return Err(self.unexpected("TABLE or INDEX"));
        };

        let if_exists = if self.consume_keyword(Keyword::If) {
            self.expect_keyword(Keyword::Exists)?;
            true
        } else {
            false
        };
        let name = self.parse_identifier()?;

        Ok(if is_table {
            Statement::DropTable { name, if_exists }
        } else {
            Statement::DropIndex { name, if_exists }
        })
    }

    fn parse_pragma(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Pragma)?;
        let name = self.parse_identifier()?.to_ascii_lowercase();
        let value = if self.consume_token(&Token::Eq) {
            Some(self.parse_option_value()?)
        } else if self.consume_token(&Token::LParen) {
            let value = self.parse_option_value()?;
            self.expect_token(&Token::RParen)?;
            Some(value)
        } else {
            None
        };
        Ok(Statement::Pragma { name, value })
    }

    fn parse_data_type(&mut self) -> Result<DataType> {
        let name = match self.current {
            Token::Ident(s) => s.to_ascii_uppercase(),
            _ => return Err(self.unexpected("a type name")),
        };
        self.advance();

        let data_type = match name.as_str() {
            "INTEGER" | "INT" | "BIGINT" | "SMALLINT" | "TINYINT" | "INT8" | "INT4" => DataType::Integer,
            "FLOAT" | "REAL" | "DOUBLE" | "DECIMAL" | "NUMERIC" | "FLOAT8" | "FLOAT4" => {
                if name == "DOUBLE"
                    && matches!(self.current, Token::Ident(s) if s.eq_ignore_ascii_case("PRECISION"))
                {
                    self.advance();
                }
                DataType::Float
            }
            "TEXT" | "VARCHAR" | "CHAR" | "STRING" | "CHARACTER" => DataType::Text,
            "BOOLEAN" | "BOOL" => DataType::Boolean,
            "TIMESTAMP" | "DATETIME" | "DATE" | "TIMESTAMPTZ" => DataType::Timestamp,
            "JSON" | "JSONB" => DataType::Json,
            "VECTOR" => {
                self.expect_token(&Token::LParen)?;
                let dims = match self.current {
                    Token::Integer(s) => s.parse::<u32>().ok().filter(|d| *d > 0),
                    _ => None,
                };
                let Some(dims) = dims else {
                    return Err(self.unexpected("a positive vector dimension"));
                };
                self.advance();
                self.expect_token(&Token::RParen)?;
                return Ok(DataType::Vector(dims));
            }
            other => return Err(self.error(format!("unknown data type '{}'", other))),
        };

        // Length and precision modifiers such as VARCHAR(255) are accepted
        // and ignored.
        if self.consume_token(&Token::LParen) {
            while !self.check_token(&Token::RParen) {
                if self.is_at_end() {
                    return Err(self.unexpected("')'"));
                }
                self.advance();
            }
            self.advance();
        }
        Ok(data_type)
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    pub fn parse_expr(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let op = match self.current {
                Token::Plus => Some((BinaryOp::Add, 10, 11)),
                Token::Minus => Some((BinaryOp::Sub, 10, 11)),
                Token::Star => Some((BinaryOp::Mul, 12, 13)),
                Token::Slash => Some((BinaryOp::Div, 12, 13)),
                Token::Percent => Some((BinaryOp::Mod, 12, 13)),
                Token::DoublePipe => Some((BinaryOp::Concat, 8, 9)),
                Token::Eq => Some((BinaryOp::Eq, 6, 7)),
                Token::NotEq => Some((BinaryOp::NotEq, 6, 7)),
                Token::Lt => Some((BinaryOp::Lt, 6, 7)),
                Token::LtEq => Some((BinaryOp::LtEq, 6, 7)),
                Token::Gt => Some((BinaryOp::Gt, 6, 7)),
                Token::GtEq => Some((BinaryOp::GtEq, 6, 7)),
                Token::Keyword(Keyword::And) => Some((BinaryOp::And, 3, 4)),
                Token::Keyword(Keyword::Or) => Some((BinaryOp::Or, 1, 2)),
                _ => None,
            };

            if let Some((op, l_bp, r_bp)) = op {
                if l_bp < min_bp {
                    break;
                }
                self.advance();
                let rhs = self.parse_expr(r_bp)?;
                lhs = Expr::binary(lhs, op, rhs);
                continue;
            }

            if self.check_keyword(Keyword::Is) {
                if 6 < min_bp {
                    break;
                }
                self.advance();
                let negated = self.consume_keyword(Keyword::Not);
                self.expect_keyword(Keyword::Null)?;
                lhs = Expr::IsNull {
                    expr: Box::new(lhs),
                    negated,
                };
                continue;
            }

            let negated_predicate = self.check_keyword(Keyword::Not)
                && matches!(
                    self.lexer.peek(),
                    Token::Keyword(Keyword::Between | Keyword::In | Keyword::Like)
                );
            if negated_predicate
                || self.check_keyword(Keyword::Between)
                || self.check_keyword(Keyword::In)
                || self.check_keyword(Keyword::Like)
            {
                if 6 < min_bp {
                    break;
                }
                let negated = self.consume_keyword(Keyword::Not);
                lhs = self.parse_predicate(lhs, negated)?;
                continue;
            }

            if self.check_token(&Token::DoubleColon) {
                if 18 < min_bp {
                    break;
                }
                self.advance();
                let data_type = self.parse_data_type()?;
                lhs = Expr::Cast {
                    expr: Box::new(lhs),
                    data_type,
                };
                continue;
            }

            break;
        }

        Ok(lhs)
    }

    fn parse_predicate(&mut self, lhs: Expr, negated: bool) -> Result<Expr> {
        if self.consume_keyword(Keyword::Between) {
            let low = self.parse_expr(7)?;
            self.expect_keyword(Keyword::And)?;
            let high = self.parse_expr(7)?;
            return Ok(Expr::Between {
                expr: Box::new(lhs),
                low: Box::new(low),
                high: Box::new(high),
                negated,
            });
        }

        if self.consume_keyword(Keyword::In) {
            self.expect_token(&Token::LParen)?;
            if self.check_keyword(Keyword::Select) || self.check_keyword(Keyword::With) {
                let query = self.parse_query()?;
                self.expect_token(&Token::RParen)?;
                return Ok(Expr::InSubquery {
                    expr: Box::new(lhs),
                    query: Box::new(query),
                    negated,
                });
            }
            let list = self.parse_expr_list()?;
            self.expect_token(&Token::RParen)?;
            return Ok(Expr::InList {
                expr: Box::new(lhs),
                list,
                negated,
            });
        }

        self.expect_keyword(Keyword::Like)?;
        let pattern = self.parse_expr(7)?;
        Ok(Expr::Like {
            expr: Box::new(lhs),
            pattern: Box::new(pattern),
            negated,
        })
    }

    fn parse_prefix(&mut self) -> Result<Expr> {
        match self.current {
            Token::Keyword(Keyword::Not) => {
                self.advance();
                if self.consume_keyword(Keyword::Exists) {
                    let query = self.parse_parenthesized_query()?;
                    return Ok(Expr::Exists {
                        query: Box::new(query),
                        negated: true,
                    });
                }
                let expr = self.parse_expr(5)?;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(expr),
                })
            }
            Token::Minus => {
                self.advance();
                let expr = self.parse_expr(14)?;
                Ok(match expr {
                    Expr::Literal(Literal::Integer(i)) => Expr::Literal(Literal::Integer(-i)),
                    Expr::Literal(Literal::Float(f)) => Expr::Literal(Literal::Float(-f)),
                    other => Expr::Unary {
                        op: UnaryOp::Neg,
                        expr: Box::new(other),
                    },
                })
            }
            Token::Plus => {
                self.advance();
                self.parse_expr(14)
            }
            Token::Integer(s) => {
                self.advance();
                Ok(Expr::Literal(match s.parse::<i64>() {
                    Ok(i) => Literal::Integer(i),
                    Err(_) => Literal::Float(s.parse::<f64>().unwrap_or(f64::INFINITY)),
                }))
            }
            Token::Float(s) => {
                let value = s
                    .parse::<f64>()
                    .map_err(|_| self.error(format!("invalid number '{}'", s)))?;
                self.advance();
                Ok(Expr::Literal(Literal::Float(value)))
            }
            Token::HexNumber(s) => {
                let value = i64::from_str_radix(s, 16)
                    .map_err(|_| self.error(format!("hex literal 0x{} out of range", s)))?;
                self.advance();
                Ok(Expr::Literal(Literal::Integer(value)))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(unescape(s))))
            }
            Token::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::Literal(Literal::Boolean(true)))
            }
            Token::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::Literal(Literal::Boolean(false)))
            }
            Token::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Expr::Literal(Literal::Null))
            }
            Token::Parameter(param) => {
                self.advance();
                let param = match param {
                    Parameter::Positional(n) => ParamRef::Positional(n),
                    Parameter::Anonymous => {
                        self.anonymous_params += 1;
                        ParamRef::Positional(self.anonymous_params)
                    }
                    Parameter::Named { sigil, name } => ParamRef::Named {
                        sigil,
                        name: name.to_string(),
                    },
                };
                Ok(Expr::Param(param))
            }
            Token::LParen => {
                self.advance();
                if self.check_keyword(Keyword::Select) || self.check_keyword(Keyword::With) {
                    let query = self.parse_query()?;
                    self.expect_token(&Token::RParen)?;
                    return Ok(Expr::Subquery(Box::new(query)));
                }
                let expr = self.parse_expr(0)?;
                self.expect_token(&Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => {
                self.advance();
                let items = if self.check_token(&Token::RBracket) {
                    Vec::new()
                } else {
                    self.parse_expr_list()?
                };
                self.expect_token(&Token::RBracket)?;
                Ok(Expr::Vector(items))
            }
            Token::Keyword(Keyword::Exists) => {
                self.advance();
                let query = self.parse_parenthesized_query()?;
                Ok(Expr::Exists {
                    query: Box::new(query),
                    negated: false,
                })
            }
            Token::Keyword(Keyword::Case) => self.parse_case(),
            Token::Keyword(Keyword::Cast) => {
                self.advance();
                self.expect_token(&Token::LParen)?;
                let expr = self.parse_expr(0)?;
                self.expect_keyword(Keyword::As)?;
                let data_type = self.parse_data_type()?;
                self.expect_token(&Token::RParen)?;
                Ok(Expr::Cast {
                    expr: Box::new(expr),
                    data_type,
                })
            }
            Token::Keyword(Keyword::Left) if self.lexer.peek() == Token::LParen => {
                self.advance();
                self.parse_function_call("LEFT".to_string())
            }
            _ if self.is_identifier() => self.parse_identifier_expr(),
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_parenthesized_query(&mut self) -> Result<Query> {
        self.expect_token(&Token::LParen)?;
        let query = self.parse_query()?;
        self.expect_token(&Token::RParen)?;
        Ok(query)
    }

    fn parse_identifier_expr(&mut self) -> Result<Expr> {
        let name = self.parse_identifier()?;

        if self.check_token(&Token::LParen) {
            self.advance();
            return self.parse_function_call(name.to_ascii_uppercase());
        }

        if self.consume_token(&Token::Dot) {
            let column = self.parse_identifier()?;
            return Ok(Expr::Column {
                table: Some(name),
                name: column,
            });
        }

        if name.eq_ignore_ascii_case("CURRENT_TIMESTAMP") {
            return Ok(Expr::Function(FunctionCall {
                name: "NOW".to_string(),
                args: Vec::new(),
                distinct: false,
                star: false,
                over: None,
            }));
        }

        Ok(Expr::Column { table: None, name })
    }

    /// Parses the argument list after `name(`.
    fn parse_function_call(&mut self, name: String) -> Result<Expr> {
        let mut call = FunctionCall {
            name,
            args: Vec::new(),
            distinct: false,
            star: false,
            over: None,
        };

        if self.consume_token(&Token::Star) {
            call.star = true;
        } else if !self.check_token(&Token::RParen) {
            call.distinct = self.consume_keyword(Keyword::Distinct);
            call.args = self.parse_expr_list()?;
        }
        self.expect_token(&Token::RParen)?;

        if self.consume_keyword(Keyword::Over) {
            call.over = Some(self.parse_window_spec()?);
        }
        Ok(Expr::Function(call))
    }

    fn parse_window_spec(&mut self) -> Result<WindowSpec> {
        self.expect_token(&Token::LParen)?;

        let mut partition_by = Vec::new();
        if self.consume_keyword(Keyword::Partition) {
            self.expect_keyword(Keyword::By)?;
            partition_by = self.parse_expr_list()?;
        }

        let mut order_by = Vec::new();
        if self.consume_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            order_by = self.parse_order_by_list()?;
        }

        let frame = if self.consume_keyword(Keyword::Rows) {
            if self.consume_keyword(Keyword::Between) {
                let start = self.parse_frame_bound()?;
                self.expect_keyword(Keyword::And)?;
                let end = self.parse_frame_bound()?;
                Some(WindowFrame { start, end })
            } else {
                let start = self.parse_frame_bound()?;
                Some(WindowFrame {
                    start,
                    end: FrameBound::CurrentRow,
                })
            }
        } else {
            None
        };

        self.expect_token(&Token::RParen)?;
        Ok(WindowSpec {
            partition_by,
            order_by,
            frame,
        })
    }

    fn parse_frame_bound(&mut self) -> Result<FrameBound> {
        if self.consume_keyword(Keyword::Unbounded) {
            if self.consume_keyword(Keyword::Preceding) {
                return Ok(FrameBound::UnboundedPreceding);
            }
            self.expect_keyword(Keyword::Following)?;
            return Ok(FrameBound::UnboundedFollowing);
        }
        if self.consume_keyword(Keyword::Current) {
            self.expect_keyword(Keyword::Row)?;
            return Ok(FrameBound::CurrentRow);
        }

        let offset = match self.current {
            Token::Integer(s) => s.parse::<u64>().ok(),
            _ => None,
        };
        let Some(offset) = offset else {
            return Err(self.unexpected("a frame bound"));
        };
        self.advance();
        if self.consume_keyword(Keyword::Preceding) {
            return Ok(FrameBound::Preceding(offset));
        }
        self.expect_keyword(Keyword::Following)?;
        Ok(FrameBound::Following(offset))
    }

    fn parse_case(&mut self) -> Result<Expr> {
        self.expect_keyword(Keyword::Case)?;
        let operand = if self.check_keyword(Keyword::When) {
            None
        } else {
            Some(Box::new(self.parse_expr(0)?))
        };

        let mut branches = Vec::new();
        while self.consume_keyword(Keyword::When) {
            let condition = self.parse_expr(0)?;
            self.expect_keyword(Keyword::Then)?;
            let result = self.parse_expr(0)?;
            branches.push((condition, result));
        }
        if branches.is_empty() {
            return Err(self.unexpected("WHEN"));
        }

        let else_result = if self.consume_keyword(Keyword::Else) {
            Some(Box::new(self.parse_expr(0)?))
        } else {
            None
        };
        self.expect_keyword(Keyword::End)?;

        Ok(Expr::Case {
            operand,
            branches,
            else_result,
        })
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>> {
        let mut exprs = Vec::new();
        loop {
            exprs.push(self.parse_expr(0)?);
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }
        Ok(exprs)
    }

    fn is_identifier(&self) -> bool {
        match self.current {
            Token::Ident(_) | Token::QuotedIdent(_) => true,
            Token::Keyword(k) => k.is_unreserved(),
            _ => false,
        }
    }

    fn parse_identifier(&mut self) -> Result<String> {
        let name = match self.current {
            Token::Ident(s) | Token::QuotedIdent(s) => s.to_string(),
            Token::Keyword(k) if k.is_unreserved() => {
                let span = self.lexer.span();
                self.input[span.start..span.end()].to_string()
            }
            _ => return Err(self.unexpected("an identifier")),
        };
        self.advance();
        Ok(name)
    }

    fn parse_identifier_list(&mut self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        loop {
            names.push(self.parse_identifier()?);
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }
        Ok(names)
    }
}

fn unescape(body: &str) -> String {
    body.replace("''", "'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn parse(sql: &str) -> Statement {
        parse_statement(sql).unwrap()
    }

    fn select(sql: &str) -> Select {
        match parse(sql) {
            Statement::Select(query) => match query.body {
                SetExpr::Select(select) => *select,
                other => panic!("expected plain select, got {:?}", other),
            },
            other => panic!("expected select, got {:?}", other),
        }
    }

    fn where_clause(sql: &str) -> Expr {
        select(sql).selection.unwrap()
    }

    #[test]
    fn select_item_text_and_alias() {
        let s = select("SELECT COUNT(*) as cnt, name, price * 2 FROM t");
        match &s.projection[0] {
            SelectItem::Expr { alias, text, .. } => {
                assert_eq!(alias.as_deref(), Some("cnt"));
                assert_eq!(text, "COUNT(*)");
            }
            other => panic!("unexpected {:?}", other),
        }
        match &s.projection[2] {
            SelectItem::Expr { text, alias, .. } => {
                assert_eq!(text, "price * 2");
                assert!(alias.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn qualified_wildcard() {
        let s = select("SELECT u.* FROM users u");
        assert_eq!(s.projection, vec![SelectItem::QualifiedWildcard("u".into())]);
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = where_clause("SELECT 1 FROM t WHERE a = 1 OR b = 2 AND c = 3");
        match expr {
            Expr::Binary { op: BinaryOp::Or, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::And, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn not_applies_to_whole_comparison() {
        let expr = where_clause("SELECT 1 FROM t WHERE NOT a = 1");
        match expr {
            Expr::Unary { op: UnaryOp::Not, expr } => {
                assert!(matches!(*expr, Expr::Binary { op: BinaryOp::Eq, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn negated_predicates() {
        assert!(matches!(
            where_clause("SELECT 1 FROM t WHERE a NOT BETWEEN 1 AND 2"),
            Expr::Between { negated: true, .. }
        ));
        assert!(matches!(
            where_clause("SELECT 1 FROM t WHERE a NOT IN (1, 2)"),
            Expr::InList { negated: true, .. }
        ));
        assert!(matches!(
            where_clause("SELECT 1 FROM t WHERE a NOT LIKE 'x%'"),
            Expr::Like { negated: true, .. }
        ));
        assert!(matches!(
            where_clause("SELECT 1 FROM t WHERE a IS NOT NULL"),
            Expr::IsNull { negated: true, .. }
        ));
        assert!(matches!(
            where_clause("SELECT 1 FROM t WHERE NOT EXISTS (SELECT 1 FROM u)"),
            Expr::Exists { negated: true, .. }
        ));
    }

    #[test]
    fn between_bounds_stop_at_and() {
        let expr = where_clause("SELECT 1 FROM t WHERE a BETWEEN 1 AND 5 AND b = 2");
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn anonymous_parameters_are_numbered() {
        let s = select("SELECT ? + ?");
        match &s.projection[0] {
            SelectItem::Expr { expr: Expr::Binary { left, right, .. }, .. } => {
                assert_eq!(**left, Expr::Param(ParamRef::Positional(1)));
                assert_eq!(**right, Expr::Param(ParamRef::Positional(2)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn named_parameter_keeps_sigil() {
        let expr = where_clause("SELECT 1 FROM t WHERE id = :id");
        match expr {
            Expr::Binary { right, .. } => assert_eq!(
                *right,
                Expr::Param(ParamRef::Named {
                    sigil: ':',
                    name: "id".into()
                })
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn joins_nest_left_to_right() {
        let s = select("SELECT * FROM a JOIN b ON a.id = b.a_id LEFT JOIN c ON c.id = b.c_id, d");
        match s.from.unwrap() {
            TableRef::Join { kind: JoinKind::Cross, left, .. } => match *left {
                TableRef::Join { kind: JoinKind::Left, left, .. } => {
                    assert!(matches!(*left, TableRef::Join { kind: JoinKind::Inner, .. }))
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn window_function_with_frame() {
        let s = select(
            "SELECT SUM(x) OVER (PARTITION BY g ORDER BY t ROWS BETWEEN 2 PRECEDING AND 1 FOLLOWING) FROM t",
        );
        match &s.projection[0] {
            SelectItem::Expr { expr: Expr::Function(call), .. } => {
                let over = call.over.as_ref().unwrap();
                assert_eq!(over.partition_by.len(), 1);
                assert_eq!(
                    over.frame,
                    Some(WindowFrame {
                        start: FrameBound::Preceding(2),
                        end: FrameBound::Following(1),
                    })
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn union_with_order_and_limit() {
        match parse("SELECT a FROM t UNION ALL SELECT b FROM u ORDER BY 1 LIMIT 3 OFFSET 1") {
            Statement::Select(query) => {
                assert!(matches!(query.body, SetExpr::Union { all: true, .. }));
                assert_eq!(query.order_by.len(), 1);
                assert!(query.limit.is_some() && query.offset.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn cte_list() {
        match parse("WITH a AS (SELECT 1), b (x) AS (SELECT * FROM a) SELECT * FROM b") {
            Statement::Select(query) => {
                assert_eq!(query.ctes.len(), 2);
                assert_eq!(query.ctes[1].columns, vec!["x".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn create_table_with_constraints() {
        match parse(
            "CREATE TABLE IF NOT EXISTS docs (id INTEGER PRIMARY KEY, title VARCHAR(100) NOT NULL, \
             score FLOAT DEFAULT -1.5, embedding VECTOR(3))",
        ) {
            Statement::CreateTable(create) => {
                assert!(create.if_not_exists);
                assert!(create.columns[0].primary_key);
                assert!(create.columns[1].not_null);
                assert_eq!(
                    create.columns[2].default,
                    Some(Expr::Literal(Literal::Float(-1.5)))
                );
                assert_eq!(create.columns[3].data_type, DataType::Vector(3));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn create_hnsw_index() {
        match parse("CREATE INDEX idx_emb ON docs(embedding) USING HNSW WITH (metric = 'cosine', m = 8)") {
            Statement::CreateIndex(index) => {
                assert_eq!(index.method.as_deref(), Some("hnsw"));
                assert_eq!(
                    index.options,
                    vec![
                        ("metric".to_string(), "cosine".to_string()),
                        ("m".to_string(), "8".to_string()),
                    ]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn insert_forms() {
        match parse("INSERT INTO t (a, b) VALUES (1, 'x'), (2, 'it''s')") {
            Statement::Insert(insert) => match insert.source {
                InsertSource::Values(rows) => {
                    assert_eq!(rows.len(), 2);
                    assert_eq!(rows[1][1], Expr::Literal(Literal::String("it's".into())));
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            parse("INSERT INTO t SELECT * FROM u"),
            Statement::Insert(Insert { source: InsertSource::Query(_), .. })
        ));
    }

    #[test]
    fn transaction_and_utility_statements() {
        assert_eq!(parse("BEGIN TRANSACTION"), Statement::Begin);
        assert_eq!(parse("COMMIT;"), Statement::Commit);
        assert_eq!(parse("ROLLBACK"), Statement::Rollback);
        assert_eq!(parse("SHOW TABLES"), Statement::ShowTables);
        assert_eq!(
            parse("PRAGMA synchronous = OFF"),
            Statement::Pragma {
                name: "synchronous".into(),
                value: Some("OFF".into())
            }
        );
    }

    #[test]
    fn unreserved_keywords_work_as_names() {
        let s = select("SELECT key, first FROM tables");
        assert_eq!(s.projection.len(), 2);
    }

    #[test]
    fn errors_are_parse_errors_with_position() {
        let err = parse_statement("SELECTX * FROM foo").unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Parse));

        let err = parse_statement("SELECT * FROM t WHERE").unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Parse));

        let err = parse_statement("SELECT 1; SELECT 2").unwrap_err();
        assert!(err.to_string().contains("after end of statement"));
    }
}
