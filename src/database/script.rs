//! Splitting multi-statement scripts.
//!
//! Statements are separated at `;` tokens produced by the SQL lexer, so
//! semicolons inside string literals, quoted identifiers and comments do
//! not split. Pieces holding no tokens (blank lines, lone comments, `;;`)
//! are dropped.

use crate::sql::{Lexer, Token};

/// Splits `script` into statement texts, each without its terminating `;`.
pub fn split_statements(script: &str) -> Vec<&str> {
    let mut lexer = Lexer::new(script);
    let mut statements = Vec::new();
    let mut start: Option<usize> = None;

    loop {
        let token = lexer.next_token();
        let token_start = lexer.span().start;
        match token {
            Token::Eof => break,
            Token::Semicolon => {
                if let Some(begin) = start.take() {
                    statements.push(script[begin..token_start].trim());
                }
            }
            _ => {
                start.get_or_insert(token_start);
            }
        }
    }
    if let Some(begin) = start {
        statements.push(script[begin..].trim());
    }
    statements
}

/// True when `text` ends with a `;` that terminates a statement, as
/// opposed to one inside an unfinished literal or comment.
pub fn is_complete(text: &str) -> bool {
    let mut lexer = Lexer::new(text);
    let mut last = Token::Eof;
    loop {
        match lexer.next_token() {
            Token::Eof => break,
            Token::Error(_) => return false,
            token => last = token,
        }
    }
    last == Token::Semicolon
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_top_level_semicolons() {
        let script = "CREATE TABLE t (a TEXT);\n-- note; not a split\nINSERT INTO t VALUES ('x;y'); ;; SELECT * FROM t";
        assert_eq!(
            split_statements(script),
            vec![
                "CREATE TABLE t (a TEXT)",
                "INSERT INTO t VALUES ('x;y')",
                "SELECT * FROM t",
            ]
        );
    }

    #[test]
    fn block_comments_and_blank_input() {
        assert!(split_statements("  /* ; */ ; \n").is_empty());
        assert_eq!(split_statements("SELECT 1 /* ; */;"), vec!["SELECT 1 /* ; */"]);
    }

    #[test]
    fn completeness() {
        assert!(is_complete("SELECT 1;"));
        assert!(!is_complete("SELECT 'a;"));
        assert!(!is_complete("SELECT 1"));
        assert!(is_complete("SELECT 1; -- trailing"));
    }
}
