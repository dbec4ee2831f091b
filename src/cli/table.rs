//! # ASCII Table Formatter
//!
//! Renders a [`QueryResult`] as an ASCII table:
//!
//! ```text
//! +----+-------+---------------------+
//! | id | name  | emb                 |
//! +----+-------+---------------------+
//! | 1  | Alice | [1.000, 0.000, 0.0… |
//! +----+-------+---------------------+
//! ```
//!
//! Columns are as wide as their widest cell, capped at
//! `MAX_COLUMN_WIDTH` characters; longer cells end in `...`.

use std::fmt::Write;

use crate::database::QueryResult;
use crate::types::Value;

const MAX_COLUMN_WIDTH: usize = 50;
const VECTOR_PREVIEW: usize = 4;

pub struct TableFormatter {
    headers: Vec<String>,
    widths: Vec<usize>,
    rows: Vec<Vec<String>>,
}

impl TableFormatter {
    pub fn new(result: &QueryResult) -> Self {
        let headers = result.columns.clone();
        let mut widths: Vec<usize> = headers
            .iter()
            .map(|h| h.chars().count().clamp(1, MAX_COLUMN_WIDTH))
            .collect();

        let rows: Vec<Vec<String>> = result
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(i, value)| {
                        let cell = format_value(value);
                        if let Some(width) = widths.get_mut(i) {
                            *width = (*width).max(cell.chars().count()).min(MAX_COLUMN_WIDTH);
                        }
                        cell
                    })
                    .collect()
            })
            .collect();

        Self {
            headers,
            widths,
            rows,
        }
    }

    pub fn render(&self) -> String {
        let mut output = String::new();
        self.write_separator(&mut output);
        self.write_row(&mut output, &self.headers);
        self.write_separator(&mut output);
        for row in &self.rows {
            self.write_row(&mut output, row);
        }
        self.write_separator(&mut output);
        output
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn write_separator(&self, output: &mut String) {
        output.push('+');
        for width in &self.widths {
            output.push_str(&"-".repeat(width + 2));
            output.push('+');
        }
        output.push('\n');
    }

    fn write_row(&self, output: &mut String, cells: &[String]) {
        output.push('|');
        for (i, cell) in cells.iter().enumerate() {
            let width = self.widths.get(i).copied().unwrap_or(1);
            let _ = write!(output, " {:<width$} |", truncate(cell, width), width = width);
        }
        output.push('\n');
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Float(f) => {
            let text = format!("{:.6}", f);
            text.trim_end_matches('0').trim_end_matches('.').to_string()
        }
        Value::Vector(v) if v.len() > VECTOR_PREVIEW => {
            let head: Vec<String> = v[..VECTOR_PREVIEW].iter().map(|c| format!("{:.3}", c)).collect();
            format!("[{}, ... ({} dims)]", head.join(", "), v.len())
        }
        Value::Vector(v) => {
            let parts: Vec<String> = v.iter().map(|c| format!("{:.3}", c)).collect();
            format!("[{}]", parts.join(", "))
        }
        other => other.to_string(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let mut result: String = s.chars().take(max_len - 3).collect();
        result.push_str("...");
        result
    }
}
