//! Name resolution scopes.
//!
//! A scope lists the columns of an operator's output tuple in order, each
//! tagged with the table alias it came from. Base table scans append a
//! hidden `rowid` column, which `*` skips but a name can still reach.

use eyre::Result;

use crate::schema::TableDef;

#[derive(Debug, Clone)]
pub struct ScopeColumn {
    pub table: Option<String>,
    pub name: String,
    pub hidden: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    columns: Vec<ScopeColumn>,
}

impl Scope {
    pub fn for_table(def: &TableDef, alias: &str) -> Self {
        let mut columns: Vec<ScopeColumn> = def
            .columns()
            .iter()
            .map(|c| ScopeColumn {
                table: Some(alias.to_string()),
                name: c.name().to_string(),
                hidden: false,
            })
            .collect();
        columns.push(ScopeColumn {
            table: Some(alias.to_string()),
            name: "rowid".to_string(),
            hidden: true,
        });
        Self { columns }
    }

    /// Scope over a derived table, CTE or set operation output.
    pub fn named(alias: Option<&str>, names: &[String]) -> Self {
        Self {
            columns: names
                .iter()
                .map(|n| ScopeColumn {
                    table: alias.map(str::to_string),
                    name: n.clone(),
                    hidden: false,
                })
                .collect(),
        }
    }

    pub fn join(left: &Scope, right: &Scope) -> Self {
        let mut columns = left.columns.clone();
        columns.extend(right.columns.iter().cloned());
        Self { columns }
    }

    pub fn push(&mut self, column: ScopeColumn) {
        self.columns.push(column);
    }

    /// Appends a column that no name resolves to.
    pub fn push_anonymous(&mut self) {
        self.columns.push(ScopeColumn {
            table: None,
            name: String::new(),
            hidden: true,
        });
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[ScopeColumn] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> &ScopeColumn {
        &self.columns[index]
    }

    pub fn has_qualifier(&self, table: &str) -> bool {
        self.columns
            .iter()
            .any(|c| c.table.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(table)))
    }

    /// Resolves a possibly qualified name. A name matching more than one
    /// column is an error; no match is `Ok(None)`.
    pub fn resolve(&self, table: Option<&str>, name: &str) -> Result<Option<usize>> {
        if name.is_empty() {
            return Ok(None);
        }
        let mut found = None;
        for (i, column) in self.columns.iter().enumerate() {
            if !column.name.eq_ignore_ascii_case(name) {
                continue;
            }
            if let Some(table) = table {
                if !column.table.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(table)) {
                    continue;
                }
            }
            if found.is_some() {
                schema_bail!("column reference '{}' is ambiguous", name);
            }
            found = Some(i);
        }
        Ok(found)
    }

    /// Positions `*` expands to, optionally limited to one alias.
    pub fn wildcard(&self, table: Option<&str>) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.hidden)
            .filter(|(_, c)| match table {
                Some(t) => c.table.as_deref().is_some_and(|q| q.eq_ignore_ascii_case(t)),
                None => true,
            })
            .map(|(i, _)| i)
            .collect()
    }
}
