use sqlparser::ast::Statement as SqlStatement;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::config::Role;

/// Whether a statement only reads or may change data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// Statement metadata supplied by the persistence layer for each call
#[derive(Debug, Clone)]
pub struct Statement {
    /// Raw SQL text
    pub sql: String,
    /// Explicit access mode; classified from `sql` when absent
    pub mode: Option<AccessMode>,
    /// Whether the caller is inside a transaction
    pub in_transaction: bool,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            mode: None,
            in_transaction: false,
        }
    }

    /// Statement known to be read-only
    pub fn read(sql: impl Into<String>) -> Self {
        Self {
            mode: Some(AccessMode::Read),
            ..Self::new(sql)
        }
    }

    /// Statement known to mutate
    pub fn write(sql: impl Into<String>) -> Self {
        Self {
            mode: Some(AccessMode::Write),
            ..Self::new(sql)
        }
    }

    pub fn with_transaction(mut self, in_transaction: bool) -> Self {
        self.in_transaction = in_transaction;
        self
    }

    pub fn access_mode(&self) -> AccessMode {
        classify(self)
    }
}

/// Classify a statement as read or write. An explicit mode always wins.
pub fn classify(statement: &Statement) -> AccessMode {
    match statement.mode {
        Some(mode) => mode,
        None => classify_sql(&statement.sql),
    }
}

/// Classify raw SQL.
///
/// Plain queries are reads; locking reads (`FOR UPDATE`/`FOR SHARE`), DML,
/// DDL, session statements and anything unparseable are writes.
pub fn classify_sql(sql: &str) -> AccessMode {
    let trimmed = sql.trim();

    // Quick check for introspection statements
    let first = trimmed
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    if matches!(first.as_str(), "SHOW" | "DESCRIBE" | "DESC" | "EXPLAIN") {
        return AccessMode::Read;
    }

    match Parser::parse_sql(&MySqlDialect {}, trimmed) {
        Ok(statements) if !statements.is_empty() && statements.iter().all(is_read_only) => {
            AccessMode::Read
        }
        Ok(_) => AccessMode::Write,
        Err(e) => {
            debug!(error = %e, "Unparseable statement, treating as write");
            AccessMode::Write
        }
    }
}

fn is_read_only(statement: &SqlStatement) -> bool {
    match statement {
        SqlStatement::Query(query) => query.locks.is_empty(),
        _ => false,
    }
}

/// Read-write splitter
pub struct RwSplitter;

impl RwSplitter {
    /// Role that should serve a call with the given access mode
    pub fn route(mode: AccessMode, in_transaction: bool) -> Role {
        // Always use primary when in transaction
        if in_transaction {
            return Role::Primary;
        }

        match mode {
            AccessMode::Read => Role::Replica,
            AccessMode::Write => Role::Primary,
        }
    }

    /// Role for a statement
    pub fn route_statement(statement: &Statement) -> Role {
        Self::route(classify(statement), statement.in_transaction)
    }
}
