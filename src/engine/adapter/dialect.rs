//! SQL Dialect
//!
//! Controls how projected column references are rendered. Only identifier
//! quoting differs between dialects; the caller's own fragment is passed
//! through verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Sqlite,
    Postgres,
    Mysql,
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlDialect::Sqlite => write!(f, "sqlite"),
            SqlDialect::Postgres => write!(f, "postgres"),
            SqlDialect::Mysql => write!(f, "mysql"),
        }
    }
}

impl SqlDialect {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(SqlDialect::Sqlite),
            "postgres" | "postgresql" | "pg" => Some(SqlDialect::Postgres),
            "mysql" | "mariadb" => Some(SqlDialect::Mysql),
            _ => None,
        }
    }

    /// Quote an identifier, doubling any embedded quote character
    pub fn quote_identifier(&self, ident: &str) -> String {
        match self {
            SqlDialect::Sqlite | SqlDialect::Postgres => {
                format!("\"{}\"", ident.replace('"', "\"\""))
            }
            SqlDialect::Mysql => format!("`{}`", ident.replace('`', "``")),
        }
    }

    /// Render `qualifier.column`, quoting both parts when asked to
    pub fn qualify(&self, qualifier: &str, column: &str, quote: bool) -> String {
        if quote {
            format!(
                "{}.{}",
                self.quote_identifier(qualifier),
                self.quote_identifier(column)
            )
        } else {
            format!("{}.{}", qualifier, column)
        }
    }
}
