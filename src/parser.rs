//! SQL helpers: statement classification and display rendering.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::params::QuotedParams;

/// Statement kind, as reported in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlOperation {
    Select,
    Insert,
    Update,
    Delete,
    /// Table definition changes: `CREATE`, `DROP`, `ALTER`, `TRUNCATE`.
    Schema,
    /// Transaction control: `BEGIN`, `COMMIT`, `ROLLBACK` and savepoints.
    Transaction,
    Other,
}

/// Leading keywords, checked in order against the upper-cased statement start.
const KEYWORDS: &[(&str, SqlOperation)] = &[
    ("SELECT", SqlOperation::Select),
    ("WITH", SqlOperation::Select),
    ("INSERT", SqlOperation::Insert),
    ("UPDATE", SqlOperation::Update),
    ("DELETE", SqlOperation::Delete),
    ("CREATE", SqlOperation::Schema),
    ("DROP", SqlOperation::Schema),
    ("ALTER", SqlOperation::Schema),
    ("TRUNCATE", SqlOperation::Schema),
    ("BEGIN", SqlOperation::Transaction),
    ("START", SqlOperation::Transaction),
    ("COMMIT", SqlOperation::Transaction),
    ("ROLLBACK", SqlOperation::Transaction),
    ("SAVEPOINT", SqlOperation::Transaction),
    ("RELEASE", SqlOperation::Transaction),
];

impl SqlOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlOperation::Select => "SELECT",
            SqlOperation::Insert => "INSERT",
            SqlOperation::Update => "UPDATE",
            SqlOperation::Delete => "DELETE",
            SqlOperation::Schema => "DDL",
            SqlOperation::Transaction => "TRANSACTION",
            SqlOperation::Other => "QUERY",
        }
    }

    /// Regex whose first group names the statement's primary table.
    fn table_pattern(&self) -> Option<&'static Regex> {
        let index = match self {
            SqlOperation::Select => 0,
            SqlOperation::Insert => 1,
            SqlOperation::Update => 2,
            SqlOperation::Delete => 3,
            SqlOperation::Schema => 4,
            SqlOperation::Transaction | SqlOperation::Other => return None,
        };
        TABLE_PATTERNS.get(index)
    }
}

impl std::fmt::Display for SqlOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// An optionally quoted identifier: "users", `users`, [users] or users.
macro_rules! table_ident {
    ($prefix:literal) => {
        concat!(r#"(?i)\b"#, $prefix, r#"\s+[`"\[]?(\w+)[`"\]]?"#)
    };
}

static TABLE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        table_ident!("FROM"),
        table_ident!(r"INSERT\s+INTO"),
        table_ident!("UPDATE"),
        table_ident!(r"DELETE\s+FROM"),
        table_ident!(
            r"(?:CREATE\s+(?:TEMP(?:ORARY)?\s+)?TABLE(?:\s+IF\s+NOT\s+EXISTS)?|DROP\s+TABLE(?:\s+IF\s+EXISTS)?|ALTER\s+TABLE|TRUNCATE(?:\s+TABLE)?)"
        ),
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

/// Classify a statement by its leading keyword.
pub fn parse_operation(sql: &str) -> SqlOperation {
    let head: String = sql.trim_start().chars().take(15).collect::<String>().to_uppercase();
    KEYWORDS
        .iter()
        .find(|(keyword, _)| head.starts_with(keyword))
        .map_or(SqlOperation::Other, |&(_, operation)| operation)
}

/// The statement's primary table, lower-cased, if one can be found.
pub fn extract_table(sql: &str) -> Option<String> {
    parse_operation(sql)
        .table_pattern()?
        .captures(sql)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Operation and table of a statement, for log fields.
#[derive(Debug)]
pub struct ParsedSql {
    pub operation: SqlOperation,
    pub table: Option<String>,
}

impl ParsedSql {
    pub fn parse(sql: &str) -> Self {
        Self {
            operation: parse_operation(sql),
            table: extract_table(sql),
        }
    }

    /// `"{OPERATION} {table}"`, or just the operation when no table was found.
    pub fn label(&self) -> String {
        match &self.table {
            Some(table) => format!("{} {}", self.operation, table),
            None => self.operation.to_string(),
        }
    }
}

/// Whether the statement is a read query: the trimmed, lower-cased SQL starts with `select`.
///
/// Unlike [`parse_operation`], CTEs (`WITH ...`) are not treated as reads.
pub fn is_select(sql: &str) -> bool {
    sql.trim().to_lowercase().starts_with("select")
}

// Quoted literals and `::` are matched first so their contents and PostgreSQL casts
// are not taken for placeholders.
static PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"'(?:[^']|'')*'|%%|::|%\((\w+)\)s|%s|\$(\d+)|\?|:([A-Za-z_]\w*)"#).unwrap()
});

/// Substitute quoted parameters into `sql` for display.
///
/// Understands `%s`/`%(name)s` (pyformat), `?` (qmark), `$1` (numeric) and `:name`
/// placeholders. Placeholders without a matching parameter are left as written.
///
/// The rendering is best-effort and only meant for display. Single-quoted literals are
/// copied through (with `%%` collapsed), but operators that look like placeholders,
/// such as PostgreSQL's `jsonb ? key`, are still substituted.
pub fn interpolate(sql: &str, params: Option<&QuotedParams>) -> String {
    let Some(params) = params else {
        return sql.to_string();
    };

    let mut next_positional = 0;
    PLACEHOLDER_REGEX
        .replace_all(sql, |caps: &Captures<'_>| {
            let token = &caps[0];
            if token.starts_with('\'') {
                return token.replace("%%", "%");
            }
            let value = if token == "%%" {
                Some("%")
            } else if token == "::" {
                None
            } else if let Some(name) = caps.get(1).or_else(|| caps.get(3)) {
                params.named(name.as_str())
            } else if let Some(index) = caps.get(2) {
                index
                    .as_str()
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| params.positional(i))
            } else {
                let value = params.positional(next_positional);
                next_positional += 1;
                value
            };
            value.unwrap_or(token).to_string()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{quote_params, Param};

    #[test]
    fn test_parse_operation_by_keyword() {
        assert_eq!(parse_operation("  select id from orders"), SqlOperation::Select);
        assert_eq!(parse_operation("WITH cte AS (SELECT 1) SELECT * FROM cte"), SqlOperation::Select);
        assert_eq!(parse_operation("START TRANSACTION"), SqlOperation::Transaction);
        assert_eq!(parse_operation("rollback"), SqlOperation::Transaction);
        assert_eq!(parse_operation("ALTER TABLE users ADD COLUMN age int"), SqlOperation::Schema);
        assert_eq!(parse_operation("VACUUM"), SqlOperation::Other);
    }

    #[test]
    fn test_extract_table() {
        assert_eq!(extract_table(r#"SELECT * FROM "Users" u JOIN orders o ON u.id = o.user_id"#), Some("users".to_string()));
        assert_eq!(extract_table("INSERT INTO [grades] (score) VALUES (?)"), Some("grades".to_string()));
        assert_eq!(extract_table("DELETE FROM `sessions` WHERE id = %s"), Some("sessions".to_string()));
        assert_eq!(extract_table("CREATE TEMP TABLE IF NOT EXISTS scratch (id int)"), Some("scratch".to_string()));
        assert_eq!(extract_table("TRUNCATE audit_log"), Some("audit_log".to_string()));
        assert_eq!(extract_table("COMMIT"), None);
    }

    #[test]
    fn test_parsed_sql_label() {
        assert_eq!(ParsedSql::parse("UPDATE students SET name = $1").label(), "UPDATE students");
        assert_eq!(ParsedSql::parse("SET search_path TO app").label(), "QUERY");
        assert_eq!(ParsedSql::parse("DROP TABLE IF EXISTS scratch").label(), "DDL scratch");
        assert_eq!(ParsedSql::parse("COMMIT").label(), "TRANSACTION");
        assert_eq!(ParsedSql::parse("EXPLAIN SELECT 1").label(), "QUERY");
    }

    #[test]
    fn test_is_select() {
        assert!(is_select("SELECT 1"));
        assert!(is_select("  \n select id from users"));
        assert!(!is_select("INSERT INTO users (name) VALUES ('a')"));
        assert!(!is_select("update users set name = 'a'"));
        assert!(!is_select("DELETE FROM users"));
        assert!(!is_select("WITH cte AS (SELECT 1) SELECT * FROM cte"));
    }

    #[test]
    fn test_interpolate_pyformat() {
        let params = Param::list([Param::Int(1), Param::from("O'Brien")]);
        let quoted = quote_params(Some(&params));
        assert_eq!(
            interpolate("SELECT * FROM users WHERE id = %s AND name = %s", quoted.as_ref()),
            "SELECT * FROM users WHERE id = 1 AND name = 'O''Brien'"
        );
    }

    #[test]
    fn test_interpolate_named() {
        let params = Param::map([("name", Param::from("bob")), ("age", Param::Int(30))]);
        let quoted = quote_params(Some(&params));
        assert_eq!(
            interpolate("SELECT * FROM people WHERE name = %(name)s AND age > :age", quoted.as_ref()),
            "SELECT * FROM people WHERE name = 'bob' AND age > 30"
        );
    }

    #[test]
    fn test_interpolate_numeric_and_qmark() {
        let params = Param::list([Param::Int(7), Param::from("x")]);
        let quoted = quote_params(Some(&params));
        assert_eq!(
            interpolate("UPDATE t SET a = $2 WHERE id = $1", quoted.as_ref()),
            "UPDATE t SET a = 'x' WHERE id = 7"
        );
        assert_eq!(
            interpolate("UPDATE t SET a = ? WHERE id = ?", quoted.as_ref()),
            "UPDATE t SET a = 7 WHERE id = 'x'"
        );
    }

    #[test]
    fn test_interpolate_keeps_casts_and_unmatched_placeholders() {
        let params = Param::list([Param::Int(3)]);
        let quoted = quote_params(Some(&params));
        assert_eq!(
            interpolate("SELECT $1::int, $2, '100%%'", quoted.as_ref()),
            "SELECT 3::int, $2, '100%'"
        );
    }

    #[test]
    fn test_interpolate_skips_string_literals() {
        let params = Param::list([Param::Int(9)]);
        let quoted = quote_params(Some(&params));
        assert_eq!(
            interpolate("SELECT '?', 'it''s :late' FROM t WHERE id = ?", quoted.as_ref()),
            "SELECT '?', 'it''s :late' FROM t WHERE id = 9"
        );
    }

    #[test]
    fn test_interpolate_without_params() {
        assert_eq!(interpolate("SELECT %s", None), "SELECT %s");
    }
}
