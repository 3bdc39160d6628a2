//! SQL identifier utilities
//!
//! Quoting and validation for table and column identifiers, plus generation of
//! prefixed ids for tables, fields, views, forms and select options.

use std::sync::LazyLock;

use regex::Regex;

/// Columns managed by the engine on every underlying table
pub const RESERVED_COLUMNS: &[&str] = &["id", "created_at", "updated_at"];

/// PostgreSQL reserved keywords that cannot be used as unquoted identifiers
pub const POSTGRES_RESERVED_WORDS: &[&str] = &[
    "ALL",
    "ANALYSE",
    "ANALYZE",
    "AND",
    "ANY",
    "ARRAY",
    "AS",
    "ASC",
    "ASYMMETRIC",
    "BOTH",
    "CASE",
    "CAST",
    "CHECK",
    "COLLATE",
    "COLUMN",
    "CONSTRAINT",
    "CREATE",
    "CURRENT_CATALOG",
    "CURRENT_DATE",
    "CURRENT_ROLE",
    "CURRENT_TIME",
    "CURRENT_TIMESTAMP",
    "CURRENT_USER",
    "DEFAULT",
    "DEFERRABLE",
    "DESC",
    "DISTINCT",
    "DO",
    "ELSE",
    "END",
    "EXCEPT",
    "FALSE",
    "FETCH",
    "FOR",
    "FOREIGN",
    "FROM",
    "GRANT",
    "GROUP",
    "HAVING",
    "IN",
    "INITIALLY",
    "INTERSECT",
    "INTO",
    "LATERAL",
    "LEADING",
    "LIMIT",
    "LOCALTIME",
    "LOCALTIMESTAMP",
    "NOT",
    "NULL",
    "OFFSET",
    "ON",
    "ONLY",
    "OR",
    "ORDER",
    "PLACING",
    "PRIMARY",
    "REFERENCES",
    "RETURNING",
    "SELECT",
    "SESSION_USER",
    "SOME",
    "SYMMETRIC",
    "TABLE",
    "THEN",
    "TO",
    "TRAILING",
    "TRUE",
    "UNION",
    "UNIQUE",
    "USER",
    "USING",
    "VARIADIC",
    "WHEN",
    "WHERE",
    "WINDOW",
    "WITH",
];

static IDENTIFIER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("identifier pattern compiles"));

/// Maximum identifier length accepted by PostgreSQL without truncation
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Quote a SQL identifier to make it safe for use in queries
///
/// # Example
/// ```
/// use runtara_table_store::sql::quote_identifier;
///
/// assert_eq!(quote_identifier("tbltest"), "\"tbltest\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Validate a table or column identifier
///
/// Rules:
/// - Must start with a lowercase letter
/// - Can only contain lowercase letters, numbers, and underscores
/// - At most 63 characters
/// - Cannot be a PostgreSQL reserved word
/// - Cannot be one of `reserved_columns`
///
/// # Example
/// ```
/// use runtara_table_store::sql::validate_identifier;
///
/// assert!(validate_identifier("tbltest", &[]).is_ok());
/// assert!(validate_identifier("select", &[]).is_err());
/// assert!(validate_identifier("id", &["id"]).is_err());
/// ```
pub fn validate_identifier(name: &str, reserved_columns: &[&str]) -> Result<(), String> {
    if name.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(format!(
            "Identifier '{}' is longer than {} characters",
            name, MAX_IDENTIFIER_LENGTH
        ));
    }

    if !IDENTIFIER_PATTERN.is_match(name) {
        return Err(format!(
            "Identifier '{}' is invalid. Must start with a lowercase letter and contain only lowercase letters, numbers, and underscores.",
            name
        ));
    }

    if POSTGRES_RESERVED_WORDS.contains(&name.to_uppercase().as_str()) {
        return Err(format!(
            "Identifier '{}' is a PostgreSQL reserved keyword and cannot be used.",
            name
        ));
    }

    if reserved_columns.contains(&name) {
        return Err(format!(
            "Column name '{}' is reserved and cannot be used.",
            name
        ));
    }

    Ok(())
}

/// Generate a new identifier with the given prefix, e.g. `fld1a2b3c4d`
pub fn generate_id(prefix: &str) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, &uuid[..8])
}

/// Escape `%`, `_` and `\` so a value matches literally inside a LIKE pattern
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
