use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Statement keywords that disqualify a query from being read-only.
const FORBIDDEN_KEYWORDS: [&str; 11] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "GRANT", "REVOKE",
    "EXECUTE", "EXEC",
];

static FORBIDDEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"(?i)\b({})\b", FORBIDDEN_KEYWORDS.join("|"));
    Regex::new(&pattern).unwrap()
});

static LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\b").unwrap());

static TRAILING_SEMICOLON_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r";\s*$").unwrap());

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("query must start with SELECT")]
    NotSelect,
    #[error("query contains forbidden keyword: {0}")]
    ForbiddenKeyword(String),
}

/// Checks that `sql` is a plausible read-only SELECT statement.
///
/// This is a textual blocklist, not a parser: a keyword inside a string
/// literal will trip it, and it cannot prove safety on its own. The
/// read-only database role is the real security boundary; this check is
/// defense in depth in front of it.
pub fn validate(sql: &str) -> Result<(), ValidationError> {
    let trimmed = sql.trim();

    if !trimmed.to_uppercase().starts_with("SELECT") {
        return Err(ValidationError::NotSelect);
    }

    // First violation found is the one reported.
    if let Some(found) = FORBIDDEN_RE.find(trimmed) {
        return Err(ValidationError::ForbiddenKeyword(
            found.as_str().to_uppercase(),
        ));
    }

    Ok(())
}

/// Appends ` LIMIT 20` unless the text already carries a LIMIT token.
///
/// Purely textual: a LIMIT inside a subquery or string literal counts as
/// present. A single trailing semicolon is stripped before appending.
pub fn ensure_limit(sql: &str) -> String {
    apply_limit(sql, 20)
}

/// Same transform with a caller-chosen row cap; the agent test tool uses
/// a cap of 1.
pub fn apply_limit(sql: &str, max_rows: u32) -> String {
    if LIMIT_RE.is_match(sql) {
        return sql.to_string();
    }

    let clean = TRAILING_SEMICOLON_RE.replace(sql, "");
    format!("{} LIMIT {}", clean, max_rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_select() {
        assert!(validate("SELECT id FROM users").is_ok());
        assert!(validate("  select count(*) from t  ").is_ok());
    }

    #[test]
    fn rejects_non_select() {
        assert!(matches!(
            validate("WITH x AS (SELECT 1) SELECT * FROM x"),
            Err(ValidationError::NotSelect)
        ));
        assert!(matches!(validate(""), Err(ValidationError::NotSelect)));
    }

    #[test]
    fn rejects_forbidden_keyword_anywhere() {
        let err = validate("select 1; DROP TABLE x").unwrap_err();
        match err {
            ValidationError::ForbiddenKeyword(kw) => assert_eq!(kw, "DROP"),
            other => panic!("unexpected error: {other}"),
        }

        assert!(validate("SELECT * FROM t WHERE id IN (SELECT id FROM s); DELETE FROM t").is_err());
    }

    #[test]
    fn keyword_must_match_whole_word() {
        // "updated_at" contains UPDATE as a substring but not as a word.
        assert!(validate("SELECT updated_at FROM users").is_ok());
        assert!(validate("SELECT created_at, deleted_flag FROM events").is_ok());
    }

    #[test]
    fn ensure_limit_appends_when_missing() {
        assert_eq!(ensure_limit("SELECT id FROM t"), "SELECT id FROM t LIMIT 20");
    }

    #[test]
    fn ensure_limit_is_idempotent() {
        let once = ensure_limit("SELECT id FROM t");
        assert_eq!(ensure_limit(&once), once);
    }

    #[test]
    fn ensure_limit_strips_trailing_semicolon() {
        assert_eq!(ensure_limit("SELECT 1;"), "SELECT 1 LIMIT 20");
        assert_eq!(ensure_limit("SELECT 1;   "), "SELECT 1 LIMIT 20");
    }

    #[test]
    fn ensure_limit_leaves_existing_limit() {
        assert_eq!(
            ensure_limit("SELECT id FROM t LIMIT 5"),
            "SELECT id FROM t LIMIT 5"
        );
        assert_eq!(
            ensure_limit("select id from t limit 5"),
            "select id from t limit 5"
        );
    }

    #[test]
    fn apply_limit_supports_test_cap() {
        assert_eq!(apply_limit("SELECT id FROM t;", 1), "SELECT id FROM t LIMIT 1");
    }
}
