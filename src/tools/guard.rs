//! Dangerous operation guard for the query tool.
//!
//! Statements are classified by their leading keyword only. This is a
//! heuristic: leading comments, or a forbidden statement placed after a
//! semicolon, are not detected.

use std::fmt;

/// `error` text of every guard rejection envelope.
pub const DANGEROUS_OPERATION: &str = "Dangerous operation detected";

/// Statement kinds that are never executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenKind {
    Drop,
    Truncate,
    Alter,
    Delete,
}

impl ForbiddenKind {
    pub const ALL: [ForbiddenKind; 4] = [Self::Drop, Self::Truncate, Self::Alter, Self::Delete];

    /// Keyword as it appears in SQL.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Drop => "DROP",
            Self::Truncate => "TRUNCATE",
            Self::Alter => "ALTER",
            Self::Delete => "DELETE",
        }
    }

    /// Explanation placed in the `message` field of a rejection.
    pub fn message(&self) -> String {
        format!(
            "{} operations are not allowed for safety reasons",
            self.keyword()
        )
    }
}

impl fmt::Display for ForbiddenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Outcome of classifying a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Blocked before reaching the database.
    Forbidden(ForbiddenKind),
    /// Unbounded SELECT; a row limit must be appended.
    RequiresRewrite,
    /// Runs exactly as submitted.
    Safe,
}

/// Classify a statement by its leading keyword.
///
/// # Examples
///
/// ```
/// use pg_mcp_server::tools::guard::{classify, Classification, ForbiddenKind};
///
/// assert_eq!(classify("drop table users"), Classification::Forbidden(ForbiddenKind::Drop));
/// assert_eq!(classify("SELECT * FROM users"), Classification::RequiresRewrite);
/// assert_eq!(classify("SELECT * FROM users LIMIT 5"), Classification::Safe);
/// assert_eq!(classify("INSERT INTO users (name) VALUES ('a')"), Classification::Safe);
/// ```
pub fn classify(sql: &str) -> Classification {
    let normalized = sql.trim().to_uppercase();

    for kind in ForbiddenKind::ALL {
        let keyword = kind.keyword();
        if normalized
            .strip_prefix(keyword)
            .is_some_and(|rest| rest.starts_with(' '))
        {
            return Classification::Forbidden(kind);
        }
    }

    if normalized.starts_with("SELECT")
        && !normalized.contains("LIMIT")
        && !normalized.contains("FETCH")
    {
        return Classification::RequiresRewrite;
    }

    Classification::Safe
}

/// Append a row limit to the original statement text.
pub fn apply_row_limit(sql: &str, limit: i64) -> String {
    format!("{} LIMIT {}", sql, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_prefixes() {
        assert_eq!(
            classify("DROP TABLE users"),
            Classification::Forbidden(ForbiddenKind::Drop)
        );
        assert_eq!(
            classify("truncate users"),
            Classification::Forbidden(ForbiddenKind::Truncate)
        );
        assert_eq!(
            classify("  Alter table users add column x int"),
            Classification::Forbidden(ForbiddenKind::Alter)
        );
        assert_eq!(
            classify("\n\tdelete from users where id = 1"),
            Classification::Forbidden(ForbiddenKind::Delete)
        );
    }

    #[test]
    fn test_keyword_needs_trailing_space() {
        assert_eq!(classify("DROPPED"), Classification::Safe);
        assert_eq!(classify("DELETE"), Classification::Safe);
        assert_eq!(classify("ALTERNATIVE"), Classification::Safe);
    }

    #[test]
    fn test_known_evasions_pass_the_prefix_check() {
        assert_eq!(
            classify("/* hi */ DROP TABLE users"),
            Classification::Safe
        );
        assert_eq!(
            classify("SELECT 1 LIMIT 1; DROP TABLE users"),
            Classification::Safe
        );
    }

    #[test]
    fn test_select_without_limit_requires_rewrite() {
        assert_eq!(
            classify("SELECT * FROM users"),
            Classification::RequiresRewrite
        );
        assert_eq!(
            classify("  select id from users  "),
            Classification::RequiresRewrite
        );
    }

    #[test]
    fn test_select_with_limit_or_fetch_is_safe() {
        assert_eq!(classify("SELECT * FROM users limit 5"), Classification::Safe);
        assert_eq!(
            classify("SELECT * FROM users FETCH FIRST 5 ROWS ONLY"),
            Classification::Safe
        );
        // substring match, not token match
        assert_eq!(classify("SELECT unlimited FROM plans"), Classification::Safe);
    }

    #[test]
    fn test_non_select_statements_are_safe() {
        assert_eq!(
            classify("INSERT INTO users (name) VALUES ($1)"),
            Classification::Safe
        );
        assert_eq!(
            classify("UPDATE users SET name = 'x' WHERE id = 1"),
            Classification::Safe
        );
        assert_eq!(
            classify("WITH t AS (SELECT 1) SELECT * FROM t"),
            Classification::Safe
        );
    }

    #[test]
    fn test_apply_row_limit_preserves_original_text() {
        assert_eq!(
            apply_row_limit("  select * from users  ", 1000),
            "  select * from users   LIMIT 1000"
        );
    }

    #[test]
    fn test_forbidden_kind_message() {
        assert_eq!(
            ForbiddenKind::Drop.message(),
            "DROP operations are not allowed for safety reasons"
        );
        assert_eq!(ForbiddenKind::Delete.to_string(), "DELETE");
    }
}
