//! Injection checks.
//!
//! The statement scan runs over the whole token stream before parsing, so a
//! terminator or comment is rejected no matter how deeply it is nested.

use std::collections::BTreeSet;

use super::error::{ExpressionError, ExpressionResult};
use super::lexer::{Token, TokenKind};

/// Functions callable from expressions unless extended by configuration.
pub const DEFAULT_FUNCTIONS: &[&str] = &[
    "UPPER",
    "LOWER",
    "TRIM",
    "LENGTH",
    "COALESCE",
    "NOW",
    "CURRENT_DATE",
    "CURRENT_TIME",
    "EXTRACT",
    "SUBSTRING",
    "POSITION",
    "CONCAT",
    "ABS",
    "ROUND",
    "NULLIF",
    "GREATEST",
    "LEAST",
    "DATE_TRUNC",
];

/// Statement keywords never allowed inside a sub-query.
const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "COPY", "EXECUTE",
];

/// Words that may precede `(` inside a sub-query without being a call.
const SUBQUERY_KEYWORDS: &[&str] = &[
    "FROM", "WHERE", "AS", "ON", "USING", "JOIN", "VALUES", "ANY", "ALL", "SOME", "UNION",
    "INTERSECT", "EXCEPT", "CASE", "WHEN", "THEN", "ELSE", "BY", "HAVING", "LIMIT", "OFFSET",
    "OVER", "FILTER", "WITHIN", "ROW", "ARRAY", "CAST", "DISTINCT", "LATERAL",
];

/// Aggregates callable inside a sub-query in addition to the allow-list.
const SUBQUERY_AGGREGATES: &[&str] = &[
    "COUNT", "SUM", "AVG", "MIN", "MAX", "BOOL_AND", "BOOL_OR", "EVERY", "STRING_AGG",
    "ARRAY_AGG",
];

const ADMIN_PREFIXES: &[&str] = &["PG_", "XP_", "DBLINK"];
const ADMIN_FUNCTIONS: &[&str] = &["LO_IMPORT", "LO_EXPORT"];

/// Rejects statement terminators and comments anywhere in the expression.
pub fn scan_tokens(tokens: &[Token]) -> ExpressionResult<()> {
    for token in tokens {
        match token.kind {
            TokenKind::Semicolon => {
                return Err(ExpressionError::security(
                    "statement terminator ';' (multiple statements) is not allowed",
                ))
            }
            TokenKind::Comment => {
                return Err(ExpressionError::security("SQL comments are not allowed"))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Rejects write statements and calls outside the allow-list inside sub-query text.
///
/// An identifier followed by `(` is a call unless it is a clause keyword or
/// an aggregate. Schema-qualified calls are never allowed.
pub fn scan_subquery(tokens: &[Token], allowed: &BTreeSet<String>) -> ExpressionResult<()> {
    for (i, token) in tokens.iter().enumerate() {
        let TokenKind::Ident(word) = &token.kind else {
            continue;
        };
        let upper = word.to_ascii_uppercase();
        if WRITE_KEYWORDS.contains(&upper.as_str()) {
            return Err(ExpressionError::security(format!(
                "'{}' is not allowed inside a sub-query",
                upper
            )));
        }
        if is_admin_function(&upper) {
            return Err(ExpressionError::security(format!(
                "administrative function '{}' is not allowed",
                word
            )));
        }

        let called = matches!(tokens.get(i + 1).map(|t| &t.kind), Some(TokenKind::LParen));
        if !called {
            continue;
        }
        match i.checked_sub(1).map(|p| &tokens[p].kind) {
            // `x::numeric(10, 2)` is a type modifier.
            Some(TokenKind::DoubleColon) => continue,
            Some(TokenKind::Dot) => {
                return Err(ExpressionError::security(format!(
                    "qualified function '{}' is not allowed inside a sub-query",
                    word
                )))
            }
            _ => {}
        }
        if SUBQUERY_KEYWORDS.contains(&upper.as_str())
            || SUBQUERY_AGGREGATES.contains(&upper.as_str())
        {
            continue;
        }
        check_function(word, allowed)?;
    }
    Ok(())
}

/// Checks a called function against the allow-list.
pub fn check_function(name: &str, allowed: &BTreeSet<String>) -> ExpressionResult<()> {
    let upper = name.to_ascii_uppercase();
    if is_admin_function(&upper) {
        return Err(ExpressionError::security(format!(
            "administrative function '{}' is not allowed",
            name
        )));
    }
    if !allowed.contains(&upper) {
        return Err(ExpressionError::security(format!(
            "function '{}' is not allowed",
            name
        )));
    }
    Ok(())
}

fn is_admin_function(upper: &str) -> bool {
    ADMIN_PREFIXES.iter().any(|p| upper.starts_with(p)) || ADMIN_FUNCTIONS.contains(&upper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::lexer::Lexer;

    fn allowed() -> BTreeSet<String> {
        DEFAULT_FUNCTIONS.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_scan_rejects_terminator_anywhere() {
        let tokens = Lexer::new("x IN (SELECT 1 FROM t WHERE (a = 1; DROP TABLE t))")
            .tokenize()
            .unwrap();
        assert!(matches!(scan_tokens(&tokens), Err(ExpressionError::Security { .. })));
    }

    #[test]
    fn test_subquery_write_keywords() {
        let tokens = Lexer::new("SELECT id FROM t UNION SELECT id FROM u").tokenize().unwrap();
        assert!(scan_subquery(&tokens, &allowed()).is_ok());

        let tokens = Lexer::new("SELECT pg_read_file('x')").tokenize().unwrap();
        assert!(scan_subquery(&tokens, &allowed()).is_err());

        let tokens = Lexer::new("SELECT 1 FROM t WHERE truncate").tokenize().unwrap();
        assert!(scan_subquery(&tokens, &allowed()).is_err());
    }

    #[test]
    fn test_subquery_calls_use_the_allow_list() {
        for query in [
            "SELECT query_to_xml('DELETE FROM crm.tb_contact RETURNING 1', true, true, '')",
            "SELECT set_config('role', 'postgres', false)",
            "SELECT 1 FROM t WHERE current_setting('app.user') = 'x'",
            "SELECT crm.purge(id) FROM t",
        ] {
            let tokens = Lexer::new(query).tokenize().unwrap();
            assert!(
                matches!(scan_subquery(&tokens, &allowed()), Err(ExpressionError::Security { .. })),
                "{query}"
            );
        }

        for query in [
            "SELECT count(*) FROM t WHERE lower(code) = 'a'",
            "SELECT max(total)::numeric(10, 2) FROM t WHERE id = ANY (SELECT id FROM u)",
            "SELECT 1 FROM t WHERE (a = 1) AND b IN (1, 2)",
            "SELECT CASE WHEN (a > 1) THEN 1 ELSE 0 END FROM t",
        ] {
            let tokens = Lexer::new(query).tokenize().unwrap();
            assert!(scan_subquery(&tokens, &allowed()).is_ok(), "{query}");
        }
    }

    #[test]
    fn test_function_allow_list() {
        assert!(check_function("upper", &allowed()).is_ok());
        assert!(check_function("XP_CMDSHELL", &allowed()).is_err());
        assert!(check_function("dblink_exec", &allowed()).is_err());
        assert!(check_function("md5", &allowed()).is_err());
    }
}
