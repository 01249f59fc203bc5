//! Read-only SQL guard
//!
//! Layered checks run before any generated or user-typed SQL reaches the
//! database:
//!
//! 1. no data- or schema-modifying keyword appears as a bare word (string
//!    literals and quoted identifiers are not scanned);
//! 2. the text parses as exactly one `SELECT`/`WITH`/`VALUES` query;
//! 3. no `SELECT ... INTO`, in any arm of a set operation;
//! 4. every referenced relation is in the allow-list, or names a CTE that
//!    is in scope where it is referenced.
//!
//! Execution additionally happens inside a `READ ONLY` transaction.

use std::collections::HashSet;
use std::ops::ControlFlow;

use sqlparser::ast::{ObjectName, Query, SetExpr, Statement, Visit, Visitor};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::error::{HrError, Result};

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "ALTER", "ANALYZE", "ATTACH", "CALL", "CLUSTER", "COMMIT", "COPY", "CREATE",
    "DEALLOCATE", "DELETE", "DETACH", "DISCARD", "DO", "DROP", "EXECUTE", "GRANT", "IMPORT",
    "INSERT", "LISTEN", "LOAD", "LOCK", "MERGE", "NOTIFY", "PREPARE", "REASSIGN", "REFRESH",
    "REINDEX", "RESET", "REVOKE", "ROLLBACK", "SAVEPOINT", "SET", "TRUNCATE",
    "UPDATE", "VACUUM",
];

/// Functions that read or write outside the allow-listed tables
const FORBIDDEN_FUNCTIONS: &[&str] = &[
    "PG_READ_FILE", "PG_READ_BINARY_FILE", "PG_LS_DIR", "PG_SLEEP", "LO_IMPORT", "LO_EXPORT",
    "DBLINK", "DBLINK_EXEC", "PG_TERMINATE_BACKEND", "PG_CANCEL_BACKEND", "SET_CONFIG",
    "NEXTVAL", "SETVAL",
];

/// Function families that run SQL passed as a string or dump whole tables
const FORBIDDEN_FUNCTION_PREFIXES: &[&str] = &[
    "QUERY_TO_XML", "TABLE_TO_XML", "CURSOR_TO_XML", "DATABASE_TO_XML", "SCHEMA_TO_XML",
];

#[derive(Debug, Clone, Default)]
pub struct SqlGuard {
    /// Lower-cased table names; `None` allows any relation
    allowed: Option<HashSet<String>>,
}

impl SqlGuard {
    /// Guard that checks statement shape only
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard that additionally restricts which tables may be read
    pub fn with_allowed_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: Some(
                tables
                    .into_iter()
                    .map(|t| t.as_ref().to_ascii_lowercase())
                    .collect(),
            ),
        }
    }

    /// Validate `sql` and return it normalized (trimmed, no trailing `;`).
    pub fn check(&self, sql: &str) -> Result<String> {
        let sql = sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
        if sql.is_empty() {
            return Err(HrError::rejected("empty query"));
        }

        let dialect = PostgreSqlDialect {};
        let tokens = Tokenizer::new(&dialect, sql)
            .tokenize()
            .map_err(|e| HrError::rejected(format!("cannot tokenize SQL: {}", e)))?;
        scan_tokens(&tokens)?;

        let statements = Parser::parse_sql(&dialect, sql)
            .map_err(|e| HrError::rejected(format!("cannot parse SQL: {}", e)))?;
        let statement = match statements.as_slice() {
            [single] => single,
            [] => return Err(HrError::rejected("empty query")),
            _ => return Err(HrError::rejected("only a single statement is allowed")),
        };

        if !matches!(statement, Statement::Query(_)) {
            return Err(HrError::rejected("only SELECT queries are allowed"));
        }

        let mut visitor = ReadOnlyVisitor::new(self.allowed.as_ref());
        if let ControlFlow::Break(reason) = statement.visit(&mut visitor) {
            return Err(HrError::rejected(reason));
        }

        Ok(sql.to_string())
    }
}

/// A significant token for the scan below
enum Scanned {
    Word { upper: String, quoted: bool },
    Open,
    Other,
}

fn scan_tokens(tokens: &[Token]) -> Result<()> {
    let significant: Vec<Scanned> = tokens
        .iter()
        .filter_map(|token| match token {
            Token::Word(word) => Some(Scanned::Word {
                upper: word.value.to_ascii_uppercase(),
                quoted: word.quote_style.is_some(),
            }),
            Token::LParen => Some(Scanned::Open),
            Token::Whitespace(_) => None,
            _ => Some(Scanned::Other),
        })
        .collect();

    for (index, token) in significant.iter().enumerate() {
        let Scanned::Word { upper, quoted } = token else {
            continue;
        };
        // Quoted identifiers are names, not keywords
        if !quoted && FORBIDDEN_KEYWORDS.contains(&upper.as_str()) {
            return Err(HrError::rejected(format!(
                "'{}' is not allowed in a read-only query",
                upper
            )));
        }
        let called = matches!(significant.get(index + 1), Some(Scanned::Open));
        if called && is_forbidden_function(upper) {
            return Err(HrError::rejected(format!(
                "function '{}' is not allowed",
                upper.to_ascii_lowercase()
            )));
        }
    }
    Ok(())
}

fn is_forbidden_function(upper: &str) -> bool {
    FORBIDDEN_FUNCTIONS.contains(&upper)
        || FORBIDDEN_FUNCTION_PREFIXES
            .iter()
            .any(|prefix| upper.starts_with(prefix))
}

/// Last path segment, lower-cased with quotes removed: `public."Employees"` → `employees`
fn relation_name(name: &ObjectName) -> String {
    let rendered = name.to_string();
    let last = rendered.rsplit('.').next().unwrap_or(&rendered);
    last.trim_matches('"').to_ascii_lowercase()
}

/// `SELECT ... INTO` anywhere in a set expression, including every arm of
/// a `UNION`/`EXCEPT`/`INTERSECT`
fn selects_into(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_some(),
        SetExpr::SetOperation { left, right, .. } => selects_into(left) || selects_into(right),
        SetExpr::Query(query) => selects_into(&query.body),
        _ => false,
    }
}

/// Rejects `SELECT ... INTO` and checks relations against the allow-list.
///
/// CTE names are only in scope inside the query that declares them, so
/// each query pushes its names on entry and pops them on exit.
struct ReadOnlyVisitor<'a> {
    allowed: Option<&'a HashSet<String>>,
    cte_scopes: Vec<Vec<String>>,
}

impl<'a> ReadOnlyVisitor<'a> {
    fn new(allowed: Option<&'a HashSet<String>>) -> Self {
        Self {
            allowed,
            cte_scopes: Vec::new(),
        }
    }

    fn is_cte(&self, name: &str) -> bool {
        self.cte_scopes
            .iter()
            .any(|scope| scope.iter().any(|cte| cte == name))
    }
}

impl Visitor for ReadOnlyVisitor<'_> {
    type Break = String;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if selects_into(&query.body) {
            return ControlFlow::Break("SELECT ... INTO is not allowed".to_string());
        }
        let names = query
            .with
            .iter()
            .flat_map(|with| &with.cte_tables)
            .map(|cte| cte.alias.name.value.to_ascii_lowercase())
            .collect();
        self.cte_scopes.push(names);
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.cte_scopes.pop();
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        let Some(allowed) = self.allowed else {
            return ControlFlow::Continue(());
        };
        let name = relation_name(relation);
        // Schema-qualified names never refer to a CTE
        let bare = relation.0.len() == 1;
        if (bare && self.is_cte(&name)) || allowed.contains(&name) {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(format!("table '{}' is not available to queries", relation))
        }
    }
}
