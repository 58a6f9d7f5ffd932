use serde::{Deserialize, Serialize};
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::debug;

const READ_KEYWORD: &str = "select";

#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GatePolicy {
    /// Leading `SELECT` keyword only. Chained statements after a leading
    /// `SELECT` are not detected.
    #[default]
    Prefix,
    Strict,
}

impl GatePolicy {
    pub fn admits(self, statement: &str) -> bool {
        match self {
            GatePolicy::Prefix => is_admissible(statement),
            GatePolicy::Strict => is_admissible(statement) && is_single_read_query(statement),
        }
    }
}

pub fn is_admissible(statement: &str) -> bool {
    statement
        .trim_start()
        .get(..READ_KEYWORD.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(READ_KEYWORD))
}

pub fn to_ast(statement: &str) -> Result<Vec<Statement>, sqlparser::parser::ParserError> {
    let dialect = PostgreSqlDialect {};
    Parser::parse_sql(&dialect, statement)
}

pub fn is_single_read_query(statement: &str) -> bool {
    let statements = match to_ast(statement) {
        Ok(statements) => statements,
        Err(err) => {
            debug!("Statement failed to parse: {err}");
            return false;
        }
    };
    match statements.as_slice() {
        [Statement::Query(query)] => is_read_only(query),
        _ => false,
    }
}

fn is_read_only(query: &Query) -> bool {
    if !query.locks.is_empty() {
        return false;
    }
    if let Some(with) = &query.with {
        if !with.cte_tables.iter().all(|cte| is_read_only(&cte.query)) {
            return false;
        }
    }
    is_read_only_body(&query.body)
}

fn is_read_only_body(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => is_read_only(query),
        SetExpr::SetOperation { left, right, .. } => {
            is_read_only_body(left) && is_read_only_body(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_admits_select_in_any_case() {
        for statement in [
            "SELECT 1",
            "select count(*) from customers",
            "  \n\tSeLeCt name FROM customers",
        ] {
            assert!(is_admissible(statement), "{statement}");
        }
    }

    #[test]
    fn prefix_rejects_everything_else() {
        for statement in [
            "DROP TABLE customers;",
            "delete from customers",
            "WITH x AS (SELECT 1) SELECT * FROM x",
            "",
            "   ",
            "sel",
            "-- SELECT\nDROP TABLE customers",
        ] {
            assert!(!is_admissible(statement), "{statement}");
        }
    }

    #[test]
    fn prefix_does_not_catch_chained_statements() {
        assert!(GatePolicy::Prefix.admits("SELECT 1; DROP TABLE customers"));
    }

    #[test]
    fn strict_rejects_chained_statements() {
        assert!(!GatePolicy::Strict.admits("SELECT 1; DROP TABLE customers"));
    }

    #[test]
    fn strict_admits_plain_queries() {
        for statement in [
            "SELECT COUNT(*) FROM customers WHERE city='Austin';",
            "select c.name, sum(o.qty * o.price) from customers c join order_items o on o.phone = c.phone group by c.name",
            "SELECT city FROM customers UNION SELECT sku FROM order_items",
        ] {
            assert!(GatePolicy::Strict.admits(statement), "{statement}");
        }
    }

    #[test]
    fn strict_rejects_writes_hidden_in_queries() {
        for statement in [
            "SELECT * INTO backup FROM customers",
            "SELECT * FROM customers FOR UPDATE",
            "SELECT * FROM (",
        ] {
            assert!(!GatePolicy::Strict.admits(statement), "{statement}");
        }
    }
}
