use sqlparser::ast::{self, Expr, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::model::*;

/// Parsed command from SQL input. The caller is never part of the statement;
/// it comes from the authenticated session.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertAccommodation {
        metadata: String,
        price_per_night: Amount,
    },
    UpdatePrice {
        accommodation_id: AccommodationId,
        price_per_night: Amount,
    },
    UpdateListing {
        accommodation_id: AccommodationId,
        listed: bool,
    },
    InsertBooking {
        accommodation_id: AccommodationId,
        start: Timestamp,
        end: Timestamp,
        payment: Amount,
    },
    CheckIn {
        booking_id: BookingId,
    },
    SelectAccommodations {
        id: Option<AccommodationId>,
    },
    SelectMyAccommodations,
    SelectMyBookings,
    SelectUnavailable {
        accommodation_id: AccommodationId,
    },
    SelectEvents {
        after: u64,
    },
}

impl Command {
    /// Whether the command returns rows (drives the extended-protocol describe).
    pub fn is_query(&self) -> bool {
        !matches!(
            self,
            Command::UpdatePrice { .. } | Command::UpdateListing { .. } | Command::CheckIn { .. }
        )
    }
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "accommodations" => {
            let v = bind_columns("accommodations", insert, values, &["metadata", "price_per_night"])?;
            Ok(Command::InsertAccommodation {
                metadata: parse_string(&v[0])?,
                price_per_night: parse_u64(&v[1])?,
            })
        }
        "prices" => {
            let v = bind_columns("prices", insert, values, &["accommodation_id", "price_per_night"])?;
            Ok(Command::UpdatePrice {
                accommodation_id: parse_u64(&v[0])?,
                price_per_night: parse_u64(&v[1])?,
            })
        }
        "listings" => {
            let v = bind_columns("listings", insert, values, &["accommodation_id", "listed"])?;
            Ok(Command::UpdateListing {
                accommodation_id: parse_u64(&v[0])?,
                listed: parse_bool(&v[1])?,
            })
        }
        "bookings" => {
            let v = bind_columns(
                "bookings",
                insert,
                values,
                &["accommodation_id", "start", "end", "payment"],
            )?;
            Ok(Command::InsertBooking {
                accommodation_id: parse_u64(&v[0])?,
                start: parse_i64(&v[1])?,
                end: parse_i64(&v[2])?,
                payment: parse_u64(&v[3])?,
            })
        }
        "check_ins" => {
            let v = bind_columns("check_ins", insert, values, &["booking_id"])?;
            Ok(Command::CheckIn {
                booking_id: parse_u64(&v[0])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Reorder VALUES into `expected` column order. Without a column list the
/// values are taken positionally; with one, every expected column must be
/// named exactly once and nothing else may be.
fn bind_columns(
    table: &'static str,
    insert: &ast::Insert,
    values: Vec<Expr>,
    expected: &[&'static str],
) -> Result<Vec<Expr>, SqlError> {
    if values.len() != expected.len() {
        return Err(SqlError::WrongArity(table, expected.len(), values.len()));
    }
    if insert.columns.is_empty() {
        return Ok(values);
    }
    if insert.columns.len() != values.len() {
        return Err(SqlError::WrongArity(table, insert.columns.len(), values.len()));
    }
    let names: Vec<String> = insert.columns.iter().map(|c| c.value.to_lowercase()).collect();
    if let Some(unknown) = names.iter().find(|n| !expected.iter().any(|e| *e == n.as_str())) {
        return Err(SqlError::UnknownColumn(table, unknown.clone()));
    }
    expected
        .iter()
        .map(|col| {
            let mut hits = names.iter().enumerate().filter(|(_, n)| n.as_str() == *col);
            match (hits.next(), hits.next()) {
                (Some((i, _)), None) => Ok(values[i].clone()),
                (Some(_), Some(_)) => Err(SqlError::DuplicateColumn(table, *col)),
                (None, _) => Err(SqlError::MissingColumn(table, *col)),
            }
        })
        .collect()
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let selection = select.selection.as_ref();

    match table.as_str() {
        "accommodations" => {
            let id = match selection {
                Some(expr) => Some(extract_where_eq(expr, "id")?),
                None => None,
            };
            Ok(Command::SelectAccommodations { id })
        }
        "my_accommodations" => Ok(Command::SelectMyAccommodations),
        "my_bookings" => Ok(Command::SelectMyBookings),
        "unavailable" => {
            let expr = selection.ok_or(SqlError::MissingFilter("accommodation_id"))?;
            Ok(Command::SelectUnavailable {
                accommodation_id: extract_where_eq(expr, "accommodation_id")?,
            })
        }
        "events" => {
            let after = match selection {
                Some(expr) => extract_seq_filter(expr)?,
                None => 0,
            };
            Ok(Command::SelectEvents { after })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// `seq > N` selects entries after N; `seq >= N` after N - 1.
fn extract_seq_filter(expr: &Expr) -> Result<u64, SqlError> {
    if let Expr::BinaryOp { left, op, right } = expr
        && expr_column_name(left).as_deref() == Some("seq")
    {
        let n = parse_u64(right)?;
        return match op {
            ast::BinaryOperator::Gt => Ok(n),
            ast::BinaryOperator::GtEq => Ok(n.saturating_sub(1)),
            _ => Err(SqlError::Unsupported(format!("seq filter operator {op}"))),
        };
    }
    Err(SqlError::MissingFilter("seq"))
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row VALUES".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_eq(sel: &Expr, column: &'static str) -> Result<u64, SqlError> {
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some(column) => parse_u64(right),
        _ => Err(SqlError::MissingFilter(column)),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    parse_i64_expr(expr)
}

fn parse_u64(expr: &Expr) -> Result<u64, SqlError> {
    let v = parse_i64_expr(expr)?;
    u64::try_from(v).map_err(|_| SqlError::Parse(format!("{v} must not be negative")))
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            _ => Err(SqlError::Parse(format!("expected bool, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    UnknownColumn(&'static str, String),
    MissingColumn(&'static str, &'static str),
    DuplicateColumn(&'static str, &'static str),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::UnknownColumn(t, col) => write!(f, "{t}: unknown column {col}"),
            SqlError::MissingColumn(t, col) => write!(f, "{t}: missing column {col}"),
            SqlError::DuplicateColumn(t, col) => write!(f, "{t}: column {col} given twice"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
