use std::str::FromStr;

use serde_json::{Number, Value};
use sqlx::{
    Column, Postgres, Row, TypeInfo, ValueRef,
    postgres::{
        PgRow,
        types::{PgInterval, PgMoney},
    },
    types::{
        BigDecimal, Uuid,
        time::{Date, OffsetDateTime, PrimitiveDateTime, Time},
    },
};
use tracing::warn;

const MONEY_FRAC_DIGITS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Bool,
    // Integer Types
    Int2,
    Int4,
    Int8,
    // Decimal types
    Decimal,
    Money,
    // Time types
    Timestamp { tz: bool },
    Date,
    Time,
    Interval,
    // Text types
    Text,
    Uuid,
    // Json types
    Json,
    // Float types
    Float4,
    Float8,
}

impl SqlType {
    pub fn from_type_name(sql_type: &str) -> Option<Self> {
        Some(match sql_type {
            "BOOL" => Self::Bool,
            "SMALLINT" | "INT2" => Self::Int2,
            "INT" | "INT4" => Self::Int4,
            "INT8" => Self::Int8,
            "NUMERIC" => Self::Decimal,
            "MONEY" => Self::Money,
            "TIMESTAMP" => Self::Timestamp { tz: false },
            "TIMESTAMPTZ" => Self::Timestamp { tz: true },
            "TIME" => Self::Time,
            "DATE" => Self::Date,
            "INTERVAL" => Self::Interval,
            "CHAR" | "BPCHAR" | "VARCHAR" | "TEXT" | "NAME" => Self::Text,
            "UUID" => Self::Uuid,
            "JSON" | "JSONB" => Self::Json,
            "DOUBLE PRECISION" | "FLOAT8" => Self::Float8,
            "REAL" | "FLOAT4" => Self::Float4,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Scalar(SqlType),
    Array(SqlType),
}

impl ColumnType {
    pub fn from_type_name(type_name: &str) -> Option<Self> {
        match type_name.strip_suffix("[]") {
            Some(element) => match SqlType::from_type_name(element)? {
                SqlType::Json => None,
                element => Some(Self::Array(element)),
            },
            None => SqlType::from_type_name(type_name).map(Self::Scalar),
        }
    }
}

fn decode<'r, T>(row: &'r PgRow, index: usize) -> Result<Option<T>, sqlx::Error>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<Option<T>, _>(index)
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn decimal(value: BigDecimal) -> Value {
    let text = value.to_string();
    if let Ok(int) = text.parse::<i64>() {
        return Value::from(int);
    }
    let exact = |number: &Number| {
        BigDecimal::from_str(&number.to_string()).is_ok_and(|back| back == value)
    };
    match text.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(number) if exact(&number) => Value::Number(number),
        _ => Value::String(text),
    }
}

fn money(value: PgMoney) -> Value {
    decimal(value.to_bigdecimal(MONEY_FRAC_DIGITS))
}

fn push_unit(parts: &mut Vec<String>, count: i32, unit: &str) {
    match count {
        0 => {}
        1 | -1 => parts.push(format!("{count} {unit}")),
        _ => parts.push(format!("{count} {unit}s")),
    }
}

// postgres interval style: `1 year 2 mons 3 days 04:05:06`
fn interval(value: PgInterval) -> Value {
    let mut parts = Vec::new();
    push_unit(&mut parts, value.months / 12, "year");
    push_unit(&mut parts, value.months % 12, "mon");
    push_unit(&mut parts, value.days, "day");
    if value.microseconds != 0 || parts.is_empty() {
        let sign = if value.microseconds < 0 { "-" } else { "" };
        let micros = value.microseconds.unsigned_abs();
        let secs = micros / 1_000_000;
        let mut clock = format!(
            "{sign}{:02}:{:02}:{:02}",
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let frac = micros % 1_000_000;
        if frac != 0 {
            clock.push('.');
            clock.push_str(format!("{frac:06}").trim_end_matches('0'));
        }
        parts.push(clock);
    }
    Value::String(parts.join(" "))
}

fn text<T: ToString>(value: T) -> Value {
    Value::String(value.to_string())
}

fn decode_scalar(row: &PgRow, index: usize, sql_type: SqlType) -> Result<Value, sqlx::Error> {
    Ok(match sql_type {
        SqlType::Bool => decode::<bool>(row, index)?.map_or(Value::Null, Value::Bool),
        SqlType::Int2 => decode::<i16>(row, index)?.map_or(Value::Null, Value::from),
        SqlType::Int4 => decode::<i32>(row, index)?.map_or(Value::Null, Value::from),
        SqlType::Int8 => decode::<i64>(row, index)?.map_or(Value::Null, Value::from),
        SqlType::Float4 => decode::<f32>(row, index)?.map_or(Value::Null, |v| float(v as f64)),
        SqlType::Float8 => decode::<f64>(row, index)?.map_or(Value::Null, float),
        SqlType::Decimal => decode::<BigDecimal>(row, index)?.map_or(Value::Null, decimal),
        SqlType::Money => decode::<PgMoney>(row, index)?.map_or(Value::Null, money),
        SqlType::Text => decode::<String>(row, index)?.map_or(Value::Null, Value::String),
        SqlType::Uuid => decode::<Uuid>(row, index)?.map_or(Value::Null, text),
        SqlType::Json => decode::<Value>(row, index)?.unwrap_or(Value::Null),
        SqlType::Date => decode::<Date>(row, index)?.map_or(Value::Null, text),
        SqlType::Time => decode::<Time>(row, index)?.map_or(Value::Null, text),
        SqlType::Interval => decode::<PgInterval>(row, index)?.map_or(Value::Null, interval),
        SqlType::Timestamp { tz: false } => {
            decode::<PrimitiveDateTime>(row, index)?.map_or(Value::Null, text)
        }
        SqlType::Timestamp { tz: true } => {
            decode::<OffsetDateTime>(row, index)?.map_or(Value::Null, text)
        }
    })
}

fn array<'r, T>(
    row: &'r PgRow,
    index: usize,
    to_value: impl Fn(T) -> Value,
) -> Result<Value, sqlx::Error>
where
    Vec<Option<T>>: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    Ok(decode::<Vec<Option<T>>>(row, index)?.map_or(Value::Null, |items| {
        Value::Array(
            items
                .into_iter()
                .map(|item| item.map_or(Value::Null, &to_value))
                .collect(),
        )
    }))
}

fn decode_array(row: &PgRow, index: usize, element: SqlType) -> Result<Value, sqlx::Error> {
    match element {
        SqlType::Bool => array::<bool>(row, index, Value::Bool),
        SqlType::Int2 => array::<i16>(row, index, Value::from),
        SqlType::Int4 => array::<i32>(row, index, Value::from),
        SqlType::Int8 => array::<i64>(row, index, Value::from),
        SqlType::Float4 => array::<f32>(row, index, |v| float(v as f64)),
        SqlType::Float8 => array::<f64>(row, index, float),
        SqlType::Decimal => array::<BigDecimal>(row, index, decimal),
        SqlType::Money => array::<PgMoney>(row, index, money),
        SqlType::Text => array::<String>(row, index, Value::String),
        SqlType::Uuid => array::<Uuid>(row, index, text),
        SqlType::Date => array::<Date>(row, index, text),
        SqlType::Time => array::<Time>(row, index, text),
        SqlType::Interval => array::<PgInterval>(row, index, interval),
        SqlType::Timestamp { tz: false } => array::<PrimitiveDateTime>(row, index, text),
        SqlType::Timestamp { tz: true } => array::<OffsetDateTime>(row, index, text),
        SqlType::Json => decode::<Value>(row, index).map(|v| v.unwrap_or(Value::Null)),
    }
}

pub fn column_value(row: &PgRow, index: usize) -> Value {
    let column = &row.columns()[index];
    let type_name = column.type_info().name();
    if row
        .try_get_raw(index)
        .is_ok_and(|value| value.is_null())
    {
        return Value::Null;
    }
    let decoded = match ColumnType::from_type_name(type_name) {
        Some(ColumnType::Scalar(sql_type)) => decode_scalar(row, index, sql_type),
        Some(ColumnType::Array(element)) => decode_array(row, index, element),
        None => decode::<String>(row, index).map(|v| v.map_or(Value::Null, Value::String)),
    };
    decoded.unwrap_or_else(|err| {
        warn!(
            "Could not decode column {} of type {type_name}: {err}",
            column.name()
        );
        Value::Null
    })
}
