use crate::error::ApiError;
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{MySql, MySqlExecutor};
use std::str::FromStr;

/// How a JSON value is validated and bound for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Non-empty, trimmed text
    Name,
    Text,
    Id,
    /// Non-negative integer
    Count,
    Money,
    /// Decimal in `0..=100`
    Percent,
    Bool,
    Date,
    Time,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

impl Column {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
        }
    }

    pub const fn nullable(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
        }
    }
}

/// Table plus the columns clients may change through a partial update.
#[derive(Debug)]
pub struct UpdatableTable {
    pub table: &'static str,
    pub columns: &'static [Column],
}

/// SQL bindable value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    U64(u64),
    I64(i64),
    Decimal(Decimal),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    Null,
}

#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// Builds `UPDATE <table> SET .. WHERE id = ?` from a JSON object.
/// Keys outside the table's whitelist are rejected.
pub fn build_update_sql(
    target: &UpdatableTable,
    payload: &Value,
    id_value: u64,
) -> Result<SqlUpdate, ApiError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ApiError::bad_request("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(ApiError::bad_request("No fields provided for update"));
    }

    let mut assignments = Vec::with_capacity(obj.len());
    let mut values = Vec::with_capacity(obj.len() + 1);

    for (key, value) in obj {
        let column = target
            .columns
            .iter()
            .find(|c| c.name == key)
            .ok_or_else(|| ApiError::bad_request(format!("Field '{key}' cannot be updated")))?;

        assignments.push(format!("{} = ?", column.name));
        values.push(to_sql_value(column, value)?);
    }

    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate {
        sql: format!(
            "UPDATE {} SET {} WHERE id = ?",
            target.table,
            assignments.join(", ")
        ),
        values,
    })
}

fn to_sql_value(column: &Column, value: &Value) -> Result<SqlValue, ApiError> {
    let invalid = || ApiError::bad_request(format!("Invalid value for '{}'", column.name));

    if value.is_null() {
        return if column.nullable {
            Ok(SqlValue::Null)
        } else {
            Err(ApiError::bad_request(format!("'{}' cannot be null", column.name)))
        };
    }

    let parsed = match column.kind {
        ColumnKind::Name => {
            let s = value.as_str().map(str::trim).ok_or_else(invalid)?;
            if s.is_empty() {
                return Err(ApiError::bad_request(format!("'{}' is required", column.name)));
            }
            SqlValue::String(s.to_string())
        }
        ColumnKind::Text => SqlValue::String(value.as_str().ok_or_else(invalid)?.trim().to_string()),
        ColumnKind::Id => SqlValue::U64(value.as_u64().filter(|v| *v > 0).ok_or_else(invalid)?),
        ColumnKind::Count => SqlValue::I64(value.as_i64().filter(|v| *v >= 0).ok_or_else(invalid)?),
        ColumnKind::Money => {
            let amount = json_decimal(value).filter(|d| !d.is_sign_negative()).ok_or_else(invalid)?;
            SqlValue::Decimal(amount)
        }
        ColumnKind::Percent => {
            let pct = json_decimal(value)
                .filter(|d| *d >= Decimal::ZERO && *d <= Decimal::ONE_HUNDRED)
                .ok_or_else(invalid)?;
            SqlValue::Decimal(pct)
        }
        ColumnKind::Bool => SqlValue::Bool(value.as_bool().ok_or_else(invalid)?),
        ColumnKind::Date => SqlValue::Date(value.as_str().and_then(parse_date).ok_or_else(invalid)?),
        ColumnKind::Time => SqlValue::Time(value.as_str().and_then(parse_time).ok_or_else(invalid)?),
    };

    Ok(parsed)
}

/// Accepts both `"1250.50"` and `1250.5`.
fn json_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// `HH:MM` or `HH:MM:SS`
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

pub async fn execute_update<'c, E>(executor: E, update: SqlUpdate) -> Result<u64, sqlx::Error>
where
    E: MySqlExecutor<'c>,
{
    let mut query = sqlx::query::<MySql>(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::Decimal(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::Time(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(executor).await?;
    Ok(result.rows_affected())
}

/// Page window: `(page, per_page, offset)` with `page >= 1`, `per_page` in `1..=100`.
pub fn page_window(page: Option<u32>, per_page: Option<u32>) -> (u32, u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(20).clamp(1, 100);
    (page, per_page, (page - 1) * per_page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    const SHIFTS: UpdatableTable = UpdatableTable {
        table: "shifts",
        columns: &[
            Column::new("shift_name", ColumnKind::Name),
            Column::new("in_time", ColumnKind::Time),
            Column::nullable("late_time", ColumnKind::Time),
        ],
    };

    const COMPANIES: UpdatableTable = UpdatableTable {
        table: "companies",
        columns: &[
            Column::new("basic", ColumnKind::Percent),
            Column::new("is_inactive", ColumnKind::Bool),
        ],
    };

    #[test]
    fn builds_whitelisted_update() {
        let update = build_update_sql(
            &SHIFTS,
            &json!({"shift_name": " Night ", "late_time": null}),
            4,
        )
        .unwrap();

        assert!(update.sql.starts_with("UPDATE shifts SET "));
        assert!(update.sql.ends_with(" WHERE id = ?"));
        assert!(update.sql.contains("shift_name = ?"));
        assert!(update.sql.contains("late_time = ?"));
        assert_eq!(update.values.len(), 3);
        assert!(update.values.contains(&SqlValue::String("Night".into())));
        assert!(update.values.contains(&SqlValue::Null));
        assert_eq!(update.values.last(), Some(&SqlValue::U64(4)));
    }

    #[test]
    fn rejects_unknown_columns() {
        let err = build_update_sql(&SHIFTS, &json!({"com_id": 2}), 1).unwrap_err();
        assert!(err.to_string().contains("com_id"));

        let err = build_update_sql(&SHIFTS, &json!({"id; DROP TABLE x": 1}), 1).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn rejects_empty_or_non_object_payloads() {
        assert!(build_update_sql(&SHIFTS, &json!({}), 1).is_err());
        assert!(build_update_sql(&SHIFTS, &json!([1, 2]), 1).is_err());
    }

    #[test]
    fn validates_by_column_kind() {
        assert!(build_update_sql(&SHIFTS, &json!({"shift_name": "  "}), 1).is_err());
        assert!(build_update_sql(&SHIFTS, &json!({"in_time": null}), 1).is_err());
        assert!(build_update_sql(&SHIFTS, &json!({"in_time": "25:00"}), 1).is_err());
        assert!(build_update_sql(&COMPANIES, &json!({"basic": 101}), 1).is_err());
        assert!(build_update_sql(&COMPANIES, &json!({"is_inactive": "yes"}), 1).is_err());

        let update = build_update_sql(&COMPANIES, &json!({"basic": "45.5"}), 1).unwrap();
        assert_eq!(update.values[0], SqlValue::Decimal(dec!(45.5)));
    }

    #[test]
    fn time_accepts_both_precisions() {
        assert_eq!(parse_time("08:00"), NaiveTime::from_hms_opt(8, 0, 0));
        assert_eq!(parse_time("17:30:15"), NaiveTime::from_hms_opt(17, 30, 15));
        assert_eq!(parse_time("8am"), None);
        assert_eq!(parse_date("2025-09-01"), NaiveDate::from_ymd_opt(2025, 9, 1));
        assert_eq!(parse_date("01/09/2025"), None);
    }

    #[test]
    fn page_window_is_clamped() {
        assert_eq!(page_window(None, None), (1, 20, 0));
        assert_eq!(page_window(Some(0), Some(500)), (1, 100, 0));
        assert_eq!(page_window(Some(3), Some(10)), (3, 10, 20));
    }
}
