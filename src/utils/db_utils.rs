use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;
use sqlx::MySqlPool;

use crate::error::{ApiError, ApiResult};

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    U64(u64),
    Date(NaiveDate),
    Time(NaiveTime),
    Null,
}

/// A JSON field that may be written to a column.
pub struct Column {
    pub field: &'static str,
    pub column: &'static str,
    pub convert: fn(&Value) -> Result<SqlValue, String>,
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
/// Column names come from `allowed`, never from the payload.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed: &[Column],
    id_column: &str,
    id_value: u64,
) -> ApiResult<SqlUpdate> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ApiError::bad_request("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(ApiError::bad_request("No fields provided for update"));
    }

    let mut sets = Vec::with_capacity(obj.len());
    let mut values = Vec::with_capacity(obj.len() + 1);

    for (key, value) in obj {
        let column = allowed
            .iter()
            .find(|c| c.field == key)
            .ok_or_else(|| ApiError::bad_request(format!("Field '{key}' cannot be updated")))?;
        let converted =
            (column.convert)(value).map_err(|e| ApiError::bad_request(format!("{key}: {e}")))?;
        sets.push(format!("{} = ?", column.column));
        values.push(converted);
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table,
        sets.join(", "),
        id_column
    );

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::Time(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

// ----- converters -----

pub fn required_text(value: &Value) -> Result<SqlValue, String> {
    match value.as_str().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(SqlValue::String(s.to_string())),
        _ => Err("must be a non-empty string".to_string()),
    }
}

pub fn optional_text(value: &Value) -> Result<SqlValue, String> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::String(s) if s.trim().is_empty() => Ok(SqlValue::Null),
        Value::String(s) => Ok(SqlValue::String(s.trim().to_string())),
        _ => Err("must be a string or null".to_string()),
    }
}

pub fn date(value: &Value) -> Result<SqlValue, String> {
    value
        .as_str()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .map(SqlValue::Date)
        .ok_or_else(|| "must be a YYYY-MM-DD date".to_string())
}

pub fn time(value: &Value) -> Result<SqlValue, String> {
    value
        .as_str()
        .and_then(crate::model::setting::parse_hhmm)
        .map(SqlValue::Time)
        .ok_or_else(|| "must be a HH:MM time".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: &[Column] = &[
        Column {
            field: "title",
            column: "title",
            convert: required_text,
        },
        Column {
            field: "notes",
            column: "notes",
            convert: optional_text,
        },
        Column {
            field: "date",
            column: "date",
            convert: date,
        },
        Column {
            field: "start_time",
            column: "start_time",
            convert: time,
        },
    ];

    #[test]
    fn builds_set_clause_from_allowed_columns() {
        let update = build_update_sql(
            "schedules",
            &json!({"title": " Lab ", "date": "2026-03-02", "start_time": "09:30", "notes": null}),
            COLUMNS,
            "id",
            5,
        )
        .unwrap();

        assert!(update.sql.starts_with("UPDATE schedules SET "));
        assert!(update.sql.ends_with(" WHERE id = ?"));
        for set in ["title = ?", "date = ?", "start_time = ?", "notes = ?"] {
            assert!(update.sql.contains(set), "{}", update.sql);
        }
        assert_eq!(update.values.len(), 5);
        assert_eq!(update.values.last(), Some(&SqlValue::U64(5)));
        assert!(update.values.contains(&SqlValue::String("Lab".into())));
        assert!(update.values.contains(&SqlValue::Null));
        assert!(update
            .values
            .contains(&SqlValue::Time(NaiveTime::from_hms_opt(9, 30, 0).unwrap())));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = build_update_sql("schedules", &json!({"id = 1; --": 1}), COLUMNS, "id", 1)
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn empty_and_non_object_payloads_are_rejected() {
        assert!(build_update_sql("t", &json!({}), COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("t", &json!([1]), COLUMNS, "id", 1).is_err());
    }

    #[test]
    fn converter_errors_name_the_field() {
        let err = build_update_sql("t", &json!({"date": "tomorrow"}), COLUMNS, "id", 1).unwrap_err();
        assert_eq!(err.to_string(), "date: must be a YYYY-MM-DD date");
        assert!(build_update_sql("t", &json!({"title": ""}), COLUMNS, "id", 1).is_err());
    }
}
