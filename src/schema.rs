use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::model::{Todo, User};

// Expected JSON type of a request field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Text,
    Timestamp,
}

// Request bodies declare their required fields so every problem can be
// reported at once instead of stopping at the first serde error
pub trait RequestSchema: serde::de::DeserializeOwned {
    const FIELDS: &'static [(&'static str, FieldKind)];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check a raw JSON body against a field list, collecting every offending field.
pub fn check_fields(fields: &[(&str, FieldKind)], body: &Value) -> Vec<FieldError> {
    let Some(object) = body.as_object() else {
        return vec![FieldError::new("body", "expected a JSON object")];
    };

    fields
        .iter()
        .filter_map(|&(name, kind)| {
            let message = match object.get(name) {
                None => "field required",
                Some(Value::Null) => "must not be null",
                Some(value) => match kind {
                    FieldKind::Integer if as_integer(value).is_none() => "value is not a valid integer",
                    FieldKind::Text if !value.is_string() => "value is not a valid string",
                    FieldKind::Timestamp
                        if value.as_str().and_then(parse_timestamp).is_none() =>
                    {
                        "value is not a valid datetime"
                    }
                    _ => return None,
                },
            };
            Some(FieldError::new(name, message))
        })
        .collect()
}

/// Integer from a JSON number: integers as-is, floats only when integral
/// (`1.0` is 1, `1.5` is rejected). Strings are never coerced.
pub fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().and_then(integral))
}

/// Integer from text under the same rule as [`as_integer`]: `"1"` and `"1.0"`
/// are 1; surrounding whitespace is not stripped.
pub fn parse_integer(raw: &str) -> Option<i64> {
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().and_then(integral))
}

fn integral(f: f64) -> Option<i64> {
    // NaN and infinities have a NaN fraction
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

/// Parse an ISO-8601 timestamp into naive UTC.
///
/// Accepts `2024-01-01T00:00:00`, a space instead of `T`, fractional seconds,
/// an explicit offset or `Z` (converted to UTC), and a bare date (midnight).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| de::Error::custom(format!("invalid datetime: {raw}")))
}

fn deserialize_integer<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    as_integer(&value).ok_or_else(|| de::Error::custom(format!("invalid integer: {value}")))
}

// Request body for creating a user
#[derive(Debug, Deserialize)]
pub struct CreateUserSchema {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RequestSchema for CreateUserSchema {
    const FIELDS: &'static [(&'static str, FieldKind)] = &[
        ("username", FieldKind::Text),
        ("email", FieldKind::Text),
        ("password", FieldKind::Text),
    ];
}

// Request body for creating a todo
#[derive(Debug, Deserialize)]
pub struct CreateTodoSchema {
    #[serde(deserialize_with = "deserialize_integer")]
    pub user_id: i64,
    pub task: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub due_date: NaiveDateTime,
}

impl RequestSchema for CreateTodoSchema {
    const FIELDS: &'static [(&'static str, FieldKind)] = &[
        ("user_id", FieldKind::Integer),
        ("task", FieldKind::Text),
        ("due_date", FieldKind::Timestamp),
    ];
}

// Public view of a user, never carries the password hash
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedTodoResponse {
    pub id: i64,
    pub task: String,
    pub due_date: NaiveDateTime,
}

impl From<Todo> for CreatedTodoResponse {
    fn from(todo: Todo) -> Self {
        Self {
            id: todo.id,
            task: todo.task,
            due_date: todo.due_date,
        }
    }
}
