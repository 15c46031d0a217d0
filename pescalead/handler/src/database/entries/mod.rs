//! Rows of the managed database as they travel over the REST surface.
//!
//! - `campaign`: locked campaign messages, runs and their settings.
//! - `follow_up`: follow-up jobs, categories and templates.
//! - `kanban`: funnels, columns, leads, custom values and funnel stats.
//! - `messaging`: conversations, instances and stored messages.
//! - `pipeline`: agents, debouncer entries and queue messages.
//!
//! Row structs only carry the columns the handlers select. Missing or null
//! columns deserialize to `None` or the type default so that schema drift
//! in unrelated columns does not break reads.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub mod campaign;
pub mod follow_up;
pub mod kanban;
pub mod messaging;
pub mod pipeline;

/// Postgres `numeric` columns arrive as JSON numbers or, depending on the
/// PostgREST configuration, as strings. Anything unparsable is `None`.
pub fn numeric<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    })
}

/// Like [`numeric`] but zero when absent.
pub fn numeric_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    numeric(deserializer).map(Option::unwrap_or_default)
}

/// Null arrays become empty.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Row {
        #[serde(default, deserialize_with = "numeric")]
        value: Option<f64>,
        #[serde(default, deserialize_with = "null_as_default")]
        tags: Vec<String>,
    }

    #[test]
    fn numeric_accepts_numbers_and_strings() {
        let row: Row = serde_json::from_value(json!({"value": 12.5})).unwrap();
        assert_eq!(row.value, Some(12.5));
        let row: Row = serde_json::from_value(json!({"value": "1500.00"})).unwrap();
        assert_eq!(row.value, Some(1500.0));
        let row: Row = serde_json::from_value(json!({"value": "n/a"})).unwrap();
        assert_eq!(row.value, None);
        let row: Row = serde_json::from_value(json!({})).unwrap();
        assert_eq!(row.value, None);
    }

    #[test]
    fn null_arrays_are_empty() {
        let row: Row = serde_json::from_value(json!({"tags": null})).unwrap();
        assert!(row.tags.is_empty());
    }
}
