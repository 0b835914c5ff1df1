pub mod board;
pub mod cache_entry;
pub mod comment;
pub mod discussion;
pub mod popular_tag;
pub mod project;

/// Deserialization helpers for upstream payloads.
///
/// The API is not consistent about identifier types: the same field arrives as
/// `"123"` from one endpoint and `123` from another. Everything is stored as
/// text.
pub mod de {
    use serde::{Deserialize, Deserializer, de::Error};
    use serde_json::Value;

    fn to_string<E: Error>(value: Value) -> Result<Option<String>, E> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            Value::Number(n) => Ok(Some(n.to_string())),
            other => Err(E::custom(format!(
                "expected a string or number identifier, got {other}"
            ))),
        }
    }

    pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        to_string(Value::deserialize(deserializer)?)?
            .ok_or_else(|| D::Error::custom("identifier must not be null"))
    }

    pub fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        to_string(Value::deserialize(deserializer)?)
    }

}

/// Serialize an optional nested JSON payload for a TEXT column.
pub(crate) fn json_text(value: &Option<serde_json::Value>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}
