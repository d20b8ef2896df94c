use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Uniform response wrapper: `{"success": true, "data": ...}` or
/// `{"success": false, "error": "..."}`. Never carries both.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ResultEnvelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ResultEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(message.into()) }
    }

    pub fn from_result<E: Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(error) => Self::failure(error.to_string()),
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match (self.success, self.data, self.error) {
            (true, Some(data), _) => Ok(data),
            (_, _, Some(error)) => Err(error),
            _ => Err("envelope carried neither data nor error".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::ResultEnvelope;

    #[test]
    fn success_envelope_omits_error() {
        let envelope = ResultEnvelope::ok(vec!["insight".to_string()]);
        let value = serde_json::to_value(&envelope).expect("serialize envelope");

        assert_eq!(value, json!({ "success": true, "data": ["insight"] }));
    }

    #[test]
    fn failure_envelope_omits_data() {
        let envelope: ResultEnvelope<Vec<String>> =
            ResultEnvelope::from_result(Err::<Vec<String>, _>("claim `C-1` was not found"));
        let value = serde_json::to_value(&envelope).expect("serialize envelope");

        assert_eq!(value, json!({ "success": false, "error": "claim `C-1` was not found" }));
        assert_eq!(envelope.into_result(), Err("claim `C-1` was not found".to_string()));
    }
}
