use serde::{Deserialize, Serialize};

/// One self-inspection event. Written once, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub timestamp: String,
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl AuditLogEntry {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: crate::time::now_iso8601(),
            kind: kind.into(),
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Build an entry from loosely-shaped JSON. `kind` and `message` are
    /// picked up when they are strings; the whole payload is kept as
    /// `details` so nothing the caller sent is lost.
    pub fn from_value(value: serde_json::Value) -> Self {
        let kind = value
            .get("kind")
            .and_then(|v| v.as_str())
            .unwrap_or("unspecified")
            .to_string();
        let message = value
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Self::new(kind, message).with_details(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_value_picks_known_fields() {
        let entry = AuditLogEntry::from_value(serde_json::json!({
            "kind": "coherence",
            "message": "trust skew detected",
            "score": 0.4
        }));
        assert_eq!(entry.kind, "coherence");
        assert_eq!(entry.message, "trust skew detected");
        assert_eq!(entry.details["score"], 0.4);
    }

    #[test]
    fn test_from_value_tolerates_odd_shapes() {
        let entry = AuditLogEntry::from_value(serde_json::json!([1, 2, 3]));
        assert_eq!(entry.kind, "unspecified");
        assert!(entry.message.is_empty());
        assert!(entry.details.is_array());

        let entry = AuditLogEntry::from_value(serde_json::json!({"kind": 7}));
        assert_eq!(entry.kind, "unspecified");
    }

    #[test]
    fn test_null_details_skipped_on_write() {
        let json = serde_json::to_string(&AuditLogEntry::new("k", "m")).unwrap();
        assert!(!json.contains("details"));
        let back: AuditLogEntry = serde_json::from_str(&json).unwrap();
        assert!(back.details.is_null());
    }
}
