//! Domain model for flags, environments, and evaluation results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The declared value type of a flag.
///
/// `Json` is the fallthrough type: raw values are parsed as JSON documents
/// and fall back to the raw string when parsing fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlagType {
    String,
    Boolean,
    Number,
    Json,
}

impl FlagType {
    /// Parse a flag type from its stored textual form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STRING" => Some(Self::String),
            "BOOLEAN" => Some(Self::Boolean),
            "NUMBER" => Some(Self::Number),
            "JSON" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Boolean => "BOOLEAN",
            Self::Number => "NUMBER",
            Self::Json => "JSON",
        }
    }
}

/// A feature flag definition. Owns its type and raw default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub id: Uuid,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub flag_type: FlagType,
    pub default_value: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An environment. Owns its API-key identity; keys are opaque bytes
/// compared byte-exact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: Uuid,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The binding between a flag and an environment that carries variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagValue {
    pub id: Uuid,
    pub flag_id: Uuid,
    pub environment_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A candidate value for a flag in an environment, with a percentage
/// weight. Variants are totally ordered by `variant_order` within their
/// flag value and must be destroyed with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: Uuid,
    pub flag_value_id: Uuid,
    pub value: String,
    pub percentage: i32,
    pub variant_order: i32,
}

/// A typed flag value as returned to evaluation callers.
///
/// Untagged serialization gives the natural JSON form of each arm
/// (`true`, `42`, `3.14`, `"text"`, `{...}`), keeping a single
/// serialization boundary for heterogeneous values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValueJson {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(serde_json::Value),
}

/// The outcome of evaluating one flag for one user. Constructed per
/// request; ephemeral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub flag_key: String,
    pub value: FlagValueJson,
    #[serde(rename = "type")]
    pub flag_type: FlagType,
    pub is_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<Uuid>,
}

/// Results for every active flag, keyed by flag key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkEvaluationResult {
    pub flags: HashMap<String, EvaluationResult>,
}

/// A cache-invalidation event published by the administrative service.
/// Unknown fields in the payload are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_type_round_trips_through_text() {
        for (ty, text) in [
            (FlagType::String, "STRING"),
            (FlagType::Boolean, "BOOLEAN"),
            (FlagType::Number, "NUMBER"),
            (FlagType::Json, "JSON"),
        ] {
            assert_eq!(ty.as_str(), text);
            assert_eq!(FlagType::parse(text), Some(ty));
        }
        assert_eq!(FlagType::parse("boolean"), None);
    }

    #[test]
    fn evaluation_result_serializes_to_wire_shape() {
        let result = EvaluationResult {
            flag_key: "dark-mode".to_string(),
            value: FlagValueJson::Bool(false),
            flag_type: FlagType::Boolean,
            is_default: true,
            variant_id: None,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "flagKey": "dark-mode",
                "value": false,
                "type": "BOOLEAN",
                "isDefault": true,
            })
        );
    }

    #[test]
    fn evaluation_result_includes_variant_id_when_present() {
        let id = Uuid::new_v4();
        let result = EvaluationResult {
            flag_key: "ab-test".to_string(),
            value: FlagValueJson::Text("A".to_string()),
            flag_type: FlagType::String,
            is_default: false,
            variant_id: Some(id),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["variantId"], serde_json::json!(id));
        assert_eq!(json["isDefault"], serde_json::json!(false));
    }

    #[test]
    fn typed_values_round_trip() {
        for value in [
            FlagValueJson::Bool(true),
            FlagValueJson::Int(42),
            FlagValueJson::Float(3.5),
            FlagValueJson::Text("old".to_string()),
            FlagValueJson::Json(serde_json::json!({"limit": 10})),
        ] {
            let encoded = serde_json::to_string(&value).unwrap();
            let decoded: FlagValueJson = serde_json::from_str(&encoded).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn invalidation_event_ignores_unknown_fields() {
        let event: InvalidationEvent = serde_json::from_str(
            r#"{"type":"flag:updated","flagKey":"dark-mode","rolledBy":"admin","ts":123}"#,
        )
        .unwrap();
        assert_eq!(event.event_type, "flag:updated");
        assert_eq!(event.flag_key.as_deref(), Some("dark-mode"));
        assert!(event.environment_id.is_none());
    }
}
