use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Canonical correction payload handed to callers and persisted in history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectionResult {
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub corrected_text: String,
    pub errors: Vec<ErrorDetail>,
}

impl CorrectionResult {
    /// Copyable summary of the result, as offered by the "copy" action.
    pub fn to_plain_text(&self) -> String {
        let mut text = String::from("作文批改结果:\n\n");
        if !self.feedback.is_empty() {
            text.push_str("详细反馈:\n");
            text.push_str(&self.feedback);
            text.push_str("\n\n");
        }
        if !self.corrected_text.is_empty() {
            text.push_str("修改后的文本:\n");
            text.push_str(&self.corrected_text);
        }
        text
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub original: String,
    pub corrected: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub error_type: ErrorType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ErrorType {
    Grammar,
    Spelling,
    Vocabulary,
    Punctuation,
    Style,
    #[default]
    Unspecified,
    Other(String),
}

impl ErrorType {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorType::Grammar => "grammar",
            ErrorType::Spelling => "spelling",
            ErrorType::Vocabulary => "vocabulary",
            ErrorType::Punctuation => "punctuation",
            ErrorType::Style => "style",
            ErrorType::Unspecified => "unspecified",
            ErrorType::Other(value) => value.as_str(),
        }
    }

    pub fn from_str(value: &str) -> Self {
        let trimmed = value.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "grammar" => ErrorType::Grammar,
            "spelling" => ErrorType::Spelling,
            "vocabulary" | "word_choice" => ErrorType::Vocabulary,
            "punctuation" => ErrorType::Punctuation,
            "style" => ErrorType::Style,
            "" | "unspecified" => ErrorType::Unspecified,
            _ => ErrorType::Other(trimmed.to_string()),
        }
    }
}

impl Serialize for ErrorType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(ErrorType::from_str(&value))
    }
}

/// Where an essay came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Text,
    File,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Text => "text",
            SourceType::File => "file",
        }
    }

    /// Anything that is not plain text was uploaded (`word`, `image`, ...).
    pub fn from_str(value: &str) -> Self {
        if value.eq_ignore_ascii_case("text") {
            SourceType::Text
        } else {
            SourceType::File
        }
    }
}

/// Loosely typed AI service reply. No field is guaranteed to be present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCorrection {
    pub feedback: Option<String>,
    pub suggestions: Option<Value>,
    pub corrected_text: Option<String>,
    pub detailed_errors: Option<Value>,
}

impl RawCorrection {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::from_map(map),
            Value::String(text) => Self::from_feedback(text.clone()),
            _ => Self::default(),
        }
    }

    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            feedback: map.get("feedback").and_then(value_to_text),
            suggestions: first_present(map, &["suggestions", "improvement_suggestions"]),
            corrected_text: map.get("corrected_text").and_then(value_to_text),
            detailed_errors: first_present(map, &["detailed_errors", "errors"]),
        }
    }

    pub fn from_feedback(feedback: impl Into<String>) -> Self {
        Self {
            feedback: Some(feedback.into()),
            ..Self::default()
        }
    }

    /// Interpret a model reply: a bare (or fenced) JSON object is read field by
    /// field, anything else is kept as free-text feedback.
    pub fn from_model_text(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
            return Self::from_map(&map);
        }

        if let Some(inner) = strip_code_fence(trimmed) {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(inner) {
                return Self::from_map(&map);
            }
        }

        Self::from_feedback(text)
    }
}

fn first_present(map: &Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find(|value| !value.is_null())
        .cloned()
}

/// Returns the body of a reply that consists of exactly one fenced block.
fn strip_code_fence(text: &str) -> Option<&str> {
    let body = text.strip_prefix("```")?.strip_suffix("```")?;
    let (_, inner) = body.split_once('\n')?;
    Some(inner.trim())
}

pub(crate) fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_type_round_trips_known_and_custom_tags() {
        assert_eq!(ErrorType::from_str("Grammar"), ErrorType::Grammar);
        assert_eq!(ErrorType::from_str(""), ErrorType::Unspecified);
        let custom = ErrorType::from_str(" Collocation ");
        assert_eq!(custom, ErrorType::Other("Collocation".to_string()));
        assert_eq!(custom.as_str(), "Collocation");

        let value = serde_json::to_value(ErrorType::Spelling).unwrap();
        assert_eq!(value, json!("spelling"));
    }

    #[test]
    fn source_type_treats_uploads_as_files() {
        assert_eq!(SourceType::from_str("text"), SourceType::Text);
        assert_eq!(SourceType::from_str("word"), SourceType::File);
        assert_eq!(SourceType::from_str("image"), SourceType::File);
    }

    #[test]
    fn model_text_with_bare_object_is_read_field_by_field() {
        let raw = RawCorrection::from_model_text(
            r#"{"feedback": "Good.", "improvement_suggestions": ["Vary sentences"], "errors": []}"#,
        );
        assert_eq!(raw.feedback.as_deref(), Some("Good."));
        assert_eq!(raw.suggestions, Some(json!(["Vary sentences"])));
        assert_eq!(raw.detailed_errors, Some(json!([])));
        assert_eq!(raw.corrected_text, None);
    }

    #[test]
    fn model_text_wrapped_in_single_fence_is_unwrapped() {
        let raw =
            RawCorrection::from_model_text("```json\n{\"corrected_text\": \"I went home.\"}\n```");
        assert_eq!(raw.corrected_text.as_deref(), Some("I went home."));
        assert_eq!(raw.feedback, None);
    }

    #[test]
    fn model_text_prose_becomes_feedback() {
        let reply = "Overall good.\n```json\n{\"suggestions\": [\"a\"]}\n```\nKeep going.";
        let raw = RawCorrection::from_model_text(reply);
        assert_eq!(raw.feedback.as_deref(), Some(reply));
        assert_eq!(raw.suggestions, None);
    }

    #[test]
    fn plain_text_summary_skips_empty_sections() {
        let result = CorrectionResult {
            feedback: String::new(),
            corrected_text: "Fixed.".into(),
            ..CorrectionResult::default()
        };
        assert_eq!(result.to_plain_text(), "作文批改结果:\n\n修改后的文本:\nFixed.");

        let full = CorrectionResult {
            feedback: "Nice".into(),
            corrected_text: "Fixed.".into(),
            ..CorrectionResult::default()
        };
        assert_eq!(
            full.to_plain_text(),
            "作文批改结果:\n\n详细反馈:\nNice\n\n修改后的文本:\nFixed."
        );
    }

    #[test]
    fn stored_result_requires_canonical_shape() {
        let raw = json!({"feedback": "x", "detailed_errors": []});
        assert!(serde_json::from_value::<CorrectionResult>(raw).is_err());

        let canonical = json!({
            "feedback": "x",
            "suggestions": [],
            "corrected_text": "y",
            "errors": [{"original": "a", "corrected": "b", "error_type": "grammar"}]
        });
        let parsed = serde_json::from_value::<CorrectionResult>(canonical).unwrap();
        assert_eq!(parsed.errors[0].error_type, ErrorType::Grammar);
        assert_eq!(parsed.errors[0].explanation, "");
    }
}
