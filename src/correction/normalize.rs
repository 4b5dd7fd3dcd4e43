use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::types::{CorrectionResult, ErrorDetail, ErrorType, RawCorrection, value_to_text};

const FENCE_OPEN: &str = "```json\n";
const FENCE_CLOSE: &str = "\n```";

/// Which upstream key supplied a phrase. The plain key (`original`) wins over
/// its `_sentence` twin; empty strings count as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phrase<'a> {
    Named(&'a str),
    Sentence(&'a str),
    Missing,
}

impl<'a> Phrase<'a> {
    pub fn resolve(fields: &'a Map<String, Value>, key: &str) -> Self {
        if let Some(text) = non_empty_str(fields.get(key)) {
            return Phrase::Named(text);
        }
        let sentence_key = format!("{key}_sentence");
        if let Some(text) = non_empty_str(fields.get(&sentence_key)) {
            return Phrase::Sentence(text);
        }
        Phrase::Missing
    }

    pub fn as_str(&self) -> &'a str {
        match self {
            Phrase::Named(text) | Phrase::Sentence(text) => text,
            Phrase::Missing => "",
        }
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|text| !text.is_empty())
}

impl ErrorDetail {
    /// Reads one upstream error record. Non-object entries are dropped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let Value::Object(fields) = value else {
            debug!("dropping non-object error entry");
            return None;
        };

        Some(Self {
            original: Phrase::resolve(fields, "original").as_str().to_string(),
            corrected: Phrase::resolve(fields, "corrected").as_str().to_string(),
            explanation: fields
                .get("explanation")
                .and_then(value_to_text)
                .unwrap_or_default(),
            error_type: fields
                .get("error_type")
                .and_then(Value::as_str)
                .map(ErrorType::from_str)
                .unwrap_or_default(),
        })
    }

    fn has_substitution(&self) -> bool {
        !self.original.is_empty() && !self.corrected.is_empty()
    }
}

/// Turn a raw AI reply into a [`CorrectionResult`] for `submission`.
///
/// Never fails: malformed structured data embedded in the feedback is logged
/// and ignored, the rest of the reply is still used.
pub fn normalize(raw: &RawCorrection, submission: &str) -> CorrectionResult {
    let mut errors: Vec<ErrorDetail> = Vec::new();
    let mut suggestions: Vec<String> = Vec::new();

    if let Some(Value::Array(items)) = &raw.detailed_errors {
        errors.extend(items.iter().filter_map(ErrorDetail::from_value));
    }

    if let Some(block) = raw.feedback.as_deref().and_then(embedded_block) {
        match serde_json::from_str::<Value>(block) {
            Ok(data) => {
                if let Some(Value::Array(items)) = data.get("errors") {
                    errors.extend(items.iter().filter_map(ErrorDetail::from_value));
                }
                if let Some(Value::Array(items)) = data.get("suggestions") {
                    suggestions = text_items(items);
                }
            }
            Err(err) => {
                warn!(?err, "ignoring malformed json block in feedback");
            }
        }
    }

    // Upstream text is kept as-is; only a missing one is rebuilt from the errors.
    let corrected_text = match raw.corrected_text.as_deref() {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => apply_substitutions(submission, &errors),
    };

    CorrectionResult {
        feedback: raw.feedback.clone().unwrap_or_default(),
        suggestions,
        corrected_text,
        errors,
    }
}

/// Take the reply's top-level suggestions when the feedback carried none.
///
/// Runs after [`normalize`], which only reads suggestions from the block
/// embedded in the feedback.
pub fn adopt_reply_suggestions(result: &mut CorrectionResult, raw: &RawCorrection) {
    if !result.suggestions.is_empty() {
        return;
    }
    if let Some(Value::Array(items)) = &raw.suggestions {
        result.suggestions = text_items(items);
    }
}

/// Replace every literal occurrence of each error's original phrase, in list
/// order, on the running text.
pub fn apply_substitutions(submission: &str, errors: &[ErrorDetail]) -> String {
    let mut text = submission.to_string();
    for (index, error) in errors.iter().enumerate() {
        if !error.has_substitution() {
            debug!(index, "skipping substitution without both phrases");
            continue;
        }
        text = text.replace(&error.original, &error.corrected);
    }
    text
}

/// Contents of the first ```` ```json ```` block, if any.
fn embedded_block(feedback: &str) -> Option<&str> {
    let start = feedback.find(FENCE_OPEN)? + FENCE_OPEN.len();
    let rest = &feedback[start..];
    let end = rest.find(FENCE_CLOSE)?;
    let block = &rest[..end];
    if block.is_empty() { None } else { Some(block) }
}

fn text_items(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(value_to_text)
        .filter(|item| !item.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_from(value: Value) -> RawCorrection {
        RawCorrection::from_value(&value)
    }

    #[test]
    fn empty_reply_keeps_submission() {
        let result = normalize(&raw_from(json!({"feedback": "Well written."})), "I am fine.");
        assert!(result.errors.is_empty());
        assert!(result.suggestions.is_empty());
        assert_eq!(result.corrected_text, "I am fine.");
        assert_eq!(result.feedback, "Well written.");
    }

    #[test]
    fn missing_feedback_is_tolerated() {
        let result = normalize(&RawCorrection::default(), "Text.");
        assert_eq!(result.feedback, "");
        assert_eq!(result.corrected_text, "Text.");
    }

    #[test]
    fn upstream_corrected_text_is_never_overwritten() {
        let raw = raw_from(json!({
            "corrected_text": "Upstream version.",
            "detailed_errors": [{"original": "goed", "corrected": "went"}]
        }));
        let result = normalize(&raw, "I goed home.");
        assert_eq!(result.corrected_text, "Upstream version.");
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn empty_upstream_corrected_text_counts_as_missing() {
        let raw = raw_from(json!({
            "corrected_text": "",
            "detailed_errors": [{"original": "goed", "corrected": "went"}]
        }));
        assert_eq!(normalize(&raw, "I goed home.").corrected_text, "I went home.");
    }

    #[test]
    fn substitution_replaces_all_literal_occurrences() {
        let raw = raw_from(json!({
            "detailed_errors": [{"original": "a.c", "corrected": "X"}, {"original": "*", "corrected": "+"}]
        }));
        let result = normalize(&raw, "abc a.c a.c 2*3");
        assert_eq!(result.corrected_text, "abc X X 2+3");
    }

    #[test]
    fn substitutions_chain_in_insertion_order() {
        let raw = raw_from(json!({
            "detailed_errors": [
                {"original": "He go", "corrected": "He goes"},
                {"original": "goes to school", "corrected": "goes to the school"}
            ]
        }));
        let result = normalize(&raw, "He go to school.");
        assert_eq!(result.corrected_text, "He goes to the school.");
    }

    #[test]
    fn error_missing_a_phrase_is_skipped_alone() {
        let raw = raw_from(json!({
            "detailed_errors": [
                {"original": "teh", "explanation": "no correction given"},
                {"original_sentence": "recieve", "corrected_sentence": "receive"}
            ]
        }));
        let result = normalize(&raw, "teh letter I recieve");
        assert_eq!(result.corrected_text, "teh letter I receive");
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].corrected, "");
    }

    #[test]
    fn named_key_wins_over_sentence_key() {
        let fields = json!({"original": "short", "original_sentence": "the whole sentence"});
        let Value::Object(map) = fields else { unreachable!() };
        assert_eq!(Phrase::resolve(&map, "original"), Phrase::Named("short"));

        let fallback = json!({"original": "", "original_sentence": "the whole sentence"});
        let Value::Object(map) = fallback else { unreachable!() };
        assert_eq!(
            Phrase::resolve(&map, "original"),
            Phrase::Sentence("the whole sentence")
        );
        assert_eq!(Phrase::resolve(&map, "corrected"), Phrase::Missing);
    }

    #[test]
    fn embedded_block_supplies_errors_and_suggestions() {
        let feedback = "Overall solid.\n```json\n{\"errors\": [{\"original\": \"dont\", \"corrected\": \"don't\", \"error_type\": \"punctuation\"}], \"suggestions\": [\"Use more linking words\"]}\n```\nGood luck.";
        let raw = raw_from(json!({
            "feedback": feedback,
            "detailed_errors": [{"original": "alot", "corrected": "a lot"}]
        }));
        let result = normalize(&raw, "I dont like alot of noise.");
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].original, "alot");
        assert_eq!(result.errors[1].error_type, ErrorType::Punctuation);
        assert_eq!(result.suggestions, vec!["Use more linking words".to_string()]);
        assert_eq!(result.corrected_text, "I don't like a lot of noise.");
        assert_eq!(result.feedback, feedback);
    }

    #[test]
    fn malformed_block_is_swallowed() {
        let raw = raw_from(json!({
            "feedback": "See below\n```json\n{\"errors\": [oops\n```",
            "detailed_errors": [{"original": "goed", "corrected": "went"}]
        }));
        let result = normalize(&raw, "I goed.");
        assert!(result.suggestions.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.corrected_text, "I went.");
    }

    #[test]
    fn top_level_suggestions_are_ignored() {
        let raw = raw_from(json!({"feedback": "ok", "suggestions": ["top"]}));
        let result = normalize(&raw, "I am fine.");
        assert!(result.suggestions.is_empty());
        assert_eq!(result.corrected_text, "I am fine.");

        let malformed = raw_from(json!({
            "feedback": "```json\n{\"suggestions\": [\"a\"\n```",
            "suggestions": ["top"]
        }));
        assert!(normalize(&malformed, "x").suggestions.is_empty());

        let block = raw_from(json!({
            "suggestions": ["top"],
            "feedback": "```json\n{\"suggestions\": [\"from block\", \"  \"]}\n```"
        }));
        assert_eq!(normalize(&block, "x").suggestions, vec!["from block".to_string()]);
    }

    #[test]
    fn reply_suggestions_fill_only_an_empty_list() {
        let raw = raw_from(json!({"feedback": "fine", "suggestions": ["Vary sentences", ""]}));
        let mut result = normalize(&raw, "x");
        adopt_reply_suggestions(&mut result, &raw);
        assert_eq!(result.suggestions, vec!["Vary sentences".to_string()]);

        let with_block = raw_from(json!({
            "suggestions": ["top"],
            "feedback": "```json\n{\"suggestions\": [\"from block\"]}\n```"
        }));
        let mut result = normalize(&with_block, "x");
        adopt_reply_suggestions(&mut result, &with_block);
        assert_eq!(result.suggestions, vec!["from block".to_string()]);
    }

    #[test]
    fn unterminated_block_is_ignored() {
        let raw = raw_from(json!({"feedback": "```json\n{\"suggestions\": [\"a\"]}"}));
        let result = normalize(&raw, "x");
        assert!(result.suggestions.is_empty());
    }

    #[test]
    fn empty_submission_stays_empty() {
        let raw = raw_from(json!({
            "detailed_errors": [{"original": "goed", "corrected": "went"}, "not an object"]
        }));
        let result = normalize(&raw, "");
        assert_eq!(result.corrected_text, "");
        assert_eq!(result.errors.len(), 1);
    }
}
