//! Locating the `{Description, Images}` payload in an extraction response.
//!
//! Structured-output responses do not always arrive where they should. The
//! payload may sit in a pre-parsed `parsed` field, in the concatenated text
//! parts of the first candidate, or in those text parts wrapped in a
//! ```` ```json ```` fence. Some callers also hand over the bare payload with
//! no response envelope at all.
//!
//! ## Ladder
//!
//! 1. Response has `candidates` and a non-null `parsed` → use it.
//! 2. Join the candidate's answer text parts and run each normalisation step
//!    in [`NORMALISATION_STEPS`] before one strict parse; first success wins.
//! 3. No `candidates` → the value itself is the payload.
//!
//! The last error seen is returned when every rung fails.

use crate::error::RepairError;
use crate::output::NotePage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// A text → text rewrite tried before the strict parse.
pub type NormalisationStep = fn(&str) -> String;

/// Normalisation steps, in the order they are tried.
pub const NORMALISATION_STEPS: &[(&str, NormalisationStep)] = &[
    ("identity", identity),
    ("strip_code_fences", strip_code_fences),
];

/// Find and parse the note-page payload in `response`.
pub fn locate_note_page(response: &Value) -> Result<NotePage, RepairError> {
    if response.get("candidates").is_none() {
        return note_page_from_value(response.clone());
    }

    let mut last_err = RepairError::NoText;

    if let Some(parsed) = response.get("parsed").filter(|v| !v.is_null()) {
        match note_page_from_value(parsed.clone()) {
            Ok(page) => return Ok(page),
            Err(e) => {
                debug!("`parsed` field rejected: {e}");
                last_err = e;
            }
        }
    }

    match candidate_text(response) {
        Some(text) => parse_note_page(&text),
        None => Err(last_err),
    }
}

/// Run the normalisation ladder over `text`.
pub fn parse_note_page(text: &str) -> Result<NotePage, RepairError> {
    let mut last_err = RepairError::NoText;
    for (name, step) in NORMALISATION_STEPS {
        match parse_strict(&step(text)) {
            Ok(page) => {
                debug!("Note page parsed after `{name}`");
                return Ok(page);
            }
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

/// One strict `serde_json` parse: the text must be a JSON object.
pub fn parse_strict(text: &str) -> Result<NotePage, RepairError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| RepairError::Parse(e.to_string()))?;
    note_page_from_value(value)
}

fn note_page_from_value(value: Value) -> Result<NotePage, RepairError> {
    if !value.is_object() {
        return Err(RepairError::Shape(format!("expected an object, got {}", kind(&value))));
    }
    serde_json::from_value(value).map_err(|e| RepairError::Shape(e.to_string()))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Concatenated non-thought text parts of the first candidate.
fn candidate_text(response: &Value) -> Option<String> {
    let parts = response
        .pointer("/candidates/0/content/parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter(|p| !p.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

fn identity(input: &str) -> String {
    input.to_string()
}

static RE_CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```(?:json|JSON)?[ \t]*\r?\n?(.*?)\s*```\s*$").unwrap());

/// Remove a leading ```` ```json ```` / ```` ``` ```` and trailing ```` ``` ````.
pub fn strip_code_fences(input: &str) -> String {
    match RE_CODE_FENCE.captures(input) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAYLOAD: &str = r##"{"Description": "# Cells\nSee figure_1.png", "Images": ["a cell"]}"##;

    fn envelope(text: &str) -> Value {
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]})
    }

    #[test]
    fn test_strip_fences_json() {
        let fenced = format!("```json\n{PAYLOAD}\n```");
        assert_eq!(strip_code_fences(&fenced), PAYLOAD);
    }

    #[test]
    fn test_strip_fences_bare() {
        let fenced = format!("```\n{PAYLOAD}\n```\n");
        assert_eq!(strip_code_fences(&fenced), PAYLOAD);
    }

    #[test]
    fn test_no_fences_passthrough() {
        assert_eq!(strip_code_fences(PAYLOAD), PAYLOAD);
    }

    #[test]
    fn fenced_parses_identically() {
        let plain = locate_note_page(&envelope(PAYLOAD)).unwrap();
        let fenced = locate_note_page(&envelope(&format!("```json\n{PAYLOAD}\n```"))).unwrap();
        assert_eq!(plain, fenced);
        assert_eq!(plain.images, vec!["a cell".to_string()]);
    }

    #[test]
    fn parsed_field_preferred() {
        let response = json!({
            "candidates": [{"content": {"parts": [{"text": "not json"}]}}],
            "parsed": {"Description": "from parsed", "Images": []}
        });
        assert_eq!(locate_note_page(&response).unwrap().description, "from parsed");
    }

    #[test]
    fn null_parsed_falls_back_to_text() {
        let mut response = envelope(PAYLOAD);
        response["parsed"] = Value::Null;
        assert!(locate_note_page(&response).unwrap().description.starts_with("# Cells"));
    }

    #[test]
    fn split_text_parts_joined() {
        let (a, b) = PAYLOAD.split_at(20);
        let response = json!({"candidates": [{"content": {"parts": [{"text": a}, {"text": b}]}}]});
        assert_eq!(locate_note_page(&response).unwrap().images.len(), 1);
    }

    #[test]
    fn thought_parts_ignored() {
        let response = json!({"candidates": [{"content": {"parts": [
            {"text": "Let me think {", "thought": true},
            {"text": PAYLOAD}
        ]}}]});
        assert!(locate_note_page(&response).is_ok());
    }

    #[test]
    fn bare_payload_accepted() {
        let page = locate_note_page(&json!({"Description": "x"})).unwrap();
        assert_eq!(page.description, "x");
        assert!(page.images.is_empty());
    }

    #[test]
    fn no_text_parts() {
        let response = json!({"candidates": [{"content": {"parts": []}}]});
        assert_eq!(locate_note_page(&response), Err(RepairError::NoText));
    }

    #[test]
    fn garbage_text_is_parse_error() {
        let err = locate_note_page(&envelope("I could not read this page.")).unwrap_err();
        assert!(matches!(err, RepairError::Parse(_)));
    }

    #[test]
    fn array_payload_is_shape_error() {
        let err = parse_strict(r#"["a", "b"]"#).unwrap_err();
        assert!(matches!(err, RepairError::Shape(_)));
    }
}
