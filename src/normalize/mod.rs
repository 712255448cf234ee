//! Cleans and constrains client-supplied button parameters before they are
//! handed to the generation backend.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

pub const MAX_TEXT_CHARS: usize = 200;
pub const MAX_ATTRIBUTE_CHARS: usize = 50;
pub const MAX_STYLE_CHARS: usize = 80;

/// The only component family currently generated.
pub const SUPPORTED_COMPONENT: &str = "button";

static FORBIDDEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)<\s*/?\s*script\b|(?:^|[^a-z])on[a-z]+\s*=|javascript\s*:|data\s*:\s*text/html|url\s*\(|expression\s*\(",
    )
    .unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Unsupported component: only \"button\" is supported")]
    UnsupportedComponent,
    #[error("Field `{0}` must be a string")]
    NotAString(&'static str),
    #[error("Field `{0}` contains disallowed content")]
    ForbiddenPattern(&'static str),
}

/// Request body as sent by the browser. Every field is optional and loosely
/// typed; [`normalize`] decides what is acceptable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawGenerateRequest {
    pub component: Value,
    pub text: Value,
    pub color: Value,
    pub size: Value,
    #[serde(rename = "styleVariant", alias = "style_variant", alias = "styleDescriptor")]
    pub style_variant: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub text: String,
    pub color: Option<String>,
    pub size: Option<String>,
    #[serde(rename = "styleVariant")]
    pub style_descriptor: Option<String>,
}

impl GenerationRequest {
    /// JSON payload sent as the user turn of the generation call.
    pub fn to_prompt_payload(&self) -> Value {
        serde_json::json!({
            "component": SUPPORTED_COMPONENT,
            "text": self.text,
            "color": self.color,
            "size": self.size,
            "styleVariant": self.style_descriptor,
        })
    }
}

pub fn normalize(raw: &RawGenerateRequest) -> Result<GenerationRequest, ValidationError> {
    let component = coerce_string("component", &raw.component)?
        .map(|c| c.trim().to_ascii_lowercase())
        .unwrap_or_else(|| SUPPORTED_COMPONENT.to_string());
    if component != SUPPORTED_COMPONENT {
        return Err(ValidationError::UnsupportedComponent);
    }

    let text = coerce_string("text", &raw.text)?
        .map(|t| clean(&t, MAX_TEXT_CHARS))
        .unwrap_or_default();
    let mut color = optional_field("color", &raw.color, MAX_ATTRIBUTE_CHARS)?;
    let mut size = optional_field("size", &raw.size, MAX_ATTRIBUTE_CHARS)?;
    let style_descriptor = optional_field("styleVariant", &raw.style_variant, MAX_STYLE_CHARS)?;

    reject_forbidden("text", &text)?;
    for (field, value) in [
        ("color", &color),
        ("size", &size),
        ("styleVariant", &style_descriptor),
    ] {
        if let Some(value) = value {
            reject_forbidden(field, value)?;
        }
    }

    // 指定了风格描述时，颜色和尺寸一律忽略
    if style_descriptor.is_some() {
        color = None;
        size = None;
    }

    Ok(GenerationRequest {
        text,
        color,
        size,
        style_descriptor,
    })
}

/// Newline/tab to space, NFKC, drop control characters, trim, truncate.
pub fn clean(input: &str, max_chars: usize) -> String {
    let flattened: String = input
        .chars()
        .map(|c| if matches!(c, '\n' | '\r' | '\t') { ' ' } else { c })
        .collect();
    let normalized: String = flattened.nfkc().filter(|c| !c.is_control()).collect();
    normalized.trim().chars().take(max_chars).collect()
}

pub fn is_forbidden(value: &str) -> bool {
    FORBIDDEN.is_match(value)
}

fn reject_forbidden(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if is_forbidden(value) {
        tracing::warn!(field, "rejected input matching deny-list");
        return Err(ValidationError::ForbiddenPattern(field));
    }
    Ok(())
}

fn optional_field(
    field: &'static str,
    value: &Value,
    max_chars: usize,
) -> Result<Option<String>, ValidationError> {
    Ok(coerce_string(field, value)?
        .map(|v| clean(&v, max_chars))
        .filter(|v| !v.is_empty()))
}

fn coerce_string(field: &'static str, value: &Value) -> Result<Option<String>, ValidationError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Array(_) | Value::Object(_) => Err(ValidationError::NotAString(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawGenerateRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn basic_request_passes_through() {
        let req = normalize(&raw(json!({
            "component": "button",
            "text": "LAUNCH",
            "color": "#E51BFC",
            "size": "super huge"
        })))
        .unwrap();
        assert_eq!(req.text, "LAUNCH");
        assert_eq!(req.color.as_deref(), Some("#E51BFC"));
        assert_eq!(req.size.as_deref(), Some("super huge"));
        assert_eq!(req.style_descriptor, None);
    }

    #[test]
    fn style_descriptor_overrides_color_and_size() {
        let req = normalize(&raw(json!({
            "text": "",
            "color": "red",
            "size": "large",
            "styleVariant": "minimal"
        })))
        .unwrap();
        assert_eq!(req.text, "");
        assert_eq!(req.color, None);
        assert_eq!(req.size, None);
        assert_eq!(req.style_descriptor.as_deref(), Some("minimal"));
    }

    #[test]
    fn blank_descriptor_does_not_override() {
        let req = normalize(&raw(json!({
            "text": "Go",
            "color": "red",
            "styleVariant": " \t "
        })))
        .unwrap();
        assert_eq!(req.color.as_deref(), Some("red"));
        assert_eq!(req.style_descriptor, None);
    }

    #[test]
    fn cleaning_flattens_whitespace_and_controls() {
        assert_eq!(clean("  a\nb\tc\r\u{0007}d  ", 200), "a b c d");
        // NFKC folds full-width forms
        assert_eq!(clean("ＢＵＹ", 200), "BUY");
        assert_eq!(clean("\u{FB01}ne", 200), "fine");
    }

    #[test]
    fn truncation_counts_characters() {
        let long = "é".repeat(300);
        assert_eq!(clean(&long, MAX_TEXT_CHARS).chars().count(), 200);

        let req = normalize(&raw(json!({ "color": "x".repeat(90), "styleVariant": "y".repeat(90) })))
            .unwrap();
        assert_eq!(req.style_descriptor.unwrap().chars().count(), MAX_STYLE_CHARS);
        assert_eq!(req.color, None);
    }

    #[test]
    fn deny_list_rejects_dangerous_input() {
        for text in [
            "<script>alert(1)</script>",
            "< SCRIPT src=x>",
            "hi onclick=alert(1)",
            "JavaScript:alert(1)",
            "data:text/html;base64,AAAA",
            "url(http://evil)",
            "expression(alert(1))",
        ] {
            let err = normalize(&raw(json!({ "text": text }))).unwrap_err();
            assert_eq!(err, ValidationError::ForbiddenPattern("text"), "{text}");
        }

        let err = normalize(&raw(json!({ "text": "ok", "color": "red; background:url(x)" })))
            .unwrap_err();
        assert_eq!(err, ValidationError::ForbiddenPattern("color"));
    }

    #[test]
    fn handlers_glued_to_non_letters_are_rejected() {
        for text in ["x_onclick=alert(1)", "foo1onload=alert(1)", "a-onmouseover = x", "onfocus=x"] {
            assert!(is_forbidden(text), "{text}");
        }
    }

    #[test]
    fn benign_words_are_not_flagged() {
        assert!(!is_forbidden("Sign on now"));
        assert!(!is_forbidden("Button"));
        assert!(!is_forbidden("Data: 5 items"));
    }

    #[test]
    fn component_must_be_button() {
        let err = normalize(&raw(json!({ "component": "card", "text": "x" }))).unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedComponent);

        assert!(normalize(&raw(json!({ "component": " Button ", "text": "x" }))).is_ok());
        assert!(normalize(&raw(json!({ "text": "x" }))).is_ok());
    }

    #[test]
    fn scalars_are_coerced_and_structures_rejected() {
        let req = normalize(&raw(json!({ "text": 42, "size": true }))).unwrap();
        assert_eq!(req.text, "42");
        assert_eq!(req.size.as_deref(), Some("true"));

        let err = normalize(&raw(json!({ "text": ["a"] }))).unwrap_err();
        assert_eq!(err, ValidationError::NotAString("text"));
    }

    #[test]
    fn prompt_payload_uses_wire_names() {
        let req = normalize(&raw(json!({ "text": "Go", "styleVariant": "neon" }))).unwrap();
        let payload = req.to_prompt_payload();
        assert_eq!(payload["component"], "button");
        assert_eq!(payload["styleVariant"], "neon");
        assert!(payload["color"].is_null());
    }
}
