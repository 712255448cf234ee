use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::GenerationError;

pub const SCHEMA_NAME: &str = "button_html";

pub const SYSTEM_INSTRUCTION: &str = "You design a single HTML <button> element for a live preview. \
The user message is a JSON object with `text`, `color`, `size` and `styleVariant`. \
Return exactly one <button> whose label is `text` verbatim. \
Express the look with an inline `style` attribute only, using background, background-color, color, \
font-size, padding, border, border-radius, box-shadow, letter-spacing, text-transform, min-width, \
min-height, width or height. When `styleVariant` is present, interpret it freely and ignore color and size. \
Never use scripts, event handler attributes, classes, urls, !important or expression(). \
You may add data-* attributes. Put a short explanation of your choices in `reasoning`.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub html: String,
    pub reasoning: String,
}

/// JSON schema the backend must conform to.
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "html": { "type": "string" },
            "reasoning": { "type": "string" }
        },
        "required": ["html", "reasoning"],
        "additionalProperties": false
    })
}

pub fn parse_model_output(text: &str) -> Result<ModelOutput, GenerationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    let output: ModelOutput = serde_json::from_str(text)
        .map_err(|e| GenerationError::MalformedOutput(e.to_string()))?;
    if output.html.trim().is_empty() {
        return Err(GenerationError::MalformedOutput("empty html".into()));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conforming_output() {
        let out = parse_model_output(
            r#" {"html":"<button style=\"color:red\">Go</button>","reasoning":"red"} "#,
        )
        .unwrap();
        assert!(out.html.starts_with("<button"));
        assert_eq!(out.reasoning, "red");
    }

    #[test]
    fn rejects_empty_and_malformed() {
        assert!(matches!(
            parse_model_output("  "),
            Err(GenerationError::EmptyResponse)
        ));
        assert!(matches!(
            parse_model_output("<button>Go</button>"),
            Err(GenerationError::MalformedOutput(_))
        ));
        assert!(matches!(
            parse_model_output(r#"{"html":"<button>Go</button>"}"#),
            Err(GenerationError::MalformedOutput(_))
        ));
        assert!(matches!(
            parse_model_output(r#"{"html":"","reasoning":"none"}"#),
            Err(GenerationError::MalformedOutput(_))
        ));
    }

    #[test]
    fn schema_requires_both_fields() {
        let schema = response_schema();
        assert_eq!(schema["required"], json!(["html", "reasoning"]));
        assert_eq!(schema["additionalProperties"], false);
    }
}
