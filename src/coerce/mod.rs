//! Turns untrusted model output into exactly one safe `<button>` element.
//!
//! Only the first `<button>` in the fragment is considered. Its inline style is
//! filtered against [`ALLOWED_PROPERTIES`] and a value deny-list, its `data-*`
//! attributes are kept, everything else (event handlers, `href`, the model's own
//! label, nested markup) is dropped. The label is always the caller's text.

use std::fmt;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;
use tracing::debug;

pub const ALLOWED_PROPERTIES: &[&str] = &[
    "background",
    "background-color",
    "color",
    "font-size",
    "padding",
    "border",
    "border-radius",
    "box-shadow",
    "letter-spacing",
    "text-transform",
    "min-width",
    "min-height",
    "width",
    "height",
];

/// Substrings that disqualify a declaration value, compared lower-cased.
/// The backslash catches CSS escapes such as `u\72l(`.
const FORBIDDEN_VALUE_PARTS: &[&str] = &["url(", "!important", "expression(", "javascript:", "\\"];

// 属性值内允许出现 '>'，所以开始标签按引号切分
const OPEN_TAG: &str = r#"<button\b((?:[^>"']|"[^"]*"|'[^']*')*)>"#;

static BUTTON: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?is){OPEN_TAG}.*?</button\s*>")).unwrap());

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s"'<>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#).unwrap()
});

static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]+);").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoerceError {
    #[error("model did not return a button")]
    NoButton,
}

/// Declarations added when the label is blank so the button keeps a visible,
/// clickable area. An empty value disables that piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffordanceDefaults {
    pub padding: String,
    pub border: String,
    pub background: String,
}

impl Default for AffordanceDefaults {
    fn default() -> Self {
        Self {
            padding: "10px 16px".to_string(),
            border: "1px solid #ccc".to_string(),
            background: "#f7f7f7".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedButton {
    pub style_declarations: Vec<(String, String)>,
    pub data_attributes: Vec<(String, String)>,
    pub label: String,
}

impl SanitizedButton {
    pub fn style(&self) -> String {
        self.style_declarations
            .iter()
            .map(|(property, value)| format!("{property}: {value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn to_html(&self) -> String {
        self.to_string()
    }

    fn has_property(&self, names: &[&str]) -> bool {
        self.style_declarations
            .iter()
            .any(|(property, _)| names.contains(&property.as_str()))
    }
}

impl fmt::Display for SanitizedButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<button")?;
        let style = self.style();
        if !style.is_empty() {
            write!(f, " style=\"{}\"", escape_attribute(&style))?;
        }
        for (name, value) in &self.data_attributes {
            write!(f, " {}=\"{}\"", name, escape_attribute(value))?;
        }
        write!(f, " type=\"button\">{}</button>", escape_text(&self.label))
    }
}

pub fn coerce(
    raw_html: &str,
    exact_label: &str,
    affordance: &AffordanceDefaults,
) -> Result<SanitizedButton, CoerceError> {
    let mut matches = BUTTON.find_iter(raw_html);
    let first = matches.next().ok_or(CoerceError::NoButton)?;
    let discarded = matches.count();
    if discarded > 0 {
        debug!(discarded, "model returned extra buttons, keeping the first");
    }

    let attributes = parse_attributes(first.as_str());

    let style = attributes
        .iter()
        .find(|(name, _)| name == "style")
        .map(|(_, value)| value.as_str())
        .unwrap_or_default();

    let mut data_attributes: Vec<(String, String)> = Vec::new();
    for (name, value) in &attributes {
        if name.starts_with("data-") && !data_attributes.iter().any(|(n, _)| n == name) {
            data_attributes.push((name.clone(), value.clone()));
        }
    }

    let mut button = SanitizedButton {
        style_declarations: filter_style(style),
        data_attributes,
        label: exact_label.to_string(),
    };

    if exact_label.trim().is_empty() {
        ensure_visible(&mut button, affordance);
    }

    Ok(button)
}

/// Keep only allow-listed properties whose values pass the deny-list.
pub fn filter_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .map(str::trim)
        .filter_map(|declaration| declaration.split_once(':'))
        .filter_map(|(property, value)| {
            let property = property.trim().to_ascii_lowercase();
            let value = value.trim();
            if property.is_empty() || value.is_empty() {
                return None;
            }
            if !ALLOWED_PROPERTIES.contains(&property.as_str()) {
                return None;
            }
            let lowered = value.to_ascii_lowercase();
            if FORBIDDEN_VALUE_PARTS
                .iter()
                .any(|part| lowered.contains(part))
            {
                return None;
            }
            Some((property, value.to_string()))
        })
        .collect()
}

fn ensure_visible(button: &mut SanitizedButton, affordance: &AffordanceDefaults) {
    if !button.has_property(&["padding"]) && !affordance.padding.is_empty() {
        button
            .style_declarations
            .push(("padding".into(), affordance.padding.clone()));
    }
    if !button.has_property(&["border"]) && !affordance.border.is_empty() {
        button
            .style_declarations
            .push(("border".into(), affordance.border.clone()));
    }
    if button.style_declarations.is_empty()
        && !button.has_property(&["background", "background-color"])
        && !affordance.background.is_empty()
    {
        button
            .style_declarations
            .push(("background-color".into(), affordance.background.clone()));
    }
}

/// Attributes of the opening tag, names lower-cased, values entity-decoded.
fn parse_attributes(fragment: &str) -> Vec<(String, String)> {
    let Some(open) = BUTTON.captures(fragment).and_then(|c| c.get(1)) else {
        return Vec::new();
    };
    ATTRIBUTE
        .captures_iter(open.as_str())
        .map(|c| {
            let name = c[1].to_ascii_lowercase();
            let value = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            (name, value)
        })
        .collect()
}

fn decode_entities(value: &str) -> String {
    ENTITY
        .replace_all(value, |c: &Captures| {
            let entity = &c[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "quot" => Some('"'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16).ok())
                    .unwrap_or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| c[0].to_string())
        })
        .into_owned()
}

pub fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

pub fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(html: &str, label: &str) -> String {
        coerce(html, label, &AffordanceDefaults::default())
            .unwrap()
            .to_html()
    }

    #[test]
    fn keeps_allowed_style_and_replaces_label() {
        let out = run(
            r#"<button style="background-color:#E51BFC; font-size: 32px; position:absolute" onclick="alert(1)">Blast off</button>"#,
            "LAUNCH",
        );
        assert_eq!(
            out,
            r#"<button style="background-color: #E51BFC; font-size: 32px" type="button">LAUNCH</button>"#
        );
    }

    #[test]
    fn drops_dangerous_values() {
        let out = run(
            r#"<button style="background: URL(x.png); color: red !IMPORTANT; width: expression(1); height: javascript:1; border: 1px solid red">x</button>"#,
            "Go",
        );
        assert_eq!(
            out,
            r#"<button style="border: 1px solid red" type="button">Go</button>"#
        );
    }

    #[test]
    fn drops_declarations_with_missing_parts() {
        let styles = filter_style("color:; :red; padding; ; Color : Blue ;width:10px:20px");
        assert_eq!(
            styles,
            vec![
                ("color".to_string(), "Blue".to_string()),
                ("width".to_string(), "10px:20px".to_string()),
            ]
        );
    }

    #[test]
    fn keeps_data_attributes_only() {
        let out = run(
            r#"<BUTTON class="x" Data-Variant='neon' data-x="a&quot;b" id=y data-flag disabled>t</BUTTON>"#,
            "t",
        );
        assert_eq!(
            out,
            r#"<button data-variant="neon" data-x="a&quot;b" data-flag="" type="button">t</button>"#
        );
    }

    #[test]
    fn first_of_many_buttons_wins() {
        let out = run(
            r#"<div><button style="color: red">A</button><button style="color: blue">B</button></div>"#,
            "A",
        );
        assert_eq!(out, r#"<button style="color: red" type="button">A</button>"#);
    }

    #[test]
    fn no_button_is_an_error() {
        let err = coerce("<a href='#'>nope</a>", "x", &AffordanceDefaults::default()).unwrap_err();
        assert_eq!(err, CoerceError::NoButton);
        assert!(coerce("<button>unterminated", "x", &AffordanceDefaults::default()).is_err());
    }

    #[test]
    fn label_is_escaped_and_model_label_ignored() {
        let out = run(
            r#"<button><script>alert(1)</script>Click</button>"#,
            r#"Tom & "Jerry" <3"#,
        );
        assert_eq!(
            out,
            r#"<button type="button">Tom &amp; &quot;Jerry&quot; &lt;3</button>"#
        );
        assert!(!out.contains("<script"));
    }

    #[test]
    fn empty_label_gets_affordance() {
        let out = run("<button></button>", "");
        assert_eq!(
            out,
            r#"<button style="padding: 10px 16px; border: 1px solid #ccc" type="button"></button>"#
        );

        let out = run(r#"<button style="padding: 2px; border: none">x</button>"#, "   ");
        assert_eq!(
            out,
            r#"<button style="padding: 2px; border: none" type="button">   </button>"#
        );
    }

    #[test]
    fn background_fallback_when_other_affordances_disabled() {
        let affordance = AffordanceDefaults {
            padding: String::new(),
            border: String::new(),
            ..AffordanceDefaults::default()
        };
        let out = coerce("<button></button>", "", &affordance).unwrap().to_html();
        assert_eq!(
            out,
            r#"<button style="background-color: #f7f7f7" type="button"></button>"#
        );
    }

    #[test]
    fn quoted_angle_brackets_do_not_end_the_tag() {
        let out = run(r#"<button data-note="a>b" style="color: red">x</button>"#, "x");
        assert_eq!(
            out,
            r#"<button style="color: red" data-note="a>b" type="button">x</button>"#
        );
    }

    #[test]
    fn encoded_forbidden_values_are_caught() {
        let out = run(r#"<button style="background: url&#40;x)">x</button>"#, "x");
        assert_eq!(out, r#"<button type="button">x</button>"#);
    }

    #[test]
    fn coercing_own_output_is_idempotent() {
        let inputs = [
            (
                r#"<button style="color: red; box-shadow: 0 0 2px &quot;x&quot;" data-a="1 & 2 <b>" onmouseover=x>hi</button>"#,
                "hi & bye",
            ),
            ("<button></button>", ""),
            (r#"<button style='letter-spacing:2px'>z</button>"#, "<z>"),
        ];
        for (html, label) in inputs {
            let once = run(html, label);
            let twice = run(&once, label);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn every_emitted_property_is_allowed() {
        let style = "top:0;color:red;behavior:url(x);-moz-binding:x;background-image:x;padding:1px";
        for (property, _) in filter_style(style) {
            assert!(ALLOWED_PROPERTIES.contains(&property.as_str()));
        }
    }
}
