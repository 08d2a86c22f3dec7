//! Placeholder substitution for credential templates.
//!
//! Templates are plain JSON documents carrying `{{variable}}` markers.
//! Substitution happens at the text level over the serialized document,
//! so a marker can appear inside any string value, and the result is
//! re-parsed to guarantee the output is still valid JSON.

use std::collections::HashMap;

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Rendered template produced invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("template serialization failed: {0}")]
    Ser(serde_json::Error),
}

/// Render `template` by replacing every `{{name}}` marker with the
/// matching entry from `data`. Missing or null variables render as the
/// empty string; data entries with no marker in the template are
/// ignored.
pub fn render(template: &Value, data: &HashMap<String, Value>) -> Result<Value, TemplateError> {
    let text = serde_json::to_string(template).map_err(TemplateError::Ser)?;
    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                out.push_str(&substitution(data.get(name)));
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated marker, keep the literal text.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);

    serde_json::from_str(&out).map_err(TemplateError::InvalidJson)
}

/// The replacement fragment for one variable, escaped so it can be
/// spliced into the middle of a JSON string literal.
fn substitution(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => {
            let quoted = Value::String(s.clone()).to_string();
            quoted[1..quoted.len() - 1].to_string()
        }
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn substitutes_into_nested_strings() {
        let template = json!({
            "credentialSubject": {
                "name": "{{recipientName}}",
                "note": "Issued to {{recipientName}} by {{issuer}}"
            }
        });
        let rendered = render(
            &template,
            &data(&[
                ("recipientName", json!("Ada")),
                ("issuer", json!("Plexus")),
            ]),
        )
        .unwrap();
        assert_eq!(rendered["credentialSubject"]["name"], "Ada");
        assert_eq!(
            rendered["credentialSubject"]["note"],
            "Issued to Ada by Plexus"
        );
    }

    #[test]
    fn missing_and_null_variables_render_empty() {
        let template = json!({"a": "x{{gone}}y", "b": "{{nothing}}"});
        let rendered = render(&template, &data(&[("nothing", Value::Null)])).unwrap();
        assert_eq!(rendered["a"], "xy");
        assert_eq!(rendered["b"], "");
    }

    #[test]
    fn string_values_with_quotes_stay_valid_json() {
        let template = json!({"msg": "{{payload}}"});
        let rendered = render(
            &template,
            &data(&[("payload", json!("she said \"hi\"\nbye"))]),
        )
        .unwrap();
        assert_eq!(rendered["msg"], "she said \"hi\"\nbye");
    }

    #[test]
    fn non_string_values_are_stringified() {
        let template = json!({"count": "{{n}} items", "flag": "{{on}}"});
        let rendered = render(&template, &data(&[("n", json!(3)), ("on", json!(true))])).unwrap();
        assert_eq!(rendered["count"], "3 items");
        assert_eq!(rendered["flag"], "true");
    }

    #[test]
    fn unknown_data_entries_are_ignored() {
        let template = json!({"a": 1});
        let rendered = render(&template, &data(&[("unused", json!("v"))])).unwrap();
        assert_eq!(rendered, template);
    }

    #[test]
    fn whitespace_inside_markers_is_tolerated() {
        let template = json!({"a": "{{ name }}"});
        let rendered = render(&template, &data(&[("name", json!("ok"))])).unwrap();
        assert_eq!(rendered["a"], "ok");
    }
}
