//! Balanced-JSON extraction from completion text.
//!
//! Models wrap JSON replies in prose and markdown fences more often than
//! not. Extraction strips one optional leading code fence, locates the
//! first `{`, and scans forward tracking brace depth with string/escape
//! awareness until the matching `}`. The substring must parse as JSON.

use crate::error::{CartoError, CartoResult};

/// Extract the first balanced JSON object from completion text.
pub fn extract_json(text: &str) -> CartoResult<serde_json::Value> {
    let stripped = strip_fences(text.trim());

    let start = stripped.find('{').ok_or_else(|| CartoError::JsonExtract {
        message: "no JSON object found in completion".into(),
    })?;

    let candidate = balanced_object(&stripped[start..]).ok_or_else(|| {
        CartoError::JsonExtract {
            message: "unbalanced braces in completion".into(),
        }
    })?;

    serde_json::from_str(candidate).map_err(|e| CartoError::JsonExtract {
        message: format!("extracted object is not valid JSON: {e}"),
    })
}

/// Extract and deserialize into a concrete type.
pub fn extract_into<T: serde::de::DeserializeOwned>(text: &str) -> CartoResult<T> {
    let value = extract_json(text)?;
    serde_json::from_value(value).map_err(|e| CartoError::JsonExtract {
        message: format!("object does not match expected schema: {e}"),
    })
}

/// Strip one leading ```json / ``` fence and its matching trailing fence.
fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    // Skip the info string ("json") through the end of the fence line.
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => return text,
    };

    match body.rfind("```") {
        Some(i) => &body[..i],
        None => body,
    }
}

/// Scan `text` (starting at `{`) and return the substring through the
/// matching close brace, honoring string literals and backslash escapes.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_object() {
        let value = extract_json(r#"{"a": 1}"#).expect("extract");
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_fenced_json() {
        let text = "```json\n{\"summary\": \"ok\"}\n```";
        let value = extract_json(text).expect("extract");
        assert_eq!(value["summary"], "ok");
    }

    #[test]
    fn test_fence_without_info_string() {
        let text = "```\n{\"a\": [1, 2]}\n```";
        let value = extract_json(text).expect("extract");
        assert_eq!(value["a"][1], 2);
    }

    #[test]
    fn test_prose_around_object() {
        let text = "Here is the analysis you asked for:\n{\"ok\": true}\nLet me know if you need more.";
        let value = extract_json(text).expect("extract");
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn test_prefix_fence_json_fence_suffix() {
        let text = "Sure!\n```json\n{\"nested\": {\"deep\": [1]}}\n```\nthanks";
        // The prefix keeps the fence from being at the very start; the
        // brace scan still finds the object.
        let value = extract_json(text).expect("extract");
        assert_eq!(value["nested"]["deep"][0], 1);
    }

    #[test]
    fn test_braces_inside_strings_ignored() {
        let text = r#"{"code": "if x { y() }", "n": 1}"#;
        let value = extract_json(text).expect("extract");
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn test_escaped_quotes_inside_strings() {
        let text = r#"{"msg": "she said \"hi {there}\"", "n": 2}"#;
        let value = extract_json(text).expect("extract");
        assert_eq!(value["n"], 2);
    }

    #[test]
    fn test_trailing_garbage_after_object() {
        let text = r#"{"a": 1} and some trailing words"#;
        let value = extract_json(text).expect("extract");
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_no_object_is_error() {
        let err = extract_json("no json here").expect_err("should fail");
        assert!(err.to_string().contains("no JSON object"));
    }

    #[test]
    fn test_unbalanced_is_error() {
        let err = extract_json(r#"{"a": {"b": 1}"#).expect_err("should fail");
        assert!(err.to_string().starts_with("llm: json extraction"));
    }

    #[test]
    fn test_invalid_json_is_error() {
        let err = extract_json(r#"{a: 1}"#).expect_err("should fail");
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn test_extract_into_typed() {
        #[derive(serde::Deserialize)]
        struct Reply {
            summary: String,
        }
        let reply: Reply = extract_into("```json\n{\"summary\": \"fine\"}\n```").expect("typed");
        assert_eq!(reply.summary, "fine");
    }
}
