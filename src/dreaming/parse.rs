//! JSON recovery for free-form LLM output.
//!
//! Models are instructed to return strict JSON but routinely wrap it in
//! markdown fences or prose. The ladder here is: strip fences → strict
//! parse → brace-balanced object extraction from mixed text. The LLM
//! repair pass sits above this, in the chunker/synthesizer; there is no
//! rule-based content fallback below it.

use serde_json::Value;

/// Strips markdown code fences (```json ... ``` or ``` ... ```).
#[must_use]
pub fn strip_code_fences(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

/// Parses the cleaned text directly as JSON.
#[must_use]
pub fn parse_strict(text: &str) -> Option<Value> {
    serde_json::from_str(strip_code_fences(text)).ok()
}

/// Extracts every brace-balanced `{...}` candidate from mixed prose,
/// respecting string literals and escapes, and returns those that parse.
///
/// Candidates are yielded in order of their opening brace so callers can
/// take the first one that normalises into the expected shape.
#[must_use]
pub fn balanced_objects(text: &str) -> Vec<Value> {
    let bytes = text.as_bytes();
    let mut values = Vec::new();
    let mut start = 0;

    while let Some(open) = find_byte(bytes, b'{', start) {
        if let Some(end) = balanced_end(text, open) {
            if let Ok(value) = serde_json::from_str::<Value>(&text[open..=end]) {
                values.push(value);
                start = end + 1;
                continue;
            }
        }
        start = open + 1;
    }
    values
}

/// Finds the matching close brace for the object opening at `open`,
/// tracking string state.
fn balanced_end(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;

    for (i, c) in text[open..].char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn find_byte(bytes: &[u8], needle: u8, from: usize) -> Option<usize> {
    bytes.get(from..)?.iter().position(|&b| b == needle).map(|i| from + i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("{}"), "{}");
    }

    #[test]
    fn test_parse_strict_with_fences() {
        assert_eq!(parse_strict("```json\n{\"a\": 1}\n```"), Some(json!({"a": 1})));
        assert_eq!(parse_strict("not json"), None);
    }

    #[test]
    fn test_balanced_extraction_from_prose() {
        let text = "Here is the result:\n{\"chunks\": [{\"content\": \"x\"}]}\nHope that helps!";
        let values = balanced_objects(text);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["chunks"][0]["content"], "x");
    }

    #[test]
    fn test_balanced_extraction_handles_braces_in_strings() {
        let text = r#"noise {"a": "has } brace", "b": 2} tail"#;
        let values = balanced_objects(text);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["b"], 2);
    }

    #[test]
    fn test_balanced_extraction_skips_invalid_candidates() {
        let text = "{not json} but {\"ok\": true}";
        let values = balanced_objects(text);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["ok"], true);
    }

    #[test]
    fn test_unterminated_object_yields_nothing() {
        assert!(balanced_objects("{\"a\": ").is_empty());
    }
}
