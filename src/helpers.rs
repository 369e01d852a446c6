//! Helper functions for model-response sanitation and HTML slimming.
//!
//! Model output is never trusted as-is: responses arrive wrapped in
//! markdown fences, with invalid escape sequences, or buried in prose.
//! Everything here is best-effort and side-effect free.

use crate::error::{EngineError, EngineResult};
use serde_json::Value;

/// Clean a model response so it can be decoded as JSON.
///
/// Strips markdown code fences and doubles backslashes that do not start a
/// valid JSON escape sequence (a common failure when models emit regex-like
/// selector strings).
pub fn clean_json_response(text: &str) -> String {
    if text.trim().is_empty() {
        return "{}".to_string();
    }

    let mut cleaned = String::with_capacity(text.len());
    for line in text.lines() {
        let t = line.trim();
        let stripped = t
            .strip_prefix("```json")
            .or_else(|| t.strip_prefix("```"))
            .unwrap_or(t);
        let stripped = stripped.strip_suffix("```").unwrap_or(stripped);
        if stripped.trim().is_empty() && t.starts_with("```") {
            continue;
        }
        cleaned.push_str(stripped);
        cleaned.push('\n');
    }

    let bytes = cleaned.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() + 8);
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            match bytes.get(i + 1) {
                Some(&next)
                    if matches!(
                        next,
                        b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't' | b'u'
                    ) =>
                {
                    out.push(b'\\');
                    out.push(next);
                    i += 2;
                }
                _ => {
                    // Invalid escape: double the backslash so it survives decoding.
                    out.push(b'\\');
                    out.push(b'\\');
                    i += 1;
                }
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    match String::from_utf8(out) {
        Ok(s) => s.trim().to_string(),
        Err(_) => cleaned.trim().to_string(),
    }
}

/// Extract the last balanced top-level JSON object from text.
///
/// Scans forward tracking brace depth and string boundaries, so objects
/// embedded in prose or trailing commentary are handled.
pub fn extract_last_json_object(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let mut last: Option<(usize, usize)> = None;
    let mut start: Option<usize> = None;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(st) = start {
                            last = Some((st, i + 1));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    last.map(|(a, b)| &s[a..b])
}

/// Best-effort parse of a model response into a JSON object.
///
/// Tries, in order: the raw text, the sanitized text, the last balanced
/// JSON object inside either. Returns `InvalidField` when nothing decodes.
pub fn best_effort_parse_json_object(s: &str) -> EngineResult<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(s) {
        return Ok(v);
    }

    let cleaned = clean_json_response(s);
    if let Ok(v) = serde_json::from_str::<Value>(&cleaned) {
        return Ok(v);
    }

    if let Some(obj) = extract_last_json_object(&cleaned) {
        if let Ok(v) = serde_json::from_str::<Value>(obj) {
            return Ok(v);
        }
    }

    if let Some(obj) = extract_last_json_object(s) {
        if let Ok(v) = serde_json::from_str::<Value>(obj) {
            return Ok(v);
        }
    }

    log::warn!(
        "best_effort_parse_json_object failed on content (first 300 chars): {}",
        truncate_chars(s, 300)
    );
    Err(EngineError::InvalidField("model response was not a JSON object"))
}

/// Slim HTML for a model prompt while preserving selector-relevant structure.
///
/// Removes script/style/svg blocks, inline style and event-handler
/// attributes, collapses whitespace, and truncates to `char_budget` chars.
pub fn clean_html_content(html: &str, char_budget: usize) -> String {
    let stripped = strip_tag_blocks(html, "script", "");
    let stripped = strip_tag_blocks(&stripped, "style", "");
    let stripped = strip_tag_blocks(&stripped, "svg", "[svg]");
    let stripped = strip_noise_attrs(&stripped);

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, char_budget).to_string()
}

/// Remove all `<tag>...</tag>` blocks, case-insensitively.
fn strip_tag_blocks(html: &str, tag: &str, replacement: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}");

    let mut out = String::with_capacity(html.len());
    let mut pos = 0;
    while let Some(rel) = lower[pos..].find(&open) {
        let start = pos + rel;
        out.push_str(&html[pos..start]);
        out.push_str(replacement);

        let end = lower[start..]
            .find(&close)
            .map(|rel_close| start + rel_close)
            .and_then(|close_start| {
                lower[close_start..]
                    .find('>')
                    .map(|rel_gt| close_start + rel_gt + 1)
            });

        match end {
            Some(e) => pos = e,
            None => {
                // Unterminated block: drop the remainder.
                pos = html.len();
                break;
            }
        }
    }
    out.push_str(&html[pos..]);
    out
}

/// Remove ` style="..."` and ` on*="..."` attributes.
fn strip_noise_attrs(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let bytes = html.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b' ' {
            if let Some(span) = noise_attr_span(&lower[i..]) {
                i += span;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    // Only whole ASCII spans were removed, so the bytes remain valid UTF-8.
    String::from_utf8(out).unwrap_or_else(|_| html.to_string())
}

/// Length of a ` style="..."` or ` onxxx="..."` span at the start of `s`.
fn noise_attr_span(s: &str) -> Option<usize> {
    let rest = s.strip_prefix(' ')?;
    let name_len = if rest.starts_with("style") {
        5
    } else if let Some(after_on) = rest.strip_prefix("on") {
        let l = after_on
            .bytes()
            .take_while(|b| b.is_ascii_alphabetic())
            .count();
        if l == 0 {
            return None;
        }
        2 + l
    } else {
        return None;
    };

    let after_name = &rest[name_len..];
    let value = after_name.strip_prefix("=\"")?;
    let close = value.find('"')?;
    Some(1 + name_len + 2 + close + 1)
}

/// Truncate to at most `budget` chars without splitting a code point.
pub fn truncate_chars(s: &str, budget: usize) -> &str {
    match s.char_indices().nth(budget) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Log-safe credential display: last four characters only.
pub fn mask_key(key: &str) -> String {
    let tail: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_json_response_fences() {
        let raw = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(clean_json_response(raw), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_clean_json_response_invalid_escape() {
        let raw = r#"{"selector": "div.row\d"}"#;
        let cleaned = clean_json_response(raw);
        let v: Value = serde_json::from_str(&cleaned).unwrap();
        assert_eq!(v["selector"], "div.row\\d");
    }

    #[test]
    fn test_clean_json_response_empty() {
        assert_eq!(clean_json_response(""), "{}");
        assert_eq!(clean_json_response("   "), "{}");
    }

    #[test]
    fn test_extract_last_json_object() {
        let s = "thinking... {\"a\": 1} more text {\"b\": {\"c\": 2}} done";
        assert_eq!(extract_last_json_object(s), Some("{\"b\": {\"c\": 2}}"));
    }

    #[test]
    fn test_extract_last_json_object_braces_in_strings() {
        let s = r#"{"js": "function() { return {}; }"} trailing"#;
        let obj = extract_last_json_object(s).unwrap();
        let v: Value = serde_json::from_str(obj).unwrap();
        assert_eq!(v["js"], "function() { return {}; }");
    }

    #[test]
    fn test_best_effort_parse_direct() {
        let v = best_effort_parse_json_object("{\"key\": \"value\"}").unwrap();
        assert_eq!(v["key"], "value");
    }

    #[test]
    fn test_best_effort_parse_with_prose_and_fences() {
        let raw = "Here is the mapping:\n```json\n{\"home_score\": \".new-score\"}\n```\nDone.";
        let v = best_effort_parse_json_object(raw).unwrap();
        assert_eq!(v["home_score"], ".new-score");
    }

    #[test]
    fn test_best_effort_parse_failure() {
        assert!(best_effort_parse_json_object("not json at all").is_err());
    }

    #[test]
    fn test_clean_html_strips_scripts_and_styles() {
        let html = "<div class=\"a\"><script>var x = 1;</script><style>.a{}</style>text</div>";
        let cleaned = clean_html_content(html, 10_000);
        assert!(!cleaned.contains("var x"));
        assert!(!cleaned.contains(".a{}"));
        assert!(cleaned.contains("class=\"a\""));
        assert!(cleaned.contains("text"));
    }

    #[test]
    fn test_clean_html_strips_noise_attrs() {
        let html = r#"<div style="color: red" onclick="doThing()" class="keep">x</div>"#;
        let cleaned = clean_html_content(html, 10_000);
        assert!(!cleaned.contains("color: red"));
        assert!(!cleaned.contains("doThing"));
        assert!(cleaned.contains("class=\"keep\""));
    }

    #[test]
    fn test_clean_html_respects_budget() {
        let html = "<p>".to_string() + &"a".repeat(500) + "</p>";
        let cleaned = clean_html_content(&html, 100);
        assert_eq!(cleaned.chars().count(), 100);
    }

    #[test]
    fn test_truncate_chars_boundary() {
        let s = "héllo wörld";
        assert_eq!(truncate_chars(s, 4), "héll");
        assert_eq!(truncate_chars(s, 100), s);
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-abcdef1234"), "...1234");
        assert_eq!(mask_key("ab"), "...ab");
    }
}
