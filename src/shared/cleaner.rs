use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// Fields probed, in order, for the displayable text of a JSON object.
pub const CONTENT_FIELDS: [&str; 7] = [
    "message", "response", "content", "text", "data", "result", "output",
];

static UNICODE_ESCAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\u([0-9A-Fa-f]{4})").unwrap());

static STRAY_QUOTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*["'`]|["'`]\s*$"#).unwrap());

static HASH_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"#{3,}").unwrap());

static BULLET_GLYPHS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{2022}\x{2023}\x{25E6}\x{2043}\x{2219}]").unwrap());

static CURLY_QUOTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{201C}\x{201D}\x{2018}\x{2019}]").unwrap());

static LONG_DASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\x{2013}\x{2014}]").unwrap());

// Word characters are ASCII only; Hebrew is admitted through its own block.
static DISALLOWED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[^A-Za-z0-9_\s\x{0590}-\x{05FF}\x{200E}\x{200F}.,;:!?()\[\]{}"'/%-]"#).unwrap()
});

static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Normalize a raw bot payload into displayable plain text.
///
/// Payloads that look like JSON are unwrapped first; anything that fails to
/// parse is cleaned as text. Never fails.
pub fn clean(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let trimmed = raw.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return clean_text(raw);
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => clean_value(&value),
        Err(e) => {
            debug!("Payload looked like JSON but did not parse: {}", e);
            clean_text(raw)
        }
    }
}

fn clean_value(value: &Value) -> String {
    match value {
        Value::String(s) => clean(s),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => clean_text(s),
                Value::Object(obj) => extract_from_object(obj),
                other => loose_string(other),
            })
            .filter(|item| !item.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        Value::Object(obj) => extract_from_object(obj),
        other => clean_text(&loose_string(other)),
    }
}

/// Pull the displayable text out of a keyed payload.
pub fn extract_from_object(obj: &Map<String, Value>) -> String {
    for field in CONTENT_FIELDS {
        if let Some(Value::String(s)) = obj.get(field)
            && !s.is_empty()
        {
            return clean_text(s);
        }
    }

    let values: Vec<String> = obj
        .values()
        .filter_map(|v| v.as_str())
        .filter(|s| s.trim().chars().count() > 10)
        .map(clean_text)
        .collect();

    if !values.is_empty() {
        return values.join("\n\n");
    }

    let pretty = serde_json::to_string_pretty(obj).unwrap_or_default();
    clean_text(&pretty)
}

/// Stringify a JSON value the way a loosely typed runtime would when it is
/// concatenated into text.
pub fn loose_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => loose_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Textual cleaning pass. Each step runs over the output of the previous one.
pub fn clean_text(text: &str) -> String {
    let text = text
        .trim_start_matches(['[', ']', '"'])
        .trim_end_matches(['[', ']', '"']);

    let text = text
        .replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\\"", "\"")
        .replace("\\r", "\r")
        .replace("\\\\", "\\");

    let text = UNICODE_ESCAPE.replace_all(&text, |caps: &regex::Captures| {
        u32::from_str_radix(&caps[1], 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    let text = STRAY_QUOTES.replace_all(&text, "");
    let text = HASH_RUNS.replace_all(&text, "");
    let text = BULLET_GLYPHS.replace_all(&text, "");
    let text = CURLY_QUOTES.replace_all(&text, "\"");
    let text = LONG_DASHES.replace_all(&text, "-");
    let text = text.replace('\u{00A0}', " ");
    let text = DISALLOWED.replace_all(&text, "");

    let text = text
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");

    EXCESS_NEWLINES.replace_all(&text, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(clean("שלום עולם"), "שלום עולם");
        assert_eq!(clean(""), "");
    }

    #[test]
    fn test_escape_sequences_are_unescaped() {
        let raw = r#""line one\nline two\t\"quoted\" ש""#;
        assert_eq!(clean(raw), "line one\nline two\t\"quoted\" ש");
    }

    #[test]
    fn test_typography_is_normalized() {
        let raw = "\u{201C}hello\u{201D} \u{2013} world\u{00A0}again \u{2022}item ### title";
        assert_eq!(clean_text(raw), "\"hello\" - world again item  title");
    }

    #[test]
    fn test_disallowed_symbols_are_dropped() {
        assert_eq!(clean_text("a <b> = c * d & e"), "a b  c  d  e");
        assert_eq!(clean_text("café 50%"), "caf 50%");
    }

    #[test]
    fn test_newline_runs_collapse_and_lines_are_right_trimmed() {
        let raw = "first   \n\n\n\nsecond\t\nthird";
        assert_eq!(clean_text(raw), "first\n\nsecond\nthird");
    }

    #[test]
    fn test_json_object_uses_first_content_field() {
        let raw = r#"{"status":"ok","response":"תשובה","message":""}"#;
        assert_eq!(clean(raw), "תשובה");

        let raw = r#"{"text":"second","message":"first"}"#;
        assert_eq!(clean(raw), "first");
    }

    #[test]
    fn test_json_object_falls_back_to_long_strings() {
        let raw = r#"{"a":"short","b":"this value is long enough","c":42}"#;
        assert_eq!(clean(raw), "this value is long enough");
    }

    #[test]
    fn test_json_object_last_resort_is_pretty_printed() {
        let raw = r#"{"a":1,"b":"x"}"#;
        assert_eq!(clean(raw), "{\n  \"a\": 1,\n  \"b\": \"x\"\n}");
    }

    #[test]
    fn test_json_array_joins_items() {
        let raw = r#"["first answer", {"output":"second answer"}, "", 7]"#;
        assert_eq!(clean(raw), "first answer\n\nsecond answer\n\n7");
    }

    #[test]
    fn test_invalid_json_degrades_to_text() {
        let raw = "{not json at all";
        assert_eq!(clean(raw), "{not json at all");
    }

    #[test]
    fn test_text_cleaning_is_idempotent() {
        let fixtures = [
            "שלום לכולם!\nהנה הקוד:\nfunction add(a, b) {\n  return a + b;\n}",
            "Mixed עברית and English, with (parens) and 100% effort.",
            "  leading space and trailing   \n\n\n\nparagraph",
            "say \u{201C}quoted\u{201D} words \u{2014} dashes",
            "https:example.com/img.png",
        ];

        for fixture in fixtures {
            let once = clean(fixture);
            assert_eq!(clean(&once), once, "not idempotent for {fixture:?}");
        }
    }

    #[test]
    fn test_stray_quote_before_quoted_text_needs_two_passes() {
        // Only one leading quote is stripped per pass, and the bracket/quote
        // trim runs before the stray-quote pass.
        let once = clean("'\"abc");
        assert_eq!(once, "\"abc");
        assert_eq!(clean(&once), "abc");
    }
}
