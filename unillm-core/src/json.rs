//! Lenient JSON recovery from free-form model output
//!
//! Models asked for JSON often wrap it in prose, fence it in markdown, or get
//! the syntax slightly wrong. [`JsonParser::parse`] tries a direct parse and
//! then a fixed sequence of recovery strategies, returning the first value
//! that parses. No strategy ever raises; total failure yields `None`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

static TAGGED_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").expect("valid regex"));

static GENERIC_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```\s*(\{.*?\})\s*```").expect("valid regex"));

// Greedy on purpose: first `{` to last `}`. Two separate objects in one text
// collapse into a single span that usually fails to parse.
static BRACE_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*[}\]])").expect("valid regex"));

static EMBEDDED_QUOTES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(:\s*")([^"\n]*)"([^"\n]*)"([^"\n]*)("\s*[,}\]])"#).expect("valid regex")
});

static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"//[^\n]*").expect("valid regex"));

static BLOCK_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"));

/// Best-effort JSON extraction and encoding
pub struct JsonParser;

impl JsonParser {
    /// Recover a JSON value from `input`
    ///
    /// With `expect_json` set, input that does not look like JSON at all
    /// (no leading `{`/`[` and no `"` anywhere) is rejected before any
    /// recovery strategy runs.
    pub fn parse(input: &str, expect_json: bool) -> Option<Value> {
        if input.is_empty() {
            return None;
        }

        if expect_json && !looks_like_json(input) {
            return None;
        }

        if let Ok(value) = serde_json::from_str::<Value>(input) {
            return Some(value);
        }

        Self::from_fence(&TAGGED_FENCE, input)
            .or_else(|| Self::from_fence(&GENERIC_FENCE, input))
            .or_else(|| Self::from_brace_span(input))
            .or_else(|| Self::from_heuristic_fixes(input))
    }

    /// Standard JSON encoding, falling back to the `Debug` rendering when
    /// the value cannot be encoded
    pub fn stringify<T>(value: &T, pretty: bool) -> String
    where
        T: Serialize + fmt::Debug + ?Sized,
    {
        let encoded = if pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };

        encoded.unwrap_or_else(|_| format!("{:?}", value))
    }

    fn from_fence(pattern: &Regex, input: &str) -> Option<Value> {
        let captured = pattern.captures(input)?.get(1)?.as_str();
        serde_json::from_str(captured).ok()
    }

    fn from_brace_span(input: &str) -> Option<Value> {
        let span = BRACE_SPAN.find(input)?.as_str();
        serde_json::from_str(span).ok()
    }

    fn from_heuristic_fixes(input: &str) -> Option<Value> {
        let fixed = TRAILING_COMMA.replace_all(input, "${1}");
        let fixed = fixed.replace('\'', "\"");
        let fixed = EMBEDDED_QUOTES.replace_all(&fixed, r#"${1}${2}\"${3}\"${4}${5}"#);
        let fixed = LINE_COMMENT.replace_all(&fixed, "");
        let fixed = BLOCK_COMMENT.replace_all(&fixed, "");

        if !looks_like_json(&fixed) {
            return None;
        }

        serde_json::from_str(&fixed).ok()
    }
}

/// Starts with `{` or `[`, or contains a double quote anywhere
fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[') || text.contains('"')
}
