//! Masking and truncation of logged request data.

use http::HeaderMap;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Replacement for sensitive values.
pub const MASK: &str = "***";

/// Appended to payloads cut at the length limit.
pub const TRUNCATION_MARKER: &str = "...(truncated)";

/// Prepares request headers, query parameters and bodies for logging.
///
/// Field names are matched case-insensitively after percent-decoding. With
/// masking on, JSON bodies are masked recursively, form-encoded bodies are
/// masked per key, and any other body is reduced to its length.
#[derive(Debug, Clone)]
pub struct PayloadSanitizer {
    sensitive: HashSet<String>,
    max_len: usize,
    mask: bool,
}

impl PayloadSanitizer {
    /// Creates a sanitizer.
    pub fn new<I, S>(sensitive_fields: I, max_len: usize, mask: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            sensitive: sensitive_fields
                .into_iter()
                .map(|f| f.as_ref().to_ascii_lowercase())
                .collect(),
            max_len,
            mask,
        }
    }

    /// Returns true if values named `name` are masked.
    #[must_use]
    pub fn is_sensitive(&self, name: &str) -> bool {
        self.mask && self.sensitive.contains(&name.to_ascii_lowercase())
    }

    /// Renders a request body for the log.
    #[must_use]
    pub fn sanitize_body(&self, body: &[u8]) -> String {
        let text = if !self.mask || body.is_empty() {
            String::from_utf8_lossy(body).into_owned()
        } else if let Ok(mut value) = serde_json::from_slice::<Value>(body) {
            self.mask_value(&mut value);
            value.to_string()
        } else if let Some(form) = self.masked_form(body) {
            form
        } else {
            format!("<{} bytes not logged>", body.len())
        };
        truncate_chars(&text, self.max_len, TRUNCATION_MARKER)
    }

    /// Renders request headers for the log.
    #[must_use]
    pub fn sanitize_headers(&self, headers: &HeaderMap) -> Map<String, Value> {
        let mut map = Map::new();
        for name in headers.keys() {
            let rendered = if self.is_sensitive(name.as_str()) {
                Value::String(MASK.to_string())
            } else {
                let mut values: Vec<Value> = headers
                    .get_all(name)
                    .iter()
                    .map(|v| Value::String(v.to_str().map_or_else(|_| "<binary>".to_string(), str::to_string)))
                    .collect();
                if values.len() == 1 {
                    values.remove(0)
                } else {
                    Value::Array(values)
                }
            };
            map.insert(name.as_str().to_string(), rendered);
        }
        map
    }

    /// Renders a raw query string for the log.
    #[must_use]
    pub fn sanitize_query(&self, query: &str) -> Map<String, Value> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();
        pairs
            .into_iter()
            .map(|(key, value)| {
                let value = self.masked(&key, value);
                (key, Value::String(value))
            })
            .collect()
    }

    /// Masks a form-encoded body, or returns `None` if `body` is not one.
    fn masked_form(&self, body: &[u8]) -> Option<String> {
        let text = std::str::from_utf8(body).ok()?.trim_end();
        let form_shaped = text
            .split('&')
            .filter(|pair| !pair.is_empty())
            .all(|pair| pair.contains('='));
        if !form_shaped {
            return None;
        }
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(text).ok()?;
        let masked: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(key, value)| {
                let value = self.masked(&key, value);
                (key, value)
            })
            .collect();
        serde_urlencoded::to_string(masked).ok()
    }

    fn masked(&self, key: &str, value: String) -> String {
        if self.is_sensitive(key) {
            MASK.to_string()
        } else {
            value
        }
    }

    fn mask_value(&self, value: &mut Value) {
        match value {
            Value::Object(fields) => {
                for (key, field) in fields.iter_mut() {
                    if self.is_sensitive(key) {
                        *field = Value::String(MASK.to_string());
                    } else {
                        self.mask_value(field);
                    }
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|item| self.mask_value(item)),
            _ => {}
        }
    }
}

/// Cuts `text` to at most `max` characters, ending with `marker` when cut.
///
/// Counts characters rather than bytes, so multi-byte text is never split.
#[must_use]
pub fn truncate_chars(text: &str, max: usize, marker: &str) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(marker.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(marker);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn sanitizer() -> PayloadSanitizer {
        PayloadSanitizer::new(["password", "creditCard", "authorization"], 10_000, true)
    }

    #[test]
    fn test_masks_nested_json() {
        let body = br#"{"user":"ann","password":"hunter2","card":{"CREDITCARD":"4111"},"items":[{"password":"x"}]}"#;
        let out: Value = serde_json::from_str(&sanitizer().sanitize_body(body)).unwrap();
        assert_eq!(out["user"], "ann");
        assert_eq!(out["password"], MASK);
        assert_eq!(out["card"]["CREDITCARD"], MASK);
        assert_eq!(out["items"][0]["password"], MASK);
    }

    #[test]
    fn test_masking_disabled() {
        let sanitizer = PayloadSanitizer::new(["password"], 10_000, false);
        let body = br#"{"password":"hunter2"}"#;
        assert!(sanitizer.sanitize_body(body).contains("hunter2"));
        assert!(!sanitizer.is_sensitive("password"));
    }

    #[test]
    fn test_opaque_body_reduced_to_length() {
        assert_eq!(sanitizer().sanitize_body(b"password hunter2"), "<16 bytes not logged>");
        assert_eq!(sanitizer().sanitize_body(b""), "");

        let unmasked = PayloadSanitizer::new(["password"], 10_000, false);
        assert_eq!(unmasked.sanitize_body(b"plain text"), "plain text");
    }

    #[test]
    fn test_masks_form_body() {
        let out = sanitizer().sanitize_body(b"user=bob&password=hunter2&note=a+b");
        assert!(!out.contains("hunter2"), "{out}");
        assert!(out.contains("user=bob"));
        assert!(out.contains("password=***"));
        assert!(out.contains("note=a+b"));
    }

    #[test]
    fn test_percent_encoded_keys_are_masked() {
        let out = sanitizer().sanitize_body(b"user=bob&pass%77ord=hunter2");
        assert!(!out.contains("hunter2"), "{out}");

        let query = sanitizer().sanitize_query("pass%77ord=hunter2&q=a%20b");
        assert_eq!(query["password"], MASK);
        assert_eq!(query["q"], "a b");
    }

    #[test]
    fn test_repeated_headers_keep_every_value() {
        let mut headers = HeaderMap::new();
        headers.append("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        headers.append("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        headers.append("authorization", HeaderValue::from_static("Bearer a"));
        headers.append("authorization", HeaderValue::from_static("Bearer b"));

        let out = sanitizer().sanitize_headers(&headers);
        assert_eq!(out["x-forwarded-for"], serde_json::json!(["203.0.113.7", "10.0.0.1"]));
        assert_eq!(out["authorization"], MASK);
    }

    #[test]
    fn test_body_truncation() {
        let sanitizer = PayloadSanitizer::new(Vec::<String>::new(), 20, false);
        let out = sanitizer.sanitize_body("é".repeat(50).as_bytes());
        assert_eq!(out.chars().count(), 20);
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_headers_and_query() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        headers.insert("accept", HeaderValue::from_static("application/json"));

        let out = sanitizer().sanitize_headers(&headers);
        assert_eq!(out["authorization"], MASK);
        assert_eq!(out["accept"], "application/json");

        let query = sanitizer().sanitize_query("page=2&Password=secret&flag");
        assert_eq!(query["page"], "2");
        assert_eq!(query["Password"], MASK);
        assert_eq!(query["flag"], "");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10, "..."), "short");
        assert_eq!(truncate_chars("abcdefghij", 6, "..."), "abc...");
        assert_eq!(truncate_chars("abcdef", 2, "..."), "...");
    }
}
