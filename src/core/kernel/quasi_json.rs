//! Repair and inspection of the gateway's JSON-like wire syntax.
//!
//! The gateway emits arrays with single-quoted strings and elided fields
//! (`[1,,'x']`), sometimes behind an anti-hijacking prefix. [`repair`] turns
//! that into standard JSON; [`QuasiValue`] gives checked positional access to
//! the untyped result.

use crate::core::errors::ChannelError;
use serde_json::Value;

/// Rewrite quasi-JSON into standard JSON.
///
/// Every `,,` run is expanded into quoted empty strings, single quotes become
/// double quotes, and anything before the first `[` is dropped.
pub fn repair(raw: &str) -> Result<String, ChannelError> {
    let mut text = raw.to_string();
    // `replace` is non-overlapping, so `,,,` needs a second pass
    while text.contains(",,") {
        text = text.replace(",,", r#","","#);
    }
    let text = text.replace('\'', "\"");

    let start = text
        .find('[')
        .ok_or_else(|| ChannelError::decode(&text, "no array found"))?;
    Ok(text[start..].to_string())
}

/// Repair and parse a quasi-JSON document
pub fn parse(raw: &[u8]) -> Result<Value, ChannelError> {
    let text = String::from_utf8_lossy(raw);
    let repaired = repair(&text)?;
    serde_json::from_str(&repaired).map_err(|e| ChannelError::decode(&repaired, e))
}

/// Checked positional access into nested arrays.
///
/// Every accessor returns `None` on a missing index or a type mismatch, so
/// extraction chains short-circuit with `?` instead of panicking.
pub trait QuasiValue {
    fn array_at(&self, index: usize) -> Option<&[Value]>;
    fn str_at(&self, index: usize) -> Option<&str>;
    /// Whether element `index` is the string `tag`
    fn tagged(&self, index: usize, tag: &str) -> bool {
        self.str_at(index) == Some(tag)
    }
}

impl QuasiValue for [Value] {
    fn array_at(&self, index: usize) -> Option<&[Value]> {
        self.get(index)?.as_array().map(Vec::as_slice)
    }

    fn str_at(&self, index: usize) -> Option<&str> {
        self.get(index)?.as_str()
    }
}

impl QuasiValue for Value {
    fn array_at(&self, index: usize) -> Option<&[Value]> {
        self.as_array()?.as_slice().array_at(index)
    }

    fn str_at(&self, index: usize) -> Option<&str> {
        self.as_array()?.as_slice().str_at(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_repair_expands_comma_runs() {
        assert_eq!(repair(r#"[1,,,"x"]"#).unwrap(), r#"[1,"","","x"]"#);
        assert_eq!(parse(br#"[1,,,"x"]"#).unwrap(), json!([1, "", "", "x"]));
        assert_eq!(
            parse(b"[1,,,,,2]").unwrap(),
            json!([1, "", "", "", "", 2])
        );
    }

    #[test]
    fn test_repair_single_quotes_and_prefix() {
        let value = parse(b")]}'\n[[0,['c','abc123']]]").unwrap();
        assert_eq!(value, json!([[0, ["c", "abc123"]]]));

        let value = parse(b"11\n[[1,['c','abc123']]]").unwrap();
        assert_eq!(value, json!([[1, ["c", "abc123"]]]));
    }

    #[test]
    fn test_repair_without_array_is_decode_error() {
        assert!(matches!(
            repair("no brackets here"),
            Err(ChannelError::DecodeError { .. })
        ));
        assert!(matches!(parse(b""), Err(ChannelError::DecodeError { .. })));
    }

    #[test]
    fn test_accessors_never_panic_on_mismatched_shapes() {
        let value = json!([["c", 1], "ae", 3, null]);
        assert!(value.array_at(0).is_some());
        assert!(value.array_at(1).is_none());
        assert!(value.array_at(99).is_none());
        assert_eq!(value.str_at(1), Some("ae"));
        assert!(value.str_at(2).is_none());
        assert!(value.tagged(1, "ae"));
        assert!(!value.tagged(3, "ae"));

        let scalar = json!("not an array");
        assert!(scalar.array_at(0).is_none());
        assert!(scalar.str_at(0).is_none());
    }
}
