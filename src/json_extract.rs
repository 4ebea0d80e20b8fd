//! Best-effort JSON recovery from model output.
//!
//! Models often wrap the requested object in prose. The only repair applied
//! is dropping everything before the first `{`; the remainder must then be
//! strict JSON (trailing whitespace allowed, trailing prose is an error).

use serde_json::Value;

/// Parses `raw` from its first `{`, or the whole text when there is none.
pub fn extract_json_object(raw: &str) -> Result<Value, serde_json::Error> {
    let start = raw.find('{').unwrap_or(0);
    serde_json::from_str(&raw[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_prose_is_stripped() {
        let v = extract_json_object(
            "Here is the result: {\"risks\":[],\"unclear\":[],\"remediation\":[]}",
        )
        .unwrap();
        assert!(v["risks"].as_array().unwrap().is_empty());
    }

    #[test]
    fn no_brace_parses_whole_text() {
        assert!(extract_json_object("no json here").is_err());
        assert_eq!(extract_json_object("[1,2]").unwrap()[1], 2);
    }

    #[test]
    fn trailing_prose_fails() {
        assert!(extract_json_object("{\"risks\":[]} hope this helps").is_err());
    }

    #[test]
    fn trailing_whitespace_ok() {
        assert!(extract_json_object("  {\"a\":1}\n\n").is_ok());
    }
}
