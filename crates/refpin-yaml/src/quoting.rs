//! Scalar quoting rules
//!
//! Decides how a new value is spelled when it replaces an existing scalar.
//! Type inference is delegated to `serde_yaml`, so "would this plain text be
//! read back as the same string" uses the same resolver that reads the file.
//! The YAML 1.2 core schema number forms are checked on top of that, since
//! downstream readers resolve `0123` or `1_000` as numbers where `serde_yaml`
//! keeps a string.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

/// Core schema int and float forms, plus YAML 1.1 digit separators
static CORE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(?:",
        r"[-+]?[0-9][0-9_]*",
        r"|0o[0-7]+",
        r"|0x[0-9a-fA-F]+",
        r"|[-+]?(?:\.[0-9]+|[0-9][0-9_]*(?:\.[0-9_]*)?)(?:[eE][-+]?[0-9]+)?",
        r"|[-+]?\.(?:inf|Inf|INF)",
        r"|\.(?:nan|NaN|NAN)",
        r")$"
    ))
    .expect("core schema number pattern is valid")
});

/// Check whether `text` matches a core schema int or float form
#[must_use]
pub fn looks_numeric(text: &str) -> bool {
    CORE_NUMBER.is_match(text)
}

/// Original quoting style of a scalar token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarStyle {
    /// Unquoted
    Plain,
    /// `'single quoted'`
    SingleQuoted,
    /// `"double quoted"`
    DoubleQuoted,
    /// `|` block scalar
    Literal,
    /// `>` block scalar
    Folded,
}

/// Check whether `text`, written unquoted, reads back as exactly `text`
///
/// Anything the implicit resolver would turn into an int, float, bool, null,
/// collection, alias or comment fails this check, as does any core schema
/// number form.
#[must_use]
pub fn plain_reads_as_string(text: &str) -> bool {
    if text.is_empty()
        || text.trim() != text
        || text.contains(['\n', '\r'])
        || looks_numeric(text)
    {
        return false;
    }
    matches!(serde_yaml::from_str::<Value>(text), Ok(Value::String(s)) if s == text)
}

/// Pick the style used to write `value` over a token of style `current`
///
/// Quoted and block tokens keep their style. A plain token stays plain only
/// when the value survives implicit typing, otherwise it is single-quoted.
/// Values with control characters need escapes, which only double quotes
/// can express.
#[must_use]
pub fn style_for_write(current: ScalarStyle, value: &str) -> ScalarStyle {
    let needs_escapes = value.chars().any(|c| c.is_control() && c != '\t');
    match current {
        ScalarStyle::Plain if plain_reads_as_string(value) => ScalarStyle::Plain,
        ScalarStyle::Plain | ScalarStyle::SingleQuoted if needs_escapes => {
            ScalarStyle::DoubleQuoted
        }
        ScalarStyle::Plain => ScalarStyle::SingleQuoted,
        other => other,
    }
}

/// Spell `value` in a flow style
///
/// Block styles are rendered by the document, which knows the indentation.
#[must_use]
pub fn encode_flow(value: &str, style: ScalarStyle) -> String {
    match style {
        ScalarStyle::SingleQuoted => format!("'{}'", value.replace('\'', "''")),
        ScalarStyle::DoubleQuoted => encode_double(value),
        ScalarStyle::Plain | ScalarStyle::Literal | ScalarStyle::Folded => value.to_string(),
    }
}

fn encode_double(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_strings_stay_plain() {
        for text in [
            "main",
            "main---0000123-2024.05-gabc1234",
            "sha256:0123abcd",
            "abc123",
            "123abc",
            "http://example.com/x",
        ] {
            assert!(plain_reads_as_string(text), "{text} should read as a string");
        }
    }

    #[test]
    fn typed_plain_forms_are_detected() {
        for text in [
            "123", "1e5", "0x1f", "true", "false", "null", "~", "", " padded", "a # b", "a: b",
            "- a", "[a", "*alias", "'quoted'",
        ] {
            assert!(!plain_reads_as_string(text), "{text:?} should not read as a string");
        }
    }

    #[test]
    fn core_schema_numbers_are_not_plain_strings() {
        for text in [
            "0123456", "0777", "1_000", "-42", "+7", "0o17", "0xFF", ".5", "1.", "3.14e-2",
            ".inf", "-.Inf", ".NaN",
        ] {
            assert!(looks_numeric(text), "{text:?} should look numeric");
            assert!(!plain_reads_as_string(text), "{text:?} should not read as a string");
        }
        let words = ["0x", "1.2.3", "v1", "1e", "abc1234", "main---0000123-2024.05-gabc1234", "_1"];
        for text in words {
            assert!(!looks_numeric(text), "{text:?} should not look numeric");
        }
    }

    #[test]
    fn leading_zero_refs_are_quoted() {
        assert_eq!(style_for_write(ScalarStyle::Plain, "0123456"), ScalarStyle::SingleQuoted);
        assert_eq!(encode_flow("0123456", ScalarStyle::SingleQuoted), "'0123456'");
    }

    #[test]
    fn style_for_write_forces_single_quotes_on_plain() {
        assert_eq!(style_for_write(ScalarStyle::Plain, "1234567"), ScalarStyle::SingleQuoted);
        assert_eq!(style_for_write(ScalarStyle::Plain, "abcdef1"), ScalarStyle::Plain);
    }

    #[test]
    fn style_for_write_never_requotes() {
        assert_eq!(
            style_for_write(ScalarStyle::DoubleQuoted, "1234567"),
            ScalarStyle::DoubleQuoted
        );
        assert_eq!(
            style_for_write(ScalarStyle::SingleQuoted, "abc"),
            ScalarStyle::SingleQuoted
        );
        assert_eq!(style_for_write(ScalarStyle::Literal, "123"), ScalarStyle::Literal);
    }

    #[test]
    fn encode_escapes_quotes() {
        assert_eq!(encode_flow("it's", ScalarStyle::SingleQuoted), "'it''s'");
        assert_eq!(encode_flow("a\"b\\c", ScalarStyle::DoubleQuoted), r#""a\"b\\c""#);
        assert_eq!(encode_flow("a\nb", ScalarStyle::DoubleQuoted), r#""a\nb""#);
    }
}
