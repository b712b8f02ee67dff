//! Utility functions and constants shared by the XML engines and the renderer.
//!
//! This module provides helpers for attribute naming, XML name checks, CDATA
//! splitting and boolean text.

/// Prefix marking a field name as an XML attribute (`#[serde(rename = "@id")]`).
pub const ATTRIBUTE_PREFIX: char = '@';

/// Terminator that may not appear inside a single CDATA section.
const CDATA_END: &str = "]]>";

/// Checks if a field name is spelled as an attribute.
pub fn is_attribute_name(key: &str) -> bool {
    key.len() > 1 && key.starts_with(ATTRIBUTE_PREFIX)
}

/// Strips the attribute prefix from a field name.
///
/// Returns `None` when the name is not spelled as an attribute.
pub fn strip_attribute_prefix(key: &str) -> Option<&str> {
    if is_attribute_name(key) {
        key.strip_prefix(ATTRIBUTE_PREFIX)
    } else {
        None
    }
}

/// Splits CDATA content into payloads that can each be wrapped in one
/// `<![CDATA[...]]>` section.
///
/// Every `]]>` is broken between `]]` and `>` so that concatenating the
/// sections reproduces the original text.
pub fn split_cdata(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(index) = rest.find(CDATA_END) {
        let cut = index + 2;
        parts.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    parts.push(rest);
    parts
}

/// Checks a string against the XML `Name` production.
///
/// Namespace prefixes are not interpreted, so `:` is accepted like any other
/// name character.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_name_start_char(first) => chars.all(is_name_char),
        _ => false,
    }
}

fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | '_' | 'A'..='Z' | 'a'..='z'
        | '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}' | '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c, '-' | '.' | '0'..='9' | '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

/// Converts a Rust boolean to its string representation for XML.
pub fn bool_to_str(b: bool) -> &'static str {
    if b { "true" } else { "false" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_attribute_name() {
        assert!(is_attribute_name("@id"));
        assert!(!is_attribute_name("id"));
        assert!(!is_attribute_name("@"));
    }

    #[test]
    fn test_strip_attribute_prefix() {
        assert_eq!(strip_attribute_prefix("@id"), Some("id"));
        assert_eq!(strip_attribute_prefix("id"), None);
        assert_eq!(strip_attribute_prefix("@"), None);
    }

    #[test]
    fn test_split_cdata() {
        assert_eq!(split_cdata("plain"), vec!["plain"]);
        assert_eq!(split_cdata("a]]>b"), vec!["a]]", ">b"]);
        assert_eq!(split_cdata("]]>]]>"), vec!["]]", ">]]", ">"]);
        assert_eq!(split_cdata("a]]>b").concat(), "a]]>b");
    }

    #[test]
    fn test_is_valid_name() {
        assert!(is_valid_name("book"));
        assert!(is_valid_name("_private"));
        assert!(is_valid_name("xs:date"));
        assert!(is_valid_name("publish-date.v2"));
        assert!(is_valid_name("prénom"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a b"));
        assert!(!is_valid_name("1x"));
        assert!(!is_valid_name("-x"));
        assert!(!is_valid_name("a<b"));
    }

    #[test]
    fn test_bool_to_str() {
        assert_eq!(bool_to_str(true), "true");
        assert_eq!(bool_to_str(false), "false");
    }
}
