//! Legacy textual filter parsing.
//!
//! `Filter::Raw` carries an RFC-4515-style string from callers that still
//! build filters by hand. It is reparsed into structured variants before
//! any compiler runs, so compilers only ever see typed nodes.

use crate::{
    error::SearchError,
    filter::{Filter, FilterKind},
};
use tracing::warn;

/// Reparse a raw filter string into a structured filter.
///
/// Invoked eagerly by the compilers on every `Raw` node they encounter.
pub fn parse(raw: &str) -> Result<Filter, SearchError> {
    warn!("raw textual filters are deprecated; reparsing into structured form");

    let mut parser = Parser {
        input: raw.as_bytes(),
        pos: 0,
        raw,
    };
    let filter = parser.parse_filter()?;
    parser.skip_whitespace();
    if parser.pos != parser.input.len() {
        return Err(parser.error("trailing input after filter"));
    }

    Ok(filter)
}

/// Reparse `Raw` nodes anywhere in the tree, leaving structured nodes as-is.
pub fn resolve(filter: &Filter) -> Result<Filter, SearchError> {
    match &filter.kind {
        FilterKind::Raw(raw) => {
            let mut parsed = parse(raw)?;
            if filter.multi_valued.is_some() {
                parsed.multi_valued = filter.multi_valued;
            }
            Ok(parsed)
        }
        _ => Ok(filter.clone()),
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    raw: &'a str,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> SearchError {
        SearchError::MalformedRaw {
            raw: self.raw.to_string(),
            reason: format!("{reason} at offset {}", self.pos),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn expect(&mut self, c: u8) -> Result<(), SearchError> {
        if self.bump() == Some(c) {
            Ok(())
        } else {
            self.pos = self.pos.saturating_sub(1);
            Err(self.error(&format!("expected '{}'", c as char)))
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    fn parse_filter(&mut self) -> Result<Filter, SearchError> {
        self.skip_whitespace();
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::and(self.parse_filter_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::or(self.parse_filter_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::not(self.parse_filter()?)
            }
            Some(_) => self.parse_item()?,
            None => return Err(self.error("unexpected end of input")),
        };
        self.expect(b')')?;

        Ok(filter)
    }

    fn parse_filter_list(&mut self) -> Result<Vec<Filter>, SearchError> {
        let mut filters = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'(') => filters.push(self.parse_filter()?),
                Some(b')') if !filters.is_empty() => return Ok(filters),
                _ => return Err(self.error("expected sub-filter")),
            }
        }
    }

    fn parse_item(&mut self) -> Result<Filter, SearchError> {
        let attribute = self.parse_attribute()?;

        match (self.bump(), self.peek()) {
            (Some(b'>'), Some(b'=')) => {
                self.pos += 1;
                let value = self.parse_value()?.joined();
                Ok(Filter::greater_or_equal(attribute, value))
            }
            (Some(b'<'), Some(b'=')) => {
                self.pos += 1;
                let value = self.parse_value()?.joined();
                Ok(Filter::less_or_equal(attribute, value))
            }
            (Some(b'~'), Some(b'=')) => {
                self.pos += 1;
                let value = self.parse_value()?.joined();
                Ok(Filter::approximate_match(attribute, value))
            }
            (Some(b'='), _) => {
                let value = self.parse_value()?;
                Ok(value.into_filter(attribute))
            }
            _ => Err(self.error("expected comparison operator")),
        }
    }

    fn parse_attribute(&mut self) -> Result<String, SearchError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'-' || c == b'.' || c == b';' || c == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error("expected attribute name"));
        }

        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    /// Parse the assertion value, splitting on unescaped `*`.
    ///
    /// Escapes contribute raw bytes, so each part is collected as bytes and
    /// decoded once. A multi-byte character arrives as consecutive `\xx`
    /// escapes.
    fn parse_value(&mut self) -> Result<ParsedValue, SearchError> {
        let mut parts = Vec::new();
        let mut current: Vec<u8> = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unexpected end of value")),
                Some(b')') => break,
                Some(b'*') => {
                    self.pos += 1;
                    parts.push(self.decode_part(std::mem::take(&mut current))?);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let hex = self
                        .input
                        .get(self.pos..self.pos + 2)
                        .ok_or_else(|| self.error("truncated escape sequence"))?;
                    let byte = u8::from_str_radix(&String::from_utf8_lossy(hex), 16)
                        .map_err(|_| self.error("invalid escape sequence"))?;
                    self.pos += 2;
                    current.push(byte);
                }
                Some(c) => {
                    self.pos += 1;
                    current.push(c);
                }
            }
        }
        parts.push(self.decode_part(current)?);

        Ok(ParsedValue { parts })
    }

    fn decode_part(&self, bytes: Vec<u8>) -> Result<String, SearchError> {
        String::from_utf8(bytes).map_err(|_| self.error("escape sequence is not valid UTF-8"))
    }
}

/// Assertion value split on unescaped `*` separators.
struct ParsedValue {
    parts: Vec<String>,
}

impl ParsedValue {
    fn joined(self) -> String {
        self.parts.join("*")
    }

    fn into_filter(self, attribute: String) -> Filter {
        match self.parts.as_slice() {
            [single] => Filter::equality(attribute, single.as_str()),
            // "=*" is a presence assertion
            [a, b] if a.is_empty() && b.is_empty() => Filter::presence(attribute),
            parts => {
                let initial = Some(parts[0].as_str()).filter(|p| !p.is_empty());
                let final_part = Some(parts[parts.len() - 1].as_str()).filter(|p| !p.is_empty());
                let any: Vec<&str> = parts[1..parts.len() - 1]
                    .iter()
                    .filter(|p| !p.is_empty())
                    .map(String::as_str)
                    .collect();

                Filter::substring(attribute, initial, &any, final_part)
            }
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn parses_equality() {
        let f = parse("(uid=test)").unwrap();
        assert_eq!(f, Filter::equality("uid", "test"));
    }

    #[test]
    fn parses_presence() {
        let f = parse("(mail=*)").unwrap();
        assert_eq!(f, Filter::presence("mail"));
    }

    #[test]
    fn parses_ranges() {
        assert_eq!(
            parse("(age>=23)").unwrap(),
            Filter::greater_or_equal("age", "23")
        );
        assert_eq!(
            parse("(age<=23)").unwrap(),
            Filter::less_or_equal("age", "23")
        );
    }

    #[test]
    fn parses_substring_parts() {
        let f = parse("(cn=a*b*c)").unwrap();
        assert_eq!(f, Filter::substring("cn", Some("a"), &["b"], Some("c")));

        let f = parse("(cn=a*)").unwrap();
        assert_eq!(f, Filter::substring("cn", Some("a"), &[], None));

        let f = parse("(cn=*b*)").unwrap();
        assert_eq!(f, Filter::substring("cn", None, &["b"], None));
    }

    #[test]
    fn parses_nested_combinators() {
        let f = parse("(&(objectClass=person)(|(uid=a)(uid=b)))").unwrap();
        assert_eq!(
            f,
            Filter::and(vec![
                Filter::equality("objectClass", "person"),
                Filter::or(vec![Filter::equality("uid", "a"), Filter::equality("uid", "b")]),
            ])
        );
    }

    #[test]
    fn parses_hex_escapes() {
        let f = parse("(cn=a\\2ab)").unwrap();
        assert_eq!(f, Filter::equality("cn", "a*b"));
    }

    #[test]
    fn parses_multi_byte_escapes() {
        let f = parse("(cn=caf\\c3\\a9)").unwrap();
        assert_eq!(f, Filter::equality("cn", "café"));
    }

    #[test]
    fn rejects_escapes_that_are_not_utf8() {
        let err = parse("(cn=\\ff)").unwrap_err();
        assert!(matches!(err, SearchError::MalformedRaw { .. }));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse("uid=test").is_err());
        assert!(parse("(uid=test").is_err());
        assert!(parse("()").is_err());
        assert!(parse("(&)").is_err());
    }

    #[test]
    fn resolve_preserves_override() {
        let f = Filter::raw("(uid=test)").multi_valued();
        let resolved = resolve(&f).unwrap();
        assert_eq!(resolved.multi_valued, Some(true));
        match resolved.kind {
            FilterKind::Equality { value, .. } => {
                assert_eq!(value, Value::Text("test".into()));
            }
            _ => panic!("expected equality"),
        }
    }
}
