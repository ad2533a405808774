// LDAP-style filter parsing and matching, modelled after celix_filter_t /
// celix::Filter. Grammar (informal):
//
//   filter     := '(' ( '&' filter+ | '|' filter+ | '!' filter | comparison ) ')'
//   comparison := key op value
//   op         := '=' | '>=' | '<=' | '~='
//
// `value == "*"` under `=` is `Present(key)`; a value containing an
// unescaped `*` alongside other characters is `Substring`. `\` escapes the
// next character.

use std::fmt;

use crate::error::{ModError, Result};
use crate::properties::{Properties, PropertyValue};
use crate::version::Version;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal(String, String),
    Substring(String, String),
    GreaterEqual(String, String),
    LessEqual(String, String),
    Approx(String, String),
    Present(String),
    /// An empty filter string; matches everything.
    MatchAll,
}

impl Filter {
    pub fn parse(input: &str) -> Result<Filter> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Filter::MatchAll);
        }
        let chars: Vec<char> = trimmed.chars().collect();
        let mut pos = 0usize;
        let filter = parse_expr(&chars, &mut pos)?;
        if pos != chars.len() {
            return Err(ModError::InvalidFilter(format!(
                "trailing characters after filter at offset {pos}"
            )));
        }
        Ok(filter)
    }

    pub fn matches(&self, props: &Properties) -> bool {
        match self {
            Filter::MatchAll => true,
            Filter::And(children) => children.iter().all(|c| c.matches(props)),
            Filter::Or(children) => children.iter().any(|c| c.matches(props)),
            Filter::Not(child) => !child.matches(props),
            Filter::Present(key) => props.contains_key(key),
            Filter::Equal(key, value) => match props.get(key) {
                None => false,
                Some(stored) => compare_eq(stored, value),
            },
            Filter::Substring(key, pattern) => match props.get(key) {
                None => false,
                Some(stored) => substring_matches(&stored.to_string(), pattern),
            },
            Filter::GreaterEqual(key, value) => compare_ordered(props, key, value, |o| {
                o == std::cmp::Ordering::Greater || o == std::cmp::Ordering::Equal
            }),
            Filter::LessEqual(key, value) => compare_ordered(props, key, value, |o| {
                o == std::cmp::Ordering::Less || o == std::cmp::Ordering::Equal
            }),
            Filter::Approx(key, value) => match props.get(key) {
                None => false,
                Some(stored) => {
                    normalize_approx(&stored.to_string()) == normalize_approx(value)
                }
            },
        }
    }

    /// Canonical textual form, used for diagnostics and for the round-trip
    /// property: `parse(print(f))` matches the same property maps as `f`.
    pub fn print(&self) -> String {
        match self {
            Filter::MatchAll => String::new(),
            Filter::And(children) => {
                format!("(&{})", children.iter().map(Filter::print).collect::<String>())
            }
            Filter::Or(children) => {
                format!("(|{})", children.iter().map(Filter::print).collect::<String>())
            }
            Filter::Not(child) => format!("(!{})", child.print()),
            Filter::Present(key) => format!("({key}=*)"),
            Filter::Equal(key, value) => format!("({key}={})", escape(value)),
            Filter::Substring(key, pattern) => format!("({key}={})", escape(pattern)),
            Filter::GreaterEqual(key, value) => format!("({key}>={})", escape(value)),
            Filter::LessEqual(key, value) => format!("({key}<={})", escape(value)),
            Filter::Approx(key, value) => format!("({key}~={})", escape(value)),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.print())
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '(' | ')' | '\\' | '*') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn compare_eq(stored: &PropertyValue, value: &str) -> bool {
    match stored {
        PropertyValue::Long(n) => value.trim().parse::<i64>().map(|v| v == *n).unwrap_or(false),
        PropertyValue::Double(d) => value.trim().parse::<f64>().map(|v| v == *d).unwrap_or(false),
        PropertyValue::Bool(b) => value.trim().parse::<bool>().map(|v| v == *b).unwrap_or(false),
        PropertyValue::Version(v) => value.parse::<Version>().map(|parsed| &parsed == v).unwrap_or(false),
        PropertyValue::Set(items) => items.iter().any(|item| item == value),
        PropertyValue::String(s) => s == value,
    }
}

fn substring_matches(stored: &str, pattern: &str) -> bool {
    let segments = split_substring_pattern(pattern);
    if segments.is_empty() {
        return stored.is_empty();
    }
    let mut rest = stored;
    let n = segments.len();
    for (i, seg) in segments.iter().enumerate() {
        if seg.is_empty() {
            continue;
        }
        if i == 0 && !pattern.starts_with('*') {
            if !rest.starts_with(seg.as_str()) {
                return false;
            }
            rest = &rest[seg.len()..];
        } else if i == n - 1 && !pattern.ends_with('*') {
            if !rest.ends_with(seg.as_str()) {
                return false;
            }
        } else if let Some(idx) = rest.find(seg.as_str()) {
            rest = &rest[idx + seg.len()..];
        } else {
            return false;
        }
    }
    true
}

fn split_substring_pattern(pattern: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c == '*' {
            segments.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    segments.push(current);
    segments
}

fn normalize_approx(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_lowercase()
}

fn compare_ordered(
    props: &Properties,
    key: &str,
    value: &str,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> bool {
    match props.get(key) {
        None => false,
        Some(PropertyValue::Long(n)) => value
            .trim()
            .parse::<i64>()
            .map(|v| accept(n.cmp(&v)))
            .unwrap_or(false),
        Some(PropertyValue::Double(d)) => value
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|v| d.partial_cmp(&v))
            .map(accept)
            .unwrap_or(false),
        Some(PropertyValue::Version(v)) => value
            .parse::<Version>()
            .map(|parsed| accept(v.cmp(&parsed)))
            .unwrap_or(false),
        Some(stored) => accept(stored.to_string().as_str().cmp(value)),
    }
}

fn parse_expr(chars: &[char], pos: &mut usize) -> Result<Filter> {
    skip_whitespace(chars, pos);
    expect(chars, pos, '(')?;
    let filter = match chars.get(*pos) {
        Some('&') => {
            *pos += 1;
            let children = parse_filter_list(chars, pos)?;
            Filter::And(children)
        }
        Some('|') => {
            *pos += 1;
            let children = parse_filter_list(chars, pos)?;
            Filter::Or(children)
        }
        Some('!') => {
            *pos += 1;
            let child = parse_expr(chars, pos)?;
            Filter::Not(Box::new(child))
        }
        _ => parse_comparison(chars, pos)?,
    };
    expect(chars, pos, ')')?;
    Ok(filter)
}

fn parse_filter_list(chars: &[char], pos: &mut usize) -> Result<Vec<Filter>> {
    let mut out = Vec::new();
    while chars.get(*pos) == Some(&'(') {
        out.push(parse_expr(chars, pos)?);
    }
    if out.is_empty() {
        return Err(ModError::InvalidFilter(format!(
            "expected at least one filter at offset {pos}"
        )));
    }
    Ok(out)
}

fn parse_comparison(chars: &[char], pos: &mut usize) -> Result<Filter> {
    let start = *pos;
    let mut key = String::new();
    while let Some(&c) = chars.get(*pos) {
        if c == '=' || (c == '>' && chars.get(*pos + 1) == Some(&'=')) || (c == '<' && chars.get(*pos + 1) == Some(&'=')) || (c == '~' && chars.get(*pos + 1) == Some(&'=')) {
            break;
        }
        if c == ')' || c == '(' {
            break;
        }
        key.push(c);
        *pos += 1;
    }
    if key.is_empty() {
        return Err(ModError::InvalidFilter(format!("empty key at offset {start}")));
    }

    let op = match chars.get(*pos) {
        Some('=') => {
            *pos += 1;
            "="
        }
        Some('>') if chars.get(*pos + 1) == Some(&'=') => {
            *pos += 2;
            ">="
        }
        Some('<') if chars.get(*pos + 1) == Some(&'=') => {
            *pos += 2;
            "<="
        }
        Some('~') if chars.get(*pos + 1) == Some(&'=') => {
            *pos += 2;
            "~="
        }
        _ => {
            return Err(ModError::InvalidFilter(format!(
                "unknown operator at offset {pos}"
            )))
        }
    };

    let value_start = *pos;
    let mut raw_value = String::new();
    while let Some(&c) = chars.get(*pos) {
        if c == ')' {
            break;
        }
        if c == '\\' {
            raw_value.push(c);
            *pos += 1;
            if let Some(&next) = chars.get(*pos) {
                raw_value.push(next);
                *pos += 1;
            }
            continue;
        }
        raw_value.push(c);
        *pos += 1;
    }
    if chars.get(*pos) != Some(&')') {
        return Err(ModError::InvalidFilter(format!(
            "unmatched parenthesis starting at offset {value_start}"
        )));
    }

    Ok(match op {
        "=" => {
            if raw_value == "*" {
                Filter::Present(key)
            } else if has_unescaped_star(&raw_value) {
                Filter::Substring(key, unescape(&raw_value))
            } else {
                Filter::Equal(key, unescape(&raw_value))
            }
        }
        ">=" => Filter::GreaterEqual(key, unescape(&raw_value)),
        "<=" => Filter::LessEqual(key, unescape(&raw_value)),
        "~=" => Filter::Approx(key, unescape(&raw_value)),
        _ => unreachable!(),
    })
}

fn has_unescaped_star(value: &str) -> bool {
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            chars.next();
        } else if c == '*' {
            return true;
        }
    }
    false
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn skip_whitespace(chars: &[char], pos: &mut usize) {
    while matches!(chars.get(*pos), Some(c) if c.is_whitespace()) {
        *pos += 1;
    }
}

fn expect(chars: &[char], pos: &mut usize, expected: char) -> Result<()> {
    match chars.get(*pos) {
        Some(&c) if c == expected => {
            *pos += 1;
            Ok(())
        }
        _ => Err(ModError::InvalidFilter(format!(
            "expected '{expected}' at offset {pos}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        let mut p = Properties::new();
        for (k, v) in pairs {
            p.set_string(*k, *v);
        }
        p
    }

    #[test]
    fn matches_nested_and_or() {
        let filter = Filter::parse("(&(objectClass=com.x.A)(|(name=p)(name=q)))").unwrap();
        assert!(filter.matches(&props(&[("objectClass", "com.x.A"), ("name", "q")])));
        assert!(!filter.matches(&props(&[("objectClass", "com.x.A"), ("name", "r")])));
    }

    #[test]
    fn present_requires_key() {
        let filter = Filter::parse("(name=*)").unwrap();
        assert!(filter.matches(&props(&[("name", "x")])));
        assert!(!filter.matches(&props(&[])));
    }

    #[test]
    fn not_matches_missing_key() {
        let filter = Filter::parse("(!(name=x))").unwrap();
        assert!(filter.matches(&props(&[])));
        assert!(!filter.matches(&props(&[("name", "x")])));
    }

    #[test]
    fn substring_matches_wildcards() {
        let filter = Filter::parse("(name=fo*ar)").unwrap();
        assert!(filter.matches(&props(&[("name", "foobar")])));
        assert!(!filter.matches(&props(&[("name", "barfoo")])));
    }

    #[test]
    fn numeric_comparisons_use_stored_tag() {
        let mut p = Properties::new();
        p.set_long("service.ranking", 10);
        let filter = Filter::parse("(service.ranking>=5)").unwrap();
        assert!(filter.matches(&p));
        let filter = Filter::parse("(service.ranking<=5)").unwrap();
        assert!(!filter.matches(&p));
    }

    #[test]
    fn empty_filter_matches_all() {
        let filter = Filter::parse("").unwrap();
        assert!(filter.matches(&props(&[])));
    }

    #[test]
    fn rejects_unmatched_parenthesis() {
        assert!(Filter::parse("(name=x").is_err());
    }

    #[test]
    fn rejects_empty_key() {
        assert!(Filter::parse("(=x)").is_err());
    }

    #[test]
    fn rejects_trailing_characters() {
        assert!(Filter::parse("(name=x)garbage").is_err());
    }

    #[test]
    fn round_trips_through_print() {
        let original = Filter::parse("(&(objectClass=com.x.A)(|(name=p)(name=q)))").unwrap();
        let reprinted = Filter::parse(&original.print()).unwrap();
        for case in [
            props(&[("objectClass", "com.x.A"), ("name", "q")]),
            props(&[("objectClass", "com.x.A"), ("name", "r")]),
            props(&[]),
        ] {
            assert_eq!(original.matches(&case), reprinted.matches(&case));
        }
    }
}
