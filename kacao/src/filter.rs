use std::collections::BTreeMap;

use crate::error::ValidationError;
use crate::types::Record;

pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderMatch {
    /// The header must be present, any value will do.
    Any,
    Exact(String),
}

impl HeaderMatch {
    fn accepts(&self, value: &[u8]) -> bool {
        match self {
            HeaderMatch::Any => true,
            HeaderMatch::Exact(expected) => expected.as_bytes() == value,
        }
    }
}

/// Predicates a record must satisfy to be printed. Every entry has to match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    pub key: Option<String>,
    pub headers: BTreeMap<String, HeaderMatch>,
}

impl FilterSpec {
    /// Build a filter from a `--key` value and `--header key=value` arguments.
    /// A repeated header key keeps the last value given.
    pub fn from_args(key: Option<String>, headers: &[String]) -> Result<Self, ValidationError> {
        let mut spec = FilterSpec {
            key,
            headers: BTreeMap::new(),
        };
        for arg in headers {
            let (name, matcher) = parse_header_arg(arg)?;
            spec.headers.insert(name, matcher);
        }
        Ok(spec)
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_none() && self.headers.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        if let Some(expected) = &self.key {
            match &record.key {
                Some(key) if key.as_slice() == expected.as_bytes() => {}
                _ => return false,
            }
        }

        // absent header keys never satisfy an entry, wildcard or not
        self.headers.iter().all(|(name, matcher)| {
            record
                .headers
                .iter()
                .any(|header| header.key == *name && matcher.accepts(&header.value))
        })
    }
}

/// Split one `key=value` argument. Exactly one `=` is allowed.
pub fn split_header_arg(arg: &str) -> Result<(&str, &str), ValidationError> {
    let parts: Vec<&str> = arg.split('=').collect();
    match parts.as_slice() {
        &[name, value] => Ok((name, value)),
        _ => Err(ValidationError::Header(arg.to_string())),
    }
}

/// Parse one `key=value` filter argument, `*` standing for any value.
pub fn parse_header_arg(arg: &str) -> Result<(String, HeaderMatch), ValidationError> {
    let (name, value) = split_header_arg(arg)?;

    let matcher = if value == WILDCARD {
        HeaderMatch::Any
    } else {
        HeaderMatch::Exact(value.to_string())
    };
    Ok((name.to_string(), matcher))
}
