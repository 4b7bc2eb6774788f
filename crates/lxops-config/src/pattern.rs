//! `(key)` pattern substitution built on `nom`.
//!
//! A pattern is plain text with zero or more non-nested `(key)`
//! placeholders. Keys are looked up in a [`PatternContext`], an ordered
//! list of resolver layers: the first layer that knows a key wins. Keys
//! starting with `.` are user properties by convention; everything else
//! is a computed key such as `instance` or `project`.
//!
//! Substitution is all-or-nothing. A key that no layer resolves fails
//! the whole pattern.

use std::collections::BTreeMap;
use std::fmt;

use lxops_common::error::{LxopsError, Result};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::is_not,
    character::complete::char,
    combinator::map,
    multi::many0,
    sequence::delimited,
};
use serde::{Deserialize, Serialize};

/// A piece of a parsed pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Key(&'a str),
}

fn literal(input: &str) -> IResult<&str, Segment<'_>> {
    map(is_not("()"), Segment::Literal).parse(input)
}

fn key(input: &str) -> IResult<&str, Segment<'_>> {
    map(delimited(char('('), is_not("()"), char(')')), Segment::Key).parse(input)
}

fn pattern_error(pattern: &str, message: impl Into<String>) -> LxopsError {
    LxopsError::Pattern {
        pattern: pattern.to_string(),
        message: message.into(),
    }
}

fn parse(pattern: &str) -> Result<Vec<Segment<'_>>> {
    if pattern.contains(['{', '}']) {
        return Err(pattern_error(
            pattern,
            "legacy {} placeholders are not supported, use (key)",
        ));
    }
    let (rest, segments) = many0(alt((literal, key)))
        .parse(pattern)
        .map_err(|e| pattern_error(pattern, format!("parse error: {e}")))?;
    if !rest.is_empty() {
        let offset = pattern.len() - rest.len();
        return Err(pattern_error(
            pattern,
            format!("unbalanced or nested parenthesis at offset {offset}"),
        ));
    }
    Ok(segments)
}

/// Substitutes every `(key)` in `pattern` using `resolve`.
///
/// `resolve` returns `None` when it has no value for a key, which aborts
/// the substitution.
///
/// # Errors
///
/// Returns an error if the pattern is malformed, a key is unknown, or
/// `resolve` itself fails.
pub fn substitute<F>(pattern: &str, mut resolve: F) -> Result<String>
where
    F: FnMut(&str) -> Option<Result<String>>,
{
    let mut out = String::with_capacity(pattern.len());
    for segment in parse(pattern)? {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Key(key) => match resolve(key) {
                Some(value) => out.push_str(&value?),
                None => return Err(pattern_error(pattern, format!("no value for ({key})"))),
            },
        }
    }
    Ok(out)
}

/// Returns the keys referenced by `pattern`, in order of appearance.
///
/// # Errors
///
/// Returns an error if the pattern is malformed.
pub fn keys(pattern: &str) -> Result<Vec<&str>> {
    Ok(parse(pattern)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Key(key) => Some(key),
            Segment::Literal(_) => None,
        })
        .collect())
}

/// A deferred computation for a key.
pub type KeyFn<'a> = Box<dyn Fn() -> Result<String> + 'a>;

/// One source of key values.
pub enum ResolverLayer<'a> {
    /// Exact-match constant values.
    Properties(BTreeMap<String, String>),
    /// Values computed on demand, each time the key is used.
    Functions(BTreeMap<String, KeyFn<'a>>),
}

impl ResolverLayer<'_> {
    fn lookup(&self, key: &str) -> Option<Result<String>> {
        match self {
            Self::Properties(values) => values.get(key).cloned().map(Ok),
            Self::Functions(functions) => functions.get(key).map(|f| f()),
        }
    }
}

impl fmt::Debug for ResolverLayer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Properties(values) => f.debug_tuple("Properties").field(values).finish(),
            Self::Functions(functions) => f
                .debug_tuple("Functions")
                .field(&functions.keys().collect::<Vec<_>>())
                .finish(),
        }
    }
}

/// Ordered stack of resolver layers. Earlier layers shadow later ones.
#[derive(Debug, Default)]
pub struct PatternContext<'a> {
    layers: Vec<ResolverLayer<'a>>,
}

impl<'a> PatternContext<'a> {
    /// Creates a context from layers in precedence order.
    #[must_use]
    pub const fn new(layers: Vec<ResolverLayer<'a>>) -> Self {
        Self { layers }
    }

    /// Appends a layer with lower precedence than all existing layers.
    pub fn push(&mut self, layer: ResolverLayer<'a>) {
        self.layers.push(layer);
    }

    /// Looks a key up through the layers.
    pub fn resolve(&self, key: &str) -> Option<Result<String>> {
        self.layers.iter().find_map(|layer| layer.lookup(key))
    }

    /// Substitutes `pattern` against this context.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is malformed or references a key
    /// that no layer resolves.
    pub fn substitute(&self, pattern: &str) -> Result<String> {
        substitute(pattern, |key| self.resolve(key))
    }
}

/// Pattern text as written in a config file. Never stored resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern(String);

impl Pattern {
    /// Wraps pattern text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Returns the raw pattern text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the pattern is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Substitutes this pattern against `context`.
    ///
    /// # Errors
    ///
    /// See [`PatternContext::substitute`].
    pub fn substitute(&self, context: &PatternContext<'_>) -> Result<String> {
        context.substitute(&self.0)
    }

    /// Returns the keys this pattern references.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is malformed.
    pub fn keys(&self) -> Result<Vec<&str>> {
        keys(&self.0)
    }
}

impl From<&str> for Pattern {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
