//! Variable interpolation for declaration strings and copied files.
//!
//! Paths, URLs, argument overrides and file contents may reference variables
//! that are only known once an environment is selected. This module parses
//! such strings and substitutes the values from a [`Resolver`].
//!
//! # Placeholder Format
//!
//! - `{NAME}` - the value of variable `NAME`, where `NAME` matches
//!   `[A-Za-z_][A-Za-z0-9_]*`
//!
//! # Pass-through
//!
//! A `{` that does not start an identifier is kept as a literal, so YAML flow
//! mappings (`{a: b}`) and Go templates (`{{ .Values.image }}`) survive
//! interpolation unchanged. A doubled `{{` is always literal, and so is a
//! `${...}` expression, which leaves shell snippets such as `${HOME}` alone.
//!
//! # Example
//!
//! ```
//! use kdeploy_lib::placeholder::{parse, Segment};
//!
//! let segments = parse("values/{ENV}.yaml").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Literal("values/".to_string()),
//!     Segment::Var("ENV".to_string()),
//!     Segment::Literal(".yaml".to_string()),
//! ]);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The variable bound to the environment name during expansion.
pub const ENV_VAR: &str = "ENV";

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders)
  Literal(String),

  /// A variable to be resolved
  Var(String),
}

/// Errors that can occur during placeholder parsing or resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("undefined variable: {0}")]
  Undefined(String),
}

/// Trait for looking up variable values during substitution.
pub trait Resolver {
  /// Resolve a variable by name, `None` if it is not bound.
  fn resolve(&self, name: &str) -> Option<&str>;
}

/// An ordered set of variable bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables(BTreeMap<String, String>);

impl Variables {
  pub fn new() -> Self {
    Self(BTreeMap::new())
  }

  /// Bind `name`, replacing any previous value.
  pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
    self.0.insert(name.into(), value.into());
  }

  /// Builder-style [`set`](Self::set).
  pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.set(name, value);
    self
  }

  /// Layer `other` on top of these bindings; `other` wins on conflicts.
  pub fn extend<'a>(&mut self, other: impl IntoIterator<Item = (&'a String, &'a String)>) {
    for (key, value) in other {
      self.0.insert(key.clone(), value.clone());
    }
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.0.get(name).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
    self.0.iter()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn into_inner(self) -> BTreeMap<String, String> {
    self.0
  }
}

impl From<BTreeMap<String, String>> for Variables {
  fn from(map: BTreeMap<String, String>) -> Self {
    Self(map)
  }
}

impl<'a> IntoIterator for &'a Variables {
  type Item = (&'a String, &'a String);
  type IntoIter = std::collections::btree_map::Iter<'a, String, String>;

  fn into_iter(self) -> Self::IntoIter {
    self.0.iter()
  }
}

impl Resolver for Variables {
  fn resolve(&self, name: &str) -> Option<&str> {
    self.get(name)
  }
}

impl Resolver for BTreeMap<String, String> {
  fn resolve(&self, name: &str) -> Option<&str> {
    self.get(name).map(String::as_str)
  }
}

fn is_ident_start(c: char) -> bool {
  c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_'
}

/// Parse a string containing placeholders into segments.
///
/// # Errors
///
/// Returns [`PlaceholderError::Unclosed`] when the input ends inside a
/// placeholder such as `values/{ENV`.
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '{' || literal.ends_with('$') {
      literal.push(ch);
      continue;
    }

    match chars.peek() {
      Some((_, '{')) => {
        // "{{" opens a template expression of some other engine
        chars.next();
        literal.push_str("{{");
      }
      Some((_, c)) if is_ident_start(*c) => {
        let mut name = String::new();
        while let Some((_, c)) = chars.peek() {
          if !is_ident_char(*c) {
            break;
          }
          name.push(*c);
          chars.next();
        }

        match chars.peek() {
          Some((_, '}')) => {
            chars.next();
            if !literal.is_empty() {
              segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Var(name));
          }
          None => return Err(PlaceholderError::Unclosed(pos)),
          Some(_) => {
            // "{cpu: 1}" and friends are not placeholders
            literal.push('{');
            literal.push_str(&name);
          }
        }
      }
      _ => literal.push('{'),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

/// Returns true if `input` references at least one variable.
pub fn has_placeholders(input: &str) -> bool {
  parse(input)
    .map(|segments| segments.iter().any(|s| matches!(s, Segment::Var(_))))
    .unwrap_or(true)
}

/// Substitute all placeholders in a string using the provided resolver.
///
/// # Errors
///
/// Returns an error if parsing fails or if any variable is undefined.
pub fn substitute(input: &str, resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let segments = parse(input)?;
  substitute_segments(&segments, resolver)
}

/// Substitute placeholders in pre-parsed segments.
pub fn substitute_segments(segments: &[Segment], resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let mut result = String::new();

  for segment in segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Var(name) => {
        let value = resolver
          .resolve(name)
          .ok_or_else(|| PlaceholderError::Undefined(name.clone()))?;
        result.push_str(value);
      }
    }
  }

  Ok(result)
}
