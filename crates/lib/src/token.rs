//! Deferred references between resources.
//!
//! Properties are plain JSON while a stack is being built, but some values are
//! not known until the whole plan is finalized: the logical id of another
//! resource, or one of its runtime attributes. Such values are written into
//! property strings as tokens and resolved to intrinsic-function JSON when the
//! stack is synthesized.
//!
//! # Token Formats
//!
//! - `$${ref:<path>}` - reference to the resource at construct path `<path>`
//! - `$${ref:AWS::<name>}` - pseudo parameter such as `AWS::Partition`
//! - `$${att:<path>:<attribute>}` - runtime attribute of a resource
//!
//! A string consisting of exactly one token resolves to the bare intrinsic;
//! a string mixing literals and tokens resolves to `Fn::Join`.
//!
//! # Escaping
//!
//! `$$${` produces a literal `$${`. Single `$` passes through unchanged.
//!
//! # Example
//!
//! ```
//! use edgekit_lib::token::{parse, Segment, Token};
//!
//! let segments = parse("arn:$${ref:AWS::Partition}:s3:::bucket").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Literal("arn:".to_string()),
//!     Segment::Token(Token::Ref("AWS::Partition".to_string())),
//!     Segment::Literal(":s3:::bucket".to_string()),
//! ]);
//! ```

use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::debug;

use crate::error::SynthError;

/// A parsed deferred reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
  /// `$${ref:<path>}`
  Ref(String),

  /// `$${att:<path>:<attribute>}`
  Att { path: String, attribute: String },
}

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  Literal(String),
  Token(Token),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
  #[error("unclosed token at position {0}")]
  Unclosed(usize),

  #[error("unknown token kind: {0}")]
  UnknownKind(String),

  #[error("malformed token: {0}")]
  Malformed(String),
}

/// Looks up the logical id behind a construct path while rendering.
pub trait Resolver {
  fn resolve_logical_id(&self, path: &str) -> Result<String, SynthError>;
}

pub fn ref_token(path: &str) -> String {
  format!("$${{ref:{path}}}")
}

pub fn att_token(path: &str, attribute: &str) -> String {
  format!("$${{att:{path}:{attribute}}}")
}

/// Token for a pseudo parameter, e.g. `pseudo("Partition")`.
pub fn pseudo(name: &str) -> String {
  ref_token(&format!("AWS::{name}"))
}

pub fn contains_tokens(input: &str) -> bool {
  parse(input)
    .map(|segments| segments.iter().any(|s| matches!(s, Segment::Token(_))))
    .unwrap_or(false)
}

/// Parse a string into literal and token segments.
pub fn parse(input: &str) -> Result<Vec<Segment>, TokenError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' || !matches!(chars.peek(), Some((_, '$'))) {
      literal.push(ch);
      continue;
    }
    chars.next();

    match chars.peek() {
      Some((_, '$')) => {
        chars.next();
        if matches!(chars.peek(), Some((_, '{'))) {
          chars.next();
          literal.push_str("$${");
        } else {
          literal.push_str("$$$");
        }
      }
      Some((_, '{')) => {
        chars.next();
        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }

        let mut content = String::new();
        let mut closed = false;
        for (_, c) in chars.by_ref() {
          if c == '}' {
            closed = true;
            break;
          }
          content.push(c);
        }
        if !closed {
          return Err(TokenError::Unclosed(pos));
        }
        segments.push(Segment::Token(parse_token_content(&content)?));
      }
      _ => literal.push_str("$$"),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

fn parse_token_content(content: &str) -> Result<Token, TokenError> {
  let (kind, rest) = content
    .split_once(':')
    .ok_or_else(|| TokenError::Malformed(format!("missing colon in '{content}'")))?;

  if rest.is_empty() {
    return Err(TokenError::Malformed(format!("empty target in '{content}'")));
  }

  match kind {
    "ref" => Ok(Token::Ref(rest.to_string())),
    "att" => {
      let (path, attribute) = rest
        .rsplit_once(':')
        .filter(|(p, a)| !p.is_empty() && !a.is_empty())
        .ok_or_else(|| TokenError::Malformed(format!("attribute token missing attribute: '{content}'")))?;
      Ok(Token::Att {
        path: path.to_string(),
        attribute: attribute.to_string(),
      })
    }
    _ => Err(TokenError::UnknownKind(kind.to_string())),
  }
}

fn resolve_token(token: &Token, resolver: &dyn Resolver) -> Result<Value, SynthError> {
  match token {
    Token::Ref(path) if path.starts_with("AWS::") => Ok(json!({ "Ref": path })),
    Token::Ref(path) => Ok(json!({ "Ref": resolver.resolve_logical_id(path)? })),
    Token::Att { path, attribute } => {
      let logical_id = resolver.resolve_logical_id(path)?;
      Ok(json!({ "Fn::GetAtt": [logical_id, attribute] }))
    }
  }
}

/// Resolve a single string into a JSON value.
pub fn resolve_str(input: &str, resolver: &dyn Resolver) -> Result<Value, SynthError> {
  let segments = parse(input)?;

  match segments.as_slice() {
    [] => Ok(Value::String(String::new())),
    [Segment::Literal(s)] => Ok(Value::String(s.clone())),
    [Segment::Token(token)] => resolve_token(token, resolver),
    _ => {
      debug!(input = %input, "joining mixed token string");
      let parts = segments
        .iter()
        .map(|segment| match segment {
          Segment::Literal(s) => Ok(Value::String(s.clone())),
          Segment::Token(token) => resolve_token(token, resolver),
        })
        .collect::<Result<Vec<_>, _>>()?;
      Ok(json!({ "Fn::Join": ["", parts] }))
    }
  }
}

/// Resolve every string inside a JSON tree.
pub fn resolve_value(value: &Value, resolver: &dyn Resolver) -> Result<Value, SynthError> {
  match value {
    Value::String(s) => resolve_str(s, resolver),
    Value::Array(items) => Ok(Value::Array(
      items
        .iter()
        .map(|item| resolve_value(item, resolver))
        .collect::<Result<_, _>>()?,
    )),
    Value::Object(map) => {
      let mut resolved = Map::new();
      for (key, item) in map {
        resolved.insert(key.clone(), resolve_value(item, resolver)?);
      }
      Ok(Value::Object(resolved))
    }
    other => Ok(other.clone()),
  }
}
