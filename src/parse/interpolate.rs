//! `$VAR` / `${VAR...}` interpolation over strings and YAML values
//!
//! Supported forms:
//! - `$NAME`, `${NAME}`: the value, empty when unset
//! - `${NAME:-word}` / `${NAME-word}`: `word` when unset or empty / unset
//! - `${NAME:+word}` / `${NAME+word}`: `word` when set and non-empty / set
//! - `${NAME:?msg}` / `${NAME?msg}`: fail with `msg` when unset or empty / unset
//! - `${NAME:offset}` / `${NAME:offset:length}`: substring, `${NAME: -2}` counts from the end
//! - `$$`: a literal `$`

use crate::core::env::{scalar_to_string, Environment};
use regex::Regex;
use serde_yaml::Value;
use std::sync::LazyLock;
use thiserror::Error;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*").expect("identifier regex is valid"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("unterminated expression starting at offset {0}")]
    Unterminated(usize),

    #[error("invalid variable name in expression at offset {0}")]
    InvalidName(usize),

    #[error("invalid expression at offset {0}")]
    InvalidExpression(usize),

    #[error("invalid substring offset at offset {0}")]
    InvalidOffset(usize),

    #[error("${name}: {message}")]
    Required { name: String, message: String },
}

/// Expand every expression in `input` against `env`.
///
/// Text without a `$` is returned unchanged.
pub fn interpolate(input: &str, env: &Environment) -> Result<String, InterpolationError> {
    if !input.contains('$') {
        return Ok(input.to_string());
    }
    let mut parser = Parser { src: input, pos: 0, env };
    parser.word(None, true)
}

/// Interpolate every string scalar inside `value`, in place. Mapping keys are
/// left alone.
pub fn interpolate_value(value: &mut Value, env: &Environment) -> Result<(), InterpolationError> {
    match value {
        Value::String(s) => {
            if s.contains('$') {
                *s = interpolate(s, env)?;
            }
        }
        Value::Sequence(items) => {
            for item in items {
                interpolate_value(item, env)?;
            }
        }
        Value::Mapping(mapping) => {
            for (_, v) in mapping.iter_mut() {
                interpolate_value(v, env)?;
            }
        }
        Value::Tagged(tagged) => interpolate_value(&mut tagged.value, env)?,
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

/// Interpolate a whole pipeline document.
///
/// The top level `env:` block is expanded first, entry by entry, each entry
/// seeing the ones before it. Those entries are then merged with `runtime`:
/// pipeline values win unless `prefer_runtime` is set. The rest of the
/// document is expanded against the merged environment.
pub fn interpolate_document(
    document: &mut Value,
    runtime: &Environment,
    prefer_runtime: bool,
) -> Result<(), InterpolationError> {
    let Value::Mapping(mapping) = document else {
        return interpolate_value(document, runtime);
    };

    let mut merged = runtime.clone();
    if let Some(Value::Mapping(env_block)) = mapping.get_mut("env") {
        for (key, value) in env_block.iter_mut() {
            interpolate_value(value, &merged)?;

            let (Some(name), Some(resolved)) = (scalar_to_string(key), env_value(value)) else {
                continue;
            };
            if prefer_runtime && runtime.contains_key(&name) {
                continue;
            }
            merged.insert(name, resolved);
        }
    }

    for (key, value) in mapping.iter_mut() {
        if key.as_str() == Some("env") {
            continue;
        }
        interpolate_value(value, &merged)?;
    }
    Ok(())
}

fn env_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        other => scalar_to_string(other),
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    env: &'a Environment,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(ahead)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn lookup(&self, name: &str) -> Option<&'a str> {
        self.env.get(name).map(String::as_str)
    }

    /// Read text up to `stop` (or the end), expanding expressions.
    ///
    /// With `eval` false the text is only scanned: lookups and `?` checks
    /// are skipped. Used for default words that end up unused.
    fn word(&mut self, stop: Option<(char, usize)>, eval: bool) -> Result<String, InterpolationError> {
        let mut out = String::new();
        loop {
            match self.peek() {
                None => {
                    return match stop {
                        Some((_, start)) => Err(InterpolationError::Unterminated(start)),
                        None => Ok(out),
                    };
                }
                Some(c) if Some(c) == stop.map(|(s, _)| s) => return Ok(out),
                Some('$') => {
                    let expanded = self.dollar(eval)?;
                    out.push_str(&expanded);
                }
                Some(c) => {
                    self.bump();
                    out.push(c);
                }
            }
        }
    }

    fn identifier(&mut self) -> Option<&'a str> {
        let src: &'a str = self.src;
        let m = IDENTIFIER.find(&src[self.pos..])?;
        self.pos += m.end();
        Some(m.as_str())
    }

    fn dollar(&mut self, eval: bool) -> Result<String, InterpolationError> {
        let start = self.pos;
        self.bump();

        match self.peek() {
            Some('$') => {
                self.bump();
                Ok("$".to_string())
            }
            Some('{') => {
                self.bump();
                self.braced(start, eval)
            }
            _ => match self.identifier() {
                Some(name) if eval => Ok(self.lookup(name).unwrap_or_default().to_string()),
                Some(_) => Ok(String::new()),
                None => Ok("$".to_string()),
            },
        }
    }

    fn braced(&mut self, start: usize, eval: bool) -> Result<String, InterpolationError> {
        let name = self
            .identifier()
            .ok_or(InterpolationError::InvalidName(start))?;
        let value = if eval { self.lookup(name) } else { None };
        let closing = Some(('}', start));

        let result = match self.bump() {
            None => return Err(InterpolationError::Unterminated(start)),
            Some('}') => return Ok(value.unwrap_or_default().to_string()),
            Some(':') => match self.peek() {
                Some('-') => {
                    self.bump();
                    let use_default = value.map_or(true, str::is_empty);
                    let word = self.word(closing, eval && use_default)?;
                    if use_default { word } else { value.unwrap_or_default().to_string() }
                }
                Some('+') => {
                    self.bump();
                    let use_alt = value.is_some_and(|v| !v.is_empty());
                    let word = self.word(closing, eval && use_alt)?;
                    if use_alt { word } else { String::new() }
                }
                Some('?') => {
                    self.bump();
                    let missing = value.map_or(true, str::is_empty);
                    let message = self.word(closing, eval && missing)?;
                    if eval && missing {
                        return Err(required(name, message));
                    }
                    value.unwrap_or_default().to_string()
                }
                _ => {
                    let (offset, length) = self.substring_range(start)?;
                    return self
                        .expect_close(start)
                        .map(|_| substring(value.unwrap_or_default(), offset, length));
                }
            },
            Some('-') => {
                let word = self.word(closing, eval && value.is_none())?;
                match value {
                    Some(v) => v.to_string(),
                    None => word,
                }
            }
            Some('+') => {
                let word = self.word(closing, eval && value.is_some())?;
                if value.is_some() { word } else { String::new() }
            }
            Some('?') => {
                let message = self.word(closing, eval && value.is_none())?;
                match value {
                    Some(v) => v.to_string(),
                    None if eval => return Err(required(name, message)),
                    None => String::new(),
                }
            }
            Some(_) => return Err(InterpolationError::InvalidExpression(start)),
        };

        self.expect_close(start)?;
        Ok(result)
    }

    fn expect_close(&mut self, start: usize) -> Result<(), InterpolationError> {
        match self.bump() {
            Some('}') => Ok(()),
            None => Err(InterpolationError::Unterminated(start)),
            Some(_) => Err(InterpolationError::InvalidExpression(start)),
        }
    }

    fn substring_range(&mut self, start: usize) -> Result<(i64, Option<usize>), InterpolationError> {
        while self.peek() == Some(' ') {
            self.bump();
        }
        let offset = self
            .integer(true)
            .ok_or(InterpolationError::InvalidOffset(start))?;

        let length = if self.peek() == Some(':') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            let length = self
                .integer(false)
                .ok_or(InterpolationError::InvalidOffset(start))?;
            Some(length as usize)
        } else {
            None
        };
        Ok((offset, length))
    }

    fn integer(&mut self, signed: bool) -> Option<i64> {
        let begin = self.pos;
        if signed && self.peek() == Some('-') {
            self.bump();
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        self.src[begin..self.pos].parse().ok()
    }
}

fn required(name: &str, message: String) -> InterpolationError {
    InterpolationError::Required {
        name: name.to_string(),
        message: if message.is_empty() {
            "not set".to_string()
        } else {
            message
        },
    }
}

fn substring(value: &str, offset: i64, length: Option<usize>) -> String {
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len() as i64;
    let begin = if offset < 0 {
        (len + offset).max(0)
    } else {
        offset.min(len)
    };
    let begin = begin as usize;
    let end = match length {
        Some(n) => (begin + n).min(chars.len()),
        None => chars.len(),
    };
    chars[begin..end].iter().collect()
}
