//! Compiler-emitted dependency lists.
//!
//! Two shapes are understood, chosen by the list file's extension:
//!
//! - `.d`: a single Makefile rule, `target: dep dep \` with backslash line
//!   continuations and `\ ` for spaces inside a path.
//! - anything else: one path per line. Type-library byproducts (`.tlh`,
//!   `.tli`) are dropped since they are outputs of the compile, not inputs.
//!
//! Anything that does not fit the expected shape is an error rather than an
//! empty list.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::consts::{EXCLUDED_DEPENDENCY_EXTENSIONS, MAKEFILE_DEPENDENCY_EXTENSION};
use crate::fs::path::{has_any_extension, has_extension};

#[derive(Debug, Error)]
pub enum DepListError {
  #[error("failed to read dependency list {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed dependency list {path} (line {line}): {reason}")]
  Malformed { path: PathBuf, line: usize, reason: String },
}

/// Reads and parses the dependency list at `path`.
pub fn read_dependency_list(path: &Path) -> Result<Vec<PathBuf>, DepListError> {
  let text = std::fs::read_to_string(path).map_err(|source| DepListError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  parse_dependency_list(path, &text)
}

/// Parses `text` as the list format implied by `path`'s extension.
pub fn parse_dependency_list(path: &Path, text: &str) -> Result<Vec<PathBuf>, DepListError> {
  if has_extension(path, MAKEFILE_DEPENDENCY_EXTENSION) {
    parse_makefile_rule(path, text)
  } else {
    Ok(parse_plain_list(text))
  }
}

pub fn parse_plain_list(text: &str) -> Vec<PathBuf> {
  text
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .map(PathBuf::from)
    .filter(|p| !has_any_extension(p, EXCLUDED_DEPENDENCY_EXTENSIONS))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
  Word(String),
  Colon,
  Newline,
}

/// Parses a single `target: deps...` rule, returning the dependencies.
pub fn parse_makefile_rule(path: &Path, text: &str) -> Result<Vec<PathBuf>, DepListError> {
  let malformed = |line: usize, reason: &str| DepListError::Malformed {
    path: path.to_path_buf(),
    line,
    reason: reason.to_string(),
  };

  let mut tokens = tokenize(text).into_iter().peekable();

  while tokens.next_if(|(t, _)| *t == Token::Newline).is_some() {}

  match tokens.next() {
    Some((Token::Word(_), _)) => {}
    Some((_, line)) => return Err(malformed(line, "expected a target name")),
    None => return Err(malformed(1, "empty dependency list")),
  }

  match tokens.next() {
    Some((Token::Colon, _)) => {}
    Some((_, line)) => return Err(malformed(line, "expected ':' after the target name")),
    None => return Err(malformed(1, "missing ':' after the target name")),
  }

  let mut dependencies = Vec::new();
  for (token, line) in tokens.by_ref() {
    match token {
      Token::Word(word) => dependencies.push(PathBuf::from(word)),
      Token::Newline => break,
      Token::Colon => return Err(malformed(line, "unexpected ':' in dependency list")),
    }
  }

  if let Some((_, line)) = tokens.find(|(t, _)| *t != Token::Newline) {
    return Err(malformed(line, "only one rule is supported"));
  }

  Ok(dependencies)
}

/// Splits rule text into words, colons and newlines, tagging each token with
/// the 1-based line it started on.
fn tokenize(text: &str) -> Vec<(Token, usize)> {
  let mut tokens = Vec::new();
  let mut word = String::new();
  let mut line = 1;
  let mut chars = text.chars().peekable();

  let flush = |word: &mut String, tokens: &mut Vec<(Token, usize)>, line: usize| {
    if !word.is_empty() {
      tokens.push((Token::Word(std::mem::take(word)), line));
    }
  };

  while let Some(ch) = chars.next() {
    match ch {
      '\\' => match chars.peek() {
        Some(' ') => {
          chars.next();
          word.push(' ');
        }
        Some('\n') => {
          chars.next();
          flush(&mut word, &mut tokens, line);
          line += 1;
        }
        Some('\r') => {
          chars.next();
          if chars.next_if_eq(&'\n').is_some() {
            flush(&mut word, &mut tokens, line);
            line += 1;
          } else {
            word.push('\\');
            word.push('\r');
          }
        }
        // Windows paths keep their separators.
        _ => word.push('\\'),
      },
      // `C:\` and `C:/` start an absolute Windows path; any other colon separates.
      ':' if is_drive_letter(&word) && matches!(chars.peek(), Some('\\' | '/')) => word.push(':'),
      ':' => {
        flush(&mut word, &mut tokens, line);
        tokens.push((Token::Colon, line));
      }
      '\n' => {
        flush(&mut word, &mut tokens, line);
        tokens.push((Token::Newline, line));
        line += 1;
      }
      '\r' if chars.peek() == Some(&'\n') => {}
      c if c.is_whitespace() => flush(&mut word, &mut tokens, line),
      c => word.push(c),
    }
  }
  flush(&mut word, &mut tokens, line);
  tokens
}

fn is_drive_letter(word: &str) -> bool {
  let mut chars = word.chars();
  matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_alphabetic())
}
