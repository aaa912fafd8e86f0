//! Tokenizer for band-maths expressions and identifier renaming
//!
//! Only identifier tokens are ever rewritten. Numbers, quoted literals,
//! operators and whitespace are copied back verbatim, and an identifier
//! directly after a `.` (a flag name, as in `l1_flags.INVALID`) is left alone.

use crate::types::{CollocError, CollocResult};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

const TOKEN_PATTERN: &str = r#"(?P<number>(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)|(?P<ident>[A-Za-z_][A-Za-z0-9_]*)|(?P<literal>"[^"]*"|'[^']*')|(?P<space>\s+)|(?P<op>(?s:.))"#;

/// One lexical token, borrowing from the source expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Number(&'a str),
    Identifier(&'a str),
    Literal(&'a str),
    Whitespace(&'a str),
    Operator(&'a str),
}

impl<'a> Token<'a> {
    pub fn text(&self) -> &'a str {
        match self {
            Token::Number(s)
            | Token::Identifier(s)
            | Token::Literal(s)
            | Token::Whitespace(s)
            | Token::Operator(s) => s,
        }
    }
}

fn token_regex() -> CollocResult<&'static Regex> {
    static TOKEN_REGEX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    TOKEN_REGEX
        .get_or_init(|| Regex::new(TOKEN_PATTERN))
        .as_ref()
        .map_err(|e| CollocError::Processing(format!("Invalid expression token pattern: {}", e)))
}

/// Split `expression` into tokens. Concatenating the token texts gives the
/// input back unchanged.
pub fn tokenize(expression: &str) -> CollocResult<Vec<Token<'_>>> {
    let regex = token_regex()?;
    let mut tokens = Vec::new();
    for captures in regex.captures_iter(expression) {
        let token = if let Some(m) = captures.name("number") {
            Token::Number(m.as_str())
        } else if let Some(m) = captures.name("ident") {
            Token::Identifier(m.as_str())
        } else if let Some(m) = captures.name("literal") {
            Token::Literal(m.as_str())
        } else if let Some(m) = captures.name("space") {
            Token::Whitespace(m.as_str())
        } else if let Some(m) = captures.name("op") {
            Token::Operator(m.as_str())
        } else {
            continue;
        };
        tokens.push(token);
    }
    Ok(tokens)
}

/// Replace every identifier of `expression` found in `renames` by its new
/// name.
pub fn rename_identifiers(expression: &str, renames: &HashMap<String, String>) -> CollocResult<String> {
    let tokens = tokenize(expression)?;
    let mut result = String::with_capacity(expression.len() + 16);
    let mut after_member_dot = false;

    for token in &tokens {
        match token {
            Token::Identifier(name) if !after_member_dot => match renames.get(*name) {
                Some(new_name) => result.push_str(new_name),
                None => result.push_str(name),
            },
            other => result.push_str(other.text()),
        }
        match token {
            Token::Whitespace(_) => {}
            Token::Operator(".") => after_member_dot = true,
            _ => after_member_dot = false,
        }
    }
    Ok(result)
}

/// Identifiers an expression refers to, flag member names excluded
pub fn referenced_identifiers(expression: &str) -> CollocResult<Vec<String>> {
    let tokens = tokenize(expression)?;
    let mut names: Vec<String> = Vec::new();
    let mut after_member_dot = false;
    for token in &tokens {
        if let Token::Identifier(name) = token {
            if !after_member_dot && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        match token {
            Token::Whitespace(_) => {}
            Token::Operator(".") => after_member_dot = true,
            _ => after_member_dot = false,
        }
    }
    Ok(names)
}
