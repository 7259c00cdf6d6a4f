// src/exec/lexer.rs

//! Splits a rendered command string into an argument vector.
//!
//! Rules:
//! - unquoted whitespace separates tokens;
//! - `"..."` and `'...'` spans are part of the surrounding token and keep
//!   their interior whitespace;
//! - a backslash escapes the following character, inside or outside quotes;
//! - `""` produces an empty token.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("unterminated {quote} quote opened at byte {offset}")]
    UnterminatedQuote { quote: char, offset: usize },
}

/// Tokenize `command` into arguments.
pub fn tokenize(command: &str) -> Result<Vec<String>, LexError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // Distinguishes "no token yet" from "an empty quoted token".
    let mut in_token = false;
    let mut quote: Option<(char, usize)> = None;
    let mut chars = command.char_indices();

    while let Some((offset, c)) = chars.next() {
        match (quote, c) {
            (_, '\\') => {
                in_token = true;
                match chars.next() {
                    Some((_, escaped)) => current.push(escaped),
                    None => current.push('\\'),
                }
            }
            (Some((open, _)), c) if c == open => {
                quote = None;
            }
            (Some(_), c) => current.push(c),
            (None, '"') | (None, '\'') => {
                in_token = true;
                quote = Some((c, offset));
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                in_token = true;
                current.push(c);
            }
        }
    }

    if let Some((quote, offset)) = quote {
        return Err(LexError::UnterminatedQuote { quote, offset });
    }
    if in_token {
        tokens.push(current);
    }

    Ok(tokens)
}
