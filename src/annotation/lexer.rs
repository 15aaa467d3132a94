//! Tokeniser for a single line of annotation hints.
//!
//! Items are separated by whitespace. Each item is tried against, in order:
//! `name=/:"value"`, `name=/:'value'`, `name=/:bareword`, then a bare `name`
//! flag. Both separators are accepted so fence info strings
//! (`bash env with:zsh`) and tag attributes (`<r label="x">`) share one grammar.

use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Flag(String),
    Param { name: String, value: String },
}

pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    loop {
        skip_whitespace(&mut chars);
        let Some(&(start, _)) = chars.peek() else {
            break;
        };

        let mut end = start;
        let mut separator = false;
        while let Some(&(idx, ch)) = chars.peek() {
            if ch.is_whitespace() {
                break;
            }
            if ch == '=' || ch == ':' {
                separator = true;
                chars.next();
                break;
            }
            end = idx + ch.len_utf8();
            chars.next();
        }
        let name = &input[start..end];

        if !separator {
            if !name.is_empty() {
                tokens.push(Token::Flag(name.to_string()));
            }
            continue;
        }

        let value = read_value(input, &mut chars);
        if name.is_empty() {
            // A stray separator with no name in front of it carries nothing usable.
            continue;
        }
        tokens.push(Token::Param {
            name: name.to_string(),
            value,
        });
    }

    tokens
}

fn skip_whitespace(chars: &mut Peekable<CharIndices<'_>>) {
    while let Some(&(_, ch)) = chars.peek() {
        if !ch.is_whitespace() {
            break;
        }
        chars.next();
    }
}

fn read_value(input: &str, chars: &mut Peekable<CharIndices<'_>>) -> String {
    match chars.peek().copied() {
        Some((_, quote @ ('"' | '\''))) => {
            chars.next();
            read_quoted(chars, quote)
        }
        Some((start, _)) => {
            let mut end = start;
            while let Some(&(idx, ch)) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                end = idx + ch.len_utf8();
                chars.next();
            }
            input[start..end].to_string()
        }
        None => String::new(),
    }
}

fn read_quoted(chars: &mut Peekable<CharIndices<'_>>, quote: char) -> String {
    let mut value = String::new();
    while let Some((_, ch)) = chars.next() {
        match ch {
            '\\' => match chars.peek().copied() {
                Some((_, next)) if next == quote || next == '\\' => {
                    value.push(next);
                    chars.next();
                }
                _ => value.push('\\'),
            },
            c if c == quote => return value,
            c => value.push(c),
        }
    }
    // Unterminated quote: keep what we have.
    value
}
