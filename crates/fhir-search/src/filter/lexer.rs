//! Tokenizer for `_filter` expressions.

use nom::{
    bytes::complete::take_while,
    character::complete::satisfy,
    combinator::recognize,
    number::complete::recognize_float,
    sequence::pair,
    IResult,
};

use crate::error::{SearchError, SearchResult};
use crate::infer::date_literal;

const OPERATORS: [&str; 19] = [
    "eq", "ne", "gt", "lt", "ge", "le", "co", "sw", "ew", "pr", "po", "ss", "sb", "re", "in",
    "ni", "sa", "eb", "ap",
];

/// Token categories of the filter language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// A quoted string; the token text is unescaped.
    String,
    /// A numeric literal.
    Number,
    /// A calendar date or date-time literal.
    Date,
    /// A parameter path or bare word.
    Identifier,
    /// A two-letter comparison keyword.
    Operator,
    /// `and` (any case)
    And,
    /// `or` (any case)
    Or,
    /// `not` (any case)
    Not,
    /// End of input.
    Eof,
}

/// A token with its character offset in the expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Category.
    pub kind: TokenKind,
    /// Source text; unescaped contents for strings, empty at end of input.
    pub text: String,
    /// Character offset of the first character.
    pub position: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, position: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            position,
        }
    }
}

/// Splits a filter expression into tokens, ending with [`TokenKind::Eof`].
///
/// # Errors
///
/// [`SearchError::UnterminatedString`] for an unclosed quote and
/// [`SearchError::UnexpectedCharacter`] for anything outside the language.
pub fn tokenize(input: &str) -> SearchResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut offset = 0usize;
    // Character offset of `offset`.
    let mut position = 0usize;

    while let Some(c) = input[offset..].chars().next() {
        let rest = &input[offset..];
        let (token, consumed) = if c.is_whitespace() {
            (None, c.len_utf8())
        } else if c == '(' {
            (Some(Token::new(TokenKind::LParen, "(", position)), 1)
        } else if c == ')' {
            (Some(Token::new(TokenKind::RParen, ")", position)), 1)
        } else if c == '\'' || c == '"' {
            let (text, consumed) = quoted(rest, position)?;
            (Some(Token::new(TokenKind::String, text, position)), consumed)
        } else if let Some((kind, text)) = numeric(rest) {
            // A literal must not run into a word: `2010abc` is not `2010` then `abc`.
            if let Some(next) = rest[text.len()..].chars().next() {
                if next.is_alphabetic() || next == '_' {
                    return Err(SearchError::UnexpectedCharacter {
                        character: next,
                        position: position + text.chars().count(),
                    });
                }
            }
            (Some(Token::new(kind, text, position)), text.len())
        } else if let Ok((_, text)) = word(rest) {
            (Some(Token::new(word_kind(text), text, position)), text.len())
        } else {
            return Err(SearchError::UnexpectedCharacter {
                character: c,
                position,
            });
        };

        if let Some(token) = token {
            tokens.push(token);
        }
        position += rest[..consumed].chars().count();
        offset += consumed;
    }

    tokens.push(Token::new(TokenKind::Eof, "", position));
    Ok(tokens)
}

fn word(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || matches!(c, '_' | '-' | '.')),
    ))(input)
}

fn word_kind(text: &str) -> TokenKind {
    if text.eq_ignore_ascii_case("and") {
        TokenKind::And
    } else if text.eq_ignore_ascii_case("or") {
        TokenKind::Or
    } else if text.eq_ignore_ascii_case("not") {
        TokenKind::Not
    } else if OPERATORS.contains(&text) {
        TokenKind::Operator
    } else {
        TokenKind::Identifier
    }
}

/// A date or number at the start of `input`.
///
/// A date must not run straight into more digits or a decimal point, so
/// `2010` is a date and `2010.5` a number.
fn numeric(input: &str) -> Option<(TokenKind, &str)> {
    let mut chars = input.chars();
    let first = chars.next()?;
    let starts_number = first.is_ascii_digit()
        || (matches!(first, '-' | '+') && chars.next().is_some_and(|c| c.is_ascii_digit()));
    if !starts_number {
        return None;
    }

    if first.is_ascii_digit() {
        if let Ok((rest, _)) = date_literal(input) {
            let boundary = rest
                .chars()
                .next()
                .map_or(true, |c| !(c.is_alphanumeric() || c == '.'));
            if boundary {
                let len = input.len() - rest.len();
                return Some((TokenKind::Date, &input[..len]));
            }
        }
    }

    let (_, text) = recognize_float::<&str, nom::error::Error<&str>>(input).ok()?;
    Some((TokenKind::Number, text))
}

/// Reads a quoted string starting at the opening quote.
///
/// Returns the unescaped contents and the byte length including both quotes.
fn quoted(input: &str, position: usize) -> SearchResult<(String, usize)> {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, q)) => q,
        None => return Err(SearchError::UnterminatedString { position }),
    };

    let mut text = String::new();
    while let Some((i, c)) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some((_, escaped)) => text.push(escaped),
                None => break,
            }
        } else if c == quote {
            return Ok((text, i + c.len_utf8()));
        } else {
            text.push(c);
        }
    }
    Err(SearchError::UnterminatedString { position })
}
