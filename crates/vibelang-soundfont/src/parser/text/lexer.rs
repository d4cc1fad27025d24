//! Tokenizer for the text directive grammar.
//!
//! The grammar is line-agnostic: headers and `opcode=value` pairs may share a
//! line, and values may contain spaces (sample paths), so a value ends at the
//! next `name=`, header, comment or line end.
//!
//! ```text
//! // comment
//! #define $ROOT 60
//! <group> lovel=1 hivel=64
//! <region> sample=Grand Piano C4.wav key=$ROOT /* inline */
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
    character::complete::{char, multispace1, not_line_ending, space1},
    combinator::{map, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::error::ParseError;

/// A lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// `<name>`
    Header(&'a str),
    /// `name=value`
    Opcode { name: &'a str, value: &'a str },
    /// `#define $NAME value`
    Define { name: &'a str, value: &'a str },
    /// `#include "path"`
    Include(&'a str),
    /// Any other `#directive`, with the rest of its line.
    Directive(&'a str),
}

/// A token with the byte offset where it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned<'a> {
    pub token: Token<'a>,
    pub offset: usize,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn name(input: &str) -> IResult<&str, &str> {
    take_while1(is_name_char)(input)
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("//"), not_line_ending))(input)
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    recognize(tuple((tag("/*"), take_until("*/"), tag("*/"))))(input)
}

fn trivia(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((multispace1, line_comment, block_comment))))(input)
}

fn header(input: &str) -> IResult<&str, Token<'_>> {
    map(delimited(char('<'), name, char('>')), Token::Header)(input)
}

fn strip_trailing_comment(value: &str) -> &str {
    value.split("//").next().unwrap_or(value).trim()
}

fn define(input: &str) -> IResult<&str, Token<'_>> {
    map(
        preceded(
            pair(tag("#define"), space1),
            pair(
                recognize(pair(char('$'), name)),
                preceded(space1, not_line_ending),
            ),
        ),
        |(name, value): (&str, &str)| Token::Define {
            name,
            value: strip_trailing_comment(value),
        },
    )(input)
}

fn include(input: &str) -> IResult<&str, Token<'_>> {
    map(
        preceded(
            pair(tag("#include"), space1),
            delimited(char('"'), take_until("\""), char('"')),
        ),
        Token::Include,
    )(input)
}

fn directive(input: &str) -> IResult<&str, Token<'_>> {
    map(recognize(pair(char('#'), not_line_ending)), |line: &str| {
        Token::Directive(line.trim_end())
    })(input)
}

fn starts_opcode(input: &str) -> bool {
    preceded(space1, terminated(name, char('=')))(input).is_ok()
}

/// Byte index of the whitespace that precedes the next `name=` in a segment.
fn next_opcode_start(segment: &str) -> Option<usize> {
    segment
        .char_indices()
        .filter(|(_, c)| c.is_whitespace())
        .map(|(i, _)| i)
        .find(|&i| starts_opcode(&segment[i..]))
}

fn opcode_value(input: &str) -> IResult<&str, &str> {
    let line_end = input.find(|c: char| c == '\n' || c == '\r').unwrap_or(input.len());
    let line = &input[..line_end];

    let mut end = line.len();
    for marker in ["//", "/*", "<"] {
        if let Some(pos) = line[..end].find(marker) {
            end = pos;
        }
    }
    if let Some(pos) = next_opcode_start(&line[..end]) {
        end = pos;
    }

    Ok((&input[end..], line[..end].trim()))
}

fn opcode(input: &str) -> IResult<&str, Token<'_>> {
    map(
        pair(terminated(name, char('=')), opcode_value),
        |(name, value)| Token::Opcode { name, value },
    )(input)
}

fn token(input: &str) -> IResult<&str, Token<'_>> {
    alt((header, define, include, directive, opcode))(input)
}

/// Split text into tokens.
///
/// Fails with `Truncated` on an unterminated block comment and with
/// `MalformedChunk` on input that is not a header, directive or opcode.
pub fn tokenize(input: &str) -> Result<Vec<Spanned<'_>>, ParseError> {
    let mut tokens = Vec::new();
    let mut rest = input;

    loop {
        if let Ok((remaining, ())) = trivia(rest) {
            rest = remaining;
        }
        if rest.is_empty() {
            break;
        }

        let offset = input.len() - rest.len();
        if rest.starts_with("/*") {
            return Err(ParseError::truncated(offset, "unterminated block comment"));
        }

        match token(rest) {
            Ok((remaining, token)) => {
                tokens.push(Spanned { token, offset });
                rest = remaining;
            }
            Err(_) => {
                let snippet: String = rest.chars().take_while(|c| *c != '\n').take(32).collect();
                return Err(ParseError::malformed(
                    offset,
                    format!("unexpected input '{}'", snippet.trim_end()),
                ));
            }
        }
    }

    Ok(tokens)
}
