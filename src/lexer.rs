//! Splits the raw request into decoded path segments and query pairs.
//!
//! Splitting happens on the undecoded text (`/` between segments, `&` between
//! options, the first `=` inside an option) and every piece is then
//! percent-decoded exactly once.

use nom::{
    bytes::complete::take_till,
    character::complete::char as pchar,
    combinator::all_consuming,
    error::{Error, ErrorKind},
    multi::many0,
    sequence::{delimited, pair},
    IResult,
};
use percent_encoding::percent_decode_str;
use tracing::trace;

use crate::error::SyntaxError;

/// Output of [`tokenize`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tokens {
    pub segments: Vec<String>,
    pub trailing_slash: bool,
    pub options: Vec<QueryPair>,
}

/// One `name=value` pair of the query string, decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryPair {
    pub name: String,
    pub value: String,
}

/// A path segment split into its name and the contents of each trailing
/// parenthesized group: `Fn(p=1)(5)` is `Fn` with groups `p=1` and `5`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment<'a> {
    pub name: &'a str,
    pub groups: Vec<&'a str>,
}

pub fn tokenize(path: &str, query: &str) -> Result<Tokens, SyntaxError> {
    let (segments, trailing_slash) = split_path(path)?;
    let options = split_query(query)?;
    trace!(segments = segments.len(), options = options.len(), "tokenized");
    Ok(Tokens {
        segments,
        trailing_slash,
        options,
    })
}

/// Splits the path at `/` and decodes each segment. An empty final segment is
/// a trailing slash; any other empty segment is an error.
pub fn split_path(path: &str) -> Result<(Vec<String>, bool), SyntaxError> {
    let (body, base) = match path.strip_prefix('/') {
        Some(rest) => (rest, 1),
        None => (path, 0),
    };
    if body.is_empty() {
        return Ok((Vec::new(), false));
    }
    check_characters(body, base, is_forbidden_in_path)?;

    let raw: Vec<&str> = body.split('/').collect();
    let mut trailing_slash = false;
    let mut segments = Vec::with_capacity(raw.len());
    let mut offset = base;
    for (position, segment) in raw.iter().enumerate() {
        if segment.is_empty() {
            if position + 1 == raw.len() && position > 0 {
                trailing_slash = true;
                continue;
            }
            return Err(SyntaxError::EmptySegment { position });
        }
        segments.push(decode(segment, offset)?);
        offset += segment.len() + 1;
    }
    Ok((segments, trailing_slash))
}

/// Splits the query at `&` and each option at its first `=`, preserving order
/// and duplicates. Empty pieces (`a=1&&b=2`) are skipped.
pub fn split_query(query: &str) -> Result<Vec<QueryPair>, SyntaxError> {
    let (body, base) = match query.strip_prefix('?') {
        Some(rest) => (rest, 1),
        None => (query, 0),
    };
    check_characters(body, base, is_forbidden_in_query)?;

    let mut pairs = Vec::new();
    let mut offset = base;
    for piece in body.split('&') {
        let start = offset;
        offset += piece.len() + 1;
        if piece.is_empty() {
            continue;
        }
        let (name, value) = match piece.find('=') {
            Some(idx) => (&piece[..idx], &piece[idx + 1..]),
            None => (piece, ""),
        };
        let name = decode(name, start)?;
        if name.is_empty() {
            return Err(SyntaxError::MalformedQueryOption {
                text: piece.to_string(),
            });
        }
        let value = decode(value, start + piece.len() - value.len())?;
        pairs.push(QueryPair { name, value });
    }
    Ok(pairs)
}

fn is_forbidden_in_path(c: char) -> bool {
    c.is_control()
        || !c.is_ascii()
        || matches!(
            c,
            ' ' | '"' | '#' | '<' | '>' | '?' | '[' | '\\' | ']' | '^' | '`' | '{' | '|' | '}'
        )
}

// JSON alias values and search phrases put brackets, braces and double quotes
// into the query, so only the remaining unsafe characters are rejected there.
fn is_forbidden_in_query(c: char) -> bool {
    c.is_control() || !c.is_ascii() || matches!(c, ' ' | '#' | '<' | '>' | '\\' | '^' | '`' | '|')
}

fn check_characters(text: &str, base: usize, forbidden: fn(char) -> bool) -> Result<(), SyntaxError> {
    if let Some((idx, ch)) = text.char_indices().find(|(_, c)| forbidden(*c)) {
        return Err(SyntaxError::ForbiddenCharacter {
            ch,
            offset: base + idx,
        });
    }
    Ok(())
}

/// Percent-decodes `text` once. `offset` is the position of `text` in the
/// original input, for error reporting.
pub fn decode(text: &str, offset: usize) -> Result<String, SyntaxError> {
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'%' {
            let valid = bytes.len() > idx + 2
                && bytes[idx + 1].is_ascii_hexdigit()
                && bytes[idx + 2].is_ascii_hexdigit();
            if !valid {
                let end = (idx + 3).min(bytes.len());
                return Err(SyntaxError::MalformedPercentEncoding {
                    text: String::from_utf8_lossy(&bytes[idx..end]).into_owned(),
                    offset: offset + idx,
                });
            }
            idx += 3;
        } else {
            idx += 1;
        }
    }
    percent_decode_str(text)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| SyntaxError::InvalidUtf8 {
            text: text.to_string(),
        })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

/// Tracks string literals and parenthesis depth while scanning expression
/// text. Single-quoted strings escape with `''`, double-quoted ones with `\`.
struct Scanner {
    quote: Quote,
    escaped: bool,
    depth: usize,
}

impl Scanner {
    fn new() -> Self {
        Scanner {
            quote: Quote::None,
            escaped: false,
            depth: 0,
        }
    }

    /// Feeds one character; returns true when it is outside any string and
    /// any parentheses opened during the scan.
    fn top_level(&mut self, c: char) -> bool {
        match self.quote {
            Quote::Single => {
                if c == '\'' {
                    self.quote = Quote::None;
                }
                false
            }
            Quote::Double => {
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == '"' {
                    self.quote = Quote::None;
                }
                false
            }
            Quote::None => match c {
                '\'' => {
                    self.quote = Quote::Single;
                    false
                }
                '"' => {
                    self.quote = Quote::Double;
                    false
                }
                '(' | '[' | '{' => {
                    self.depth += 1;
                    false
                }
                ')' | ']' | '}' => {
                    self.depth = self.depth.saturating_sub(1);
                    false
                }
                _ => self.depth == 0,
            },
        }
    }

    fn balanced(&self) -> bool {
        self.quote == Quote::None && self.depth == 0
    }
}

/// Splits `text` at every `sep` outside string literals and brackets.
pub fn split_top_level(text: &str, sep: char) -> Result<Vec<&str>, SyntaxError> {
    let mut scanner = Scanner::new();
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, c) in text.char_indices() {
        if c == sep && scanner.top_level(c) {
            pieces.push(&text[start..idx]);
            start = idx + c.len_utf8();
        } else if c != sep {
            scanner.top_level(c);
        }
    }
    if !scanner.balanced() {
        return Err(SyntaxError::Unbalanced {
            text: text.to_string(),
        });
    }
    pieces.push(&text[start..]);
    Ok(pieces)
}

/// Position of the first `ch` outside string literals and brackets.
pub fn find_top_level(text: &str, ch: char) -> Option<usize> {
    let mut scanner = Scanner::new();
    text.char_indices()
        .find(|(_, c)| scanner.top_level(*c) && *c == ch)
        .map(|(idx, _)| idx)
}

// Contents of a parenthesized group, up to the matching `)`.
fn balanced(input: &str) -> IResult<&str, &str> {
    let mut scanner = Scanner::new();
    for (idx, c) in input.char_indices() {
        if c == ')' && scanner.balanced() {
            return Ok((&input[idx..], &input[..idx]));
        }
        scanner.top_level(c);
    }
    Err(nom::Err::Error(Error::new(input, ErrorKind::Char)))
}

//* group = "(" balanced ")"
fn group(input: &str) -> IResult<&str, &str> {
    delimited(pchar('('), balanced, pchar(')'))(input)
}

//* segment = name *group
fn segment_syntax(input: &str) -> IResult<&str, (&str, Vec<&str>)> {
    all_consuming(pair(take_till(|c| c == '(' || c == ')'), many0(group)))(input)
}

/// Splits a decoded path segment into name and parenthesized groups.
pub fn segment(text: &str) -> Result<Segment<'_>, SyntaxError> {
    match segment_syntax(text) {
        Ok((_, (name, groups))) if !name.is_empty() => Ok(Segment { name, groups }),
        _ => {
            let mut scanner = Scanner::new();
            text.chars().for_each(|c| {
                scanner.top_level(c);
            });
            let opens = text.chars().filter(|c| *c == '(').count();
            let closes = text.chars().filter(|c| *c == ')').count();
            if !scanner.balanced() || opens != closes {
                Err(SyntaxError::Unbalanced {
                    text: text.to_string(),
                })
            } else {
                Err(SyntaxError::MalformedSegment {
                    segment: text.to_string(),
                })
            }
        }
    }
}
