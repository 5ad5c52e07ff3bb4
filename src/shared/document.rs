//! GraphQL Document Scanner
//!
//! A deliberately small reader for the parts of a GraphQL document this crate
//! needs: the operation type, the operation name, and the response keys of the
//! top-level selection set (used to build the null skeleton returned for
//! mutations queued without an optimistic response).
//!
//! Full validation is the transport's job. Fragment spreads at the top level
//! are skipped because resolving them needs the fragment definitions.

use crate::shared::graphql::OperationType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Name(&'a str),
    Punct(char),
    Spread,
    Literal,
}

/// Operation type and name read from a document header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHeader {
    pub operation_type: OperationType,
    pub name: Option<String>,
}

fn tokenize(doc: &str) -> Vec<Token<'_>> {
    let bytes = doc.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b' ' | b'\t' | b'\n' | b'\r' | b',' => i += 1,
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'"' => {
                if bytes[i..].starts_with(b"\"\"\"") {
                    i += 3;
                    while i < bytes.len() && !bytes[i..].starts_with(b"\"\"\"") {
                        i += 1;
                    }
                    i = (i + 3).min(bytes.len());
                } else {
                    i += 1;
                    while i < bytes.len() && bytes[i] != b'"' {
                        if bytes[i] == b'\\' {
                            i += 1;
                        }
                        i += 1;
                    }
                    i = (i + 1).min(bytes.len());
                }
                tokens.push(Token::Literal);
            }
            b'.' if bytes[i..].starts_with(b"...") => {
                tokens.push(Token::Spread);
                i += 3;
            }
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => {
                let start = i;
                while i < bytes.len() && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric()) {
                    i += 1;
                }
                tokens.push(Token::Name(&doc[start..i]));
            }
            b'-' | b'0'..=b'9' => {
                i += 1;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.' || bytes[i] == b'-' || bytes[i] == b'+')
                {
                    i += 1;
                }
                tokens.push(Token::Literal);
            }
            _ => {
                // Non-ASCII characters only appear inside strings and comments in valid documents.
                match doc.get(i..).and_then(|rest| rest.chars().next()) {
                    Some(ch) => {
                        tokens.push(Token::Punct(ch));
                        i += ch.len_utf8();
                    }
                    None => i += 1,
                }
            }
        }
    }

    tokens
}

/// Index just past the group opened at `open` (which must hold `open_ch`)
fn skip_balanced(tokens: &[Token<'_>], open: usize, open_ch: char, close_ch: char) -> usize {
    let mut depth = 0usize;
    let mut i = open;
    while i < tokens.len() {
        match tokens[i] {
            Token::Punct(c) if c == open_ch => depth += 1,
            Token::Punct(c) if c == close_ch => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    tokens.len()
}

/// Skip `@name(args)` directives starting at `i`
fn skip_directives(tokens: &[Token<'_>], mut i: usize) -> usize {
    while tokens.get(i) == Some(&Token::Punct('@')) {
        i += 2;
        if tokens.get(i) == Some(&Token::Punct('(')) {
            i = skip_balanced(tokens, i, '(', ')');
        }
    }
    i
}

/// Locate the first operation definition, skipping fragment definitions
///
/// Returns the header and the index of the operation's opening `{`.
fn find_operation(tokens: &[Token<'_>]) -> Option<(OperationHeader, usize)> {
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            Token::Punct('{') => {
                let header = OperationHeader {
                    operation_type: OperationType::Query,
                    name: None,
                };
                return Some((header, i));
            }
            Token::Name("fragment") => {
                let open = tokens[i..].iter().position(|t| *t == Token::Punct('{'))? + i;
                i = skip_balanced(tokens, open, '{', '}');
            }
            Token::Name(keyword @ ("query" | "mutation" | "subscription")) => {
                let operation_type = match keyword {
                    "mutation" => OperationType::Mutation,
                    "subscription" => OperationType::Subscription,
                    _ => OperationType::Query,
                };
                i += 1;
                let name = match tokens.get(i) {
                    Some(Token::Name(name)) => {
                        i += 1;
                        Some((*name).to_string())
                    }
                    _ => None,
                };
                if tokens.get(i) == Some(&Token::Punct('(')) {
                    i = skip_balanced(tokens, i, '(', ')');
                }
                i = skip_directives(tokens, i);
                if tokens.get(i) != Some(&Token::Punct('{')) {
                    return None;
                }
                return Some((OperationHeader { operation_type, name }, i));
            }
            _ => i += 1,
        }
    }
    None
}

/// Read the operation type and name of the first operation in `doc`
///
/// Documents that cannot be read default to an anonymous query.
pub fn parse_header(doc: &str) -> OperationHeader {
    let tokens = tokenize(doc);
    find_operation(&tokens).map(|(header, _)| header).unwrap_or(OperationHeader {
        operation_type: OperationType::Query,
        name: None,
    })
}

/// Response keys (alias when present, field name otherwise) of the top-level selection set
pub fn top_level_fields(doc: &str) -> Vec<String> {
    let tokens = tokenize(doc);
    let Some((_, open)) = find_operation(&tokens) else {
        return Vec::new();
    };

    let mut fields = Vec::new();
    let mut i = open + 1;
    while i < tokens.len() {
        match tokens[i] {
            Token::Punct('}') => break,
            Token::Spread => {
                i += 1;
                match tokens.get(i) {
                    Some(Token::Name("on")) => i += 2,
                    Some(Token::Name(_)) => i += 1,
                    _ => {}
                }
                i = skip_directives(&tokens, i);
                if tokens.get(i) == Some(&Token::Punct('{')) {
                    i = skip_balanced(&tokens, i, '{', '}');
                }
            }
            Token::Name(name) => {
                let key = name;
                i += 1;
                if tokens.get(i) == Some(&Token::Punct(':')) {
                    // `alias: field`; the alias is the response key
                    i += 2;
                }
                if tokens.get(i) == Some(&Token::Punct('(')) {
                    i = skip_balanced(&tokens, i, '(', ')');
                }
                i = skip_directives(&tokens, i);
                if tokens.get(i) == Some(&Token::Punct('{')) {
                    i = skip_balanced(&tokens, i, '{', '}');
                }
                if !fields.iter().any(|f: &String| f == key) {
                    fields.push(key.to_string());
                }
            }
            _ => i += 1,
        }
    }

    fields
}
