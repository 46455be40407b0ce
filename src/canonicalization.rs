//! Body and header canonicalization per RFC 6376 section 3.4.
//!
//! The stream is assumed to be CRLF-normalized already (see
//! [`crate::normalize`]); every function here works on whole byte slices.

use once_cell::sync::Lazy;
use regex::bytes::Regex;

/// Canonicalization algorithm named in the `c=` tag.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Type {
    Simple,
    Relaxed,
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Relaxed => write!(f, "relaxed"),
        }
    }
}

impl Type {
    pub(crate) fn from_token(token: &str) -> Option<Type> {
        match token {
            "simple" => Some(Type::Simple),
            "relaxed" => Some(Type::Relaxed),
            _ => None,
        }
    }
}

static WSP_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\t \r\n]+").unwrap());
static HEADER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([[:graph:]]+)[[:space:]]*:[[:space:]]*").unwrap());

/// Simple body canonicalization (RFC 6376 section 3.4.3): the body is kept
/// verbatim except that trailing empty lines collapse, and an empty body
/// canonicalizes to a single CRLF.
pub fn canonicalize_body_simple(body: &[u8]) -> Vec<u8> {
    if body.is_empty() {
        return b"\r\n".to_vec();
    }
    let mut out = body.to_vec();
    while out.ends_with(b"\r\n\r\n") {
        out.truncate(out.len() - 2);
    }
    out
}

/// Relaxed body canonicalization (RFC 6376 section 3.4.4): per line, WSP runs
/// collapse to a single space and trailing WSP is removed; trailing empty
/// lines are dropped and a non-empty result ends with exactly one CRLF.
pub fn canonicalize_body_relaxed(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    for line in lines(body) {
        let line = WSP_RUNS.replace_all(line, &b" "[..]);
        let mut line: &[u8] = &line;
        while let Some((&last, rest)) = line.split_last() {
            if last == b' ' || last == b'\t' {
                line = rest;
            } else {
                break;
            }
        }
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }
    while out.ends_with(b"\r\n") {
        out.truncate(out.len() - 2);
    }
    if !out.is_empty() {
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Rewrites a whole raw header field (name, colon, value, continuation lines)
/// into its relaxed form: WSP runs collapse to one space, the name is
/// lower-cased, there is no whitespace around the colon and the field ends in
/// a single CRLF.
pub(crate) fn relax_header_field(raw: &[u8]) -> Vec<u8> {
    let conv = WSP_RUNS.replace_all(raw, &b" "[..]);
    let caps = match HEADER_NAME.captures(&conv) {
        Some(caps) => caps,
        None => return conv.into_owned(),
    };
    let name = caps.get(1).unwrap().as_bytes().to_ascii_lowercase();
    let value = &conv[caps.get(0).unwrap().end()..];
    let value = trim_wsp(value);
    let mut out = Vec::with_capacity(name.len() + 1 + value.len() + 2);
    out.extend_from_slice(&name);
    out.push(b':');
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\n");
    out
}

fn trim_wsp(mut bytes: &[u8]) -> &[u8] {
    while let Some((&first, rest)) = bytes.split_first() {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    while let Some((&last, rest)) = bytes.split_last() {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

// Iterates CRLF-terminated lines without their terminators. A trailing
// partial line still counts as a line; a trailing CRLF does not produce an
// empty one.
fn lines(body: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = body;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        match rest.windows(2).position(|w| w == b"\r\n") {
            Some(idx) => {
                let line = &rest[..idx];
                rest = &rest[idx + 2..];
                Some(line)
            }
            None => {
                let line = rest;
                rest = &rest[rest.len()..];
                Some(line)
            }
        }
    })
}
