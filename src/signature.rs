//! The `DKIM-Signature` header: structured record, parser and renderer.

use base64::engine::general_purpose;
use base64::Engine;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::canonicalization::Type;
use crate::errors::DKIMError;
use crate::parser::{tag_list, Tag};

/// Field name of the signature header.
pub const HEADER: &str = "DKIM-Signature";

const REQUIRED_TAGS: &[&str] = &["v", "a", "d", "s", "h", "bh", "b"];

static B_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?-u)b=[^;]*").unwrap());

/// Structured form of a `DKIM-Signature` header.
///
/// Built either by [`Signature::parse`] when verifying or by
/// [`Signature::new`] when signing; `body_hash` and `signature` are filled in
/// by the core as the pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub version: u32,
    /// Algorithm name as written in `a=`; resolved against
    /// [`crate::Algorithm`] when the record is used.
    pub algorithm: String,
    pub header_canon: Type,
    pub body_canon: Type,
    pub domain: String,
    pub selector: String,
    /// Header names to cover, in `h=` order.
    pub headers: Vec<String>,
    /// Base64 body hash (`bh=`), whitespace already stripped.
    pub body_hash: String,
    /// Base64 signature (`b=`), whitespace already stripped.
    pub signature: String,
    /// Tags this implementation does not interpret, in wire order.
    pub extra_tags: IndexMap<String, String>,
}

impl Signature {
    /// Builds a signature record for signing. `canon` accepts the four
    /// explicit `header/body` combinations as well as the single-token
    /// spellings (`"simple"`, `"relaxed"`, and `""` meaning
    /// `relaxed/relaxed`).
    pub fn new(
        canon: &str,
        selector: &str,
        algorithm: &str,
        domain: &str,
        headers: Vec<String>,
    ) -> Result<Self, DKIMError> {
        let (header_canon, body_canon) = match canon {
            "simple" | "simple/simple" => (Type::Simple, Type::Simple),
            "relaxed" | "relaxed/relaxed" | "" => (Type::Relaxed, Type::Relaxed),
            "simple/relaxed" => (Type::Simple, Type::Relaxed),
            "relaxed/simple" => (Type::Relaxed, Type::Simple),
            other => return Err(DKIMError::BadCanonicalization(other.to_owned())),
        };
        Ok(Signature {
            version: 1,
            algorithm: algorithm.to_owned(),
            header_canon,
            body_canon,
            domain: domain.to_owned(),
            selector: selector.to_owned(),
            headers,
            body_hash: String::new(),
            signature: String::new(),
            extra_tags: IndexMap::new(),
        })
    }

    /// Parses a raw `DKIM-Signature` header (name included) into a record.
    ///
    /// Whitespace is stripped inside `bh=`, `b=` and `h=` before they are
    /// stored. Unknown tags are preserved. An empty `b=` is accepted here;
    /// rejecting it is the verifier's call.
    pub fn parse(header: &[u8]) -> Result<Self, DKIMError> {
        let header = String::from_utf8_lossy(header);
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| DKIMError::SignatureSyntaxError("missing colon in header".to_owned()))?;
        if !name.trim().eq_ignore_ascii_case(HEADER) {
            return Err(DKIMError::SignatureSyntaxError(format!(
                "not a {} header: {}",
                HEADER,
                name.trim()
            )));
        }
        let (_, tags) =
            tag_list(value).map_err(|err| DKIMError::SignatureSyntaxError(err.to_string()))?;

        for required in REQUIRED_TAGS {
            if !tags.iter().any(|t| t.name == *required) {
                return Err(DKIMError::SignatureMissingRequiredTag(required));
            }
        }

        let mut sig = Signature {
            version: 0,
            algorithm: String::new(),
            header_canon: Type::Simple,
            body_canon: Type::Simple,
            domain: String::new(),
            selector: String::new(),
            headers: Vec::new(),
            body_hash: String::new(),
            signature: String::new(),
            extra_tags: IndexMap::new(),
        };
        for Tag { name, value } in tags {
            match name.as_str() {
                "v" => {
                    sig.version = value.parse().map_err(|_| {
                        DKIMError::SignatureSyntaxError(format!("invalid v= tag: {}", value))
                    })?;
                }
                "a" => sig.algorithm = value,
                "c" => {
                    let (header_canon, body_canon) = parse_canonicalization(Some(&value))?;
                    sig.header_canon = header_canon;
                    sig.body_canon = body_canon;
                }
                "d" => sig.domain = value,
                "s" => sig.selector = value,
                "h" => {
                    sig.headers = strip_whitespace(&value)
                        .split(':')
                        .map(|h| h.to_owned())
                        .collect();
                }
                "bh" => sig.body_hash = strip_whitespace(&value),
                "b" => sig.signature = strip_whitespace(&value),
                _ => {
                    sig.extra_tags.insert(name, value);
                }
            }
        }
        if sig.version != 1 {
            return Err(DKIMError::IncompatibleVersion);
        }
        Ok(sig)
    }

    /// Base64-decodes the `b=` tag.
    pub fn signature_bytes(&self) -> Result<Vec<u8>, DKIMError> {
        general_purpose::STANDARD
            .decode(&self.signature)
            .map_err(|err| {
                DKIMError::SignatureSyntaxError(format!("failed to decode signature: {}", err))
            })
    }
}

/// Rendering order is fixed: `v; a; c; d; s; h; bh; b`. Empty fields drop out
/// along with their separators, except `b=`, which is always emitted so the
/// signer can hash the header with the value blanked.
impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: v={}", HEADER, self.version)?;
        if !self.algorithm.is_empty() {
            write!(f, "; a={}", self.algorithm)?;
        }
        write!(f, "; c={}/{}", self.header_canon, self.body_canon)?;
        if !self.domain.is_empty() {
            write!(f, "; d={}", self.domain)?;
        }
        if !self.selector.is_empty() {
            write!(f, "; s={}", self.selector)?;
        }
        if !self.headers.is_empty() {
            write!(f, "; h={}", self.headers.join(":"))?;
        }
        if !self.body_hash.is_empty() {
            write!(f, "; bh={}", self.body_hash)?;
        }
        write!(f, "; b={}", self.signature)
    }
}

/// Expands a `c=` tag per RFC 6376 section 3.5: absent means
/// `simple/simple`; a single token names the header canonicalization and the
/// body defaults to `simple`.
pub(crate) fn parse_canonicalization(value: Option<&str>) -> Result<(Type, Type), DKIMError> {
    let value = match value {
        None => return Ok((Type::Simple, Type::Simple)),
        Some(value) => value,
    };
    let bad = || DKIMError::BadCanonicalization(value.to_owned());
    match value.split_once('/') {
        Some((header, body)) => Ok((
            Type::from_token(header).ok_or_else(bad)?,
            Type::from_token(body).ok_or_else(bad)?,
        )),
        None => Ok((Type::from_token(value).ok_or_else(bad)?, Type::Simple)),
    }
}

/// Blanks the `b=` value inside a canonicalized signature line, leaving the
/// tag and its `=` in place. The bounded match stops at the tag separator so
/// a following tag is never consumed.
pub(crate) fn blank_signature_tag(header: &[u8]) -> Vec<u8> {
    B_TAG.replace_all(header, &b"b="[..]).into_owned()
}

fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_ascii_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GMAIL_HEADER: &str = "DKIM-Signature: v=1; a=rsa-sha256; c=relaxed/relaxed;\r
\td=gmail.com; s=20120113;\r
\th=mime-version:date:message-id:subject:from:to:content-type;\r
\tbh=dR8juwuev4e6Fvx8i83p3bEGBvVNoqjMODydu5jBO3w=;\r
\tb=JCDj28y8XYsO966hVa5ZEuWjfJE/X8+taTThyL2oSn+2ia76pc8sifMt1vJYqI6Pq/\r
\t sy0gpVqrnB5DVOZjG2mkRpE+wnQTgChTFNBwGdlV1aMNIjvNzhRU4kEyAd9e4G7XzENP\r
\t yH2tE9JFrap10ic5zb1WP4nl3ZPu8xg9+wuHg8GarD3cbmFhjJQgRf2bZ4yJA6NTgtTV\r
\t +vt8AZYGV6+Ar6OQ+Jhhmto/fI3ISLyWiorfg/brJLhDdo68h88Hs/KME2Kzqm5yN5it\r
\t rggEx7csYBYRQDDu9b8TdXU6Y5gSa4qHrDQtGmXpAFzeH/+N21pWnL6jdHZy5d70NvAA\r
\t MJ3A==";

    #[test]
    fn test_parse_gmail_signature() {
        let sig = Signature::parse(GMAIL_HEADER.as_bytes()).unwrap();
        assert_eq!(sig.version, 1);
        assert_eq!(sig.algorithm, "rsa-sha256");
        assert_eq!(sig.header_canon, Type::Relaxed);
        assert_eq!(sig.body_canon, Type::Relaxed);
        assert_eq!(sig.domain, "gmail.com");
        assert_eq!(sig.selector, "20120113");
        assert_eq!(
            sig.headers,
            vec![
                "mime-version",
                "date",
                "message-id",
                "subject",
                "from",
                "to",
                "content-type"
            ]
        );
        assert_eq!(sig.body_hash, "dR8juwuev4e6Fvx8i83p3bEGBvVNoqjMODydu5jBO3w=");
        assert_eq!(
            sig.signature,
            "JCDj28y8XYsO966hVa5ZEuWjfJE/X8+taTThyL2oSn+2ia76pc8sifMt1vJYqI6Pq/\
             sy0gpVqrnB5DVOZjG2mkRpE+wnQTgChTFNBwGdlV1aMNIjvNzhRU4kEyAd9e4G7XzENP\
             yH2tE9JFrap10ic5zb1WP4nl3ZPu8xg9+wuHg8GarD3cbmFhjJQgRf2bZ4yJA6NTgtTV\
             +vt8AZYGV6+Ar6OQ+Jhhmto/fI3ISLyWiorfg/brJLhDdo68h88Hs/KME2Kzqm5yN5it\
             rggEx7csYBYRQDDu9b8TdXU6Y5gSa4qHrDQtGmXpAFzeH/+N21pWnL6jdHZy5d70NvAA\
             MJ3A=="
        );
    }

    #[test]
    fn test_parse_requires_dkim_signature_name() {
        assert!(Signature::parse(b"Subject: hello\r\n").is_err());
    }

    #[test]
    fn test_parse_missing_required_tag() {
        let err =
            Signature::parse(b"DKIM-Signature: v=1; a=rsa-sha256; bh=a; b=b").unwrap_err();
        assert!(matches!(err, DKIMError::SignatureMissingRequiredTag("d")));
    }

    #[test]
    fn test_parse_rejects_other_versions() {
        let err = Signature::parse(
            b"DKIM-Signature: v=3; a=rsa-sha256; d=example.net; s=x; h=from; bh=a; b=b",
        )
        .unwrap_err();
        assert!(matches!(err, DKIMError::IncompatibleVersion));
    }

    #[test]
    fn test_parse_tolerates_empty_b() {
        let sig = Signature::parse(
            b"DKIM-Signature: v=1; a=rsa-sha256; d=example.net; s=x; h=from; bh=a; b=",
        )
        .unwrap();
        assert_eq!(sig.signature, "");
    }

    #[test]
    fn test_parse_preserves_unknown_tags() {
        let sig = Signature::parse(
            b"DKIM-Signature: v=1; a=rsa-sha256; d=example.net; s=x; h=from; t=1; i=@example.net; bh=a; b=b",
        )
        .unwrap();
        assert_eq!(sig.extra_tags.get("t").map(String::as_str), Some("1"));
        assert_eq!(
            sig.extra_tags.get("i").map(String::as_str),
            Some("@example.net")
        );
    }

    #[test]
    fn test_canonicalization_expansion() {
        assert_eq!(
            parse_canonicalization(None).unwrap(),
            (Type::Simple, Type::Simple)
        );
        assert_eq!(
            parse_canonicalization(Some("relaxed")).unwrap(),
            (Type::Relaxed, Type::Simple)
        );
        assert_eq!(
            parse_canonicalization(Some("simple/relaxed")).unwrap(),
            (Type::Simple, Type::Relaxed)
        );
        assert!(parse_canonicalization(Some("strict")).is_err());
    }

    #[test]
    fn test_render_order_and_empty_b() {
        let sig = Signature::new(
            "relaxed/simple",
            "foo",
            "rsa-sha256",
            "example.com",
            vec!["From".to_owned(), "Subject".to_owned()],
        )
        .unwrap();
        assert_eq!(
            sig.to_string(),
            "DKIM-Signature: v=1; a=rsa-sha256; c=relaxed/simple; d=example.com; s=foo; h=From:Subject; b="
        );
    }

    #[test]
    fn test_render_parse_roundtrip() {
        let mut sig = Signature::new(
            "relaxed/relaxed",
            "foo",
            "rsa-sha256",
            "example.com",
            vec!["From".to_owned(), "To".to_owned()],
        )
        .unwrap();
        sig.body_hash = "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=".to_owned();
        sig.signature = "c2lnbmF0dXJl".to_owned();
        let reparsed = Signature::parse(sig.to_string().as_bytes()).unwrap();
        assert_eq!(reparsed, sig);
    }

    #[test]
    fn test_blank_signature_tag() {
        assert_eq!(
            blank_signature_tag(b"dkim-signature:v=1; b=abc/def+123; bh=xyz"),
            b"dkim-signature:v=1; b=; bh=xyz"
        );
        assert_eq!(
            blank_signature_tag(b"dkim-signature:v=1; bh=xyz; b=abc"),
            b"dkim-signature:v=1; bh=xyz; b="
        );
        // An already blank tag stays put.
        assert_eq!(
            blank_signature_tag(b"dkim-signature:v=1; b="),
            b"dkim-signature:v=1; b="
        );
    }
}
