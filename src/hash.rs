//! The shared half of signing and verification: header collection, body
//! hashing and assembly of the signed-header block
//! (RFC 6376 sections 3.7 and 5.4/6.1).

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Seek, SeekFrom};

use base64::engine::general_purpose;
use base64::Engine;
use slog::debug;

use crate::algorithms::Algorithm;
use crate::canonicalization::{
    canonicalize_body_relaxed, canonicalize_body_simple, relax_header_field, Type,
};
use crate::errors::DKIMError;
use crate::header::{next_header, HeaderField};
use crate::signature::Signature;

const SIGNATURE_NAME: &str = "dkim-signature";

/// What [`signature_base`] leaves behind: the resolved signature record, the
/// concatenated canonical covered headers, and the canonical
/// `DKIM-Signature` line itself (trailing CRLFs stripped, `b=` not yet
/// blanked).
#[derive(Debug)]
pub(crate) struct SignatureBase {
    pub signature: Signature,
    pub header_block: Vec<u8>,
    pub signature_header: Vec<u8>,
}

/// Runs the preparation steps shared by signing and verification over a
/// CRLF-normalized seekable stream.
///
/// When `supplied` is `Some` (signing) the record receives the computed body
/// hash and its rendering joins the header lists; when `None` (verifying)
/// the record is parsed out of the message and the recomputed body hash must
/// match its `bh=`.
pub(crate) fn signature_base<R: Read + Seek>(
    r: &mut R,
    logger: &slog::Logger,
    supplied: Option<Signature>,
) -> Result<SignatureBase, DKIMError> {
    r.seek(SeekFrom::Start(0))?;

    // Each name maps to its fields in newest-first order: every field read is
    // pushed to the front, and the h= consumption below pops fronts. That
    // LIFO order is what covers repeated headers bottom-up as RFC 6376
    // section 5.4.2 requires.
    let mut headers: HashMap<String, VecDeque<HeaderField>> = HashMap::new();
    let signing = supplied.is_some();
    let mut parsed: Option<Signature> = None;
    while let Some(field) = next_header(r)? {
        let name = String::from_utf8_lossy(field.name()).into_owned();
        if name == SIGNATURE_NAME && !signing {
            // A later signature header replaces an earlier one; a malformed
            // one clears it, like the source message carrying no signature.
            parsed = Signature::parse(&field.raw).ok();
        }
        headers.entry(name).or_default().push_front(field);
    }

    let mut signature = match supplied {
        Some(signature) => signature,
        None => parsed.ok_or(DKIMError::NoSignature)?,
    };
    let algorithm = Algorithm::from_name(&signature.algorithm)
        .ok_or_else(|| DKIMError::UnknownAlgorithm(signature.algorithm.clone()))?;

    let mut body = Vec::new();
    r.read_to_end(&mut body)?;
    let canonical_body = match signature.body_canon {
        Type::Simple => canonicalize_body_simple(&body),
        Type::Relaxed => canonicalize_body_relaxed(&body),
    };
    let body_hash = general_purpose::STANDARD.encode(algorithm.digest(&canonical_body));
    debug!(logger, "computed body hash"; "bh" => %body_hash);

    if signing {
        signature.body_hash = body_hash;
        let raw = signature.to_string().into_bytes();
        let relaxed = relax_header_field(&raw);
        headers
            .entry(SIGNATURE_NAME.to_owned())
            .or_default()
            .push_front(HeaderField { raw, relaxed });
    } else if signature.body_hash != body_hash {
        return Err(DKIMError::BodyHashDidNotVerify);
    }

    let mut header_block = Vec::new();
    for name in &signature.headers {
        let name = name.to_lowercase();
        if let Some(list) = headers.get_mut(&name) {
            if let Some(field) = list.pop_front() {
                header_block.extend_from_slice(match signature.header_canon {
                    Type::Simple => &field.raw,
                    Type::Relaxed => &field.relaxed,
                });
            }
        }
    }

    let front = headers
        .get(SIGNATURE_NAME)
        .and_then(|list| list.front())
        .ok_or(DKIMError::NoSignature)?;
    let mut signature_header = match signature.header_canon {
        Type::Simple => front.raw.clone(),
        Type::Relaxed => front.relaxed.clone(),
    };
    while matches!(signature_header.last(), Some(b'\r') | Some(b'\n')) {
        signature_header.pop();
    }

    Ok(SignatureBase {
        signature,
        header_block,
        signature_header,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn discard_logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn crlf(input: &str) -> Cursor<Vec<u8>> {
        Cursor::new(input.replace('\n', "\r\n").into_bytes())
    }

    #[test]
    fn test_signing_base_covers_headers_in_order() {
        let mut message = crlf(
            "From: Test <test@example.com>\nDate: Wed Jan 24 16:35:04 EST 2018\nSubject: I am a test\nTo: Test2 <test2@example.com>\nX-Something: not covered\n\nThis is a test message\n",
        );
        let signature = Signature::new(
            "relaxed/relaxed",
            "foo",
            "rsa-sha256",
            "example.com",
            vec![
                "From".to_owned(),
                "Date".to_owned(),
                "Subject".to_owned(),
                "To".to_owned(),
            ],
        )
        .unwrap();
        let base = signature_base(&mut message, &discard_logger(), Some(signature)).unwrap();

        let block = String::from_utf8(base.header_block).unwrap();
        assert_eq!(
            block,
            "from:Test <test@example.com>\r\ndate:Wed Jan 24 16:35:04 EST 2018\r\nsubject:I am a test\r\nto:Test2 <test2@example.com>\r\n"
        );
        assert!(!base.signature.body_hash.is_empty());
        let sig_header = String::from_utf8(base.signature_header).unwrap();
        assert!(sig_header.starts_with("dkim-signature:v=1;"));
        assert!(!sig_header.ends_with('\n'));
    }

    #[test]
    fn test_empty_body_hash_sha256() {
        let mut message = crlf("From: a@example.com\nSubject: empty\n\n");
        let signature = Signature::new(
            "relaxed/relaxed",
            "sel",
            "rsa-sha256",
            "example.com",
            vec!["From".to_owned()],
        )
        .unwrap();
        let base = signature_base(&mut message, &discard_logger(), Some(signature)).unwrap();
        // SHA-256 of the empty canonical body.
        assert_eq!(
            base.signature.body_hash,
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn test_repeated_headers_consumed_bottom_up() {
        let mut message = crlf("From: first\nFrom: second\nSubject: s\n\nbody\n");
        let signature = Signature::new(
            "relaxed/relaxed",
            "sel",
            "rsa-sha256",
            "example.com",
            vec!["From".to_owned(), "From".to_owned()],
        )
        .unwrap();
        let base = signature_base(&mut message, &discard_logger(), Some(signature)).unwrap();
        let block = String::from_utf8(base.header_block).unwrap();
        // Bottom-most instance first, then the one above it.
        assert_eq!(block, "from:second\r\nfrom:first\r\n");
    }

    #[test]
    fn test_missing_header_contributes_nothing() {
        let mut message = crlf("From: a\n\nbody\n");
        let signature = Signature::new(
            "relaxed/relaxed",
            "sel",
            "rsa-sha256",
            "example.com",
            vec!["From".to_owned(), "To".to_owned(), "From".to_owned()],
        )
        .unwrap();
        let base = signature_base(&mut message, &discard_logger(), Some(signature)).unwrap();
        assert_eq!(String::from_utf8(base.header_block).unwrap(), "from:a\r\n");
    }

    #[test]
    fn test_verify_base_requires_signature() {
        let mut message = crlf("From: a\n\nbody\n");
        let err = signature_base(&mut message, &discard_logger(), None).unwrap_err();
        assert!(matches!(err, DKIMError::NoSignature));
    }

    #[test]
    fn test_verify_base_rejects_unknown_algorithm() {
        let mut message = crlf(
            "DKIM-Signature: v=1; a=rsa-md5; d=example.com; s=x; h=from; bh=aGFzaA==; b=c2ln\nFrom: a\n\nbody\n",
        );
        let err = signature_base(&mut message, &discard_logger(), None).unwrap_err();
        assert!(matches!(err, DKIMError::UnknownAlgorithm(_)));
    }

    #[test]
    fn test_verify_base_checks_body_hash() {
        let mut message = crlf(
            "DKIM-Signature: v=1; a=rsa-sha256; c=relaxed/relaxed; d=example.com; s=x; h=from; bh=bm90IHRoZSBoYXNo; b=c2ln\nFrom: a\n\nbody\n",
        );
        let err = signature_base(&mut message, &discard_logger(), None).unwrap_err();
        assert!(matches!(err, DKIMError::BodyHashDidNotVerify));
    }
}
