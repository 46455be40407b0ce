//! Message signing (RFC 6376 section 5).

use std::io::{Read, Seek, SeekFrom, Write};

use base64::engine::general_purpose;
use base64::Engine;
use slog::debug;

use crate::algorithms::Algorithm;
use crate::errors::DKIMError;
use crate::hash::signature_base;
use crate::signature::{blank_signature_tag, Signature};
use crate::DkimPrivateKey;

/// Builder for the [`Signer`].
pub struct SignerBuilder<'a> {
    signed_headers: Option<Vec<String>>,
    private_key: Option<DkimPrivateKey>,
    selector: Option<&'a str>,
    signing_domain: Option<&'a str>,
    algorithm: Option<Algorithm>,
    canonicalization: &'a str,
    logger: Option<&'a slog::Logger>,
    unix_newlines: bool,
}

impl<'a> SignerBuilder<'a> {
    /// New builder
    pub fn new() -> Self {
        Self {
            signed_headers: None,
            private_key: None,
            selector: None,
            signing_domain: None,
            algorithm: None,
            canonicalization: "relaxed/relaxed",
            logger: None,
            unix_newlines: false,
        }
    }

    /// Specify headers to be used in the DKIM signature.
    /// The From: header is required.
    pub fn with_signed_headers(
        mut self,
        headers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, DKIMError> {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        if !headers.iter().any(|h| h.eq_ignore_ascii_case("from")) {
            return Err(DKIMError::BuilderError("missing From in signed headers"));
        }
        self.signed_headers = Some(headers);
        Ok(self)
    }

    /// Specify the private key used to sign the message.
    pub fn with_private_key(mut self, key: DkimPrivateKey) -> Self {
        self.private_key = Some(key);
        self
    }

    pub fn with_selector(mut self, value: &'a str) -> Self {
        self.selector = Some(value);
        self
    }

    /// Specify for which domain the message should be signed.
    pub fn with_signing_domain(mut self, value: &'a str) -> Self {
        self.signing_domain = Some(value);
        self
    }

    /// Override the signature algorithm. Without this the algorithm follows
    /// the key: rsa-sha256 for RSA keys, ed25519-sha256 for Ed25519 keys.
    pub fn with_algorithm(mut self, value: Algorithm) -> Self {
        self.algorithm = Some(value);
        self
    }

    /// Canonicalization spelling as accepted by the `c=` tag
    /// (`"relaxed/relaxed"` by default).
    pub fn with_canonicalization(mut self, value: &'a str) -> Self {
        self.canonicalization = value;
        self
    }

    /// Emit LF instead of CRLF line endings when writing the signed message.
    pub fn with_unix_newlines(mut self, value: bool) -> Self {
        self.unix_newlines = value;
        self
    }

    /// Specify a logger
    pub fn with_logger(mut self, logger: &'a slog::Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build an instance of the Signer. Must be provided: signed_headers,
    /// private_key, selector, signing_domain and logger.
    pub fn build(self) -> Result<Signer<'a>, DKIMError> {
        use DKIMError::BuilderError;

        let private_key = self
            .private_key
            .ok_or(BuilderError("missing required private key"))?;
        let algorithm = match self.algorithm {
            Some(algorithm) => {
                let compatible = matches!(
                    (&algorithm, &private_key),
                    (Algorithm::RsaSha1, DkimPrivateKey::Rsa(_))
                        | (Algorithm::RsaSha256, DkimPrivateKey::Rsa(_))
                        | (Algorithm::Ed25519Sha256, DkimPrivateKey::Ed25519(_))
                );
                if !compatible {
                    return Err(BuilderError("algorithm does not match the private key"));
                }
                algorithm
            }
            None => match &private_key {
                DkimPrivateKey::Rsa(_) => Algorithm::RsaSha256,
                DkimPrivateKey::Ed25519(_) => Algorithm::Ed25519Sha256,
            },
        };

        Ok(Signer {
            signed_headers: self
                .signed_headers
                .ok_or(BuilderError("missing required signed headers"))?,
            private_key,
            selector: self
                .selector
                .ok_or(BuilderError("missing required selector"))?,
            signing_domain: self
                .signing_domain
                .ok_or(BuilderError("missing required signing domain"))?,
            logger: self.logger.ok_or(BuilderError("missing required logger"))?,
            canonicalization: self.canonicalization,
            algorithm,
            unix_newlines: self.unix_newlines,
        })
    }
}

impl<'a> Default for SignerBuilder<'a> {
    fn default() -> Self {
        Self::new()
    }
}

/// DKIM signer. Use the [SignerBuilder] to build an instance.
pub struct Signer<'a> {
    signed_headers: Vec<String>,
    private_key: DkimPrivateKey,
    selector: &'a str,
    signing_domain: &'a str,
    canonicalization: &'a str,
    algorithm: Algorithm,
    logger: &'a slog::Logger,
    unix_newlines: bool,
}

impl<'a> Signer<'a> {
    /// Computes the signature over the CRLF-normalized seekable stream and
    /// returns the rendered `DKIM-Signature:` header line.
    pub fn signature_header<R: Read + Seek>(&self, r: &mut R) -> Result<String, DKIMError> {
        Ok(self.signed_record(r)?.to_string())
    }

    /// Signs the message in `r` and writes it to `dst` with the
    /// `DKIM-Signature:` header injected before the first non-`From ` line.
    /// mbox-style `From ` separator lines pass through untouched.
    pub fn sign_message<R: Read + Seek, W: Write>(
        &self,
        r: &mut R,
        dst: &mut W,
    ) -> Result<(), DKIMError> {
        let signature = self.signed_record(r)?;
        let nl: &[u8] = if self.unix_newlines { b"\n" } else { b"\r\n" };

        r.seek(SeekFrom::Start(0))?;
        let mut message = Vec::new();
        r.read_to_end(&mut message)?;

        let mut added_signature = false;
        for line in lines(&message) {
            if !added_signature && !line.starts_with(b"From ") {
                added_signature = true;
                dst.write_all(signature.to_string().as_bytes())?;
                dst.write_all(nl)?;
            }
            dst.write_all(line)?;
            dst.write_all(nl)?;
        }
        if !added_signature {
            dst.write_all(signature.to_string().as_bytes())?;
            dst.write_all(nl)?;
        }
        Ok(())
    }

    fn signed_record<R: Read + Seek>(&self, r: &mut R) -> Result<Signature, DKIMError> {
        let record = Signature::new(
            self.canonicalization,
            self.selector,
            self.algorithm.name(),
            self.signing_domain,
            self.signed_headers.clone(),
        )?;
        let base = signature_base(r, self.logger, Some(record))?;

        let mut message = base.header_block;
        message.extend_from_slice(&blank_signature_tag(&base.signature_header));
        debug!(self.logger, "signing header block"; "bytes" => message.len());

        let raw_signature = self.algorithm.sign(&message, &self.private_key)?;
        let mut signature = base.signature;
        signature.signature = general_purpose::STANDARD.encode(raw_signature);
        Ok(signature)
    }
}

// CRLF-terminated lines without terminators; a trailing partial line counts.
fn lines(message: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = message;
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
