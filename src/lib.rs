// Implementation of DKIM: https://datatracker.ietf.org/doc/html/rfc6376

use std::io::{Read, Seek};

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use slog::debug;

#[macro_use]
extern crate quick_error;

pub mod algorithms;
pub mod canonicalization;
#[cfg(feature = "dns")]
pub mod dns;
mod errors;
mod hash;
pub mod header;
pub mod normalize;
mod parser;
pub mod public_key;
mod result;
mod sign;
mod signature;

pub use algorithms::Algorithm;
pub use errors::{DKIMError, Status};
pub use parser::{tag_list as parse_tag_list, Tag};
pub use public_key::decode_dns_txt;
pub use result::DKIMResult;
pub use sign::{Signer, SignerBuilder};
pub use signature::{Signature, HEADER};

#[derive(Debug)]
pub enum DkimPublicKey {
    Rsa(RsaPublicKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl DkimPublicKey {
    /// Returns the key family as named by a DNS `k=` tag.
    pub fn key_type(&self) -> &'static str {
        match self {
            DkimPublicKey::Ed25519(_) => "ed25519",
            DkimPublicKey::Rsa(_) => "rsa",
        }
    }

    /// Builds a key from the decoded `p=` bytes of a DNS record. RSA keys
    /// are PKIX SubjectPublicKeyInfo, with a PKCS#1 fallback for the many
    /// records published in that shape; Ed25519 keys are the raw 32 bytes.
    pub fn try_from_bytes(bytes: &[u8], key_type: &str) -> Result<Self, DKIMError> {
        match key_type.to_lowercase().as_str() {
            "rsa" => Self::parse_rsa_key(bytes),
            "ed25519" => Self::parse_ed25519_key(bytes),
            unsupported => Err(DKIMError::KeyUnavailable(format!(
                "unsupported key type: {}",
                unsupported
            ))),
        }
    }

    fn parse_rsa_key(bytes: &[u8]) -> Result<Self, DKIMError> {
        RsaPublicKey::from_public_key_der(bytes)
            .or_else(|_| RsaPublicKey::from_pkcs1_der(bytes))
            .map(DkimPublicKey::Rsa)
            .map_err(|err| DKIMError::KeyUnavailable(format!("failed to parse RSA key: {}", err)))
    }

    fn parse_ed25519_key(bytes: &[u8]) -> Result<Self, DKIMError> {
        let key_bytes: [u8; 32] = bytes.try_into().map_err(|err| {
            DKIMError::KeyUnavailable(format!("invalid Ed25519 key length: {}", err))
        })?;

        ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
            .map(DkimPublicKey::Ed25519)
            .map_err(|err| {
                DKIMError::KeyUnavailable(format!("failed to parse Ed25519 key: {}", err))
            })
    }
}

impl TryFrom<(&[u8], &str)> for DkimPublicKey {
    type Error = DKIMError;

    fn try_from((bytes, key_type): (&[u8], &str)) -> Result<Self, Self::Error> {
        Self::try_from_bytes(bytes, key_type)
    }
}

#[derive(Debug)]
pub enum DkimPrivateKey {
    Rsa(RsaPrivateKey),
    Ed25519(ed25519_dalek::SigningKey),
}

// https://datatracker.ietf.org/doc/html/rfc6376#section-6.1.3 Step 4
fn finish_verification(
    base: hash::SignatureBase,
    public_key: &DkimPublicKey,
) -> Result<(), DKIMError> {
    if base.signature.signature.is_empty() {
        return Err(DKIMError::SignatureSyntaxError("empty b= tag".to_owned()));
    }
    let signature_bytes = base.signature.signature_bytes()?;
    let algorithm = Algorithm::from_name(&base.signature.algorithm)
        .ok_or_else(|| DKIMError::UnknownAlgorithm(base.signature.algorithm.clone()))?;

    let mut message = base.header_block;
    message.extend_from_slice(&signature::blank_signature_tag(&base.signature_header));
    algorithm.verify(&message, &signature_bytes, public_key)
}

/// Verifies the message in the CRLF-normalized seekable stream `r` against a
/// known public key instead of fetching one from the DNS.
pub fn verify_message_with_key<R: Read + Seek>(
    logger: &slog::Logger,
    r: &mut R,
    public_key: &DkimPublicKey,
) -> Result<(), DKIMError> {
    let base = hash::signature_base(r, logger, None)?;
    debug!(logger, "verifying signature";
           "domain" => %base.signature.domain, "selector" => %base.signature.selector);
    finish_verification(base, public_key)
}

/// Verifies the message in `r`, retrieving the signer's public key through
/// the provided resolver.
#[cfg(feature = "dns")]
pub async fn verify_message_with_resolver<R: Read + Seek>(
    logger: &slog::Logger,
    r: &mut R,
    resolver: &dyn dns::Lookup,
) -> Result<(), DKIMError> {
    let base = hash::signature_base(r, logger, None)?;
    debug!(logger, "verifying signature";
           "domain" => %base.signature.domain, "selector" => %base.signature.selector);
    let public_key = public_key::retrieve_public_key(
        logger,
        resolver,
        &base.signature.domain,
        &base.signature.selector,
    )
    .await?;
    finish_verification(base, &public_key)
}

/// Verifies the message in `r` using the system DNS resolver.
#[cfg(feature = "dns")]
pub async fn verify_message<R: Read + Seek>(
    logger: &slog::Logger,
    r: &mut R,
) -> Result<(), DKIMError> {
    let resolver = dns::system_resolver()?;
    verify_message_with_resolver(logger, r, resolver.as_ref()).await
}
