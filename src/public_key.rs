//! Retrieval and decoding of DKIM public keys published in DNS TXT records.

use base64::engine::general_purpose;
use base64::Engine;
#[cfg(feature = "dns")]
use slog::debug;

use crate::errors::DKIMError;
use crate::parser::tag_list;
use crate::DkimPublicKey;

#[cfg(feature = "dns")]
use crate::dns::Lookup;

#[cfg(feature = "dns")]
pub(crate) const DNS_NAMESPACE: &str = "_domainkey";

/// Decodes one DKIM TXT record (`v=DKIM1; k=…; p=…`) into a typed key.
///
/// The `v=` tag is informational and not inspected; only `k=` (defaulting to
/// `rsa`) and `p=` matter. An empty `p=` means the key was revoked.
pub fn decode_dns_txt(txt: &str) -> Result<DkimPublicKey, DKIMError> {
    let (_, tags) = tag_list(txt)
        .map_err(|err| DKIMError::KeyUnavailable(format!("invalid TXT record: {}", err)))?;

    let mut key_type = "rsa";
    let mut key_data: Option<&str> = None;
    for tag in &tags {
        match tag.name.as_str() {
            "k" => key_type = &tag.value,
            "p" => key_data = Some(&tag.value),
            _ => {}
        }
    }

    let key_data = key_data
        .ok_or_else(|| DKIMError::KeyUnavailable("record carries no p= tag".to_owned()))?;
    if key_data.is_empty() {
        return Err(DKIMError::KeyUnavailable("key revoked".to_owned()));
    }
    let bytes: String = key_data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = general_purpose::STANDARD
        .decode(bytes)
        .map_err(|err| DKIMError::KeyUnavailable(format!("failed to decode key: {}", err)))?;
    DkimPublicKey::try_from_bytes(&bytes, key_type)
}

/// Fetches the signer's public key from
/// `<selector>._domainkey.<domain>`. The first record that decodes wins;
/// a resolvable name with no usable key is a permanent failure.
#[cfg(feature = "dns")]
pub async fn retrieve_public_key(
    logger: &slog::Logger,
    resolver: &dyn Lookup,
    domain: &str,
    selector: &str,
) -> Result<DkimPublicKey, DKIMError> {
    let name = format!("{}.{}.{}", selector, DNS_NAMESPACE, domain);
    let records = resolver.lookup_txt(&name).await?;

    for record in &records {
        match decode_dns_txt(record) {
            Ok(key) => return Ok(key),
            Err(err) => {
                debug!(logger, "skipping TXT record"; "name" => %name, "reason" => %err);
            }
        }
    }
    Err(DKIMError::KeyUnavailable(format!(
        "no public key found at {}",
        name
    )))
}
