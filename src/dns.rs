//! DNS TXT lookups behind an object-safe trait so verification can run
//! against the system resolver or a test double.

use std::sync::Arc;

use futures::future::BoxFuture;
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::TokioAsyncResolver;

use crate::errors::DKIMError;

/// A TXT record source.
///
/// Implementations return one string per record, with multi-part TXT
/// character-strings already concatenated.
pub trait Lookup: Send + Sync {
    fn lookup_txt<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<String>, DKIMError>>;
}

impl Lookup for TokioAsyncResolver {
    fn lookup_txt<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<String>, DKIMError>> {
        Box::pin(async move {
            match self.txt_lookup(name.to_owned()).await {
                Ok(lookup) => Ok(lookup
                    .iter()
                    .map(|txt| {
                        txt.txt_data()
                            .iter()
                            .map(|part| String::from_utf8_lossy(part).into_owned())
                            .collect::<String>()
                    })
                    .collect()),
                // An authoritative empty answer is not a transport problem:
                // the caller turns "no records" into a permanent failure.
                Err(err) if matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. }) => {
                    Ok(Vec::new())
                }
                Err(err) => Err(DKIMError::TempDnsFailure(err.to_string())),
            }
        })
    }
}

/// Wraps a tokio resolver into a shareable [`Lookup`].
pub fn from_tokio_resolver(resolver: TokioAsyncResolver) -> Arc<dyn Lookup> {
    Arc::new(resolver)
}

/// Builds a [`Lookup`] over the system resolver configuration.
pub fn system_resolver() -> Result<Arc<dyn Lookup>, DKIMError> {
    let resolver = TokioAsyncResolver::tokio_from_system_conf().map_err(|err| {
        DKIMError::TempDnsFailure(format!("failed to create DNS resolver: {}", err))
    })?;
    Ok(from_tokio_resolver(resolver))
}
