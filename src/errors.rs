/// Failure taxon of a [`DKIMError`].
///
/// The distinction matters to callers: a temporary failure may be retried
/// (typically a DNS hiccup), a permanent failure is a deterministic negative
/// result, and internal errors are local I/O or configuration problems that
/// say nothing about the message itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Permanent,
    Temporary,
    Internal,
}

quick_error! {
    #[derive(Debug)]
    pub enum DKIMError {
        NoSignature {
            display("Permanent failure: no DKIM signature")
        }
        BodyHashDidNotVerify {
            display("Permanent failure: body hash does not match")
        }
        SignatureDidNotVerify {
            display("Permanent failure: signature did not verify")
        }
        UnknownAlgorithm(name: String) {
            display("Permanent failure: unknown algorithm {}", name)
        }
        IncompatibleVersion {
            display("Permanent failure: incompatible DKIM version")
        }
        SignatureMissingRequiredTag(name: &'static str) {
            display("Permanent failure: signature missing required tag {}", name)
        }
        SignatureSyntaxError(err: String) {
            display("Permanent failure: signature syntax error: {}", err)
        }
        BadCanonicalization(value: String) {
            display("Permanent failure: bad canonicalization: {}", value)
        }
        KeyIncompatible {
            display("Permanent failure: key does not match signature algorithm")
        }
        KeyUnavailable(err: String) {
            display("Permanent failure: {}", err)
        }
        TempDnsFailure(err: String) {
            display("Temporary failure: {}", err)
        }
        PrivateKeyLoadError(err: String) {
            display("failed to load private key: {}", err)
        }
        FailedToSign(err: String) {
            display("failed to sign: {}", err)
        }
        BuilderError(err: &'static str) {
            display("invalid signer: {}", err)
        }
        Io(err: std::io::Error) {
            from()
            source(err)
            display("{}", err)
        }
    }
}

impl DKIMError {
    pub fn status(&self) -> Status {
        use DKIMError::*;
        match self {
            NoSignature
            | BodyHashDidNotVerify
            | SignatureDidNotVerify
            | UnknownAlgorithm(_)
            | IncompatibleVersion
            | SignatureMissingRequiredTag(_)
            | SignatureSyntaxError(_)
            | BadCanonicalization(_)
            | KeyIncompatible
            | KeyUnavailable(_) => Status::Permanent,
            TempDnsFailure(_) => Status::Temporary,
            PrivateKeyLoadError(_) | FailedToSign(_) | BuilderError(_) | Io(_) => Status::Internal,
        }
    }
}
