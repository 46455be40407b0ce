use crate::errors::DKIMError;

/// Outcome of verifying one message, in the shape the CLI's header mode
/// wants it.
#[derive(Debug)]
pub enum DKIMResult {
    Pass,
    Fail(DKIMError),
}

impl DKIMResult {
    /// `"Pass"` or `"Fail"`.
    pub fn summary(&self) -> &'static str {
        match self {
            DKIMResult::Pass => "Pass",
            DKIMResult::Fail(_) => "Fail",
        }
    }

    /// The summary with the failure reason attached.
    pub fn with_detail(&self) -> String {
        match self {
            DKIMResult::Pass => "Pass".to_owned(),
            DKIMResult::Fail(err) => format!("Fail ({})", err),
        }
    }

    pub fn error(&self) -> Option<&DKIMError> {
        match self {
            DKIMResult::Pass => None,
            DKIMResult::Fail(err) => Some(err),
        }
    }
}

impl From<Result<(), DKIMError>> for DKIMResult {
    fn from(result: Result<(), DKIMError>) -> Self {
        match result {
            Ok(()) => DKIMResult::Pass,
            Err(err) => DKIMResult::Fail(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        assert_eq!(DKIMResult::Pass.summary(), "Pass");
        let fail = DKIMResult::Fail(DKIMError::NoSignature);
        assert_eq!(fail.summary(), "Fail");
        assert_eq!(
            fail.with_detail(),
            "Fail (Permanent failure: no DKIM signature)"
        );
    }
}
