/// Errors produced by the user-operation pipeline.
///
/// Every stage fails fast with one of these instead of handing back a partially
/// populated operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A value could not be canonicalized to (or parsed from) hex.
    #[error("invalid encoding for {field}: {reason}")]
    InvalidEncoding { field: String, reason: String },

    /// A field required by the current stage was never computed.
    #[error("user operation is missing {0}")]
    IncompleteOperation(&'static str),

    /// The paymaster declined to sponsor the operation.
    #[error("paymaster declined sponsorship: {0}")]
    SponsorshipDenied(String),

    /// The paymaster or bundler could not be reached, or answered with garbage.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The bundler rejected the signed operation.
    #[error("bundler rejected user operation (code {code}): {reason}")]
    SubmissionRejected { code: i64, reason: String },

    /// The operation was not included before the caller's deadline.
    #[error("user operation {handle} not confirmed after {waited_secs}s")]
    ConfirmationTimeout { handle: String, waited_secs: u64 },

    /// Collaborators were wired for different networks or entry points.
    #[error("pipeline misconfigured: {0}")]
    Misconfigured(String),

    /// The signing capability failed to produce a signature.
    #[error("signing failed: {0}")]
    Signing(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn encoding(field: impl Into<String>, reason: impl ToString) -> Self {
        Error::InvalidEncoding {
            field: field.into(),
            reason: reason.to_string(),
        }
    }
}
