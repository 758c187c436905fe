use thiserror::Error;

use crate::ledger::Txid;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid protocol configuration: {0}")]
    Config(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("derived owner key {derived} does not match script locking key {locking}")]
    InvalidOwnerKey { derived: String, locking: String },

    #[error("malformed message body: {0}")]
    MalformedMessage(String),

    #[error("invalid counterparty: {0}")]
    Counterparty(String),

    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    #[error("signer error: {0}")]
    Signer(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("script error: {0}")]
    Script(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("submission error: {0}")]
    Submission(String),

    #[error("output {txid}:{vout} is already spent")]
    AlreadySpent { txid: Txid, vout: u32 },

    #[error("output {txid}:{vout} not found")]
    UnknownOutput { txid: Txid, vout: u32 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification of [`Error`] used by the receive loop and by callers
/// deciding whether a failure was the token's fault or a collaborator's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An output carried no (or unusable) custody metadata.
    InvalidToken,
    /// The re-derived owner key differs from the script's locking key.
    InvalidOwnerKey,
    /// Input that could not be decoded at the boundary.
    Malformed,
    /// Signer, ledger, transport or store failure.
    CollaboratorFailure,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidToken(_) => ErrorKind::InvalidToken,
            Error::InvalidOwnerKey { .. } => ErrorKind::InvalidOwnerKey,
            Error::MalformedMessage(_)
            | Error::Counterparty(_)
            | Error::Config(_)
            | Error::Serialization(_) => ErrorKind::Malformed,
            Error::KeyDerivation(_)
            | Error::Signer(_)
            | Error::Encryption(_)
            | Error::Script(_)
            | Error::Transaction(_)
            | Error::Submission(_)
            | Error::AlreadySpent { .. }
            | Error::UnknownOutput { .. }
            | Error::Transport(_)
            | Error::Query(_) => ErrorKind::CollaboratorFailure,
        }
    }

    /// True for the two hard rejections produced by token validation.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidToken | ErrorKind::InvalidOwnerKey
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_classify_rejections() {
        assert_eq!(
            Error::InvalidToken("missing".into()).kind(),
            ErrorKind::InvalidToken
        );
        let mismatch = Error::InvalidOwnerKey {
            derived: "02aa".into(),
            locking: "03bb".into(),
        };
        assert_eq!(mismatch.kind(), ErrorKind::InvalidOwnerKey);
        assert!(mismatch.is_rejection());
        assert!(!Error::Submission("dojo down".into()).is_rejection());
        assert_eq!(
            Error::Transport("relay".into()).kind(),
            ErrorKind::CollaboratorFailure
        );
    }
}
