use std::fmt;
use std::path::PathBuf;

// ==============================================================================
// Collaborator Errors
// ==============================================================================

/// Failures reported by a [`Wallet`](crate::wallet::Wallet) implementation.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("invalid passphrase")]
    Passphrase,

    #[error("wallet is locked")]
    Locked,

    #[error("no private key available for address {0}")]
    UnknownAddress(String),

    #[error("wallet backend failure: {0}")]
    Backend(String),
}

/// Failures reported by the transaction index store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing lock is held by another handle (usually another process).
    #[error("timed out acquiring the index store lock at {}", path.display())]
    Timeout { path: PathBuf },

    #[error("index store is corrupt: {0}")]
    Corrupt(String),

    #[error("index store is closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures from the JSON-RPC client resource.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC server error {code}: {message}")]
    ServerError { code: i64, message: String },

    #[error("invalid RPC response: {0}")]
    InvalidResponse(String),

    #[error("invalid RPC configuration: {0}")]
    InvalidConfig(String),

    #[error("RPC client has been stopped")]
    Stopped,
}

// ==============================================================================
// Resources
// ==============================================================================

/// The exclusively-owned handles a session acquires and releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    LogSink,
    IndexStore,
    WalletLoader,
    Wallet,
    SignalListener,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LogSink => write!(f, "log sink"),
            Self::IndexStore => write!(f, "tx index store"),
            Self::WalletLoader => write!(f, "wallet loader"),
            Self::Wallet => write!(f, "wallet"),
            Self::SignalListener => write!(f, "signal listener"),
        }
    }
}

// ==============================================================================
// Session Errors
// ==============================================================================

/// Coarse classification for callers that only need to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The session was configured with something it cannot use.
    Config,
    /// The caller supplied bad input (address, passphrase, signature, bytes).
    InvalidInput,
    /// A resource is held elsewhere; retrying later may succeed.
    Busy,
    /// The operation itself failed.
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("tx index database at {} is in use by another process", path.display())]
    ResourceInUse { path: PathBuf },

    #[error("error opening {resource}: {message}")]
    ResourceOpen { resource: Resource, message: String },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid passphrase")]
    InvalidPassphrase,

    #[error("wallet is locked")]
    WalletLocked,

    #[error("no wallet is loaded")]
    WalletNotLoaded,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("malformed base64 signature: {0}")]
    Decoding(#[from] base64::DecodeError),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("session is shut down")]
    SessionClosed,

    #[error(transparent)]
    Index(#[from] StoreError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::ResourceInUse { .. } => ErrorKind::Busy,
            Self::InvalidAddress(_)
            | Self::InvalidPassphrase
            | Self::Decoding(_)
            | Self::InvalidTransaction(_) => ErrorKind::InvalidInput,
            Self::ResourceOpen { .. }
            | Self::WalletLocked
            | Self::WalletNotLoaded
            | Self::Signing(_)
            | Self::Verification(_)
            | Self::SessionClosed
            | Self::Index(_)
            | Self::Rpc(_)
            | Self::Io(_) => ErrorKind::Failed,
        }
    }
}

/// Wallet failures surfacing through sign/unlock map onto the session
/// taxonomy; the collaborator's own error type never reaches the caller.
impl From<WalletError> for Error {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Passphrase => Self::InvalidPassphrase,
            WalletError::Locked => Self::WalletLocked,
            WalletError::UnknownAddress(address) => {
                Self::Signing(format!("no private key available for address {address}"))
            }
            WalletError::Backend(message) => Self::Signing(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_in_use_is_busy() {
        let err = Error::ResourceInUse {
            path: PathBuf::from("/tmp/tx.db"),
        };
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert!(err.to_string().contains("in use by another process"));
    }

    #[test]
    fn invalid_address_is_caller_input() {
        let err = Error::InvalidAddress("p2sh".into());
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn wallet_errors_translate_into_session_taxonomy() {
        assert!(matches!(
            Error::from(WalletError::Passphrase),
            Error::InvalidPassphrase
        ));
        assert!(matches!(Error::from(WalletError::Locked), Error::WalletLocked));
        assert!(matches!(
            Error::from(WalletError::Backend("disk".into())),
            Error::Signing(message) if message == "disk"
        ));
        assert!(matches!(
            Error::from(WalletError::UnknownAddress("1abc".into())),
            Error::Signing(message) if message.contains("1abc")
        ));
    }
}
