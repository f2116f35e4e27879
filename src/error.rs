use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Casper Wallet extension not detected")]
    ProviderNotFound,
    #[error("Connection request was rejected")]
    ConnectionRejected,
    #[error("Wallet not connected")]
    NotConnected,
    #[error("Extension call failed: {0}")]
    Extension(String),
    #[error("RPC transport error: {0}")]
    RpcTransport(String),
    #[error("RPC error {code}: {message}")]
    RpcProtocol { code: i64, message: String },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Signing rejected: {0}")]
    SigningRejected(String),
    #[error("Malformed signature response: {0}")]
    MalformedSignatureResponse(String),
    #[error("Invalid public key: {0}")]
    InvalidIdentity(String),
    #[error("Active key changed while signing")]
    IdentityMismatch,
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("Config error: {0}")]
    Config(String),
}

impl WalletError {
    /// Expected user outcomes that callers recover from silently.
    pub fn is_user_outcome(&self) -> bool {
        matches!(
            self,
            WalletError::ProviderNotFound
                | WalletError::ConnectionRejected
                | WalletError::SigningRejected(_)
        )
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(e: reqwest::Error) -> Self {
        WalletError::RpcTransport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WalletError>;
