use std::fmt;

#[derive(Debug)]
pub enum ChainError {
    Http(reqwest::Error),
    Rpc {
        method: String,
        status: u16,
        message: String,
    },
    Serialization(serde_json::Error),
    InvalidName(String),
    InvalidKey(String),
    InvalidChainId(String),
    InvalidResponse(String),
    Signing(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::Http(e) => write!(f, "HTTP error: {e}"),
            ChainError::Rpc {
                method,
                status,
                message,
            } => write!(f, "RPC call {method} failed (status {status}): {message}"),
            ChainError::Serialization(e) => write!(f, "Serialization error: {e}"),
            ChainError::InvalidName(msg) => write!(f, "Invalid account name: {msg}"),
            ChainError::InvalidKey(msg) => write!(f, "Invalid private key: {msg}"),
            ChainError::InvalidChainId(msg) => write!(f, "Invalid chain id: {msg}"),
            ChainError::InvalidResponse(msg) => write!(f, "Invalid RPC response: {msg}"),
            ChainError::Signing(msg) => write!(f, "Signing error: {msg}"),
        }
    }
}

impl std::error::Error for ChainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChainError::Http(e) => Some(e),
            ChainError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        ChainError::Http(err)
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err)
    }
}
