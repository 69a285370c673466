use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid address")]
    InvalidAddress,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid header extra: {0}")]
    InvalidExtra(String),

    #[error("Unknown message code {0}")]
    UnknownMessageCode(u8),

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}
