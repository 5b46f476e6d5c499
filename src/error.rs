//! Error types for powledger

use std::fmt;

/// Fieldless discriminant of [`ChainError`], used by callers that only need
/// to branch on the failure class (e.g. a miner deciding to re-mine or drop).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Structural,
    InvalidSender,
    InsufficientFunds,
    InvalidAdditionalStructure,
    StaleTip,
    InvalidProofOfWork,
    DoubleSpend,
    Crypto,
    ChainInconsistency,
    Io,
    Serialization,
    Config,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    StructuralError(String),
    InvalidSender(String),
    InsufficientFunds { available: u64, required: u64 },
    InvalidAdditionalStructure(String),
    StaleTip { expected: String, found: String },
    InvalidProofOfWork(String),
    DoubleSpend(String),
    CryptoError(String),
    ChainInconsistency(String),
    IoError(String),
    SerializationError(String),
    ConfigError(String),
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::StructuralError(_) => ErrorKind::Structural,
            ChainError::InvalidSender(_) => ErrorKind::InvalidSender,
            ChainError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            ChainError::InvalidAdditionalStructure(_) => ErrorKind::InvalidAdditionalStructure,
            ChainError::StaleTip { .. } => ErrorKind::StaleTip,
            ChainError::InvalidProofOfWork(_) => ErrorKind::InvalidProofOfWork,
            ChainError::DoubleSpend(_) => ErrorKind::DoubleSpend,
            ChainError::CryptoError(_) => ErrorKind::Crypto,
            ChainError::ChainInconsistency(_) => ErrorKind::ChainInconsistency,
            ChainError::IoError(_) => ErrorKind::Io,
            ChainError::SerializationError(_) => ErrorKind::Serialization,
            ChainError::ConfigError(_) => ErrorKind::Config,
        }
    }

    /// A stale tip only means another miner won the race; the record is still good.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::StaleTip { .. })
    }
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainError::StructuralError(msg) => write!(f, "Structural error: {}", msg),
            ChainError::InvalidSender(msg) => write!(f, "Invalid sender: {}", msg),
            ChainError::InsufficientFunds {
                available,
                required,
            } => write!(
                f,
                "Insufficient funds: inputs provide {} but output requires {}",
                available, required
            ),
            ChainError::InvalidAdditionalStructure(msg) => {
                write!(f, "Invalid mining fields: {}", msg)
            }
            ChainError::StaleTip { expected, found } => write!(
                f,
                "Stale tip: chain tip is {} but record points at {}",
                expected, found
            ),
            ChainError::InvalidProofOfWork(msg) => write!(f, "Invalid proof of work: {}", msg),
            ChainError::DoubleSpend(msg) => write!(f, "Double spend detected: {}", msg),
            ChainError::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),
            ChainError::ChainInconsistency(msg) => write!(f, "Chain inconsistency: {}", msg),
            ChainError::IoError(msg) => write!(f, "IO error: {}", msg),
            ChainError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            ChainError::ConfigError(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for ChainError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        ChainError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
