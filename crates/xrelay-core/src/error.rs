//! Error types for xrelay core encoding

use thiserror::Error;

/// Errors raised while decoding words, byte sequences and notifications
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid length for {what}: expected {expected}, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid hex: {message}")]
    InvalidHex { message: String },

    #[error("Malformed ABI bytes: {message}")]
    MalformedBytes { message: String },

    #[error("Unknown notification signature {topic}")]
    UnknownSignature { topic: String },

    #[error("Notification {name} expects {expected} topics, got {actual}")]
    TopicCount {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, CodecError>;
