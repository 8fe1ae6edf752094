use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStoreErrorCode {
    Io,
    Encode,
    Decode,
    Corrupted,
    SchemaVersionMismatch,
    InvalidConfig,
    StoreUnavailable,
    Closed,
    Poisoned,
    ReentrantBlockingCall,
    Timeout,
}

impl ChatStoreErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatStoreErrorCode::Io => "io",
            ChatStoreErrorCode::Encode => "encode",
            ChatStoreErrorCode::Decode => "decode",
            ChatStoreErrorCode::Corrupted => "corrupted",
            ChatStoreErrorCode::SchemaVersionMismatch => "schema_version_mismatch",
            ChatStoreErrorCode::InvalidConfig => "invalid_config",
            ChatStoreErrorCode::StoreUnavailable => "store_unavailable",
            ChatStoreErrorCode::Closed => "closed",
            ChatStoreErrorCode::Poisoned => "poisoned",
            ChatStoreErrorCode::ReentrantBlockingCall => "reentrant_blocking_call",
            ChatStoreErrorCode::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Error)]
pub enum ChatStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("store corrupted: {message}")]
    Corrupted { message: String },
    #[error("schema version mismatch: store has {found}, engine expects {expected}")]
    SchemaVersionMismatch { expected: i32, found: i32 },
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String },
    #[error("store closed")]
    Closed,
    #[error("store poisoned after fatal failure: {reason}")]
    Poisoned { reason: String },
    #[error("blocking call issued from inside the transaction queue")]
    ReentrantBlockingCall,
    #[error("timeout")]
    Timeout,
}

impl ChatStoreError {
    pub fn code(&self) -> ChatStoreErrorCode {
        match self {
            ChatStoreError::Io(_) => ChatStoreErrorCode::Io,
            ChatStoreError::Encode(_) => ChatStoreErrorCode::Encode,
            ChatStoreError::Decode(_) => ChatStoreErrorCode::Decode,
            ChatStoreError::Corrupted { .. } => ChatStoreErrorCode::Corrupted,
            ChatStoreError::SchemaVersionMismatch { .. } => {
                ChatStoreErrorCode::SchemaVersionMismatch
            }
            ChatStoreError::InvalidConfig { .. } => ChatStoreErrorCode::InvalidConfig,
            ChatStoreError::StoreUnavailable { .. } => ChatStoreErrorCode::StoreUnavailable,
            ChatStoreError::Closed => ChatStoreErrorCode::Closed,
            ChatStoreError::Poisoned { .. } => ChatStoreErrorCode::Poisoned,
            ChatStoreError::ReentrantBlockingCall => ChatStoreErrorCode::ReentrantBlockingCall,
            ChatStoreError::Timeout => ChatStoreErrorCode::Timeout,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// Fatal errors poison the coordinator; every later request is rejected.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChatStoreError::Io(_)
                | ChatStoreError::Corrupted { .. }
                | ChatStoreError::StoreUnavailable { .. }
                | ChatStoreError::Poisoned { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatStoreError, ChatStoreErrorCode};

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(ChatStoreErrorCode::Poisoned.as_str(), "poisoned");
        assert_eq!(
            ChatStoreErrorCode::SchemaVersionMismatch.as_str(),
            "schema_version_mismatch"
        );
        assert_eq!(
            ChatStoreErrorCode::ReentrantBlockingCall.as_str(),
            "reentrant_blocking_call"
        );
    }

    #[test]
    fn error_code_str_matches_variant_mapping() {
        let err = ChatStoreError::SchemaVersionMismatch {
            expected: 3,
            found: 1,
        };
        assert_eq!(err.code(), ChatStoreErrorCode::SchemaVersionMismatch);
        assert_eq!(err.code_str(), "schema_version_mismatch");
        assert!(!err.is_fatal());
        assert!(
            ChatStoreError::Corrupted {
                message: "bad".into()
            }
            .is_fatal()
        );
    }
}
