use crate::storage::DumpFormat;

pub type Result<T> = std::result::Result<T, BayesError>;

#[derive(Debug, thiserror::Error)]
pub enum BayesError {
    #[error("unsupported value type: {kind}")]
    UnsupportedType { kind: String },

    #[error("nil value given")]
    NilInput,

    #[error("nothing to hash: empty input")]
    EmptyInput,

    #[error("item holds no value")]
    EmptyValue,

    #[error("item #{index} can not be hashed: unsupported type {kind}")]
    UnsupportedItemType { index: usize, kind: String },

    #[error("duplicate class ID {class_id:016x} with different value. Original: {existing}, New: {incoming}")]
    DuplicateClass {
        class_id: u64,
        existing: String,
        incoming: String,
    },

    #[error("class {0} is not registered")]
    ClassNotFound(String),

    #[error("predictor is not initialized")]
    PredictorNotInitialized,

    #[error("failed to decode: {reason}")]
    DecodeFailure { reason: String },

    #[error("unsupported dump format: {0}")]
    UnsupportedDumpFormat(DumpFormat),

    #[error("key {0} not found")]
    KeyNotFound(u64),

    #[error("no more elements")]
    IteratorExhausted,

    #[error("invalid literal: {reason}")]
    InvalidLiteral { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BayesError {
    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        BayesError::DecodeFailure { reason: reason.into() }
    }
}
