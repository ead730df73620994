//! Named error kinds that callers may downcast from [anyhow::Error].

use thiserror::Error;

/// Errors raised while constructing a loader.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("unsupported loader mode: {mode} data loading is not implemented")]
    UnsupportedMode { mode: &'static str },
    #[error("invalid loader configuration: {reason}")]
    InvalidConfig { reason: String },
}

/// Errors raised while merging samples into a batch.
#[derive(Debug, Error)]
pub enum CollateError {
    #[error("cannot collate an empty list of samples")]
    EmptyBatch,
    #[error("sample {index} diverges from the batch schema at field '{field}': expected {expected}, found {found}")]
    SchemaMismatch {
        index: usize,
        field: String,
        expected: String,
        found: String,
    },
    #[error("sample {index} has image shape {found:?} ({found_kind:?}), but the batch expects {expected:?} (Uint8)")]
    ImageShapeMismatch {
        index: usize,
        expected: Vec<i64>,
        found: Vec<i64>,
        found_kind: tch::Kind,
    },
}

/// Errors raised by the transfer stream.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("the transfer stream was closed before the transfer completed")]
    StreamClosed,
}
