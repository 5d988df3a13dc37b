use thiserror::Error;

/// Core error kinds. Scanner/loader failures are scoped to one document;
/// composition failures abort the whole merge with no partial output.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("corrupt package: {0}")]
    CorruptPackage(String),

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("no data rows to merge")]
    EmptyDataSet,

    #[error("render failed for row {row}: {reason}")]
    RenderFailed { row: usize, reason: String },
}
