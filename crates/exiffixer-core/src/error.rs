use std::io;

use thiserror::Error;

/// Per-file failure taxonomy. None of these ever aborts a batch.
#[derive(Error, Debug)]
pub enum FixError {
    /// A date string did not match any accepted grammar
    #[error("unparseable date: {0:?}")]
    ParseFailure(String),

    /// No usable tag or key was present
    #[error("no metadata date")]
    MetadataAbsent,

    /// Both the direct and the fallback strategy failed
    #[error("{0}")]
    MutationFailure(String),

    /// A stream or metadata session could not be opened
    #[error("cannot open {what}: {message}")]
    ResourceFault { what: String, message: String },
}

/// Errors from a single timestamp mutation strategy.
#[derive(Error, Debug)]
pub enum MutateError {
    /// The strategy cannot handle this locator at all
    #[error("not applicable: {0}")]
    Inapplicable(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("no rows updated")]
    NoRowsAffected,

    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}
