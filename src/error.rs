//a Imports
use std::path::PathBuf;

use thiserror::Error;

//a CatalogError
//tp CatalogError
/// Errors raised by the catalog engine
///
/// Initialisation errors ([CatalogError::InitFailed],
/// [CatalogError::CorruptCatalog], [CatalogError::Config]) are fatal
/// for the engine instance. A chunk read failure in the middle of a
/// query is *not* surfaced as an error: the chunk is skipped and the
/// query result is flagged incomplete instead.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Configuration was invalid or the catalog location is missing
    #[error("catalog initialisation failed: {reason}")]
    InitFailed { reason: String },

    /// The on-disk data failed a structural or consistency check
    #[error("corrupt catalog: {what}")]
    CorruptCatalog { what: String },

    /// A file could not be opened or read
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A query was attempted while the engine was not in its ready state
    #[error("catalog engine is not ready")]
    NotReady,

    /// The chunk cache stayed full of pinned chunks past the configured timeout
    #[error("chunk cache saturated with pinned chunks")]
    Busy,

    /// The query's cancellation flag was raised
    #[error("query cancelled")]
    Cancelled,

    /// Query parameters failed validation
    #[error("invalid query parameters: {reason}")]
    InvalidParams { reason: String },

    /// The JSON configuration blob could not be parsed
    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

//ip CatalogError
impl CatalogError {
    //fp corrupt
    /// Build a [CatalogError::CorruptCatalog] from anything displayable
    pub fn corrupt<S: Into<String>>(what: S) -> Self {
        Self::CorruptCatalog { what: what.into() }
    }

    //fp init
    /// Build a [CatalogError::InitFailed] from anything displayable
    pub fn init<S: Into<String>>(reason: S) -> Self {
        Self::InitFailed {
            reason: reason.into(),
        }
    }

    //fp io
    /// Attach a path to an [std::io::Error]
    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

//a Result
/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, CatalogError>;
