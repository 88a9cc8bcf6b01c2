//! Typed error kinds shared by every stage of the build driver.
//!
//! Every parser-facing error carries the source line it was raised from, so
//! diagnostics printed at the top level always read `(Line N)` the way the
//! rest of the toolchain's messages do.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("bad parameters: {0}")]
    BadParams(String),

    #[error("{path}(Line {line}): {message}")]
    FileFormat {
        path: PathBuf,
        line: u32,
        message: String,
    },

    #[error("{path}: unexpected end of file, block still open")]
    UnexpectedEof { path: PathBuf },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("index error: {0}")]
    IndexError(String),

    #[error("dependency error: {0}")]
    DependError(String),

    #[error("could not create {path}: {source}")]
    CreateError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not open {path}: {source}")]
    OpenError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not seek in {path}: {source}")]
    SeekError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not query {path}: {source}")]
    QueryError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not copy {from} to {to}: {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("build failed for project '{0}'")]
    BuildError(String),

    #[error("buffer full: {0}")]
    Full(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BuildError>;
