//! Crate-wide error type.
//!
//! Mirrors the error kinds called out in the design: a blob missing or
//! corrupt, a malformed header field, a chart reference that doesn't
//! resolve, manifest content that isn't an object or array, plus the
//! catch-alls for I/O, templating and the Kubernetes client.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found")]
    NotFound,

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("missing or invalid field in header secret: 'name'")]
    InvalidHeaderFieldName,

    #[error("missing or invalid field in header secret: 'revision'")]
    InvalidHeaderFieldRevision,

    #[error("missing or invalid field in header secret: 'chunks'")]
    InvalidHeaderFieldChunks,

    #[error("missing or invalid field in header secret: 'checksum'")]
    InvalidHeaderFieldChecksum,

    #[error("missing chart named '{0}'")]
    MissingChart(String),

    #[error("content is not a JSONObject or JSONArray: {0}")]
    InvalidContent(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io0(#[from] std::io::Error),

    #[error("jsonnet evaluation failed: {0}")]
    Jsonnet(String),

    #[error("{0} exited with error: command failed")]
    ExternalCommandFailed(String),

    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    #[error(transparent)]
    Base64(#[from] base64::DecodeError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Error {
        Error::Io { path: path.into(), source }
    }
}
