use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Failures the remote storage layer cannot recover from.
///
/// A missing object on fetch and a rejected upload are not errors, see
/// [`crate::FetchOutcome`] and [`crate::UploadOutcome`].
#[derive(Debug, Error)]
pub enum BucketError {
    #[error("could not build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("local file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("login request failed: {0}")]
    LoginTransport(#[source] reqwest::Error),

    #[error("login rejected with status {status}: {body}")]
    LoginRejected { status: StatusCode, body: String },

    #[error("could not parse login response: {0}")]
    LoginResponse(#[source] serde_json::Error),
}

impl BucketError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BucketError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_login_failure(&self) -> bool {
        matches!(
            self,
            BucketError::LoginTransport(_)
                | BucketError::LoginRejected { .. }
                | BucketError::LoginResponse(_)
        )
    }
}
