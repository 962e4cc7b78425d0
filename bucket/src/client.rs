use std::path::Path;

use log::{info, warn};
use reqwest::{header, StatusCode};
use structures::ContentKind;

use crate::{
    auth::Credentials,
    constants::{LOCAL_PREFIXES, UPSERT_HEADER},
    errors::BucketError,
};

#[derive(Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The object was written to the destination path.
    Stored { bytes: usize },
    /// The bucket answered with a non-success status.
    Missing { status: StatusCode },
}

#[derive(Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    Stored {
        status: StatusCode,
    },
    /// Recoverable: the object will be pushed again on the next cycle.
    Rejected {
        status: Option<StatusCode>,
        detail: String,
    },
}

impl UploadOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, UploadOutcome::Stored { .. })
    }
}

/// Remote key for a local path, e.g. `./data/place.png` -> `data/place.png`.
pub fn object_key(path: &Path) -> String {
    let mut key = path.to_string_lossy().into_owned();
    while let Some(prefix) = LOCAL_PREFIXES.iter().find(|p| key.starts_with(**p)) {
        key = key[prefix.len()..].to_string();
    }
    key
}

/// HTTP client for a bucket-style object store.
#[derive(Debug, Clone)]
pub struct BucketClient {
    http: reqwest::Client,
    bucket_url: String,
    credentials: Credentials,
}

impl BucketClient {
    pub fn new(
        bucket_url: impl Into<String>,
        credentials: Credentials,
    ) -> Result<Self, BucketError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(BucketError::Client)?;

        Ok(BucketClient {
            http,
            bucket_url: bucket_url.into(),
            credentials,
        })
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}{}", self.bucket_url, key)
    }

    /// Downloads the object backing `dest` and writes it to `dest`.
    ///
    /// A non-success status leaves `dest` untouched and is reported as
    /// [`FetchOutcome::Missing`]; whether that is acceptable is the caller's call.
    pub async fn fetch_to(&self, dest: &Path) -> Result<FetchOutcome, BucketError> {
        let url = self.object_url(&object_key(dest));

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| BucketError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Ok(FetchOutcome::Missing { status });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| BucketError::Transport { url, source })?;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| BucketError::io(parent, err))?;
        }
        tokio::fs::write(dest, &body)
            .await
            .map_err(|err| BucketError::io(dest, err))?;

        Ok(FetchOutcome::Stored { bytes: body.len() })
    }

    /// Pushes the file at `path` to its object key, overwriting any previous version.
    ///
    /// Only an unreadable local file or a failed login is an error. Anything
    /// the bucket does wrong comes back as [`UploadOutcome::Rejected`].
    pub async fn upload(
        &self,
        path: &Path,
        kind: ContentKind,
    ) -> Result<UploadOutcome, BucketError> {
        let key = object_key(path);
        let url = self.object_url(&key);

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| BucketError::io(path, err))?;
        let token = self.credentials.fetch_token(&self.http).await?;

        let result = self
            .http
            .post(&url)
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, kind.mime())
            .header(UPSERT_HEADER, "true")
            .body(bytes)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                warn!("upload of {} failed: {}", key, err);
                return Ok(UploadOutcome::Rejected {
                    status: None,
                    detail: err.to_string(),
                });
            }
        };

        let status = response.status();
        if status.is_success() {
            info!("uploaded {} to bucket", key);
            return Ok(UploadOutcome::Stored { status });
        }

        let detail = response.text().await.unwrap_or_default();
        warn!("upload of {} failed with status {}: {}", key, status, detail);
        Ok(UploadOutcome::Rejected {
            status: Some(status),
            detail,
        })
    }
}
