use std::{io::Read, path::Path};

use bucket::{object_key, BucketClient, BucketError, FetchOutcome, StatusCode};
use log::info;
use structures::Whitelist;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WhitelistError {
    #[error("failed to download whitelist {key}, status: {status}")]
    Missing { key: String, status: StatusCode },

    #[error("could not read whitelist {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read whitelist: {0}")]
    Csv(#[from] csv::Error),

    #[error("error when reading whitelist on row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error(transparent)]
    Remote(#[from] BucketError),
}

/// Loads the whitelist, downloading it from the bucket first when one is configured.
///
/// Unlike the canvas, a whitelist missing from the bucket is an error:
/// access control never starts with an empty table.
pub async fn load_whitelist(
    remote: Option<&BucketClient>,
    path: &Path,
) -> Result<Whitelist, WhitelistError> {
    if let Some(remote) = remote {
        let key = object_key(path);
        info!("Loading whitelist from {}", remote.object_url(&key));
        if let FetchOutcome::Missing { status } = remote.fetch_to(path).await? {
            return Err(WhitelistError::Missing { key, status });
        }
    } else {
        info!("Loading whitelist from {:?}", path);
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| WhitelistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    parse_whitelist(bytes.as_slice())
}

/// Parses headerless `identity,quota` rows. Later rows win for repeated identities.
pub fn parse_whitelist<R: Read>(reader: R) -> Result<Whitelist, WhitelistError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut whitelist = Whitelist::default();
    for (row, result) in reader.records().enumerate() {
        let record = result?;

        let identity = record.get(0).unwrap_or_default();
        let quota = record.get(1).ok_or_else(|| WhitelistError::MalformedRow {
            row,
            reason: "missing quota column".to_string(),
        })?;
        let quota = quota
            .trim()
            .parse::<u16>()
            .map_err(|err| WhitelistError::MalformedRow {
                row,
                reason: format!("quota {quota:?}: {err}"),
            })?;

        whitelist.quotas.insert(identity.to_string(), quota);
    }

    Ok(whitelist)
}
