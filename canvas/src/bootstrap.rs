use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use bucket::{object_key, BucketClient, FetchOutcome};
use image::RgbaImage;
use log::{info, warn};
use structures::Dimensions;

use crate::{
    codec::{blank_canvas, blank_record, decode_canvas, decode_record, dimensions_of, RecordImage},
    errors::CanvasError,
};

/// Produces the initial canvas and record, either blank or from a snapshot.
///
/// With a bucket configured, snapshots are downloaded to their local path
/// first. A snapshot the bucket does not have yet is not an error: the
/// raster is created blank instead.
pub struct Bootstrapper<'a> {
    dimensions: Dimensions,
    remote: Option<&'a BucketClient>,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(dimensions: Dimensions, remote: Option<&'a BucketClient>) -> Self {
        Bootstrapper { dimensions, remote }
    }

    pub async fn canvas(&self, source: Option<&Path>) -> Result<RgbaImage, CanvasError> {
        let Some((path, bytes)) = self.materialize("canvas", source).await? else {
            return Ok(blank_canvas(self.dimensions));
        };

        let canvas = decode_canvas(&bytes).map_err(|source| CanvasError::Decode { path, source })?;
        self.warn_on_size_change("canvas", dimensions_of(&canvas));
        Ok(canvas)
    }

    pub async fn record(&self, source: Option<&Path>) -> Result<RecordImage, CanvasError> {
        let Some((path, bytes)) = self.materialize("record", source).await? else {
            return Ok(blank_record(self.dimensions));
        };

        let record = decode_record(&bytes).map_err(|source| CanvasError::Decode { path, source })?;
        self.warn_on_size_change("record", dimensions_of(&record));
        Ok(record)
    }

    /// Returns the snapshot bytes, or `None` when a blank raster should be used.
    async fn materialize(
        &self,
        what: &str,
        source: Option<&Path>,
    ) -> Result<Option<(PathBuf, Vec<u8>)>, CanvasError> {
        let Dimensions { width, height } = self.dimensions;

        let Some(path) = source else {
            info!("Creating new {} with dimensions {} x {}", what, width, height);
            return Ok(None);
        };

        match self.remote {
            Some(remote) => {
                info!(
                    "Loading {} from {}",
                    what,
                    remote.object_url(&object_key(path))
                );
                if let FetchOutcome::Missing { status } = remote.fetch_to(path).await? {
                    warn!(
                        "Failed to download {} snapshot, status: {}. Creating new {} with dimensions {} x {}",
                        what, status, what, width, height
                    );
                    return Ok(None);
                }
            }
            None => info!("Loading {} from {:?}", what, path),
        }

        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some((path.to_path_buf(), bytes))),
            Err(err) if err.kind() == ErrorKind::NotFound && self.remote.is_none() => {
                warn!(
                    "No {} snapshot at {:?}. Creating new {} with dimensions {} x {}",
                    what, path, what, width, height
                );
                Ok(None)
            }
            Err(source) => Err(CanvasError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn warn_on_size_change(&self, what: &str, loaded: Dimensions) {
        if loaded != self.dimensions {
            warn!(
                "Loaded {} is {} x {}, configured size {} x {} is ignored",
                what, loaded.width, loaded.height, self.dimensions.width, self.dimensions.height
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[tokio::test]
    async fn no_source_gives_blank_rasters() {
        let bootstrapper = Bootstrapper::new(Dimensions::new(6, 2), None);

        let canvas = bootstrapper.canvas(None).await.unwrap();
        let record = bootstrapper.record(None).await.unwrap();

        assert_eq!(canvas, blank_canvas(Dimensions::new(6, 2)));
        assert_eq!(record, blank_record(Dimensions::new(6, 2)));
    }

    #[tokio::test]
    async fn local_snapshot_is_loaded_without_remote() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("place.png");
        let mut canvas = blank_canvas(Dimensions::new(3, 3));
        canvas.put_pixel(1, 1, Rgba([0x6d, 0x48, 0x2f, 0xff]));
        std::fs::write(&path, crate::encode_canvas(&canvas).unwrap()).unwrap();

        let loaded = Bootstrapper::new(Dimensions::new(3, 3), None)
            .canvas(Some(&path))
            .await
            .unwrap();

        assert_eq!(loaded, canvas);
    }

    #[tokio::test]
    async fn missing_local_snapshot_falls_back_to_blank() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("place.png");

        let loaded = Bootstrapper::new(Dimensions::new(2, 5), None)
            .canvas(Some(&path))
            .await
            .unwrap();

        assert_eq!(loaded, blank_canvas(Dimensions::new(2, 5)));
    }

    #[tokio::test]
    async fn loaded_size_wins_over_configured_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.png");
        let record = blank_record(Dimensions::new(8, 8));
        std::fs::write(&path, crate::encode_record(&record).unwrap()).unwrap();

        let loaded = Bootstrapper::new(Dimensions::new(4, 4), None)
            .record(Some(&path))
            .await
            .unwrap();

        assert_eq!(dimensions_of(&loaded), Dimensions::new(8, 8));
    }

    #[tokio::test]
    async fn corrupt_local_snapshot_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("place.png");
        std::fs::write(&path, b"not an image").unwrap();

        let err = Bootstrapper::new(Dimensions::new(2, 2), None)
            .canvas(Some(&path))
            .await
            .unwrap_err();

        assert!(matches!(err, CanvasError::Decode { .. }));
    }
}
