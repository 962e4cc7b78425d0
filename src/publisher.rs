use std::{
    iter,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use bucket::{BucketClient, BucketError, UploadOutcome};
use canvas::{CanvasError, SnapshotSource};
use chrono::{DateTime, Utc};
use log::{debug, info};
use structures::ContentKind;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that stop the publisher. Rejected uploads are not among them.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("could not write snapshot to {path:?}: {source}")]
    LocalWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Snapshot(#[from] CanvasError),

    #[error(transparent)]
    Remote(#[from] BucketError),
}

/// Local files a cycle writes. `record` is set when access control is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotTargets {
    pub canvas: PathBuf,
    pub record: Option<PathBuf>,
}

#[derive(Debug)]
pub struct UploadReport {
    pub path: PathBuf,
    pub attempted_at: DateTime<Utc>,
    pub outcome: UploadOutcome,
}

#[derive(Debug)]
pub struct CycleReport {
    /// When the local writes finished.
    pub saved_at: DateTime<Utc>,
    /// Record first, then canvas. Empty in local-only mode.
    pub uploads: Vec<UploadReport>,
}

/// Periodically writes the live canvas to disk and pushes it to the bucket.
#[derive(Clone)]
pub struct SnapshotPublisher {
    source: Arc<dyn SnapshotSource>,
    remote: Option<BucketClient>,
    targets: SnapshotTargets,
    interval: Duration,
}

impl SnapshotPublisher {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        remote: Option<BucketClient>,
        targets: SnapshotTargets,
        interval: Duration,
    ) -> Self {
        SnapshotPublisher {
            source,
            remote,
            targets,
            interval,
        }
    }

    pub fn targets(&self) -> &SnapshotTargets {
        &self.targets
    }

    /// Runs one cycle right away and then one per interval until `cancel` fires.
    ///
    /// A cycle in flight is abandoned on cancellation; the caller is expected
    /// to finish with [`SnapshotPublisher::save_local`].
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), PublishError> {
        info!(
            "Publishing snapshots every {} seconds",
            self.interval.as_secs_f64()
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                report = self.publish_once() => {
                    let report = report?;
                    let stored = report.uploads.iter().filter(|u| u.outcome.is_stored()).count();
                    debug!("Snapshot cycle done, {}/{} uploads stored", stored, report.uploads.len());
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Snapshot publisher stopped");
        Ok(())
    }

    /// Saves locally, then uploads the record (if any) and the canvas.
    pub async fn publish_once(&self) -> Result<CycleReport, PublishError> {
        let saved_at = self.save_local().await?;

        let mut uploads = Vec::new();
        if let Some(remote) = &self.remote {
            let paths = self
                .targets
                .record
                .iter()
                .chain(iter::once(&self.targets.canvas));

            for path in paths {
                let attempted_at = Utc::now();
                let outcome = remote.upload(path, ContentKind::Image).await?;
                uploads.push(UploadReport {
                    path: path.clone(),
                    attempted_at,
                    outcome,
                });
            }
        }

        Ok(CycleReport { saved_at, uploads })
    }

    /// Writes the current canvas and record to their save paths.
    pub async fn save_local(&self) -> Result<DateTime<Utc>, PublishError> {
        let canvas = self.source.canvas_snapshot()?;
        write_snapshot(&self.targets.canvas, &canvas).await?;

        if let (Some(path), Some(record)) = (&self.targets.record, self.source.record_snapshot()) {
            write_snapshot(path, &record?).await?;
        }

        Ok(Utc::now())
    }
}

async fn write_snapshot(path: &Path, bytes: &[u8]) -> Result<(), PublishError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| PublishError::LocalWrite {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucket::{object_key, test_utils::FakeRemote, StatusCode};
    use canvas::{blank_canvas, blank_record, decode_canvas, decode_record, AccessControl, Board};
    use image::Rgba;
    use structures::{Dimensions, Whitelist};

    fn board(access: bool) -> Arc<Board> {
        let dimensions = Dimensions::new(4, 4);
        let access = access.then(|| AccessControl {
            whitelist: Whitelist::default(),
            record: blank_record(dimensions),
        });
        Arc::new(Board::new(blank_canvas(dimensions), 64, access).unwrap())
    }

    fn targets(dir: &Path, record: bool) -> SnapshotTargets {
        SnapshotTargets {
            canvas: dir.join("place.png"),
            record: record.then(|| dir.join("record.png")),
        }
    }

    #[tokio::test]
    async fn local_only_cycle_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let board = board(true);
        board.paint(1, 2, [0x81, 0x1e, 0x9f, 0xff]);
        let publisher = SnapshotPublisher::new(
            board,
            None,
            targets(dir.path(), true),
            Duration::from_secs(1),
        );

        let report = publisher.publish_once().await.unwrap();

        assert!(report.uploads.is_empty());
        let canvas = decode_canvas(&std::fs::read(dir.path().join("place.png")).unwrap()).unwrap();
        assert_eq!(canvas.get_pixel(1, 2), &Rgba([0x81, 0x1e, 0x9f, 0xff]));
        let record = decode_record(&std::fs::read(dir.path().join("record.png")).unwrap()).unwrap();
        assert_eq!(record, blank_record(Dimensions::new(4, 4)));
    }

    #[tokio::test]
    async fn record_is_uploaded_before_canvas() {
        let remote = FakeRemote::start().await;
        let dir = tempfile::tempdir().unwrap();
        let targets = targets(dir.path(), true);
        let publisher = SnapshotPublisher::new(
            board(true),
            Some(remote.client()),
            targets.clone(),
            Duration::from_secs(1),
        );

        let report = publisher.publish_once().await.unwrap();

        let keys: Vec<_> = remote.uploads().into_iter().map(|u| u.key).collect();
        assert_eq!(
            keys,
            vec![
                object_key(targets.record.as_ref().unwrap()),
                object_key(&targets.canvas)
            ]
        );
        assert!(report.uploads.iter().all(|u| u.outcome.is_stored()));
        // each upload logs in on its own
        assert_eq!(remote.login_count(), 2);

        // the record object holds record bytes, not the canvas
        let record_object = remote
            .object(&object_key(targets.record.as_ref().unwrap()))
            .unwrap();
        assert_eq!(
            record_object,
            std::fs::read(targets.record.as_ref().unwrap()).unwrap()
        );
        assert!(decode_record(&record_object).is_ok());
    }

    #[tokio::test]
    async fn local_writes_finish_before_uploads_start() {
        let remote = FakeRemote::start().await;
        let dir = tempfile::tempdir().unwrap();
        let targets = targets(dir.path(), false);
        let publisher = SnapshotPublisher::new(
            board(false),
            Some(remote.client()),
            targets.clone(),
            Duration::from_secs(1),
        );

        let report = publisher.publish_once().await.unwrap();

        let modified: DateTime<Utc> = std::fs::metadata(&targets.canvas)
            .unwrap()
            .modified()
            .unwrap()
            .into();
        let upload = &report.uploads[0];
        assert!(modified <= upload.attempted_at);
        assert!(report.saved_at <= upload.attempted_at);
        assert!(upload.attempted_at <= remote.uploads()[0].received_at);
    }

    #[tokio::test]
    async fn rejected_uploads_do_not_fail_the_cycle() {
        let remote = FakeRemote::start().await;
        remote.reject_uploads(Some(StatusCode::SERVICE_UNAVAILABLE));
        let dir = tempfile::tempdir().unwrap();
        let publisher = SnapshotPublisher::new(
            board(true),
            Some(remote.client()),
            targets(dir.path(), true),
            Duration::from_secs(1),
        );

        let report = publisher.publish_once().await.unwrap();

        assert_eq!(report.uploads.len(), 2);
        assert!(report.uploads.iter().all(|u| !u.outcome.is_stored()));
        assert!(dir.path().join("place.png").exists());
    }

    #[tokio::test]
    async fn failed_login_stops_the_publisher() {
        let remote = FakeRemote::start().await;
        remote.reject_logins(true);
        let dir = tempfile::tempdir().unwrap();
        let publisher = SnapshotPublisher::new(
            board(false),
            Some(remote.client()),
            targets(dir.path(), false),
            Duration::from_secs(1),
        );

        let err = publisher
            .run(CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            PublishError::Remote(err) => assert!(err.is_login_failure()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unwritable_save_path_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = SnapshotPublisher::new(
            board(false),
            None,
            SnapshotTargets {
                canvas: dir.path().join("missing-dir/place.png"),
                record: None,
            },
            Duration::from_secs(1),
        );

        let err = publisher.publish_once().await.unwrap_err();
        assert!(matches!(err, PublishError::LocalWrite { .. }));
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = SnapshotPublisher::new(
            board(false),
            None,
            targets(dir.path(), false),
            Duration::from_secs(3600),
        );
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let publisher = publisher.clone();
            let cancel = cancel.clone();
            async move { publisher.run(cancel).await }
        });

        // the first cycle runs immediately
        for _ in 0..100 {
            if dir.path().join("place.png").exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(dir.path().join("place.png").exists());
    }

    #[tokio::test]
    async fn cycles_repeat_on_the_interval() {
        let remote = FakeRemote::start().await;
        let dir = tempfile::tempdir().unwrap();
        let publisher = SnapshotPublisher::new(
            board(false),
            Some(remote.client()),
            targets(dir.path(), false),
            Duration::from_millis(50),
        );
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let publisher = publisher.clone();
            let cancel = cancel.clone();
            async move { publisher.run(cancel).await }
        });

        for _ in 0..200 {
            if remote.uploads().len() >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert!(remote.uploads().len() >= 3);
    }
}
