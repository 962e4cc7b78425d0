use std::sync::{Mutex, MutexGuard, PoisonError};

use image::{Rgba, RgbaImage};
use structures::{Dimensions, Whitelist};

use crate::{
    codec::{dimensions_of, encode_canvas, encode_record, RecordImage},
    errors::CanvasError,
};

/// Point-in-time encoded snapshots of the live canvas.
///
/// Each call must return one consistent picture, never bytes from a raster
/// that changed halfway through encoding.
pub trait SnapshotSource: Send + Sync {
    fn canvas_snapshot(&self) -> Result<Vec<u8>, CanvasError>;

    /// `None` when access control is disabled and there is no record.
    fn record_snapshot(&self) -> Option<Result<Vec<u8>, CanvasError>>;
}

/// State that only exists when access control is enabled.
pub struct AccessControl {
    pub whitelist: Whitelist,
    pub record: RecordImage,
}

struct Rasters {
    canvas: RgbaImage,
    record: Option<RecordImage>,
}

/// In-memory canvas shared between the HTTP shell and the snapshot publisher.
pub struct Board {
    rasters: Mutex<Rasters>,
    whitelist: Option<Whitelist>,
    dimensions: Dimensions,
    max_connections: usize,
}

impl Board {
    pub fn new(
        canvas: RgbaImage,
        max_connections: usize,
        access: Option<AccessControl>,
    ) -> Result<Self, CanvasError> {
        let dimensions = dimensions_of(&canvas);

        let (whitelist, record) = match access {
            Some(AccessControl { whitelist, record }) => {
                let record_dimensions = dimensions_of(&record);
                if record_dimensions != dimensions {
                    return Err(CanvasError::DimensionMismatch {
                        canvas: dimensions,
                        record: record_dimensions,
                    });
                }
                (Some(whitelist), Some(record))
            }
            None => (None, None),
        };

        Ok(Board {
            rasters: Mutex::new(Rasters { canvas, record }),
            whitelist,
            dimensions,
            max_connections,
        })
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn access_control_enabled(&self) -> bool {
        self.whitelist.is_some()
    }

    pub fn quota(&self, identity: &str) -> Option<u16> {
        self.whitelist.as_ref()?.quota(identity)
    }

    /// Sets one pixel. Returns false when the coordinates are off the canvas.
    pub fn paint(&self, x: u32, y: u32, color: [u8; 4]) -> bool {
        if x >= self.dimensions.width || y >= self.dimensions.height {
            return false;
        }
        self.lock().canvas.put_pixel(x, y, Rgba(color));
        true
    }

    fn lock(&self) -> MutexGuard<'_, Rasters> {
        self.rasters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SnapshotSource for Board {
    fn canvas_snapshot(&self) -> Result<Vec<u8>, CanvasError> {
        encode_canvas(&self.lock().canvas)
    }

    fn record_snapshot(&self) -> Option<Result<Vec<u8>, CanvasError>> {
        let rasters = self.lock();
        rasters.record.as_ref().map(encode_record)
    }
}
