use std::path::PathBuf;

use bucket::BucketError;
use structures::Dimensions;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("could not decode {path:?} as png: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("could not encode snapshot: {0}")]
    Encode(#[source] image::ImageError),

    #[error("could not read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("canvas is {canvas:?} but record is {record:?}")]
    DimensionMismatch {
        canvas: Dimensions,
        record: Dimensions,
    },

    #[error(transparent)]
    Remote(#[from] BucketError),
}
