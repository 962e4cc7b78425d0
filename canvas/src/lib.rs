mod board;
mod bootstrap;
mod codec;
mod constants;
mod errors;

pub use crate::board::{AccessControl, Board, SnapshotSource};
pub use crate::bootstrap::Bootstrapper;
pub use crate::codec::{
    blank_canvas, blank_record, decode_canvas, decode_record, dimensions_of, encode_canvas,
    encode_record, RecordImage,
};
pub use crate::errors::CanvasError;
