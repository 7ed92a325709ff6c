use crate::RectId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid geometry: x={x}, y={y}, w={w}, h={h} (components must be non-negative)")]
    InvalidGeometry { x: i32, y: i32, w: i32, h: i32 },
    #[error("backing store cannot grow past {width}x{height}")]
    CapacityExceeded { width: i32, height: i32 },
    #[error("invalid options: {0}")]
    InvalidOptions(&'static str),
    #[error("no rectangle with id {0:?} is placed")]
    UnknownRect(RectId),
    #[error("packer invariant violated: {0}")]
    Internal(&'static str),
    #[error("gpu error: {0}")]
    Gpu(String),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
