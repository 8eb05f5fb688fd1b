//! Buffer allocation errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while allocating, exporting or mapping a frame buffer
#[derive(Error, Debug)]
pub enum AllocError {
    /// Anonymous memory file could not be created
    #[error("failed to create anonymous memory file: {0}")]
    AnonymousFile(#[source] io::Error),

    /// Anonymous memory file could not be sized
    #[error("failed to size shared memory to {size} bytes: {source}")]
    Resize {
        /// Requested size
        size: usize,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Shared memory could not be mapped
    #[error("failed to map shared memory: {0}")]
    Map(#[source] io::Error),

    /// Offer geometry is zero or overflows
    #[error("invalid frame geometry {width}x{height} (stride {stride})")]
    InvalidGeometry {
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
        /// Stride in bytes
        stride: u32,
    },

    /// Shared-memory path selected but `wl_shm` is not bound
    #[error("wl_shm is not available")]
    MissingShm,

    /// Offered format cannot be sampled
    #[error("unsupported pixel format 0x{0:08x}")]
    UnsupportedFormat(u32),

    /// Fourcc is not known to the GPU allocator
    #[error("fourcc 0x{0:08x} is not supported by the GPU allocator")]
    UnsupportedFourcc(u32),

    /// Render node could not be opened
    #[error("failed to open render node {path}: {source}")]
    Device {
        /// Render node path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Buffer object allocation failed
    #[error("failed to allocate GPU buffer object: {0}")]
    BufferObject(#[source] io::Error),

    /// Buffer object could not be exported as a dmabuf
    #[error("failed to export GPU buffer: {0}")]
    Export(String),

    /// Buffer object could not be mapped for reading
    #[error("failed to map GPU buffer: {0}")]
    GpuMap(#[source] io::Error),

    /// Copy requested before the compositor created the imported buffer
    #[error("GPU buffer import has not completed")]
    ImportPending,
}

impl AllocError {
    /// Build a [`AllocError::Device`] error
    pub fn device(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Device {
            path: path.into(),
            source,
        }
    }
}
