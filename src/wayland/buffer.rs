//! Wayland frame buffers
//!
//! A [`WaylandBuffer`] owns the remote `wl_buffer` and the local memory
//! behind it. Dropping it destroys the remote object first, then unmaps the
//! segment or frees the GBM buffer object.

use std::fs::File;

use gbm::BufferObject;
use wayland_client::protocol::wl_buffer::WlBuffer;

use crate::buffer::{
    AllocError, FrameBuffer, FrameGeometry, GpuRequest, PixelView, ShmRequest, ShmSegment,
};
use crate::capture::{BufferPath, PixelFormat};

/// GBM allocator on an opened render node
pub struct GbmDevice(pub(super) gbm::Device<File>);

impl std::fmt::Debug for GbmDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GbmDevice").finish_non_exhaustive()
    }
}

enum Memory {
    Shm(ShmSegment),
    Gpu(BufferObject<()>),
}

/// Frame buffer shared with the compositor
pub struct WaylandBuffer {
    /// `None` while a GPU import is still pending
    pub(super) remote: Option<WlBuffer>,
    memory: Memory,
    format: PixelFormat,
    geometry: FrameGeometry,
}

impl WaylandBuffer {
    pub(super) fn shm(remote: WlBuffer, segment: ShmSegment, request: &ShmRequest) -> Self {
        Self {
            remote: Some(remote),
            memory: Memory::Shm(segment),
            format: request.format,
            geometry: request.geometry,
        }
    }

    pub(super) fn gpu(bo: BufferObject<()>, request: &GpuRequest) -> Self {
        let geometry = FrameGeometry {
            width: request.width,
            height: request.height,
            stride: bo.stride(),
        };
        Self {
            remote: None,
            memory: Memory::Gpu(bo),
            format: request.format,
            geometry,
        }
    }
}

impl FrameBuffer for WaylandBuffer {
    fn path(&self) -> BufferPath {
        match self.memory {
            Memory::Shm(_) => BufferPath::SharedMemory,
            Memory::Gpu(_) => BufferPath::Gpu,
        }
    }

    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn with_pixels<R>(&self, f: impl FnOnce(PixelView<'_>) -> R) -> Result<R, AllocError> {
        match &self.memory {
            Memory::Shm(segment) => Ok(f(PixelView {
                data: segment.as_slice(),
                format: self.format,
                geometry: self.geometry,
            })),
            Memory::Gpu(bo) => {
                let FrameGeometry { width, height, .. } = self.geometry;
                bo.map(0, 0, width, height, |mapped| {
                    f(PixelView {
                        data: mapped.buffer(),
                        format: self.format,
                        geometry: FrameGeometry {
                            width,
                            height,
                            stride: mapped.stride(),
                        },
                    })
                })
                .map_err(AllocError::GpuMap)
            }
        }
    }
}

impl Drop for WaylandBuffer {
    fn drop(&mut self) {
        if let Some(remote) = self.remote.take() {
            remote.destroy();
        }
    }
}
