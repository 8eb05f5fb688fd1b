//! Compositor backend seam
//!
//! [`Session`](super::Session) drives negotiation, the per-output state
//! machine and teardown; a [`Compositor`] owns the connection and the
//! protocol objects. The production implementation is
//! [`WaylandCompositor`](crate::wayland::WaylandCompositor).

use std::path::Path;
use std::time::Duration;

use crate::buffer::{AllocError, FrameBuffer, GpuRequest, ShmRequest};
use crate::capture::OutputEvent;
use crate::error::{BrightnessError, DispatchError};

/// Globals relevant to capture, as advertised by the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// `wl_shm` is bound
    pub shm: bool,
    /// `zwp_linux_dmabuf_v1` is bound
    pub zero_copy: bool,
    /// `zwlr_screencopy_manager_v1` is bound
    pub screencopy: bool,
}

/// Result of the registry round-trip
#[derive(Debug)]
pub struct Discovery<H> {
    /// Capability flags
    pub capabilities: Capabilities,
    /// Output handles in advertisement order
    pub outputs: Vec<H>,
}

/// Protocol transport for one compositor connection
///
/// Outputs are addressed by their index in the discovery order; events come
/// back tagged with the same index.
pub trait Compositor: Sized {
    /// Bound output
    type OutputHandle;
    /// In-flight capture request
    type Frame;
    /// GPU allocator context
    type Device;
    /// Buffer handed to the compositor for a copy
    type Buffer: FrameBuffer;

    /// Open the control channel at `address`
    fn connect(address: &str) -> Result<Self, BrightnessError>;

    /// One registry round-trip
    fn discover(&mut self) -> Result<Discovery<Self::OutputHandle>, BrightnessError>;

    /// Open a render node and create an allocator on it
    fn open_device(&mut self, render_node: &Path) -> Result<Self::Device, AllocError>;

    /// Request a capture of `output`'s current frame
    fn capture_output(
        &mut self,
        index: usize,
        output: &Self::OutputHandle,
        overlay_cursor: bool,
    ) -> Result<Self::Frame, BrightnessError>;

    /// Block until events arrive, or `timeout` expires
    ///
    /// `None` waits indefinitely.
    fn dispatch(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Vec<(usize, OutputEvent)>, DispatchError>;

    /// Shared-memory buffer for output `index`
    fn allocate_shm(
        &mut self,
        index: usize,
        request: &ShmRequest,
    ) -> Result<Self::Buffer, AllocError>;

    /// GPU buffer for output `index`
    ///
    /// The import is asynchronous: the outcome arrives as an
    /// `ImportCreated`/`ImportFailed` event for the same index.
    fn allocate_gpu(
        &mut self,
        index: usize,
        device: &Self::Device,
        request: &GpuRequest,
    ) -> Result<Self::Buffer, AllocError>;

    /// Ask the compositor to copy the frame into `buffer`
    fn copy(
        &mut self,
        index: usize,
        frame: &Self::Frame,
        buffer: &mut Self::Buffer,
    ) -> Result<(), AllocError>;

    /// Destroy a capture request
    fn release_frame(&mut self, frame: Self::Frame);

    /// Release a bound output
    fn release_output(&mut self, output: Self::OutputHandle);

    /// Release remaining globals and flush the connection
    fn close(&mut self);
}
