//! wlroots Screencopy Backend
//!
//! [`Compositor`] implementation over `wayland-client`.
//!
//! # Protocols
//!
//! - `zwlr_screencopy_manager_v1` (v3+) - per-output frame capture
//! - `wl_shm` - shared-memory buffers
//! - `zwp_linux_dmabuf_v1` - GPU buffer import (zero-copy)
//! - `wl_output` (up to v4) - outputs and their names
//!
//! # Architecture
//!
//! ```text
//! WaylandCompositor
//!   ├─> Connection (UnixStream at <socket_dir>/<display>)
//!   ├─> EventQueue<State>
//!   │   └─> Dispatch impls ──> State::events (tagged OutputEvents)
//!   └─> Buffers
//!       ├─> wl_shm_pool over a memfd mapping
//!       └─> GBM buffer object ──> zwp_linux_buffer_params_v1 ──> wl_buffer
//! ```

mod buffer;
mod dispatch;

pub use buffer::{GbmDevice, WaylandBuffer};

use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use gbm::BufferObjectFlags;
use tracing::{debug, trace};
use wayland_client::backend::WaylandError;
use wayland_client::protocol::{wl_output::WlOutput, wl_registry::WlRegistry, wl_shm};
use wayland_client::{Connection, EventQueue, Proxy};
use wayland_protocols::wp::linux_dmabuf::zv1::client::zwp_linux_buffer_params_v1;
use wayland_protocols_wlr::screencopy::v1::client::zwlr_screencopy_frame_v1::ZwlrScreencopyFrameV1;

use crate::buffer::{AllocError, GpuRequest, ShmRequest, ShmSegment};
use crate::capture::OutputEvent;
use crate::error::{BrightnessError, DispatchError};
use crate::session::{Capabilities, Compositor, Discovery};

use dispatch::State;

/// Connection to a wlroots compositor
pub struct WaylandCompositor {
    connection: Connection,
    queue: EventQueue<State>,
    state: State,
    _registry: WlRegistry,
}

impl WaylandCompositor {
    /// One bounded wait: flush, poll the socket, read and dispatch
    fn dispatch_within(&mut self, timeout: Duration) -> Result<(), DispatchError> {
        self.queue
            .flush()
            .map_err(|e| DispatchError::Connection(e.to_string()))?;
        self.dispatch_pending()?;
        if !self.state.events.is_empty() {
            return Ok(());
        }

        let Some(guard) = self.queue.prepare_read() else {
            return self.dispatch_pending();
        };

        let mut fds = [libc::pollfd {
            fd: guard.connection_fd().as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        }];
        let millis = timeout.as_millis().min(i32::MAX as u128) as i32;

        // SAFETY: `fds` is a valid array of one pollfd for the whole call.
        #[allow(unsafe_code)]
        let ready = unsafe { libc::poll(fds.as_mut_ptr(), 1, millis) };

        match ready {
            0 => return Err(DispatchError::Timeout(timeout)),
            n if n < 0 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    return Ok(());
                }
                return Err(DispatchError::Connection(err.to_string()));
            }
            _ => {}
        }

        match guard.read() {
            Ok(_) => {}
            Err(WaylandError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(DispatchError::Connection(e.to_string())),
        }
        self.dispatch_pending()
    }

    fn dispatch_pending(&mut self) -> Result<(), DispatchError> {
        self.queue
            .dispatch_pending(&mut self.state)
            .map(|_| ())
            .map_err(|e| DispatchError::Connection(e.to_string()))
    }
}

impl Compositor for WaylandCompositor {
    type OutputHandle = WlOutput;
    type Frame = ZwlrScreencopyFrameV1;
    type Device = GbmDevice;
    type Buffer = WaylandBuffer;

    fn connect(address: &str) -> Result<Self, BrightnessError> {
        let stream = UnixStream::connect(address)
            .map_err(|e| BrightnessError::connection(address, e))?;
        let connection =
            Connection::from_socket(stream).map_err(|e| BrightnessError::connection(address, e))?;

        let queue = connection.new_event_queue();
        let registry = connection.display().get_registry(&queue.handle(), ());

        Ok(Self {
            connection,
            queue,
            state: State::default(),
            _registry: registry,
        })
    }

    fn discover(&mut self) -> Result<Discovery<WlOutput>, BrightnessError> {
        // Globals, then the initial events of everything bound from them
        for _ in 0..2 {
            self.queue
                .roundtrip(&mut self.state)
                .map_err(|e| BrightnessError::Protocol(e.to_string()))?;
        }

        let capabilities = Capabilities {
            shm: self.state.shm.is_some(),
            zero_copy: self.state.dmabuf.is_some(),
            screencopy: self.state.screencopy.is_some(),
        };
        debug!(
            "Registry: {} output(s), wl_shm={}, linux-dmabuf={}, screencopy={}",
            self.state.outputs.len(),
            capabilities.shm,
            capabilities.zero_copy,
            capabilities.screencopy
        );

        Ok(Discovery {
            capabilities,
            outputs: std::mem::take(&mut self.state.outputs),
        })
    }

    fn open_device(&mut self, render_node: &Path) -> Result<GbmDevice, AllocError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(render_node)
            .map_err(|e| AllocError::device(render_node, e))?;
        let device = gbm::Device::new(file).map_err(|e| AllocError::device(render_node, e))?;
        Ok(GbmDevice(device))
    }

    fn capture_output(
        &mut self,
        index: usize,
        output: &WlOutput,
        overlay_cursor: bool,
    ) -> Result<ZwlrScreencopyFrameV1, BrightnessError> {
        let manager = self
            .state
            .screencopy
            .as_ref()
            .ok_or(BrightnessError::MissingProtocol("zwlr_screencopy_manager_v1"))?;
        Ok(manager.capture_output(
            i32::from(overlay_cursor),
            output,
            &self.queue.handle(),
            index,
        ))
    }

    fn dispatch(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Vec<(usize, OutputEvent)>, DispatchError> {
        if self.state.events.is_empty() {
            match timeout {
                None => {
                    self.queue
                        .blocking_dispatch(&mut self.state)
                        .map_err(|e| DispatchError::Connection(e.to_string()))?;
                }
                Some(timeout) => self.dispatch_within(timeout)?,
            }
        }
        trace!("Dispatched {} output event(s)", self.state.events.len());
        Ok(std::mem::take(&mut self.state.events))
    }

    fn allocate_shm(
        &mut self,
        _index: usize,
        request: &ShmRequest,
    ) -> Result<WaylandBuffer, AllocError> {
        let shm = self.state.shm.as_ref().ok_or(AllocError::MissingShm)?;
        let format = wl_shm::Format::try_from(request.code)
            .map_err(|_| AllocError::UnsupportedFormat(request.code))?;

        let geometry = request.geometry;
        let invalid = || AllocError::InvalidGeometry {
            width: geometry.width,
            height: geometry.height,
            stride: geometry.stride,
        };
        let size = request.size();
        let pool_size = i32::try_from(size).map_err(|_| invalid())?;
        let width = i32::try_from(geometry.width).map_err(|_| invalid())?;
        let height = i32::try_from(geometry.height).map_err(|_| invalid())?;
        let stride = i32::try_from(geometry.stride).map_err(|_| invalid())?;

        let mut segment = ShmSegment::create(size)?;
        let qh = self.queue.handle();
        let remote = {
            let fd = segment.fd().ok_or(AllocError::MissingShm)?;
            let pool = shm.create_pool(fd, pool_size, &qh, ());
            let remote = pool.create_buffer(0, width, height, stride, format, &qh, ());
            pool.destroy();
            remote
        };
        segment.close_fd();

        Ok(WaylandBuffer::shm(remote, segment, request))
    }

    fn allocate_gpu(
        &mut self,
        index: usize,
        device: &GbmDevice,
        request: &GpuRequest,
    ) -> Result<WaylandBuffer, AllocError> {
        let dmabuf = self
            .state
            .dmabuf
            .as_ref()
            .ok_or_else(|| AllocError::Export("zwp_linux_dmabuf_v1 is not bound".to_string()))?;
        let format = gbm::Format::try_from(request.fourcc)
            .map_err(|_| AllocError::UnsupportedFourcc(request.fourcc))?;

        let bo = device
            .0
            .create_buffer_object::<()>(
                request.width,
                request.height,
                format,
                BufferObjectFlags::LINEAR | BufferObjectFlags::RENDERING,
            )
            .map_err(AllocError::BufferObject)?;

        let fd = bo.fd().map_err(|e| AllocError::Export(e.to_string()))?;
        let modifier = u64::from(bo.modifier());

        if let Some(stale) = self.state.imports.remove(&index) {
            stale.destroy();
        }

        let params = dmabuf.create_params(&self.queue.handle(), index);
        params.add(
            fd.as_fd(),
            0,
            bo.offset(0),
            bo.stride(),
            (modifier >> 32) as u32,
            (modifier & 0xffff_ffff) as u32,
        );
        params.create(
            request.width as i32,
            request.height as i32,
            request.fourcc,
            zwp_linux_buffer_params_v1::Flags::empty(),
        );
        debug!(
            "Output #{}: requested dmabuf import {}x{} {} (modifier 0x{:x})",
            index, request.width, request.height, request.format, modifier
        );

        Ok(WaylandBuffer::gpu(bo, request))
    }

    fn copy(
        &mut self,
        index: usize,
        frame: &ZwlrScreencopyFrameV1,
        buffer: &mut WaylandBuffer,
    ) -> Result<(), AllocError> {
        if buffer.remote.is_none() {
            buffer.remote = Some(
                self.state
                    .imports
                    .remove(&index)
                    .ok_or(AllocError::ImportPending)?,
            );
        }
        let remote = buffer.remote.as_ref().ok_or(AllocError::ImportPending)?;
        frame.copy(remote);
        Ok(())
    }

    fn release_frame(&mut self, frame: ZwlrScreencopyFrameV1) {
        frame.destroy();
    }

    fn release_output(&mut self, output: WlOutput) {
        if output.version() >= 3 {
            output.release();
        }
    }

    fn close(&mut self) {
        for (_, buffer) in self.state.imports.drain() {
            buffer.destroy();
        }
        if let Some(screencopy) = self.state.screencopy.take() {
            screencopy.destroy();
        }
        if let Some(dmabuf) = self.state.dmabuf.take() {
            dmabuf.destroy();
        }
        self.state.shm = None;
        self.state.events.clear();

        if let Err(e) = self.connection.flush() {
            debug!("Flush on close failed: {}", e);
        }
    }
}
