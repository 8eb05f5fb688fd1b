//! Display Session
//!
//! One compositor connection, driven synchronously from discovery to
//! teardown.
//!
//! # Overview
//!
//! ```text
//! open ──> discover ──> negotiate ──> capture output 0 ──> ... ──> aggregate
//!                                          │                          │
//!                                          └── run_until(settled) ────┘
//!                                                                     │
//!                                                              close (always)
//! ```
//!
//! Outputs are captured strictly one after another. Each capture is fed
//! through its own [`FrameCapture`] state machine; failures stay with the
//! output and the run carries on. Connection, capability and "no outputs"
//! errors end the run. Every exit path closes the session, and closing twice
//! is a no-op.

mod backend;

pub use backend::{Capabilities, Compositor, Discovery};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::brightness;
use crate::buffer::{AllocError, FrameBuffer, GpuRequest, ShmRequest};
use crate::capture::{
    AllocationRequest, BufferPath, CaptureAction, FailureReason, FrameCapture, OutputEvent,
    OutputStatus,
};
use crate::config::CaptureConfig;
use crate::error::{BrightnessError, DispatchError, Result};
use crate::negotiate::{CapturePath, Negotiator};
use crate::wayland::WaylandCompositor;

/// Connection address for a compositor session: `<socket_dir>/<session_id>`
pub fn socket_address(socket_dir: &str, session_id: &str) -> String {
    format!("{}/{}", socket_dir, session_id)
}

/// Average brightness of every output of a wlroots session, `0..=255`
///
/// Uses the default capture configuration: zero-copy when possible, no
/// cursor, unbounded waits.
pub fn compute_ambient_brightness(session_id: &str, socket_dir: &str) -> Result<u8> {
    measure::<WaylandCompositor>(session_id, socket_dir, &CaptureConfig::default())
        .map(|report| report.brightness)
}

/// Open, measure and close a session on backend `B`
pub fn measure<B: Compositor>(
    session_id: &str,
    socket_dir: &str,
    config: &CaptureConfig,
) -> Result<BrightnessReport> {
    let address = socket_address(socket_dir, session_id);
    let mut session = Session::<B>::open(&address, config)?;
    let result = session.measure();
    session.close();
    result
}

/// Per-output line of a [`BrightnessReport`]
#[derive(Debug, Clone, Serialize)]
pub struct OutputReport {
    /// Discovery index
    pub index: usize,
    /// Compositor-provided name, if any
    pub name: Option<String>,
    /// Transport used for the last capture
    pub path: Option<BufferPath>,
    /// Outcome
    pub status: OutputStatus,
}

/// Result of a successful measurement
#[derive(Debug, Clone, Serialize)]
pub struct BrightnessReport {
    /// Aggregate brightness, `0..=255`
    pub brightness: u8,
    /// Session path preference at the end of the run
    pub path: CapturePath,
    /// Every discovered output
    pub outputs: Vec<OutputReport>,
}

/// One discovered output and its capture resources
pub struct Output<B: Compositor> {
    index: usize,
    handle: Option<B::OutputHandle>,
    name: Option<String>,
    frame: Option<B::Frame>,
    capture: Option<FrameCapture>,
    buffer: Option<B::Buffer>,
    status: OutputStatus,
}

impl<B: Compositor> Output<B> {
    fn new(index: usize, handle: B::OutputHandle) -> Self {
        Self {
            index,
            handle: Some(handle),
            name: None,
            frame: None,
            capture: None,
            buffer: None,
            status: OutputStatus::Pending,
        }
    }

    /// Discovery index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Compositor-provided name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Outcome of the last capture
    pub fn status(&self) -> OutputStatus {
        self.status
    }

    /// Transport chosen for the last capture
    pub fn path(&self) -> Option<BufferPath> {
        self.capture.as_ref().and_then(FrameCapture::path)
    }

    fn is_settled(&self) -> bool {
        self.status != OutputStatus::Pending
    }

    fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("#{}", self.index),
        }
    }
}

/// A connected compositor session
pub struct Session<B: Compositor> {
    backend: B,
    capabilities: Capabilities,
    negotiator: Negotiator,
    device: Option<B::Device>,
    outputs: Vec<Output<B>>,
    config: CaptureConfig,
    closed: bool,
}

impl<B: Compositor> Session<B> {
    /// Connect to the compositor at `address`
    pub fn open(address: &str, config: &CaptureConfig) -> Result<Self> {
        let backend = B::connect(address)?;
        info!("Connected to compositor at {}", address);

        Ok(Self {
            backend,
            capabilities: Capabilities::default(),
            negotiator: Negotiator::new(config.zero_copy, config.dri_dir.clone()),
            device: None,
            outputs: Vec::new(),
            config: config.clone(),
            closed: false,
        })
    }

    /// Registry round-trip: capability flags and outputs
    pub fn discover(&mut self) -> Result<()> {
        let discovery = self.backend.discover()?;
        self.capabilities = discovery.capabilities;
        self.outputs = discovery
            .outputs
            .into_iter()
            .enumerate()
            .map(|(index, handle)| Output::new(index, handle))
            .collect();

        debug!(
            "Discovered {} output(s), capabilities {:?}",
            self.outputs.len(),
            self.capabilities
        );
        Ok(())
    }

    /// Discover, negotiate, capture every output and aggregate
    pub fn measure(&mut self) -> Result<BrightnessReport> {
        self.discover()?;

        if !self.capabilities.screencopy {
            return Err(BrightnessError::MissingProtocol(
                "zwlr_screencopy_manager_v1",
            ));
        }

        self.device = self
            .negotiator
            .resolve(&self.capabilities, &mut self.backend)?;

        if self.outputs.is_empty() {
            return Err(BrightnessError::NoOutputs);
        }

        for index in 0..self.outputs.len() {
            self.capture(index)?;
        }

        self.report()
    }

    /// Capture one output, driving its state machine to a terminal state
    ///
    /// Output-scoped failures (including an expired dispatch timeout) are
    /// recorded on the output. Only connection-level errors are returned.
    pub fn capture(&mut self, index: usize) -> Result<OutputStatus> {
        self.reset(index);

        let Some(output) = self.outputs.get_mut(index) else {
            return Err(BrightnessError::Protocol(format!("no output #{}", index)));
        };
        let Some(handle) = output.handle.as_ref() else {
            return Err(BrightnessError::Protocol(format!(
                "output #{} already released",
                index
            )));
        };

        let frame = self
            .backend
            .capture_output(index, handle, self.config.overlay_cursor)?;
        output.frame = Some(frame);
        output.capture = Some(FrameCapture::new());
        debug!("Capture requested for output {}", output.label());

        match self.run_until(|session| session.outputs[index].is_settled()) {
            Ok(()) => {}
            Err(DispatchError::Timeout(waited)) => {
                warn!(
                    "Output {} did not finish within {:?}",
                    self.outputs[index].label(),
                    waited
                );
                let action = match self.outputs[index].capture.as_mut() {
                    Some(capture) => capture.fail(FailureReason::Timeout),
                    None => CaptureAction::Failed(FailureReason::Timeout),
                };
                self.perform(index, action);
            }
            Err(e) => return Err(e.into()),
        }

        let output = &mut self.outputs[index];
        if let Some(frame) = output.frame.take() {
            self.backend.release_frame(frame);
        }
        Ok(output.status)
    }

    /// Dispatch events until `predicate` holds
    pub fn run_until(
        &mut self,
        mut predicate: impl FnMut(&Self) -> bool,
    ) -> std::result::Result<(), DispatchError> {
        let timeout = self.config.dispatch_timeout();
        while !predicate(self) {
            for (index, event) in self.backend.dispatch(timeout)? {
                self.apply(index, event);
            }
        }
        Ok(())
    }

    /// Session path preference
    pub fn capture_path(&self) -> CapturePath {
        self.negotiator.path()
    }

    /// Capabilities seen at discovery
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Discovered outputs
    pub fn outputs(&self) -> &[Output<B>] {
        &self.outputs
    }

    /// Release every resource; safe to call more than once
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        for output in self.outputs.drain(..) {
            let Output {
                handle,
                frame,
                buffer,
                ..
            } = output;
            drop(buffer);
            if let Some(frame) = frame {
                self.backend.release_frame(frame);
            }
            if let Some(handle) = handle {
                self.backend.release_output(handle);
            }
        }
        self.device = None;
        self.backend.close();
        debug!("Session closed");
    }

    fn report(&self) -> Result<BrightnessReport> {
        let brightness = brightness::aggregate(self.outputs.iter().map(|output| &output.status))
            .map_err(|_| BrightnessError::NoData)?;

        info!(
            "Ambient brightness {} from {} output(s)",
            brightness,
            self.outputs.len()
        );

        Ok(BrightnessReport {
            brightness,
            path: self.negotiator.path(),
            outputs: self
                .outputs
                .iter()
                .map(|output| OutputReport {
                    index: output.index,
                    name: output.name.clone(),
                    path: output.path(),
                    status: output.status,
                })
                .collect(),
        })
    }

    /// Drop the previous capture's buffer and frame before a new request
    fn reset(&mut self, index: usize) {
        let Some(output) = self.outputs.get_mut(index) else {
            return;
        };
        output.buffer = None;
        if let Some(frame) = output.frame.take() {
            self.backend.release_frame(frame);
        }
        output.capture = None;
        output.status = OutputStatus::Pending;
    }

    fn zero_copy_allowed(&self) -> bool {
        self.negotiator.path() == CapturePath::AttemptZeroCopy && self.device.is_some()
    }

    fn apply(&mut self, index: usize, event: OutputEvent) {
        let zero_copy = self.zero_copy_allowed();
        let Some(output) = self.outputs.get_mut(index) else {
            debug!("Dropping event for unknown output #{}: {:?}", index, event);
            return;
        };

        match event {
            OutputEvent::Name(name) => {
                debug!("Output #{} is {}", index, name);
                output.name = Some(name);
            }
            OutputEvent::Frame(event) => {
                let Some(capture) = output.capture.as_mut() else {
                    debug!("Frame event {:?} for idle output #{}", event, index);
                    return;
                };
                debug!("Output #{}: {:?}", index, event);
                let action = capture.handle(event, zero_copy);
                self.perform(index, action);
            }
        }
    }

    fn perform(&mut self, index: usize, mut action: CaptureAction) {
        loop {
            action = match action {
                CaptureAction::None => return,
                CaptureAction::Allocate(request) => self.allocate(index, request),
                CaptureAction::Copy => self.copy(index),
                CaptureAction::Completed => {
                    self.complete(index);
                    return;
                }
                CaptureAction::Failed(reason) => {
                    self.failed(index, reason);
                    return;
                }
            };
        }
    }

    fn allocate(&mut self, index: usize, request: AllocationRequest) -> CaptureAction {
        let result = self.allocate_buffer(index, request);
        let output = &mut self.outputs[index];

        let reason = match result {
            Ok(buffer) => {
                output.buffer = Some(buffer);
                None
            }
            Err(e) => {
                warn!("Buffer allocation for output {} failed: {}", output.label(), e);
                Some(match e {
                    AllocError::UnsupportedFormat(_) => FailureReason::UnsupportedFormat,
                    _ => FailureReason::AllocationFailed,
                })
            }
        };

        match (output.capture.as_mut(), reason) {
            (Some(capture), None) => capture.allocated(),
            (Some(capture), Some(reason)) => capture.fail(reason),
            (None, _) => CaptureAction::None,
        }
    }

    fn allocate_buffer(
        &mut self,
        index: usize,
        request: AllocationRequest,
    ) -> std::result::Result<B::Buffer, AllocError> {
        match request {
            AllocationRequest::Shm(offer) => {
                let request = ShmRequest::from_offer(&offer)?;
                self.backend.allocate_shm(index, &request)
            }
            AllocationRequest::Gpu(offer) => {
                let request = GpuRequest::from_offer(&offer)?;
                match self.device.as_ref() {
                    Some(device) => self.backend.allocate_gpu(index, device, &request),
                    None => Err(AllocError::UnsupportedFourcc(offer.fourcc)),
                }
            }
        }
    }

    fn copy(&mut self, index: usize) -> CaptureAction {
        let output = &mut self.outputs[index];
        let result = match (output.frame.as_ref(), output.buffer.as_mut()) {
            (Some(frame), Some(buffer)) => self.backend.copy(index, frame, buffer),
            _ => Err(AllocError::ImportPending),
        };

        match result {
            Ok(()) => CaptureAction::None,
            Err(e) => {
                warn!("Copy request for output {} failed: {}", output.label(), e);
                match output.capture.as_mut() {
                    Some(capture) => capture.fail(FailureReason::AllocationFailed),
                    None => CaptureAction::None,
                }
            }
        }
    }

    fn complete(&mut self, index: usize) {
        let output = &mut self.outputs[index];
        let sampled = match output.buffer.as_ref() {
            Some(buffer) => buffer
                .with_pixels(|view| brightness::sample(&view))
                .map_err(|e| e.to_string())
                .and_then(|sample| sample.map_err(|e| e.to_string())),
            None => Err("no buffer bound".to_string()),
        };

        output.status = match sampled {
            Ok(value) => {
                debug!("Output {} brightness {}", output.label(), value);
                OutputStatus::Done(value)
            }
            Err(reason) => {
                warn!("Output {} could not be sampled: {}", output.label(), reason);
                OutputStatus::Failed(FailureReason::SampleFailed)
            }
        };
    }

    fn failed(&mut self, index: usize, reason: FailureReason) {
        let output = &mut self.outputs[index];
        output.status = OutputStatus::Failed(reason);
        warn!("Output {} capture failed: {}", output.label(), reason);

        let gpu = output.path() == Some(BufferPath::Gpu);
        if reason == FailureReason::ImportRejected
            || (gpu && reason == FailureReason::AllocationFailed)
        {
            self.negotiator.downgrade(&reason);
        }
    }
}

impl<B: Compositor> Drop for Session<B> {
    fn drop(&mut self) {
        self.close();
    }
}
