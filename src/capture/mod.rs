//! Frame Capture Protocol
//!
//! Per-output state machine for one wlr-screencopy exchange.
//!
//! # Overview
//!
//! The compositor describes a frame with a burst of events, then waits for
//! the client to attach a buffer and ask for the copy:
//!
//! ```text
//! Requested ──buffer/linux_dmabuf──> FormatKnown ──buffer_done──> BufferBound
//!     │                                   │                          │
//!     └───────────── failed ──────────────┴──────── failed ──────────┤
//!                                                                    │
//!             BufferBound(awaiting import) ──created──> BufferBound ─┤
//!                        │                                           │
//!                        └──── import failed ────> Failed       ready│
//!                                                                    v
//!                                                                CopyDone
//! ```
//!
//! Backends translate protocol callbacks into [`FrameEvent`] values and feed
//! them to [`FrameCapture::handle`]. The returned [`CaptureAction`] tells the
//! session what to do next (allocate a buffer, issue the copy, sample the
//! result). Every event that is not legal in the current state is a match
//! arm, so out-of-order delivery fails the output instead of being silently
//! absorbed.
//!
//! `CopyDone` and `Failed` are terminal; late events are ignored.

pub mod format;

pub use format::PixelFormat;

use serde::Serialize;
use thiserror::Error;

/// Shared-memory buffer offer (`zwlr_screencopy_frame_v1.buffer`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShmOffer {
    /// `wl_shm` format code
    pub format: u32,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Row stride in bytes
    pub stride: u32,
}

/// dmabuf buffer offer (`zwlr_screencopy_frame_v1.linux_dmabuf`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmabufOffer {
    /// DRM fourcc code
    pub fourcc: u32,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

/// Frame-scoped protocol events, tagged by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    /// Shared-memory format and geometry for this frame
    Buffer(ShmOffer),
    /// GPU format and geometry for this frame
    LinuxDmabuf(DmabufOffer),
    /// Frame flags
    Flags {
        /// Frame is stored bottom-up
        y_invert: bool,
    },
    /// Damage report (only sent for `copy_with_damage`)
    Damage,
    /// All buffer offers for this frame have been sent
    BufferDone,
    /// The compositor imported our GPU buffer
    ImportCreated,
    /// The compositor refused our GPU buffer
    ImportFailed,
    /// The copy landed in our buffer
    Ready,
    /// The compositor gave up on this frame
    Failed,
}

impl FrameEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Buffer(_) => "buffer",
            Self::LinuxDmabuf(_) => "linux_dmabuf",
            Self::Flags { .. } => "flags",
            Self::Damage => "damage",
            Self::BufferDone => "buffer_done",
            Self::ImportCreated => "import_created",
            Self::ImportFailed => "import_failed",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

/// Output-scoped events delivered by a backend dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// Human-readable output name (`wl_output.name`)
    Name(String),
    /// Event for the output's in-flight frame
    Frame(FrameEvent),
}

/// Which buffer transport a frame was captured through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BufferPath {
    /// `wl_shm` pool buffer
    SharedMemory,
    /// GBM buffer object imported through linux-dmabuf
    Gpu,
}

/// Buffer the session must allocate before the copy can be requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationRequest {
    /// Allocate a shared-memory buffer matching the offer
    Shm(ShmOffer),
    /// Allocate a GPU buffer matching the offer
    Gpu(DmabufOffer),
}

impl AllocationRequest {
    /// Transport this request resolves to
    pub fn path(&self) -> BufferPath {
        match self {
            Self::Shm(_) => BufferPath::SharedMemory,
            Self::Gpu(_) => BufferPath::Gpu,
        }
    }
}

/// Why an output's capture ended in `Failed`
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    /// `zwlr_screencopy_frame_v1.failed`
    #[error("compositor reported capture failure")]
    CompositorFailed,

    /// `zwp_linux_buffer_params_v1.failed`
    #[error("compositor rejected the GPU buffer import")]
    ImportRejected,

    /// Local buffer allocation or copy request failed
    #[error("buffer allocation failed")]
    AllocationFailed,

    /// `buffer_done` arrived without an offer we can use
    #[error("no usable buffer format was offered")]
    NoUsableFormat,

    /// The offered pixel format cannot be sampled
    #[error("unsupported pixel format")]
    UnsupportedFormat,

    /// Event arrived in a state where it is not legal
    #[error("unexpected {event} event while {state}")]
    UnexpectedEvent {
        /// Event name
        event: &'static str,
        /// State name
        state: &'static str,
    },

    /// Bounded dispatch wait expired
    #[error("timed out waiting for the compositor")]
    Timeout,

    /// The completed buffer could not be read
    #[error("frame could not be sampled")]
    SampleFailed,
}

/// Capture state of one output's frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Capture requested, no offers yet
    Requested,
    /// At least one offer received
    FormatKnown,
    /// Buffer allocated for the winning offer
    BufferBound {
        /// GPU buffer waiting for the compositor to confirm the import
        awaiting_import: bool,
    },
    /// Copy finished
    CopyDone,
    /// Capture failed
    Failed(FailureReason),
}

impl CaptureState {
    fn name(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::FormatKnown => "format known",
            Self::BufferBound {
                awaiting_import: true,
            } => "awaiting import",
            Self::BufferBound {
                awaiting_import: false,
            } => "buffer bound",
            Self::CopyDone => "copy done",
            Self::Failed(_) => "failed",
        }
    }
}

/// What the session must do after feeding an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureAction {
    /// Nothing to do yet
    None,
    /// Allocate exactly one buffer for this request, then call
    /// [`FrameCapture::allocated`] or [`FrameCapture::fail`]
    Allocate(AllocationRequest),
    /// Issue the copy request against the bound buffer
    Copy,
    /// The buffer holds the frame; sample it
    Completed,
    /// The capture reached `Failed`
    Failed(FailureReason),
}

/// Terminal (or pending) outcome of one output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStatus {
    /// Capture not finished
    Pending,
    /// Capture finished with this brightness
    Done(u8),
    /// Capture failed
    Failed(FailureReason),
}

/// State machine for one capture request
#[derive(Debug, Clone)]
pub struct FrameCapture {
    state: CaptureState,
    shm: Option<ShmOffer>,
    dmabuf: Option<DmabufOffer>,
    path: Option<BufferPath>,
    y_invert: bool,
}

impl FrameCapture {
    /// Start a capture in `Requested`
    pub fn new() -> Self {
        Self {
            state: CaptureState::Requested,
            shm: None,
            dmabuf: None,
            path: None,
            y_invert: false,
        }
    }

    /// Current state
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Transport chosen at `buffer_done`, if any
    pub fn path(&self) -> Option<BufferPath> {
        self.path
    }

    /// Whether the compositor flagged the frame as bottom-up
    pub fn y_invert(&self) -> bool {
        self.y_invert
    }

    /// `CopyDone` or `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, CaptureState::CopyDone | CaptureState::Failed(_))
    }

    /// Feed one event
    ///
    /// `zero_copy` is the session's current willingness to use the GPU path;
    /// it only matters when `buffer_done` picks the transport.
    pub fn handle(&mut self, event: FrameEvent, zero_copy: bool) -> CaptureAction {
        use CaptureState::{BufferBound, CopyDone, Failed, FormatKnown, Requested};

        match (self.state, event) {
            (CopyDone | Failed(_), _) => CaptureAction::None,

            (_, FrameEvent::Flags { y_invert }) => {
                self.y_invert = y_invert;
                CaptureAction::None
            }
            (_, FrameEvent::Damage) => CaptureAction::None,
            (_, FrameEvent::Failed) => self.fail(FailureReason::CompositorFailed),

            (Requested | FormatKnown, FrameEvent::Buffer(offer)) => {
                self.shm = Some(offer);
                self.state = FormatKnown;
                CaptureAction::None
            }
            (Requested | FormatKnown, FrameEvent::LinuxDmabuf(offer)) => {
                self.dmabuf = Some(offer);
                self.state = FormatKnown;
                CaptureAction::None
            }
            (FormatKnown, FrameEvent::BufferDone) => match self.select(zero_copy) {
                Some(request) => {
                    let path = request.path();
                    self.path = Some(path);
                    self.state = BufferBound {
                        awaiting_import: path == BufferPath::Gpu,
                    };
                    CaptureAction::Allocate(request)
                }
                None => self.fail(FailureReason::NoUsableFormat),
            },

            (
                BufferBound {
                    awaiting_import: true,
                },
                FrameEvent::ImportCreated,
            ) => {
                self.state = BufferBound {
                    awaiting_import: false,
                };
                CaptureAction::Copy
            }
            (
                BufferBound {
                    awaiting_import: true,
                },
                FrameEvent::ImportFailed,
            ) => self.fail(FailureReason::ImportRejected),
            (
                BufferBound {
                    awaiting_import: false,
                },
                FrameEvent::Ready,
            ) => {
                self.state = CopyDone;
                CaptureAction::Completed
            }

            (state, event) => self.fail(FailureReason::UnexpectedEvent {
                event: event.name(),
                state: state.name(),
            }),
        }
    }

    /// The buffer requested by [`CaptureAction::Allocate`] exists
    ///
    /// Shared-memory buffers are bound immediately, so the copy can be
    /// issued. GPU buffers wait for the compositor's import confirmation.
    pub fn allocated(&mut self) -> CaptureAction {
        match self.state {
            CaptureState::BufferBound {
                awaiting_import: false,
            } => CaptureAction::Copy,
            _ => CaptureAction::None,
        }
    }

    /// Move to `Failed` unless already terminal
    pub fn fail(&mut self, reason: FailureReason) -> CaptureAction {
        if self.is_terminal() {
            return CaptureAction::None;
        }
        self.state = CaptureState::Failed(reason);
        CaptureAction::Failed(reason)
    }

    /// A dmabuf offer wins when zero-copy is allowed; otherwise fall back to
    /// shared memory whatever the session hoped for.
    fn select(&self, zero_copy: bool) -> Option<AllocationRequest> {
        match (self.dmabuf, self.shm) {
            (Some(offer), _) if zero_copy => Some(AllocationRequest::Gpu(offer)),
            (_, Some(offer)) => Some(AllocationRequest::Shm(offer)),
            _ => None,
        }
    }
}

impl Default for FrameCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHM: ShmOffer = ShmOffer {
        format: 1,
        width: 1920,
        height: 1080,
        stride: 7680,
    };

    const DMABUF: DmabufOffer = DmabufOffer {
        fourcc: format::fourcc(b'X', b'R', b'2', b'4'),
        width: 1920,
        height: 1080,
    };

    #[test]
    fn test_shm_happy_path() {
        let mut capture = FrameCapture::new();
        assert_eq!(capture.state(), CaptureState::Requested);

        assert_eq!(
            capture.handle(FrameEvent::Buffer(SHM), true),
            CaptureAction::None
        );
        assert_eq!(capture.state(), CaptureState::FormatKnown);

        assert_eq!(
            capture.handle(FrameEvent::BufferDone, true),
            CaptureAction::Allocate(AllocationRequest::Shm(SHM))
        );
        assert_eq!(capture.path(), Some(BufferPath::SharedMemory));
        assert_eq!(capture.allocated(), CaptureAction::Copy);

        assert_eq!(
            capture.handle(FrameEvent::Ready, true),
            CaptureAction::Completed
        );
        assert_eq!(capture.state(), CaptureState::CopyDone);
        assert!(capture.is_terminal());
    }

    #[test]
    fn test_dmabuf_takes_priority_when_allowed() {
        let mut capture = FrameCapture::new();
        capture.handle(FrameEvent::Buffer(SHM), true);
        capture.handle(FrameEvent::LinuxDmabuf(DMABUF), true);

        assert_eq!(
            capture.handle(FrameEvent::BufferDone, true),
            CaptureAction::Allocate(AllocationRequest::Gpu(DMABUF))
        );
        assert_eq!(
            capture.state(),
            CaptureState::BufferBound {
                awaiting_import: true
            }
        );
        // No copy until the import is confirmed
        assert_eq!(capture.allocated(), CaptureAction::None);
        assert_eq!(
            capture.handle(FrameEvent::ImportCreated, true),
            CaptureAction::Copy
        );
        assert_eq!(
            capture.handle(FrameEvent::Ready, true),
            CaptureAction::Completed
        );
    }

    #[test]
    fn test_dmabuf_offer_ignored_when_session_is_shm_only() {
        let mut capture = FrameCapture::new();
        capture.handle(FrameEvent::LinuxDmabuf(DMABUF), false);
        capture.handle(FrameEvent::Buffer(SHM), false);

        assert_eq!(
            capture.handle(FrameEvent::BufferDone, false),
            CaptureAction::Allocate(AllocationRequest::Shm(SHM))
        );
    }

    #[test]
    fn test_shm_only_frame_overrides_zero_copy_hint() {
        // Output never offers dmabuf: shm is used even though the session
        // would prefer zero-copy
        let mut capture = FrameCapture::new();
        capture.handle(FrameEvent::Buffer(SHM), true);
        assert_eq!(
            capture.handle(FrameEvent::BufferDone, true),
            CaptureAction::Allocate(AllocationRequest::Shm(SHM))
        );
    }

    #[test]
    fn test_dmabuf_only_offer_without_zero_copy_fails() {
        let mut capture = FrameCapture::new();
        capture.handle(FrameEvent::LinuxDmabuf(DMABUF), false);
        assert_eq!(
            capture.handle(FrameEvent::BufferDone, false),
            CaptureAction::Failed(FailureReason::NoUsableFormat)
        );
    }

    #[test]
    fn test_import_rejection_fails_capture() {
        let mut capture = FrameCapture::new();
        capture.handle(FrameEvent::LinuxDmabuf(DMABUF), true);
        capture.handle(FrameEvent::BufferDone, true);

        assert_eq!(
            capture.handle(FrameEvent::ImportFailed, true),
            CaptureAction::Failed(FailureReason::ImportRejected)
        );
        assert!(capture.is_terminal());
    }

    #[test]
    fn test_compositor_failure_from_any_live_state() {
        for events in [
            vec![],
            vec![FrameEvent::Buffer(SHM)],
            vec![FrameEvent::Buffer(SHM), FrameEvent::BufferDone],
        ] {
            let mut capture = FrameCapture::new();
            for event in events {
                capture.handle(event, true);
            }
            assert_eq!(
                capture.handle(FrameEvent::Failed, true),
                CaptureAction::Failed(FailureReason::CompositorFailed)
            );
        }
    }

    #[test]
    fn test_ready_before_buffer_is_rejected() {
        let mut capture = FrameCapture::new();
        capture.handle(FrameEvent::Buffer(SHM), true);

        let action = capture.handle(FrameEvent::Ready, true);
        assert_eq!(
            action,
            CaptureAction::Failed(FailureReason::UnexpectedEvent {
                event: "ready",
                state: "format known",
            })
        );
    }

    #[test]
    fn test_buffer_done_without_offers_is_rejected() {
        let mut capture = FrameCapture::new();
        assert!(matches!(
            capture.handle(FrameEvent::BufferDone, true),
            CaptureAction::Failed(FailureReason::UnexpectedEvent { .. })
        ));
    }

    #[test]
    fn test_second_buffer_done_does_not_allocate_twice() {
        let mut capture = FrameCapture::new();
        capture.handle(FrameEvent::Buffer(SHM), true);
        capture.handle(FrameEvent::BufferDone, true);

        assert!(matches!(
            capture.handle(FrameEvent::BufferDone, true),
            CaptureAction::Failed(FailureReason::UnexpectedEvent { .. })
        ));
    }

    #[test]
    fn test_terminal_states_ignore_late_events() {
        let mut capture = FrameCapture::new();
        capture.handle(FrameEvent::Failed, true);

        assert_eq!(capture.handle(FrameEvent::Ready, true), CaptureAction::None);
        assert_eq!(
            capture.fail(FailureReason::Timeout),
            CaptureAction::None
        );
        assert_eq!(
            capture.state(),
            CaptureState::Failed(FailureReason::CompositorFailed)
        );
    }

    #[test]
    fn test_flags_and_damage_are_accepted_anywhere() {
        let mut capture = FrameCapture::new();
        assert_eq!(
            capture.handle(FrameEvent::Flags { y_invert: true }, true),
            CaptureAction::None
        );
        assert!(capture.y_invert());
        assert_eq!(capture.handle(FrameEvent::Damage, true), CaptureAction::None);
        assert_eq!(capture.state(), CaptureState::Requested);
    }
}
