//! Capture Path Negotiation
//!
//! Decides, once per session, whether zero-copy capture is worth attempting.
//!
//! # Policy
//!
//! Zero-copy is attempted when the compositor advertises linux-dmabuf and a
//! GPU render node can be found and opened. Every GPU-side failure is a soft
//! downgrade to shared memory, and later GPU failures during capture
//! (rejected import, failed allocation) downgrade the same way. Downgrades
//! never go back up within a run.
//!
//! The path chosen here is only a hint: each frame's offers decide what is
//! actually used for that output.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::BrightnessError;
use crate::session::{Capabilities, Compositor};

/// Session-wide capture path preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CapturePath {
    /// Use GPU buffers when a frame offers them
    AttemptZeroCopy,
    /// Always use shared memory
    SharedMemoryOnly,
}

/// Session-scoped negotiation state
#[derive(Debug, Clone)]
pub struct Negotiator {
    path: CapturePath,
    dri_dir: PathBuf,
}

impl Negotiator {
    /// Start negotiation
    ///
    /// `zero_copy = false` pins the session to shared memory up front.
    pub fn new(zero_copy: bool, dri_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: if zero_copy {
                CapturePath::AttemptZeroCopy
            } else {
                CapturePath::SharedMemoryOnly
            },
            dri_dir: dri_dir.into(),
        }
    }

    /// Current preference
    pub fn path(&self) -> CapturePath {
        self.path
    }

    /// Fall back to shared memory for the rest of the run
    pub fn downgrade(&mut self, reason: &dyn std::fmt::Display) {
        if self.path == CapturePath::AttemptZeroCopy {
            warn!("Zero-copy capture disabled for this session: {}", reason);
            self.path = CapturePath::SharedMemoryOnly;
        }
    }

    /// Resolve the path against the advertised capabilities
    ///
    /// Returns the opened GPU device when zero-copy survives. Fails only if
    /// shared memory ends up being the sole option and `wl_shm` is absent.
    pub fn resolve<B: Compositor>(
        &mut self,
        capabilities: &Capabilities,
        backend: &mut B,
    ) -> Result<Option<B::Device>, BrightnessError> {
        let device = if self.path == CapturePath::AttemptZeroCopy {
            self.open_device(capabilities, backend)
        } else {
            debug!("Zero-copy disabled by configuration");
            None
        };

        if self.path == CapturePath::SharedMemoryOnly && !capabilities.shm {
            return Err(BrightnessError::MissingProtocol("wl_shm"));
        }

        info!("Capture path: {:?}", self.path);
        Ok(device)
    }

    fn open_device<B: Compositor>(
        &mut self,
        capabilities: &Capabilities,
        backend: &mut B,
    ) -> Option<B::Device> {
        if !capabilities.zero_copy {
            self.downgrade(&"compositor does not advertise zwp_linux_dmabuf_v1");
            return None;
        }

        let node = match find_render_node(&self.dri_dir) {
            Ok(Some(node)) => node,
            Ok(None) => {
                let reason = format!("no render node in {}", self.dri_dir.display());
                self.downgrade(&reason);
                return None;
            }
            Err(e) => {
                let reason = format!("cannot read {}: {}", self.dri_dir.display(), e);
                self.downgrade(&reason);
                return None;
            }
        };

        match backend.open_device(&node) {
            Ok(device) => {
                info!("Using render node {}", node.display());
                Some(device)
            }
            Err(e) => {
                self.downgrade(&e);
                None
            }
        }
    }
}

/// First `renderD*` entry of `dri_dir`, in name order
pub fn find_render_node(dri_dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut nodes = Vec::new();
    for entry in fs::read_dir(dri_dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with("renderD") {
            nodes.push(entry.path());
        }
    }
    nodes.sort();
    Ok(nodes.into_iter().next())
}
