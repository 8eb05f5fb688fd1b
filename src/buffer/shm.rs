//! Anonymous shared memory segments
//!
//! The segment is created with `memfd_create`, sized, and mapped read/write.
//! The file descriptor is only needed until the compositor has a `wl_shm_pool`
//! on it; [`ShmSegment::close_fd`] drops it while the mapping stays valid.

use std::fs::File;
use std::os::fd::{AsFd, BorrowedFd};

use memmap2::{MmapMut, MmapOptions};
use nix::sys::memfd::{memfd_create, MemFdCreateFlag};

use super::AllocError;

/// Memory-mapped anonymous file backing a shared-memory frame buffer
#[derive(Debug)]
pub struct ShmSegment {
    map: MmapMut,
    file: Option<File>,
}

impl ShmSegment {
    /// Create and map a segment of `size` bytes
    pub fn create(size: usize) -> Result<Self, AllocError> {
        let fd = memfd_create(c"lamco-screen-brightness", MemFdCreateFlag::MFD_CLOEXEC)
            .map_err(|errno| AllocError::AnonymousFile(errno.into()))?;
        let file = File::from(fd);

        file.set_len(size as u64)
            .map_err(|source| AllocError::Resize { size, source })?;

        // SAFETY: the file is private to this process until it is handed to
        // the compositor, which only writes to it during a copy we requested.
        #[allow(unsafe_code)]
        let map = unsafe { MmapOptions::new().len(size).map_mut(&file) }
            .map_err(AllocError::Map)?;

        Ok(Self {
            map,
            file: Some(file),
        })
    }

    /// Descriptor to share with the compositor, if still open
    pub fn fd(&self) -> Option<BorrowedFd<'_>> {
        self.file.as_ref().map(|file| file.as_fd())
    }

    /// Close the descriptor, keeping the mapping
    pub fn close_fd(&mut self) {
        self.file = None;
    }

    /// Mapped bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    /// Mapped bytes, writable
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.map
    }

    /// Segment size in bytes
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the segment is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
