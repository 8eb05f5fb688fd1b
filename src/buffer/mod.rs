//! Frame Buffers
//!
//! Backend-neutral view of a buffer the compositor copies a frame into.
//!
//! # Overview
//!
//! A buffer is allocated once per capture, for the offer chosen at
//! `buffer_done`, and lives until the output is captured again or the session
//! closes. Two transports exist:
//!
//! - **Shared memory**: an anonymous file mapped into our address space and
//!   shared with the compositor through a `wl_shm_pool`
//! - **GPU**: a linear GBM buffer object exported as a dmabuf and imported by
//!   the compositor through `zwp_linux_dmabuf_v1`
//!
//! Either way the sampler sees a [`PixelView`]: the raw bytes, their format
//! and the row geometry.
//!
//! Release is tied to `Drop`, so a buffer cannot outlive its output or be
//! released twice.

mod error;
pub mod shm;

pub use error::AllocError;
pub use shm::ShmSegment;

use crate::capture::{BufferPath, DmabufOffer, PixelFormat, ShmOffer};

/// Pixel dimensions and row pitch of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Row stride in bytes
    pub stride: u32,
}

impl FrameGeometry {
    /// Total bytes covered by `height` rows of `stride`
    pub fn byte_size(&self) -> Option<usize> {
        (self.stride as usize).checked_mul(self.height as usize)
    }

    fn validate(&self) -> Result<usize, AllocError> {
        let invalid = || AllocError::InvalidGeometry {
            width: self.width,
            height: self.height,
            stride: self.stride,
        };
        if self.width == 0 || self.height == 0 || self.stride == 0 {
            return Err(invalid());
        }
        self.byte_size().ok_or_else(invalid)
    }
}

/// Borrowed pixels of a completed frame
#[derive(Debug, Clone, Copy)]
pub struct PixelView<'a> {
    /// Buffer contents, `stride * height` bytes or more
    pub data: &'a [u8],
    /// Channel layout
    pub format: PixelFormat,
    /// Row geometry
    pub geometry: FrameGeometry,
}

/// Validated shared-memory allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShmRequest {
    /// `wl_shm` format code to advertise on the buffer
    pub code: u32,
    /// Decoded layout
    pub format: PixelFormat,
    /// Geometry from the offer
    pub geometry: FrameGeometry,
}

impl ShmRequest {
    /// Validate a shared-memory offer
    pub fn from_offer(offer: &ShmOffer) -> Result<Self, AllocError> {
        let format = PixelFormat::from_shm_code(offer.format)
            .ok_or(AllocError::UnsupportedFormat(offer.format))?;
        let geometry = FrameGeometry {
            width: offer.width,
            height: offer.height,
            stride: offer.stride,
        };
        geometry.validate()?;
        Ok(Self {
            code: offer.format,
            format,
            geometry,
        })
    }

    /// Bytes to allocate
    pub fn size(&self) -> usize {
        self.geometry.byte_size().unwrap_or(0)
    }
}

/// Validated GPU allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuRequest {
    /// DRM fourcc
    pub fourcc: u32,
    /// Decoded layout
    pub format: PixelFormat,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl GpuRequest {
    /// Validate a dmabuf offer
    pub fn from_offer(offer: &DmabufOffer) -> Result<Self, AllocError> {
        let format = PixelFormat::from_fourcc(offer.fourcc)
            .ok_or(AllocError::UnsupportedFormat(offer.fourcc))?;
        if offer.width == 0 || offer.height == 0 {
            return Err(AllocError::InvalidGeometry {
                width: offer.width,
                height: offer.height,
                stride: 0,
            });
        }
        Ok(Self {
            fourcc: offer.fourcc,
            format,
            width: offer.width,
            height: offer.height,
        })
    }
}

/// A buffer a backend hands to the compositor for one copy
pub trait FrameBuffer {
    /// Transport backing this buffer
    fn path(&self) -> BufferPath;

    /// Geometry of the pixels as they will be read
    fn geometry(&self) -> FrameGeometry;

    /// Run `f` over the buffer contents
    ///
    /// GPU buffers are mapped for the duration of the call.
    fn with_pixels<R>(&self, f: impl FnOnce(PixelView<'_>) -> R) -> Result<R, AllocError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::format::fourcc;

    #[test]
    fn test_shm_request_from_offer() {
        let request = ShmRequest::from_offer(&ShmOffer {
            format: 1,
            width: 4,
            height: 2,
            stride: 20,
        })
        .unwrap();

        assert_eq!(request.format, PixelFormat::Xrgb8888);
        assert_eq!(request.size(), 40);
    }

    #[test]
    fn test_shm_request_rejects_zero_geometry() {
        let result = ShmRequest::from_offer(&ShmOffer {
            format: 1,
            width: 0,
            height: 2,
            stride: 0,
        });
        assert!(matches!(result, Err(AllocError::InvalidGeometry { .. })));
    }

    #[test]
    fn test_requests_reject_unknown_formats() {
        let nv12 = fourcc(b'N', b'V', b'1', b'2');
        assert!(matches!(
            ShmRequest::from_offer(&ShmOffer {
                format: nv12,
                width: 1,
                height: 1,
                stride: 4,
            }),
            Err(AllocError::UnsupportedFormat(code)) if code == nv12
        ));
        assert!(matches!(
            GpuRequest::from_offer(&DmabufOffer {
                fourcc: nv12,
                width: 1,
                height: 1,
            }),
            Err(AllocError::UnsupportedFormat(_))
        ));
    }
}
