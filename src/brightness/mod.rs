//! Brightness Aggregation
//!
//! Per-output brightness is the mean of `(R + G + B) / 3` over every pixel of
//! the frame. Rows are addressed by stride so allocator padding never leaks
//! into the result. The session result is the truncated mean of the outputs
//! that completed; failed outputs are left out entirely.

use thiserror::Error;

use crate::buffer::PixelView;
use crate::capture::OutputStatus;

/// Errors raised while reading a completed frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SampleError {
    /// Frame has no pixels
    #[error("frame is empty")]
    Empty,

    /// Stride is smaller than one row of pixels
    #[error("stride {stride} is smaller than row size {row_bytes}")]
    StrideTooSmall {
        /// Row stride in bytes
        stride: usize,
        /// Bytes needed for one row of pixels
        row_bytes: usize,
    },

    /// Buffer is shorter than the geometry claims
    #[error("buffer holds {actual} bytes, geometry needs {required}")]
    Truncated {
        /// Bytes required
        required: usize,
        /// Bytes available
        actual: usize,
    },
}

/// No output produced a brightness value
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no output produced a brightness sample")]
pub struct NoData;

/// Mean channel brightness of one frame, `0..=255`
pub fn sample(view: &PixelView<'_>) -> Result<u8, SampleError> {
    let width = view.geometry.width as usize;
    let height = view.geometry.height as usize;
    let stride = view.geometry.stride as usize;
    let bpp = view.format.bytes_per_pixel();

    if width == 0 || height == 0 {
        return Err(SampleError::Empty);
    }

    let row_bytes = width * bpp;
    if stride < row_bytes {
        return Err(SampleError::StrideTooSmall { stride, row_bytes });
    }

    let required = (height - 1) * stride + row_bytes;
    if view.data.len() < required {
        return Err(SampleError::Truncated {
            required,
            actual: view.data.len(),
        });
    }

    let mut total: u64 = 0;
    for row in 0..height {
        let start = row * stride;
        let pixels = &view.data[start..start + row_bytes];
        total += pixels
            .chunks_exact(bpp)
            .map(|pixel| u64::from(view.format.channel_sum(pixel)))
            .sum::<u64>();
    }

    let samples = 3 * (width as u64) * (height as u64);
    Ok((total / samples) as u8)
}

/// Truncated mean of every completed output
pub fn aggregate<'a>(statuses: impl IntoIterator<Item = &'a OutputStatus>) -> Result<u8, NoData> {
    let (sum, count) = statuses
        .into_iter()
        .filter_map(|status| match status {
            OutputStatus::Done(value) => Some(u32::from(*value)),
            _ => None,
        })
        .fold((0u32, 0u32), |(sum, count), value| (sum + value, count + 1));

    if count == 0 {
        return Err(NoData);
    }
    Ok((sum / count) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FrameGeometry;
    use crate::capture::{FailureReason, PixelFormat};
    use proptest::prelude::*;

    fn view(data: &[u8], width: u32, height: u32, stride: u32) -> PixelView<'_> {
        PixelView {
            data,
            format: PixelFormat::Xrgb8888,
            geometry: FrameGeometry {
                width,
                height,
                stride,
            },
        }
    }

    #[test]
    fn test_uniform_boundaries() {
        let black = vec![0u8; 16 * 4];
        assert_eq!(sample(&view(&black, 4, 4, 16)).unwrap(), 0);

        let white = vec![255u8; 16 * 4];
        assert_eq!(sample(&view(&white, 4, 4, 16)).unwrap(), 255);
    }

    #[test]
    fn test_stride_padding_is_ignored() {
        // 2x2 frame, 4 bytes of 0xFF padding after every row
        let mut data = Vec::new();
        for _ in 0..2 {
            data.extend_from_slice(&[100, 100, 100, 0, 100, 100, 100, 0]);
            data.extend_from_slice(&[255; 4]);
        }
        assert_eq!(sample(&view(&data, 2, 2, 12)).unwrap(), 100);
    }

    #[test]
    fn test_last_row_needs_no_padding() {
        let mut data = vec![50u8; 12];
        data.extend_from_slice(&[50; 8]);
        assert_eq!(sample(&view(&data, 2, 2, 12)).unwrap(), 50);
    }

    #[test]
    fn test_mixed_channels_average() {
        // B=0 G=0 R=255 -> proxy 85
        let data = [0u8, 0, 255, 0];
        assert_eq!(sample(&view(&data, 1, 1, 4)).unwrap(), 85);
    }

    #[test]
    fn test_rejects_short_stride_and_buffer() {
        let data = vec![0u8; 64];
        assert!(matches!(
            sample(&view(&data, 4, 2, 8)),
            Err(SampleError::StrideTooSmall { .. })
        ));
        assert!(matches!(
            sample(&view(&data, 4, 8, 16)),
            Err(SampleError::Truncated { .. })
        ));
        assert_eq!(sample(&view(&data, 0, 1, 16)), Err(SampleError::Empty));
    }

    #[test]
    fn test_aggregate_truncates() {
        let statuses = [OutputStatus::Done(10), OutputStatus::Done(11)];
        assert_eq!(aggregate(&statuses), Ok(10));
    }

    #[test]
    fn test_aggregate_excludes_failed_outputs() {
        let statuses = [
            OutputStatus::Done(200),
            OutputStatus::Failed(FailureReason::ImportRejected),
        ];
        assert_eq!(aggregate(&statuses), Ok(200));
    }

    #[test]
    fn test_aggregate_without_survivors() {
        let statuses = [
            OutputStatus::Failed(FailureReason::CompositorFailed),
            OutputStatus::Failed(FailureReason::Timeout),
        ];
        assert_eq!(aggregate(&statuses), Err(NoData));
        assert_eq!(aggregate(&[] as &[OutputStatus]), Err(NoData));
    }

    proptest! {
        #[test]
        fn prop_uniform_frame_samples_to_its_value(
            value in any::<u8>(),
            width in 1u32..32,
            height in 1u32..32,
            padding in 0u32..16,
        ) {
            let stride = width * 4 + padding;
            let data = vec![value; (stride * height) as usize];
            let mut view = view(&data, width, height, stride);
            view.format = PixelFormat::Xbgr8888;
            prop_assert_eq!(sample(&view).unwrap(), value);
        }

        #[test]
        fn prop_aggregate_stays_within_bounds(values in prop::collection::vec(any::<u8>(), 1..16)) {
            let statuses: Vec<_> = values.iter().copied().map(OutputStatus::Done).collect();
            let result = aggregate(&statuses).unwrap();
            prop_assert!(result >= *values.iter().min().unwrap());
            prop_assert!(result <= *values.iter().max().unwrap());
        }
    }
}
