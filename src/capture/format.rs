//! Pixel Formats
//!
//! Decodes the format codes a compositor attaches to a frame offer into a
//! channel layout the sampler can read.
//!
//! Two numbering schemes reach us: `wl_shm` format codes for shared-memory
//! offers (where `0` and `1` are special-cased ARGB8888/XRGB8888 and every
//! other value is the DRM fourcc) and plain DRM fourcc codes for dmabuf
//! offers. All layouts are little-endian packed words, as DRM defines them.

use serde::Serialize;

/// Build a DRM fourcc code from its four ASCII characters
pub const fn fourcc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
}

const WL_SHM_ARGB8888: u32 = 0;
const WL_SHM_XRGB8888: u32 = 1;

/// Packed RGB formats the sampler understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PixelFormat {
    /// `[31:0] A:R:G:B`
    Argb8888,
    /// `[31:0] x:R:G:B`
    Xrgb8888,
    /// `[31:0] A:B:G:R`
    Abgr8888,
    /// `[31:0] x:B:G:R`
    Xbgr8888,
    /// `[31:0] R:G:B:A`
    Rgba8888,
    /// `[31:0] R:G:B:x`
    Rgbx8888,
    /// `[31:0] B:G:R:A`
    Bgra8888,
    /// `[31:0] B:G:R:x`
    Bgrx8888,
    /// `[23:0] R:G:B`
    Rgb888,
    /// `[23:0] B:G:R`
    Bgr888,
    /// `[31:0] A:R:G:B 2:10:10:10`
    Argb2101010,
    /// `[31:0] x:R:G:B 2:10:10:10`
    Xrgb2101010,
    /// `[31:0] A:B:G:R 2:10:10:10`
    Abgr2101010,
    /// `[31:0] x:B:G:R 2:10:10:10`
    Xbgr2101010,
}

/// How to pull R, G and B out of one pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// 8-bit channels at fixed byte offsets
    Bytes { r: usize, g: usize, b: usize },
    /// 10-bit channels packed into a little-endian u32
    Packed10 { r: u32, g: u32, b: u32 },
}

impl PixelFormat {
    /// Decode a DRM fourcc code
    pub fn from_fourcc(code: u32) -> Option<Self> {
        const TABLE: [(u32, PixelFormat); 14] = [
            (fourcc(b'A', b'R', b'2', b'4'), PixelFormat::Argb8888),
            (fourcc(b'X', b'R', b'2', b'4'), PixelFormat::Xrgb8888),
            (fourcc(b'A', b'B', b'2', b'4'), PixelFormat::Abgr8888),
            (fourcc(b'X', b'B', b'2', b'4'), PixelFormat::Xbgr8888),
            (fourcc(b'R', b'A', b'2', b'4'), PixelFormat::Rgba8888),
            (fourcc(b'R', b'X', b'2', b'4'), PixelFormat::Rgbx8888),
            (fourcc(b'B', b'A', b'2', b'4'), PixelFormat::Bgra8888),
            (fourcc(b'B', b'X', b'2', b'4'), PixelFormat::Bgrx8888),
            (fourcc(b'R', b'G', b'2', b'4'), PixelFormat::Rgb888),
            (fourcc(b'B', b'G', b'2', b'4'), PixelFormat::Bgr888),
            (fourcc(b'A', b'R', b'3', b'0'), PixelFormat::Argb2101010),
            (fourcc(b'X', b'R', b'3', b'0'), PixelFormat::Xrgb2101010),
            (fourcc(b'A', b'B', b'3', b'0'), PixelFormat::Abgr2101010),
            (fourcc(b'X', b'B', b'3', b'0'), PixelFormat::Xbgr2101010),
        ];

        TABLE
            .iter()
            .find(|(candidate, _)| *candidate == code)
            .map(|(_, format)| *format)
    }

    /// Decode a `wl_shm` format code
    pub fn from_shm_code(code: u32) -> Option<Self> {
        match code {
            WL_SHM_ARGB8888 => Some(Self::Argb8888),
            WL_SHM_XRGB8888 => Some(Self::Xrgb8888),
            other => Self::from_fourcc(other),
        }
    }

    /// Bytes occupied by one pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Rgb888 | Self::Bgr888 => 3,
            _ => 4,
        }
    }

    fn layout(&self) -> Layout {
        match self {
            Self::Argb8888 | Self::Xrgb8888 => Layout::Bytes { r: 2, g: 1, b: 0 },
            Self::Abgr8888 | Self::Xbgr8888 => Layout::Bytes { r: 0, g: 1, b: 2 },
            Self::Rgba8888 | Self::Rgbx8888 => Layout::Bytes { r: 3, g: 2, b: 1 },
            Self::Bgra8888 | Self::Bgrx8888 => Layout::Bytes { r: 1, g: 2, b: 3 },
            Self::Rgb888 => Layout::Bytes { r: 2, g: 1, b: 0 },
            Self::Bgr888 => Layout::Bytes { r: 0, g: 1, b: 2 },
            Self::Argb2101010 | Self::Xrgb2101010 => Layout::Packed10 { r: 20, g: 10, b: 0 },
            Self::Abgr2101010 | Self::Xbgr2101010 => Layout::Packed10 { r: 0, g: 10, b: 20 },
        }
    }

    /// Sum of the 8-bit R, G and B values of one pixel
    ///
    /// `pixel` must hold at least [`bytes_per_pixel`](Self::bytes_per_pixel)
    /// bytes. 10-bit channels are scaled down to 8 bits.
    #[inline]
    pub fn channel_sum(&self, pixel: &[u8]) -> u32 {
        match self.layout() {
            Layout::Bytes { r, g, b } => pixel[r] as u32 + pixel[g] as u32 + pixel[b] as u32,
            Layout::Packed10 { r, g, b } => {
                let word = u32::from_le_bytes([pixel[0], pixel[1], pixel[2], pixel[3]]);
                let channel = |shift: u32| ((word >> shift) & 0x3ff) >> 2;
                channel(r) + channel(g) + channel(b)
            }
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Argb8888 => "ARGB8888",
            Self::Xrgb8888 => "XRGB8888",
            Self::Abgr8888 => "ABGR8888",
            Self::Xbgr8888 => "XBGR8888",
            Self::Rgba8888 => "RGBA8888",
            Self::Rgbx8888 => "RGBX8888",
            Self::Bgra8888 => "BGRA8888",
            Self::Bgrx8888 => "BGRX8888",
            Self::Rgb888 => "RGB888",
            Self::Bgr888 => "BGR888",
            Self::Argb2101010 => "ARGB2101010",
            Self::Xrgb2101010 => "XRGB2101010",
            Self::Abgr2101010 => "ABGR2101010",
            Self::Xbgr2101010 => "XBGR2101010",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shm_special_codes() {
        assert_eq!(PixelFormat::from_shm_code(0), Some(PixelFormat::Argb8888));
        assert_eq!(PixelFormat::from_shm_code(1), Some(PixelFormat::Xrgb8888));
        // Every other wl_shm code is the fourcc itself
        assert_eq!(
            PixelFormat::from_shm_code(fourcc(b'X', b'B', b'2', b'4')),
            Some(PixelFormat::Xbgr8888)
        );
    }

    #[test]
    fn test_fourcc_values() {
        // DRM_FORMAT_XRGB8888 as defined in drm_fourcc.h
        assert_eq!(fourcc(b'X', b'R', b'2', b'4'), 0x3432_5258);
        assert_eq!(
            PixelFormat::from_fourcc(0x3432_5258),
            Some(PixelFormat::Xrgb8888)
        );
        // The wl_shm special values are not fourccs
        assert_eq!(PixelFormat::from_fourcc(1), None);
        // NV12 is planar and not sampled
        assert_eq!(PixelFormat::from_fourcc(fourcc(b'N', b'V', b'1', b'2')), None);
    }

    #[test]
    fn test_channel_sum_byte_order() {
        // Memory order for XRGB8888 is B, G, R, X
        let pixel = [10u8, 20, 30, 255];
        assert_eq!(PixelFormat::Xrgb8888.channel_sum(&pixel), 60);
        // Alpha/padding never contributes
        assert_eq!(PixelFormat::Argb8888.channel_sum(&[0, 0, 0, 255]), 0);
        assert_eq!(PixelFormat::Rgba8888.channel_sum(&[255, 1, 2, 3]), 6);
        assert_eq!(PixelFormat::Bgrx8888.channel_sum(&[255, 1, 2, 3]), 6);
        assert_eq!(PixelFormat::Rgb888.channel_sum(&[1, 2, 3]), 6);
    }

    #[test]
    fn test_channel_sum_ten_bit() {
        // Full-scale 10-bit white scales to 255 per channel
        let word: u32 = (0x3ff << 20) | (0x3ff << 10) | 0x3ff;
        let pixel = word.to_le_bytes();
        assert_eq!(PixelFormat::Xrgb2101010.channel_sum(&pixel), 765);

        // Red only: lands in a different slot depending on channel order
        let red: u32 = 0x3ff << 20;
        assert_eq!(PixelFormat::Xrgb2101010.channel_sum(&red.to_le_bytes()), 255);
        assert_eq!(PixelFormat::Xbgr2101010.channel_sum(&red.to_le_bytes()), 255);
    }

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(PixelFormat::Xrgb8888.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Bgr888.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Xbgr2101010.bytes_per_pixel(), 4);
    }
}
