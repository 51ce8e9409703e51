use serde::{Deserialize, Serialize};

/// Width and height of an image in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: usize,
    pub height: usize,
}

impl ImageSize {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Errors raised when wrapping raw pixel buffers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageBufferError {
    #[error("invalid image buffer length (expected {expected} bytes, got {got})")]
    InvalidLength { expected: usize, got: usize },

    #[error("image dimensions overflow (width={width}, height={height}, channels={channels})")]
    DimensionsOverflow {
        width: usize,
        height: usize,
        channels: usize,
    },
}

fn checked_len(width: usize, height: usize, channels: usize) -> Result<usize, ImageBufferError> {
    width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(channels))
        .ok_or(ImageBufferError::DimensionsOverflow {
            width,
            height,
            channels,
        })
}

#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

impl GrayImageView<'_> {
    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    pub fn to_owned_image(&self) -> GrayImage {
        GrayImage {
            width: self.width,
            height: self.height,
            data: self.data.to_vec(),
        }
    }
}

/// Owned single-channel 8-bit image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    /// Black image of the given size.
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, 0)
    }

    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Wrap a row-major buffer, validating its length.
    pub fn from_vec(width: usize, height: usize, data: Vec<u8>) -> Result<Self, ImageBufferError> {
        let expected = checked_len(width, height, 1)?;
        if data.len() != expected {
            return Err(ImageBufferError::InvalidLength {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> u8) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: u8) {
        self.data[y * self.width + x] = v;
    }
}

/// Owned three-channel 8-bit image, interleaved `RGBRGB...` row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl RgbImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * 3],
        }
    }

    pub fn from_vec(width: usize, height: usize, data: Vec<u8>) -> Result<Self, ImageBufferError> {
        let expected = checked_len(width, height, 3)?;
        if data.len() != expected {
            return Err(ImageBufferError::InvalidLength {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    #[inline]
    pub fn put_pixel(&mut self, x: usize, y: usize, px: [u8; 3]) {
        let i = (y * self.width + x) * 3;
        self.data[i..i + 3].copy_from_slice(&px);
    }

    /// Luma conversion with ITU-R BT.601 weights.
    pub fn to_gray(&self) -> GrayImage {
        let data = self
            .data
            .chunks_exact(3)
            .map(|px| {
                let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                y.round().clamp(0.0, 255.0) as u8
            })
            .collect();
        GrayImage {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// Extract one channel (0 = R, 1 = G, 2 = B).
    pub fn channel(&self, c: usize) -> GrayImage {
        let data = self.data.chunks_exact(3).map(|px| px[c]).collect();
        GrayImage {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// Interleave three equally sized planes. Returns `None` on a size mismatch.
    pub fn from_channels(r: &GrayImage, g: &GrayImage, b: &GrayImage) -> Option<Self> {
        if r.size() != g.size() || r.size() != b.size() {
            return None;
        }
        let mut data = Vec::with_capacity(r.data.len() * 3);
        for ((&rv, &gv), &bv) in r.data.iter().zip(&g.data).zip(&b.data) {
            data.extend_from_slice(&[rv, gv, bv]);
        }
        Some(Self {
            width: r.width,
            height: r.height,
            data,
        })
    }
}

#[inline]
fn get_gray(src: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    if x < 0 || y < 0 || x >= src.width as i32 || y >= src.height as i32 {
        return 0;
    }
    src.data[y as usize * src.width + x as usize]
}

/// Bilinear sample at integer-centred coordinates; pixels outside the image read as 0.
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_gray(src, x0, y0) as f32;
    let p10 = get_gray(src, x0 + 1, y0) as f32;
    let p01 = get_gray(src, x0, y0 + 1) as f32;
    let p11 = get_gray(src, x0 + 1, y0 + 1) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

#[inline]
pub fn sample_bilinear_u8(src: &GrayImageView<'_>, x: f32, y: f32) -> u8 {
    sample_bilinear(src, x, y).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_vec_rejects_wrong_length() {
        let err = GrayImage::from_vec(4, 3, vec![0; 11]).unwrap_err();
        assert_eq!(
            err,
            ImageBufferError::InvalidLength {
                expected: 12,
                got: 11
            }
        );
        assert!(RgbImage::from_vec(2, 2, vec![0; 12]).is_ok());
    }

    #[test]
    fn bilinear_interpolates_and_zero_pads() {
        let img = GrayImage::from_vec(2, 2, vec![0, 100, 100, 200]).expect("image");
        let v = img.view();
        assert!((sample_bilinear(&v, 0.5, 0.5) - 100.0).abs() < 1e-4);
        assert_eq!(sample_bilinear_u8(&v, 1.0, 1.0), 200);
        assert!((sample_bilinear(&v, 1.5, 1.0) - 100.0).abs() < 1e-4);
        assert_eq!(sample_bilinear_u8(&v, -3.0, 0.0), 0);
    }

    #[test]
    fn rgb_gray_conversion_uses_luma_weights() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, [255, 0, 0]);
        rgb.put_pixel(1, 0, [255, 255, 255]);
        let gray = rgb.to_gray();
        assert_eq!(gray.data, vec![76, 255]);

        let back = RgbImage::from_channels(&rgb.channel(0), &rgb.channel(1), &rgb.channel(2))
            .expect("same size");
        assert_eq!(back, rgb);
    }
}
