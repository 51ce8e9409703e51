//! Prefilters and box statistics.
//!
//! Outputs are `u8` in `0..=2 * cap`: the clamped signed response shifted by `cap`.

use stereo_depth_core::GrayImageView;

use crate::params::PrefilterType;

/// Summed-area tables of values and squared values, `(w + 1) x (h + 1)`.
pub(crate) struct Integral {
    width: usize,
    height: usize,
    sum: Vec<u64>,
    sq: Vec<u64>,
}

impl Integral {
    pub(crate) fn new(img: &GrayImageView<'_>) -> Self {
        let (w, h) = (img.width, img.height);
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sq = vec![0u64; stride * (h + 1)];
        for y in 0..h {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = img.get(x, y) as u64;
                row_sum += v;
                row_sq += v * v;
                let i = (y + 1) * stride + x + 1;
                sum[i] = sum[i - stride] + row_sum;
                sq[i] = sq[i - stride] + row_sq;
            }
        }
        Self {
            width: w,
            height: h,
            sum,
            sq,
        }
    }

    /// Count, sum and squared sum of the `size x size` window centred on
    /// `(x, y)`, clipped to the image.
    pub(crate) fn window(&self, x: usize, y: usize, size: usize) -> (u64, u64, u64) {
        let r = size / 2;
        let x0 = x.saturating_sub(r);
        let y0 = y.saturating_sub(r);
        let x1 = (x + r + 1).min(self.width);
        let y1 = (y + r + 1).min(self.height);
        let stride = self.width + 1;
        let at = |t: &[u64], xx: usize, yy: usize| t[yy * stride + xx];
        let rect = |t: &[u64]| at(t, x1, y1) + at(t, x0, y0) - at(t, x0, y1) - at(t, x1, y0);
        (((x1 - x0) * (y1 - y0)) as u64, rect(&self.sum), rect(&self.sq))
    }

    /// Population variance of the clipped window.
    pub(crate) fn variance(&self, x: usize, y: usize, size: usize) -> f64 {
        let (n, s, s2) = self.window(x, y, size);
        if n == 0 {
            return 0.0;
        }
        let n = n as f64;
        let mean = s as f64 / n;
        (s2 as f64 / n - mean * mean).max(0.0)
    }
}

#[inline]
fn clamp_shift(v: i32, cap: i32) -> u8 {
    (v.clamp(-cap, cap) + cap) as u8
}

/// Local mean removal over a `size x size` window.
pub fn normalized_response(img: &GrayImageView<'_>, size: usize, cap: i32) -> Vec<u8> {
    let integral = Integral::new(img);
    let mut out = Vec::with_capacity(img.width * img.height);
    for y in 0..img.height {
        for x in 0..img.width {
            let (n, s, _) = integral.window(x, y, size);
            // Rounded integer mean.
            let mean = ((2 * s + n) / (2 * n)) as i32;
            out.push(clamp_shift(img.get(x, y) as i32 - mean, cap));
        }
    }
    out
}

/// Horizontal Sobel derivative with replicated borders.
pub fn x_sobel(img: &GrayImageView<'_>, cap: i32) -> Vec<u8> {
    let (w, h) = (img.width, img.height);
    let px = |x: isize, y: isize| -> i32 {
        let xc = x.clamp(0, w as isize - 1) as usize;
        let yc = y.clamp(0, h as isize - 1) as usize;
        img.get(xc, yc) as i32
    };
    let mut out = Vec::with_capacity(w * h);
    for y in 0..h as isize {
        for x in 0..w as isize {
            let d = px(x + 1, y - 1) + 2 * px(x + 1, y) + px(x + 1, y + 1)
                - px(x - 1, y - 1)
                - 2 * px(x - 1, y)
                - px(x - 1, y + 1);
            out.push(clamp_shift(d, cap));
        }
    }
    out
}

pub fn prefilter(img: &GrayImageView<'_>, kind: PrefilterType, size: usize, cap: i32) -> Vec<u8> {
    match kind {
        PrefilterType::NormalizedResponse => normalized_response(img, size, cap),
        PrefilterType::XSobel => x_sobel(img, cap),
    }
}
