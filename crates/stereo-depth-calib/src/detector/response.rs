//! Dense ChESS corner response and ring-based corner orientation.

use stereo_depth_core::{sample_bilinear, GrayImageView};

/// 16 point ring of radius 5, clockwise starting at the top.
pub(crate) const RING5: [(i32, i32); 16] = [
    (0, -5),
    (2, -5),
    (3, -3),
    (5, -2),
    (5, 0),
    (5, 2),
    (3, 3),
    (2, 5),
    (0, 5),
    (-2, 5),
    (-3, 3),
    (-5, 2),
    (-5, 0),
    (-5, -2),
    (-3, -3),
    (-2, -5),
];

pub(crate) const RING_RADIUS: usize = 5;

/// Dense response map in row-major layout.
#[derive(Clone, Debug)]
pub struct ResponseMap {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl ResponseMap {
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }
}

/// ChESS response `R = SR - DR - 16 * MR`, evaluated where the full ring fits.
///
/// Pixels closer than the ring radius to the border stay at 0.
pub fn chess_response(img: &GrayImageView<'_>) -> ResponseMap {
    let (w, h) = (img.width, img.height);
    let mut data = vec![0.0f32; w * h];
    let r = RING_RADIUS;
    if w <= 2 * r || h <= 2 * r {
        return ResponseMap {
            width: w,
            height: h,
            data,
        };
    }

    for y in r..h - r {
        for x in r..w - r {
            data[y * w + x] = response_at(img, x, y);
        }
    }

    ResponseMap {
        width: w,
        height: h,
        data,
    }
}

#[inline]
fn response_at(img: &GrayImageView<'_>, x: usize, y: usize) -> f32 {
    let mut s = [0i32; 16];
    for (k, &(dx, dy)) in RING5.iter().enumerate() {
        let xx = (x as i32 + dx) as usize;
        let yy = (y as i32 + dy) as usize;
        s[k] = img.get(xx, yy) as i32;
    }

    let mut sr = 0i32;
    for k in 0..4 {
        let a = s[k] + s[k + 8];
        let b = s[k + 4] + s[k + 12];
        sr += (a - b).abs();
    }

    let mut dr = 0i32;
    for k in 0..8 {
        dr += (s[k] - s[k + 8]).abs();
    }

    let mu_ring = s.iter().sum::<i32>() as f32 / 16.0;
    let cross = img.get(x, y) as f32
        + img.get(x, y - 1) as f32
        + img.get(x, y + 1) as f32
        + img.get(x - 1, y) as f32
        + img.get(x + 1, y) as f32;
    let mr = (mu_ring - cross / 5.0).abs();

    sr as f32 - dr as f32 - 16.0 * mr
}

/// Direction of the bright diagonal at a corner, in `[0, π)`.
///
/// Second angular harmonic of the bilinearly sampled ring. Adjacent
/// checkerboard corners have orientations roughly π/2 apart.
pub fn corner_orientation(img: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    let mut samples = [0.0f32; 16];
    for (k, &(dx, dy)) in RING5.iter().enumerate() {
        samples[k] = sample_bilinear(img, x + dx as f32, y + dy as f32);
    }
    let mean = samples.iter().sum::<f32>() / 16.0;

    let mut c2 = 0.0f32;
    let mut s2 = 0.0f32;
    for (&v, &(dx, dy)) in samples.iter().zip(RING5.iter()) {
        let a2 = 2.0 * (dy as f32).atan2(dx as f32);
        c2 += (v - mean) * a2.cos();
        s2 += (v - mean) * a2.sin();
    }

    let mut theta = 0.5 * s2.atan2(c2);
    if theta < 0.0 {
        theta += std::f32::consts::PI;
    }
    theta
}
