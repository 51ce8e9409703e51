use log::debug;
use stereo_depth_core::{GrayImageView, ImageSize};

use crate::matcher::Matcher;
use crate::params::{BlockMatchParameters, ParameterError};
use crate::prefilter::{prefilter, Integral};
use crate::speckle::filter_speckles;
use crate::DISP_SCALE;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Fixed-point disparity grid (`value / 16` pixels).
///
/// Invalid pixels hold [`DisparityMap::invalid_value`], i.e.
/// `(min_disparity - 1) * 16`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisparityMap {
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) data: Vec<i16>,
    pub(crate) min_disparity: i32,
    pub(crate) num_disparities: i32,
}

impl DisparityMap {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    /// Raw fixed-point values, row-major.
    pub fn data(&self) -> &[i16] {
        &self.data
    }

    pub fn min_disparity(&self) -> i32 {
        self.min_disparity
    }

    pub fn num_disparities(&self) -> i32 {
        self.num_disparities
    }

    pub fn invalid_value(&self) -> i16 {
        ((self.min_disparity - 1) * DISP_SCALE) as i16
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> i16 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        self.get(x, y) != self.invalid_value()
    }

    /// Disparity in pixels, `None` for invalid pixels.
    pub fn disparity(&self, x: usize, y: usize) -> Option<f32> {
        let v = self.get(x, y);
        (v != self.invalid_value()).then(|| v as f32 / DISP_SCALE as f32)
    }

    pub fn valid_count(&self) -> usize {
        let invalid = self.invalid_value();
        self.data.iter().filter(|&&v| v != invalid).count()
    }

    /// Disparities in pixels; invalid pixels become NaN.
    pub fn to_f32(&self) -> Vec<f32> {
        let invalid = self.invalid_value();
        self.data
            .iter()
            .map(|&v| {
                if v == invalid {
                    f32::NAN
                } else {
                    v as f32 / DISP_SCALE as f32
                }
            })
            .collect()
    }
}

/// Compute a disparity map for a rectified pair.
///
/// Pure function of its inputs: identical inputs give bit-identical maps,
/// with or without the `rayon` feature. Parameters are validated first and
/// never adjusted.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(left, right, params), fields(width = left.width, height = left.height))
)]
pub fn compute_disparity(
    left: &GrayImageView<'_>,
    right: &GrayImageView<'_>,
    params: &BlockMatchParameters,
) -> Result<DisparityMap, ParameterError> {
    params.validate()?;
    if left.size() != right.size() {
        return Err(ParameterError::SizeMismatch {
            left: left.size(),
            right: right.size(),
        });
    }
    let (w, h) = (left.width, left.height);
    let win = params.window_size as usize;
    if w < win || h < win {
        return Err(ParameterError::ImageTooSmall {
            size: left.size(),
            window: params.window_size,
        });
    }

    let pfs = params.prefilter_size as usize;
    let left_f = prefilter(left, params.prefilter_type, pfs, params.prefilter_cap);
    let right_f = prefilter(right, params.prefilter_type, pfs, params.prefilter_cap);
    let texture = Integral::new(left);
    let matcher = Matcher {
        left: &left_f,
        right: &right_f,
        width: w,
        height: h,
        texture: &texture,
        params,
    };

    let invalid = params.invalid_value();
    let mut data = vec![invalid; w * h];

    #[cfg(feature = "rayon")]
    data.par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, row)| matcher.match_row(y, row));

    #[cfg(not(feature = "rayon"))]
    for (y, row) in data.chunks_mut(w).enumerate() {
        matcher.match_row(y, row);
    }

    let removed = filter_speckles(
        &mut data,
        w,
        h,
        invalid,
        params.speckle_window_size as usize,
        params.speckle_range * DISP_SCALE,
    );

    let map = DisparityMap {
        width: w,
        height: h,
        data,
        min_disparity: params.min_disparity,
        num_disparities: params.num_disparities,
    };
    debug!(
        "disparity {}: {} valid pixels, {} removed as speckles",
        map.size(),
        map.valid_count(),
        removed
    );
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Parameter;
    use stereo_depth_core::GrayImage;

    /// Deterministic texture with strong local variance.
    fn texture(width: usize, height: usize, shift: usize) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let sx = x + shift;
            let h = (sx as u32).wrapping_mul(2654435761) ^ (y as u32).wrapping_mul(40503);
            (h >> 13) as u8
        })
    }

    fn small_params() -> BlockMatchParameters {
        BlockMatchParameters {
            min_disparity: 0,
            num_disparities: 16,
            texture_threshold: 10,
            speckle_window_size: 0,
            ..Default::default()
        }
    }

    #[test]
    fn recovers_constant_shift() {
        // right(x) = left(x + 6)  =>  left(x) matches right(x - 6).
        let left = texture(64, 24, 0);
        let right = GrayImage::from_fn(64, 24, |x, y| if x + 6 < 64 { left.get(x + 6, y) } else { 0 });
        let map = compute_disparity(&left.view(), &right.view(), &small_params()).expect("map");
        assert_eq!(map.size(), ImageSize::new(64, 24));
        let d = map.disparity(40, 12).expect("textured pixel is valid");
        assert!((d - 6.0).abs() <= 0.25, "disparity {d}");
        assert!(map.valid_count() > 0);
        assert_eq!(map.get(0, 0), map.invalid_value());
    }

    #[test]
    fn rejects_before_computing() {
        let img = texture(32, 16, 0);
        let bad = small_params().with(Parameter::NumDisparities, 100);
        assert_eq!(
            compute_disparity(&img.view(), &img.view(), &bad),
            Err(ParameterError::NumDisparities(100))
        );
        let other = texture(30, 16, 0);
        assert!(matches!(
            compute_disparity(&img.view(), &other.view(), &small_params()),
            Err(ParameterError::SizeMismatch { .. })
        ));
        let tiny = texture(4, 4, 0);
        assert!(matches!(
            compute_disparity(&tiny.view(), &tiny.view(), &small_params()),
            Err(ParameterError::ImageTooSmall { .. })
        ));
    }

    #[test]
    fn f32_view_marks_invalid_as_nan() {
        let img = GrayImage::filled(24, 24, 90);
        let map = compute_disparity(&img.view(), &img.view(), &small_params()).expect("map");
        assert_eq!(map.valid_count(), 0);
        assert!(map.to_f32().iter().all(|v| v.is_nan()));
        assert_eq!(map.disparity(12, 12), None);
    }
}
