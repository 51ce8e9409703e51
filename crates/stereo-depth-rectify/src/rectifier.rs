use log::{debug, info, warn};
use nalgebra::{Matrix3, Matrix3x4, Point2};
use stereo_depth_calib::CalibrationResult;
use stereo_depth_core::{GrayImage, GrayImageView, ImageSize, PinholeCamera, RgbImage};

use crate::maps::{rectify_point, RectificationMap};
use crate::remap::{remap_gray, remap_rgb};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors raised by [`Rectifier`]. All of them are fatal to the call only.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RectificationError {
    #[error("rectifier is not initialized")]
    NotInitialized,

    #[error("{side} image is {got}, maps were built for {expected}")]
    SizeMismatch {
        side: Side,
        expected: ImageSize,
        got: ImageSize,
    },

    #[error("invalid image size {0}")]
    InvalidImageSize(ImageSize),

    #[error("rectified projection of the {0} camera is singular")]
    SingularProjection(Side),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Side::Left => "left",
            Side::Right => "right",
        })
    }
}

/// Camera and rectified transforms of one side, resampled to the map size.
#[derive(Clone, Debug)]
struct SideModel {
    camera: PinholeCamera,
    rotation: Matrix3<f64>,
    projection: Matrix3x4<f64>,
    map: RectificationMap,
}

#[derive(Clone, Debug)]
struct Maps {
    size: ImageSize,
    left: SideModel,
    right: SideModel,
}

/// Scale factor mapping integer-centred pixel coordinates from `from` to `to`.
fn pixel_scale(from: usize, to: usize) -> (f64, f64) {
    let s = to as f64 / from as f64;
    // (x + 0.5) * s - 0.5
    (s, 0.5 * s - 0.5)
}

fn scale_model(
    camera: &PinholeCamera,
    projection: &Matrix3x4<f64>,
    from: ImageSize,
    to: ImageSize,
) -> (PinholeCamera, Matrix3x4<f64>) {
    if from == to {
        return (*camera, *projection);
    }
    let (sx, ox) = pixel_scale(from.width, to.width);
    let (sy, oy) = pixel_scale(from.height, to.height);
    let mut cam = *camera;
    cam.intrinsics.fx *= sx;
    cam.intrinsics.cx = cam.intrinsics.cx * sx + ox;
    cam.intrinsics.fy *= sy;
    cam.intrinsics.cy = cam.intrinsics.cy * sy + oy;

    let mut p = *projection;
    for c in 0..4 {
        p[(0, c)] = p[(0, c)] * sx + ox * p[(2, c)];
        p[(1, c)] = p[(1, c)] * sy + oy * p[(2, c)];
    }
    (cam, p)
}

/// Applies precomputed undistort+rectify maps to stereo frames.
///
/// Maps are built once by [`Rectifier::initialize`] for a fixed image size;
/// every call checks the incoming frames against that size. A new calibration
/// or a new resolution requires another explicit `initialize`.
#[derive(Clone, Debug, Default)]
pub struct Rectifier {
    maps: Option<Maps>,
}

impl Rectifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build maps for both cameras.
    ///
    /// When `image_size` differs from the calibration resolution the camera
    /// and projection matrices are rescaled to it. On error the previous maps
    /// are kept.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, calibration), fields(size = %image_size))
    )]
    pub fn initialize(
        &mut self,
        calibration: &CalibrationResult,
        image_size: ImageSize,
    ) -> Result<(), RectificationError> {
        if image_size.is_empty() {
            return Err(RectificationError::InvalidImageSize(image_size));
        }
        if calibration.image_size != image_size {
            warn!(
                "calibrated at {}, rescaling matrices for {}",
                calibration.image_size, image_size
            );
        }

        let rect = &calibration.rectification;
        let build = |side: Side| -> Result<SideModel, RectificationError> {
            let (camera, rotation, projection) = match side {
                Side::Left => (&calibration.left, rect.r1, rect.p1),
                Side::Right => (&calibration.right, rect.r2, rect.p2),
            };
            let (camera, projection) =
                scale_model(camera, &projection, calibration.image_size, image_size);
            let map = RectificationMap::new(&camera, &rotation, &projection, image_size)
                .ok_or(RectificationError::SingularProjection(side))?;
            Ok(SideModel {
                camera,
                rotation,
                projection,
                map,
            })
        };

        let maps = Maps {
            size: image_size,
            left: build(Side::Left)?,
            right: build(Side::Right)?,
        };
        self.maps = Some(maps);
        info!("rectification maps ready for {image_size}");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.maps.is_some()
    }

    /// Size the maps were built for.
    pub fn image_size(&self) -> Option<ImageSize> {
        self.maps.as_ref().map(|m| m.size)
    }

    /// Map for one side, if initialized.
    pub fn map(&self, side: Side) -> Option<&RectificationMap> {
        self.maps.as_ref().map(|m| match side {
            Side::Left => &m.left.map,
            Side::Right => &m.right.map,
        })
    }

    fn checked(&self, left: ImageSize, right: ImageSize) -> Result<&Maps, RectificationError> {
        let maps = self.maps.as_ref().ok_or(RectificationError::NotInitialized)?;
        for (side, got) in [(Side::Left, left), (Side::Right, right)] {
            if got != maps.size {
                return Err(RectificationError::SizeMismatch {
                    side,
                    expected: maps.size,
                    got,
                });
            }
        }
        Ok(maps)
    }

    /// Rectify a gray stereo frame pair.
    pub fn rectify(
        &self,
        left: &GrayImageView<'_>,
        right: &GrayImageView<'_>,
    ) -> Result<(GrayImage, GrayImage), RectificationError> {
        let maps = self.checked(left.size(), right.size())?;
        debug!("rectifying {} pair", maps.size);
        Ok((
            remap_gray(left, &maps.left.map),
            remap_gray(right, &maps.right.map),
        ))
    }

    /// Rectify a colour stereo frame pair.
    pub fn rectify_rgb(
        &self,
        left: &RgbImage,
        right: &RgbImage,
    ) -> Result<(RgbImage, RgbImage), RectificationError> {
        let maps = self.checked(left.size(), right.size())?;
        Ok((
            remap_rgb(left, &maps.left.map),
            remap_rgb(right, &maps.right.map),
        ))
    }

    /// Rectified coordinates of raw pixel positions on one side.
    ///
    /// Points whose ray is parallel to the rectified image plane come back as NaN.
    pub fn rectify_points(
        &self,
        side: Side,
        points: &[Point2<f64>],
    ) -> Result<Vec<Point2<f64>>, RectificationError> {
        let maps = self.maps.as_ref().ok_or(RectificationError::NotInitialized)?;
        let model = match side {
            Side::Left => &maps.left,
            Side::Right => &maps.right,
        };
        Ok(points
            .iter()
            .map(|p| {
                rectify_point(&model.camera, &model.rotation, &model.projection, *p)
                    .unwrap_or(Point2::new(f64::NAN, f64::NAN))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_depth_calib::{
        essential_matrix, fundamental_matrix, stereo_rectify, CalibrationRms, RectifyOptions,
    };
    use stereo_depth_core::{CameraIntrinsics, Distortion, Pose};
    use nalgebra::Vector3;

    fn calibration(size: ImageSize) -> CalibrationResult {
        let left = PinholeCamera::new(
            CameraIntrinsics::new(300.0, 300.0, 79.5, 59.5),
            Distortion::from_array([-0.05, 0.0, 0.0, 0.0, 0.0]),
        );
        let right = PinholeCamera::new(
            CameraIntrinsics::new(305.0, 303.0, 81.0, 58.0),
            Distortion::none(),
        );
        let rel = Pose::from_rodrigues(Vector3::new(0.0, 0.02, 0.0), Vector3::new(-50.0, 0.0, 0.0));
        let rotation = *rel.rotation.matrix();
        let rectification = stereo_rectify(
            &left,
            &right,
            size,
            &rotation,
            &rel.translation,
            RectifyOptions::default(),
        )
        .expect("rectify");
        let essential = essential_matrix(&rotation, &rel.translation);
        CalibrationResult {
            image_size: size,
            left,
            right,
            rotation,
            translation: rel.translation,
            essential,
            fundamental: fundamental_matrix(&left, &right, &essential).expect("F"),
            rectification,
            rms: CalibrationRms::default(),
        }
    }

    #[test]
    fn uninitialized_rectifier_refuses_frames() {
        let img = GrayImage::new(4, 4);
        let r = Rectifier::new();
        assert!(!r.is_initialized());
        assert_eq!(
            r.rectify(&img.view(), &img.view()).unwrap_err(),
            RectificationError::NotInitialized
        );
        assert_eq!(
            r.rectify_points(Side::Left, &[]).unwrap_err(),
            RectificationError::NotInitialized
        );
    }

    #[test]
    fn size_is_checked_on_every_call() {
        let size = ImageSize::new(160, 120);
        let mut r = Rectifier::new();
        r.initialize(&calibration(size), size).expect("init");
        assert!(r.is_initialized());

        let good = GrayImage::new(160, 120);
        let bad = GrayImage::new(320, 240);
        assert!(r.rectify(&good.view(), &good.view()).is_ok());
        assert_eq!(
            r.rectify(&good.view(), &bad.view()).unwrap_err(),
            RectificationError::SizeMismatch {
                side: Side::Right,
                expected: size,
                got: ImageSize::new(320, 240),
            }
        );
        let rgb = RgbImage::new(320, 240);
        assert!(matches!(
            r.rectify_rgb(&rgb, &rgb),
            Err(RectificationError::SizeMismatch { side: Side::Left, .. })
        ));
    }

    #[test]
    fn empty_size_is_rejected_and_keeps_previous_maps() {
        let size = ImageSize::new(160, 120);
        let mut r = Rectifier::new();
        r.initialize(&calibration(size), size).expect("init");
        let err = r.initialize(&calibration(size), ImageSize::new(0, 120)).unwrap_err();
        assert_eq!(err, RectificationError::InvalidImageSize(ImageSize::new(0, 120)));
        assert_eq!(r.image_size(), Some(size));
    }

    #[test]
    fn reinitializing_at_double_resolution_scales_points() {
        let size = ImageSize::new(160, 120);
        let cal = calibration(size);
        let mut small = Rectifier::new();
        small.initialize(&cal, size).expect("init");
        let mut large = Rectifier::new();
        large.initialize(&cal, ImageSize::new(320, 240)).expect("init");

        let p = Point2::new(40.0, 30.0);
        let a = small.rectify_points(Side::Left, &[p]).expect("points")[0];
        let b = large
            .rectify_points(Side::Left, &[Point2::new(2.0 * p.x + 0.5, 2.0 * p.y + 0.5)])
            .expect("points")[0];
        assert!((2.0 * a.x + 0.5 - b.x).abs() < 1e-6);
        assert!((2.0 * a.y + 0.5 - b.y).abs() < 1e-6);
    }
}
