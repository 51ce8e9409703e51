#![allow(dead_code)]

use nalgebra::{Matrix3, Vector3};
use stereo_depth::calib::{
    essential_matrix, fundamental_matrix, stereo_rectify, CalibrationResult, CalibrationRms,
    RectifyOptions,
};
use stereo_depth::core::{CameraIntrinsics, Distortion, GrayImage, ImageSize, PinholeCamera};

pub const WIDTH: usize = 128;
pub const HEIGHT: usize = 64;
pub const FOCAL: f64 = 500.0;
pub const BASELINE: f64 = 60.0;

/// Two identical distortion-free cameras side by side, so rectification is
/// the identity mapping.
pub fn parallel_rig() -> CalibrationResult {
    let cam = PinholeCamera::new(
        CameraIntrinsics::new(
            FOCAL,
            FOCAL,
            (WIDTH as f64 - 1.0) / 2.0,
            (HEIGHT as f64 - 1.0) / 2.0,
        ),
        Distortion::none(),
    );
    let rotation = Matrix3::identity();
    let translation = Vector3::new(-BASELINE, 0.0, 0.0);
    let size = ImageSize::new(WIDTH, HEIGHT);
    let rectification =
        stereo_rectify(&cam, &cam, size, &rotation, &translation, RectifyOptions::default())
            .expect("rectify");
    let essential = essential_matrix(&rotation, &translation);
    let fundamental = fundamental_matrix(&cam, &cam, &essential).expect("fundamental");
    CalibrationResult {
        image_size: size,
        left: cam,
        right: cam,
        rotation,
        translation,
        essential,
        fundamental,
        rectification,
        rms: CalibrationRms::default(),
    }
}

fn noise(x: usize, y: usize) -> u8 {
    let h = (x as u32)
        .wrapping_mul(2654435761)
        .wrapping_add((y as u32).wrapping_mul(2246822519));
    ((h ^ (h >> 15)) >> 9) as u8
}

/// Textured pair where every left pixel appears `shift` columns to the left
/// in the right image.
pub fn shifted_pair(shift: usize) -> (GrayImage, GrayImage) {
    let left = GrayImage::from_fn(WIDTH, HEIGHT, noise);
    let right = GrayImage::from_fn(WIDTH, HEIGHT, |x, y| {
        if x + shift < WIDTH {
            left.get(x + shift, y)
        } else {
            0
        }
    });
    (left, right)
}
