use nalgebra::{Point2, Point3, Vector3};
use stereo_depth_calib::{
    essential_matrix, fundamental_matrix, stereo_rectify, CalibrationResult, CalibrationRms,
    RectifyOptions,
};
use stereo_depth_core::{CameraIntrinsics, Distortion, GrayImage, ImageSize, PinholeCamera, Pose};
use stereo_depth_rectify::{Rectifier, Side};

const SIZE: ImageSize = ImageSize {
    width: 320,
    height: 240,
};

fn rig() -> (CalibrationResult, Pose) {
    let left = PinholeCamera::new(
        CameraIntrinsics::new(310.0, 308.0, 161.0, 118.0),
        Distortion::from_array([-0.14, 0.05, 0.0008, -0.0004, 0.0]),
    );
    let right = PinholeCamera::new(
        CameraIntrinsics::new(305.0, 306.0, 157.0, 122.0),
        Distortion::from_array([-0.11, 0.03, -0.0005, 0.0003, 0.0]),
    );
    let relative = Pose::from_rodrigues(
        Vector3::new(0.02, -0.04, 0.015),
        Vector3::new(-60.0, 2.0, 1.5),
    );
    let rotation = *relative.rotation.matrix();
    let rectification = stereo_rectify(
        &left,
        &right,
        SIZE,
        &rotation,
        &relative.translation,
        RectifyOptions::default(),
    )
    .expect("rectify");
    let essential = essential_matrix(&rotation, &relative.translation);
    let result = CalibrationResult {
        image_size: SIZE,
        left,
        right,
        rotation,
        translation: relative.translation,
        essential,
        fundamental: fundamental_matrix(&left, &right, &essential).expect("F"),
        rectification,
        rms: CalibrationRms::default(),
    };
    (result, relative)
}

/// Gaussian dot centred on `p`.
fn dot_image(p: Point2<f64>) -> GrayImage {
    GrayImage::from_fn(SIZE.width, SIZE.height, |x, y| {
        let d2 = (x as f64 - p.x).powi(2) + (y as f64 - p.y).powi(2);
        (250.0 * (-d2 / (2.0 * 2.0 * 2.0)).exp()).round() as u8
    })
}

fn centroid(img: &GrayImage) -> Point2<f64> {
    let (mut sx, mut sy, mut sw) = (0.0, 0.0, 0.0);
    for y in 0..img.height {
        for x in 0..img.width {
            let w = img.get(x, y) as f64;
            if w > 20.0 {
                sx += w * x as f64;
                sy += w * y as f64;
                sw += w;
            }
        }
    }
    assert!(sw > 0.0, "dot left the rectified image");
    Point2::new(sx / sw, sy / sw)
}

#[test]
fn corresponding_points_share_a_rectified_row() {
    let (calibration, relative) = rig();
    let mut rectifier = Rectifier::new();
    rectifier.initialize(&calibration, SIZE).expect("init");

    for world in [
        Point3::new(0.0, 0.0, 900.0),
        Point3::new(-120.0, 60.0, 700.0),
        Point3::new(150.0, -80.0, 1100.0),
        Point3::new(60.0, 100.0, 800.0),
    ] {
        let pl = calibration.left.project(&world).expect("left");
        let pr = calibration
            .right
            .project(&relative.transform_point(&world))
            .expect("right");

        let (left, right) = (dot_image(pl), dot_image(pr));
        let (rect_l, rect_r) = rectifier
            .rectify(&left.view(), &right.view())
            .expect("rectify");
        let (cl, cr) = (centroid(&rect_l), centroid(&rect_r));
        assert!(
            (cl.y - cr.y).abs() <= 1.0,
            "rows differ for {world}: {cl} vs {cr}"
        );

        // Rectified point mapping agrees with the resampled images.
        let ql = rectifier.rectify_points(Side::Left, &[pl]).expect("points")[0];
        let qr = rectifier.rectify_points(Side::Right, &[pr]).expect("points")[0];
        assert!((ql.y - qr.y).abs() < 1e-6);
        assert!((ql - cl).norm() < 1.0, "{ql} vs {cl}");
    }
}

#[test]
fn rgb_and_gray_rectification_agree() {
    let (calibration, _) = rig();
    let mut rectifier = Rectifier::new();
    rectifier.initialize(&calibration, SIZE).expect("init");

    let gray = dot_image(Point2::new(100.0, 80.0));
    let rgb = stereo_depth_core::RgbImage::from_channels(&gray, &gray, &gray).expect("rgb");
    let (gl, _) = rectifier.rectify(&gray.view(), &gray.view()).expect("gray");
    let (cl, _) = rectifier.rectify_rgb(&rgb, &rgb).expect("rgb");
    assert_eq!(cl.to_gray(), gl);
}
