//! Conversions to and from the `image` crate, PNG files and image-pair folders.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use stereo_depth_bm::{apply_jet_colormap, DisparityMap};
use stereo_depth_calib::{BatchReport, CalibrationOptions, CalibrationResult, StereoCalibrator};
use stereo_depth_core::{ChessboardGeometry, GrayImage, GrayImageView, ImageSize, RgbImage};

use crate::PipelineError;

/// Borrow an `image::GrayImage` as a core view without copying.
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

pub fn gray_from_image(img: &::image::GrayImage) -> GrayImage {
    gray_view(img).to_owned_image()
}

pub fn gray_to_image(img: &GrayImage) -> Result<::image::GrayImage, PipelineError> {
    ::image::GrayImage::from_raw(img.width as u32, img.height as u32, img.data.clone())
        .ok_or_else(|| PipelineError::Input(format!("gray buffer does not match {}", img.size())))
}

pub fn rgb_from_image(img: &::image::RgbImage) -> RgbImage {
    RgbImage {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw().clone(),
    }
}

pub fn rgb_to_image(img: &RgbImage) -> Result<::image::RgbImage, PipelineError> {
    ::image::RgbImage::from_raw(img.width as u32, img.height as u32, img.data.clone())
        .ok_or_else(|| PipelineError::Input(format!("rgb buffer does not match {}", img.size())))
}

/// Decode any supported format and convert to luma.
pub fn load_gray(path: impl AsRef<Path>) -> Result<GrayImage, PipelineError> {
    Ok(gray_from_image(&::image::open(path)?.to_luma8()))
}

pub fn load_rgb(path: impl AsRef<Path>) -> Result<RgbImage, PipelineError> {
    Ok(rgb_from_image(&::image::open(path)?.to_rgb8()))
}

pub fn save_gray(img: &GrayImage, path: impl AsRef<Path>) -> Result<(), PipelineError> {
    gray_to_image(img)?.save(path)?;
    Ok(())
}

pub fn save_rgb(img: &RgbImage, path: impl AsRef<Path>) -> Result<(), PipelineError> {
    rgb_to_image(img)?.save(path)?;
    Ok(())
}

/// Write `<stem>.png` (min-max normalized) and `<stem>_jet.png` into `dir`.
pub fn save_disparity(
    map: &DisparityMap,
    dir: impl AsRef<Path>,
    stem: &str,
) -> Result<(PathBuf, PathBuf), PipelineError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(stereo_depth_core::ConfigError::from)?;
    let gray = map.to_normalized_u8();
    let gray_path = dir.join(format!("{stem}.png"));
    let jet_path = dir.join(format!("{stem}_jet.png"));
    save_gray(&gray, &gray_path)?;
    save_rgb(&apply_jet_colormap(&gray), &jet_path)?;
    Ok((gray_path, jet_path))
}

fn sorted_with_prefix(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = fs::read_dir(dir).map_err(stereo_depth_core::ConfigError::from)?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let ext = p.extension().and_then(|e| e.to_str()).unwrap_or_default();
            name.starts_with(prefix) && ext.eq_ignore_ascii_case("png")
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Pair `left_*.png` with `right_*.png` in sorted order.
pub fn find_image_pairs(dir: impl AsRef<Path>) -> Result<Vec<(PathBuf, PathBuf)>, PipelineError> {
    let dir = dir.as_ref();
    let left = sorted_with_prefix(dir, "left_")?;
    let right = sorted_with_prefix(dir, "right_")?;
    if left.len() != right.len() {
        return Err(PipelineError::Input(format!(
            "{} has {} left and {} right images",
            dir.display(),
            left.len(),
            right.len()
        )));
    }
    Ok(left.into_iter().zip(right).collect())
}

/// Detect the board in every `left_*.png` / `right_*.png` pair of `dir` and
/// add the accepted pairs to `calibrator`.
///
/// Unreadable or undetected pairs are logged, recorded in the report and
/// skipped.
pub fn add_directory_pairs(
    calibrator: &mut StereoCalibrator,
    dir: impl AsRef<Path>,
) -> Result<BatchReport, PipelineError> {
    let pairs = find_image_pairs(&dir)?;
    info!("{} image pairs in {}", pairs.len(), dir.as_ref().display());

    let mut report = BatchReport::default();
    for (index, (left_path, right_path)) in pairs.iter().enumerate() {
        let name = left_path.file_name().and_then(|n| n.to_str()).unwrap_or("?");
        let (left, right) = match (load_gray(left_path), load_gray(right_path)) {
            (Ok(l), Ok(r)) => (l, r),
            (Err(e), _) | (_, Err(e)) => {
                warn!("pair {index} ({name}) unreadable: {e}");
                report.unreadable.push((index, e.to_string()));
                continue;
            }
        };
        match calibrator.add_image_pair(&left.view(), &right.view()) {
            Ok(()) => report.accepted += 1,
            Err(e) => {
                warn!("pair {index} ({name}) skipped: {e}");
                report.rejected.push((index, e));
            }
        }
    }
    info!(
        "{} of {} pairs accepted, {} unreadable",
        report.accepted,
        pairs.len(),
        report.unreadable.len()
    );
    Ok(report)
}

/// Calibrate from a folder of `left_*.png` / `right_*.png` pairs.
///
/// See [`add_directory_pairs`]; the calibration itself still needs enough
/// accepted pairs.
pub fn calibrate_directory(
    dir: impl AsRef<Path>,
    board: ChessboardGeometry,
    image_size: ImageSize,
    options: CalibrationOptions,
) -> Result<(CalibrationResult, BatchReport), PipelineError> {
    let mut calibrator = StereoCalibrator::new(board, image_size, options);
    let report = add_directory_pairs(&mut calibrator, dir)?;
    let result = calibrator.calibrate()?;
    Ok((result, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_depth_calib::CalibrationError;

    fn write_blank(path: PathBuf) {
        save_gray(&GrayImage::filled(64, 48, 128), path).expect("save");
    }

    #[test]
    fn unreadable_pairs_are_recorded_by_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("left_0.png"), b"not a png").expect("write");
        write_blank(dir.path().join("right_0.png"));
        write_blank(dir.path().join("left_1.png"));
        write_blank(dir.path().join("right_1.png"));

        let mut calibrator = StereoCalibrator::new(
            ChessboardGeometry::default(),
            ImageSize::new(64, 48),
            CalibrationOptions::default(),
        );
        let report = add_directory_pairs(&mut calibrator, dir.path()).expect("report");
        assert_eq!(report.accepted, 0);
        assert_eq!(report.unreadable.len(), 1);
        assert_eq!(report.unreadable[0].0, 0);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].0, 1);
        assert_eq!(report.skipped(), 2);
        assert_eq!(calibrator.pair_count(), 0);

        let err = calibrate_directory(
            dir.path(),
            ChessboardGeometry::default(),
            ImageSize::new(64, 48),
            CalibrationOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Calibration(CalibrationError::InsufficientObservations { found: 0, .. })
        ));
    }
}
