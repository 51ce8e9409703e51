//! Block-matching parameters, validation and slider normalization.
//!
//! [`BlockMatchParameters::validate`] rejects invalid combinations and never
//! changes a value. Rounding raw UI input to a valid value is a separate,
//! explicit step ([`BlockMatchParameters::normalized`],
//! [`BlockMatchParameters::with_normalized`]): the nearest valid value wins,
//! ties go upward, and the result is clamped to the slider range.

use serde::{Deserialize, Serialize};
use stereo_depth_core::ImageSize;

/// Prefilter applied to both images before matching.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrefilterType {
    /// `clamp(I - mean(I), -cap, cap) + cap` over a `preFilterSize` window.
    #[default]
    NormalizedResponse,
    /// `clamp(sobel_x(I), -cap, cap) + cap`.
    XSobel,
}

/// Why a parameter set or an input pair was rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("SADWindowSize must be odd and in 5..=255, got {0}")]
    WindowSize(i32),

    #[error("preFilterSize must be odd and in 5..=255, got {0}")]
    PrefilterSize(i32),

    #[error("preFilterCap must be in 1..=63, got {0}")]
    PrefilterCap(i32),

    #[error("numberOfDisparities must be a positive multiple of 16, got {0}")]
    NumDisparities(i32),

    #[error("disparity range [{min}, {min} + {num}) does not fit the fixed-point output")]
    DisparityRange { min: i32, num: i32 },

    #[error("uniquenessRatio must be in 0..=100, got {0}")]
    UniquenessRatio(i32),

    #[error("{name} must not be negative, got {value}")]
    Negative { name: &'static str, value: i32 },

    #[error("left image is {left}, right image is {right}")]
    SizeMismatch { left: ImageSize, right: ImageSize },

    #[error("image {size} is smaller than the {window}x{window} matching window")]
    ImageTooSmall { size: ImageSize, window: i32 },
}

/// One tunable field, as exposed to a slider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parameter {
    WindowSize,
    PrefilterSize,
    PrefilterCap,
    MinDisparity,
    NumDisparities,
    TextureThreshold,
    UniquenessRatio,
    SpeckleRange,
    SpeckleWindowSize,
}

/// Rounding rule applied by a slider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Granularity {
    Integer,
    Odd,
    MultipleOf(i32),
}

/// Inclusive slider range plus rounding rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SliderRange {
    pub min: i32,
    pub max: i32,
    pub granularity: Granularity,
}

impl SliderRange {
    const fn new(min: i32, max: i32, granularity: Granularity) -> Self {
        Self {
            min,
            max,
            granularity,
        }
    }

    /// Nearest valid value (ties upward), clamped into the range. NaN maps to `min`.
    pub fn normalize(&self, raw: f64) -> i32 {
        if raw.is_nan() {
            return self.min;
        }
        let raw = raw.clamp(self.min as f64 - 1.0, self.max as f64 + 1.0);
        let v = match self.granularity {
            Granularity::Integer => (raw + 0.5).floor() as i32,
            Granularity::Odd => 2 * ((raw - 1.0) / 2.0 + 0.5).floor() as i32 + 1,
            Granularity::MultipleOf(m) => m * (raw / m as f64 + 0.5).floor() as i32,
        };
        v.clamp(self.min, self.max)
    }
}

impl Parameter {
    pub const ALL: [Parameter; 9] = [
        Parameter::WindowSize,
        Parameter::PrefilterSize,
        Parameter::PrefilterCap,
        Parameter::MinDisparity,
        Parameter::NumDisparities,
        Parameter::TextureThreshold,
        Parameter::UniquenessRatio,
        Parameter::SpeckleRange,
        Parameter::SpeckleWindowSize,
    ];

    /// Key used in parameter files.
    pub fn key(self) -> &'static str {
        match self {
            Parameter::WindowSize => "SADWindowSize",
            Parameter::PrefilterSize => "preFilterSize",
            Parameter::PrefilterCap => "preFilterCap",
            Parameter::MinDisparity => "minDisparity",
            Parameter::NumDisparities => "numberOfDisparities",
            Parameter::TextureThreshold => "textureThreshold",
            Parameter::UniquenessRatio => "uniquenessRatio",
            Parameter::SpeckleRange => "speckleRange",
            Parameter::SpeckleWindowSize => "speckleWindowSize",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.key() == key)
    }

    pub fn range(self) -> SliderRange {
        use Granularity::*;
        match self {
            Parameter::WindowSize => SliderRange::new(5, 255, Odd),
            Parameter::PrefilterSize => SliderRange::new(5, 255, Odd),
            Parameter::PrefilterCap => SliderRange::new(5, 63, Odd),
            Parameter::MinDisparity => SliderRange::new(-100, 100, Integer),
            Parameter::NumDisparities => SliderRange::new(16, 256, MultipleOf(16)),
            Parameter::TextureThreshold => SliderRange::new(0, 1000, Integer),
            Parameter::UniquenessRatio => SliderRange::new(1, 20, Integer),
            Parameter::SpeckleRange => SliderRange::new(0, 40, Integer),
            Parameter::SpeckleWindowSize => SliderRange::new(0, 300, Integer),
        }
    }
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Block-matching settings. Serialized with the classic StereoBM key names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockMatchParameters {
    #[serde(rename = "SADWindowSize")]
    pub window_size: i32,
    #[serde(rename = "preFilterSize")]
    pub prefilter_size: i32,
    #[serde(rename = "preFilterCap")]
    pub prefilter_cap: i32,
    #[serde(rename = "minDisparity")]
    pub min_disparity: i32,
    #[serde(rename = "numberOfDisparities")]
    pub num_disparities: i32,
    #[serde(rename = "textureThreshold")]
    pub texture_threshold: i32,
    #[serde(rename = "uniquenessRatio")]
    pub uniqueness_ratio: i32,
    #[serde(rename = "speckleRange")]
    pub speckle_range: i32,
    #[serde(rename = "speckleWindowSize")]
    pub speckle_window_size: i32,
    #[serde(rename = "preFilterType", default)]
    pub prefilter_type: PrefilterType,
}

impl Default for BlockMatchParameters {
    fn default() -> Self {
        Self {
            window_size: 5,
            prefilter_size: 5,
            prefilter_cap: 29,
            min_disparity: -25,
            num_disparities: 128,
            texture_threshold: 100,
            uniqueness_ratio: 10,
            speckle_range: 15,
            speckle_window_size: 100,
            prefilter_type: PrefilterType::NormalizedResponse,
        }
    }
}

fn odd_in(v: i32, lo: i32, hi: i32) -> bool {
    v % 2 != 0 && (lo..=hi).contains(&v)
}

impl BlockMatchParameters {
    /// Check every invariant. Values are never adjusted here.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if !odd_in(self.window_size, 5, 255) {
            return Err(ParameterError::WindowSize(self.window_size));
        }
        if !odd_in(self.prefilter_size, 5, 255) {
            return Err(ParameterError::PrefilterSize(self.prefilter_size));
        }
        if !(1..=63).contains(&self.prefilter_cap) {
            return Err(ParameterError::PrefilterCap(self.prefilter_cap));
        }
        if self.num_disparities <= 0 || self.num_disparities % 16 != 0 {
            return Err(ParameterError::NumDisparities(self.num_disparities));
        }
        // Sentinel (min - 1) and max disparity must both fit in i16 after scaling by 16.
        let lowest = (self.min_disparity as i64 - 1) * 16;
        let highest = (self.min_disparity as i64 + self.num_disparities as i64) * 16;
        if lowest < i16::MIN as i64 || highest > i16::MAX as i64 {
            return Err(ParameterError::DisparityRange {
                min: self.min_disparity,
                num: self.num_disparities,
            });
        }
        if !(0..=100).contains(&self.uniqueness_ratio) {
            return Err(ParameterError::UniquenessRatio(self.uniqueness_ratio));
        }
        for (name, value) in [
            ("textureThreshold", self.texture_threshold),
            ("speckleRange", self.speckle_range),
            ("speckleWindowSize", self.speckle_window_size),
        ] {
            if value < 0 {
                return Err(ParameterError::Negative { name, value });
            }
        }
        Ok(())
    }

    pub fn get(&self, p: Parameter) -> i32 {
        match p {
            Parameter::WindowSize => self.window_size,
            Parameter::PrefilterSize => self.prefilter_size,
            Parameter::PrefilterCap => self.prefilter_cap,
            Parameter::MinDisparity => self.min_disparity,
            Parameter::NumDisparities => self.num_disparities,
            Parameter::TextureThreshold => self.texture_threshold,
            Parameter::UniquenessRatio => self.uniqueness_ratio,
            Parameter::SpeckleRange => self.speckle_range,
            Parameter::SpeckleWindowSize => self.speckle_window_size,
        }
    }

    fn slot(&mut self, p: Parameter) -> &mut i32 {
        match p {
            Parameter::WindowSize => &mut self.window_size,
            Parameter::PrefilterSize => &mut self.prefilter_size,
            Parameter::PrefilterCap => &mut self.prefilter_cap,
            Parameter::MinDisparity => &mut self.min_disparity,
            Parameter::NumDisparities => &mut self.num_disparities,
            Parameter::TextureThreshold => &mut self.texture_threshold,
            Parameter::UniquenessRatio => &mut self.uniqueness_ratio,
            Parameter::SpeckleRange => &mut self.speckle_range,
            Parameter::SpeckleWindowSize => &mut self.speckle_window_size,
        }
    }

    /// Copy with `p` set to `value` as-is (no normalization).
    pub fn with(mut self, p: Parameter, value: i32) -> Self {
        *self.slot(p) = value;
        self
    }

    /// Copy with `p` set from a raw slider value, normalized to its range.
    pub fn with_normalized(self, p: Parameter, raw: f64) -> Self {
        self.with(p, p.range().normalize(raw))
    }

    /// Copy with every field normalized to its slider range.
    pub fn normalized(&self) -> Self {
        Parameter::ALL
            .into_iter()
            .fold(*self, |acc, p| acc.with_normalized(p, self.get(p) as f64))
    }

    /// Invalid-pixel sentinel in fixed-point units.
    pub fn invalid_value(&self) -> i16 {
        ((self.min_disparity - 1) * crate::DISP_SCALE) as i16
    }
}

/// Nearest odd window size in the slider range.
pub fn normalize_window_size(raw: f64) -> i32 {
    Parameter::WindowSize.range().normalize(raw)
}

/// Nearest positive multiple of 16 in the slider range.
pub fn normalize_num_disparities(raw: f64) -> i32 {
    Parameter::NumDisparities.range().normalize(raw)
}
