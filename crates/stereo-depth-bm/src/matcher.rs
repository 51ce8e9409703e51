//! Per-row SAD search with texture, uniqueness and subpixel refinement.
//!
//! Rows are independent: a row reads only the two prefiltered images and the
//! left integral image, and writes only its own output cells.

use crate::params::BlockMatchParameters;
use crate::prefilter::Integral;
use crate::DISP_SCALE;

pub(crate) struct Matcher<'a> {
    /// Prefiltered left and right images, row-major.
    pub left: &'a [u8],
    pub right: &'a [u8],
    pub width: usize,
    pub height: usize,
    /// Summed-area tables of the raw left image, for the texture filter.
    pub texture: &'a Integral,
    pub params: &'a BlockMatchParameters,
}

impl Matcher<'_> {
    /// Columns `[lo, hi)` whose window stays inside the right image for every
    /// candidate disparity.
    pub(crate) fn x_range(&self) -> Option<(usize, usize)> {
        let w = self.width as i64;
        let hw = (self.params.window_size / 2) as i64;
        let min_d = self.params.min_disparity as i64;
        let max_d = min_d + self.params.num_disparities as i64 - 1;
        let lo = hw.max(hw + max_d);
        let hi = (w - hw).min(w - hw + min_d);
        (lo < hi).then_some((lo as usize, hi as usize))
    }

    pub(crate) fn match_row(&self, y: usize, row: &mut [i16]) {
        let p = self.params;
        row.fill(p.invalid_value());

        let w = self.width;
        let win = p.window_size as usize;
        let hw = win / 2;
        if y < hw || y + hw >= self.height {
            return;
        }
        let Some((lo, hi)) = self.x_range() else {
            return;
        };

        let nd = p.num_disparities as usize;
        let min_d = p.min_disparity as i64;
        let col_lo = lo - hw;
        let col_hi = hi + hw;
        let mut costs = vec![0u32; (hi - lo) * nd];
        let mut prefix = vec![0u32; col_hi - col_lo + 1];

        for k in 0..nd {
            let d = min_d + k as i64;
            for (i, xc) in (col_lo..col_hi).enumerate() {
                let xr = (xc as i64 - d) as usize;
                let mut s = 0u32;
                for yy in y - hw..=y + hw {
                    let a = self.left[yy * w + xc];
                    let b = self.right[yy * w + xr];
                    s += a.abs_diff(b) as u32;
                }
                prefix[i + 1] = prefix[i] + s;
            }
            for x in lo..hi {
                let i = x - lo;
                costs[i * nd + k] = prefix[i + win] - prefix[i];
            }
        }

        let texture_threshold = p.texture_threshold as f64;
        let pfs = p.prefilter_size as usize;
        for x in lo..hi {
            if p.texture_threshold > 0 && self.texture.variance(x, y, pfs) < texture_threshold {
                continue;
            }
            let c = &costs[(x - lo) * nd..(x - lo + 1) * nd];
            if let Some(v) = self.select(c) {
                row[x] = v;
            }
        }
    }

    /// Winner-take-all over one cost curve; `None` if the match is not unique.
    fn select(&self, c: &[u32]) -> Option<i16> {
        let p = self.params;
        let nd = c.len();
        let (best, &best_cost) = c
            .iter()
            .enumerate()
            .min_by_key(|&(k, &v)| (v, k))?;

        if p.uniqueness_ratio > 0 {
            let keep = (100 - p.uniqueness_ratio) as u64;
            let ambiguous = c.iter().enumerate().any(|(k, &v)| {
                k.abs_diff(best) > 1 && (v as u64) * keep < (best_cost as u64) * 100
            });
            if ambiguous {
                return None;
            }
        }

        let mut delta = 0.0;
        if best > 0 && best + 1 < nd {
            let prev = c[best - 1] as f64;
            let next = c[best + 1] as f64;
            let denom = prev + next - 2.0 * best_cost as f64;
            if denom > 0.0 {
                delta = (prev - next) / (2.0 * denom);
            }
        }
        let d = p.min_disparity as f64 + best as f64 + delta;
        Some((d * DISP_SCALE as f64).round() as i16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_depth_core::GrayImage;

    fn matcher_for<'a>(
        params: &'a BlockMatchParameters,
        integral: &'a Integral,
        width: usize,
        height: usize,
    ) -> Matcher<'a> {
        Matcher {
            left: &[],
            right: &[],
            width,
            height,
            texture: integral,
            params,
        }
    }

    #[test]
    fn x_range_accounts_for_disparity_span() {
        let img = GrayImage::new(100, 10);
        let integral = Integral::new(&img.view());
        let params = BlockMatchParameters {
            min_disparity: 0,
            num_disparities: 16,
            ..Default::default()
        };
        let m = matcher_for(&params, &integral, 100, 10);
        assert_eq!(m.x_range(), Some((17, 98)));

        let negative = BlockMatchParameters {
            min_disparity: -25,
            num_disparities: 16,
            ..Default::default()
        };
        let m = matcher_for(&negative, &integral, 100, 10);
        assert_eq!(m.x_range(), Some((2, 73)));

        let wide = BlockMatchParameters {
            min_disparity: 0,
            num_disparities: 112,
            ..Default::default()
        };
        assert_eq!(matcher_for(&wide, &integral, 100, 10).x_range(), None);
    }

    #[test]
    fn select_refines_symmetric_minimum_and_rejects_ambiguity() {
        let img = GrayImage::new(4, 4);
        let integral = Integral::new(&img.view());
        let params = BlockMatchParameters {
            min_disparity: 0,
            num_disparities: 16,
            uniqueness_ratio: 10,
            ..Default::default()
        };
        let m = matcher_for(&params, &integral, 4, 4);

        let mut curve = vec![1000u32; 16];
        curve[5] = 100;
        curve[4] = 300;
        curve[6] = 300;
        assert_eq!(m.select(&curve), Some(5 * 16));

        curve[6] = 200;
        // Vertex shifts toward the cheaper neighbour: (300 - 200) / (2 * 300) = 1/6.
        assert_eq!(m.select(&curve), Some(83));

        curve[12] = 105;
        assert_eq!(m.select(&curve), None);
    }
}
