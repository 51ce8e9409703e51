/// Invalidate small connected blobs of similar disparity.
///
/// Pixels are 4-connected when neither equals `invalid` and their values
/// differ by at most `max_diff`. Components with at most `max_size` pixels
/// are overwritten with `invalid`. `max_size == 0` disables the filter.
///
/// Returns the number of pixels removed.
pub fn filter_speckles(
    data: &mut [i16],
    width: usize,
    height: usize,
    invalid: i16,
    max_size: usize,
    max_diff: i32,
) -> usize {
    if max_size == 0 || width == 0 || height == 0 {
        return 0;
    }
    debug_assert_eq!(data.len(), width * height);

    let mut visited = vec![false; data.len()];
    let mut stack = Vec::new();
    let mut component = Vec::new();
    let mut removed = 0;

    for seed in 0..data.len() {
        if visited[seed] || data[seed] == invalid {
            continue;
        }
        visited[seed] = true;
        stack.push(seed);
        component.clear();

        while let Some(i) = stack.pop() {
            component.push(i);
            let v = data[i] as i32;
            let (x, y) = (i % width, i / width);
            let neighbors = [
                (x + 1 < width).then(|| i + 1),
                (x > 0).then(|| i - 1),
                (y + 1 < height).then(|| i + width),
                (y > 0).then(|| i - width),
            ];
            for j in neighbors.into_iter().flatten() {
                if visited[j] || data[j] == invalid {
                    continue;
                }
                if (data[j] as i32 - v).abs() <= max_diff {
                    visited[j] = true;
                    stack.push(j);
                }
            }
        }

        if component.len() <= max_size {
            for &i in &component {
                data[i] = invalid;
            }
            removed += component.len();
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    const X: i16 = -16;

    #[test]
    fn small_island_is_removed_large_region_kept() {
        #[rustfmt::skip]
        let mut data = vec![
            160, 160, 160, 160, 160, 160,
            160, 160, 160, 160, 160, 160,
            160, 160, 480, 160, 160, 160,
            160, 160, 160, 160, 160, 160,
        ];
        let removed = filter_speckles(&mut data, 6, 4, X, 3, 32);
        assert_eq!(removed, 1);
        assert_eq!(data[2 * 6 + 2], X);
        assert!(data.iter().filter(|&&v| v == 160).count() == 23);
    }

    #[test]
    fn gradual_ramp_is_one_component() {
        let mut data: Vec<i16> = (0..20).map(|i| 100 + 10 * i as i16).collect();
        assert_eq!(filter_speckles(&mut data, 20, 1, X, 10, 16), 0);
        let mut steps: Vec<i16> = (0..20).map(|i| 100 + 40 * i as i16).collect();
        assert_eq!(filter_speckles(&mut steps, 20, 1, X, 1, 16), 20);
        assert!(steps.iter().all(|&v| v == X));
    }

    #[test]
    fn zero_window_disables_filter() {
        let mut data = vec![160, X, 480];
        assert_eq!(filter_speckles(&mut data, 3, 1, X, 0, 0), 0);
        assert_eq!(data, vec![160, X, 480]);
    }
}
