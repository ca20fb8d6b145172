// ---------------------------------------------------------------------------
// Order statistics with linear interpolation (Hyndman & Fan type 7)
// ---------------------------------------------------------------------------

/// The `p`-th quantile of **pre-sorted** data, interpolating linearly
/// between adjacent ranks.
///
/// For sorted `x[0..n]`: `h = (n − 1)·p`, `j = ⌊h⌋`, `g = h − j`, and the
/// result is `(1 − g)·x[j] + g·x[j+1]`. This is the default of R's
/// `quantile()` and of NumPy.
///
/// Returns `None` for empty input or `p` outside `[0, 1]`.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 || !(0.0..=1.0).contains(&p) {
        return None;
    }
    if n == 1 {
        return Some(sorted[0]);
    }

    let h = (n - 1) as f64 * p;
    let j = h.floor() as usize;
    let g = h - h.floor();

    if j + 1 >= n {
        Some(sorted[n - 1])
    } else if g == 0.0 {
        // Exact rank: avoid 0 * inf when neighbours are infinite.
        Some(sorted[j])
    } else {
        Some(sorted[j] + g * (sorted[j + 1] - sorted[j]))
    }
}

/// Sort a copy of `data` and take several quantiles from it at once.
///
/// Returns `None` if `data` is empty, contains NaN, or any `p` is outside
/// `[0, 1]`.
pub fn quantiles(data: &[f64], probs: &[f64]) -> Option<Vec<f64>> {
    if data.is_empty() || data.iter().any(|x| x.is_nan()) {
        return None;
    }
    let mut sorted = data.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    probs.iter().map(|&p| quantile_sorted(&sorted, p)).collect()
}

/// Median of unsorted data.
pub fn median(data: &[f64]) -> Option<f64> {
    quantiles(data, &[0.5]).map(|q| q[0])
}

/// Median absolute deviation scaled by 1.4826 so it estimates the standard
/// deviation of normally distributed data.
pub fn mad_sd(data: &[f64]) -> Option<f64> {
    let m = median(data)?;
    let deviations: Vec<f64> = data.iter().map(|x| (x - m).abs()).collect();
    median(&deviations).map(|mad| 1.4826 * mad)
}

/// Arithmetic mean; `None` for empty input.
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Sample standard deviation (n − 1 denominator); `None` below two values.
pub fn std_dev(data: &[f64]) -> Option<f64> {
    if data.len() < 2 {
        return None;
    }
    let m = mean(data)?;
    let ss: f64 = data.iter().map(|x| (x - m).powi(2)).sum();
    Some((ss / (data.len() - 1) as f64).sqrt())
}
