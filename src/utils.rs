/// Evenly spaced values in the half-open interval `[start, stop)`.
///
/// The number of values is `ceil((stop - start) / step)`, and each value is
/// computed from its index so that rounding does not accumulate.
pub fn arange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if !(step > 0.0) || !(stop > start) {
        return Vec::new();
    }
    let n = ((stop - start) / step).ceil() as usize;
    (0..n)
        .map(|i| start + i as f64 * step)
        .take_while(|&t| t < stop)
        .collect()
}

/// `n` evenly spaced values in the closed interval `[start, stop]`.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { stop } else { start + i as f64 * step })
                .collect()
        }
    }
}
