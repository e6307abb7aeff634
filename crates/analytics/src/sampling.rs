use analysis_core::{Bar, PricePoint};

/// Deterministic decimation of an oldest-first series down to `points`
/// entries. Picks index `floor(i * len / points)` for each output slot, so
/// the first element is always kept and order is preserved. Series already
/// at or below `points` come back unchanged.
pub fn sample<T: Clone>(series: &[T], points: usize) -> Vec<T> {
    let len = series.len();
    if len <= points {
        return series.to_vec();
    }
    (0..points)
        .map(|i| {
            let idx = (i * len / points).min(len - 1);
            series[idx].clone()
        })
        .collect()
}

/// Closing prices sampled to a fixed-length sparkline.
pub fn sparkline(bars: &[Bar], points: usize) -> Vec<f64> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    sample(&closes, points)
}

/// Every bar as a dated close, at full resolution.
pub fn chart_series(bars: &[Bar]) -> Vec<PricePoint> {
    bars.iter().map(PricePoint::from).collect()
}
