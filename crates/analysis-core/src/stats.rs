//! Small statistics helpers shared by the analytics and valuation engines.
//!
//! All of them return `None` for empty input rather than a zero, since a zero
//! mean or median would be indistinguishable from real data downstream.

/// Arithmetic mean, `None` when `data` is empty.
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Median (average of the two middle values on even counts).
pub fn median(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Values that are present and strictly positive.
pub fn positive_values<I>(values: I) -> Vec<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    values
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect()
}

/// Percent change from `base` to `latest`, `None` when `base` is not positive.
pub fn percent_change(base: f64, latest: f64) -> Option<f64> {
    if base <= 0.0 {
        return None;
    }
    Some((latest - base) / base * 100.0)
}
