use crate::numeric::round2;
use std::collections::BTreeMap;

/// Pearson correlation of two position-aligned series.
///
/// Pairs beyond the shorter series are ignored. Fewer than two pairs, or a
/// series with no variance, gives 0. The result is clamped to [-1, 1].
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .collect();
    let n = pairs.len();
    if n < 2 {
        return 0.0;
    }

    let mean_a = pairs.iter().map(|(x, _)| x).sum::<f64>() / n as f64;
    let mean_b = pairs.iter().map(|(_, y)| y).sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in &pairs {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denominator = (var_a * var_b).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    (cov / denominator).clamp(-1.0, 1.0)
}

/// Pearson correlation over the keys present in both series.
pub fn pearson_aligned<K: Ord>(a: &BTreeMap<K, f64>, b: &BTreeMap<K, f64>) -> f64 {
    let (xs, ys): (Vec<f64>, Vec<f64>) = a
        .iter()
        .filter_map(|(k, x)| b.get(k).map(|y| (*x, *y)))
        .unzip();
    pearson(&xs, &ys)
}

/// Reindexes two series onto the union of their keys, filling gaps with 0.
pub fn align_union<K: Ord + Clone>(a: &BTreeMap<K, f64>, b: &BTreeMap<K, f64>) -> Vec<(K, f64, f64)> {
    let mut keys: Vec<&K> = a.keys().chain(b.keys()).collect();
    keys.sort();
    keys.dedup();
    keys.into_iter()
        .map(|k| {
            (
                k.clone(),
                a.get(k).copied().unwrap_or(0.0),
                b.get(k).copied().unwrap_or(0.0),
            )
        })
        .collect()
}

/// `numerator / denominator * 100` rounded to two places; 0 when the
/// denominator is zero or missing.
pub fn ratio(numerator: f64, denominator: Option<f64>) -> f64 {
    safe_div(numerator * 100.0, denominator)
}

/// `numerator / denominator` rounded to two places; 0 when the denominator
/// is zero or missing.
pub fn safe_div(numerator: f64, denominator: Option<f64>) -> f64 {
    match denominator {
        Some(d) if d != 0.0 && d.is_finite() && numerator.is_finite() => round2(numerator / d),
        _ => 0.0,
    }
}
