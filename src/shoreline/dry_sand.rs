use crate::config::ExtractionParams;
use crate::models::Transect;
use crate::raster::{ScalarField, WorldGrid};
use crate::shoreline::transects::sample_transect;

/// Gaussian smoothing with half-sample symmetric boundaries, kernel truncated at 4 sigma.
pub fn gaussian_smooth(data: &[f64], sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 || data.is_empty() {
        return data.to_vec();
    }
    let radius = (4.0 * sigma + 0.5) as i64;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|k| (-0.5 * (k as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();

    let n = data.len() as i64;
    let reflect = |mut i: i64| {
        // Fold into [0, 2n) then mirror the upper half
        let period = 2 * n;
        i = i.rem_euclid(period);
        if i >= n { period - 1 - i } else { i }
    };

    (0..n)
        .map(|i| {
            weights
                .iter()
                .zip(-radius..=radius)
                .map(|(w, k)| w * data[reflect(i + k) as usize])
                .sum::<f64>()
                / total
        })
        .collect()
}

/// Second-order central differences inside, one-sided at the ends.
pub fn gradient(data: &[f64]) -> Vec<f64> {
    let n = data.len();
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n)
            .map(|i| match i {
                0 => data[1] - data[0],
                i if i == n - 1 => data[n - 1] - data[n - 2],
                i => (data[i + 1] - data[i - 1]) / 2.0,
            })
            .collect(),
    }
}

/// Steepest brightness drop between the landward end and the shoreline.
///
/// Returns the world position of the drop when it is at least
/// `params.dry_gradient_threshold` per sample.
pub fn find_dry_sand(
    brightness: &ScalarField,
    grid: &WorldGrid,
    transect: &Transect,
    shoreline_along: f64,
    params: &ExtractionParams,
) -> Option<[f64; 2]> {
    let profile = sample_transect(brightness, grid, transect);

    let shore_idx = profile
        .iter()
        .enumerate()
        .min_by(|a, b| {
            (a.1.distance - shoreline_along)
                .abs()
                .total_cmp(&(b.1.distance - shoreline_along).abs())
        })
        .map(|(i, _)| i)?;
    if shore_idx <= 2 {
        return None;
    }

    let (distances, values): (Vec<f64>, Vec<f64>) = profile[..shore_idx]
        .iter()
        .filter_map(|s| s.value.map(|v| (s.distance, v)))
        .unzip();
    if values.len() < params.min_inland_samples.max(2) {
        return None;
    }

    let smoothed = gaussian_smooth(&values, params.dry_smoothing_sigma);
    let (idx, drop) = gradient(&smoothed)
        .into_iter()
        .map(|g| -g)
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    (drop >= params.dry_gradient_threshold).then(|| transect.to_world(distances[idx], 0.0))
}
