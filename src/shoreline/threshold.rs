/// Grid resolution for locating density peaks.
const KDE_POINTS: usize = 400;
const OTSU_BINS: usize = 256;

/// Gaussian kernel density estimate with Scott's rule bandwidth.
pub struct Kde<'a> {
    samples: &'a [f64],
    bandwidth: f64,
}

impl<'a> Kde<'a> {
    /// `None` for fewer than two samples or zero spread.
    pub fn new(samples: &'a [f64]) -> Option<Self> {
        let n = samples.len();
        if n < 2 {
            return None;
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        let bandwidth = var.sqrt() * (n as f64).powf(-0.2);
        (bandwidth > 0.0 && bandwidth.is_finite()).then_some(Self { samples, bandwidth })
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn density(&self, x: f64) -> f64 {
        let h = self.bandwidth;
        let norm = 1.0 / (self.samples.len() as f64 * h * (2.0 * std::f64::consts::PI).sqrt());
        self.samples
            .iter()
            .map(|s| (-0.5 * ((x - s) / h).powi(2)).exp())
            .sum::<f64>()
            * norm
    }
}

/// Otsu's threshold over a 256-bin histogram spanning the sample range.
pub fn otsu(samples: &[f64]) -> Option<f64> {
    let (lo, hi) = min_max(samples)?;
    if hi <= lo {
        return None;
    }
    let width = (hi - lo) / OTSU_BINS as f64;
    let mut hist = [0f64; OTSU_BINS];
    for &v in samples {
        let bin = (((v - lo) / width) as usize).min(OTSU_BINS - 1);
        hist[bin] += 1.0;
    }
    let centers: Vec<f64> = (0..OTSU_BINS).map(|i| lo + (i as f64 + 0.5) * width).collect();

    // Class weights and means for a split after bin i
    let mut w_low = [0f64; OTSU_BINS];
    let mut m_low = [0f64; OTSU_BINS];
    let (mut w, mut s) = (0.0, 0.0);
    for i in 0..OTSU_BINS {
        w += hist[i];
        s += hist[i] * centers[i];
        w_low[i] = w;
        m_low[i] = if w > 0.0 { s / w } else { 0.0 };
    }
    let mut w_high = [0f64; OTSU_BINS];
    let mut m_high = [0f64; OTSU_BINS];
    let (mut w, mut s) = (0.0, 0.0);
    for i in (0..OTSU_BINS).rev() {
        w += hist[i];
        s += hist[i] * centers[i];
        w_high[i] = w;
        m_high[i] = if w > 0.0 { s / w } else { 0.0 };
    }

    let mut best = (0, f64::NEG_INFINITY);
    for i in 0..OTSU_BINS - 1 {
        let between = w_low[i] * w_high[i + 1] * (m_low[i] - m_high[i + 1]).powi(2);
        if between > best.1 {
            best = (i, between);
        }
    }
    Some(centers[best.0])
}

/// Threshold biased toward the wet mode.
pub fn classification_threshold(wet_peak: f64, dry_peak: f64) -> f64 {
    wet_peak / 3.0 + 2.0 * dry_peak / 3.0
}

/// Land/water threshold on the red-minus-blue distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorThreshold {
    pub otsu: f64,
    pub wet_peak: f64,
    pub dry_peak: f64,
    pub value: f64,
}

impl ColorThreshold {
    /// Fit from pooled samples, or `None` if the distribution is not bimodal
    /// around its Otsu split.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        let kde = Kde::new(samples)?;
        let anchor = otsu(samples)?;
        let (lo, hi) = min_max(samples)?;

        let step = (hi - lo) / (KDE_POINTS - 1) as f64;
        let mut wet: Option<(f64, f64)> = None;
        let mut dry: Option<(f64, f64)> = None;
        for i in 0..KDE_POINTS {
            let x = lo + i as f64 * step;
            let d = kde.density(x);
            let side = if x < anchor {
                &mut wet
            } else if x > anchor {
                &mut dry
            } else {
                continue;
            };
            if side.is_none_or(|(_, best)| d > best) {
                *side = Some((x, d));
            }
        }

        let (wet_peak, dry_peak) = (wet?.0, dry?.0);
        Some(Self {
            otsu: anchor,
            wet_peak,
            dry_peak,
            value: classification_threshold(wet_peak, dry_peak),
        })
    }
}

fn min_max(samples: &[f64]) -> Option<(f64, f64)> {
    let mut it = samples.iter().copied().filter(|v| v.is_finite());
    let first = it.next()?;
    Some(it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
}
