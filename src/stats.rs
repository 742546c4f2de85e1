//! Small descriptive statistics used by reporting and the charts

/// Linearly interpolated quantile of already sorted, non-empty values
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Five-number summary plus Tukey whiskers for a box plot
#[derive(Debug, Clone, PartialEq)]
pub struct BoxStats {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    /// Lowest value within `q1 - 1.5 * IQR`
    pub lower_whisker: f64,
    /// Highest value within `q3 + 1.5 * IQR`
    pub upper_whisker: f64,
    /// Values beyond the whiskers
    pub outliers: Vec<f64>,
}

impl BoxStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let q1 = quantile_sorted(&sorted, 0.25);
        let median = quantile_sorted(&sorted, 0.5);
        let q3 = quantile_sorted(&sorted, 0.75);
        let fence = 1.5 * (q3 - q1);
        let (low_fence, high_fence) = (q1 - fence, q3 + fence);

        let inside = sorted
            .iter()
            .copied()
            .filter(|v| (low_fence..=high_fence).contains(v));
        let lower_whisker = inside.clone().fold(f64::INFINITY, f64::min);
        let upper_whisker = inside.fold(f64::NEG_INFINITY, f64::max);
        let outliers = sorted
            .iter()
            .copied()
            .filter(|v| !(low_fence..=high_fence).contains(v))
            .collect();

        Some(Self {
            q1,
            median,
            q3,
            lower_whisker,
            upper_whisker,
            outliers,
        })
    }
}

/// Equal-width bins over `[min, max]`
#[derive(Debug, Clone, PartialEq)]
pub struct Bins {
    pub min: f64,
    pub width: f64,
    pub count: usize,
}

impl Bins {
    /// Span the given values with `count` bins; a zero-width span is widened
    /// to one unit so every value still lands in a bin
    pub fn spanning(values: &[f64], count: usize) -> Option<Self> {
        if values.is_empty() || count == 0 {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let span = if max > min { max - min } else { 1.0 };
        Some(Self {
            min,
            width: span / count as f64,
            count,
        })
    }

    /// Bin index for a value; the right edge belongs to the last bin
    pub fn index(&self, value: f64) -> usize {
        let raw = ((value - self.min) / self.width).floor();
        (raw.max(0.0) as usize).min(self.count - 1)
    }

    pub fn edges(&self, index: usize) -> (f64, f64) {
        let start = self.min + self.width * index as f64;
        (start, start + self.width)
    }

    pub fn counts(&self, values: &[f64]) -> Vec<usize> {
        let mut counts = vec![0; self.count];
        for &value in values {
            counts[self.index(value)] += 1;
        }
        counts
    }
}

/// Gaussian kernel density estimate evaluated at `points` sample positions
/// spanning the data, using Silverman's rule for the bandwidth
pub fn kde(values: &[f64], points: usize) -> Vec<(f64, f64)> {
    if values.is_empty() || points < 2 {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    let bandwidth = if std_dev > 0.0 {
        1.06 * std_dev * n.powf(-0.2)
    } else {
        // all values equal: any positive width gives a single bump
        mean.abs().max(1.0) * 0.1
    };

    let min = values.iter().copied().fold(f64::INFINITY, f64::min) - 2.0 * bandwidth;
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max) + 2.0 * bandwidth;
    let step = (max - min) / (points - 1) as f64;
    let norm = 1.0 / (n * bandwidth * (2.0 * std::f64::consts::PI).sqrt());

    (0..points)
        .map(|i| {
            let x = min + step * i as f64;
            let density = values
                .iter()
                .map(|v| (-0.5 * ((x - v) / bandwidth).powi(2)).exp())
                .sum::<f64>()
                * norm;
            (x, density)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile_sorted(&values, 0.75), 3.25);
        assert_eq!(quantile_sorted(&values, 0.0), 1.0);
        assert_eq!(quantile_sorted(&values, 1.0), 4.0);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(33.333_333), 33.33);
        assert_eq!(round2(66.666_666), 66.67);
        assert_eq!(round2(30.0), 30.0);
    }

    #[test]
    fn test_box_stats_outliers() {
        let stats = BoxStats::from_values(&[1.0, 2.0, 3.0, 4.0, 100.0]).unwrap();
        assert_eq!(stats.median, 3.0);
        assert_eq!(stats.q1, 2.0);
        assert_eq!(stats.q3, 4.0);
        assert_eq!(stats.upper_whisker, 4.0);
        assert_eq!(stats.lower_whisker, 1.0);
        assert_eq!(stats.outliers, vec![100.0]);
    }

    #[test]
    fn test_box_stats_single_value() {
        let stats = BoxStats::from_values(&[7.0]).unwrap();
        assert_eq!(stats.q1, 7.0);
        assert_eq!(stats.upper_whisker, 7.0);
        assert!(stats.outliers.is_empty());
        assert!(BoxStats::from_values(&[]).is_none());
    }

    #[test]
    fn test_bins_cover_every_value() {
        let values: Vec<f64> = (0..=100).map(f64::from).collect();
        let bins = Bins::spanning(&values, 40).unwrap();
        let counts = bins.counts(&values);

        assert_eq!(counts.len(), 40);
        assert_eq!(counts.iter().sum::<usize>(), values.len());
        assert_eq!(bins.index(100.0), 39);
        assert_eq!(bins.index(0.0), 0);
    }

    #[test]
    fn test_bins_degenerate_span() {
        let bins = Bins::spanning(&[5.0, 5.0], 40).unwrap();
        assert_eq!(bins.counts(&[5.0, 5.0])[0], 2);
    }

    #[test]
    fn test_kde_is_nonnegative_and_peaks_near_data() {
        let curve = kde(&[10.0, 10.5, 11.0], 64);
        assert_eq!(curve.len(), 64);
        assert!(curve.iter().all(|&(_, d)| d >= 0.0));

        let (peak_x, _) = curve
            .iter()
            .copied()
            .fold((0.0, f64::MIN), |best, p| if p.1 > best.1 { p } else { best });
        assert!((9.5..=11.5).contains(&peak_x));
    }

    #[test]
    fn test_kde_empty() {
        assert!(kde(&[], 10).is_empty());
    }
}
