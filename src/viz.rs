//! Churn charts rendered with Plotters to SVG files

use crate::model::{ChurnStatus, ClassifiedProfile};
use crate::stats::{kde, BoxStats, Bins};
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Number of bins in the recency histogram
pub const HISTOGRAM_BINS: usize = 40;

/// Sample positions along each violin outline
const VIOLIN_POINTS: usize = 100;

const CHART_SIZE: (u32, u32) = (800, 600);

const CHURNED_COLOR: RGBColor = RGBColor(239, 85, 59);
const RETAINED_COLOR: RGBColor = RGBColor(99, 110, 250);

/// Categories in x-axis order
const GROUPS: [ChurnStatus; 2] = [ChurnStatus::Retained, ChurnStatus::Churned];

fn status_color(status: ChurnStatus) -> RGBColor {
    match status {
        ChurnStatus::Churned => CHURNED_COLOR,
        ChurnStatus::Retained => RETAINED_COLOR,
    }
}

fn group_position(status: ChurnStatus) -> f64 {
    match status {
        ChurnStatus::Retained => 0.0,
        ChurnStatus::Churned => 1.0,
    }
}

fn category_label(x: f64) -> String {
    GROUPS
        .iter()
        .find(|status| (group_position(**status) - x).abs() < 0.25)
        .map(|status| status.label().to_string())
        .unwrap_or_default()
}

/// Files written by [`render_dashboard`]
#[derive(Debug, Clone)]
pub struct ChartPaths {
    pub histogram: PathBuf,
    pub frequency_box: PathBuf,
    pub monetary_violin: PathBuf,
}

impl ChartPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            histogram: dir.join("recency_histogram.svg"),
            frequency_box: dir.join("frequency_box.svg"),
            monetary_violin: dir.join("monetary_violin.svg"),
        }
    }

    pub fn all(&self) -> [&Path; 3] {
        [&self.histogram, &self.frequency_box, &self.monetary_violin]
    }
}

/// Recency counts per bin, split by churn label
#[derive(Debug, Clone, PartialEq)]
pub struct RecencyHistogram {
    pub bins: Bins,
    pub retained: Vec<usize>,
    pub churned: Vec<usize>,
}

impl RecencyHistogram {
    pub fn from_profiles(profiles: &[ClassifiedProfile], bin_count: usize) -> Option<Self> {
        let recencies: Vec<f64> = profiles.iter().map(|p| p.recency() as f64).collect();
        let bins = Bins::spanning(&recencies, bin_count)?;
        let values_for = |status: ChurnStatus| -> Vec<f64> {
            profiles
                .iter()
                .filter(|p| p.churn == status)
                .map(|p| p.recency() as f64)
                .collect()
        };
        let retained = bins.counts(&values_for(ChurnStatus::Retained));
        let churned = bins.counts(&values_for(ChurnStatus::Churned));
        Some(Self {
            bins,
            retained,
            churned,
        })
    }

    pub fn tallest(&self) -> usize {
        self.retained
            .iter()
            .zip(&self.churned)
            .map(|(r, c)| r + c)
            .max()
            .unwrap_or(0)
    }
}

/// One numeric field split by churn label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChurnGroups {
    pub retained: Vec<f64>,
    pub churned: Vec<f64>,
}

impl ChurnGroups {
    pub fn from_profiles(
        profiles: &[ClassifiedProfile],
        field: impl Fn(&ClassifiedProfile) -> f64,
    ) -> Self {
        let mut groups = Self::default();
        for profile in profiles {
            let value = field(profile);
            match profile.churn {
                ChurnStatus::Churned => groups.churned.push(value),
                ChurnStatus::Retained => groups.retained.push(value),
            }
        }
        groups
    }

    pub fn get(&self, status: ChurnStatus) -> &[f64] {
        match status {
            ChurnStatus::Churned => &self.churned,
            ChurnStatus::Retained => &self.retained,
        }
    }

    /// Padded y-axis range covering every value (and `extra` points)
    fn value_range(&self, extra: &[f64]) -> (f64, f64) {
        let values = self.retained.iter().chain(&self.churned).chain(extra);
        let min = values.clone().copied().fold(f64::INFINITY, f64::min);
        let max = values.copied().fold(f64::NEG_INFINITY, f64::max);
        if !min.is_finite() || !max.is_finite() {
            return (0.0, 1.0);
        }
        let pad = if max > min { (max - min) * 0.05 } else { 1.0 };
        (min - pad, max + pad)
    }
}

/// Histogram of recency, 40 bins, stacked and colored by churn
pub fn create_recency_histogram(
    profiles: &[ClassifiedProfile],
    output_path: &Path,
) -> crate::Result<()> {
    let histogram = RecencyHistogram::from_profiles(profiles, HISTOGRAM_BINS);
    let (x_min, x_max) = histogram
        .as_ref()
        .map(|h| (h.bins.min, h.bins.edges(h.bins.count - 1).1))
        .unwrap_or((0.0, 1.0));
    let y_max = histogram.as_ref().map_or(1, |h| h.tallest().max(1)) as f64 * 1.1;

    let root = SVGBackend::new(output_path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Recency Distribution by Churn", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, 0f64..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Recency (days)")
        .y_desc("Customers")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    if let Some(histogram) = &histogram {
        let bins = &histogram.bins;

        let retained = RETAINED_COLOR;
        chart
            .draw_series(histogram.retained.iter().enumerate().map(|(i, &count)| {
                let (start, end) = bins.edges(i);
                Rectangle::new([(start, 0.0), (end, count as f64)], retained.mix(0.8).filled())
            }))?
            .label(ChurnStatus::Retained.label())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], retained.filled()));

        let churned = CHURNED_COLOR;
        chart
            .draw_series(histogram.churned.iter().enumerate().map(|(i, &count)| {
                let (start, end) = bins.edges(i);
                let base = histogram.retained[i] as f64;
                Rectangle::new(
                    [(start, base), (end, base + count as f64)],
                    churned.mix(0.8).filled(),
                )
            }))?
            .label(ChurnStatus::Churned.label())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], churned.filled()));

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()?;
    debug!("recency histogram saved to: {}", output_path.display());
    Ok(())
}

/// Box plot of frequency grouped by churn
pub fn create_frequency_box_plot(
    profiles: &[ClassifiedProfile],
    output_path: &Path,
) -> crate::Result<()> {
    let groups = ChurnGroups::from_profiles(profiles, |p| p.profile.frequency as f64);
    let (y_min, y_max) = groups.value_range(&[]);

    let root = SVGBackend::new(output_path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Frequency by Churn Status", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5f64..1.5f64, y_min..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(5)
        .x_label_formatter(&|x| category_label(*x))
        .x_desc("Churn")
        .y_desc("Frequency (transactions)")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for status in GROUPS {
        if let Some(stats) = BoxStats::from_values(groups.get(status)) {
            draw_box(&mut chart, group_position(status), 0.2, &stats, status_color(status))?;
        }
    }

    root.present()?;
    debug!("frequency box plot saved to: {}", output_path.display());
    Ok(())
}

/// Violin of monetary value grouped by churn, with an inline box and every
/// point shown
pub fn create_monetary_violin(
    profiles: &[ClassifiedProfile],
    output_path: &Path,
) -> crate::Result<()> {
    let groups = ChurnGroups::from_profiles(profiles, |p| p.profile.monetary);
    let curves: Vec<(ChurnStatus, Vec<(f64, f64)>)> = GROUPS
        .iter()
        .map(|&status| (status, kde(groups.get(status), VIOLIN_POINTS)))
        .collect();
    let tails: Vec<f64> = curves
        .iter()
        .flat_map(|(_, curve)| curve.iter().map(|&(y, _)| y))
        .collect();
    let (y_min, y_max) = groups.value_range(&tails);

    let root = SVGBackend::new(output_path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Spending Distribution by Churn", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(-0.5f64..1.5f64, y_min..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(5)
        .x_label_formatter(&|x| category_label(*x))
        .x_desc("Churn")
        .y_desc("Monetary (total payment)")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (status, curve) in &curves {
        let center = group_position(*status);
        let color = status_color(*status);
        let peak = curve.iter().map(|&(_, d)| d).fold(0.0, f64::max);
        if peak <= 0.0 {
            continue;
        }
        let scale = 0.4 / peak;

        let outline: Vec<(f64, f64)> = curve
            .iter()
            .map(|&(y, d)| (center + d * scale, y))
            .chain(curve.iter().rev().map(|&(y, d)| (center - d * scale, y)))
            .collect();
        chart.draw_series(std::iter::once(Polygon::new(outline, color.mix(0.3).filled())))?;

        if let Some(stats) = BoxStats::from_values(groups.get(*status)) {
            draw_box(&mut chart, center, 0.04, &stats, color)?;
        }

        let values = groups.get(*status);
        chart.draw_series(values.iter().enumerate().map(|(i, &value)| {
            Circle::new((center + jitter(i), value), 2, color.mix(0.6).filled())
        }))?;
    }

    root.present()?;
    debug!("monetary violin saved to: {}", output_path.display());
    Ok(())
}

/// Deterministic horizontal offset in `[-0.15, 0.15)` for point `i`
fn jitter(i: usize) -> f64 {
    const GOLDEN: f64 = 0.618_033_988_75;
    ((i as f64 * GOLDEN).fract() - 0.5) * 0.3
}

fn draw_box(
    chart: &mut ChartContext<'_, SVGBackend<'_>, Cartesian2d<RangedCoordf64, RangedCoordf64>>,
    center: f64,
    half_width: f64,
    stats: &BoxStats,
    color: RGBColor,
) -> crate::Result<()> {
    let (left, right) = (center - half_width, center + half_width);
    let stroke = color.stroke_width(2);

    chart
        .draw_series(std::iter::once(Rectangle::new(
            [(left, stats.q1), (right, stats.q3)],
            color.mix(0.4).filled(),
        )))?;

    let lines = [
        vec![(left, stats.median), (right, stats.median)],
        vec![(center, stats.q3), (center, stats.upper_whisker)],
        vec![(center, stats.q1), (center, stats.lower_whisker)],
        vec![
            (center - half_width / 2.0, stats.upper_whisker),
            (center + half_width / 2.0, stats.upper_whisker),
        ],
        vec![
            (center - half_width / 2.0, stats.lower_whisker),
            (center + half_width / 2.0, stats.lower_whisker),
        ],
    ];
    chart
        .draw_series(lines.into_iter().map(|points| PathElement::new(points, stroke)))?;

    chart
        .draw_series(
            stats
                .outliers
                .iter()
                .map(|&value| Circle::new((center, value), 3, color.filled())),
        )?;

    Ok(())
}

/// Render all three charts for the filtered selection into `output_dir`
pub fn render_dashboard(
    filtered: &[ClassifiedProfile],
    output_dir: &Path,
) -> crate::Result<ChartPaths> {
    std::fs::create_dir_all(output_dir)?;
    let paths = ChartPaths::in_dir(output_dir);

    create_recency_histogram(filtered, &paths.histogram)?;
    create_frequency_box_plot(filtered, &paths.frequency_box)?;
    create_monetary_violin(filtered, &paths.monetary_violin)?;

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{classify, CustomerProfile};
    use tempfile::tempdir;

    fn create_test_profiles() -> Vec<ClassifiedProfile> {
        let raw: Vec<CustomerProfile> = (0..30)
            .map(|i| CustomerProfile {
                customer_id: format!("c{i}"),
                recency: i * 3,
                frequency: 1 + (i as u64 % 4),
                monetary: 20.0 + (i as f64) * 7.5,
            })
            .collect();
        classify(&raw, 45)
    }

    #[test]
    fn test_histogram_counts_split_by_churn() {
        let profiles = create_test_profiles();
        let histogram = RecencyHistogram::from_profiles(&profiles, HISTOGRAM_BINS).unwrap();

        assert_eq!(histogram.retained.len(), HISTOGRAM_BINS);
        assert_eq!(histogram.retained.iter().sum::<usize>(), 16);
        assert_eq!(histogram.churned.iter().sum::<usize>(), 14);
        assert!(histogram.tallest() >= 1);
    }

    #[test]
    fn test_histogram_absent_for_empty_selection() {
        assert!(RecencyHistogram::from_profiles(&[], HISTOGRAM_BINS).is_none());
    }

    #[test]
    fn test_churn_groups() {
        let groups = ChurnGroups::from_profiles(&create_test_profiles(), |p| p.recency() as f64);
        assert_eq!(groups.retained.len(), 16);
        assert_eq!(groups.churned.len(), 14);
        assert!(groups.churned.iter().all(|&r| r > 45.0));
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(category_label(0.0), "Retained");
        assert_eq!(category_label(1.0), "Churned");
        assert_eq!(category_label(0.5), "");
    }

    #[test]
    fn test_jitter_bounds() {
        assert!((0..1000).map(jitter).all(|j| (-0.15..0.15).contains(&j)));
    }

    #[test]
    fn test_render_dashboard() {
        let temp_dir = tempdir().unwrap();
        let paths = render_dashboard(&create_test_profiles(), temp_dir.path()).unwrap();

        for path in paths.all() {
            assert!(path.exists(), "{} was not written", path.display());
        }
    }

    #[test]
    fn test_render_empty_selection() {
        let temp_dir = tempdir().unwrap();
        let paths = render_dashboard(&[], temp_dir.path()).unwrap();
        assert!(paths.histogram.exists());
        assert!(paths.monetary_violin.exists());
    }
}
