//! Full dashboard recomputation and the stateful dashboard that drives it

use crate::cache::DatasetCache;
use crate::data::{load_transactions, normalize_timestamps, Dataset, TimestampPolicy};
use crate::error::InputError;
use crate::model::{
    aggregate, classify, filter, ClassifiedProfile, RecencyBounds, RecencyRange, ThresholdControl,
};
use crate::report::{export_csv, Summary, EXPORT_FILE_NAME};
use crate::viz::{render_dashboard, ChartPaths};
use anyhow::Context;
use polars::prelude::DataFrame;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// User-controlled inputs; `None` means "use the control's default"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlState {
    pub threshold: Option<i64>,
    pub min_recency: Option<i64>,
    pub max_recency: Option<i64>,
}

impl ControlState {
    /// Update the controls for one event; non-control events leave them as is
    pub fn apply(&mut self, event: &ControlEvent) {
        match *event {
            ControlEvent::Threshold(days) => self.threshold = Some(days),
            ControlEvent::Range(range) => {
                self.min_recency = Some(range.low);
                self.max_recency = Some(range.high);
            }
            ControlEvent::Reset => *self = Self::default(),
            ControlEvent::Show | ControlEvent::Export | ControlEvent::Quit => {}
        }
    }
}

/// One interaction from the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Move the churn threshold slider
    Threshold(i64),
    /// Move both ends of the recency range slider
    Range(RecencyRange),
    /// Restore default control values
    Reset,
    /// Re-run and show the current view
    Show,
    /// Write the filtered export
    Export,
    Quit,
}

fn parse_days(value: &str) -> Result<i64, InputError> {
    value
        .parse()
        .map_err(|_| InputError::NotANumber(value.to_string()))
}

impl FromStr for ControlEvent {
    type Err = InputError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default().to_ascii_lowercase();
        let args: Vec<&str> = parts.collect();

        match (command.as_str(), args.as_slice()) {
            ("threshold" | "t", [days]) => Ok(ControlEvent::Threshold(parse_days(days)?)),
            ("threshold" | "t", _) => Err(InputError::Arity {
                command: "threshold",
                expected: "one value, e.g. `threshold 30`",
            }),
            ("range" | "r", [low, high]) => Ok(ControlEvent::Range(RecencyRange::new(
                parse_days(low)?,
                parse_days(high)?,
            )?)),
            ("range" | "r", _) => Err(InputError::Arity {
                command: "range",
                expected: "two values, e.g. `range 10 90`",
            }),
            ("reset", []) => Ok(ControlEvent::Reset),
            ("show" | "s", []) => Ok(ControlEvent::Show),
            ("export" | "e", []) => Ok(ControlEvent::Export),
            ("quit" | "q" | "exit", []) => Ok(ControlEvent::Quit),
            _ => Err(InputError::UnknownCommand(line.trim().to_string())),
        }
    }
}

/// Everything the dashboard shows for one set of control values
#[derive(Debug, Clone)]
pub struct DashboardView {
    /// Every customer, classified against `summary.threshold`
    pub profiles: Vec<ClassifiedProfile>,
    /// Customers inside `range`
    pub filtered: Vec<ClassifiedProfile>,
    /// Computed over `profiles`, not `filtered`
    pub summary: Summary,
    pub threshold_control: ThresholdControl,
    pub bounds: RecencyBounds,
    pub range: RecencyRange,
}

impl fmt::Display for DashboardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary)?;
        writeln!(
            f,
            "Threshold control: {}..={} (default {})",
            self.threshold_control.min, self.threshold_control.max, self.threshold_control.default
        )?;
        writeln!(
            f,
            "Recency filter: {} within bounds [{}, {}], {} customers selected",
            self.range,
            self.bounds.min,
            self.bounds.max,
            self.filtered.len()
        )?;
        writeln!(
            f,
            "Customers with high recency and low frequency are more likely to churn."
        )
    }
}

/// Run aggregation, classification, filtering and reporting from scratch
///
/// Pure: the same transactions and controls always give the same view, and
/// nothing is carried between calls.
pub fn recompute(
    transactions: &DataFrame,
    controls: &ControlState,
) -> crate::Result<DashboardView> {
    let customers = aggregate(transactions)?;
    let (Some(threshold_control), Some(bounds)) = (
        ThresholdControl::from_profiles(&customers),
        RecencyBounds::from_profiles(&customers),
    ) else {
        anyhow::bail!("no customers to analyse");
    };

    let threshold = threshold_control.resolve(controls.threshold);
    let range = bounds.select(controls.min_recency, controls.max_recency);

    let profiles = classify(&customers, threshold);
    let filtered = filter(&profiles, range);
    let summary = Summary::from_profiles(&profiles, threshold);

    debug!(
        customers = profiles.len(),
        selected = filtered.len(),
        threshold,
        low = range.low,
        high = range.high,
        "recomputed dashboard"
    );

    Ok(DashboardView {
        profiles,
        filtered,
        summary,
        threshold_control,
        bounds,
        range,
    })
}

/// Files produced for one view
#[derive(Debug, Clone, Default)]
pub struct Outputs {
    pub charts: Option<ChartPaths>,
    pub export: Option<PathBuf>,
}

/// Write the filtered export to `output_dir`
pub fn write_export(view: &DashboardView, output_dir: &Path) -> crate::Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    let path = output_dir.join(EXPORT_FILE_NAME);
    let bytes = export_csv(&view.filtered)?;
    std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    info!(rows = view.filtered.len(), "export saved to: {}", path.display());
    Ok(path)
}

/// Render charts and/or write the export for a view
pub fn write_outputs(
    view: &DashboardView,
    output_dir: &Path,
    charts: bool,
    export: bool,
) -> crate::Result<Outputs> {
    let charts = if charts {
        Some(render_dashboard(&view.filtered, output_dir).context("rendering charts")?)
    } else {
        None
    };
    let export = if export {
        Some(write_export(view, output_dir)?)
    } else {
        None
    };
    Ok(Outputs { charts, export })
}

/// Data source, cache and current control values
pub struct Dashboard {
    source: PathBuf,
    policy: TimestampPolicy,
    cache: DatasetCache<Dataset>,
    controls: ControlState,
}

impl Dashboard {
    pub fn new(source: impl Into<PathBuf>, policy: TimestampPolicy, ttl: Duration) -> Self {
        Self {
            source: source.into(),
            policy,
            cache: DatasetCache::new(ttl),
            controls: ControlState::default(),
        }
    }

    pub fn with_controls(mut self, controls: ControlState) -> Self {
        self.controls = controls;
        self
    }

    pub fn controls(&self) -> &ControlState {
        &self.controls
    }

    /// How many times the source has been read
    pub fn loads(&self) -> usize {
        self.cache.loads()
    }

    /// Cached, normalized dataset; reads the source when the cache is cold
    pub fn dataset(&mut self) -> crate::Result<Arc<Dataset>> {
        let Self {
            source,
            policy,
            cache,
            ..
        } = self;
        cache.get_or_load(|| -> crate::Result<Dataset> {
            let raw = load_transactions(source.as_path())?;
            Ok(normalize_timestamps(&raw, policy)?)
        })
    }

    /// Recompute the view for the current controls
    pub fn refresh(&mut self) -> crate::Result<DashboardView> {
        let dataset = self.dataset()?;
        recompute(&dataset.frame, &self.controls)
    }

    /// Apply one event and recompute
    pub fn handle(&mut self, event: &ControlEvent) -> crate::Result<DashboardView> {
        self.controls.apply(event);
        self.refresh()
    }
}
