//! RFM aggregation, churn classification and recency filtering

use crate::data::{CUSTOMER_ID_COLUMN, PAYMENT_COLUMN, TIMESTAMP_COLUMN};
use crate::error::InputError;
use polars::prelude::*;
use std::fmt;
use tracing::warn;

/// Percentile of the recency distribution used as the default threshold
pub const DEFAULT_THRESHOLD_QUANTILE: f64 = 0.75;

pub const RECENCY_COLUMN: &str = "recency";
pub const FREQUENCY_COLUMN: &str = "frequency";
pub const MONETARY_COLUMN: &str = "monetary";
const LAST_PURCHASE_COLUMN: &str = "last_purchase";

/// One row per unique customer
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerProfile {
    pub customer_id: String,
    /// Whole days between the dataset's latest purchase and this customer's
    pub recency: i64,
    /// Number of transactions, always at least 1
    pub frequency: u64,
    /// Sum of payment values
    pub monetary: f64,
}

/// Churn label derived from recency and the current threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChurnStatus {
    Churned,
    Retained,
}

impl ChurnStatus {
    /// Churned iff `recency > threshold`; a customer exactly at the threshold
    /// is retained
    pub fn from_recency(recency: i64, threshold: i64) -> Self {
        if recency > threshold {
            ChurnStatus::Churned
        } else {
            ChurnStatus::Retained
        }
    }

    pub fn is_churned(self) -> bool {
        self == ChurnStatus::Churned
    }

    /// Human-readable label for reports and chart legends
    pub fn label(self) -> &'static str {
        match self {
            ChurnStatus::Churned => "Churned",
            ChurnStatus::Retained => "Retained",
        }
    }

    /// Value written to the `churn` export column
    pub fn code(self) -> i32 {
        match self {
            ChurnStatus::Churned => 1,
            ChurnStatus::Retained => 0,
        }
    }
}

impl fmt::Display for ChurnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A profile paired with its churn label for one threshold
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedProfile {
    pub profile: CustomerProfile,
    pub churn: ChurnStatus,
}

impl ClassifiedProfile {
    pub fn recency(&self) -> i64 {
        self.profile.recency
    }
}

/// Group transactions into one row per customer
///
/// Columns: customer id, `recency` (whole days between the dataset's latest
/// purchase and the customer's latest, truncated), `frequency` (transaction
/// count) and `monetary` (payment sum). Rows are sorted by customer id and
/// payments are summed in sorted order, so input row order does not matter.
pub fn rfm_frame(transactions: &DataFrame) -> PolarsResult<DataFrame> {
    transactions
        .clone()
        .lazy()
        .group_by([col(CUSTOMER_ID_COLUMN)])
        .agg([
            col(TIMESTAMP_COLUMN).max().alias(LAST_PURCHASE_COLUMN),
            len().cast(DataType::UInt64).alias(FREQUENCY_COLUMN),
            col(PAYMENT_COLUMN)
                .sort(SortOptions::default())
                .sum()
                .alias(MONETARY_COLUMN),
        ])
        .with_column(
            (col(LAST_PURCHASE_COLUMN).max() - col(LAST_PURCHASE_COLUMN))
                .dt()
                .total_days()
                .cast(DataType::Int64)
                .alias(RECENCY_COLUMN),
        )
        .select([
            col(CUSTOMER_ID_COLUMN),
            col(RECENCY_COLUMN),
            col(FREQUENCY_COLUMN),
            col(MONETARY_COLUMN),
        ])
        .sort([CUSTOMER_ID_COLUMN], SortMultipleOptions::default())
        .collect()
}

/// Collapse transactions into one RFM profile per customer, ordered by id
pub fn aggregate(transactions: &DataFrame) -> PolarsResult<Vec<CustomerProfile>> {
    let rfm = rfm_frame(transactions)?;

    let ids = rfm.column(CUSTOMER_ID_COLUMN)?.as_materialized_series().str()?;
    let recency = rfm.column(RECENCY_COLUMN)?.as_materialized_series().i64()?;
    let frequency = rfm.column(FREQUENCY_COLUMN)?.as_materialized_series().u64()?;
    let monetary = rfm.column(MONETARY_COLUMN)?.as_materialized_series().f64()?;

    Ok(ids
        .into_no_null_iter()
        .zip(recency.into_no_null_iter())
        .zip(frequency.into_no_null_iter())
        .zip(monetary.into_no_null_iter())
        .map(|(((customer_id, recency), frequency), monetary)| CustomerProfile {
            customer_id: customer_id.to_string(),
            recency,
            frequency,
            monetary,
        })
        .collect())
}

/// Label every profile against `threshold_days`
pub fn classify(profiles: &[CustomerProfile], threshold_days: i64) -> Vec<ClassifiedProfile> {
    profiles
        .iter()
        .map(|profile| ClassifiedProfile {
            profile: profile.clone(),
            churn: ChurnStatus::from_recency(profile.recency, threshold_days),
        })
        .collect()
}

/// Keep profiles with `range.low <= recency <= range.high`
pub fn filter(profiles: &[ClassifiedProfile], range: RecencyRange) -> Vec<ClassifiedProfile> {
    profiles
        .iter()
        .filter(|p| range.contains(p.recency()))
        .cloned()
        .collect()
}

fn recency_values(profiles: &[CustomerProfile]) -> Int64Chunked {
    Int64Chunked::from_vec(
        RECENCY_COLUMN.into(),
        profiles.iter().map(|p| p.recency).collect(),
    )
}

fn recency_extent(recency: &Int64Chunked) -> Option<(i64, i64)> {
    Some((recency.min()?, recency.max()?))
}

/// Bounds and default of the churn threshold control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdControl {
    pub min: i64,
    pub max: i64,
    pub default: i64,
}

impl ThresholdControl {
    /// Observed recency range, defaulting to the truncated 75th percentile
    pub fn from_profiles(profiles: &[CustomerProfile]) -> Option<Self> {
        let recency = recency_values(profiles);
        let (min, max) = recency_extent(&recency)?;
        let default = recency
            .quantile(DEFAULT_THRESHOLD_QUANTILE, QuantileMethod::Linear)
            .ok()
            .flatten()
            .map(|q| q.trunc() as i64)
            .unwrap_or(min)
            .clamp(min, max);
        Some(Self { min, max, default })
    }

    /// Force a requested threshold into `[min, max]`
    pub fn clamp(&self, requested: i64) -> i64 {
        let value = requested.clamp(self.min, self.max);
        if value != requested {
            warn!(
                requested,
                applied = value,
                "churn threshold outside observed recency range"
            );
        }
        value
    }

    /// Requested value if any, otherwise the default
    pub fn resolve(&self, requested: Option<i64>) -> i64 {
        requested.map_or(self.default, |value| self.clamp(value))
    }
}

/// Inclusive recency window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyRange {
    pub low: i64,
    pub high: i64,
}

impl RecencyRange {
    pub fn new(low: i64, high: i64) -> Result<Self, InputError> {
        if low > high {
            return Err(InputError::ReversedRange { low, high });
        }
        Ok(Self { low, high })
    }

    pub fn contains(&self, recency: i64) -> bool {
        (self.low..=self.high).contains(&recency)
    }
}

impl fmt::Display for RecencyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.low, self.high)
    }
}

/// Bounds of the recency filter control
///
/// When every profile has the same recency the upper bound is widened by one
/// day, so the control never collapses to a zero-width range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyBounds {
    pub min: i64,
    pub max: i64,
}

impl RecencyBounds {
    pub fn from_profiles(profiles: &[CustomerProfile]) -> Option<Self> {
        let (min, max) = recency_extent(&recency_values(profiles))?;
        let max = if min == max { max + 1 } else { max };
        Some(Self { min, max })
    }

    /// The whole control span
    pub fn full(&self) -> RecencyRange {
        RecencyRange {
            low: self.min,
            high: self.max,
        }
    }

    /// Clamp a requested window into the bounds; missing ends default to the
    /// bound on that side
    pub fn select(&self, low: Option<i64>, high: Option<i64>) -> RecencyRange {
        let low = low.unwrap_or(self.min).clamp(self.min, self.max);
        let high = high.unwrap_or(self.max).clamp(self.min, self.max);
        RecencyRange {
            low: low.min(high),
            high: low.max(high),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn day(offset: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::days(offset)
    }

    fn txn(customer: &str, payment: f64, offset: i64) -> (&str, f64, NaiveDateTime) {
        (customer, payment, day(offset))
    }

    fn transactions(rows: &[(&str, f64, NaiveDateTime)]) -> DataFrame {
        let mut frame = df!(
            CUSTOMER_ID_COLUMN => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            PAYMENT_COLUMN => rows.iter().map(|r| r.1).collect::<Vec<_>>()
        )
        .unwrap();
        let stamps: Vec<NaiveDateTime> = rows.iter().map(|r| r.2).collect();
        frame
            .with_column(Series::new(TIMESTAMP_COLUMN.into(), stamps))
            .unwrap();
        frame
    }

    fn aggregate_rows(rows: &[(&str, f64, NaiveDateTime)]) -> Vec<CustomerProfile> {
        aggregate(&transactions(rows)).unwrap()
    }

    fn profile(customer: &str, recency: i64) -> CustomerProfile {
        CustomerProfile {
            customer_id: customer.to_string(),
            recency,
            frequency: 1,
            monetary: 1.0,
        }
    }

    #[test]
    fn test_aggregate_two_customers() {
        let profiles = aggregate_rows(&[txn("1", 10.0, 0), txn("1", 20.0, 5), txn("2", 5.0, 5)]);

        assert_eq!(
            profiles,
            vec![
                CustomerProfile {
                    customer_id: "1".into(),
                    recency: 0,
                    frequency: 2,
                    monetary: 30.0
                },
                CustomerProfile {
                    customer_id: "2".into(),
                    recency: 0,
                    frequency: 1,
                    monetary: 5.0
                },
            ]
        );
    }

    #[test]
    fn test_recency_measures_gap_to_global_latest() {
        let profiles = aggregate_rows(&[txn("a", 1.0, 2), txn("b", 1.0, 9)]);
        assert_eq!(profiles[0].recency, 7);
        assert_eq!(profiles[1].recency, 0);
    }

    #[test]
    fn test_recency_truncates_partial_days() {
        let mut late = txn("b", 1.0, 3);
        late.2 += Duration::hours(23);
        let profiles = aggregate_rows(&[txn("a", 1.0, 0), late]);
        assert_eq!(profiles[0].recency, 3);
    }

    #[test]
    fn test_aggregate_is_order_independent() {
        let forward = vec![
            txn("x", 0.1, 1),
            txn("y", 0.2, 4),
            txn("x", 0.7, 3),
            txn("z", 1e9, 0),
            txn("x", 0.3, 2),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        assert_eq!(aggregate_rows(&forward), aggregate_rows(&reversed));
    }

    #[test]
    fn test_rfm_frame_columns() {
        let rfm = rfm_frame(&transactions(&[txn("b", 2.0, 1), txn("a", 3.0, 0)])).unwrap();
        let names: Vec<String> = rfm
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        assert_eq!(
            names,
            vec![CUSTOMER_ID_COLUMN, RECENCY_COLUMN, FREQUENCY_COLUMN, MONETARY_COLUMN]
        );
        assert_eq!(rfm.height(), 2);
    }

    #[test]
    fn test_aggregate_empty() {
        assert!(aggregate_rows(&[]).is_empty());
    }

    #[test]
    fn test_threshold_boundary_is_retained() {
        let classified = classify(&[profile("a", 3), profile("b", 4)], 3);
        assert_eq!(classified[0].churn, ChurnStatus::Retained);
        assert_eq!(classified[1].churn, ChurnStatus::Churned);
    }

    #[test]
    fn test_churn_labels_and_codes() {
        assert_eq!(ChurnStatus::Churned.label(), "Churned");
        assert_eq!(ChurnStatus::Retained.to_string(), "Retained");
        assert_eq!(ChurnStatus::Churned.code(), 1);
        assert_eq!(ChurnStatus::Retained.code(), 0);
    }

    #[test]
    fn test_threshold_control_defaults_to_75th_percentile() {
        let profiles: Vec<_> = [0, 10, 20, 30, 41]
            .iter()
            .enumerate()
            .map(|(i, &r)| profile(&i.to_string(), r))
            .collect();
        let control = ThresholdControl::from_profiles(&profiles).unwrap();

        assert_eq!(control.min, 0);
        assert_eq!(control.max, 41);
        assert_eq!(control.default, 30);
        assert_eq!(control.clamp(100), 41);
        assert_eq!(control.clamp(-5), 0);
        assert_eq!(control.resolve(None), 30);
        assert_eq!(control.resolve(Some(12)), 12);
    }

    #[test]
    fn test_threshold_default_truncates() {
        // 75th percentile of [0, 3] is 2.25
        let control = ThresholdControl::from_profiles(&[profile("a", 0), profile("b", 3)]).unwrap();
        assert_eq!(control.default, 2);
    }

    #[test]
    fn test_degenerate_bounds_widen_by_one() {
        let profiles = vec![profile("a", 5), profile("b", 5)];
        let bounds = RecencyBounds::from_profiles(&profiles).unwrap();
        assert_eq!(bounds, RecencyBounds { min: 5, max: 6 });

        let filtered = filter(&classify(&profiles, 5), bounds.full());
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn test_filter_is_inclusive() {
        let profiles = classify(
            &[profile("a", 1), profile("b", 2), profile("c", 3), profile("d", 4)],
            0,
        );
        let range = RecencyRange::new(2, 3).unwrap();
        let filtered = filter(&profiles, range);

        let ids: Vec<_> = filtered.iter().map(|p| p.profile.customer_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(filtered.iter().all(|p| range.contains(p.recency())));
    }

    #[test]
    fn test_filter_may_be_empty() {
        let profiles = classify(&[profile("a", 1)], 0);
        assert!(filter(&profiles, RecencyRange::new(5, 9).unwrap()).is_empty());
    }

    #[test]
    fn test_reversed_range_rejected() {
        assert_eq!(
            RecencyRange::new(4, 2),
            Err(InputError::ReversedRange { low: 4, high: 2 })
        );
    }

    #[test]
    fn test_select_clamps_into_bounds() {
        let bounds = RecencyBounds { min: 0, max: 50 };
        assert_eq!(bounds.select(None, None), RecencyRange { low: 0, high: 50 });
        assert_eq!(bounds.select(Some(-3), Some(80)), RecencyRange { low: 0, high: 50 });
        assert_eq!(bounds.select(Some(30), Some(10)), RecencyRange { low: 10, high: 30 });
    }

    #[test]
    fn test_controls_absent_for_empty_profiles() {
        assert!(ThresholdControl::from_profiles(&[]).is_none());
        assert!(RecencyBounds::from_profiles(&[]).is_none());
    }
}
