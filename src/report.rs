//! Summary statistics and CSV export of classified profiles

use crate::model::{ChurnStatus, ClassifiedProfile};
use crate::stats::round2;
use polars::prelude::*;
use std::fmt;

/// File name offered for the filtered export
pub const EXPORT_FILE_NAME: &str = "filtered_customers.csv";

/// Headline numbers computed over the full (unfiltered) profile set
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub threshold: i64,
    pub total_customers: usize,
    pub churned: usize,
    pub retained: usize,
    /// Percentage of churned customers, rounded to two decimals
    pub churn_rate_pct: f64,
}

impl Summary {
    pub fn from_profiles(profiles: &[ClassifiedProfile], threshold: i64) -> Self {
        let total_customers = profiles.len();
        let churned = profiles.iter().filter(|p| p.churn.is_churned()).count();
        let churn_rate_pct = if total_customers == 0 {
            0.0
        } else {
            round2(churned as f64 / total_customers as f64 * 100.0)
        };

        Self {
            threshold,
            total_customers,
            churned,
            retained: total_customers - churned,
            churn_rate_pct,
        }
    }

    /// Labeled churned / retained counts
    pub fn breakdown(&self) -> [(&'static str, usize); 2] {
        [
            (ChurnStatus::Churned.label(), self.churned),
            (ChurnStatus::Retained.label(), self.retained),
        ]
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Churn threshold set to: {} days of inactivity", self.threshold)?;
        writeln!(f, "Total customers: {}", self.total_customers)?;
        // `{:?}` keeps the `.0` on whole percentages (30.0%, 33.33%)
        writeln!(f, "Churn rate: {:?}%", self.churn_rate_pct)?;
        writeln!(f, "Churned customers breakdown:")?;
        for (label, count) in self.breakdown() {
            writeln!(f, "  {:<8} {}", label, count)?;
        }
        Ok(())
    }
}

/// Build a DataFrame with one row per profile and the churn code column
pub fn profiles_frame(profiles: &[ClassifiedProfile]) -> PolarsResult<DataFrame> {
    let ids: Vec<&str> = profiles
        .iter()
        .map(|p| p.profile.customer_id.as_str())
        .collect();
    let recency: Vec<i64> = profiles.iter().map(|p| p.profile.recency).collect();
    let frequency: Vec<u64> = profiles.iter().map(|p| p.profile.frequency).collect();
    let monetary: Vec<f64> = profiles.iter().map(|p| p.profile.monetary).collect();
    let churn: Vec<i32> = profiles.iter().map(|p| p.churn.code()).collect();

    df!(
        "customer_unique_id" => ids,
        "recency" => recency,
        "frequency" => frequency,
        "monetary" => monetary,
        "churn" => churn
    )
}

/// Serialize profiles as UTF-8 CSV with a header row
pub fn export_csv(profiles: &[ClassifiedProfile]) -> crate::Result<Vec<u8>> {
    let mut frame = profiles_frame(profiles)?;
    let mut buffer = Vec::new();
    CsvWriter::new(&mut buffer)
        .include_header(true)
        .finish(&mut frame)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{classify, CustomerProfile};

    fn profiles(recencies: &[i64], threshold: i64) -> Vec<ClassifiedProfile> {
        let raw: Vec<CustomerProfile> = recencies
            .iter()
            .enumerate()
            .map(|(i, &recency)| CustomerProfile {
                customer_id: format!("c{i}"),
                recency,
                frequency: 1 + i as u64,
                monetary: 10.0 * (i + 1) as f64,
            })
            .collect();
        classify(&raw, threshold)
    }

    #[test]
    fn test_churn_rate_thirty_percent() {
        let set = profiles(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10], 7);
        let summary = Summary::from_profiles(&set, 7);

        assert_eq!(summary.total_customers, 10);
        assert_eq!(summary.churned, 3);
        assert_eq!(summary.retained, 7);
        assert_eq!(summary.churn_rate_pct, 30.0);
        assert_eq!(summary.breakdown(), [("Churned", 3), ("Retained", 7)]);
    }

    #[test]
    fn test_churn_rate_rounds_to_two_decimals() {
        let set = profiles(&[0, 0, 9], 5);
        let summary = Summary::from_profiles(&set, 5);
        assert_eq!(summary.churn_rate_pct, 33.33);
        assert!(summary.to_string().contains("Churn rate: 33.33%"));
    }

    #[test]
    fn test_empty_summary() {
        let summary = Summary::from_profiles(&[], 0);
        assert_eq!(summary.total_customers, 0);
        assert_eq!(summary.churn_rate_pct, 0.0);
    }

    #[test]
    fn test_summary_display() {
        let text = Summary::from_profiles(&profiles(&[1, 9], 5), 5).to_string();
        assert!(text.contains("Churn threshold set to: 5 days"));
        assert!(text.contains("Total customers: 2"));
        assert!(text.contains("Churn rate: 50.0%"));
        assert!(text.contains("Churned"));
        assert!(text.contains("Retained"));
    }

    #[test]
    fn test_export_csv_header_and_rows() {
        let bytes = export_csv(&profiles(&[2, 8], 5)).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "customer_unique_id,recency,frequency,monetary,churn");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("c0,2,1,"));
        assert!(lines[1].ends_with(",0"));
        assert!(lines[2].starts_with("c1,8,2,"));
        assert!(lines[2].ends_with(",1"));
    }

    #[test]
    fn test_export_empty_selection_keeps_header() {
        let text = String::from_utf8(export_csv(&[]).unwrap()).unwrap();
        assert_eq!(
            text.trim_end(),
            "customer_unique_id,recency,frequency,monetary,churn"
        );
    }
}
