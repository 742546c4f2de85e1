//! churnscope: customer churn dashboard built on RFM analysis
//!
//! Transactions are loaded once per cache window, collapsed into one
//! Recency / Frequency / Monetary profile per customer, labelled churned or
//! retained against a recency threshold, filtered to a recency window, and
//! reported as summary statistics, charts and a CSV export.

pub mod cache;
pub mod cli;
pub mod data;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod session;
pub mod stats;
pub mod viz;

// Re-export public items for easier access
pub use cache::DatasetCache;
pub use cli::Args;
pub use data::{load_transactions, normalize_timestamps, Dataset, RawTransactions, TimestampPolicy};
pub use error::{InputError, SourceError};
pub use model::{
    aggregate, classify, filter, rfm_frame, ChurnStatus, ClassifiedProfile, CustomerProfile,
    RecencyBounds, RecencyRange, ThresholdControl,
};
pub use pipeline::{recompute, ControlEvent, ControlState, Dashboard, DashboardView};
pub use report::{export_csv, Summary, EXPORT_FILE_NAME};
pub use viz::render_dashboard;

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
