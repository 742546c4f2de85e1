//! Transaction loading with Polars and purchase-timestamp normalization

use crate::error::SourceError;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::path::Path;
use tracing::{debug, info, warn};

/// Required column holding the customer key
pub const CUSTOMER_ID_COLUMN: &str = "customer_unique_id";
/// Required column holding the payment amount
pub const PAYMENT_COLUMN: &str = "payment_value";
/// Optional column holding the purchase timestamp
pub const TIMESTAMP_COLUMN: &str = "order_purchase_timestamp";

/// Width of the simulated purchase window, in whole days
pub const SIMULATION_WINDOW_DAYS: i64 = 180;
/// Seed used for the simulated timestamps unless told otherwise
pub const DEFAULT_SEED: u64 = 42;

/// Layouts tried, in order, when parsing the timestamp column
const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.fZ",
];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Transactions as read from the source, before timestamp normalization
///
/// The frame always carries [`CUSTOMER_ID_COLUMN`] (trimmed text) and
/// [`PAYMENT_COLUMN`] (`Float64`), plus [`TIMESTAMP_COLUMN`] as raw text when
/// the source has one.
#[derive(Debug, Clone)]
pub struct RawTransactions {
    pub frame: DataFrame,
}

impl RawTransactions {
    pub fn has_timestamps(&self) -> bool {
        self.frame.column(TIMESTAMP_COLUMN).is_ok()
    }
}

/// How to fill in purchase timestamps when the source cannot supply them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampPolicy {
    /// Pinned RNG seed; `None` draws from OS entropy and makes recency
    /// differ between runs
    pub seed: Option<u64>,
    /// Replace the timestamp column even when it parses
    pub force_simulation: bool,
}

impl Default for TimestampPolicy {
    fn default() -> Self {
        Self {
            seed: Some(DEFAULT_SEED),
            force_simulation: false,
        }
    }
}

/// Transactions ready for aggregation
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Customer id, payment and a null-free `Datetime` purchase column
    pub frame: DataFrame,
    /// True when every timestamp came from the simulation fallback
    pub synthesized_timestamps: bool,
}

/// Load the transaction table from a CSV file
///
/// # Arguments
/// * `file_path` - Path to the CSV file
///
/// # Returns
/// * `RawTransactions` with the required columns extracted, or a fatal
///   `SourceError`
pub fn load_transactions(file_path: impl AsRef<Path>) -> Result<RawTransactions, SourceError> {
    let path = file_path.as_ref();
    if !path.exists() {
        return Err(SourceError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let unreadable = |err: PolarsError| SourceError::Unreadable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    };

    // Every column comes in as text so a late `10.5` or `a1b2` can't break a
    // dtype guessed from the first rows; numeric columns are cast afterwards.
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(unreadable)?
        .finish()
        .map_err(unreadable)?;

    debug!(rows = df.height(), columns = df.width(), "read {}", path.display());

    let raw = extract_columns(&df).map_err(|err| match err {
        SourceError::Unreadable { reason, .. } => SourceError::Unreadable {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    })?;

    info!(transactions = raw.frame.height(), "loaded {}", path.display());
    Ok(raw)
}

/// Select and type the customer, payment and (optional) timestamp columns
///
/// Column names are matched case-insensitively after trimming whitespace and
/// renamed to their canonical form.
pub fn extract_columns(df: &DataFrame) -> Result<RawTransactions, SourceError> {
    let columns: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let find = |wanted: &str| {
        columns
            .iter()
            .find(|name| name.trim().eq_ignore_ascii_case(wanted))
            .cloned()
    };
    let missing = |column: &'static str| SourceError::MissingColumn {
        column,
        found: columns.join(", "),
    };

    let id_name = find(CUSTOMER_ID_COLUMN).ok_or_else(|| missing(CUSTOMER_ID_COLUMN))?;
    let payment_name = find(PAYMENT_COLUMN).ok_or_else(|| missing(PAYMENT_COLUMN))?;
    let timestamp_name = find(TIMESTAMP_COLUMN);

    if df.height() == 0 {
        return Err(SourceError::Empty);
    }

    let mut selection = vec![
        trimmed_text(&id_name).alias(CUSTOMER_ID_COLUMN),
        trimmed_text(&payment_name)
            .cast(DataType::Float64)
            .alias(PAYMENT_COLUMN),
    ];
    if let Some(name) = &timestamp_name {
        selection.push(trimmed_text(name).alias(TIMESTAMP_COLUMN));
    }

    let frame = df
        .clone()
        .lazy()
        .select(selection)
        .collect()
        .map_err(frame_error)?;

    validate_ids(&frame)?;
    validate_payments(&frame)?;

    Ok(RawTransactions { frame })
}

fn trimmed_text(name: &str) -> Expr {
    col(name)
        .cast(DataType::String)
        .str()
        .strip_chars(lit(Null {}))
}

fn validate_ids(frame: &DataFrame) -> Result<(), SourceError> {
    let column = frame.column(CUSTOMER_ID_COLUMN).map_err(frame_error)?;
    let ids = column.as_materialized_series().str().map_err(frame_error)?;

    match ids.into_iter().position(|id| id.map_or(true, str::is_empty)) {
        Some(index) => Err(SourceError::InvalidValue {
            row: index + 1,
            column: CUSTOMER_ID_COLUMN,
            reason: "customer id is empty".to_string(),
        }),
        None => Ok(()),
    }
}

fn validate_payments(frame: &DataFrame) -> Result<(), SourceError> {
    let column = frame.column(PAYMENT_COLUMN).map_err(frame_error)?;
    let payments = column.as_materialized_series().f64().map_err(frame_error)?;

    for (index, value) in payments.into_iter().enumerate() {
        let reason = match value {
            Some(amount) if !amount.is_finite() => format!("{amount} is not a finite number"),
            Some(amount) if amount < 0.0 => format!("{amount} is negative"),
            Some(_) => continue,
            None => "missing or non-numeric".to_string(),
        };
        return Err(SourceError::InvalidValue {
            row: index + 1,
            column: PAYMENT_COLUMN,
            reason,
        });
    }
    Ok(())
}

fn frame_error(err: PolarsError) -> SourceError {
    SourceError::Unreadable {
        path: Default::default(),
        reason: err.to_string(),
    }
}

/// Guarantee every transaction carries a purchase timestamp
///
/// The source column is used when every row parses. If the column is absent,
/// has any null or unparseable row, or the policy forces simulation, each row
/// instead gets a timestamp drawn uniformly from the
/// [`SIMULATION_WINDOW_DAYS`]-day window starting at [`simulation_epoch`].
/// That fallback is a simulation, not a reconstruction: recency is only
/// reproducible across runs when `policy.seed` is pinned.
pub fn normalize_timestamps(
    raw: &RawTransactions,
    policy: &TimestampPolicy,
) -> PolarsResult<Dataset> {
    let parsed = if policy.force_simulation || !raw.has_timestamps() {
        None
    } else {
        Some(parse_timestamps(&raw.frame)?).filter(|column| column.null_count() == 0)
    };

    let (stamps, synthesized_timestamps) = match parsed {
        Some(column) => (column, false),
        None => {
            let reason = if policy.force_simulation {
                "simulation forced"
            } else if !raw.has_timestamps() {
                "timestamp column absent"
            } else {
                "timestamp column unusable"
            };
            match policy.seed {
                Some(seed) => warn!(reason, seed, "synthesizing purchase timestamps"),
                None => warn!(
                    reason,
                    "synthesizing purchase timestamps without a seed; recency will vary between runs"
                ),
            }
            let simulated = simulate_timestamps(raw.frame.height(), policy.seed);
            (Column::new(TIMESTAMP_COLUMN.into(), simulated), true)
        }
    };

    let mut frame = raw.frame.select([CUSTOMER_ID_COLUMN, PAYMENT_COLUMN])?;
    frame.with_column(stamps)?;

    Ok(Dataset {
        frame,
        synthesized_timestamps,
    })
}

/// First instant of the simulated purchase window (2023-01-01 00:00:00)
pub fn simulation_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 1)
        .unwrap_or(NaiveDate::MIN)
        .and_time(NaiveTime::default())
}

/// Draw `count` whole-day timestamps from the simulation window
pub fn simulate_timestamps(count: usize, seed: Option<u64>) -> Vec<NaiveDateTime> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let epoch = simulation_epoch();
    (0..count)
        .map(|_| epoch + Duration::days(rng.gen_range(0..SIMULATION_WINDOW_DAYS)))
        .collect()
}

fn strptime(format: &str) -> StrptimeOptions {
    StrptimeOptions {
        format: Some(format.into()),
        strict: false,
        exact: true,
        cache: true,
    }
}

/// Parse the timestamp column in any accepted layout; rows matching none of
/// them come back null
fn parse_timestamps(frame: &DataFrame) -> PolarsResult<Column> {
    let datetime = DataType::Datetime(TimeUnit::Milliseconds, None);
    let mut attempts: Vec<Expr> = DATETIME_FORMATS
        .iter()
        .map(|format| {
            col(TIMESTAMP_COLUMN).str().to_datetime(
                Some(TimeUnit::Milliseconds),
                None,
                strptime(format),
                lit("raise"),
            )
        })
        .collect();
    attempts.push(
        col(TIMESTAMP_COLUMN)
            .str()
            .to_date(strptime(DATE_FORMAT))
            .cast(datetime),
    );

    let parsed = frame
        .clone()
        .lazy()
        .select([coalesce(&attempts).alias(TIMESTAMP_COLUMN)])
        .collect()?;
    Ok(parsed.column(TIMESTAMP_COLUMN)?.clone())
}
