//! Deterministic financial report generation.

use std::{fs, io::Write, path::PathBuf, time::Duration};

use chrono::{Duration as ChronoDuration, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::{json, Value as JsonValue};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

const REVENUE_CATEGORIES: [&str; 4] =
    ["Sales Income", "Service Fees", "Interest Income", "Consulting"];
const EXPENSE_CATEGORIES: [&str; 6] =
    ["Payroll", "Marketing", "Office Supplies", "Software", "Travel", "Utilities"];

const DEFAULT_TRANSACTIONS: u64 = 50;
const DEFAULT_REPORT_NAME: &str = "Monthly_Report";

/// Errors raised on malformed input or filesystem failure.
///
/// The worker catches these and marks the job FAILED; they never propagate
/// past the per-job boundary.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The input payload does not match the expected shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Writing the report file failed.
    #[error("report file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for the report generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Directory where generated CSV files are written.
    pub reports_dir: PathBuf,

    /// Simulated cost per transaction. Generation duration is a function of
    /// payload size and is intentionally unbounded; this knob is the future
    /// tunable. Tests set it to zero.
    pub transaction_cost: Duration,

    /// Upper bound on `num_transactions` accepted in a payload.
    pub max_transactions: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from("data/reports"),
            transaction_cost: Duration::from_millis(10),
            max_transactions: 100_000,
        }
    }
}

/// Generates financial reports from submitted payloads.
///
/// Deterministic given identical payloads: the RNG is seeded from a SHA-256
/// hash of the report name, so repeated runs produce the same transactions
/// and totals (the written file name still carries a random suffix).
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    config: GeneratorConfig,
}

struct Transaction {
    id: String,
    date: String,
    kind: &'static str,
    category: &'static str,
    description: String,
    amount: f64,
}

impl ReportGenerator {
    /// Creates a generator with the given configuration.
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Creates a generator with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(GeneratorConfig::default())
    }

    /// Generates a report for the payload and writes the CSV file.
    ///
    /// Blocking: call through `spawn_blocking` from async contexts.
    ///
    /// # Errors
    ///
    /// Returns `GeneratorError::InvalidPayload` for malformed input and
    /// `GeneratorError::Io` if the file cannot be written.
    pub fn generate(&self, payload: &JsonValue) -> Result<JsonValue, GeneratorError> {
        let num_transactions = parse_num_transactions(payload, self.config.max_transactions)?;
        let report_name = parse_report_name(payload)?;
        let file_stem = sanitize_file_stem(&report_name)?;

        let mut rng = StdRng::seed_from_u64(name_seed(&report_name));

        let mut transactions = Vec::with_capacity(usize::try_from(num_transactions).unwrap_or(0));
        let mut total_revenue = 0.0_f64;
        let mut total_expenses = 0.0_f64;

        for i in 0..num_transactions {
            if !self.config.transaction_cost.is_zero() {
                std::thread::sleep(self.config.transaction_cost);
            }

            let is_revenue = rng.gen::<f64>() < 0.6;
            let (kind, category, amount) = if is_revenue {
                let category = REVENUE_CATEGORIES[rng.gen_range(0..REVENUE_CATEGORIES.len())];
                ("Revenue", category, round2(rng.gen_range(5_000.0..50_000.0)))
            } else {
                let category = EXPENSE_CATEGORIES[rng.gen_range(0..EXPENSE_CATEGORIES.len())];
                ("Expense", category, round2(rng.gen_range(500.0..15_000.0)))
            };

            if kind == "Revenue" {
                total_revenue += amount;
            } else {
                total_expenses += amount;
            }

            let date = Utc::now() - ChronoDuration::days(rng.gen_range(0..=30));
            transactions.push(Transaction {
                id: format!("TXN-{:05}", i + 1),
                date: date.format("%Y-%m-%d").to_string(),
                kind,
                category,
                description: format!("{category} - {}", date.format("%B %Y")),
                amount,
            });
        }

        let file_id = short_file_id();
        let file_name = format!("{file_stem}_{file_id}.csv");
        let file_path = self.config.reports_dir.join(&file_name);

        fs::create_dir_all(&self.config.reports_dir)?;
        write_csv(&file_path, &report_name, num_transactions, total_revenue, total_expenses, &transactions)?;
        let file_size = fs::metadata(&file_path)?.len();

        let processing_time_ms =
            u128::from(num_transactions) * self.config.transaction_cost.as_millis();

        Ok(json!({
            "report_name": report_name,
            "file_id": file_id,
            "file_name": file_name,
            "file_size_bytes": file_size,
            "download_url": format!("/api/reports/{file_name}"),
            "summary": {
                "total_transactions": num_transactions,
                "total_revenue": round2(total_revenue),
                "total_expenses": round2(total_expenses),
                "net_income": round2(total_revenue - total_expenses),
            },
            "processing_time_ms": processing_time_ms as u64,
            "status": "success",
        }))
    }
}

fn parse_num_transactions(payload: &JsonValue, max: u64) -> Result<u64, GeneratorError> {
    match payload.get("num_transactions") {
        None | Some(JsonValue::Null) => Ok(DEFAULT_TRANSACTIONS),
        Some(value) => {
            let n = value.as_u64().ok_or_else(|| {
                GeneratorError::InvalidPayload(format!(
                    "num_transactions must be a non-negative integer, got {value}"
                ))
            })?;
            if n > max {
                return Err(GeneratorError::InvalidPayload(format!(
                    "num_transactions {n} exceeds the limit of {max}"
                )));
            }
            Ok(n)
        },
    }
}

fn parse_report_name(payload: &JsonValue) -> Result<String, GeneratorError> {
    match payload.get("report_name") {
        None | Some(JsonValue::Null) => Ok(DEFAULT_REPORT_NAME.to_string()),
        Some(JsonValue::String(name)) if !name.trim().is_empty() => Ok(name.clone()),
        Some(JsonValue::String(_)) => {
            Err(GeneratorError::InvalidPayload("report_name must not be empty".to_string()))
        },
        Some(other) => Err(GeneratorError::InvalidPayload(format!(
            "report_name must be a string, got {other}"
        ))),
    }
}

/// Reduces the report name to a filesystem-safe stem.
///
/// The report name ends up in a file path, so everything outside
/// `[A-Za-z0-9_-]` is replaced. A name with no usable characters at all is
/// rejected rather than silently mapped to an empty stem.
fn sanitize_file_stem(name: &str) -> Result<String, GeneratorError> {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    if stem.chars().all(|c| c == '_') {
        return Err(GeneratorError::InvalidPayload(format!(
            "report_name {name:?} has no usable file name characters"
        )));
    }

    Ok(stem)
}

/// Seed derived from the report name; identical names replay identical data.
fn name_seed(report_name: &str) -> u64 {
    let digest = Sha256::digest(report_name.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().expect("digest is at least 8 bytes"))
}

fn short_file_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn format_currency(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let whole = cents / 100;
    let frac = (cents % 100).abs();

    let digits = whole.abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if whole < 0 { "-" } else { "" };
    format!("{sign}${grouped}.{frac:02}")
}

fn write_csv(
    path: &std::path::Path,
    report_name: &str,
    num_transactions: u64,
    total_revenue: f64,
    total_expenses: f64,
    transactions: &[Transaction],
) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;

    writeln!(file, "# Financial Report: {report_name}")?;
    writeln!(file, "# Generated: {}", Utc::now().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(file, "# Period: Last 30 Days")?;
    writeln!(file, "# Total Transactions: {num_transactions}")?;
    writeln!(file, "#")?;
    writeln!(file, "# SUMMARY")?;
    writeln!(file, "# Total Revenue: {}", format_currency(total_revenue))?;
    writeln!(file, "# Total Expenses: {}", format_currency(total_expenses))?;
    writeln!(file, "# Net Income: {}", format_currency(total_revenue - total_expenses))?;
    writeln!(file, "#")?;
    writeln!(file, "Transaction ID,Date,Type,Category,Description,Amount")?;

    for tx in transactions {
        writeln!(
            file,
            "{},{},{},{},\"{}\",\"{}\"",
            tx.id,
            tx.date,
            tx.kind,
            tx.category,
            tx.description,
            format_currency(tx.amount)
        )?;
    }

    Ok(())
}
