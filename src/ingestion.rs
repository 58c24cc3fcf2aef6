//! Raw transaction records to a daily net-flow series.

use crate::error::{Result, XDateError};
use crate::series::DailySeries;
use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Deposit,
    Withdrawal,
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deposits" | "deposit" => Ok(TransactionType::Deposit),
            "withdrawals" | "withdrawal" => Ok(TransactionType::Withdrawal),
            other => Err(format!("Unknown transaction type: {}", other)),
        }
    }
}

/// One row as delivered by a data source. `None` means the field is absent.
///
/// The amount is kept as text so that non-numeric values can be dropped
/// during loading instead of failing the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFlowRecord {
    pub date: Option<NaiveDate>,
    pub transaction_type: Option<String>,
    pub amount: Option<String>,
}

impl RawFlowRecord {
    pub fn new(date: NaiveDate, transaction_type: &str, amount: &str) -> Self {
        Self {
            date: Some(date),
            transaction_type: Some(transaction_type.to_string()),
            amount: Some(amount.to_string()),
        }
    }
}

/// A validated record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyFlowRecord {
    pub date: NaiveDate,
    pub transaction_type: TransactionType,
    pub amount: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct DayTotals {
    deposits: f64,
    withdrawals: f64,
}

pub struct DataLoader;

impl DataLoader {
    /// Group by date and transaction type, then net = deposits - withdrawals.
    ///
    /// Rows with a non-numeric amount or a transaction type other than
    /// deposits/withdrawals are skipped.
    pub fn load(raw_records: &[RawFlowRecord]) -> Result<DailySeries> {
        let records = Self::coerce(raw_records)?;
        if records.is_empty() {
            return Err(XDateError::EmptySeries);
        }

        let mut totals: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();
        for record in &records {
            let day = totals.entry(record.date).or_default();
            match record.transaction_type {
                TransactionType::Deposit => day.deposits += record.amount,
                TransactionType::Withdrawal => day.withdrawals += record.amount,
            }
        }

        let series = DailySeries::new(
            totals
                .into_iter()
                .map(|(date, t)| (date, t.deposits - t.withdrawals))
                .collect(),
        );

        let stats = series.stats();
        info!(
            "Loaded {} days of net cash flow ({:?} to {:?})",
            stats.count, stats.start, stats.end
        );
        debug!(
            "Net flow mean {:.0}, std {:.0}, positive days {}, negative days {}",
            stats.mean, stats.std, stats.positive_days, stats.negative_days
        );

        Ok(series)
    }

    fn coerce(raw_records: &[RawFlowRecord]) -> Result<Vec<DailyFlowRecord>> {
        let mut records = Vec::with_capacity(raw_records.len());
        let mut dropped = 0usize;

        for raw in raw_records {
            let date = raw
                .date
                .ok_or_else(|| XDateError::MissingColumn("date".to_string()))?;
            let kind = raw
                .transaction_type
                .as_deref()
                .ok_or_else(|| XDateError::MissingColumn("transaction_type".to_string()))?;
            let amount = raw
                .amount
                .as_deref()
                .ok_or_else(|| XDateError::MissingColumn("amount".to_string()))?;

            let Ok(transaction_type) = kind.parse::<TransactionType>() else {
                dropped += 1;
                continue;
            };
            let amount = match amount.trim().replace(',', "").parse::<f64>() {
                Ok(v) if v.is_finite() => v,
                _ => {
                    dropped += 1;
                    continue;
                }
            };

            records.push(DailyFlowRecord {
                date,
                transaction_type,
                amount,
            });
        }

        if dropped > 0 {
            debug!("Dropped {} rows with unusable type or amount", dropped);
        }
        Ok(records)
    }
}

const DATE_COLUMNS: [&str; 2] = ["record_date", "date"];
const TYPE_COLUMNS: [&str; 1] = ["transaction_type"];
const AMOUNT_COLUMNS: [&str; 2] = ["transaction_today_amt", "amount"];

/// Read a raw transaction CSV. Rows with an unparseable date are skipped.
pub fn load_raw_records_csv(path: &Path) -> Result<Vec<RawFlowRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers: HashMap<String, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim_start_matches('\u{feff}').to_ascii_lowercase(), idx))
        .collect();

    let find = |names: &[&str], label: &str| -> Result<usize> {
        names
            .iter()
            .find_map(|n| headers.get(*n).copied())
            .ok_or_else(|| XDateError::MissingColumn(label.to_string()))
    };
    let date_idx = find(&DATE_COLUMNS, "record_date")?;
    let type_idx = find(&TYPE_COLUMNS, "transaction_type")?;
    let amount_idx = find(&AMOUNT_COLUMNS, "transaction_today_amt")?;

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result?;
        let Some(date) = row
            .get(date_idx)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        else {
            continue;
        };
        records.push(RawFlowRecord {
            date: Some(date),
            transaction_type: row.get(type_idx).map(str::to_string),
            amount: row.get(amount_idx).map(str::to_string),
        });
    }

    info!("Read {} raw records from {}", records.len(), path.display());
    Ok(records)
}
