//! CSV and JSON output for forecasts, trajectories and summaries.
//!
//! Forecast tables are date-indexed with one column per model, so they can be
//! read back into a [`ForecastSet`] for later simulation runs.

use crate::error::{Result, XDateError};
use crate::series::{ForecastSeries, ForecastSet};
use crate::simulator::SimulationDayRecord;
use chrono::NaiveDate;
use log::info;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

const DATE_COLUMN: &str = "date";

pub fn write_forecast_table(path: &Path, forecasts: &ForecastSet) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec![DATE_COLUMN.to_string()];
    header.extend(forecasts.keys().cloned());
    writer.write_record(&header)?;

    let dates: BTreeSet<NaiveDate> = forecasts
        .values()
        .flat_map(|s| s.points.keys().copied())
        .collect();
    for date in &dates {
        let mut row = vec![date.format("%Y-%m-%d").to_string()];
        row.extend(forecasts.values().map(|s| {
            s.points
                .get(date)
                .map(|v| format!("{:.4}", v))
                .unwrap_or_default()
        }));
        writer.write_record(&row)?;
    }
    writer.flush()?;

    info!(
        "Wrote {} forecast columns over {} days to {}",
        forecasts.len(),
        dates.len(),
        path.display()
    );
    Ok(())
}

/// Empty or non-numeric cells are left out of that model's series.
pub fn read_forecast_table(path: &Path) -> Result<ForecastSet> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let date_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(DATE_COLUMN))
        .ok_or_else(|| XDateError::MissingColumn(DATE_COLUMN.to_string()))?;

    let mut forecasts: ForecastSet = headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != date_idx)
        .map(|(_, name)| {
            (
                name.to_string(),
                ForecastSeries::from_values(name, &[], &[]),
            )
        })
        .collect();

    for result in reader.records() {
        let row = result?;
        let raw_date = row.get(date_idx).unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
            .map_err(|e| XDateError::DateError(format!("Bad date '{}': {}", raw_date, e)))?;

        for (idx, name) in headers.iter().enumerate() {
            if idx == date_idx {
                continue;
            }
            let Some(value) = row.get(idx).and_then(|s| s.parse::<f64>().ok()) else {
                continue;
            };
            if let Some(series) = forecasts.get_mut(name) {
                series.points.insert(date, value);
            }
        }
    }

    Ok(forecasts)
}

pub fn write_trajectory_csv(path: &Path, trajectory: &[SimulationDayRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in trajectory {
        writer.serialize(record)?;
    }
    writer.flush()?;
    info!("Wrote {} simulated days to {}", trajectory.len(), path.display());
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::simulator::{FiscalStatus, XDateSimulator};
    use crate::utils::days_after;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()
    }

    #[test]
    fn test_forecast_table_reads_back() {
        let dates = days_after(start(), 3).unwrap();
        let mut forecasts = ForecastSet::new();
        forecasts.insert(
            "ARIMA".to_string(),
            ForecastSeries::from_values("ARIMA", &dates, &[1.5, -2.25, 3.0]),
        );
        // Shorter column leaves blank cells.
        forecasts.insert(
            "Seasonal".to_string(),
            ForecastSeries::from_values("Seasonal", &dates[..2], &[10.0, 20.0]),
        );

        let path = std::env::temp_dir().join("xdate_export_forecasts.csv");
        write_forecast_table(&path, &forecasts).unwrap();
        let read = read_forecast_table(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(read, forecasts);
    }

    #[test]
    fn test_read_requires_date_column() {
        let path = std::env::temp_dir().join("xdate_export_nodate.csv");
        std::fs::write(&path, "day,ARIMA\n2025-04-01,1.0\n").unwrap();
        let result = read_forecast_table(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(XDateError::MissingColumn(_))));
    }

    #[test]
    fn test_trajectory_and_summary_outputs() {
        let sim = XDateSimulator::new(SimulationConfig {
            debt_ceiling: 1_000.0,
            extraordinary_measures_capacity: 100.0,
            minimum_operating_cash: 0.0,
        })
        .unwrap();
        let state = sim.initial_state(&FiscalStatus {
            current_outstanding_debt: 900.0,
            current_cash_balance: 0.0,
        });
        let dates = days_after(start(), 15).unwrap();
        let forecast = ForecastSeries::from_values("Ensemble", &dates, &[-20.0; 15]);
        let outcome = sim.simulate(&state, &forecast).unwrap();

        let csv_path = std::env::temp_dir().join("xdate_export_trajectory.csv");
        write_trajectory_csv(&csv_path, &outcome.trajectory).unwrap();
        let contents = std::fs::read_to_string(&csv_path).unwrap();
        std::fs::remove_file(&csv_path).ok();
        let mut lines = contents.lines();
        assert!(lines.next().unwrap().starts_with("date,daily_cash_flow,cash_balance"));
        assert_eq!(lines.count(), outcome.trajectory.len());

        let json_path = std::env::temp_dir().join("xdate_export_summary.json");
        write_json(&json_path, &outcome.summary()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        std::fs::remove_file(&json_path).ok();
        assert_eq!(value["predicted_date"], "2025-04-10");
        assert_eq!(value["days_ahead"], 10);
        assert_eq!(value["final_state"]["total_measures_used"], 100.0);
    }
}
