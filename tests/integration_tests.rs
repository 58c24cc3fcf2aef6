use chrono::{Datelike, NaiveDate, Weekday};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use xdate_forecaster::*;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Business-day deposits and withdrawals (millions) with a Monday deposit
/// bump, mid-month and start-of-month outlays, and deterministic noise.
fn treasury_records(start: NaiveDate, end: NaiveDate) -> Vec<RawFlowRecord> {
    let mut records = Vec::new();
    for (i, day) in start.iter_days().take_while(|d| *d <= end).enumerate() {
        if matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            continue;
        }
        let noise = ((i * 7919) % 101) as f64 * 20.0;
        let monday = if day.weekday() == Weekday::Mon { 10_000.0 } else { 0.0 };
        let mid_month = if day.day() == 15 { 30_000.0 } else { 0.0 };
        let start_of_month = if day.day() <= 3 { 10_000.0 } else { 0.0 };

        let deposits = 15_000.0 + monday + noise;
        let withdrawals = 20_000.0 + mid_month + start_of_month + (2_000.0 - noise);

        records.push(RawFlowRecord::new(day, "Deposits", &format!("{:.0}", deposits)));
        records.push(RawFlowRecord::new(day, "Withdrawals", &format!("{:.0}", withdrawals)));
    }
    records
}

fn write_records_csv(records: &[RawFlowRecord], path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "record_date,account_type,transaction_type,transaction_today_amt")?;
    for r in records {
        writeln!(
            file,
            "{},Treasury General Account (TGA),{},{}",
            r.date.unwrap(),
            r.transaction_type.as_deref().unwrap_or(""),
            r.amount.as_deref().unwrap_or("")
        )?;
    }
    Ok(())
}

fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.forecast.forest.n_trees = 10;
    config
}

fn tight_status() -> FiscalStatus {
    FiscalStatus {
        current_outstanding_debt: 36_050_000.0,
        current_cash_balance: 60_000.0,
    }
}

fn tight_config() -> PipelineConfig {
    let mut config = test_config();
    config.simulation.extraordinary_measures_capacity = 100_000.0;
    config
}

#[test]
fn test_end_to_end_pipeline() {
    let records = treasury_records(date(2023, 1, 2), date(2024, 9, 27));
    let status = FiscalStatus {
        current_outstanding_debt: 36_000_000.0,
        current_cash_balance: 400_000.0,
    };
    let config = test_config();
    let output = XDatePipeline::run(&records, &status, &config).unwrap();

    let stats = output.series.stats();
    assert_eq!(stats.start, Some(date(2023, 1, 2)));
    assert_eq!(stats.end, Some(date(2024, 9, 27)));
    assert!(stats.mean < 0.0);
    // Weekends stay missing.
    assert!(output.series.get(&date(2024, 9, 28)).is_none());

    assert!(output.fit_reports[&ModelKind::SeasonalGrowth].is_fitted());
    assert!(output.fit_reports[&ModelKind::TreeEnsemble].is_fitted());

    assert!(output.forecasts.contains_key(ENSEMBLE));
    for (name, series) in &output.forecasts {
        assert_eq!(series.len(), config.horizon_days, "{}", name);
        assert!(series.is_finite(), "{}", name);
        assert_eq!(series.points.keys().next().copied(), Some(date(2024, 9, 28)));
    }

    assert_eq!(output.scenarios.results.len(), output.forecasts.len());
    assert_eq!(output.summaries().len(), output.forecasts.len());
    assert_eq!(
        output.initial_state.extraordinary_measures_remaining,
        config.simulation.extraordinary_measures_capacity
    );
}

#[test]
fn test_fit_reports_carry_model_diagnostics() {
    let records = treasury_records(date(2023, 1, 2), date(2024, 9, 27));
    let status = tight_status();
    let output = XDatePipeline::run(&records, &status, &test_config()).unwrap();

    match &output.fit_reports[&ModelKind::SeasonalGrowth] {
        ModelState::Fitted(FitReport {
            detail:
                FitDetail::SeasonalGrowth {
                    baseline_year,
                    recent_year,
                    growth_ratio,
                    ..
                },
            ..
        }) => {
            assert_eq!(*baseline_year, 2023);
            assert_eq!(*recent_year, 2024);
            assert!((0.5..=2.0).contains(growth_ratio));
        }
        other => panic!("unexpected seasonal state: {:?}", other),
    }

    match &output.fit_reports[&ModelKind::TreeEnsemble] {
        ModelState::Fitted(FitReport {
            detail: FitDetail::TreeEnsemble {
                test_mae, test_rmse, ..
            },
            ..
        }) => {
            assert!(test_mae.unwrap() >= 0.0);
            assert!(test_rmse.unwrap() >= test_mae.unwrap());
        }
        other => panic!("unexpected forest state: {:?}", other),
    }

    if let ModelState::Fitted(FitReport {
        detail: FitDetail::AutoRegressive { aic, candidates, .. },
        ..
    }) = &output.fit_reports[&ModelKind::AutoRegressive]
    {
        assert!(aic.is_finite());
        assert_eq!(candidates.len(), 4);
    }
}

#[test]
fn test_scenarios_bound_the_breach_date() {
    let records = treasury_records(date(2023, 1, 2), date(2024, 9, 27));
    let output = XDatePipeline::run(&records, &tight_status(), &tight_config()).unwrap();
    let analysis = &output.scenarios;

    assert!(!analysis.breached().is_empty());
    let earliest = analysis.earliest.as_ref().unwrap();
    let latest = analysis.latest.as_ref().unwrap();
    let average = analysis.average_date.unwrap();
    assert!(earliest.days_ahead <= latest.days_ahead);
    assert!(earliest.date <= average && average <= latest.date);

    for result in analysis.breached() {
        let outcome = result.outcome.as_ref().unwrap();
        let last = outcome.trajectory.last().unwrap();
        assert!(last.debt_headroom <= 0.0);
        assert_eq!(Some(last.date), outcome.breach_date);
        // Measures are exhausted before any new debt.
        let first_debt = outcome
            .trajectory
            .iter()
            .position(|r| r.new_debt_issued > 0.0)
            .unwrap();
        assert_eq!(outcome.trajectory[first_debt].extraordinary_measures_remaining, 0.0);
    }
}

#[test]
fn test_backtest_against_held_out_actuals() {
    let records = treasury_records(date(2023, 1, 2), date(2024, 9, 27));
    let mut config = test_config();
    config.horizon_days = 90;
    config.date_range = Some(DateRange {
        start: date(2023, 1, 1),
        end: date(2024, 6, 30),
    });
    let output = XDatePipeline::run(&records, &tight_status(), &config).unwrap();
    assert_eq!(output.series.last_date(), Some(date(2024, 6, 28)));

    let actual = DataLoader::load(&records).unwrap();
    let window = DateRange {
        start: date(2024, 7, 1),
        end: date(2024, 9, 27),
    };
    let results = evaluate_backtest(&output.forecasts, &actual, window);

    assert_eq!(results.len(), output.forecasts.len());
    for r in &results {
        assert!(r.actual_sum < 0.0);
        assert!(r.abs_error.is_finite());
        assert!(r.pct_error.unwrap().is_finite());
        assert!(r.forecast_days > 0);
    }
}

#[test]
fn test_csv_ingestion_and_exports() -> anyhow::Result<()> {
    let dir = std::env::temp_dir().join("xdate_integration");
    std::fs::create_dir_all(&dir)?;

    let raw_path = dir.join("daily_cash_flows.csv");
    write_records_csv(&treasury_records(date(2023, 1, 2), date(2024, 3, 29)), &raw_path)?;
    let records = load_raw_records_csv(&raw_path)?;
    let output = XDatePipeline::run(&records, &tight_status(), &tight_config())?;

    let table_path = dir.join("forecasts.csv");
    write_forecast_table(&table_path, &output.forecasts)?;
    let reloaded = read_forecast_table(&table_path)?;
    assert_eq!(
        reloaded.keys().collect::<Vec<_>>(),
        output.forecasts.keys().collect::<Vec<_>>()
    );
    for (name, series) in &reloaded {
        let original = &output.forecasts[name];
        assert_eq!(series.len(), original.len());
        for (date, value) in &series.points {
            assert!((value - original.points[date]).abs() < 1e-3);
        }
    }

    // Re-simulating the reloaded table reproduces the breach dates.
    let simulator = XDateSimulator::new(tight_config().simulation)?;
    let rerun = ScenarioAnalyzer::new(simulator).analyze(&output.initial_state, &reloaded);
    for result in &output.scenarios.results {
        let again = rerun.get(&result.model).unwrap();
        if let (Some((a, _)), Some((b, _))) = (result.breach(), again.breach()) {
            assert!((a - b).num_days().abs() <= 1);
        }
    }

    let ensemble = output.scenarios.get(ENSEMBLE).unwrap();
    let outcome = ensemble.outcome.as_ref().unwrap();
    let trajectory_path = dir.join("xdate_simulation.csv");
    write_trajectory_csv(&trajectory_path, &outcome.trajectory)?;
    let summary_path = dir.join("xdate_prediction_summary.json");
    write_json(&summary_path, &outcome.summary())?;

    let summary: SimulationSummary =
        serde_json::from_str(&std::fs::read_to_string(&summary_path)?)?;
    assert_eq!(summary.model, ENSEMBLE);
    assert_eq!(summary.predicted_date, outcome.breach_date);
    assert_eq!(summary.simulated_days, outcome.trajectory.len());

    std::fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[test]
fn test_config_file_and_schema() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join("xdate_pipeline_config.json");
    std::fs::write(
        &path,
        r#"{
            "horizon_days": 60,
            "forecast": {
                "models": ["AutoRegressive", "SeasonalGrowth"],
                "arima": { "search": { "mode": "Auto", "max_p": 2, "max_d": 1, "max_q": 1 } }
            },
            "simulation": { "minimum_operating_cash": 25000.0 }
        }"#,
    )?;
    let config = PipelineConfig::from_json_file(&path)?;
    std::fs::remove_file(&path).ok();

    assert_eq!(config.horizon_days, 60);
    assert_eq!(config.forecast.models.len(), 2);
    assert_eq!(config.forecast.arima.search.candidates().len(), 3 * 2 * 2);
    assert_eq!(config.simulation.minimum_operating_cash, 25_000.0);
    assert_eq!(config.simulation.debt_ceiling, 36_100_000.0);

    let records = treasury_records(date(2023, 1, 2), date(2024, 5, 31));
    let output = XDatePipeline::run(&records, &tight_status(), &config)?;
    assert!(!output.fit_reports.contains_key(&ModelKind::TreeEnsemble));
    assert!(output.forecasts.values().all(|s| s.len() == 60));

    let schema_json = PipelineConfig::schema_as_json()?;
    assert!(schema_json.contains("horizon_days"));
    assert!(schema_json.contains("OrderSearch"));
    assert!(schema_json.contains("minimum_operating_cash"));
    Ok(())
}
