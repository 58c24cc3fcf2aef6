use crate::error::{Result, XDateError};
use chrono::{Datelike, NaiveDate};

pub fn is_month_end(date: NaiveDate) -> bool {
    date.succ_opt().map_or(true, |next| next.month() != date.month())
}

pub fn quarter(date: NaiveDate) -> u32 {
    (date.month() - 1) / 3 + 1
}

pub fn is_quarter_end(date: NaiveDate) -> bool {
    date.month() % 3 == 0 && is_month_end(date)
}

/// Consecutive calendar days starting the day after `last`.
pub fn days_after(last: NaiveDate, count: usize) -> Result<Vec<NaiveDate>> {
    let mut dates = Vec::with_capacity(count);
    let mut current = last;
    for _ in 0..count {
        current = current
            .succ_opt()
            .ok_or_else(|| XDateError::DateError(format!("No day after {}", current)))?;
        dates.push(current);
    }
    Ok(dates)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator). `None` below two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}
