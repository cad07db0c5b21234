//! Limit-up run detection.
//!
//! A run is a maximal stretch of consecutive days whose percentage change
//! meets the limit-up threshold. Runs shorter than the minimum length are
//! discarded. A run still open at the end of the series is emitted as well.

use crate::types::{DailyBar, Instrument, LimitUpRun, Signal};

/// Detector settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    pub limit_up_threshold: f64,
    pub min_run_length: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            limit_up_threshold: 9.5,
            min_run_length: 3,
        }
    }
}

/// Find every limit-up run of at least `min_run_length` days.
///
/// `series` must be ordered by date ascending. Runs are returned in the
/// order they occur.
pub fn detect(series: &[DailyBar], limit_up_threshold: f64, min_run_length: usize) -> Vec<LimitUpRun> {
    let mut runs = Vec::new();
    let mut current: Vec<&DailyBar> = Vec::new();

    for bar in series {
        if bar.pct_change >= limit_up_threshold {
            current.push(bar);
        } else {
            flush_run(&mut current, min_run_length, &mut runs);
        }
    }
    flush_run(&mut current, min_run_length, &mut runs);

    runs
}

fn flush_run(current: &mut Vec<&DailyBar>, min_run_length: usize, runs: &mut Vec<LimitUpRun>) {
    if current.len() >= min_run_length {
        if let Some(first) = current.first() {
            runs.push(LimitUpRun {
                start_date: first.date,
                start_price: first.close,
                length: current.len(),
                member_dates: current.iter().map(|b| b.date).collect(),
            });
        }
    }
    current.clear();
}

/// Pick the signal for one instrument, if any.
///
/// Takes the earliest run whose breakout price is above the last close of
/// the series. At most one signal per instrument.
pub fn select_signal(instrument: &Instrument, series: &[DailyBar], runs: &[LimitUpRun]) -> Option<Signal> {
    let current_price = series.last()?.close;

    runs.iter()
        .find(|run| run.start_price > current_price)
        .map(|run| Signal {
            instrument_code: instrument.code.clone(),
            name: instrument.name.clone(),
            industry: instrument.industry.clone(),
            start_date: run.start_date,
            start_price: run.start_price,
            current_price,
            run_length: run.length,
            drop_ratio: (run.start_price - current_price) / run.start_price * 100.0,
        })
}

/// Detect runs and select a signal in one step.
pub fn evaluate(instrument: &Instrument, series: &[DailyBar], config: &DetectorConfig) -> Option<Signal> {
    let runs = detect(series, config.limit_up_threshold, config.min_run_length);
    select_signal(instrument, series, &runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    /// Build a series from (close, pct_change) pairs on consecutive days.
    fn series(points: &[(f64, f64)]) -> Vec<DailyBar> {
        let base = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        points
            .iter()
            .enumerate()
            .map(|(i, &(close, pct))| DailyBar::new(base + Duration::days(i as i64), close, pct))
            .collect()
    }

    fn instrument() -> Instrument {
        Instrument::new("600001.SH", "Test Co", "Steel")
    }

    #[test]
    fn test_empty_and_single_row() {
        assert!(detect(&[], 9.5, 3).is_empty());
        assert!(detect(&series(&[(11.0, 10.0)]), 9.5, 3).is_empty());
    }

    #[test]
    fn test_short_run_ignored() {
        let s = series(&[(10.0, 0.0), (11.0, 10.0), (12.1, 10.0), (12.0, -0.8)]);
        assert!(detect(&s, 9.5, 3).is_empty());
    }

    #[test]
    fn test_run_closed_by_normal_day() {
        let s = series(&[
            (10.0, 0.5),
            (11.0, 10.0),
            (12.1, 10.0),
            (13.31, 10.0),
            (12.5, -6.1),
        ]);
        let runs = detect(&s, 9.5, 3);

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].start_price, 11.0);
        assert_eq!(runs[0].length, 3);
        assert_eq!(runs[0].start_date, s[1].date);
        assert_eq!(runs[0].member_dates, vec![s[1].date, s[2].date, s[3].date]);
    }

    #[test]
    fn test_trailing_run_flushed() {
        let s = series(&[(10.0, 1.0), (11.0, 10.0), (12.1, 10.0), (13.31, 10.0), (14.64, 10.0)]);
        let runs = detect(&s, 9.5, 3);

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].length, 4);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let s = series(&[(10.0, 9.5), (11.0, 9.5), (12.0, 9.5)]);
        assert_eq!(detect(&s, 9.5, 3).len(), 1);
        assert!(detect(&s, 9.51, 3).is_empty());
    }

    #[test]
    fn test_multiple_runs_in_order() {
        let s = series(&[
            (11.0, 10.0),
            (12.1, 10.0),
            (13.3, 10.0),
            (12.0, -9.8),
            (13.2, 10.0),
            (14.5, 10.0),
            (16.0, 10.0),
            (15.0, -6.2),
        ]);
        let runs = detect(&s, 9.5, 3);

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].start_price, 11.0);
        assert_eq!(runs[1].start_price, 13.2);
    }

    #[test]
    fn test_select_earliest_qualifying_run() {
        // First run breaks out at 11.0, second at 13.2; last close 12.0 sits
        // below the second breakout only.
        let s = series(&[
            (11.0, 10.0),
            (12.1, 10.0),
            (13.3, 10.0),
            (14.0, 5.0),
            (13.2, 10.0),
            (14.5, 10.0),
            (16.0, 10.0),
            (12.0, -9.8),
        ]);
        let runs = detect(&s, 9.5, 3);
        let signal = select_signal(&instrument(), &s, &runs).unwrap();

        assert_eq!(signal.start_price, 13.2);
        assert_eq!(signal.current_price, 12.0);
        assert_eq!(signal.run_length, 3);
        assert!((signal.drop_ratio - (1.2 / 13.2 * 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_no_signal_without_retracement() {
        let s = series(&[(11.0, 10.0), (12.1, 10.0), (13.3, 10.0), (13.0, -2.2)]);
        let runs = detect(&s, 9.5, 3);

        assert_eq!(runs.len(), 1);
        assert!(select_signal(&instrument(), &s, &runs).is_none());
    }

    #[test]
    fn test_close_equal_to_breakout_is_not_a_signal() {
        let s = series(&[(11.0, 10.0), (12.1, 10.0), (13.3, 10.0), (11.0, -17.3)]);
        assert!(evaluate(&instrument(), &s, &DetectorConfig::default()).is_none());
    }

    #[test]
    fn test_evaluate_carries_instrument_fields() {
        let s = series(&[(10.0, 0.0), (11.0, 10.2), (12.12, 10.2), (13.36, 10.2), (8.0, -40.0)]);
        let signal = evaluate(&instrument(), &s, &DetectorConfig::default()).unwrap();

        assert_eq!(signal.instrument_code, "600001.SH");
        assert_eq!(signal.industry, "Steel");
        assert!(signal.drop_ratio > 0.0);
    }
}
