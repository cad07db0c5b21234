use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A tradable instrument in the screening universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    /// Exchange-qualified code (e.g. "000001.SZ").
    pub code: String,
    pub name: String,
    /// Industry / sector label, empty when the provider has none.
    #[serde(default)]
    pub industry: String,
}

impl Instrument {
    pub fn new(code: impl Into<String>, name: impl Into<String>, industry: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            industry: industry.into(),
        }
    }
}

/// One trading day of an instrument's price series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBar {
    pub date: NaiveDate,
    pub close: f64,
    /// Percentage change versus the previous close (9.8 means +9.8%).
    pub pct_change: f64,
}

impl DailyBar {
    pub fn new(date: NaiveDate, close: f64, pct_change: f64) -> Self {
        Self {
            date,
            close,
            pct_change,
        }
    }
}

/// Inclusive date range a daily series is fetched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookbackWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl LookbackWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Window covering the last `days` calendar days up to `end`.
    ///
    /// `None` when the start would fall outside the representable date range.
    pub fn ending_at(end: NaiveDate, days: u32) -> Option<Self> {
        let start = end.checked_sub_days(Days::new(u64::from(days)))?;
        Some(Self { start, end })
    }

    /// Window covering the last `days` calendar days up to today (UTC).
    pub fn ending_today(days: u32) -> Option<Self> {
        Self::ending_at(Utc::now().date_naive(), days)
    }

    /// Number of calendar days spanned.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// Result of a provider credential and connectivity check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub valid: bool,
    pub message: String,
    /// Latest open trading date seen by the check, if any.
    pub last_trade_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_ending_at() {
        let end = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let window = LookbackWindow::ending_at(end, 180).unwrap();

        assert_eq!(window.end, end);
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(window.days(), 180);
    }

    #[test]
    fn test_window_out_of_range() {
        let end = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();

        assert!(LookbackWindow::ending_at(end, u32::MAX).is_none());
        assert!(LookbackWindow::ending_today(u32::MAX).is_none());
        assert!(LookbackWindow::ending_at(end, 0).is_some());
    }

    #[test]
    fn test_instrument_serialization() {
        let instrument = Instrument::new("600000.SH", "Pudong Bank", "Banking");
        let json = serde_json::to_string(&instrument).unwrap();

        assert!(json.contains("\"code\":\"600000.SH\""));
        assert!(json.contains("\"industry\":\"Banking\""));
    }

    #[test]
    fn test_instrument_missing_industry_defaults_empty() {
        let instrument: Instrument =
            serde_json::from_str(r#"{"code":"000001.SZ","name":"Ping An"}"#).unwrap();
        assert!(instrument.industry.is_empty());
    }
}
