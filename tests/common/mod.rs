//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use retrace::config::ScanConfig;
use retrace::services::{ScreenController, TaskStore};
use retrace::sources::{MarketDataProvider, ProviderFuture};
use retrace::{AppError, DailyBar, Instrument, LookbackWindow, ProgressSnapshot};
use tokio::sync::Notify;

/// Parks a fetch until the test releases it.
#[derive(Default)]
pub struct Gate {
    pub reached: Notify,
    pub release: Notify,
}

impl Gate {
    pub async fn wait_reached(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.reached.notified())
            .await
            .expect("gated fetch was never reached");
    }

    pub fn open(&self) {
        self.release.notify_one();
    }
}

/// In-memory provider with per-code scripted answers.
#[derive(Default)]
pub struct ScriptedProvider {
    universe: Vec<Instrument>,
    universe_error: Option<String>,
    series: HashMap<String, Result<Vec<DailyBar>, String>>,
    gates: HashMap<String, Arc<Gate>>,
    panics: Vec<String>,
    pub universe_calls: AtomicUsize,
    pub series_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instrument(mut self, code: &str, industry: &str, series: Vec<DailyBar>) -> Self {
        self.universe
            .push(Instrument::new(code, format!("{} Co", code), industry));
        self.series.insert(code.to_string(), Ok(series));
        self
    }

    pub fn with_failing_instrument(mut self, code: &str) -> Self {
        self.universe.push(Instrument::new(code, format!("{} Co", code), "misc"));
        self.series
            .insert(code.to_string(), Err(format!("{} unavailable", code)));
        self
    }

    /// The daily-series fetch of `code` panics.
    pub fn with_panicking_instrument(mut self, code: &str) -> Self {
        self.universe.push(Instrument::new(code, format!("{} Co", code), "misc"));
        self.panics.push(code.to_string());
        self
    }

    pub fn with_universe_error(mut self, message: &str) -> Self {
        self.universe_error = Some(message.to_string());
        self
    }

    /// Gate the daily-series fetch of `code`.
    pub fn gate(&mut self, code: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates.insert(code.to_string(), gate.clone());
        gate
    }
}

impl MarketDataProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn get_universe<'a>(&'a self, filter: Option<&'a str>) -> ProviderFuture<'a, Vec<Instrument>> {
        Box::pin(async move {
            self.universe_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = &self.universe_error {
                return Err(AppError::DataProvider(message.clone()));
            }
            Ok(self
                .universe
                .iter()
                .filter(|i| filter.map_or(true, |f| i.industry == f))
                .cloned()
                .collect())
        })
    }

    fn get_daily_series<'a>(
        &'a self,
        code: &'a str,
        _window: &'a LookbackWindow,
    ) -> ProviderFuture<'a, Vec<DailyBar>> {
        Box::pin(async move {
            self.series_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = self.gates.get(code) {
                gate.reached.notify_one();
                gate.release.notified().await;
            }
            if self.panics.iter().any(|c| c == code) {
                panic!("scripted fault while fetching {}", code);
            }
            match self.series.get(code) {
                Some(Ok(series)) => Ok(series.clone()),
                Some(Err(message)) => Err(AppError::DataProvider(message.clone())),
                None => Ok(Vec::new()),
            }
        })
    }
}

pub fn day(n: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap() + chrono::Duration::days(i64::from(n))
}

/// One normal day, three +10.2% days from `breakout`, then a close at `last_close`.
pub fn retracement_series(breakout: f64, last_close: f64) -> Vec<DailyBar> {
    vec![
        DailyBar::new(day(0), breakout / 1.102, 0.3),
        DailyBar::new(day(1), breakout, 10.2),
        DailyBar::new(day(2), breakout * 1.102, 10.2),
        DailyBar::new(day(3), breakout * 1.102 * 1.102, 10.2),
        DailyBar::new(day(4), last_close, -6.0),
    ]
}

pub fn flat_series(close: f64) -> Vec<DailyBar> {
    (0..5).map(|n| DailyBar::new(day(n), close, 0.0)).collect()
}

pub fn scan_config() -> ScanConfig {
    ScanConfig {
        progress_every: 1,
        ..ScanConfig::default()
    }
}

pub fn controller(provider: ScriptedProvider) -> (Arc<ScreenController>, Arc<TaskStore>, Arc<ScriptedProvider>) {
    let provider = Arc::new(provider);
    let store = Arc::new(TaskStore::new_in_memory().unwrap());
    let controller = ScreenController::new(provider.clone(), store.clone(), scan_config());
    (controller, store, provider)
}

/// Poll until the latest job reaches a terminal status.
pub async fn wait_for_terminal(controller: &ScreenController) -> ProgressSnapshot {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let progress = controller.get_progress();
            if progress.status.is_terminal() {
                return progress;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job did not finish in time")
}
