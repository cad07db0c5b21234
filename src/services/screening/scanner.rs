//! Applies the detector across one batch of the universe.

use std::sync::Arc;

use tracing::{debug, warn};

use super::control::ControlHandle;
use super::detector::{self, DetectorConfig};
use crate::sources::MarketDataProvider;
use crate::types::{Instrument, LookbackWindow, Signal};

/// Progress tick reported while a batch runs.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress {
    /// Instruments processed across the whole job so far.
    pub processed: usize,
    /// Universe offset at which this batch ends.
    pub batch_end: usize,
    /// Signals found across the whole job so far.
    pub found: usize,
    pub message: String,
}

/// What one batch produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub signals: Vec<Signal>,
    /// Instruments of this batch that were processed (fetched or skipped).
    pub processed: usize,
    /// Cancellation was observed before the batch finished.
    pub stopped_early: bool,
}

/// Runs the detector over a contiguous slice of the universe.
pub struct BatchScanner {
    provider: Arc<dyn MarketDataProvider>,
    detector: DetectorConfig,
    progress_every: usize,
}

impl BatchScanner {
    pub fn new(provider: Arc<dyn MarketDataProvider>, detector: DetectorConfig, progress_every: usize) -> Self {
        Self {
            provider,
            detector,
            progress_every: progress_every.max(1),
        }
    }

    /// Scan `instruments`, which start at universe position `offset`.
    ///
    /// Fetch failures and empty series skip the instrument. Cancellation is
    /// checked before every instrument; pause parks the loop until resumed
    /// or cancelled.
    pub async fn scan_batch<F>(
        &self,
        instruments: &[Instrument],
        offset: usize,
        window: &LookbackWindow,
        control: &ControlHandle,
        found_before: usize,
        mut on_progress: F,
    ) -> BatchOutcome
    where
        F: FnMut(BatchProgress) + Send,
    {
        let batch_end = offset + instruments.len();
        let mut outcome = BatchOutcome::default();

        on_progress(BatchProgress {
            processed: offset,
            batch_end,
            found: found_before,
            message: format!("scanning {} instruments", instruments.len()),
        });

        for instrument in instruments {
            if control.cancel_requested() || control.wait_while_paused().await {
                outcome.stopped_early = true;
                break;
            }

            match self.provider.get_daily_series(&instrument.code, window).await {
                Ok(series) if series.is_empty() => {
                    debug!("No daily data for {}, skipping", instrument.code);
                }
                Ok(series) => {
                    if let Some(signal) = detector::evaluate(instrument, &series, &self.detector) {
                        debug!(
                            "Signal for {}: breakout {:.2}, now {:.2} ({:.1}% below)",
                            signal.instrument_code,
                            signal.start_price,
                            signal.current_price,
                            signal.drop_ratio
                        );
                        outcome.signals.push(signal);
                    }
                }
                Err(e) => {
                    warn!("Failed to fetch {} from {}: {}", instrument.code, self.provider.name(), e);
                }
            }

            outcome.processed += 1;
            let processed = offset + outcome.processed;
            if processed % self.progress_every == 0 {
                on_progress(BatchProgress {
                    processed,
                    batch_end,
                    found: found_before + outcome.signals.len(),
                    message: format!("processing {} {}", instrument.code, instrument.name),
                });
            }
        }

        on_progress(BatchProgress {
            processed: offset + outcome.processed,
            batch_end,
            found: found_before + outcome.signals.len(),
            message: if outcome.stopped_early {
                "cancelled".to_string()
            } else {
                "batch complete".to_string()
            },
        });

        outcome
    }
}
