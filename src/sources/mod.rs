//! Market data providers.

pub mod rate_limiter;
pub mod tushare;

pub use rate_limiter::RateLimiter;
pub use tushare::TushareClient;

use crate::error::AppError;
use crate::types::{DailyBar, Instrument, LookbackWindow, ProviderHealth};
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by provider calls.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AppError>> + Send + 'a>>;

/// Source of the instrument universe and daily price series.
pub trait MarketDataProvider: Send + Sync {
    /// Provider display name.
    fn name(&self) -> &str;

    /// List the instrument universe, optionally restricted to one industry.
    ///
    /// An empty list is a legitimate answer, not an error.
    fn get_universe<'a>(&'a self, filter: Option<&'a str>) -> ProviderFuture<'a, Vec<Instrument>>;

    /// Daily series for one instrument, ordered by date ascending.
    fn get_daily_series<'a>(
        &'a self,
        code: &'a str,
        window: &'a LookbackWindow,
    ) -> ProviderFuture<'a, Vec<DailyBar>>;

    /// Distinct non-empty industries of the full universe, sorted.
    fn list_sectors(&self) -> ProviderFuture<'_, Vec<String>> {
        Box::pin(async move {
            let universe = self.get_universe(None).await?;
            let sectors: BTreeSet<String> = universe
                .into_iter()
                .map(|i| i.industry)
                .filter(|industry| !industry.is_empty())
                .collect();
            Ok(sectors.into_iter().collect())
        })
    }

    /// Check credentials and connectivity.
    fn check_health(&self) -> ProviderFuture<'_, ProviderHealth> {
        Box::pin(async move {
            Ok(ProviderHealth {
                valid: true,
                message: format!("{} does not require verification", self.name()),
                last_trade_date: None,
            })
        })
    }
}
