//! Tushare Pro HTTP client.
//!
//! Every call is a POST of `{api_name, token, params, fields}`; answers come
//! back as a column table `{code, msg, data: {fields, items}}`.

use chrono::{Days, Duration, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::rate_limiter::RateLimiter;
use super::{MarketDataProvider, ProviderFuture};
use crate::config::ProviderConfig;
use crate::error::AppError;
use crate::types::{DailyBar, Instrument, LookbackWindow, ProviderHealth};

const DATE_FORMAT: &str = "%Y%m%d";

#[derive(Debug, Deserialize)]
struct TushareResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<TushareTable>,
}

/// Column-oriented result table.
#[derive(Debug, Default, Deserialize)]
struct TushareTable {
    fields: Vec<String>,
    items: Vec<Vec<Value>>,
}

impl TushareTable {
    fn column(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }

    fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.items.iter().map(move |values| Row { table: self, values })
    }
}

struct Row<'a> {
    table: &'a TushareTable,
    values: &'a [Value],
}

impl Row<'_> {
    fn get(&self, field: &str) -> Option<&Value> {
        self.table
            .column(field)
            .and_then(|i| self.values.get(i))
            .filter(|v| !v.is_null())
    }

    fn str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    fn f64(&self, field: &str) -> Option<f64> {
        match self.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn date(&self, field: &str) -> Option<NaiveDate> {
        self.str(field)
            .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
    }
}

/// A `stock_basic` row before universe filtering.
#[derive(Debug, Clone)]
struct ListedStock {
    code: String,
    name: String,
    industry: String,
    list_date: Option<NaiveDate>,
}

/// Universe filter rules applied on top of `stock_basic`.
#[derive(Debug, Clone)]
struct UniverseRules {
    exclude_st: bool,
    min_list_days: u32,
}

impl UniverseRules {
    fn apply(&self, stocks: Vec<ListedStock>, industry: Option<&str>, today: NaiveDate) -> Vec<Instrument> {
        let listed_before = today
            .checked_sub_days(Days::new(u64::from(self.min_list_days)))
            .unwrap_or(NaiveDate::MIN);

        stocks
            .into_iter()
            .filter(|s| !s.code.ends_with(".BJ"))
            .filter(|s| !self.exclude_st || !s.name.contains("ST"))
            .filter(|s| {
                self.min_list_days == 0 || s.list_date.is_some_and(|d| d <= listed_before)
            })
            .filter(|s| industry.map_or(true, |wanted| s.industry == wanted))
            .map(|s| Instrument::new(s.code, s.name, s.industry))
            .collect()
    }
}

/// Tushare Pro market data client.
#[derive(Clone)]
pub struct TushareClient {
    client: Client,
    token: String,
    api_url: String,
    rules: UniverseRules,
    limiter: RateLimiter,
}

impl TushareClient {
    pub fn new(config: &ProviderConfig) -> Self {
        let client = Client::builder()
            .user_agent("retrace/0.1 (limit-up screener)")
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            token: config.token.clone(),
            api_url: config.api_url.clone(),
            rules: UniverseRules {
                exclude_st: config.exclude_st,
                min_list_days: config.min_list_days,
            },
            limiter: RateLimiter::new(config.calls_per_minute),
        }
    }

    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }

    async fn query(&self, api_name: &str, params: Value, fields: &str) -> Result<TushareTable, AppError> {
        if !self.has_token() {
            return Err(AppError::DataProvider("TUSHARE_TOKEN is not set".to_string()));
        }

        self.limiter.acquire(api_name).await;
        debug!("Tushare {} {}", api_name, params);

        let body = json!({
            "api_name": api_name,
            "token": self.token,
            "params": params,
            "fields": fields,
        });

        let response = self.client.post(&self.api_url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(AppError::DataProvider(format!(
                "tushare {} returned HTTP {}",
                api_name,
                response.status()
            )));
        }

        let text = response.text().await?;
        decode_response(api_name, &text)
    }

    async fn fetch_universe(&self, industry: Option<&str>) -> Result<Vec<Instrument>, AppError> {
        let table = self
            .query(
                "stock_basic",
                json!({ "list_status": "L" }),
                "ts_code,name,industry,list_date",
            )
            .await?;

        let stocks: Vec<ListedStock> = table
            .rows()
            .filter_map(|row| {
                Some(ListedStock {
                    code: row.str("ts_code")?.to_string(),
                    name: row.str("name").unwrap_or_default().to_string(),
                    industry: row.str("industry").unwrap_or_default().to_string(),
                    list_date: row.date("list_date"),
                })
            })
            .collect();

        let listed = stocks.len();
        let universe = self.rules.apply(stocks, industry, Utc::now().date_naive());
        info!(
            "Tushare universe: {} listed, {} after filters (industry {:?})",
            listed,
            universe.len(),
            industry
        );
        Ok(universe)
    }

    async fn fetch_daily(&self, code: &str, window: &LookbackWindow) -> Result<Vec<DailyBar>, AppError> {
        let table = self
            .query(
                "daily",
                json!({
                    "ts_code": code,
                    "start_date": window.start.format(DATE_FORMAT).to_string(),
                    "end_date": window.end.format(DATE_FORMAT).to_string(),
                }),
                "trade_date,close,pct_chg",
            )
            .await?;

        Ok(daily_bars(&table))
    }

    async fn check_token(&self) -> ProviderHealth {
        if !self.has_token() {
            return ProviderHealth {
                valid: false,
                message: "TUSHARE_TOKEN is not set".to_string(),
                last_trade_date: None,
            };
        }

        let today = Utc::now().date_naive();
        let params = json!({
            "exchange": "SSE",
            "start_date": (today - Duration::days(7)).format(DATE_FORMAT).to_string(),
            "end_date": today.format(DATE_FORMAT).to_string(),
        });

        match self.query("trade_cal", params, "cal_date,is_open").await {
            Ok(table) => {
                let last_trade_date = last_open_date(&table);
                ProviderHealth {
                    valid: true,
                    message: "token verified".to_string(),
                    last_trade_date,
                }
            }
            Err(e) => {
                warn!("Tushare token check failed: {}", e);
                ProviderHealth {
                    valid: false,
                    message: e.to_string(),
                    last_trade_date: None,
                }
            }
        }
    }
}

impl MarketDataProvider for TushareClient {
    fn name(&self) -> &str {
        "tushare"
    }

    fn get_universe<'a>(&'a self, filter: Option<&'a str>) -> ProviderFuture<'a, Vec<Instrument>> {
        Box::pin(self.fetch_universe(filter))
    }

    fn get_daily_series<'a>(
        &'a self,
        code: &'a str,
        window: &'a LookbackWindow,
    ) -> ProviderFuture<'a, Vec<DailyBar>> {
        Box::pin(self.fetch_daily(code, window))
    }

    fn check_health(&self) -> ProviderFuture<'_, ProviderHealth> {
        Box::pin(async move { Ok(self.check_token().await) })
    }
}

fn decode_response(api_name: &str, text: &str) -> Result<TushareTable, AppError> {
    let response: TushareResponse = serde_json::from_str(text)
        .map_err(|e| AppError::DataProvider(format!("tushare {} returned malformed body: {}", api_name, e)))?;

    if response.code != 0 {
        return Err(AppError::DataProvider(format!(
            "tushare {} failed (code {}): {}",
            api_name,
            response.code,
            response.msg.unwrap_or_default()
        )));
    }

    Ok(response.data.unwrap_or_default())
}

/// Decode a `daily` table into bars ordered by date ascending.
///
/// Rows missing a date, close or change are dropped.
fn daily_bars(table: &TushareTable) -> Vec<DailyBar> {
    let mut bars: Vec<DailyBar> = table
        .rows()
        .filter_map(|row| {
            Some(DailyBar::new(
                row.date("trade_date")?,
                row.f64("close")?,
                row.f64("pct_chg")?,
            ))
        })
        .collect();

    bars.sort_by_key(|b| b.date);
    bars
}

fn last_open_date(table: &TushareTable) -> Option<NaiveDate> {
    table
        .rows()
        .filter(|row| match row.get("is_open") {
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            Some(Value::String(s)) => s == "1",
            _ => false,
        })
        .filter_map(|row| row.date("cal_date"))
        .max()
}
