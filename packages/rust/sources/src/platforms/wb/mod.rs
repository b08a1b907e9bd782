//! Wildberries monthly realization report.
//!
//! - collect: paginated statistics API, events merged per item
//! - enrich: product name scraped from the public catalog page
//! - views: per-item sales, returns and logistics, overall and per sub-report

mod aggregate;
mod collect;
mod enrich;

use async_trait::async_trait;
use tracing::{debug, instrument};

use sellerreport_report::{CostTable, View};
use sellerreport_shared::{RawRow, ReportError, ReportPeriod, Result, RowUpdate, SourceSettings};

use crate::fetcher::PacedFetcher;
use crate::memo::Memo;

use super::ReportSource;

/// `wb` / `fin_month`.
pub struct WbFinMonth {
    fetcher: PacedFetcher,
    api_key: String,
    stats_url: String,
    catalog_url: String,
    page_limit: u32,
    names: Memo<String>,
}

impl WbFinMonth {
    /// Fails when the API key env var is not set.
    pub fn new(settings: &SourceSettings) -> Result<Self> {
        let api_key = settings.wb.api_key.clone().ok_or_else(|| {
            ReportError::config(format!(
                "Wildberries API key not found. Set the {} environment variable.",
                settings.wb.api_key_env
            ))
        })?;

        Ok(Self {
            fetcher: PacedFetcher::new(settings)?,
            api_key,
            stats_url: settings.wb.stats_url.clone(),
            catalog_url: settings.wb.catalog_url.clone(),
            page_limit: settings.wb.page_limit,
            names: Memo::new(),
        })
    }
}

#[async_trait]
impl ReportSource for WbFinMonth {
    #[instrument(skip_all, fields(source = "wb/fin_month", from = %period.date_from, to = %period.date_to))]
    async fn collect(&self, period: &ReportPeriod) -> Result<Vec<RawRow>> {
        let events = collect::fetch_events(
            &self.fetcher,
            &self.stats_url,
            &self.api_key,
            self.page_limit,
            period,
        )
        .await?;
        collect::merge_events(events)
    }

    async fn row_updates(&self, row: &RawRow) -> Result<RowUpdate> {
        let nm_id = row
            .get("nm_id")
            .ok_or_else(|| ReportError::parse("row has no nm_id"))?;
        let key = enrich::item_key(nm_id)?;
        let name = self
            .names
            .get_or_try_insert_with(&key, || {
                enrich::fetch_item_name(&self.fetcher, &self.catalog_url, &key)
            })
            .await?;
        let cached = self.names.len().await;
        debug!(nm_id = %key, cached, "item name resolved");

        let mut update = RowUpdate::new();
        update.insert("name".into(), name.into());
        Ok(update)
    }

    fn build_views(&self, rows: &[RawRow], costs: Option<&CostTable>) -> Result<Vec<View>> {
        aggregate::build_views(rows, costs)
    }

    fn name(&self) -> &str {
        "wb/fin_month"
    }
}
