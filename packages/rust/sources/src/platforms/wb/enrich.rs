use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use sellerreport_shared::{ReportError, Result};

use crate::fetcher::PacedFetcher;

/// Item id as it appears in catalog URLs and memo keys.
pub(super) fn item_key(nm_id: &Value) -> Result<String> {
    match nm_id {
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        other => Err(ReportError::parse(format!("unusable nm_id {other}"))),
    }
}

/// Fetch the catalog page of one item and read its display name.
pub(super) async fn fetch_item_name(
    fetcher: &PacedFetcher,
    catalog_url: &str,
    nm_id: &str,
) -> Result<String> {
    let url = catalog_url.replace("{nm_id}", nm_id);
    let body = fetcher.get_text(&url).await?;
    let name = parse_item_name(&body)
        .map_err(|e| ReportError::parse(format!("{url}: {e}")))?;
    debug!(nm_id, %name, "item name resolved");
    Ok(name)
}

/// Trimmed text of the first `span.name` element.
fn parse_item_name(html: &str) -> std::result::Result<String, String> {
    let selector = Selector::parse("span.name").map_err(|e| format!("bad selector: {e}"))?;
    let doc = Html::parse_document(html);
    doc.select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .ok_or_else(|| "no span.name element on the page".to_string())
}
