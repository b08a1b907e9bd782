use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info};

use sellerreport_shared::{RawRow, ReportError, ReportPeriod, Result};

use crate::fetcher::PacedFetcher;

/// Fields shared by every event of one item, captured from its first event.
const COMMON_KEYS: [&str; 3] = ["nm_id", "barcode", "sa_name"];

/// Fields kept from each event under the item's `reports` list.
const EVENT_KEYS: [&str; 7] = [
    "realizationreport_id",
    "order_dt",
    "sale_dt",
    "supplier_reward",
    "supplier_oper_name",
    "quantity",
    "delivery_rub",
];

/// Walk the paginated statistics endpoint until it returns an empty page.
pub(super) async fn fetch_events(
    fetcher: &PacedFetcher,
    stats_url: &str,
    api_key: &str,
    page_limit: u32,
    period: &ReportPeriod,
) -> Result<Vec<RawRow>> {
    let (date_from, date_to) = period.as_datetimes();
    let mut cursor: u64 = 0;
    let mut events = Vec::new();
    let mut pages = 0usize;

    loop {
        let query = [
            ("key", api_key.to_string()),
            ("limit", page_limit.to_string()),
            ("rrdid", cursor.to_string()),
            ("dateFrom", date_from.clone()),
            ("dateTo", date_to.clone()),
        ];
        let page = match fetcher.get_json(stats_url, &query).await? {
            Value::Null => Vec::new(),
            Value::Array(items) => items,
            other => {
                return Err(ReportError::parse(format!(
                    "statistics page is not an array: {}",
                    type_name(&other)
                )));
            }
        };
        pages += 1;
        if page.is_empty() {
            break;
        }

        let mut next = cursor;
        for item in page {
            let Value::Object(event) = item else {
                return Err(ReportError::parse("statistics event is not an object"));
            };
            let rrd_id = event
                .get("rrd_id")
                .and_then(Value::as_u64)
                .ok_or_else(|| ReportError::parse("statistics event has no numeric rrd_id"))?;
            next = next.max(rrd_id);
            events.push(event);
        }
        if next <= cursor {
            return Err(ReportError::parse(format!(
                "pagination cursor did not advance past rrd_id {cursor}"
            )));
        }
        debug!(page = pages, cursor = next, events = events.len(), "statistics page received");
        cursor = next;
    }

    info!(pages, events = events.len(), "statistics collected");
    Ok(events)
}

/// Group events by item in first-appearance order.
pub(super) fn merge_events(events: Vec<RawRow>) -> Result<Vec<RawRow>> {
    let mut rows: Vec<RawRow> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for event in events {
        let nm_id = require(&event, "nm_id")?;
        let key = nm_id.to_string();
        let slot = match index.get(&key) {
            Some(&slot) => slot,
            None => {
                let mut row = RawRow::new();
                for field in COMMON_KEYS {
                    row.insert(field.into(), require(&event, field)?.clone());
                }
                row.insert("reports".into(), Value::Array(Vec::new()));
                rows.push(row);
                index.insert(key, rows.len() - 1);
                rows.len() - 1
            }
        };

        let mut report = RawRow::new();
        for field in EVENT_KEYS {
            report.insert(field.into(), require(&event, field)?.clone());
        }
        if let Some(Value::Array(reports)) = rows[slot].get_mut("reports") {
            reports.push(Value::Object(report));
        }
    }
    Ok(rows)
}

fn require<'a>(event: &'a RawRow, field: &str) -> Result<&'a Value> {
    event.get(field).ok_or_else(|| {
        let rrd_id = event.get("rrd_id").cloned().unwrap_or(Value::Null);
        ReportError::parse(format!("statistics event {rrd_id} has no '{field}'"))
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(v: Value) -> RawRow {
        v.as_object().cloned().unwrap()
    }

    fn full_event(rrd_id: u64, nm_id: u64, rid: u64) -> RawRow {
        event(json!({
            "rrd_id": rrd_id,
            "nm_id": nm_id,
            "barcode": "b",
            "sa_name": "s",
            "realizationreport_id": rid,
            "order_dt": "2024-01-01",
            "sale_dt": "2024-01-02",
            "supplier_reward": 10,
            "supplier_oper_name": "Продажа",
            "quantity": 1,
            "delivery_rub": 0,
            "unrelated": "dropped",
        }))
    }

    #[test]
    fn events_group_by_item_in_first_seen_order() {
        let rows = merge_events(vec![
            full_event(1, 5, 100),
            full_event(2, 3, 100),
            full_event(3, 5, 101),
        ])
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["nm_id"], json!(5));
        assert_eq!(rows[1]["nm_id"], json!(3));

        let reports = rows[0]["reports"].as_array().unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1]["realizationreport_id"], json!(101));
        assert!(reports[0].get("unrelated").is_none());
        assert!(reports[0].get("rrd_id").is_none());
    }

    #[test]
    fn missing_event_field_is_parse_error() {
        let mut broken = full_event(1, 5, 100);
        broken.remove("delivery_rub");
        let err = merge_events(vec![broken]).unwrap_err();
        assert!(matches!(err, ReportError::Parse { .. }));
        assert!(err.to_string().contains("delivery_rub"));
    }

    #[test]
    fn missing_common_field_is_parse_error() {
        let mut broken = full_event(1, 5, 100);
        broken.remove("barcode");
        let err = merge_events(vec![broken]).unwrap_err();
        assert!(err.to_string().contains("barcode"));
    }
}
