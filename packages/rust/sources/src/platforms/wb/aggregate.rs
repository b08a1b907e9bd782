use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use sellerreport_report::{CostTable, Table, View, as_number, number};
use sellerreport_shared::{RawRow, ReportError, Result};

const SALE: &str = "Продажа";
const RETURN: &str = "Возврат";
const LOGISTICS: &str = "Логистика";

/// Columns rolled up into the `sum` sheet when present.
const SUM_COLUMNS: [&str; 7] = [
    "n_sold", "sold", "n_refund", "refund", "delivery", "price", "income",
];

/// Per-item conditional sums over a set of events.
#[derive(Debug, Default, Clone, Copy)]
struct ItemTotals {
    n_sold: f64,
    sold: f64,
    n_refund: f64,
    refund: f64,
    delivery: f64,
}

impl ItemTotals {
    fn add(&mut self, event: &RawRow) {
        let field = |name: &str| event.get(name).and_then(as_number).unwrap_or(0.0);
        match event.get("supplier_oper_name").and_then(Value::as_str) {
            Some(SALE) => {
                self.n_sold += field("quantity");
                self.sold += field("supplier_reward");
            }
            Some(RETURN) => {
                self.n_refund += field("quantity");
                self.refund += field("supplier_reward");
            }
            Some(LOGISTICS) => self.delivery += field("delivery_rub"),
            _ => {}
        }
    }
}

/// `sum`, `total`, then one `report_<id>` per sub-report in first-seen order.
pub(super) fn build_views(rows: &[RawRow], costs: Option<&CostTable>) -> Result<Vec<View>> {
    let (uniques, events) = unpack(rows, costs)?;
    let with_cost = costs.is_some();

    let total = full_frame("total", &uniques, events.iter(), with_cost);
    let sum = total.column_totals("sum", &SUM_COLUMNS);
    let mut views = vec![View::Series(sum), View::Frame(total)];

    let mut report_ids: Vec<&Value> = Vec::new();
    for event in &events {
        if let Some(rid) = event.get("realizationreport_id") {
            if !report_ids.contains(&rid) {
                report_ids.push(rid);
            }
        }
    }
    for rid in report_ids {
        let subset = events
            .iter()
            .filter(|e| e.get("realizationreport_id") == Some(rid));
        let name = match rid {
            Value::String(s) => format!("report_{s}"),
            other => format!("report_{other}"),
        };
        views.push(View::Frame(full_frame(name, &uniques, subset, with_cost)));
    }

    debug!(views = views.len(), items = uniques.len(), events = events.len(), "views built");
    Ok(views)
}

/// Split rows into per-item fields (joined with cost) and flat events.
fn unpack(rows: &[RawRow], costs: Option<&CostTable>) -> Result<(Vec<RawRow>, Vec<RawRow>)> {
    let mut uniques = Vec::with_capacity(rows.len());
    let mut events = Vec::new();

    for row in rows {
        let mut item: RawRow = row
            .iter()
            .filter(|(key, _)| key.as_str() != "reports")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        match row.get("reports") {
            None | Some(Value::Null) => {}
            Some(Value::Array(reports)) => {
                for report in reports {
                    let Value::Object(report) = report else {
                        return Err(ReportError::parse("report entry is not an object"));
                    };
                    let mut event = item.clone();
                    event.extend(report.iter().map(|(k, v)| (k.clone(), v.clone())));
                    events.push(event);
                }
            }
            Some(_) => return Err(ReportError::parse("row 'reports' is not a list")),
        }

        if let Some(costs) = costs {
            let cost = item.get("nm_id").and_then(|id| costs.get(id));
            if cost.is_none() {
                let nm_id = item.get("nm_id").unwrap_or(&Value::Null);
                warn!(%nm_id, "no cost for item");
            }
            item.insert("cost".into(), cost.map(number).unwrap_or(Value::Null));
        }
        uniques.push(item);
    }
    Ok((uniques, events))
}

/// Item fields inner-joined with the sums over `events`, in `uniques` order.
fn full_frame<'a>(
    name: impl Into<String>,
    uniques: &[RawRow],
    events: impl Iterator<Item = &'a RawRow>,
    with_cost: bool,
) -> Table {
    let mut totals: HashMap<String, ItemTotals> = HashMap::new();
    for event in events {
        let key = event.get("nm_id").unwrap_or(&Value::Null).to_string();
        totals.entry(key).or_default().add(event);
    }

    let mut rows: Vec<RawRow> = Vec::new();
    for item in uniques {
        let key = item.get("nm_id").unwrap_or(&Value::Null).to_string();
        let Some(t) = totals.get(&key) else { continue };

        let mut row = item.clone();
        row.insert("n_sold".into(), number(t.n_sold));
        row.insert("sold".into(), number(t.sold));
        row.insert("n_refund".into(), number(t.n_refund));
        row.insert("refund".into(), number(t.refund));
        row.insert("delivery".into(), number(t.delivery));
        if with_cost {
            match item.get("cost").and_then(as_number) {
                Some(cost) => {
                    let price = cost * t.n_sold;
                    row.insert("price".into(), number(price));
                    row.insert("income".into(), number(t.sold - (price + t.refund + t.delivery)));
                }
                None => {
                    row.insert("price".into(), Value::Null);
                    row.insert("income".into(), Value::Null);
                }
            }
        }
        rows.push(row);
    }
    Table::from_rows(name, &rows)
}
