//! Per-item unit cost table read from an uploaded spreadsheet.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use sellerreport_shared::{ReportError, Result};

use crate::sheet::as_number;
use crate::workbook::read_sheets;

/// Unit cost per item id. Duplicate items keep the highest cost.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostTable {
    costs: HashMap<String, f64>,
}

impl CostTable {
    /// Parse the first worksheet of an xlsx file. The header row must
    /// contain `nm_id` and `cost`.
    pub fn from_xlsx(bytes: &[u8]) -> Result<Self> {
        let sheets = read_sheets(bytes)?;
        let sheet = sheets
            .into_iter()
            .next()
            .ok_or_else(|| ReportError::validation("cost sheet has no worksheets"))?;

        let mut rows = sheet.rows.into_iter();
        let header = rows
            .next()
            .ok_or_else(|| ReportError::validation("cost sheet is empty"))?;
        let position = |name: &str| {
            header
                .iter()
                .position(|cell| cell.as_str().map(str::trim) == Some(name))
                .ok_or_else(|| ReportError::validation(format!("cost sheet has no '{name}' column")))
        };
        let id_col = position("nm_id")?;
        let cost_col = position("cost")?;

        let mut table = Self::default();
        for (line, row) in rows.enumerate() {
            let id = row.get(id_col).unwrap_or(&Value::Null);
            let cost = row.get(cost_col).and_then(as_number);
            match (item_key(id), cost) {
                (Some(key), Some(cost)) => table.insert(key, cost),
                (None, None) => {}
                _ => warn!(line = line + 2, "skipping cost row without item id or numeric cost"),
            }
        }
        debug!(items = table.len(), "loaded cost table");
        Ok(table)
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<Value>,
    {
        let mut table = Self::default();
        for (id, cost) in pairs {
            if let Some(key) = item_key(&id.into()) {
                table.insert(key, cost);
            }
        }
        table
    }

    fn insert(&mut self, key: String, cost: f64) {
        self.costs
            .entry(key)
            .and_modify(|existing| *existing = existing.max(cost))
            .or_insert(cost);
    }

    /// Cost of the item identified by `id` (number or numeric string).
    pub fn get(&self, id: &Value) -> Option<f64> {
        item_key(id).and_then(|key| self.costs.get(&key).copied())
    }

    pub fn len(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }
}

/// Normalize an item id so `123`, `123.0` and `"123"` match.
fn item_key(id: &Value) -> Option<String> {
    match id {
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Some(i.to_string()),
            (None, Some(f)) if f.fract() == 0.0 => Some(format!("{}", f as i64)),
            (None, Some(f)) => Some(f.to_string()),
            _ => None,
        },
        Value::String(s) if !s.trim().is_empty() => {
            let s = s.trim();
            match s.parse::<f64>() {
                Ok(f) if f.fract() == 0.0 => Some(format!("{}", f as i64)),
                _ => Some(s.to_string()),
            }
        }
        _ => None,
    }
}
