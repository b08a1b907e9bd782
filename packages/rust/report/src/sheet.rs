//! Named tabular views written as workbook sheets.

use serde::Serialize;
use serde_json::Value;

use sellerreport_shared::RawRow;

/// One named output sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum View {
    /// Rows of values under a header of column names.
    Frame(Table),
    /// Label to scalar, one metric per line.
    Series(Series),
}

impl View {
    pub fn name(&self) -> &str {
        match self {
            Self::Frame(table) => &table.name,
            Self::Series(series) => &series.name,
        }
    }

    /// Rename every column (frame) or label (series) through `f`.
    pub fn map_labels(self, f: impl Fn(&str) -> String) -> Self {
        match self {
            Self::Frame(mut table) => {
                table.columns = table.columns.iter().map(|c| f(c)).collect();
                Self::Frame(table)
            }
            Self::Series(mut series) => {
                series.entries = series
                    .entries
                    .into_iter()
                    .map(|(label, value)| (f(&label), value))
                    .collect();
                Self::Series(series)
            }
        }
    }
}

/// A frame: ordered columns and rows aligned with them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a frame from maps. Columns are the union of keys in first-seen
    /// order; a key missing from a row is a blank cell.
    pub fn from_rows<'a>(name: impl Into<String>, rows: impl IntoIterator<Item = &'a RawRow>) -> Self {
        let rows: Vec<&RawRow> = rows.into_iter().collect();
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let mut table = Self::new(name, columns);
        for row in rows {
            let cells = table
                .columns
                .iter()
                .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                .collect();
            table.rows.push(cells);
        }
        table
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// Cells of one column, top to bottom.
    pub fn column<'a>(&'a self, column: &str) -> impl Iterator<Item = &'a Value> + 'a {
        let idx = self.column_index(column);
        self.rows
            .iter()
            .filter_map(move |row| idx.and_then(|i| row.get(i)))
    }

    /// Sum of the numeric cells of each listed column that exists, skipping
    /// blanks. Missing columns are left out of the result.
    pub fn column_totals(&self, name: impl Into<String>, columns: &[&str]) -> Series {
        let entries = columns
            .iter()
            .filter(|c| self.has_column(c))
            .map(|c| {
                let total: f64 = self.column(c).filter_map(as_number).sum();
                ((*c).to_string(), number(total))
            })
            .collect();
        Series {
            name: name.into(),
            entries,
        }
    }
}

/// A labelled list of scalars.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub entries: Vec<(String, Value)>,
}

impl Series {
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.entries.iter().find(|(l, _)| l == label).map(|(_, v)| v)
    }
}

/// Numeric reading of a cell. Numeric strings count; blanks and text do not.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// JSON number for `x`, kept integral when it has no fractional part.
pub fn number(x: f64) -> Value {
    if x.fract() == 0.0 && x.abs() < i64::MAX as f64 {
        Value::from(x as i64)
    } else {
        serde_json::Number::from_f64(x)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> RawRow {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn from_rows_unions_columns_in_first_seen_order() {
        let rows = vec![
            row(json!({"id": 0, "data": "a"})),
            row(json!({"id": 1, "extra": true, "data": "b"})),
        ];
        let table = Table::from_rows("t", &rows);
        assert_eq!(table.columns, ["id", "data", "extra"]);
        assert_eq!(table.rows[0], vec![json!(0), json!("a"), Value::Null]);
        assert_eq!(table.rows[1], vec![json!(1), json!("b"), json!(true)]);
    }

    #[test]
    fn column_totals_skip_blanks_and_missing_columns() {
        let rows = vec![
            row(json!({"sold": 10.5, "n_sold": 2})),
            row(json!({"sold": null, "n_sold": 3})),
        ];
        let table = Table::from_rows("t", &rows);
        let totals = table.column_totals("sum", &["n_sold", "sold", "price"]);
        assert_eq!(totals.entries.len(), 2);
        assert_eq!(totals.get("n_sold"), Some(&json!(5)));
        assert_eq!(totals.get("sold"), Some(&json!(10.5)));
        assert!(totals.get("price").is_none());
    }

    #[test]
    fn map_labels_renames_columns_and_series_labels() {
        let table = View::Frame(Table::new("t", vec!["a".into(), "b".into()]));
        let renamed = table.map_labels(|l| l.to_uppercase());
        match renamed {
            View::Frame(t) => assert_eq!(t.columns, ["A", "B"]),
            View::Series(_) => panic!("expected frame"),
        }

        let series = View::Series(Series {
            name: "sum".into(),
            entries: vec![("x".into(), json!(1))],
        });
        let renamed = series.map_labels(|l| format!("{l}!"));
        assert_eq!(renamed.name(), "sum");
        match renamed {
            View::Series(s) => assert_eq!(s.entries[0].0, "x!"),
            View::Frame(_) => panic!("expected series"),
        }
    }

    #[test]
    fn number_keeps_integers_integral() {
        assert_eq!(number(4.0), json!(4));
        assert_eq!(number(-1.25), json!(-1.25));
        assert_eq!(as_number(&json!("12.5")), Some(12.5));
        assert_eq!(as_number(&json!("abc")), None);
    }
}
