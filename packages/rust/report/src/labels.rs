//! Localized sheet headers.
//!
//! A [`Labels`] holds a `field -> locale -> label` dictionary and the locale
//! to render in. Fields without an entry for that locale keep their name.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use sellerreport_shared::{ReportError, Result};

use crate::sheet::View;

/// Field to locale to label.
pub type Dictionary = BTreeMap<String, BTreeMap<String, String>>;

const BUILTIN: &[(&str, &str, &str)] = &[
    // field, ru, en
    ("nm_id", "Артикул WB", "WB item id"),
    ("barcode", "Баркод", "Barcode"),
    ("sa_name", "Артикул продавца", "Seller SKU"),
    ("name", "Наименование", "Product name"),
    ("cost", "Себестоимость", "Unit cost"),
    ("realizationreport_id", "Номер отчёта", "Report number"),
    ("n_sold", "Продано, шт.", "Units sold"),
    ("sold", "К перечислению за продажи", "Sales payout"),
    ("n_refund", "Возвращено, шт.", "Units returned"),
    ("refund", "Сумма возвратов", "Refunds"),
    ("delivery", "Логистика", "Delivery"),
    ("price", "Себестоимость продаж", "Cost of goods sold"),
    ("income", "Прибыль", "Income"),
];

/// Label dictionary bound to one locale.
#[derive(Debug, Clone)]
pub struct Labels {
    dictionary: Dictionary,
    locale: String,
}

impl Labels {
    /// The built-in dictionary rendered in `locale`.
    pub fn builtin(locale: impl Into<String>) -> Self {
        let mut dictionary = Dictionary::new();
        for (field, ru, en) in BUILTIN {
            let entry = dictionary.entry((*field).to_string()).or_default();
            entry.insert("ru".into(), (*ru).to_string());
            entry.insert("en".into(), (*en).to_string());
        }
        Self {
            dictionary,
            locale: locale.into(),
        }
    }

    /// A dictionary that translates nothing.
    pub fn identity() -> Self {
        Self {
            dictionary: Dictionary::new(),
            locale: String::new(),
        }
    }

    /// Merge entries from a JSON file shaped `{field: {locale: label}}`.
    /// File entries win over built-in ones.
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;
        let extra: Dictionary = serde_json::from_str(&raw)
            .map_err(|e| ReportError::config(format!("invalid label dictionary {}: {e}", path.display())))?;
        debug!(path = %path.display(), fields = extra.len(), "merged label dictionary");
        self.merge(extra);
        Ok(())
    }

    pub fn merge(&mut self, extra: Dictionary) {
        for (field, locales) in extra {
            self.dictionary.entry(field).or_default().extend(locales);
        }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Label for `field`, or `field` itself when unmapped.
    pub fn translate<'a>(&'a self, field: &'a str) -> &'a str {
        self.dictionary
            .get(field)
            .and_then(|locales| locales.get(&self.locale))
            .map(String::as_str)
            .filter(|label| !label.is_empty())
            .unwrap_or(field)
    }

    /// Rename the columns of a frame or the labels of a series.
    pub fn apply(&self, view: View) -> View {
        view.map_labels(|label| self.translate(label).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::{Series, Table};
    use serde_json::json;

    #[test]
    fn translates_known_fields() {
        let labels = Labels::builtin("ru");
        assert_eq!(labels.translate("n_sold"), "Продано, шт.");
        let labels = Labels::builtin("en");
        assert_eq!(labels.translate("income"), "Income");
    }

    #[test]
    fn unmapped_fields_pass_through() {
        let labels = Labels::builtin("ru");
        assert_eq!(labels.translate("not_name"), "not_name");
        let labels = Labels::builtin("de");
        assert_eq!(labels.translate("n_sold"), "n_sold");
    }

    #[test]
    fn translation_is_idempotent() {
        for locale in ["ru", "en"] {
            let labels = Labels::builtin(locale);
            for (field, _, _) in BUILTIN {
                let once = labels.translate(field);
                assert_eq!(labels.translate(once), once, "{locale}/{field}");
            }
        }

        let view = View::Frame(Table::new("total", vec!["nm_id".into(), "other".into()]));
        let labels = Labels::builtin("ru");
        let once = labels.apply(view);
        let twice = labels.apply(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn apply_renames_series_labels() {
        let labels = Labels::builtin("en");
        let view = View::Series(Series {
            name: "sum".into(),
            entries: vec![("sold".into(), json!(10)), ("custom".into(), json!(1))],
        });
        match labels.apply(view) {
            View::Series(s) => {
                assert_eq!(s.entries[0].0, "Sales payout");
                assert_eq!(s.entries[1].0, "custom");
            }
            View::Frame(_) => panic!("expected series"),
        }
    }

    #[test]
    fn merged_entries_override_builtin() {
        let mut labels = Labels::builtin("en");
        let mut extra = Dictionary::new();
        extra.insert(
            "sold".into(),
            BTreeMap::from([("en".to_string(), "Revenue".to_string())]),
        );
        labels.merge(extra);
        assert_eq!(labels.translate("sold"), "Revenue");
        assert_eq!(labels.translate("refund"), "Refunds");
    }

    #[test]
    fn merge_file_reads_json() {
        let path = std::env::temp_dir().join(format!("sr_labels_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"data": {"en": "Payload"}}"#).unwrap();
        let mut labels = Labels::builtin("en");
        labels.merge_file(&path).expect("merge");
        assert_eq!(labels.translate("data"), "Payload");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn identity_translates_nothing() {
        let labels = Labels::identity();
        assert_eq!(labels.translate("nm_id"), "nm_id");
    }
}
