//! Report sources and the registry that selects one per job.
//!
//! A [`ReportSource`] knows how to collect, enrich and shape the rows of one
//! `(platform, doc_type)` pair. Sources are built fresh for every run, so the
//! fetcher pacing state and memo caches they own never outlive a run.

pub mod wb;

use async_trait::async_trait;
use tracing::debug;

use sellerreport_report::{CostTable, View};
use sellerreport_shared::{
    DocType, Platform, RawRow, ReportError, ReportPeriod, Result, RowUpdate, SourceSettings,
};

pub use test::TestFinMonth;
pub use wb::WbFinMonth;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Capabilities a pipeline needs from one report kind.
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Pull every raw row for the period, in a stable order.
    async fn collect(&self, period: &ReportPeriod) -> Result<Vec<RawRow>>;

    /// Fields to merge into one row.
    async fn row_updates(&self, row: &RawRow) -> Result<RowUpdate>;

    /// Named views in sheet order.
    fn build_views(&self, rows: &[RawRow], costs: Option<&CostTable>) -> Result<Vec<View>>;

    /// Human-readable source name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Constructor for one source kind.
pub type SourceFactory = fn(&SourceSettings) -> Result<Box<dyn ReportSource>>;

/// Lookup table from `(platform, doc_type)` to a source constructor.
pub struct SourceRegistry {
    factories: Vec<((Platform, DocType), SourceFactory)>,
}

impl SourceRegistry {
    /// Registry with every built-in source.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Platform::Test, DocType::FinMonth, |_| {
            Ok(Box::new(TestFinMonth))
        });
        registry.register(Platform::Wb, DocType::FinMonth, |settings| {
            Ok(Box::new(WbFinMonth::new(settings)?))
        });
        registry
    }

    pub fn empty() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Add or replace the factory for a pair.
    pub fn register(&mut self, platform: Platform, doc_type: DocType, factory: SourceFactory) {
        self.factories.retain(|(key, _)| *key != (platform, doc_type));
        self.factories.push(((platform, doc_type), factory));
    }

    pub fn supports(&self, platform: Platform, doc_type: DocType) -> bool {
        self.factory(platform, doc_type).is_some()
    }

    /// Build a fresh source for one run.
    pub fn build(
        &self,
        platform: Platform,
        doc_type: DocType,
        settings: &SourceSettings,
    ) -> Result<Box<dyn ReportSource>> {
        let factory = self.factory(platform, doc_type).ok_or_else(|| {
            ReportError::validation(format!(
                "no report source for platform '{platform}' and doc type '{doc_type}'"
            ))
        })?;
        let source = factory(settings)?;
        debug!(source = source.name(), "built report source");
        Ok(source)
    }

    fn factory(&self, platform: Platform, doc_type: DocType) -> Option<SourceFactory> {
        self.factories
            .iter()
            .find(|(key, _)| *key == (platform, doc_type))
            .map(|(_, factory)| *factory)
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sellerreport_shared::AppConfig;

    #[test]
    fn builtin_pairs_are_registered() {
        let registry = SourceRegistry::new();
        assert!(registry.supports(Platform::Test, DocType::FinMonth));
        assert!(registry.supports(Platform::Wb, DocType::FinMonth));
        assert!(!SourceRegistry::empty().supports(Platform::Test, DocType::FinMonth));
    }

    #[test]
    fn unknown_pair_is_a_validation_error() {
        let settings = SourceSettings::from(&AppConfig::default());
        let err = SourceRegistry::empty()
            .build(Platform::Wb, DocType::FinMonth, &settings)
            .err()
            .expect("must fail");
        assert!(matches!(err, ReportError::Validation { .. }));
    }

    #[test]
    fn wb_source_requires_api_key() {
        let mut settings = SourceSettings::from(&AppConfig::default());
        settings.wb.api_key = None;
        let err = SourceRegistry::new()
            .build(Platform::Wb, DocType::FinMonth, &settings)
            .err()
            .expect("must fail");
        assert!(matches!(err, ReportError::Config { .. }));
    }

    #[test]
    fn register_replaces_existing_factory() {
        let mut registry = SourceRegistry::new();
        registry.register(Platform::Wb, DocType::FinMonth, |_| Ok(Box::new(TestFinMonth)));
        let settings = SourceSettings::from(&AppConfig::default());
        let source = registry
            .build(Platform::Wb, DocType::FinMonth, &settings)
            .unwrap();
        assert_eq!(source.name(), "test/fin_month");
    }
}
