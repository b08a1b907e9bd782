//! Everything a pipeline run or a request handler needs, built once.

use std::path::Path;

use tracing::debug;

use sellerreport_report::Labels;
use sellerreport_shared::{AppConfig, Result, SourceSettings};
use sellerreport_sources::SourceRegistry;
use sellerreport_storage::{BlobStore, Storage};

/// Shared handles for the document store, blob store and source registry.
pub struct PipelineDeps {
    pub storage: Storage,
    pub blobs: BlobStore,
    pub registry: SourceRegistry,
    pub settings: SourceSettings,
    pub labels: Labels,
}

impl PipelineDeps {
    pub fn new(
        storage: Storage,
        blobs: BlobStore,
        registry: SourceRegistry,
        settings: SourceSettings,
        labels: Labels,
    ) -> Self {
        Self {
            storage,
            blobs,
            registry,
            settings,
            labels,
        }
    }

    /// Open the stores under the configured data directory with the
    /// built-in sources.
    pub async fn open(config: &AppConfig) -> Result<Self> {
        let db_path = config.storage.database_path();
        let storage = Storage::open(&db_path).await?;
        let blobs = BlobStore::new(config.storage.blob_root());
        debug!(db = %db_path.display(), blobs = %blobs.root().display(), "stores opened");

        Ok(Self::new(
            storage,
            blobs,
            SourceRegistry::new(),
            SourceSettings::from(config),
            load_labels(config)?,
        ))
    }
}

/// Built-in dictionary in the configured locale, plus the optional file.
pub fn load_labels(config: &AppConfig) -> Result<Labels> {
    let mut labels = Labels::builtin(config.labels.locale.clone());
    if let Some(path) = &config.labels.dictionary_path {
        labels.merge_file(Path::new(path))?;
    }
    debug!(locale = labels.locale(), "labels loaded");
    Ok(labels)
}
