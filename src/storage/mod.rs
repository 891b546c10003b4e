pub mod dataset;
pub mod uploads;

use std::path::Path;

use async_trait::async_trait;

pub use dataset::{CsvDatasetStore, Dataset};
pub use uploads::UploadDir;

use crate::errors::RankError;

#[async_trait]
pub trait DatasetStore: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Dataset, RankError>;
    /// Rewrite the whole file at `path` with the dataset contents.
    async fn save(&self, path: &Path, dataset: &Dataset) -> Result<(), RankError>;
    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, RankError>;
}
