pub mod cache;
pub mod dataforseo;
pub mod mock;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use cache::{CacheKey, LookupCache};
pub use dataforseo::DataForSeoClient;
pub use mock::MockLookup;

use crate::errors::RankError;
use crate::models::config::ServiceConfig;
use crate::models::rank::{LookupParams, RankOutcome, RankRecord};

/// The external ranking collaborator: where does `target` rank for `keyword`?
#[async_trait]
pub trait RankLookup: Send + Sync {
    async fn lookup(
        &self,
        keyword: &str,
        target: &str,
        params: &LookupParams,
    ) -> Result<RankOutcome, RankError>;
}

/// Rank `keywords` in order without pacing, looking each distinct keyword
/// up once. Failed lookups produce `N/A` records.
pub async fn rank_keywords(
    lookup: &dyn RankLookup,
    keywords: &[String],
    target: &str,
    params: &LookupParams,
) -> Vec<RankRecord> {
    let mut cache = LookupCache::new();
    let mut records = Vec::with_capacity(keywords.len());
    for keyword in keywords {
        let key = CacheKey::new(keyword, target, params);
        let outcome = match cache.get(&key) {
            Some(outcome) => outcome,
            None => {
                let outcome = lookup.lookup(keyword, target, params).await;
                if let Err(e) = &outcome {
                    tracing::warn!("Error processing keyword '{}': {}", keyword, e);
                }
                cache.insert(key, outcome.clone());
                outcome
            }
        };
        records.push(RankRecord::from_outcome(keyword, &outcome, params.device));
    }
    records
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    /// `None` unless both halves are present and non-blank.
    pub fn from_parts(login: Option<&str>, password: Option<&str>) -> Option<Self> {
        let login = login.map(str::trim).filter(|s| !s.is_empty())?;
        let password = password.filter(|s| !s.trim().is_empty())?;
        Some(Self {
            login: login.to_string(),
            password: password.to_string(),
        })
    }
}

/// Builds the lookup collaborator for one request.
pub trait LookupFactory: Send + Sync {
    fn build(
        &self,
        credentials: Option<&Credentials>,
        test_mode: bool,
    ) -> Result<Arc<dyn RankLookup>, RankError>;
}

/// Production factory: DataForSEO over HTTP, or the offline mock in test mode.
#[derive(Debug, Clone)]
pub struct HttpLookupFactory {
    base_url: String,
    timeout: Duration,
}

impl HttpLookupFactory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.api_base_url.clone(), config.request_timeout())
    }
}

impl LookupFactory for HttpLookupFactory {
    fn build(
        &self,
        credentials: Option<&Credentials>,
        test_mode: bool,
    ) -> Result<Arc<dyn RankLookup>, RankError> {
        if test_mode {
            return Ok(Arc::new(MockLookup::new()));
        }
        let credentials = credentials.ok_or_else(|| {
            RankError::Validation(
                "Missing required fields: api_login, api_password".to_string(),
            )
        })?;
        let client = DataForSeoClient::new(&self.base_url, credentials.clone(), self.timeout)?;
        Ok(Arc::new(client))
    }
}
