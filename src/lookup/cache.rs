use std::collections::HashMap;

use crate::errors::RankError;
use crate::models::rank::{Device, LookupParams, RankOutcome};

/// Identity of one lookup within a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    keyword: String,
    target: String,
    location_code: u32,
    location_name: String,
    device: Device,
}

impl CacheKey {
    /// Keywords are compared trimmed and lowercased.
    pub fn new(keyword: &str, target: &str, params: &LookupParams) -> Self {
        Self {
            keyword: keyword.trim().to_lowercase(),
            target: target.to_string(),
            location_code: params.location_code,
            location_name: params.location_name.clone().unwrap_or_default(),
            device: params.device,
        }
    }
}

/// Per-job memo of lookup outcomes. Errors are cached too, so a repeated
/// key never reaches the collaborator twice.
#[derive(Debug, Default)]
pub struct LookupCache {
    entries: HashMap<CacheKey, Result<RankOutcome, RankError>>,
    hits: u64,
    misses: u64,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<Result<RankOutcome, RankError>> {
        match self.entries.get(key) {
            Some(outcome) => {
                self.hits += 1;
                Some(outcome.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: CacheKey, outcome: Result<RankOutcome, RankError>) {
        self.entries.insert(key, outcome);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
