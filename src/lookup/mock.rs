use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::errors::RankError;
use crate::lookup::RankLookup;
use crate::models::rank::{LookupParams, RankOutcome, NOT_IN_TOP_RESULTS};

/// Offline ranking for test mode. The same keyword always ranks the same.
#[derive(Debug, Clone, Default)]
pub struct MockLookup;

impl MockLookup {
    pub fn new() -> Self {
        Self
    }

    pub fn rank(keyword: &str) -> RankOutcome {
        let keyword = keyword.trim().to_lowercase();
        let digest = Sha256::digest(keyword.as_bytes());

        let roll = u16::from_be_bytes([digest[0], digest[1]]) % 100;
        if roll < 20 {
            return RankOutcome::NotRanked {
                label: NOT_IN_TOP_RESULTS.to_string(),
            };
        }

        let (low, high) = if keyword.contains("einstein") {
            (1, 5)
        } else if keyword.contains("physics") || keyword.contains("science") {
            (3, 10)
        } else if keyword.contains("theory") {
            (5, 15)
        } else {
            (1, 30)
        };
        let spread = u32::from_be_bytes([digest[2], digest[3], digest[4], digest[5]]);
        let position = low + spread % (high - low + 1);

        RankOutcome::Found {
            position,
            rank_group: position,
            rank_absolute: position + u32::from(digest[6] % 3),
        }
    }
}

#[async_trait]
impl RankLookup for MockLookup {
    async fn lookup(
        &self,
        keyword: &str,
        _target: &str,
        _params: &LookupParams,
    ) -> Result<RankOutcome, RankError> {
        Ok(Self::rank(keyword))
    }
}
