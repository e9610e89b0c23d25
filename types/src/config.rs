//! Consensus configuration

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusConfig {
    /// Time a round may take before validators move to the next one
    pub round_timeout_ms: u64,
    /// Consecutive turns each proposer serves before the next one takes over
    pub proposer_contiguous_rounds: u32,
    pub max_txs_per_block: usize,
    pub tx_pool_capacity: usize,
    /// Persist the transaction lists of finalized transitions
    pub persist_transactions: bool,
    /// Persist result state of finalized transitions (off for light replay)
    pub persist_result: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            round_timeout_ms: 3000,
            proposer_contiguous_rounds: 1,
            max_txs_per_block: 1000,
            tx_pool_capacity: 10_000,
            persist_transactions: true,
            persist_result: true,
        }
    }
}

impl ConsensusConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let round_timeout_ms = std::env::var("TESSERA_ROUND_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.round_timeout_ms);

        let proposer_contiguous_rounds = std::env::var("TESSERA_PROPOSER_CONTIGUOUS_ROUNDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &u32| *n > 0)
            .unwrap_or(defaults.proposer_contiguous_rounds);

        let max_txs_per_block = std::env::var("TESSERA_MAX_TXS_PER_BLOCK")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_txs_per_block);

        let tx_pool_capacity = std::env::var("TESSERA_TX_POOL_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.tx_pool_capacity);

        // Light replay keeps transaction lists but skips result state
        let light_replay = std::env::var("TESSERA_LIGHT_REPLAY")
            .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            round_timeout_ms,
            proposer_contiguous_rounds,
            max_txs_per_block,
            tx_pool_capacity,
            persist_transactions: defaults.persist_transactions,
            persist_result: !light_replay,
        }
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }
}
