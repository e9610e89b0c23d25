/// Buckets (key spaces) used in Tessera storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    /// Executed world states keyed by state root, staged before finalization
    WorldStates,
    /// Finalized transaction lists keyed by list hash
    TransactionLists,
    /// Finalized result bytes keyed by height
    Results,
    /// Committed blocks keyed by height
    Blocks,
    /// Chain metadata (last finalized pointer)
    Meta,
}

impl Bucket {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorldStates => "world_states",
            Self::TransactionLists => "transaction_lists",
            Self::Results => "results",
            Self::Blocks => "blocks",
            Self::Meta => "meta",
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            Self::WorldStates,
            Self::TransactionLists,
            Self::Results,
            Self::Blocks,
            Self::Meta,
        ]
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
