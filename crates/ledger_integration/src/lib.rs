use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use shared::domain::{Account, RecordIndex};

pub mod abi;
mod rpc;

pub use rpc::{EvmRecordSource, JsonRpcError, RpcIdentityProvider, StaticIdentityProvider};

/// Record tuple exactly as the ledger returns it, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub creator: Address,
    pub id: U256,
    pub title: String,
    pub body: String,
    pub reward: U256,
    pub expires_at: U256,
}

#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Number of records ever created. Never decreases.
    async fn record_count(&self) -> anyhow::Result<U256>;
    /// Fails when `index` is not below the current count.
    async fn record_at(&self, index: RecordIndex) -> anyhow::Result<RawRecord>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// An empty list means the user dismissed the request.
    async fn request_accounts(&self) -> anyhow::Result<Vec<Account>>;
}

#[cfg(test)]
#[path = "tests/fixtures.rs"]
mod test_fixtures;
